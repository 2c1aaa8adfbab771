//! `FlightRecorder`: the durable implementation of `FlightLog`.
//!
//! Every trace is written as two hash-chained events, one when it starts
//! and one when it is sealed. With a backing file each event is appended as
//! a JSON line and synced to disk before the call returns; the in-memory
//! view is only updated after the write succeeded. A write that fails
//! partway is cut back off the file, so the log on disk always ends with a
//! complete event.
//!
//! A file-backed recorder keeps only the queryable record view in memory.
//! The event chain itself lives in the file and is re-read for
//! verification and export.
//!
//! Sealed records are also broadcast to subscribers (the supervisor).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use warden_contracts::{
    action::{ActionRequest, TraceId},
    audit::{AuditQuery, AuditRecord, AuditStatistics, TerminalOutcome},
    error::{WardenError, WardenResult},
};
use warden_core::traits::FlightLog;

use crate::{
    chain::{find_break, hash_event},
    event::{AuditEvent, EventKind},
};

/// Capacity of the sealed-record broadcast channel. Subscribers that fall
/// further behind than this observe `RecvError::Lagged`.
const BROADCAST_CAPACITY: usize = 1024;

// ── Log file ──────────────────────────────────────────────────────────────────

/// The byte sink behind a file-backed recorder.
pub(crate) trait LogSink: Write + Send {
    /// Make every written byte durable.
    fn sync(&mut self) -> io::Result<()>;

    /// Cut the sink back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

pub(crate) struct LogFile {
    pub(crate) sink: Box<dyn LogSink>,

    /// Bytes holding complete, synced events.
    len: u64,

    /// Set when a failed write could not be cut back off the file.
    broken: bool,
}

impl LogFile {
    /// Append one line durably, or leave the file as it was.
    fn append(&mut self, line: &[u8]) -> WardenResult<()> {
        if self.broken {
            return Err(write_failed(
                "audit log holds an unrecovered partial write; refusing further events".to_string(),
            ));
        }

        let written = self
            .sink
            .write_all(line)
            .and_then(|()| self.sink.flush())
            .and_then(|()| self.sink.sync());

        if let Err(e) = written {
            match self.sink.truncate(self.len).and_then(|()| self.sink.sync()) {
                Ok(()) => warn!(len = self.len, error = %e, "audit append failed; log cut back to last event"),
                Err(undo) => {
                    self.broken = true;
                    error!(error = %e, undo = %undo, "audit append failed and could not be undone");
                }
            }
            return Err(write_failed(format!("append: {e}")));
        }

        self.len += line.len() as u64;
        Ok(())
    }
}

/// Where the event chain is kept.
pub(crate) enum Backend {
    /// No file: the chain is held in memory.
    Memory(Vec<AuditEvent>),
    File(LogFile),
}

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct RecorderState {
    pub(crate) backend: Backend,

    /// Current view of every trace, in start order.
    records: Vec<Arc<AuditRecord>>,
    index: HashMap<TraceId, usize>,

    /// The next sequence number to assign.
    sequence: u64,

    /// `this_hash` of the last event, or `GENESIS_HASH`.
    last_hash: String,
}

impl RecorderState {
    fn empty(backend: Backend) -> Self {
        Self {
            backend,
            records: Vec::new(),
            index: HashMap::new(),
            sequence: 0,
            last_hash: AuditEvent::GENESIS_HASH.to_string(),
        }
    }

    /// Chain, persist, then remember one event. Nothing in memory changes
    /// unless the write reached disk.
    fn append(&mut self, kind: EventKind, record: AuditRecord) -> WardenResult<()> {
        let this_hash = hash_event(self.sequence, kind, &record, &self.last_hash)?;
        let event = AuditEvent {
            sequence: self.sequence,
            kind,
            record,
            prev_hash: self.last_hash.clone(),
            this_hash,
        };

        if let Backend::File(log) = &mut self.backend {
            let mut line = serde_json::to_vec(&event).map_err(|e| write_failed(format!("serialize: {e}")))?;
            line.push(b'\n');
            log.append(&line)?;
        }

        self.apply(event);
        Ok(())
    }

    /// Fold an already-persisted event into the in-memory view.
    fn apply(&mut self, event: AuditEvent) {
        let record = Arc::new(event.record.clone());
        match event.kind {
            EventKind::Start => {
                self.index.insert(record.trace_id.clone(), self.records.len());
                self.records.push(record);
            }
            EventKind::Terminal => {
                if let Some(&i) = self.index.get(&record.trace_id) {
                    self.records[i] = record;
                }
            }
        }
        self.sequence = event.sequence + 1;
        self.last_hash = event.this_hash.clone();
        if let Backend::Memory(events) = &mut self.backend {
            events.push(event);
        }
    }
}

fn write_failed(reason: String) -> WardenError {
    WardenError::AuditWriteFailed { reason }
}

/// Where the committed chain ends, captured under the lock.
enum ChainView {
    Memory(Vec<AuditEvent>),
    File { len: u64, sequence: u64, last_hash: String },
    Broken,
}

// ── Public recorder ───────────────────────────────────────────────────────────

/// An append-only flight recorder backed by a SHA-256 hash chain.
///
/// All writes are serialized by one `Mutex`, which also fixes the order of
/// events in the chain. Queries copy the record view out of the lock and
/// filter without holding it.
pub struct FlightRecorder {
    pub(crate) state: Mutex<RecorderState>,
    path: Option<PathBuf>,
    sealed: broadcast::Sender<AuditRecord>,
}

impl FlightRecorder {
    /// A recorder that keeps the chain in memory only.
    pub fn in_memory() -> Self {
        Self::with_state(RecorderState::empty(Backend::Memory(Vec::new())), None)
    }

    /// Open (or create) a JSON Lines log at `path`.
    ///
    /// An existing log is replayed and its chain verified. A log that does
    /// not parse or whose chain is broken is refused.
    pub fn open(path: impl AsRef<Path>) -> WardenResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| write_failed(format!("create '{}': {e}", parent.display())))?;
        }

        let events = if path.exists() {
            Self::read_events(path, u64::MAX)?
        } else {
            Vec::new()
        };
        if let Some(sequence) = find_break(&events) {
            return Err(write_failed(format!(
                "audit log '{}' fails verification at event {sequence}",
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| write_failed(format!("open '{}': {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| write_failed(format!("stat '{}': {e}", path.display())))?
            .len();

        let log = LogFile { sink: Box::new(file), len, broken: false };
        let mut state = RecorderState::empty(Backend::File(log));
        let replayed = events.len();
        for event in events {
            state.apply(event);
        }
        info!(path = %path.display(), events = replayed, "flight recorder opened");

        Ok(Self::with_state(state, Some(path.to_path_buf())))
    }

    fn with_state(state: RecorderState, path: Option<PathBuf>) -> Self {
        let (sealed, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: Mutex::new(state),
            path,
            sealed,
        }
    }

    /// Parse the events in the first `limit` bytes of the log at `path`.
    fn read_events(path: &Path, limit: u64) -> WardenResult<Vec<AuditEvent>> {
        let file = File::open(path).map_err(|e| write_failed(format!("read '{}': {e}", path.display())))?;
        let mut events = Vec::new();
        for (n, line) in BufReader::new(file.take(limit)).lines().enumerate() {
            let line = line.map_err(|e| write_failed(format!("read '{}': {e}", path.display())))?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|e| {
                write_failed(format!("audit log '{}' line {}: {e}", path.display(), n + 1))
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// The committed chain: a copy for memory recorders, the committed
    /// prefix of the file otherwise. The file is read outside the lock.
    fn committed_events(&self) -> WardenResult<Vec<AuditEvent>> {
        let view = {
            let state = self.lock();
            match &state.backend {
                Backend::Memory(events) => ChainView::Memory(events.clone()),
                Backend::File(log) if log.broken => ChainView::Broken,
                Backend::File(log) => ChainView::File {
                    len: log.len,
                    sequence: state.sequence,
                    last_hash: state.last_hash.clone(),
                },
            }
        };

        match view {
            ChainView::Memory(events) => Ok(events),
            ChainView::Broken => Err(write_failed("audit log holds an unrecovered partial write".to_string())),
            ChainView::File { len, sequence, last_hash } => {
                let Some(path) = self.path.as_deref() else {
                    return Err(write_failed("file-backed recorder has no path".to_string()));
                };
                let events = Self::read_events(path, len)?;
                let tail = events.last().map_or(AuditEvent::GENESIS_HASH, |e| e.this_hash.as_str());
                if events.len() as u64 != sequence || tail != last_hash {
                    return Err(write_failed(format!(
                        "audit log '{}' holds {} events, expected {sequence} ending in {last_hash}",
                        path.display(),
                        events.len()
                    )));
                }
                Ok(events)
            }
        }
    }

    /// The record view at this instant.
    fn records(&self) -> Vec<Arc<AuditRecord>> {
        self.lock().records.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Receive every record as it is sealed.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.sealed.subscribe()
    }

    /// The current view of one trace.
    pub fn get(&self, trace_id: &TraceId) -> Option<AuditRecord> {
        let state = self.lock();
        state.index.get(trace_id).map(|&i| AuditRecord::clone(&state.records[i]))
    }

    /// Number of traces, sealed or not.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records matching `query`, most recent first, at most `query.limit`.
    pub fn query_logs(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        let records = self.records();
        let mut hits: Vec<(usize, &AuditRecord)> = records
            .iter()
            .map(Arc::as_ref)
            .enumerate()
            .filter(|(_, r)| query.matches(r))
            .collect();
        hits.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        hits.into_iter()
            .take(query.limit)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn get_statistics(&self) -> AuditStatistics {
        let mut stats = AuditStatistics::default();
        for record in self.records() {
            stats.total += 1;
            match record.policy_verdict {
                Some(verdict) => *stats.by_verdict.entry(verdict).or_default() += 1,
                None => stats.pending += 1,
            }
            *stats.by_agent.entry(record.agent_id.to_string()).or_default() += 1;
            *stats.by_tool.entry(record.tool_name.clone()).or_default() += 1;
        }
        stats
    }

    /// Recompute every hash and check every link of the committed chain.
    ///
    /// For a file-backed recorder this re-reads the log, so edits made to
    /// the file after it was opened are detected too.
    pub fn verify_integrity(&self) -> bool {
        match self.committed_events() {
            Ok(events) => match find_break(&events) {
                None => true,
                Some(sequence) => {
                    warn!(sequence, "audit chain broken");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "audit chain unreadable");
                false
            }
        }
    }

    /// The full event chain, in order.
    pub fn export_events(&self) -> WardenResult<Vec<AuditEvent>> {
        self.committed_events()
    }
}

impl FlightLog for FlightRecorder {
    fn start_trace(&self, request: &ActionRequest) -> WardenResult<TraceId> {
        let trace_id = TraceId::new();
        let record = AuditRecord {
            trace_id: trace_id.clone(),
            timestamp: Utc::now(),
            agent_id: request.agent_id.clone(),
            tool_name: request.tool_name.clone(),
            tool_args: request.args_value(),
            input_prompt: request.input_prompt.clone(),
            policy_verdict: None,
            violation_kind: None,
            violation_reason: None,
            result: None,
            execution_time_ms: None,
            metadata: Default::default(),
            completed_at: None,
        };

        self.lock().append(EventKind::Start, record)?;
        debug!(trace_id = %trace_id, agent_id = %request.agent_id, tool = %request.tool_name, "trace started");
        Ok(trace_id)
    }

    fn finish_trace(&self, trace_id: &TraceId, outcome: TerminalOutcome) -> WardenResult<()> {
        let sealed = {
            let mut state = self.lock();
            let Some(&i) = state.index.get(trace_id) else {
                return Err(WardenError::UnknownTrace { trace_id: trace_id.to_string() });
            };
            if state.records[i].is_terminal() {
                return Err(WardenError::TraceFinalized { trace_id: trace_id.to_string() });
            }

            let mut record = AuditRecord::clone(&state.records[i]);
            record.policy_verdict = Some(outcome.verdict);
            record.violation_kind = outcome.violation_kind;
            record.violation_reason = outcome.violation_reason;
            record.result = outcome.result;
            record.execution_time_ms = outcome.execution_time_ms;
            record.metadata.extend(outcome.metadata);
            record.completed_at = Some(Utc::now());

            state.append(EventKind::Terminal, record.clone())?;
            record
        };

        info!(
            trace_id = %trace_id,
            agent_id = %sealed.agent_id,
            tool = %sealed.tool_name,
            verdict = %outcome.verdict,
            "trace sealed"
        );
        // No subscribers is not an error.
        let _ = self.sealed.send(sealed);
        Ok(())
    }
}
