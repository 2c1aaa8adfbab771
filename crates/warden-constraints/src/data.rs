//! The data graph: which resources exist and may be touched.
//!
//! Tables are matched exactly. Paths are matched by component prefix, so a
//! registered `/reports` admits `/reports/q1.csv` but not `/reports-old`.
//! A path containing a `..` component is never accessible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use warden_contracts::constraint::ConstraintAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    Path,
}

/// A registered resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
}

impl Resource {
    pub fn table(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ResourceKind::Table }
    }

    pub fn path(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ResourceKind::Path }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataGraph {
    resources: BTreeMap<String, ResourceKind>,
}

impl DataGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `resource`. Returns false if a resource with that id already
    /// exists.
    pub fn register(&mut self, resource: Resource) -> bool {
        let id = match resource.kind {
            ResourceKind::Table => resource.id,
            ResourceKind::Path => trim_path(&resource.id).to_string(),
        };
        if self.resources.contains_key(&id) {
            return false;
        }
        self.resources.insert(id, resource.kind);
        true
    }

    pub fn deregister(&mut self, id: &str) -> bool {
        self.resources.remove(id).is_some() || self.resources.remove(trim_path(id)).is_some()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// True only for registered resources.
    pub fn is_accessible(&self, resource_id: &str) -> bool {
        if self.resources.get(resource_id) == Some(&ResourceKind::Table) {
            return true;
        }
        if resource_id.split('/').any(|segment| segment == "..") {
            return false;
        }
        let candidate = trim_path(resource_id);
        self.resources
            .iter()
            .filter(|(_, kind)| **kind == ResourceKind::Path)
            .any(|(root, _)| {
                let root = root.as_str();
                candidate == root
                    || (root == "/" && candidate.starts_with('/'))
                    || candidate
                        .strip_prefix(root)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }

    /// Judge one action. Tools that declare no resource are not this
    /// graph's concern.
    pub fn evaluate(&self, action: &ConstraintAction) -> Result<(), String> {
        if action.resource_missing {
            return Err(format!(
                "tool '{}' names a resource argument but the request supplied none",
                action.tool_name
            ));
        }
        match &action.resource {
            Some(resource) if !self.is_accessible(resource) => {
                Err(format!("resource '{resource}' is not registered"))
            }
            _ => Ok(()),
        }
    }
}

/// Strip trailing separators, keeping a bare root.
fn trim_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}
