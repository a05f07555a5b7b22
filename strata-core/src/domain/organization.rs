//! Organization hierarchy types

use serde::{Deserialize, Serialize};

/// Path returned for nodes that sit directly under the organization root
pub const ROOT: &str = "ROOT";

/// Kind of node a parent link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParentKind {
    Root,
    OrganizationalUnit,
}

/// Parent link of an OU or account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: String,
    pub kind: ParentKind,
}

impl ParentRef {
    pub fn is_root(&self) -> bool {
        self.kind == ParentKind::Root
    }
}

/// Organizational unit as listed under a parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub id: String,
    pub name: String,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A page with no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}
