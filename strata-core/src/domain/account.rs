//! Account domain types

use serde::{Deserialize, Serialize};

use super::target::TargetExpr;

/// Sentinel id and name used for approval steps
pub const APPROVAL: &str = "approval";

/// Lifecycle status of an account in the organization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
    PendingClosure,
}

/// Account as returned by the organization capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: AccountStatus,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Resolved deployment target
///
/// Produced by target expansion. The name is sanitized at construction so a
/// descriptor can be used directly in file names and stage identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    pub id: String,
    pub name: String,
    /// The target expression this account was expanded from
    pub source: TargetExpr,
    pub regions: Vec<String>,
    pub status: AccountStatus,
}

impl AccountDescriptor {
    /// Creates a descriptor, sanitizing the display name
    pub fn new(
        id: impl Into<String>,
        name: &str,
        source: TargetExpr,
        regions: Vec<String>,
        status: AccountStatus,
    ) -> Self {
        Self {
            id: id.into(),
            name: sanitize_name(name),
            source,
            regions,
            status,
        }
    }

    /// Descriptor standing for a manual approval step
    pub fn approval() -> Self {
        Self::new(
            APPROVAL,
            APPROVAL,
            TargetExpr::Approval,
            Vec::new(),
            AccountStatus::Active,
        )
    }

    pub fn is_approval(&self) -> bool {
        self.id == APPROVAL
    }

    /// Display form of the expression this account came from
    pub fn path(&self) -> String {
        self.source.to_string()
    }
}

/// Keeps only `[A-Za-z0-9.@_-]` characters of a display name
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '_' | '-'))
        .collect()
}
