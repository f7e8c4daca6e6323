//! Effect - A single side effect to be performed against a provider
//!
//! Effects are plain values; nothing happens until an interpreter runs them.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Refresh a data source
    Read(Resource),
    Create(Resource),
    /// In-place change of one or more attributes
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed: delete the current object, then create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    Delete { id: ResourceId, identifier: String },
}

impl Effect {
    /// Whether this Effect changes remote state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => id,
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Read(r) => write!(f, "Read {}", r.id),
            Effect::Create(r) => write!(f, "Create {}", r.id),
            Effect::Update { id, .. } => write!(f, "Update {}", id),
            Effect::Replace { id, .. } => write!(f, "Replace {}", id),
            Effect::Delete { id, .. } => write!(f, "Delete {}", id),
        }
    }
}
