//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired resources with the current state fetched from the
//! Provider and generates the list of required Effects (Plan). Schemas decide
//! two things here: computed attributes left unset keep their state value, and
//! a change to a force-new attribute turns an update into a replacement.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with in-place changes
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists and a force-new attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| changed.iter().any(|name| s.is_force_new(name)));

    // A replacement is a fresh object, so nothing computed carries over
    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: planned_resource(desired, current, schema),
            changed_attributes: changed,
        }
    }
}

/// Desired resource with unset computed attributes taken from state
pub fn planned_resource(
    desired: &Resource,
    current: &State,
    schema: Option<&ResourceSchema>,
) -> Resource {
    let mut planned = desired.clone();
    if let Some(schema) = schema {
        for (name, value) in &current.attributes {
            if schema.is_computed(name) && !planned.attributes.contains_key(name) {
                planned.attributes.insert(name.clone(), value.clone());
            }
        }
    }
    planned
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        let additive = schema.is_some_and(|s| s.is_additive(key));
        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            Some(current_value) if additive && contains_all(current_value, desired_value) => {}
            // Secrets and write-only inputs are never echoed back
            None if schema.is_some_and(|s| s.is_unechoed(key)) => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Every entry of the desired list is present in the current one
fn contains_all(current: &Value, desired: &Value) -> bool {
    match (current, desired) {
        (Value::List(current), Value::List(desired)) => {
            desired.iter().all(|item| current.contains(item))
        }
        _ => false,
    }
}

/// Compute Diff for multiple resources and generate a Plan
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(resource, &current, schemas.get(&resource.id.resource_type)) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
        }
    }

    plan
}

/// Plan deletion of every existing resource, in reverse declaration order
pub fn destroy_plan(desired: &[Resource], current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();

    for resource in desired.iter().rev() {
        if resource.is_data_source() {
            continue;
        }
        if let Some(state) = current_states.get(&resource.id)
            && state.exists
            && let Some(identifier) = &state.identifier
        {
            plan.add(Effect::Delete {
                id: resource.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}
