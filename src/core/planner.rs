//! Change sets: diff a fresh synthesis against the previous template.
//!
//! Resources are compared per logical id by the BLAKE3 hash of their
//! canonical JSON, so key order and formatting never register as changes.

use std::fmt;

use super::synth::{CfnResource, Template};
use crate::assets::hasher;

/// Action a deploy of the current template would take on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl PlanAction {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Destroy => "-",
            Self::NoOp => " ",
        }
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub logical_id: String,
    pub resource_type: String,
    pub action: PlanAction,
    pub description: String,
}

/// Every resource of the current template plus those only the previous one
/// had.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub stack: String,
    pub changes: Vec<PlannedChange>,
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        self.to_create + self.to_update + self.to_destroy > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
            self.to_create, self.to_update, self.to_destroy, self.unchanged
        )
    }
}

/// Diff `current` against `previous`. With no previous template every
/// resource is a create.
pub fn diff(stack: &str, previous: Option<&Template>, current: &Template) -> ChangeSet {
    let mut set = ChangeSet {
        stack: stack.to_string(),
        changes: Vec::new(),
        to_create: 0,
        to_update: 0,
        to_destroy: 0,
        unchanged: 0,
    };

    for (id, resource) in &current.resources {
        let old = previous.and_then(|p| p.resources.get(id));
        let action = match old {
            None => PlanAction::Create,
            Some(old) if hash_resource(old) == hash_resource(resource) => PlanAction::NoOp,
            Some(_) => PlanAction::Update,
        };
        let description = describe(id, resource, old, action);
        set.push(id, resource, action, description);
    }

    if let Some(prev) = previous {
        for (id, resource) in &prev.resources {
            if !current.resources.contains_key(id) {
                let description = format!("{}: destroy {}", id, resource.resource_type);
                set.push(id, resource, PlanAction::Destroy, description);
            }
        }
    }

    tracing::debug!(
        stack,
        create = set.to_create,
        update = set.to_update,
        destroy = set.to_destroy,
        "diffed templates"
    );
    set
}

impl ChangeSet {
    fn push(&mut self, id: &str, resource: &CfnResource, action: PlanAction, description: String) {
        match action {
            PlanAction::Create => self.to_create += 1,
            PlanAction::Update => self.to_update += 1,
            PlanAction::Destroy => self.to_destroy += 1,
            PlanAction::NoOp => self.unchanged += 1,
        }
        self.changes.push(PlannedChange {
            logical_id: id.to_string(),
            resource_type: resource.resource_type.clone(),
            action,
            description,
        });
    }
}

/// Hash of a resource's canonical JSON (object keys sorted).
pub fn hash_resource(resource: &CfnResource) -> String {
    let value = serde_json::to_value(resource).unwrap_or(serde_json::Value::Null);
    hasher::hash_string(&canonical_json(&value))
}

fn canonical_json(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

fn describe(id: &str, resource: &CfnResource, old: Option<&CfnResource>, action: PlanAction) -> String {
    match action {
        PlanAction::Create => format!("{}: create {}", id, resource.resource_type),
        PlanAction::Update => match old {
            Some(o) if o.resource_type != resource.resource_type => format!(
                "{}: replace {} with {}",
                id, o.resource_type, resource.resource_type
            ),
            _ => format!("{}: update {} (properties changed)", id, resource.resource_type),
        },
        PlanAction::Destroy => format!("{}: destroy {}", id, resource.resource_type),
        PlanAction::NoOp => format!("{}: no changes", id),
    }
}
