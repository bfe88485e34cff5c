//! Action types for cloud resource management

use crate::provider::{ResourceConfig, ResourceSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Represents a planned action for a cloud resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for the action
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource type (e.g., "AWS::S3::Bucket")
    pub resource_type: String,

    /// Logical id of the resource
    pub resource_id: String,

    /// Description of the action
    pub description: String,

    /// Additional details about the action
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    /// Compare a recorded baseline with the desired resources
    ///
    /// Actions are ordered by logical id. A changed resource type is reported
    /// as an update with `replacement = true`.
    pub fn diff(current: &ResourceSet, desired: &ResourceSet) -> Self {
        let ids: BTreeSet<&String> = current
            .resources
            .keys()
            .chain(desired.resources.keys())
            .collect();

        let actions = ids
            .into_iter()
            .filter_map(|id| match (current.get(id), desired.get(id)) {
                (None, Some(new)) => Some(action(ActionType::Create, new, "Create")),
                (Some(old), None) => Some(action(ActionType::Delete, old, "Delete")),
                (Some(old), Some(new)) => Some(compare(old, new)),
                (None, None) => None,
            })
            .collect();

        Self::new(actions)
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Actions other than no-op
    pub fn changes(&self) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type != ActionType::NoOp)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

fn action(action_type: ActionType, resource: &ResourceConfig, verb: &str) -> Action {
    Action {
        id: format!("{}:{}", action_type, resource.id),
        action_type,
        resource_type: resource.resource_type.clone(),
        resource_id: resource.id.clone(),
        description: format!("{verb} {} ({})", resource.id, resource.resource_type),
        details: BTreeMap::new(),
    }
}

fn compare(old: &ResourceConfig, new: &ResourceConfig) -> Action {
    let replacement = old.resource_type != new.resource_type;
    let changed_properties = changed_keys(&old.config, &new.config);
    let changed_attributes: Vec<String> = old
        .attributes
        .keys()
        .chain(new.attributes.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|k| old.attributes.get(*k) != new.attributes.get(*k))
        .cloned()
        .collect();

    if !replacement && changed_properties.is_empty() && changed_attributes.is_empty() {
        return action(ActionType::NoOp, new, "Keep");
    }

    let mut update = action(ActionType::Update, new, "Update");
    update
        .details
        .insert("replacement".to_string(), serde_json::json!(replacement));
    if replacement {
        update.details.insert(
            "previous_type".to_string(),
            serde_json::json!(old.resource_type),
        );
    }
    if !changed_properties.is_empty() {
        update.details.insert(
            "changed_properties".to_string(),
            serde_json::json!(changed_properties),
        );
    }
    if !changed_attributes.is_empty() {
        update.details.insert(
            "changed_attributes".to_string(),
            serde_json::json!(changed_attributes),
        );
    }
    update
}

/// Top-level property keys whose values differ
fn changed_keys(old: &serde_json::Value, new: &serde_json::Value) -> Vec<String> {
    match (old.as_object(), new.as_object()) {
        (Some(old), Some(new)) => old
            .keys()
            .chain(new.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|k| old.get(*k) != new.get(*k))
            .cloned()
            .collect(),
        _ if old != new => vec!["*".to_string()],
        _ => Vec::new(),
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}
