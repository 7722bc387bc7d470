// Input configuration model
//
// An immutable description of every player slot: how that player joins and
// which contexts (action maps) it can switch between. Field names follow the
// on-disk format so any serde deserializer can produce it.

use super::action::{infer_value_kind, PlayerId, ValueKind};
use super::path::referenced_layouts;
use super::InputError;
use crate::core::math::clamp01;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

/// Actuation threshold used for scalar long-press when none is configured
pub const DEFAULT_LONG_PRESS_THRESHOLD: f32 = 0.5;

/// One action and the raw device paths that drive it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBinding {
    /// Explicit value kind; inferred from the paths when absent
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_kind: Option<ValueKind>,

    #[serde(rename = "action")]
    pub action_name: String,

    #[serde(rename = "deviceBindings", default)]
    pub device_paths: Vec<String>,

    /// Long-press duration in milliseconds, 0 disables it
    #[serde(default)]
    pub long_press_ms: u32,

    /// Scalar actuation threshold for long-press, 0 means the default
    #[serde(rename = "longPressValueThreshold", default)]
    pub long_press_threshold: f32,
}

impl ActionBinding {
    /// Create a binding with an optional explicit kind
    pub fn new<I, S>(value_kind: Option<ValueKind>, action_name: &str, device_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            value_kind,
            action_name: action_name.to_string(),
            device_paths: device_paths.into_iter().map(Into::into).collect(),
            long_press_ms: 0,
            long_press_threshold: 0.0,
        }
    }

    /// Create a button binding
    pub fn button<I, S>(action_name: &str, device_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(ValueKind::Button), action_name, device_paths)
    }

    /// Create a two-axis binding
    pub fn vector2<I, S>(action_name: &str, device_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(ValueKind::Vector2), action_name, device_paths)
    }

    /// Create a scalar binding
    pub fn scalar<I, S>(action_name: &str, device_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(ValueKind::Scalar), action_name, device_paths)
    }

    /// Enable long-press after `ms` milliseconds
    pub fn with_long_press_ms(mut self, ms: u32) -> Self {
        self.long_press_ms = ms;
        self
    }

    /// Set the scalar long-press actuation threshold
    pub fn with_long_press_threshold(mut self, threshold: f32) -> Self {
        self.long_press_threshold = threshold;
        self
    }

    /// The explicit kind, or the inferred one
    pub fn resolved_kind(&self) -> ValueKind {
        self.value_kind
            .unwrap_or_else(|| infer_value_kind(&self.device_paths))
    }

    /// Long-press duration, if enabled
    pub fn long_press(&self) -> Option<Duration> {
        (self.long_press_ms > 0).then(|| Duration::from_millis(u64::from(self.long_press_ms)))
    }

    /// Scalar threshold with the default applied
    pub fn effective_threshold(&self) -> f32 {
        if self.long_press_threshold > 0.0 {
            clamp01(self.long_press_threshold)
        } else {
            DEFAULT_LONG_PRESS_THRESHOLD
        }
    }

    /// Layouts referenced by this binding's device paths
    pub fn layouts(&self) -> impl Iterator<Item = String> + '_ {
        self.device_paths
            .iter()
            .flat_map(|path| referenced_layouts(path))
    }
}

/// A named context and the action map it enables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDefinition {
    pub name: String,

    #[serde(rename = "actionMap")]
    pub map_id: String,

    #[serde(default)]
    pub bindings: Vec<ActionBinding>,
}

impl ContextDefinition {
    /// Create an empty context
    pub fn new(name: &str, map_id: &str) -> Self {
        Self {
            name: name.to_string(),
            map_id: map_id.to_string(),
            bindings: Vec::new(),
        }
    }

    /// Add a binding
    pub fn with_binding(mut self, binding: ActionBinding) -> Self {
        self.bindings.push(binding);
        self
    }
}

/// Template for one potential local player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSlotConfig {
    pub player_id: PlayerId,

    pub join_action: ActionBinding,

    #[serde(default)]
    pub contexts: Vec<ContextDefinition>,
}

impl PlayerSlotConfig {
    /// Create a slot with a join action and no contexts
    pub fn new(player_id: PlayerId, join_action: ActionBinding) -> Self {
        Self {
            player_id,
            join_action,
            contexts: Vec::new(),
        }
    }

    /// Add a context
    pub fn with_context(mut self, context: ContextDefinition) -> Self {
        self.contexts.push(context);
        self
    }

    /// Find a context by name
    pub fn context(&self, name: &str) -> Option<&ContextDefinition> {
        self.contexts.iter().find(|ctx| ctx.name == name)
    }

    /// Every layout referenced by this slot's context bindings
    pub fn required_layouts(&self) -> BTreeSet<String> {
        self.contexts
            .iter()
            .flat_map(|ctx| ctx.bindings.iter())
            .flat_map(ActionBinding::layouts)
            .collect()
    }

    /// Layouts referenced by the join action
    pub fn join_layouts(&self) -> BTreeSet<String> {
        self.join_action.layouts().collect()
    }
}

/// Root of the input configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfiguration {
    #[serde(default)]
    pub player_slots: Vec<PlayerSlotConfig>,
}

impl InputConfiguration {
    /// Create a configuration from player slots
    pub fn new(player_slots: Vec<PlayerSlotConfig>) -> Self {
        Self { player_slots }
    }

    /// Find the slot for a player
    pub fn slot(&self, player_id: PlayerId) -> Option<&PlayerSlotConfig> {
        self.player_slots
            .iter()
            .find(|slot| slot.player_id == player_id)
    }

    /// Raw paths of every slot's join action, deduplicated in slot order
    pub fn join_paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.player_slots
            .iter()
            .flat_map(|slot| slot.join_action.device_paths.iter())
            .filter(|path| seen.insert(path.as_str()))
            .cloned()
            .collect()
    }

    /// Check the structural invariants of the configuration
    pub fn validate(&self) -> Result<(), InputError> {
        let mut player_ids = HashSet::new();
        for slot in &self.player_slots {
            if !player_ids.insert(slot.player_id) {
                return Err(InputError::InvalidConfig(format!(
                    "player slot {} is defined twice",
                    slot.player_id
                )));
            }

            let mut context_names = HashSet::new();
            for ctx in &slot.contexts {
                if ctx.name.is_empty() {
                    return Err(InputError::InvalidConfig(format!(
                        "player slot {} has a context without a name",
                        slot.player_id
                    )));
                }
                if !context_names.insert(ctx.name.as_str()) {
                    return Err(InputError::InvalidConfig(format!(
                        "context '{}' is defined twice for player slot {}",
                        ctx.name, slot.player_id
                    )));
                }
                for binding in &ctx.bindings {
                    Self::validate_binding(slot.player_id, binding)?;
                }
            }
        }
        Ok(())
    }

    fn validate_binding(player_id: PlayerId, binding: &ActionBinding) -> Result<(), InputError> {
        if binding.action_name.is_empty() {
            return Err(InputError::InvalidConfig(format!(
                "player slot {} has an action without a name",
                player_id
            )));
        }
        if !(0.0..=1.0).contains(&binding.long_press_threshold) {
            return Err(InputError::InvalidConfig(format!(
                "action '{}' has a long-press threshold outside 0..=1",
                binding.action_name
            )));
        }
        Ok(())
    }
}
