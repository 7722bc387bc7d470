// Action identity and value kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// Player slot identifier (0 for the first local player)
pub type PlayerId = usize;

/// The kind of value an action produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueKind {
    /// Digital press/release with an activation pulse
    #[default]
    Button,
    /// Two-axis value such as a stick, d-pad, mouse delta or composite
    Vector2,
    /// Single analog value such as a trigger
    #[serde(alias = "Float")]
    Scalar,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Button => write!(f, "Button"),
            ValueKind::Vector2 => write!(f, "Vector2"),
            ValueKind::Scalar => write!(f, "Scalar"),
        }
    }
}

/// Routing key of a compiled action: the map it lives in plus its name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey {
    pub map: String,
    pub action: String,
}

impl ActionKey {
    /// Create a new action key
    pub fn new(map: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.map, self.action)
    }
}

/// Path fragments that mark a binding as two-axis
const VECTOR2_SIGNATURES: &[&str] = &["2DVector", "leftStick", "rightStick", "dpad"];

/// Path suffixes that mark a binding as two-axis
const VECTOR2_SUFFIXES: &[&str] = &["/delta"];

/// Path fragments that mark a binding as scalar
const SCALAR_SIGNATURES: &[&str] = &["Trigger"];

/// Guess a value kind from raw device paths
///
/// Compatibility fallback for configurations that leave the kind out.
/// Vector2 signatures win over scalar ones, and anything unrecognised is a
/// button.
pub fn infer_value_kind<S: AsRef<str>>(paths: &[S]) -> ValueKind {
    let looks_vector2 = paths.iter().map(AsRef::as_ref).any(|path| {
        VECTOR2_SIGNATURES.iter().any(|sig| path.contains(sig))
            || VECTOR2_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
    });
    if looks_vector2 {
        return ValueKind::Vector2;
    }

    let looks_scalar = paths
        .iter()
        .map(AsRef::as_ref)
        .any(|path| SCALAR_SIGNATURES.iter().any(|sig| path.contains(sig)));
    if looks_scalar {
        return ValueKind::Scalar;
    }

    ValueKind::Button
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_key_equality() {
        assert_eq!(ActionKey::new("Player", "Jump"), ActionKey::new("Player", "Jump"));
        assert_ne!(ActionKey::new("Player", "Jump"), ActionKey::new("UI", "Jump"));
    }

    #[test]
    fn test_action_key_display() {
        assert_eq!(ActionKey::new("UI", "Confirm").to_string(), "UI/Confirm");
    }

    #[test]
    fn test_infer_button_by_default() {
        assert_eq!(
            infer_value_kind(&["<Keyboard>/space", "<Gamepad>/buttonSouth"]),
            ValueKind::Button
        );
        assert_eq!(infer_value_kind::<&str>(&[]), ValueKind::Button);
    }

    #[test]
    fn test_infer_vector2_signatures() {
        assert_eq!(infer_value_kind(&["<Gamepad>/leftStick"]), ValueKind::Vector2);
        assert_eq!(infer_value_kind(&["<Gamepad>/dpad"]), ValueKind::Vector2);
        assert_eq!(infer_value_kind(&["<Mouse>/delta"]), ValueKind::Vector2);
        assert_eq!(
            infer_value_kind(&["2DVector(up=<Keyboard>/w,down=<Keyboard>/s)"]),
            ValueKind::Vector2
        );
    }

    #[test]
    fn test_infer_scalar_from_trigger() {
        assert_eq!(infer_value_kind(&["<Gamepad>/rightTrigger"]), ValueKind::Scalar);
    }

    #[test]
    fn test_vector2_wins_over_scalar() {
        let paths = ["<Gamepad>/leftTrigger", "<Gamepad>/rightStick"];
        assert_eq!(infer_value_kind(&paths), ValueKind::Vector2);
    }

    #[test]
    fn test_value_kind_deserializes_legacy_float() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: ValueKind,
        }
        let parsed: Wrapper = toml::from_str("kind = \"Float\"").unwrap();
        assert_eq!(parsed.kind, ValueKind::Scalar);
    }
}
