// Device path parsing
//
// Two forms are understood:
//
// - control paths such as `<Keyboard>/space` or `<Gamepad>/leftStick`
// - inline composites such as
//   `2DVector(mode=2,up=<Keyboard>/w,down=<Keyboard>/s,left=<Keyboard>/a,right=<Keyboard>/d)`

use super::InputError;
use std::fmt;

const COMPOSITE_PREFIX: &str = "2DVector(";

/// A single control on a device layout, e.g. `<Gamepad>/buttonSouth`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlPath {
    pub layout: String,
    pub control: String,
}

impl ControlPath {
    /// Parse a `<Layout>/control` path
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let invalid = |reason: &str| InputError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        let rest = trimmed
            .strip_prefix('<')
            .ok_or_else(|| invalid("expected '<Layout>' prefix"))?;
        let close = rest.find('>').ok_or_else(|| invalid("unterminated layout"))?;
        let layout = &rest[..close];
        if layout.is_empty() {
            return Err(invalid("empty layout"));
        }

        let control = rest[close + 1..]
            .strip_prefix('/')
            .ok_or_else(|| invalid("expected '/' after layout"))?;
        if control.is_empty() {
            return Err(invalid("empty control name"));
        }

        Ok(Self {
            layout: layout.to_string(),
            control: control.to_string(),
        })
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>/{}", self.layout, self.control)
    }
}

/// How the four directions of a composite are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
    /// Directions are digital and the result is normalized
    #[default]
    DigitalNormalized,
    /// Directions are digital, the result is left as is (then unit-clamped)
    Digital,
    /// Directions keep their analog magnitude
    Analog,
}

impl CompositeMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "0" | "digitalnormalized" => Some(Self::DigitalNormalized),
            "1" | "digital" => Some(Self::Digital),
            "2" | "analog" => Some(Self::Analog),
            _ => None,
        }
    }
}

/// Four controls folded into one two-axis value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Composite2D {
    pub mode: CompositeMode,
    pub up: Option<ControlPath>,
    pub down: Option<ControlPath>,
    pub left: Option<ControlPath>,
    pub right: Option<ControlPath>,
}

impl Composite2D {
    /// Iterate over the parts that are set
    pub fn parts(&self) -> impl Iterator<Item = &ControlPath> {
        [&self.up, &self.down, &self.left, &self.right]
            .into_iter()
            .flatten()
    }
}

/// A parsed device binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePath {
    Control(ControlPath),
    Composite(Composite2D),
}

impl DevicePath {
    /// Parse a raw binding string
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        if is_composite(raw) {
            parse_composite(raw).map(DevicePath::Composite)
        } else {
            ControlPath::parse(raw).map(DevicePath::Control)
        }
    }

    /// Layouts this binding reads from
    pub fn layouts(&self) -> Vec<&str> {
        match self {
            DevicePath::Control(path) => vec![path.layout.as_str()],
            DevicePath::Composite(composite) => {
                composite.parts().map(|part| part.layout.as_str()).collect()
            }
        }
    }
}

fn is_composite(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed
        .get(..COMPOSITE_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(COMPOSITE_PREFIX))
        && trimmed.ends_with(')')
}

fn parse_composite(raw: &str) -> Result<Composite2D, InputError> {
    let trimmed = raw.trim();
    let inner = &trimmed[COMPOSITE_PREFIX.len()..trimmed.len() - 1];
    let mut composite = Composite2D::default();

    for segment in inner.split(',') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }

        match key.to_ascii_lowercase().as_str() {
            "mode" => {
                composite.mode =
                    CompositeMode::parse(value).ok_or_else(|| InputError::InvalidPath {
                        path: raw.to_string(),
                        reason: format!("unknown composite mode '{}'", value),
                    })?;
            }
            "up" => composite.up = Some(ControlPath::parse(value)?),
            "down" => composite.down = Some(ControlPath::parse(value)?),
            "left" => composite.left = Some(ControlPath::parse(value)?),
            "right" => composite.right = Some(ControlPath::parse(value)?),
            other => log::debug!("Ignoring unknown composite part '{}' in '{}'", other, raw),
        }
    }

    if composite.parts().next().is_none() {
        return Err(InputError::InvalidPath {
            path: raw.to_string(),
            reason: "composite has no direction parts".to_string(),
        });
    }

    Ok(composite)
}

/// Collect every `<Layout>` referenced in a raw binding string
///
/// Works on the raw text so that malformed bindings still announce the
/// devices they expect.
pub fn referenced_layouts(raw: &str) -> Vec<String> {
    let mut layouts = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        match after.find('>') {
            Some(end) if end > 0 => {
                layouts.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            Some(end) => rest = &after[end + 1..],
            None => break,
        }
    }
    layouts
}
