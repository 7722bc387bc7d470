// Device layer boundary and an in-memory implementation
//
// The routing code never talks to hardware. It sees devices through the
// `DeviceLayer` trait: enumerate, read a control, drain hot-plug changes and
// compare layouts. `VirtualDevices` implements it in memory; it backs the
// tests and the winit demo, and is cheap to clone across threads.

use glam::Vec2;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque device identifier assigned by the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connected device as reported by the device layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: DeviceId,
    pub layout: String,
    pub name: String,
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.layout, self.id)
    }
}

/// Direction of a hot-plug notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChangeKind {
    Added,
    Removed,
}

/// A hot-plug notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChange {
    pub device: DeviceHandle,
    pub kind: DeviceChangeKind,
}

/// Raw value of a single control
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    Button(bool),
    Vector2(Vec2),
    Scalar(f32),
}

impl ControlValue {
    /// How far the control is actuated, 0 when at rest
    pub fn magnitude(&self) -> f32 {
        match *self {
            ControlValue::Button(pressed) => {
                if pressed {
                    1.0
                } else {
                    0.0
                }
            }
            ControlValue::Vector2(v) => v.length(),
            ControlValue::Scalar(value) => value.abs(),
        }
    }

    /// The two-axis value, if this control has one
    pub fn as_vec2(&self) -> Option<Vec2> {
        match *self {
            ControlValue::Vector2(v) => Some(v),
            _ => None,
        }
    }
}

/// Coarse device classification used for pairing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Keyboard,
    Pointer,
    Gamepad,
    Other,
}

impl DeviceKind {
    /// Classify a layout by its ancestry
    pub fn classify(layout: &str, layer: &dyn DeviceLayer) -> Self {
        if layer.is_layout_descendant_of(layout, "Keyboard") {
            DeviceKind::Keyboard
        } else if layer.is_layout_descendant_of(layout, "Pointer") {
            DeviceKind::Pointer
        } else if layer.is_layout_descendant_of(layout, "Gamepad") {
            DeviceKind::Gamepad
        } else {
            DeviceKind::Other
        }
    }

    /// The kind that is conventionally used together with this one
    pub fn companion(&self) -> Option<DeviceKind> {
        match self {
            DeviceKind::Keyboard => Some(DeviceKind::Pointer),
            DeviceKind::Pointer => Some(DeviceKind::Keyboard),
            _ => None,
        }
    }
}

/// The last device family a player used, for on-screen prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveDeviceKind {
    #[default]
    Unknown,
    KeyboardMouse,
    Gamepad,
    Other,
}

impl From<DeviceKind> for ActiveDeviceKind {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Keyboard | DeviceKind::Pointer => ActiveDeviceKind::KeyboardMouse,
            DeviceKind::Gamepad => ActiveDeviceKind::Gamepad,
            DeviceKind::Other => ActiveDeviceKind::Other,
        }
    }
}

/// Everything the router needs from the physical device layer
pub trait DeviceLayer {
    /// Currently connected devices, in a stable order
    fn devices(&self) -> Vec<DeviceHandle>;

    /// Look up a connected device
    fn device(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices().into_iter().find(|device| device.id == id)
    }

    /// Read the current value of a control, `None` if the device has no such control
    fn read_control(&self, id: DeviceId, control: &str) -> Option<ControlValue>;

    /// Take the hot-plug notifications queued since the last call
    fn drain_changes(&mut self) -> Vec<DeviceChange>;

    /// Whether `layout` is `target` or derives from it
    fn is_layout_descendant_of(&self, layout: &str, target: &str) -> bool;
}

/// Layout inheritance, e.g. `XInputController` derives from `Gamepad`
#[derive(Debug, Clone)]
pub struct LayoutTree {
    /// Lowercased layout name to parent layout name
    parents: HashMap<String, String>,
}

impl LayoutTree {
    /// Create an empty tree
    pub fn empty() -> Self {
        Self {
            parents: HashMap::new(),
        }
    }

    /// Register `layout` as deriving from `parent`
    pub fn register(&mut self, layout: &str, parent: &str) {
        self.parents
            .insert(layout.to_ascii_lowercase(), parent.to_string());
    }

    /// Whether `layout` is `target` or one of its descendants
    pub fn is_descendant_of(&self, layout: &str, target: &str) -> bool {
        let mut current = layout.to_ascii_lowercase();
        let target = target.to_ascii_lowercase();

        // Bounded walk so a cyclic registration cannot hang the driver
        for _ in 0..=self.parents.len() {
            if current == target {
                return true;
            }
            match self.parents.get(&current) {
                Some(parent) => current = parent.to_ascii_lowercase(),
                None => return false,
            }
        }
        false
    }
}

impl Default for LayoutTree {
    fn default() -> Self {
        let mut tree = Self::empty();
        tree.register("Mouse", "Pointer");
        tree.register("Pen", "Pointer");
        tree.register("Touchscreen", "Pointer");
        tree.register("XInputController", "Gamepad");
        tree.register("DualShockGamepad", "Gamepad");
        tree.register("DualSenseGamepadHID", "DualShockGamepad");
        tree.register("SwitchProControllerHID", "Gamepad");
        tree
    }
}

#[derive(Debug)]
struct VirtualDevice {
    handle: DeviceHandle,
    controls: HashMap<String, ControlValue>,
}

#[derive(Debug)]
struct VirtualState {
    next_id: u32,
    devices: Vec<VirtualDevice>,
    changes: VecDeque<DeviceChange>,
    layouts: LayoutTree,
}

/// In-memory device layer
///
/// Clones share the same devices, so a test (or a hot-plug thread) can keep
/// a handle while the authority owns another.
#[derive(Debug, Clone)]
pub struct VirtualDevices {
    inner: Arc<Mutex<VirtualState>>,
}

impl VirtualDevices {
    /// Create a device layer with the default layout tree and no devices
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VirtualState {
                next_id: 1,
                devices: Vec::new(),
                changes: VecDeque::new(),
                layouts: LayoutTree::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, VirtualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a custom layout
    pub fn register_layout(&self, layout: &str, parent: &str) {
        self.state().layouts.register(layout, parent);
    }

    /// Connect a new device and queue an `Added` notification
    pub fn connect(&self, layout: &str, name: &str) -> DeviceId {
        let mut state = self.state();
        let id = DeviceId(state.next_id);
        state.next_id += 1;

        let handle = DeviceHandle {
            id,
            layout: layout.to_string(),
            name: name.to_string(),
        };
        state.devices.push(VirtualDevice {
            handle: handle.clone(),
            controls: HashMap::new(),
        });
        state.changes.push_back(DeviceChange {
            device: handle,
            kind: DeviceChangeKind::Added,
        });
        id
    }

    /// Disconnect a device and queue a `Removed` notification
    ///
    /// Returns false if the device was not connected.
    pub fn disconnect(&self, id: DeviceId) -> bool {
        let mut state = self.state();
        let Some(index) = state.devices.iter().position(|d| d.handle.id == id) else {
            return false;
        };
        let device = state.devices.remove(index);
        state.changes.push_back(DeviceChange {
            device: device.handle,
            kind: DeviceChangeKind::Removed,
        });
        true
    }

    /// Set any control value
    pub fn set_control(&self, id: DeviceId, control: &str, value: ControlValue) {
        let mut state = self.state();
        match state.devices.iter_mut().find(|d| d.handle.id == id) {
            Some(device) => {
                device.controls.insert(control.to_string(), value);
            }
            None => log::warn!("Ignoring control write to unknown device {}", id),
        }
    }

    /// Press or release a button control
    pub fn set_button(&self, id: DeviceId, control: &str, pressed: bool) {
        self.set_control(id, control, ControlValue::Button(pressed));
    }

    /// Set a two-axis control
    pub fn set_vector2(&self, id: DeviceId, control: &str, value: Vec2) {
        self.set_control(id, control, ControlValue::Vector2(value));
    }

    /// Set a scalar control
    pub fn set_scalar(&self, id: DeviceId, control: &str, value: f32) {
        self.set_control(id, control, ControlValue::Scalar(value));
    }

    /// Return every control of a device to rest
    pub fn release_all(&self, id: DeviceId) {
        let mut state = self.state();
        if let Some(device) = state.devices.iter_mut().find(|d| d.handle.id == id) {
            device.controls.clear();
        }
    }

    /// Number of hot-plug notifications not yet drained
    pub fn pending_changes(&self) -> usize {
        self.state().changes.len()
    }
}

impl Default for VirtualDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLayer for VirtualDevices {
    fn devices(&self) -> Vec<DeviceHandle> {
        self.state()
            .devices
            .iter()
            .map(|device| device.handle.clone())
            .collect()
    }

    fn read_control(&self, id: DeviceId, control: &str) -> Option<ControlValue> {
        self.state()
            .devices
            .iter()
            .find(|device| device.handle.id == id)
            .and_then(|device| device.controls.get(control).copied())
    }

    fn drain_changes(&mut self) -> Vec<DeviceChange> {
        self.state().changes.drain(..).collect()
    }

    fn is_layout_descendant_of(&self, layout: &str, target: &str) -> bool {
        self.state().layouts.is_descendant_of(layout, target)
    }
}
