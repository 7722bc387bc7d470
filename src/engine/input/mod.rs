// Multi-player input routing
//
// Routes raw device signals to named, per-player actions. Devices are paired
// to players through a join protocol, and each joined player owns a router
// with a stack of swappable contexts (Gameplay, Menu, ...).
//
// ## Architecture
//
// - `config`: Immutable configuration model (slots, contexts, bindings)
// - `path`: Device path and `2DVector(...)` composite parsing
// - `device`: Device layer boundary and an in-memory implementation
// - `claims`: Which player owns which device
// - `stream` / `task`: Subscriptions, cancellation and tick-driven timers
// - `graph`: Compiled binding graph and typed event streams
// - `context`: Context registration and the context stack
// - `player`: Per-player router
// - `manager`: Pairing authority, the join protocol and hot-plug handling
// - `winit_bridge`: Feeds winit keyboard/mouse events into the device layer
//
// ## Usage Example
//
// ```rust
// use rusted_input::engine::input::{PairingAuthority, VirtualDevices};
//
// let devices = VirtualDevices::new();
// let mut authority = PairingAuthority::new(config, Box::new(devices.clone()))?;
// authority.start_listening(false);
//
// // Once per frame
// authority.tick(dt);
//
// if let Some(player) = authority.player_mut(0) {
//     player.push_context("Gameplay")?;
//     if let Some(jump) = player.button_stream("Jump") {
//         jump.subscribe(|_| log::info!("Jump!")).detach();
//     }
// }
// ```

pub mod action;
pub mod claims;
pub mod config;
pub mod context;
pub mod device;
pub mod graph;
pub mod long_press;
pub mod manager;
pub mod path;
pub mod player;
pub mod stream;
pub mod task;
pub mod winit_bridge;

// Re-export commonly used types
pub use action::{ActionKey, PlayerId, ValueKind};
pub use config::{ActionBinding, ContextDefinition, InputConfiguration, PlayerSlotConfig};
pub use context::InputContext;
pub use device::{
    ActiveDeviceKind, ControlValue, DeviceChange, DeviceChangeKind, DeviceHandle, DeviceId,
    DeviceKind, DeviceLayer, VirtualDevices,
};
pub use manager::{JoinProgress, JoinStatus, JoinTicket, PairingAuthority};
pub use player::PlayerRouter;
pub use stream::{Property, Stream, Subscription, SubscriptionBag};

/// Input routing errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("Player slot not found: {0}")]
    SlotNotFound(PlayerId),

    #[error("Player slot already occupied: {0}")]
    SlotOccupied(PlayerId),

    #[error("No free player slot")]
    NoFreeSlot,

    #[error("Unknown context: {0}")]
    UnknownContext(String),

    #[error("Device {device} is already claimed by player {owner}")]
    DeviceClaimed { device: DeviceId, owner: PlayerId },

    #[error("Device not connected: {0}")]
    DeviceNotConnected(DeviceId),

    #[error("No required devices available for player {0}")]
    NoDevicesAvailable(PlayerId),

    #[error("Timed out waiting for devices: {}", missing.join(", "))]
    Timeout { missing: Vec<String> },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Input system has been disposed")]
    Disposed,

    #[error("Invalid device path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
