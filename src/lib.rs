// Local multiplayer input routing
//
// Pairs physical devices with local players through a join protocol and
// routes each player's device signals to named actions through a stack of
// swappable contexts.

pub mod core;
pub mod engine;

pub use engine::driver::TickDriver;
pub use engine::input::{
    ActionBinding, ContextDefinition, InputConfiguration, InputContext, InputError,
    PairingAuthority, PlayerRouter, PlayerSlotConfig, VirtualDevices,
};
