// Per-player router
//
// Owns the compiled binding graph and the context stack of one joined player.
// Only the map of the context on top of the stack produces values.

use super::action::PlayerId;
use super::config::PlayerSlotConfig;
use super::context::{ContextStack, InputContext};
use super::device::{ActiveDeviceKind, DeviceHandle, DeviceKind, DeviceLayer};
use super::graph::{BindingGraph, BindingNode};
use super::stream::{Property, Stream};
use super::task::CancellationToken;
use super::InputError;
use glam::Vec2;
use std::collections::BTreeSet;
use std::time::Duration;

/// Input routing for a single joined player
pub struct PlayerRouter {
    player_id: PlayerId,

    graph: BindingGraph,

    contexts: ContextStack,

    /// Layouts referenced anywhere in the slot, used for hot-plug re-pairing
    required_layouts: BTreeSet<String>,

    /// Input production suspended without touching the stack
    blocked: bool,

    active_context: Property<Option<String>>,

    active_device_kind: Property<ActiveDeviceKind>,

    /// Cancels long-press timers on dispose
    token: CancellationToken,

    disposed: bool,
}

impl PlayerRouter {
    /// Build a router from a slot, registering every configured context
    pub fn new(player_id: PlayerId, slot: &PlayerSlotConfig, parent: &CancellationToken) -> Self {
        let token = parent.child_token();
        let graph = BindingGraph::build(slot, &token);

        let mut contexts = ContextStack::new();
        for definition in &slot.contexts {
            contexts.register(InputContext::new(&definition.name, &definition.map_id));
        }

        Self {
            player_id,
            graph,
            contexts,
            required_layouts: slot.required_layouts(),
            blocked: false,
            active_context: Property::new(None),
            active_device_kind: Property::new(ActiveDeviceKind::Unknown),
            token,
            disposed: false,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Register (or replace) a context and its commands
    ///
    /// Replacing the context on top of the stack re-attaches its commands.
    pub fn register_context(&mut self, context: InputContext) -> Result<(), InputError> {
        if self.disposed {
            return Err(InputError::Disposed);
        }
        if !self.graph.has_map(context.map_id()) {
            log::debug!(
                "Player {}: context '{}' uses map '{}' which has no bindings",
                self.player_id,
                context.name(),
                context.map_id()
            );
        }

        let name = context.name().to_string();
        self.contexts.register(context);
        if self.contexts.top_name() == Some(name.as_str()) {
            self.contexts.activate_top(&self.graph);
        }
        Ok(())
    }

    /// Make a registered context the live one
    pub fn push_context(&mut self, name: &str) -> Result<(), InputError> {
        if self.disposed {
            return Err(InputError::Disposed);
        }
        if !self.contexts.contains(name) {
            log::error!("Player {}: unknown context '{}'", self.player_id, name);
            return Err(InputError::UnknownContext(name.to_string()));
        }

        self.deactivate_top();
        self.contexts.push(name)?;
        self.activate_top();
        log::info!("Player {}: pushed context '{}'", self.player_id, name);
        Ok(())
    }

    /// Remove the top context and reactivate the one below, no-op when empty
    pub fn pop_context(&mut self) -> Option<String> {
        if self.disposed || self.contexts.depth() == 0 {
            return None;
        }

        self.deactivate_top();
        let popped = self.contexts.pop();
        self.activate_top();
        if let Some(name) = &popped {
            log::info!("Player {}: popped context '{}'", self.player_id, name);
        }
        popped
    }

    fn deactivate_top(&mut self) {
        if let Some(map) = self.contexts.top().map(|ctx| ctx.map_id().to_string()) {
            self.contexts.deactivate();
            self.graph.reset_map(&map);
        }
    }

    fn activate_top(&mut self) {
        self.contexts.activate_top(&self.graph);
        self.active_context
            .set(self.contexts.top_name().map(str::to_string));
    }

    /// Suspend input production, cancelling any in-flight press
    pub fn block_input(&mut self) {
        if self.blocked {
            return;
        }
        self.blocked = true;
        if let Some(map) = self.active_map().map(str::to_string) {
            self.graph.reset_map(&map);
        }
        log::debug!("Player {}: input blocked", self.player_id);
    }

    pub fn unblock_input(&mut self) {
        if self.blocked {
            self.blocked = false;
            log::debug!("Player {}: input unblocked", self.player_id);
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn active_context_name(&self) -> Option<String> {
        self.active_context.get()
    }

    /// Fires with the new top context name on every push and pop
    pub fn context_changes(&self) -> Stream<Option<String>> {
        self.active_context.changes()
    }

    /// Map id of the live context
    pub fn active_map(&self) -> Option<&str> {
        self.contexts.top().map(InputContext::map_id)
    }

    /// Stack contents, bottom first
    pub fn context_stack(&self) -> &[String] {
        self.contexts.names()
    }

    pub fn active_device_kind(&self) -> ActiveDeviceKind {
        self.active_device_kind.get()
    }

    pub fn device_kind_changes(&self) -> Stream<ActiveDeviceKind> {
        self.active_device_kind.changes()
    }

    fn lookup<F>(&self, map: Option<&str>, action: &str, accept: F) -> Option<&BindingNode>
    where
        F: Fn(&BindingNode) -> bool,
    {
        let found = match map {
            Some(map) => self.graph.find(map, action).filter(|node| accept(node)),
            None => self.graph.lookup(self.active_map(), action, accept),
        };
        if found.is_none() {
            log::debug!("Player {}: no stream for action '{}'", self.player_id, action);
        }
        found
    }

    /// Activation pulses of a button action
    pub fn button_stream(&self, action: &str) -> Option<Stream<()>> {
        self.lookup(None, action, |n| n.button_stream().is_some())
            .and_then(BindingNode::button_stream)
    }

    pub fn button_stream_in(&self, map: &str, action: &str) -> Option<Stream<()>> {
        self.lookup(Some(map), action, |n| n.button_stream().is_some())
            .and_then(BindingNode::button_stream)
    }

    /// `true` on press, `false` on release of a button action
    pub fn press_state_stream(&self, action: &str) -> Option<Stream<bool>> {
        self.lookup(None, action, |n| n.press_state_stream().is_some())
            .and_then(BindingNode::press_state_stream)
    }

    pub fn press_state_stream_in(&self, map: &str, action: &str) -> Option<Stream<bool>> {
        self.lookup(Some(map), action, |n| n.press_state_stream().is_some())
            .and_then(BindingNode::press_state_stream)
    }

    pub fn vector2_stream(&self, action: &str) -> Option<Stream<Vec2>> {
        self.lookup(None, action, |n| n.vector2_stream().is_some())
            .and_then(BindingNode::vector2_stream)
    }

    pub fn vector2_stream_in(&self, map: &str, action: &str) -> Option<Stream<Vec2>> {
        self.lookup(Some(map), action, |n| n.vector2_stream().is_some())
            .and_then(BindingNode::vector2_stream)
    }

    pub fn scalar_stream(&self, action: &str) -> Option<Stream<f32>> {
        self.lookup(None, action, |n| n.scalar_stream().is_some())
            .and_then(BindingNode::scalar_stream)
    }

    pub fn scalar_stream_in(&self, map: &str, action: &str) -> Option<Stream<f32>> {
        self.lookup(Some(map), action, |n| n.scalar_stream().is_some())
            .and_then(BindingNode::scalar_stream)
    }

    /// Fires once per press cycle held past the action's long-press duration
    pub fn long_press_stream(&self, action: &str) -> Option<Stream<()>> {
        self.lookup(None, action, BindingNode::has_long_press)
            .and_then(BindingNode::long_press_stream)
    }

    pub fn long_press_stream_in(&self, map: &str, action: &str) -> Option<Stream<()>> {
        self.lookup(Some(map), action, BindingNode::has_long_press)
            .and_then(BindingNode::long_press_stream)
    }

    /// Whether a button action is currently held
    pub fn is_pressed(&self, action: &str) -> bool {
        self.graph
            .lookup(self.active_map(), action, |n| n.press_state_stream().is_some())
            .is_some_and(BindingNode::is_active)
    }

    pub fn required_layouts(&self) -> &BTreeSet<String> {
        &self.required_layouts
    }

    pub fn graph(&self) -> &BindingGraph {
        &self.graph
    }

    /// Sample the paired devices for the live map
    pub fn tick(&mut self, now: Duration, layer: &dyn DeviceLayer, paired: &[DeviceHandle]) {
        if self.disposed || self.blocked {
            return;
        }
        let Some(map) = self.active_map().map(str::to_string) else {
            return;
        };

        if let Some(device) = self.graph.tick_map(&map, now, layer, paired) {
            let kind = DeviceKind::classify(&device.layout, layer);
            if self.active_device_kind.set(kind.into()) {
                log::debug!(
                    "Player {}: active device kind is now {:?}",
                    self.player_id,
                    self.active_device_kind.get()
                );
            }
        }
    }

    /// Cancel timers, release in-flight presses and drop every subscriber
    ///
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.token.cancel();
        self.graph.reset_all();
        self.contexts.clear();
        self.active_context.set(None);
        self.graph.close();
        self.active_context.changes().close();
        self.active_device_kind.changes().close();
        log::debug!("Player {}: router disposed", self.player_id);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for PlayerRouter {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::input::config::{ActionBinding, ContextDefinition};
    use crate::engine::input::device::VirtualDevices;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn slot() -> PlayerSlotConfig {
        PlayerSlotConfig::new(0, ActionBinding::button("Join", ["<Keyboard>/enter"]))
            .with_context(
                ContextDefinition::new("Gameplay", "Player")
                    .with_binding(
                        ActionBinding::button("Confirm", ["<Keyboard>/space", "<Gamepad>/buttonSouth"])
                            .with_long_press_ms(500),
                    )
                    .with_binding(ActionBinding::vector2("Move", ["<Gamepad>/leftStick"])),
            )
            .with_context(
                ContextDefinition::new("Menu", "UI")
                    .with_binding(ActionBinding::button("Confirm", ["<Keyboard>/enter"])),
            )
    }

    fn router() -> PlayerRouter {
        PlayerRouter::new(0, &slot(), &CancellationToken::new())
    }

    #[test]
    fn test_configured_contexts_are_registered() {
        let mut router = router();
        assert!(router.push_context("Gameplay").is_ok());
        assert!(router.push_context("Menu").is_ok());
        assert_eq!(router.context_stack(), ["Gameplay", "Menu"]);
    }

    #[test]
    fn test_push_unknown_context_leaves_state() {
        let mut router = router();
        router.push_context("Gameplay").unwrap();
        assert_eq!(
            router.push_context("Inventory"),
            Err(InputError::UnknownContext("Inventory".to_string()))
        );
        assert_eq!(router.active_context_name().as_deref(), Some("Gameplay"));
    }

    #[test]
    fn test_push_push_pop_restores_first() {
        let mut router = router();
        router.push_context("Gameplay").unwrap();
        router.push_context("Menu").unwrap();
        assert_eq!(router.active_map(), Some("UI"));

        assert_eq!(router.pop_context().as_deref(), Some("Menu"));
        assert_eq!(router.active_map(), Some("Player"));
        assert_eq!(router.pop_context().as_deref(), Some("Gameplay"));
        assert_eq!(router.active_map(), None);
        assert_eq!(router.pop_context(), None);
    }

    #[test]
    fn test_context_changes_stream() {
        let mut router = router();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = router
            .context_changes()
            .subscribe(move |name: &Option<String>| sink.borrow_mut().push(name.clone()));

        router.push_context("Gameplay").unwrap();
        router.push_context("Menu").unwrap();
        router.pop_context();
        router.pop_context();

        assert_eq!(
            *seen.borrow(),
            vec![
                Some("Gameplay".to_string()),
                Some("Menu".to_string()),
                Some("Gameplay".to_string()),
                None
            ]
        );
    }

    #[test]
    fn test_stream_lookup_prefers_active_map() {
        let mut router = router();
        let player_confirm = router.button_stream_in("Player", "Confirm").unwrap();
        let ui_confirm = router.button_stream_in("UI", "Confirm").unwrap();
        assert_eq!(player_confirm.subscriber_count(), 0);

        router.push_context("Menu").unwrap();
        let _sub = router.button_stream("Confirm").unwrap().subscribe(|_| {});
        assert_eq!(ui_confirm.subscriber_count(), 1);
        assert_eq!(player_confirm.subscriber_count(), 0);
    }

    #[test]
    fn test_fallback_without_active_context() {
        let router = router();
        assert!(router.button_stream("Confirm").is_some());
        assert!(router.vector2_stream("Move").is_some());
        assert!(router.long_press_stream("Confirm").is_some());
        assert!(router.scalar_stream("Move").is_none());
        assert!(router.button_stream("Missing").is_none());
        assert!(router.long_press_stream_in("UI", "Confirm").is_none());
    }

    #[test]
    fn test_only_active_map_produces_values() {
        let devices = VirtualDevices::new();
        let keyboard = devices.connect("Keyboard", "Keyboard");
        let paired = devices.devices();
        let mut router = router();
        let menu_presses = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&menu_presses);
        let _sub = router
            .button_stream_in("UI", "Confirm")
            .unwrap()
            .subscribe(move |_| *counter.borrow_mut() += 1);

        devices.set_button(keyboard, "enter", true);
        router.tick(ms(0), &devices, &paired);
        router.push_context("Gameplay").unwrap();
        router.tick(ms(16), &devices, &paired);
        assert_eq!(*menu_presses.borrow(), 0);

        router.push_context("Menu").unwrap();
        router.tick(ms(32), &devices, &paired);
        assert_eq!(*menu_presses.borrow(), 1);
        assert!(router.is_pressed("Confirm"));
    }

    #[test]
    fn test_push_cancels_in_flight_press() {
        let devices = VirtualDevices::new();
        let keyboard = devices.connect("Keyboard", "Keyboard");
        let paired = devices.devices();
        let mut router = router();
        router.push_context("Gameplay").unwrap();

        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        let _sub = router
            .press_state_stream("Confirm")
            .unwrap()
            .subscribe(move |v| sink.borrow_mut().push(*v));

        devices.set_button(keyboard, "space", true);
        router.tick(ms(0), &devices, &paired);
        router.push_context("Menu").unwrap();

        assert_eq!(*states.borrow(), vec![true, false]);
    }

    #[test]
    fn test_block_input() {
        let devices = VirtualDevices::new();
        let keyboard = devices.connect("Keyboard", "Keyboard");
        let paired = devices.devices();
        let mut router = router();
        router.push_context("Gameplay").unwrap();

        let pulses = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&pulses);
        let _sub = router
            .button_stream("Confirm")
            .unwrap()
            .subscribe(move |_| *counter.borrow_mut() += 1);

        router.block_input();
        devices.set_button(keyboard, "space", true);
        router.tick(ms(0), &devices, &paired);
        assert_eq!(*pulses.borrow(), 0);
        assert_eq!(router.active_context_name().as_deref(), Some("Gameplay"));

        router.unblock_input();
        router.tick(ms(16), &devices, &paired);
        assert_eq!(*pulses.borrow(), 1);
    }

    #[test]
    fn test_context_commands() {
        let devices = VirtualDevices::new();
        let pad = devices.connect("XInputController", "Pad");
        let paired = devices.devices();
        let mut router = router();

        let moves = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&moves);
        router
            .register_context(
                InputContext::new("Gameplay", "Player").on_vector2("Move", move |v| sink.borrow_mut().push(v)),
            )
            .unwrap();
        router.push_context("Gameplay").unwrap();

        devices.set_vector2(pad, "leftStick", Vec2::new(0.0, 1.0));
        router.tick(ms(0), &devices, &paired);
        router.pop_context();
        devices.set_vector2(pad, "leftStick", Vec2::new(1.0, 0.0));
        router.tick(ms(16), &devices, &paired);

        assert_eq!(*moves.borrow(), vec![Vec2::new(0.0, 1.0)]);
    }

    #[test]
    fn test_active_device_kind_follows_input() {
        let devices = VirtualDevices::new();
        let keyboard = devices.connect("Keyboard", "Keyboard");
        let pad = devices.connect("DualSenseGamepadHID", "Pad");
        let paired = devices.devices();
        let mut router = router();
        router.push_context("Gameplay").unwrap();
        assert_eq!(router.active_device_kind(), ActiveDeviceKind::Unknown);

        devices.set_button(pad, "buttonSouth", true);
        router.tick(ms(0), &devices, &paired);
        assert_eq!(router.active_device_kind(), ActiveDeviceKind::Gamepad);

        devices.release_all(pad);
        router.tick(ms(16), &devices, &paired);
        devices.set_button(keyboard, "space", true);
        router.tick(ms(32), &devices, &paired);
        assert_eq!(router.active_device_kind(), ActiveDeviceKind::KeyboardMouse);
    }

    #[test]
    fn test_dispose_mid_long_press() {
        let devices = VirtualDevices::new();
        let keyboard = devices.connect("Keyboard", "Keyboard");
        let paired = devices.devices();
        let mut router = router();
        router.push_context("Gameplay").unwrap();

        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        router
            .press_state_stream("Confirm")
            .unwrap()
            .subscribe(move |v| sink.borrow_mut().push(*v))
            .detach();
        let long_press = router.long_press_stream("Confirm").unwrap();

        devices.set_button(keyboard, "space", true);
        router.tick(ms(0), &devices, &paired);
        router.dispose();
        router.dispose();
        router.tick(ms(600), &devices, &paired);

        assert!(router.is_disposed());
        assert_eq!(*states.borrow(), vec![true, false]);
        assert!(long_press.is_closed());
        assert_eq!(router.push_context("Gameplay"), Err(InputError::Disposed));
    }
}
