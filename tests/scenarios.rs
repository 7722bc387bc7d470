// End-to-end input routing scenarios
//
// Drives a PairingAuthority over VirtualDevices with simulated ticks.

use rusted_input::engine::input::{
    DeviceId, InputError, JoinProgress, JoinStatus, PlayerId, Stream, Subscription,
};
use rusted_input::{
    ActionBinding, ContextDefinition, InputConfiguration, InputContext, PairingAuthority,
    PlayerSlotConfig, VirtualDevices,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(16);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gameplay() -> ContextDefinition {
    ContextDefinition::new("Gameplay", "Player")
        .with_binding(
            ActionBinding::button("Confirm", ["<Gamepad>/buttonSouth", "<Keyboard>/space"])
                .with_long_press_ms(500),
        )
        .with_binding(ActionBinding::button("Fire", ["<Mouse>/leftButton"]))
}

fn menu() -> ContextDefinition {
    ContextDefinition::new("Menu", "UI")
        .with_binding(ActionBinding::button("Select", ["<Keyboard>/space", "<Gamepad>/buttonSouth"]))
}

/// Two slots that both accept a keyboard or a gamepad
fn config() -> InputConfiguration {
    let slot = |player_id: PlayerId| {
        PlayerSlotConfig::new(
            player_id,
            ActionBinding::button("Join", ["<Keyboard>/enter", "<Gamepad>/start"]),
        )
        .with_context(gameplay())
        .with_context(menu())
    };
    InputConfiguration::new(vec![slot(0), slot(1)])
}

fn new_authority(config: InputConfiguration) -> (PairingAuthority, VirtualDevices) {
    init_logging();
    let devices = VirtualDevices::new();
    let authority = PairingAuthority::new(config, Box::new(devices.clone()))
        .expect("valid configuration");
    (authority, devices)
}

fn record<T: Clone + 'static>(stream: &Stream<T>) -> (Rc<RefCell<Vec<T>>>, Subscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let sub = stream.subscribe(move |value: &T| sink.borrow_mut().push(value.clone()));
    (seen, sub)
}

fn tick_for(authority: &mut PairingAuthority, duration: Duration) {
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        authority.tick(TICK);
        elapsed += TICK;
    }
}

/// Every device is held by at most one player
fn assert_no_double_claim(authority: &PairingAuthority, devices: &[DeviceId]) {
    let mut owners: BTreeMap<DeviceId, Vec<PlayerId>> = BTreeMap::new();
    for player_id in [0, 1] {
        for device in authority.paired_devices(player_id) {
            owners.entry(device).or_default().push(player_id);
        }
    }
    for device in devices {
        let count = owners.get(device).map_or(0, Vec::len);
        assert!(count <= 1, "{} paired with {:?}", device, owners.get(device));
    }
}

#[test]
fn test_no_device_is_claimed_twice() {
    let (mut authority, devices) = new_authority(config());
    let keyboard = devices.connect("Keyboard", "Keyboard");
    let mouse = devices.connect("Mouse", "Mouse");
    let pad = devices.connect("DualShockGamepad", "Pad");
    let all = [keyboard, mouse, pad];
    authority.tick(TICK);

    let _ = authority.handle_join_signal(keyboard);
    assert_no_double_claim(&authority, &all);
    let _ = authority.handle_join_signal(mouse);
    assert_no_double_claim(&authority, &all);
    let _ = authority.join_explicit(1, keyboard);
    assert_no_double_claim(&authority, &all);
    let _ = authority.join_waiting_for_devices(1, Duration::from_millis(50));
    assert_no_double_claim(&authority, &all);
    let _ = authority.join_single_player(0);
    assert_no_double_claim(&authority, &all);

    authority.leave(0);
    let _ = authority.handle_join_signal(keyboard);
    assert_no_double_claim(&authority, &all);
    tick_for(&mut authority, Duration::from_millis(100));
    assert_no_double_claim(&authority, &all);

    // Player 1 timed out and gave its pad back
    assert!(authority.claims().is_free(pad));
    assert_eq!(authority.claims().holder(keyboard), Some(0));
}

#[test]
fn test_push_push_pop_leaves_first_context_live() {
    let (mut authority, devices) = new_authority(config());
    let keyboard = devices.connect("Keyboard", "Keyboard");
    authority.tick(TICK);
    authority.join_explicit(0, keyboard).unwrap();

    let confirms = Rc::new(RefCell::new(0));
    let selects = Rc::new(RefCell::new(0));
    {
        let player = authority.player_mut(0).unwrap();
        let sink = Rc::clone(&confirms);
        player
            .register_context(
                InputContext::new("Gameplay", "Player")
                    .on_button("Confirm", move || *sink.borrow_mut() += 1),
            )
            .unwrap();
        let sink = Rc::clone(&selects);
        player
            .register_context(
                InputContext::new("Menu", "UI").on_button("Select", move || *sink.borrow_mut() += 1),
            )
            .unwrap();

        player.push_context("Gameplay").unwrap();
        player.push_context("Menu").unwrap();
        assert_eq!(player.pop_context(), Some("Menu".to_string()));
        assert_eq!(player.active_context_name(), Some("Gameplay".to_string()));
    }

    devices.set_button(keyboard, "space", true);
    authority.tick(TICK);

    assert_eq!(*confirms.borrow(), 1);
    assert_eq!(*selects.borrow(), 0);
}

#[test]
fn test_long_press_fires_once_per_press_cycle() {
    let (mut authority, devices) = new_authority(config());
    let pad = devices.connect("Gamepad", "Pad");
    authority.tick(TICK);
    authority.join_explicit(0, pad).unwrap();
    authority.player_mut(0).unwrap().push_context("Gameplay").unwrap();

    let stream = authority.player(0).unwrap().long_press_stream("Confirm").unwrap();
    let (fired, _sub) = record(&stream);

    // Released before the threshold
    devices.set_button(pad, "buttonSouth", true);
    tick_for(&mut authority, Duration::from_millis(300));
    devices.set_button(pad, "buttonSouth", false);
    authority.tick(TICK);
    assert_eq!(fired.borrow().len(), 0);

    // Held well past the threshold
    devices.set_button(pad, "buttonSouth", true);
    tick_for(&mut authority, Duration::from_millis(1500));
    assert_eq!(fired.borrow().len(), 1);
    devices.set_button(pad, "buttonSouth", false);
    authority.tick(TICK);

    // A fresh press can fire again
    devices.set_button(pad, "buttonSouth", true);
    tick_for(&mut authority, Duration::from_millis(600));
    assert_eq!(fired.borrow().len(), 2);
}

#[test]
fn test_duplicate_bindings_merge_into_one_node() {
    let context = ContextDefinition::new("Gameplay", "Player")
        .with_binding(ActionBinding::button("Confirm", ["<Keyboard>/space"]))
        .with_binding(ActionBinding::button("Confirm", ["<Gamepad>/buttonSouth", "<Keyboard>/space"]));
    let config = InputConfiguration::new(vec![PlayerSlotConfig::new(
        0,
        ActionBinding::button("Join", ["<Keyboard>/enter"]),
    )
    .with_context(context)]);

    let (mut authority, devices) = new_authority(config);
    let pad = devices.connect("Gamepad", "Pad");
    authority.tick(TICK);
    authority.join_explicit(0, pad).unwrap();

    let graph = authority.player(0).unwrap().graph();
    let confirm: Vec<_> = graph
        .nodes()
        .filter(|node| node.key().action == "Confirm")
        .collect();
    assert_eq!(confirm.len(), 1);
    assert_eq!(
        confirm[0].raw_paths(),
        &["<Keyboard>/space".to_string(), "<Gamepad>/buttonSouth".to_string()]
    );
}

#[test]
fn test_keyboard_join_bundles_free_pointer() {
    let (mut authority, devices) = new_authority(config());
    let keyboard = devices.connect("Keyboard", "Keyboard");
    let mouse = devices.connect("Mouse", "Mouse");
    authority.tick(TICK);

    assert_eq!(authority.handle_join_signal(keyboard), Ok(0));
    assert_eq!(authority.paired_devices(0), vec![keyboard, mouse]);
}

#[test]
fn test_waited_join_timeout_releases_everything() {
    let context = ContextDefinition::new("Gameplay", "Player")
        .with_binding(ActionBinding::button("Confirm", ["<Keyboard>/space", "<Gamepad>/buttonSouth"]));
    let config = InputConfiguration::new(vec![PlayerSlotConfig::new(
        0,
        ActionBinding::button("Join", ["<Keyboard>/enter"]),
    )
    .with_context(context)]);

    let (mut authority, devices) = new_authority(config);
    let keyboard = devices.connect("Keyboard", "Keyboard");
    authority.tick(TICK);

    let progress = authority
        .join_waiting_for_devices(0, Duration::from_millis(100))
        .unwrap();
    let JoinProgress::Waiting(ticket) = progress else {
        panic!("expected the join to wait for a gamepad");
    };
    assert_eq!(authority.paired_devices(0), vec![keyboard]);

    tick_for(&mut authority, Duration::from_millis(200));

    assert_eq!(
        authority.join_status(ticket),
        Some(JoinStatus::Failed(InputError::Timeout {
            missing: vec!["Gamepad".to_string()]
        }))
    );
    assert!(authority.paired_devices(0).is_empty());
    assert_eq!(authority.claims().claimed_count(), 0);
    assert!(authority.player(0).is_none());
}

#[test]
fn test_keyboard_join_then_long_press_scenario() {
    let single = InputConfiguration::new(vec![PlayerSlotConfig::new(
        0,
        ActionBinding::button("Join", ["<Keyboard>/enter", "<Gamepad>/start"]),
    )
    .with_context(gameplay())]);
    let (mut authority, devices) = new_authority(single);
    let keyboard = devices.connect("Keyboard", "Keyboard");
    let mouse = devices.connect("Mouse", "Mouse");
    authority.start_listening(false);
    authority.tick(TICK);

    devices.set_button(keyboard, "enter", true);
    authority.tick(TICK);
    devices.set_button(keyboard, "enter", false);
    authority.tick(TICK);

    assert_eq!(authority.player_ids(), vec![0]);
    assert_eq!(authority.paired_devices(0), vec![keyboard, mouse]);

    let player = authority.player_mut(0).unwrap();
    player.push_context("Gameplay").unwrap();

    // Record both streams into one timeline
    let timeline = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&timeline);
    let _press = player
        .press_state_stream("Confirm")
        .unwrap()
        .subscribe(move |pressed| sink.borrow_mut().push(format!("press:{}", pressed)));
    let sink = Rc::clone(&timeline);
    let _long = player
        .long_press_stream("Confirm")
        .unwrap()
        .subscribe(move |_| sink.borrow_mut().push("long".to_string()));

    devices.set_button(keyboard, "space", true);
    tick_for(&mut authority, Duration::from_millis(600));
    devices.set_button(keyboard, "space", false);
    authority.tick(TICK);

    assert_eq!(*timeline.borrow(), vec!["press:true", "long", "press:false"]);
}

#[test]
fn test_simultaneous_join_signals_make_one_player() {
    let config = InputConfiguration::new(vec![
        PlayerSlotConfig::new(0, ActionBinding::button("Join", ["<Keyboard>/enter"]))
            .with_context(gameplay()),
        PlayerSlotConfig::new(1, ActionBinding::button("Join", ["<Mouse>/leftButton"]))
            .with_context(gameplay()),
    ]);
    let (mut authority, devices) = new_authority(config);
    let keyboard = devices.connect("Keyboard", "Keyboard");
    let mouse = devices.connect("Mouse", "Mouse");
    authority.start_listening(false);
    authority.tick(TICK);

    let (rejections, _sub) = record(&authority.join_rejections());
    let (joined, _joined_sub) = record(&authority.player_joined());

    devices.set_button(keyboard, "enter", true);
    devices.set_button(mouse, "leftButton", true);
    authority.tick(TICK);

    assert_eq!(*joined.borrow(), vec![0]);
    assert_eq!(authority.player_count(), 1);
    let rejections = rejections.borrow();
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].device, mouse);
    assert_eq!(
        rejections[0].error,
        InputError::DeviceClaimed { device: mouse, owner: 0 }
    );
}

#[test]
fn test_unplugged_pad_is_replaced_mid_game() {
    let (mut authority, devices) = new_authority(config());
    let pad = devices.connect("XInputController", "Pad");
    authority.tick(TICK);
    authority.join_explicit(1, pad).unwrap();
    authority.player_mut(1).unwrap().push_context("Gameplay").unwrap();

    let (presses, _sub) = record(&authority.player(1).unwrap().button_stream("Confirm").unwrap());

    // Unplugged from another thread, seen on the next tick
    let remote = devices.clone();
    std::thread::spawn(move || {
        remote.disconnect(pad);
    })
    .join()
    .unwrap();
    authority.tick(TICK);
    assert!(authority.paired_devices(1).is_empty());

    let replacement = devices.connect("DualSenseGamepadHID", "Replacement");
    authority.tick(TICK);
    assert_eq!(authority.paired_devices(1), vec![replacement]);

    devices.set_button(replacement, "buttonSouth", true);
    authority.tick(TICK);
    assert_eq!(presses.borrow().len(), 1);
}

#[test]
fn test_dispose_tears_down_every_player() {
    let (mut authority, devices) = new_authority(config());
    let keyboard = devices.connect("Keyboard", "Keyboard");
    let pad = devices.connect("Gamepad", "Pad");
    authority.tick(TICK);
    authority.join_explicit(0, keyboard).unwrap();
    authority.join_explicit(1, pad).unwrap();

    let (left, _sub) = record(&authority.player_left());
    authority.dispose();

    assert_eq!(*left.borrow(), vec![0, 1]);
    assert_eq!(authority.claims().claimed_count(), 0);
    assert_eq!(authority.handle_join_signal(pad), Err(InputError::Disposed));
    authority.tick(TICK);
}
