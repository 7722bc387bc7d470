use anyhow::Result;
use log::info;
use rusted_input::engine::input::winit_bridge::KeyboardMouseBridge;
use rusted_input::engine::input::PlayerId;
use rusted_input::{
    ActionBinding, ContextDefinition, InputConfiguration, InputContext, InputError,
    PairingAuthority, PlayerRouter, PlayerSlotConfig, TickDriver, VirtualDevices,
};
use std::cell::RefCell;
use std::rc::Rc;
use winit::{
    event::{DeviceEvent, Event, WindowEvent},
    event_loop::EventLoop,
    window::WindowBuilder,
};

/// Context switches requested by commands, applied after the tick
#[derive(Debug, Clone, Copy)]
enum Request {
    OpenMenu(PlayerId),
    CloseMenu(PlayerId),
}

fn slot(player_id: PlayerId, join_paths: &[&str]) -> PlayerSlotConfig {
    PlayerSlotConfig::new(player_id, ActionBinding::button("Join", join_paths.iter().copied()))
        .with_context(
            ContextDefinition::new("Gameplay", "Player")
                .with_binding(
                    ActionBinding::button("Jump", ["<Keyboard>/space", "<Gamepad>/buttonSouth"])
                        .with_long_press_ms(500),
                )
                .with_binding(ActionBinding::vector2(
                    "Move",
                    [
                        "<Gamepad>/leftStick",
                        "2DVector(mode=0,up=<Keyboard>/w,down=<Keyboard>/s,left=<Keyboard>/a,right=<Keyboard>/d)",
                    ],
                ))
                .with_binding(ActionBinding::vector2("Look", ["<Mouse>/delta", "<Gamepad>/rightStick"]))
                .with_binding(ActionBinding::button("Pause", ["<Keyboard>/escape", "<Gamepad>/start"])),
        )
        .with_context(
            ContextDefinition::new("Menu", "UI")
                .with_binding(ActionBinding::button("Back", ["<Keyboard>/backspace", "<Gamepad>/buttonEast"])),
        )
}

fn demo_config() -> InputConfiguration {
    InputConfiguration::new(vec![
        slot(0, &["<Keyboard>/enter", "<Gamepad>/start"]),
        slot(1, &["<Gamepad>/start"]),
    ])
}

/// Commands a freshly joined player runs in each context
fn setup_player(
    player: &mut PlayerRouter,
    requests: &Rc<RefCell<Vec<Request>>>,
) -> Result<(), InputError> {
    let player_id = player.player_id();

    let pause = Rc::clone(requests);
    let gameplay = InputContext::new("Gameplay", "Player")
        .on_button("Jump", move || info!("Player {} jumped", player_id))
        .on_long_press("Jump", move || info!("Player {} charged a super jump", player_id))
        .on_vector2("Move", move |v| info!("Player {} moving ({:.2}, {:.2})", player_id, v.x, v.y))
        .on_button("Pause", move || pause.borrow_mut().push(Request::OpenMenu(player_id)));

    let back = Rc::clone(requests);
    let menu = InputContext::new("Menu", "UI")
        .on_button("Back", move || back.borrow_mut().push(Request::CloseMenu(player_id)));

    player.register_context(gameplay)?;
    player.register_context(menu)?;
    player.push_context("Gameplay")
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Starting input routing demo...");

    let devices = VirtualDevices::new();
    let mut bridge = KeyboardMouseBridge::new(&devices);
    let mut authority = PairingAuthority::new(demo_config(), Box::new(devices.clone()))?;
    authority.start_listening(false);

    let joined: Rc<RefCell<Vec<PlayerId>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&joined);
    authority
        .player_joined()
        .subscribe(move |id| sink.borrow_mut().push(*id))
        .detach();
    let requests: Rc<RefCell<Vec<Request>>> = Rc::new(RefCell::new(Vec::new()));

    let mut driver = TickDriver::default();

    // Create event loop and window
    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("Rusted Input - press Enter to join")
        .with_inner_size(winit::dpi::LogicalSize::new(800, 450))
        .build(&event_loop)?;

    info!("Window created, press Enter to join");

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    info!("Close requested, shutting down...");
                    authority.dispose();
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    bridge.process_keyboard_event(&event);
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    bridge.process_mouse_button(button, state);
                }
                WindowEvent::MouseWheel { delta, .. } => bridge.process_mouse_wheel(delta),
                WindowEvent::Focused(false) => bridge.release_all(),
                WindowEvent::RedrawRequested => {}
                _ => {}
            },
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => bridge.process_mouse_motion(delta.0, delta.1),
            Event::AboutToWait => {
                bridge.flush_motion();
                for _ in 0..driver.begin_frame() {
                    authority.tick(driver.timestep());
                }

                let new_players: Vec<PlayerId> = joined.borrow_mut().drain(..).collect();
                for player_id in new_players {
                    let Some(player) = authority.player_mut(player_id) else {
                        continue;
                    };
                    if let Err(err) = setup_player(player, &requests) {
                        log::error!("Failed to set up player {}: {}", player_id, err);
                    }
                }

                let pending: Vec<Request> = requests.borrow_mut().drain(..).collect();
                for request in pending {
                    match request {
                        Request::OpenMenu(id) => {
                            if let Some(player) = authority.player_mut(id) {
                                if let Err(err) = player.push_context("Menu") {
                                    log::error!("Player {}: {}", id, err);
                                }
                            }
                        }
                        Request::CloseMenu(id) => {
                            if let Some(player) = authority.player_mut(id) {
                                player.pop_context();
                            }
                        }
                    }
                }

                window.request_redraw();
            }
            _ => {}
        })
        .map_err(|e| anyhow::anyhow!("Event loop error: {}", e))?;

    Ok(())
}
