// Pairing authority - owns the join protocol and every player router
//
// Decides which device belongs to which player, creates a router per joined
// player and applies hot-plug changes. Everything runs inside `tick`, in a
// fixed order: device changes, pending joins, join listener, routers.

use super::action::PlayerId;
use super::claims::ClaimTable;
use super::config::{InputConfiguration, PlayerSlotConfig};
use super::device::{
    DeviceChangeKind, DeviceHandle, DeviceId, DeviceKind, DeviceLayer,
};
use super::graph::PRESS_POINT;
use super::path::{ControlPath, DevicePath};
use super::player::PlayerRouter;
use super::stream::Stream;
use super::task::{CancellationToken, TaskPoll, TickTask, Timer};
use super::InputError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

/// Handle to a join that is waiting for devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinTicket(u64);

/// Immediate outcome of a waited join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinProgress {
    Joined(PlayerId),
    Waiting(JoinTicket),
}

/// Current state of a waited join
#[derive(Debug, Clone, PartialEq)]
pub enum JoinStatus {
    Waiting { missing: Vec<String> },
    Joined(PlayerId),
    Failed(InputError),
}

/// A join signal that did not produce or extend a player
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRejection {
    pub device: DeviceId,
    pub error: InputError,
}

struct PendingJoin {
    ticket: JoinTicket,
    player_id: PlayerId,
    required: BTreeSet<String>,
    claimed: Vec<DeviceId>,
    timer: Timer,
}

/// Watches the union of every slot's join bindings for press edges
struct JoinListener {
    lock_single_device: bool,
    paths: Vec<ControlPath>,
    held: HashSet<DeviceId>,
}

impl JoinListener {
    fn new(lock_single_device: bool, config: &InputConfiguration) -> Self {
        let paths = config
            .join_paths()
            .iter()
            .filter_map(|raw| match DevicePath::parse(raw) {
                Ok(DevicePath::Control(path)) => Some(path),
                Ok(DevicePath::Composite(_)) => {
                    log::warn!("Ignoring composite join binding '{}'", raw);
                    None
                }
                Err(err) => {
                    log::error!("Ignoring join binding: {}", err);
                    None
                }
            })
            .collect();

        Self {
            lock_single_device,
            paths,
            held: HashSet::new(),
        }
    }

    /// Devices with any join control pressed, in device order
    fn pressed_devices(&self, layer: &dyn DeviceLayer) -> Vec<DeviceId> {
        layer
            .devices()
            .into_iter()
            .filter(|device| {
                self.paths.iter().any(|path| {
                    layer.is_layout_descendant_of(&device.layout, &path.layout)
                        && layer
                            .read_control(device.id, &path.control)
                            .is_some_and(|value| value.magnitude() >= PRESS_POINT)
                })
            })
            .map(|device| device.id)
            .collect()
    }

    /// Devices whose join control went down since the last poll
    fn poll(&mut self, layer: &dyn DeviceLayer) -> Vec<DeviceId> {
        let pressed = self.pressed_devices(layer);
        let edges = pressed
            .iter()
            .filter(|id| !self.held.contains(id))
            .copied()
            .collect();
        self.held = pressed.into_iter().collect();
        edges
    }
}

/// Whether any of `claimed` satisfies `layout`
fn covers(layer: &dyn DeviceLayer, claimed: &[DeviceId], layout: &str) -> bool {
    claimed
        .iter()
        .filter_map(|id| layer.device(*id))
        .any(|device| layer.is_layout_descendant_of(&device.layout, layout))
}

fn log_failure(operation: &str, player_id: PlayerId, err: &InputError) {
    match err {
        InputError::SlotNotFound(_) | InputError::InvalidConfig(_) => {
            log::error!("{} for player {} failed: {}", operation, player_id, err)
        }
        _ => log::warn!("{} for player {} failed: {}", operation, player_id, err),
    }
}

/// Owns device pairings and player routers
pub struct PairingAuthority {
    config: InputConfiguration,

    devices: Box<dyn DeviceLayer>,

    claims: ClaimTable,

    /// Joined players, ticked in id order
    players: BTreeMap<PlayerId, PlayerRouter>,

    listener: Option<JoinListener>,

    pending: Vec<PendingJoin>,

    /// Outcome of waited joins that are no longer pending
    finished: HashMap<JoinTicket, JoinStatus>,

    next_ticket: u64,

    /// Driver time, advanced by `tick`
    clock: Duration,

    token: CancellationToken,

    player_joined: Stream<PlayerId>,

    player_left: Stream<PlayerId>,

    join_rejections: Stream<JoinRejection>,

    disposed: bool,
}

impl PairingAuthority {
    /// Create an authority over a validated configuration
    pub fn new(config: InputConfiguration, devices: Box<dyn DeviceLayer>) -> Result<Self, InputError> {
        if let Err(err) = config.validate() {
            log::error!("Rejecting input configuration: {}", err);
            return Err(err);
        }
        log::info!(
            "Input system ready with {} player slots",
            config.player_slots.len()
        );

        Ok(Self {
            config,
            devices,
            claims: ClaimTable::new(),
            players: BTreeMap::new(),
            listener: None,
            pending: Vec::new(),
            finished: HashMap::new(),
            next_ticket: 1,
            clock: Duration::ZERO,
            token: CancellationToken::new(),
            player_joined: Stream::new(),
            player_left: Stream::new(),
            join_rejections: Stream::new(),
            disposed: false,
        })
    }

    fn ensure_live(&self) -> Result<(), InputError> {
        if self.disposed {
            Err(InputError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Start watching for join presses on unclaimed devices
    ///
    /// A second call replaces the previous listener. Buttons already held
    /// when listening starts do not count as a join.
    pub fn start_listening(&mut self, lock_single_device: bool) {
        if self.disposed {
            log::warn!("Ignoring start_listening on a disposed input system");
            return;
        }

        let mut listener = JoinListener::new(lock_single_device, &self.config);
        listener.held = listener
            .pressed_devices(self.devices.as_ref())
            .into_iter()
            .collect();
        let bindings = listener.paths.len();

        if self.listener.replace(listener).is_some() {
            log::debug!("Replacing previous join listener");
        }
        log::info!(
            "Listening for join signals on {} bindings (single device lock: {})",
            bindings,
            lock_single_device
        );
    }

    /// Returns true if a listener was active
    pub fn stop_listening(&mut self) -> bool {
        let stopped = self.listener.take().is_some();
        if stopped {
            log::info!("Stopped listening for join signals");
        }
        stopped
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    fn is_slot_taken(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
            || self.pending.iter().any(|join| join.player_id == player_id)
    }

    fn free_slot(&self, player_id: PlayerId) -> Result<&PlayerSlotConfig, InputError> {
        let slot = self
            .config
            .slot(player_id)
            .ok_or(InputError::SlotNotFound(player_id))?;
        if self.is_slot_taken(player_id) {
            return Err(InputError::SlotOccupied(player_id));
        }
        Ok(slot)
    }

    fn connected(&self, device: DeviceId) -> Result<DeviceHandle, InputError> {
        self.devices
            .device(device)
            .ok_or(InputError::DeviceNotConnected(device))
    }

    /// First free slot whose join binding matches the device kind, else the first free slot
    fn choose_slot(&self, kind: DeviceKind) -> Result<PlayerId, InputError> {
        let layer = self.devices.as_ref();
        let free: Vec<&PlayerSlotConfig> = self
            .config
            .player_slots
            .iter()
            .filter(|slot| !self.is_slot_taken(slot.player_id))
            .collect();

        free.iter()
            .find(|slot| {
                slot.join_layouts()
                    .iter()
                    .any(|layout| DeviceKind::classify(layout, layer) == kind)
            })
            .or_else(|| free.first())
            .map(|slot| slot.player_id)
            .ok_or(InputError::NoFreeSlot)
    }

    /// Claim a free keyboard for a pointer and the other way round
    fn bundle_companions(&mut self, player_id: PlayerId, claimed: &mut Vec<DeviceId>) {
        let layer = self.devices.as_ref();
        let devices = layer.devices();
        let kind_of = |id: DeviceId| {
            devices
                .iter()
                .find(|device| device.id == id)
                .map(|device| DeviceKind::classify(&device.layout, layer))
        };

        let kinds: Vec<DeviceKind> = claimed.iter().filter_map(|id| kind_of(*id)).collect();
        for kind in [DeviceKind::Keyboard, DeviceKind::Pointer] {
            let Some(companion) = kind.companion() else {
                continue;
            };
            if !kinds.contains(&kind) || kinds.contains(&companion) {
                continue;
            }
            let candidate = devices.iter().find(|device| {
                self.claims.is_free(device.id)
                    && DeviceKind::classify(&device.layout, layer) == companion
            });
            if let Some(device) = candidate {
                if self.claims.try_claim(device.id, player_id).is_ok() {
                    log::debug!("Bundled {} with player {}", device, player_id);
                    claimed.push(device.id);
                }
            }
        }
    }

    /// Claim one free device per layout not yet covered, returning the layouts still missing
    fn claim_for_layouts(
        &mut self,
        player_id: PlayerId,
        required: &BTreeSet<String>,
        claimed: &mut Vec<DeviceId>,
    ) -> Vec<String> {
        let layer = self.devices.as_ref();
        let devices = layer.devices();
        let mut missing = Vec::new();

        for layout in required {
            if covers(layer, claimed, layout) {
                continue;
            }
            let candidate = devices.iter().find(|device| {
                self.claims.is_free(device.id)
                    && layer.is_layout_descendant_of(&device.layout, layout)
            });
            match candidate {
                Some(device) if self.claims.try_claim(device.id, player_id).is_ok() => {
                    claimed.push(device.id);
                }
                _ => missing.push(layout.clone()),
            }
        }
        missing
    }

    fn create_player(&mut self, player_id: PlayerId) -> Result<PlayerId, InputError> {
        let slot = self
            .config
            .slot(player_id)
            .ok_or(InputError::SlotNotFound(player_id))?;
        let router = PlayerRouter::new(player_id, slot, &self.token);
        self.players.insert(player_id, router);

        let devices: Vec<String> = self
            .claims
            .devices_of(player_id)
            .into_iter()
            .map(|id| match self.devices.device(id) {
                Some(device) => device.to_string(),
                None => id.to_string(),
            })
            .collect();
        log::info!("Player {} joined with [{}]", player_id, devices.join(", "));

        self.player_joined.emit(&player_id);
        Ok(player_id)
    }

    /// Handle a join press from `device`
    pub fn handle_join_signal(&mut self, device: DeviceId) -> Result<PlayerId, InputError> {
        self.ensure_live()?;
        let handle = self.connected(device)?;
        if let Some(owner) = self.claims.holder(device) {
            return Err(InputError::DeviceClaimed { device, owner });
        }

        let lock_single_device = self
            .listener
            .as_ref()
            .is_some_and(|listener| listener.lock_single_device);

        let player_id = if lock_single_device {
            let first = self
                .config
                .player_slots
                .first()
                .map(|slot| slot.player_id)
                .ok_or(InputError::NoFreeSlot)?;
            if self.players.contains_key(&first) {
                self.claims.try_claim(device, first)?;
                let mut claimed = vec![device];
                self.bundle_companions(first, &mut claimed);
                log::info!("Added {} to player {}", handle, first);
                return Ok(first);
            }
            if self.is_slot_taken(first) {
                return Err(InputError::SlotOccupied(first));
            }
            first
        } else {
            let kind = DeviceKind::classify(&handle.layout, self.devices.as_ref());
            self.choose_slot(kind)?
        };

        self.claims.try_claim(device, player_id)?;
        let mut claimed = vec![device];
        self.bundle_companions(player_id, &mut claimed);
        self.create_player(player_id)
    }

    /// Join a player on one specific device
    pub fn join_explicit(&mut self, player_id: PlayerId, device: DeviceId) -> Result<PlayerId, InputError> {
        let result = self.try_join_explicit(player_id, device);
        if let Err(err) = &result {
            log_failure("Explicit join", player_id, err);
        }
        result
    }

    fn try_join_explicit(&mut self, player_id: PlayerId, device: DeviceId) -> Result<PlayerId, InputError> {
        self.ensure_live()?;
        self.free_slot(player_id)?;
        self.connected(device)?;
        self.claims.try_claim(device, player_id)?;
        self.create_player(player_id)
    }

    /// Join a player with every required device that is available right now
    pub fn join_single_player(&mut self, player_id: PlayerId) -> Result<PlayerId, InputError> {
        let result = self.try_join_single_player(player_id);
        if let Err(err) = &result {
            log_failure("Join", player_id, err);
        }
        result
    }

    fn try_join_single_player(&mut self, player_id: PlayerId) -> Result<PlayerId, InputError> {
        self.ensure_live()?;
        let required = self.free_slot(player_id)?.required_layouts();

        let mut claimed = Vec::new();
        let missing = self.claim_for_layouts(player_id, &required, &mut claimed);
        if claimed.is_empty() {
            return Err(InputError::NoDevicesAvailable(player_id));
        }
        self.bundle_companions(player_id, &mut claimed);
        if !missing.is_empty() {
            log::debug!("Player {} joined without [{}]", player_id, missing.join(", "));
        }
        self.create_player(player_id)
    }

    /// Join a player once every required layout has a device, or fail after `timeout`
    ///
    /// Devices available now are claimed immediately and held while waiting.
    /// On timeout or cancellation every partial claim is released.
    pub fn join_waiting_for_devices(
        &mut self,
        player_id: PlayerId,
        timeout: Duration,
    ) -> Result<JoinProgress, InputError> {
        let result = self.try_join_waiting(player_id, timeout);
        if let Err(err) = &result {
            log_failure("Waiting join", player_id, err);
        }
        result
    }

    fn try_join_waiting(&mut self, player_id: PlayerId, timeout: Duration) -> Result<JoinProgress, InputError> {
        self.ensure_live()?;
        let required = self.free_slot(player_id)?.required_layouts();
        if required.is_empty() {
            return Err(InputError::NoDevicesAvailable(player_id));
        }

        let mut claimed = Vec::new();
        let missing = self.claim_for_layouts(player_id, &required, &mut claimed);
        if missing.is_empty() {
            return self.create_player(player_id).map(JoinProgress::Joined);
        }

        let ticket = JoinTicket(self.next_ticket);
        self.next_ticket += 1;
        log::info!(
            "Player {} waiting up to {:?} for [{}]",
            player_id,
            timeout,
            missing.join(", ")
        );
        self.pending.push(PendingJoin {
            ticket,
            player_id,
            required,
            claimed,
            timer: Timer::new(self.clock, timeout, self.token.child_token()),
        });
        Ok(JoinProgress::Waiting(ticket))
    }

    /// State of a waited join, `None` for unknown tickets
    pub fn join_status(&self, ticket: JoinTicket) -> Option<JoinStatus> {
        if let Some(join) = self.pending.iter().find(|join| join.ticket == ticket) {
            let layer = self.devices.as_ref();
            let missing = join
                .required
                .iter()
                .filter(|layout| !covers(layer, &join.claimed, layout))
                .cloned()
                .collect();
            return Some(JoinStatus::Waiting { missing });
        }
        self.finished.get(&ticket).cloned()
    }

    /// Drop the stored outcome of a finished waited join
    ///
    /// Pending tickets are untouched. Returns the outcome that was dropped.
    pub fn forget_join(&mut self, ticket: JoinTicket) -> Option<JoinStatus> {
        self.finished.remove(&ticket)
    }

    /// Abandon a waited join, releasing its claims
    pub fn cancel_join(&mut self, ticket: JoinTicket) -> bool {
        let Some(index) = self.pending.iter().position(|join| join.ticket == ticket) else {
            return false;
        };
        let join = self.pending.remove(index);
        join.timer.cancel();
        self.claims.release_player(join.player_id);
        self.finished
            .insert(ticket, JoinStatus::Failed(InputError::Cancelled));
        log::info!("Cancelled waiting join for player {}", join.player_id);
        true
    }

    /// Pair a new player onto a device, sharing it with its current holders
    pub fn join_shared_device(&mut self, player_id: PlayerId, device: DeviceId) -> Result<PlayerId, InputError> {
        let result = self.try_join_shared(player_id, device);
        if let Err(err) = &result {
            log_failure("Shared join", player_id, err);
        }
        result
    }

    fn try_join_shared(&mut self, player_id: PlayerId, device: DeviceId) -> Result<PlayerId, InputError> {
        self.ensure_live()?;
        self.free_slot(player_id)?;
        self.connected(device)?;
        self.claims.share(device, player_id);
        self.create_player(player_id)
    }

    /// Remove a player and release its devices
    pub fn leave(&mut self, player_id: PlayerId) -> bool {
        let Some(mut router) = self.players.remove(&player_id) else {
            return false;
        };
        router.dispose();
        let released = self.claims.release_player(player_id);
        log::info!(
            "Player {} left, released {} devices",
            player_id,
            released.len()
        );
        self.player_left.emit(&player_id);
        true
    }

    /// Advance the input system by one driver tick
    pub fn tick(&mut self, dt: Duration) {
        if self.disposed {
            return;
        }
        self.clock += dt;
        self.apply_device_changes();
        self.advance_pending();
        self.poll_listener();
        self.tick_players();
    }

    fn apply_device_changes(&mut self) {
        for change in self.devices.drain_changes() {
            match change.kind {
                DeviceChangeKind::Added => self.on_device_added(&change.device),
                DeviceChangeKind::Removed => self.on_device_removed(&change.device),
            }
        }
    }

    fn on_device_added(&mut self, device: &DeviceHandle) {
        log::info!("Device connected: {}", device);
        let layer = self.devices.as_ref();
        if layer.device(device.id).is_none() {
            // Already gone again before this tick
            return;
        }

        // Waiting joins get first pick
        for join in self.pending.iter_mut() {
            let wanted = join.required.iter().any(|layout| {
                layer.is_layout_descendant_of(&device.layout, layout)
                    && !covers(layer, &join.claimed, layout)
            });
            if wanted && self.claims.try_claim(device.id, join.player_id).is_ok() {
                join.claimed.push(device.id);
                log::info!(
                    "Claimed {} for waiting player {}",
                    device,
                    join.player_id
                );
                return;
            }
        }

        for (player_id, router) in &self.players {
            let paired = self.claims.devices_of(*player_id);
            let wanted = router.required_layouts().iter().any(|layout| {
                layer.is_layout_descendant_of(&device.layout, layout)
                    && !covers(layer, &paired, layout)
            });
            if wanted && self.claims.try_claim(device.id, *player_id).is_ok() {
                log::info!("Re-paired {} with player {}", device, player_id);
                return;
            }
        }
    }

    fn on_device_removed(&mut self, device: &DeviceHandle) {
        for player_id in self.claims.release_device(device.id) {
            log::info!("Device {} disconnected from player {}", device, player_id);
        }
        for join in self.pending.iter_mut() {
            join.claimed.retain(|id| *id != device.id);
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.held.remove(&device.id);
        }
    }

    fn advance_pending(&mut self) {
        let now = self.clock;
        for mut join in std::mem::take(&mut self.pending) {
            let missing = self.claim_for_layouts(join.player_id, &join.required, &mut join.claimed);
            if missing.is_empty() {
                let status = match self.create_player(join.player_id) {
                    Ok(player_id) => JoinStatus::Joined(player_id),
                    Err(err) => {
                        self.claims.release_player(join.player_id);
                        JoinStatus::Failed(err)
                    }
                };
                self.finished.insert(join.ticket, status);
                continue;
            }

            match join.timer.poll(now) {
                TaskPoll::Pending => self.pending.push(join),
                TaskPoll::Ready(()) => {
                    let released = self.claims.release_player(join.player_id);
                    log::warn!(
                        "Player {} timed out waiting for [{}], released {} devices",
                        join.player_id,
                        missing.join(", "),
                        released.len()
                    );
                    self.finished.insert(
                        join.ticket,
                        JoinStatus::Failed(InputError::Timeout { missing }),
                    );
                }
                TaskPoll::Cancelled => {
                    self.claims.release_player(join.player_id);
                    self.finished
                        .insert(join.ticket, JoinStatus::Failed(InputError::Cancelled));
                }
            }
        }
    }

    fn poll_listener(&mut self) {
        let Some(listener) = self.listener.as_mut() else {
            return;
        };
        let edges = listener.poll(self.devices.as_ref());

        for device in edges {
            match self.handle_join_signal(device) {
                Ok(player_id) => log::debug!("Join signal from {} went to player {}", device, player_id),
                Err(error) => {
                    match &error {
                        InputError::DeviceClaimed { .. } => {
                            log::debug!("Ignoring join signal from {}: {}", device, error)
                        }
                        _ => log::warn!("Join signal from {} rejected: {}", device, error),
                    }
                    self.join_rejections.emit(&JoinRejection { device, error });
                }
            }
        }
    }

    fn tick_players(&mut self) {
        let layer = self.devices.as_ref();
        let now = self.clock;
        for (player_id, router) in self.players.iter_mut() {
            let paired: Vec<DeviceHandle> = self
                .claims
                .devices_of(*player_id)
                .into_iter()
                .filter_map(|id| layer.device(id))
                .collect();
            router.tick(now, layer, &paired);
        }
    }

    /// Tear everything down: fail pending joins, dispose routers, release devices
    ///
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.token.cancel();
        self.listener = None;

        for join in std::mem::take(&mut self.pending) {
            self.claims.release_player(join.player_id);
            self.finished
                .insert(join.ticket, JoinStatus::Failed(InputError::Cancelled));
        }

        for (player_id, mut router) in std::mem::take(&mut self.players) {
            router.dispose();
            self.claims.release_player(player_id);
            self.player_left.emit(&player_id);
        }

        self.player_joined.close();
        self.player_left.close();
        self.join_rejections.close();
        log::info!("Input system disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&PlayerRouter> {
        self.players.get(&player_id)
    }

    pub fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut PlayerRouter> {
        self.players.get_mut(&player_id)
    }

    /// Joined player ids in ascending order
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Devices held by a player or by its waiting join
    pub fn paired_devices(&self, player_id: PlayerId) -> Vec<DeviceId> {
        self.claims.devices_of(player_id)
    }

    pub fn claims(&self) -> &ClaimTable {
        &self.claims
    }

    /// Fires after a router is created
    pub fn player_joined(&self) -> Stream<PlayerId> {
        self.player_joined.clone()
    }

    /// Fires after a router is destroyed
    pub fn player_left(&self) -> Stream<PlayerId> {
        self.player_left.clone()
    }

    /// Join signals from the listener that were refused
    pub fn join_rejections(&self) -> Stream<JoinRejection> {
        self.join_rejections.clone()
    }

    pub fn config(&self) -> &InputConfiguration {
        &self.config
    }

    pub fn devices(&self) -> &dyn DeviceLayer {
        self.devices.as_ref()
    }

    /// Driver time accumulated by `tick`
    pub fn now(&self) -> Duration {
        self.clock
    }
}

impl Drop for PairingAuthority {
    fn drop(&mut self) {
        self.dispose();
    }
}
