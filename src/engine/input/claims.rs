// Device pairings
//
// A device is either free, exclusively owned by one player, or shared by a
// set of players (split keyboard). Exclusive claims never overlap.

use super::action::PlayerId;
use super::device::DeviceId;
use super::InputError;
use std::collections::{BTreeSet, HashMap};

/// Claim relation between devices and players
#[derive(Debug, Default)]
pub struct ClaimTable {
    owners: HashMap<DeviceId, PlayerId>,
    shared: HashMap<DeviceId, BTreeSet<PlayerId>>,
}

impl ClaimTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive owner of a device
    pub fn owner(&self, device: DeviceId) -> Option<PlayerId> {
        self.owners.get(&device).copied()
    }

    /// Owner, or the lowest shared member
    pub fn holder(&self, device: DeviceId) -> Option<PlayerId> {
        self.owner(device).or_else(|| {
            self.shared
                .get(&device)
                .and_then(|members| members.iter().next().copied())
        })
    }

    /// Whether nobody holds the device, exclusively or shared
    pub fn is_free(&self, device: DeviceId) -> bool {
        !self.owners.contains_key(&device) && !self.shared.contains_key(&device)
    }

    /// Whether `player` holds the device in any way
    pub fn is_held_by(&self, device: DeviceId, player: PlayerId) -> bool {
        self.owner(device) == Some(player)
            || self
                .shared
                .get(&device)
                .is_some_and(|members| members.contains(&player))
    }

    /// Claim a device exclusively
    ///
    /// Check and claim happen in one step, so two claims for the same device
    /// in the same tick cannot both succeed.
    pub fn try_claim(&mut self, device: DeviceId, player: PlayerId) -> Result<(), InputError> {
        if let Some(owner) = self.holder(device) {
            return Err(InputError::DeviceClaimed { device, owner });
        }
        self.owners.insert(device, player);
        Ok(())
    }

    /// Add `player` to the shared membership of a device
    ///
    /// An exclusive owner is moved into the shared set, so the device stays
    /// with both players.
    pub fn share(&mut self, device: DeviceId, player: PlayerId) {
        let members = self.shared.entry(device).or_default();
        if let Some(owner) = self.owners.remove(&device) {
            members.insert(owner);
        }
        members.insert(player);
    }

    /// Drop a device from every pairing, returning the players that held it
    pub fn release_device(&mut self, device: DeviceId) -> Vec<PlayerId> {
        let mut players: BTreeSet<PlayerId> = self.owners.remove(&device).into_iter().collect();
        if let Some(members) = self.shared.remove(&device) {
            players.extend(members);
        }
        players.into_iter().collect()
    }

    /// Release every claim of a player, returning the devices it held
    pub fn release_player(&mut self, player: PlayerId) -> Vec<DeviceId> {
        let mut released = BTreeSet::new();

        self.owners.retain(|device, owner| {
            if *owner == player {
                released.insert(*device);
                false
            } else {
                true
            }
        });

        self.shared.retain(|device, members| {
            if members.remove(&player) {
                released.insert(*device);
            }
            !members.is_empty()
        });

        released.into_iter().collect()
    }

    /// Every device a player holds, sorted by id
    pub fn devices_of(&self, player: PlayerId) -> Vec<DeviceId> {
        let mut devices: BTreeSet<DeviceId> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == player)
            .map(|(device, _)| *device)
            .collect();
        devices.extend(
            self.shared
                .iter()
                .filter(|(_, members)| members.contains(&player))
                .map(|(device, _)| *device),
        );
        devices.into_iter().collect()
    }

    /// Number of devices held by anyone
    pub fn claimed_count(&self) -> usize {
        self.owners.len() + self.shared.len()
    }
}
