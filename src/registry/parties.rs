//! Party lifecycle: membership, roles, state toggles, leader succession,
//! disconnect grace, and the disband-on-empty policy. All mutations happen
//! under one lock; notifications are enqueued under that lock so per-party
//! ordering matches mutation order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{Notifier, subjects};
use crate::protocol::packets::{PartyOnePlayerPacket, PartyStateChangePacket, PartyTwoPlayerPacket};
use crate::protocol::{ErrorCode, InviteId, PartyId, PlayerId};
use crate::registry::party::{Party, PartyInvite, remove_uuid};

/// How long a disconnected player keeps their party slot.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(5 * 60);

/// The party capabilities the invite registry depends on. Keeping this a
/// narrow interface keeps ownership acyclic and lets invite tests run
/// against a stub.
pub trait PartyDirectory: Send + Sync {
    fn party_of(&self, player: PlayerId) -> Option<PartyId>;
    fn get_party(&self, id: PartyId) -> Option<Party>;
    /// Store a fresh party with the initial invite already tracked. The
    /// party exists even when the creation broadcast is reported lost.
    fn create_party(&self, id: PartyId, leader: PlayerId, invite: PartyInvite)
    -> Result<(), ErrorCode>;
    fn join_party(
        &self,
        party_id: PartyId,
        player: PlayerId,
        from_invite: bool,
    ) -> Result<(), ErrorCode>;
    fn track_invite(&self, party_id: PartyId, invite: PartyInvite);
    /// Returns whether the invite was still tracked; callers use this to
    /// suppress expiry notices for already-accepted invites.
    fn remove_invite(&self, party_id: PartyId, invite_id: InviteId) -> bool;
}

/// Why a player is being removed from their party. Selects the departure
/// notification and, for leader removal, the transfer subject.
#[derive(Debug, Clone, Copy)]
enum Departure {
    Left,
    Kicked { sender: PlayerId },
    Disconnected,
}

struct PartyState {
    parties: HashMap<PartyId, Party>,
    /// Pending disconnect-grace timers, cancel-on-reconnect.
    disconnect_timers: HashMap<PlayerId, CancellationToken>,
}

pub struct PartyRegistry {
    inner: Mutex<PartyState>,
    notifier: Notifier,
}

impl PartyRegistry {
    pub fn new(notifier: Notifier) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PartyState {
                parties: HashMap::new(),
                disconnect_timers: HashMap::new(),
            }),
            notifier,
        })
    }

    /// Enqueue a notification, surfacing a dead queue as the broadcast
    /// error the caller reports. The mutation that produced it stands.
    fn broadcast<T: serde::Serialize>(&self, subject: &str, payload: &T) -> Result<(), ErrorCode> {
        if self.notifier.notify(subject, payload) {
            Ok(())
        } else {
            Err(ErrorCode::BroadcastFailed)
        }
    }

    // ── Membership ──────────────────────────────────────────────────

    pub fn join_party(
        &self,
        party_id: PartyId,
        player: PlayerId,
        from_invite: bool,
    ) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();

        if state.parties.values().any(|p| p.is_in_party(player)) {
            return Err(ErrorCode::AlreadyInParty);
        }

        let party = state
            .parties
            .get_mut(&party_id)
            .ok_or(ErrorCode::InvalidParty)?;

        if from_invite {
            // Consume the player's invite if one is tracked; admin/bypass
            // joins legitimately arrive without one.
            let invite_id = party
                .active_invites
                .values()
                .find(|i| i.recipient == player)
                .map(|i| i.id);
            if let Some(id) = invite_id {
                party.active_invites.remove(&id);
            }
        } else if !party.open {
            return Err(ErrorCode::NoInvite);
        }

        party.members.push(player);
        info!(%party_id, %player, "player joined party");
        self.broadcast(
            subjects::PARTY_JOIN_NOTIFY,
            &PartyOnePlayerPacket {
                party_id,
                player_id: player,
            },
        )
    }

    pub fn leave_party(&self, player: PlayerId) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let party_id = party_of_locked(&state, player).ok_or(ErrorCode::NotInParty)?;
        self.remove_member_locked(&mut state, party_id, player, Departure::Left)
    }

    pub fn kick(
        &self,
        sender: PlayerId,
        party_id: PartyId,
        target: PlayerId,
    ) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let party = state
            .parties
            .get(&party_id)
            .ok_or(ErrorCode::InvalidParty)?;

        if party.current_leader != sender && !party.is_moderator(sender) {
            return Err(ErrorCode::NoKickPermission);
        }
        if target == party.current_leader {
            return Err(ErrorCode::CannotKickLeader);
        }
        if target == sender {
            return Err(ErrorCode::CannotKickSelf);
        }
        if !party.is_in_party(target) {
            return Err(ErrorCode::TargetNotInParty);
        }

        self.remove_member_locked(&mut state, party_id, target, Departure::Kicked { sender })
    }

    // ── Roles ───────────────────────────────────────────────────────

    pub fn promote(
        &self,
        sender: PlayerId,
        party_id: PartyId,
        target: PlayerId,
    ) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let party = state
            .parties
            .get_mut(&party_id)
            .ok_or(ErrorCode::InvalidParty)?;

        if party.current_leader != sender {
            return Err(ErrorCode::NotLeader);
        }
        if target == party.current_leader {
            return Err(ErrorCode::AlreadyLeader);
        }

        if party.is_moderator(target) {
            // Two-step swap: the moderator takes the lead, the old leader
            // steps down into the moderator list.
            remove_uuid(&mut party.moderators, target);
            let former = party.current_leader;
            party.current_leader = target;
            party.moderators.push(former);
            info!(%party_id, %target, "promoted moderator to leader");
            return self.broadcast(
                subjects::PARTY_PROMOTE_LEADER_NOTIFY,
                &PartyTwoPlayerPacket {
                    party_id,
                    player_id: target,
                    sender_id: sender,
                },
            );
        }

        if party.is_member(target) {
            remove_uuid(&mut party.members, target);
            party.moderators.push(target);
            info!(%party_id, %target, "promoted member to moderator");
            return self.broadcast(
                subjects::PARTY_PROMOTE_MODERATOR_NOTIFY,
                &PartyTwoPlayerPacket {
                    party_id,
                    player_id: target,
                    sender_id: sender,
                },
            );
        }

        Err(ErrorCode::TargetNotInParty)
    }

    pub fn transfer(
        &self,
        sender: PlayerId,
        party_id: PartyId,
        target: PlayerId,
    ) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let party = state
            .parties
            .get_mut(&party_id)
            .ok_or(ErrorCode::InvalidParty)?;

        if party.current_leader != sender {
            return Err(ErrorCode::NotLeader);
        }
        if target == sender {
            return Err(ErrorCode::AlreadyLeader);
        }
        if !party.is_in_party(target) {
            return Err(ErrorCode::TargetNotInParty);
        }

        party.remove_player(target);
        let former = party.current_leader;
        party.current_leader = target;
        party.moderators.push(former);

        info!(%party_id, %target, "party leadership transferred");
        self.broadcast(
            subjects::PARTY_TRANSFER_COMMAND,
            &PartyTwoPlayerPacket {
                party_id,
                player_id: target,
                sender_id: sender,
            },
        )
    }

    /// Self-promotion escape hatch: the caller seizes leadership of a party
    /// they already belong to. The displaced leader becomes a moderator.
    pub fn yoink(&self, sender: PlayerId, party_id: PartyId) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let party = state
            .parties
            .get_mut(&party_id)
            .ok_or(ErrorCode::InvalidParty)?;

        if party.current_leader == sender {
            return Err(ErrorCode::AlreadyLeader);
        }
        if !party.is_in_party(sender) {
            return Err(ErrorCode::NotInParty);
        }

        party.remove_player(sender);
        let former = party.current_leader;
        party.current_leader = sender;
        party.moderators.push(former);

        info!(%party_id, %sender, "party leadership yoinked");
        self.broadcast(
            subjects::PARTY_YOINK_NOTIFY,
            &PartyOnePlayerPacket {
                party_id,
                player_id: sender,
            },
        )
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub fn disband(&self, party_id: PartyId, sender: PlayerId) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let party = state
            .parties
            .get(&party_id)
            .ok_or(ErrorCode::InvalidParty)?;

        if party.current_leader != sender {
            return Err(ErrorCode::NotLeader);
        }

        state.parties.remove(&party_id);
        info!(%party_id, %sender, "party disbanded by leader");
        self.broadcast(
            subjects::PARTY_DISBAND_COMMAND_NOTIFY,
            &PartyOnePlayerPacket {
                party_id,
                player_id: sender,
            },
        )
    }

    // ── State toggles ───────────────────────────────────────────────

    pub fn toggle_open(
        &self,
        sender: PlayerId,
        party_id: PartyId,
        value: bool,
    ) -> Result<(), ErrorCode> {
        self.toggle(sender, party_id, value, subjects::PARTY_STATE_OPEN_NOTIFY, |p, v| {
            p.open = v;
        })
    }

    pub fn toggle_open_invites(
        &self,
        sender: PlayerId,
        party_id: PartyId,
        value: bool,
    ) -> Result<(), ErrorCode> {
        self.toggle(
            sender,
            party_id,
            value,
            subjects::PARTY_STATE_OPEN_INVITES_NOTIFY,
            |p, v| {
                p.open_invites = v;
            },
        )
    }

    pub fn toggle_mute(
        &self,
        sender: PlayerId,
        party_id: PartyId,
        value: bool,
    ) -> Result<(), ErrorCode> {
        self.toggle(sender, party_id, value, subjects::PARTY_STATE_MUTE_NOTIFY, |p, v| {
            p.muted = v;
        })
    }

    fn toggle(
        &self,
        sender: PlayerId,
        party_id: PartyId,
        value: bool,
        subject: &str,
        apply: impl FnOnce(&mut Party, bool),
    ) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let party = state
            .parties
            .get_mut(&party_id)
            .ok_or(ErrorCode::InvalidParty)?;

        if party.current_leader != sender {
            return Err(ErrorCode::NoPermission);
        }

        apply(party, value);
        self.broadcast(
            subject,
            &PartyStateChangePacket {
                party_id,
                player_id: sender,
                state: value,
            },
        )
    }

    // ── Presence ────────────────────────────────────────────────────

    /// Start the disconnect-grace countdown for a player in a party. The
    /// removal only happens if the timer outlives any reconnect; the timer
    /// is armed even when the status broadcast is lost.
    pub fn handle_disconnect(self: &Arc<Self>, player: PlayerId) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let Some(party_id) = party_of_locked(&state, player) else {
            return Ok(());
        };

        info!(%party_id, %player, "party member disconnected, starting grace timer");
        let broadcast = self.broadcast(
            subjects::PARTY_STATUS_DISCONNECT,
            &PartyOnePlayerPacket {
                party_id,
                player_id: player,
            },
        );

        let token = CancellationToken::new();
        if let Some(old) = state.disconnect_timers.insert(player, token.clone()) {
            old.cancel();
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(DISCONNECT_GRACE) => registry.disconnect_from_party(player),
            }
        });

        broadcast
    }

    /// Cancel a pending grace timer; the player kept their slot.
    pub fn handle_reconnect(&self, player: PlayerId) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        if let Some(token) = state.disconnect_timers.remove(&player) {
            token.cancel();
        }

        if let Some(party_id) = party_of_locked(&state, player) {
            info!(%party_id, %player, "party member reconnected within grace");
            return self.broadcast(
                subjects::PARTY_STATUS_RECONNECT,
                &PartyOnePlayerPacket {
                    party_id,
                    player_id: player,
                },
            );
        }
        Ok(())
    }

    /// Grace expired: run the full removal path. Timer context, so a lost
    /// broadcast can only be logged.
    fn disconnect_from_party(&self, player: PlayerId) {
        let mut state = self.inner.lock().unwrap();
        state.disconnect_timers.remove(&player);

        let Some(party_id) = party_of_locked(&state, player) else {
            return;
        };
        info!(%party_id, %player, "disconnect grace expired, removing from party");
        if let Err(code) =
            self.remove_member_locked(&mut state, party_id, player, Departure::Disconnected)
        {
            warn!(%party_id, %player, %code, "disconnect removal broadcast failed");
        }
    }

    // ── Invite tracking (called by the invite registry) ─────────────

    fn create_party_impl(
        &self,
        id: PartyId,
        leader: PlayerId,
        invite: PartyInvite,
    ) -> Result<(), ErrorCode> {
        let mut state = self.inner.lock().unwrap();
        let mut party = Party::new(id, leader);
        party.active_invites.insert(invite.id, invite);
        state.parties.insert(id, party);

        info!(party_id = %id, %leader, "party created");
        self.broadcast(
            subjects::PARTY_CREATE_NOTIFY,
            &PartyOnePlayerPacket {
                party_id: id,
                player_id: leader,
            },
        )
    }

    fn track_invite_impl(&self, party_id: PartyId, invite: PartyInvite) {
        let mut state = self.inner.lock().unwrap();
        match state.parties.get_mut(&party_id) {
            Some(party) => {
                party.active_invites.insert(invite.id, invite);
            }
            None => warn!(%party_id, "cannot track invite for unknown party"),
        }
    }

    fn remove_invite_impl(&self, party_id: PartyId, invite_id: InviteId) -> bool {
        let mut state = self.inner.lock().unwrap();
        let Some(party) = state.parties.get_mut(&party_id) else {
            return false;
        };
        let removed = party.active_invites.remove(&invite_id).is_some();
        if removed {
            debug!(%party_id, %invite_id, "invite removed from party");
            // Reached from the expiry timer; a lost disband broadcast has no
            // caller to report to.
            if let Err(code) = self.maybe_disband_empty_locked(&mut state, party_id) {
                warn!(%party_id, %code, "disband broadcast failed");
            }
        }
        removed
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get_all_parties(&self) -> Vec<Party> {
        let state = self.inner.lock().unwrap();
        state.parties.values().cloned().collect()
    }

    pub fn get_party_snapshot(&self, id: PartyId) -> Option<Party> {
        let state = self.inner.lock().unwrap();
        state.parties.get(&id).cloned()
    }

    // ── Internals ───────────────────────────────────────────────────

    /// The shared membership-shrink primitive: leaves, kicks, and expired
    /// disconnects all funnel through here. Handles leader succession and
    /// the disband-on-empty policy. The removal always completes; the first
    /// lost broadcast is reported after every mutation has run.
    fn remove_member_locked(
        &self,
        state: &mut PartyState,
        party_id: PartyId,
        player: PlayerId,
        departure: Departure,
    ) -> Result<(), ErrorCode> {
        let Some(party) = state.parties.get_mut(&party_id) else {
            return Ok(());
        };

        let result = if party.current_leader == player {
            let successor = party
                .moderators
                .first()
                .copied()
                .or_else(|| party.members.first().copied());
            match successor {
                Some(next) => {
                    party.remove_player(next);
                    party.current_leader = next;
                    let subject = match departure {
                        Departure::Left => subjects::PARTY_TRANSFER_LEFT,
                        Departure::Disconnected => subjects::PARTY_TRANSFER_DISCONNECTED,
                        Departure::Kicked { .. } => subjects::PARTY_TRANSFER_COMMAND,
                    };
                    info!(%party_id, old = %player, new = %next, "leader removed, successor chosen");
                    self.broadcast(
                        subject,
                        &PartyTwoPlayerPacket {
                            party_id,
                            player_id: next,
                            sender_id: player,
                        },
                    )
                }
                None => {
                    return self.disband_empty_locked(state, party_id);
                }
            }
        } else {
            party.remove_player(player);
            match departure {
                Departure::Left => self.broadcast(
                    subjects::PARTY_LEAVE_LEFT_NOTIFY,
                    &PartyOnePlayerPacket {
                        party_id,
                        player_id: player,
                    },
                ),
                Departure::Kicked { sender } => self.broadcast(
                    subjects::PARTY_KICK_NOTIFY,
                    &PartyTwoPlayerPacket {
                        party_id,
                        player_id: player,
                        sender_id: sender,
                    },
                ),
                Departure::Disconnected => self.broadcast(
                    subjects::PARTY_LEAVE_DISCONNECTED_NOTIFY,
                    &PartyOnePlayerPacket {
                        party_id,
                        player_id: player,
                    },
                ),
            }
        };

        let disband = self.maybe_disband_empty_locked(state, party_id);
        result.and(disband)
    }

    /// Disband the moment nothing but the leader remains and no invites are
    /// pending. This also catches the last pending invite expiring on a
    /// freshly-created party.
    fn maybe_disband_empty_locked(
        &self,
        state: &mut PartyState,
        party_id: PartyId,
    ) -> Result<(), ErrorCode> {
        let empty = state
            .parties
            .get(&party_id)
            .is_some_and(|p| p.occupancy() == 0);
        if empty {
            return self.disband_empty_locked(state, party_id);
        }
        Ok(())
    }

    fn disband_empty_locked(
        &self,
        state: &mut PartyState,
        party_id: PartyId,
    ) -> Result<(), ErrorCode> {
        state.parties.remove(&party_id);
        info!(%party_id, "party empty, disbanding");
        self.broadcast(
            subjects::PARTY_DISBAND_EMPTY_NOTIFY,
            &PartyOnePlayerPacket {
                party_id,
                player_id: Uuid::nil(),
            },
        )
    }
}

fn party_of_locked(state: &PartyState, player: PlayerId) -> Option<PartyId> {
    state
        .parties
        .values()
        .find(|p| p.is_in_party(player))
        .map(|p| p.id)
}

impl PartyDirectory for PartyRegistry {
    fn party_of(&self, player: PlayerId) -> Option<PartyId> {
        let state = self.inner.lock().unwrap();
        party_of_locked(&state, player)
    }

    fn get_party(&self, id: PartyId) -> Option<Party> {
        self.get_party_snapshot(id)
    }

    fn create_party(
        &self,
        id: PartyId,
        leader: PlayerId,
        invite: PartyInvite,
    ) -> Result<(), ErrorCode> {
        self.create_party_impl(id, leader, invite)
    }

    fn join_party(
        &self,
        party_id: PartyId,
        player: PlayerId,
        from_invite: bool,
    ) -> Result<(), ErrorCode> {
        PartyRegistry::join_party(self, party_id, player, from_invite)
    }

    fn track_invite(&self, party_id: PartyId, invite: PartyInvite) {
        self.track_invite_impl(party_id, invite);
    }

    fn remove_invite(&self, party_id: PartyId, invite_id: InviteId) -> bool {
        self.remove_invite_impl(party_id, invite_id)
    }
}
