//! Pending party invites with a fixed 60-second TTL. Invites live in two
//! views at once — this registry (keyed by invite id) and the target party's
//! `active_invites` — and every mutation keeps the two in sync.
//!
//! Lock order is always invite → party: operations here hold the invite lock
//! across their party-registry calls, and the party registry never calls
//! back into this one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{Notifier, subjects};
use crate::protocol::packets::PartyInviteExpirePacket;
use crate::protocol::{ErrorCode, InviteId, PartyId, PlayerId};
use crate::registry::parties::PartyDirectory;
use crate::registry::party::PartyInvite;

/// Invites expire 60 seconds after creation.
pub const INVITE_TTL: Duration = Duration::from_secs(60);

struct InviteState {
    invites: HashMap<InviteId, PartyInvite>,
    expiry_tokens: HashMap<InviteId, CancellationToken>,
}

pub struct InviteRegistry {
    inner: Mutex<InviteState>,
    parties: Arc<dyn PartyDirectory>,
    notifier: Notifier,
}

impl InviteRegistry {
    pub fn new(parties: Arc<dyn PartyDirectory>, notifier: Notifier) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(InviteState {
                invites: HashMap::new(),
                expiry_tokens: HashMap::new(),
            }),
            parties,
            notifier,
        })
    }

    /// Create an invite from `sender` to `recipient`. With no target party —
    /// neither given nor deducible from the sender — a fresh party is created
    /// lazily with the sender as leader and the invite already tracked.
    pub fn create_invite(
        self: &Arc<Self>,
        sender: PlayerId,
        party_id: Option<PartyId>,
        recipient: PlayerId,
    ) -> Result<PartyInvite, ErrorCode> {
        let mut state = self.inner.lock().unwrap();

        let resolved = party_id.or_else(|| self.parties.party_of(sender));

        if let Some(pid) = resolved {
            let party = self.parties.get_party(pid).ok_or(ErrorCode::InvalidParty)?;
            if party.is_in_party(recipient) {
                return Err(ErrorCode::AlreadyInParty);
            }
            if !party.open_invites && party.current_leader != sender {
                return Err(ErrorCode::NoPermission);
            }
            if state
                .invites
                .values()
                .any(|i| i.party_id == pid && i.recipient == recipient)
            {
                debug!(party_id = %pid, %recipient, "invite already pending");
                return Err(ErrorCode::AlreadyInvited);
            }

            let invite = self.store_invite(&mut state, pid, sender, recipient);
            self.parties.track_invite(pid, invite);
            info!(party_id = %pid, invite_id = %invite.id, %recipient, "party invite sent");
            return Ok(invite);
        }

        // First invite from a partyless player: the party comes into being
        // with the invite already pending. Party and invite both stand even
        // when the creation broadcast is reported lost.
        let pid = Uuid::new_v4();
        let invite = self.store_invite(&mut state, pid, sender, recipient);
        self.parties.create_party(pid, sender, invite)?;
        info!(party_id = %pid, invite_id = %invite.id, %recipient, "party created for first invite");
        Ok(invite)
    }

    /// Accept an invite: consume it from both views and admit the recipient.
    /// A second call for the same id fails without side effects.
    pub fn accept(&self, id: InviteId) -> Result<PartyInvite, ErrorCode> {
        let mut state = self.inner.lock().unwrap();

        let Some(invite) = remove_invite(&mut state, id) else {
            debug!(invite_id = %id, "attempted to accept unknown invite");
            return Err(ErrorCode::InvalidInvite);
        };

        if self.parties.get_party(invite.party_id).is_none() {
            // Stale: the party disbanded while the invite was in flight.
            debug!(invite_id = %id, party_id = %invite.party_id, "invite references a gone party");
            return Err(ErrorCode::StateMismatchService);
        }

        self.parties
            .join_party(invite.party_id, invite.recipient, true)
            .map_err(|e| match e {
                // The recipient's client thought it was partyless; we know
                // otherwise.
                ErrorCode::AlreadyInParty => ErrorCode::StateMismatchServer,
                other => other,
            })?;

        info!(invite_id = %id, party_id = %invite.party_id, "party invite accepted");
        Ok(invite)
    }

    /// Snapshot of all pending invites.
    pub fn get_all(&self) -> Vec<PartyInvite> {
        let state = self.inner.lock().unwrap();
        state.invites.values().copied().collect()
    }

    pub fn get(&self, id: InviteId) -> Option<PartyInvite> {
        let state = self.inner.lock().unwrap();
        state.invites.get(&id).copied()
    }

    fn store_invite(
        self: &Arc<Self>,
        state: &mut InviteState,
        party_id: PartyId,
        sender: PlayerId,
        recipient: PlayerId,
    ) -> PartyInvite {
        let invite = PartyInvite {
            id: Uuid::new_v4(),
            party_id,
            recipient,
            sender_id: sender,
            expiry: Utc::now() + chrono::Duration::seconds(INVITE_TTL.as_secs() as i64),
        };
        state.invites.insert(invite.id, invite);

        let token = CancellationToken::new();
        state.expiry_tokens.insert(invite.id, token.clone());
        let registry = Arc::clone(self);
        let id = invite.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(INVITE_TTL) => registry.expire_invite(id),
            }
        });

        invite
    }

    /// Timer path: drop the invite everywhere. The expiry notice is
    /// suppressed when the party no longer tracks the invite (it was already
    /// accepted or died with its party).
    fn expire_invite(&self, id: InviteId) {
        let mut state = self.inner.lock().unwrap();
        let Some(invite) = remove_invite(&mut state, id) else {
            return;
        };

        if !self.parties.remove_invite(invite.party_id, id) {
            return;
        }

        info!(invite_id = %id, party_id = %invite.party_id, "party invite expired");
        // Timer context: a lost expiry broadcast has no caller to report to.
        if !self.notifier.notify(
            subjects::PARTIES_INVITE_EXPIRE,
            &PartyInviteExpirePacket {
                request_id: id,
                party_id: invite.party_id,
                recipient: invite.recipient,
                sender_id: invite.sender_id,
            },
        ) {
            warn!(invite_id = %id, "expiry broadcast failed");
        }
    }
}

/// Remove an invite and cancel its expiry timer.
fn remove_invite(state: &mut InviteState, id: InviteId) -> Option<PartyInvite> {
    let invite = state.invites.remove(&id);
    if let Some(token) = state.expiry_tokens.remove(&id) {
        token.cancel();
    }
    invite
}
