//! Party and party-invite models. Role sets are disjoint by construction:
//! the leader never appears in `moderators` or `members`, and a player holds
//! exactly one role within a party.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{InviteId, PartyId, PlayerId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    /// Can change at any time; never use it as a key. Not in `members`.
    pub current_leader: PlayerId,
    /// Not included in `members`, just like the leader.
    pub moderators: Vec<PlayerId>,
    /// All standard members. The leader and moderators are not in this list.
    pub members: Vec<PlayerId>,
    /// Anyone may join without an invite.
    pub open: bool,
    /// Non-leader members may send invites.
    pub open_invites: bool,
    /// No one can speak except moderators.
    pub muted: bool,
    /// Keyed by invite id; mirrors the invite registry's view.
    pub active_invites: HashMap<InviteId, PartyInvite>,
}

impl Party {
    pub fn new(id: PartyId, leader: PlayerId) -> Self {
        Self {
            id,
            current_leader: leader,
            moderators: Vec::new(),
            members: Vec::new(),
            open: false,
            open_invites: false,
            muted: false,
            active_invites: HashMap::new(),
        }
    }

    pub fn is_in_party(&self, player: PlayerId) -> bool {
        self.current_leader == player || self.is_moderator(player) || self.is_member(player)
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    pub fn is_moderator(&self, player: PlayerId) -> bool {
        self.moderators.contains(&player)
    }

    /// Leader + moderators + members + pending invites.
    pub fn total_size(&self) -> usize {
        1 + self.occupancy()
    }

    /// Everything except the leader. A party at zero occupancy is disbanded.
    pub fn occupancy(&self) -> usize {
        self.moderators.len() + self.members.len() + self.active_invites.len()
    }

    /// Drop a player from whichever role list holds them, preserving order.
    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        remove_uuid(&mut self.moderators, player) || remove_uuid(&mut self.members, player)
    }
}

/// A pending, time-limited offer to join a party.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyInvite {
    pub id: InviteId,
    pub party_id: PartyId,
    pub recipient: PlayerId,
    /// A moderator, or anyone if `open_invites` is enabled.
    pub sender_id: PlayerId,
    pub expiry: DateTime<Utc>,
}

/// Remove the first occurrence, preserving order. Returns whether anything
/// was removed.
pub fn remove_uuid(seq: &mut Vec<PlayerId>, player: PlayerId) -> bool {
    match seq.iter().position(|p| *p == player) {
        Some(idx) => {
            seq.remove(idx);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn roles_are_checked_across_all_three_sets() {
        let leader = Uuid::new_v4();
        let moderator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let outsider = Uuid::new_v4();

        let mut party = Party::new(Uuid::new_v4(), leader);
        party.moderators.push(moderator);
        party.members.push(member);

        assert!(party.is_in_party(leader));
        assert!(party.is_in_party(moderator));
        assert!(party.is_in_party(member));
        assert!(!party.is_in_party(outsider));

        assert!(party.is_moderator(moderator));
        assert!(!party.is_member(moderator));
    }

    #[test]
    fn total_size_counts_invites() {
        let mut party = Party::new(Uuid::new_v4(), Uuid::new_v4());
        party.members.push(Uuid::new_v4());
        let invite = PartyInvite {
            id: Uuid::new_v4(),
            party_id: party.id,
            recipient: Uuid::new_v4(),
            sender_id: party.current_leader,
            expiry: Utc::now(),
        };
        party.active_invites.insert(invite.id, invite);

        assert_eq!(party.total_size(), 3);
        assert_eq!(party.occupancy(), 2);
    }

    #[test]
    fn remove_uuid_preserves_order_of_remaining() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut seq = vec![a, b, c];

        assert!(remove_uuid(&mut seq, b));
        assert_eq!(seq, vec![a, c]);
        assert!(!remove_uuid(&mut seq, b));
    }
}
