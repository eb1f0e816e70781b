//! Integration tests for nexus — cross-registry flows that verify the
//! request→mutation→notification protocol end to end, without a live bus:
//! every registry publishes through a channel-backed notifier the tests can
//! read directly.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    use crate::bus::{Notifier, Outbound, subjects};
    use crate::protocol::{ErrorCode, FriendCode};
    use crate::protocol::packets::{PartyOnePlayerPacket, PartyTwoPlayerPacket};
    use crate::registry::friends::{FriendRegistry, FriendRequest};
    use crate::registry::invites::{INVITE_TTL, InviteRegistry};
    use crate::registry::parties::{DISCONNECT_GRACE, PartyRegistry};

    // ── Helpers ──────────────────────────────────────────────────

    struct Harness {
        friends: Arc<FriendRegistry>,
        parties: Arc<PartyRegistry>,
        invites: Arc<InviteRegistry>,
        rx: UnboundedReceiver<Outbound>,
    }

    /// Wire all three social registries onto a single observable queue, the
    /// way main wires them onto the bus publisher.
    fn harness() -> Harness {
        let (notifier, rx) = Notifier::channel("");
        let friends = FriendRegistry::new(notifier.clone());
        let parties = PartyRegistry::new(notifier.clone());
        let invites = InviteRegistry::new(parties.clone(), notifier);
        Harness {
            friends,
            parties,
            invites,
            rx,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(o) = rx.try_recv() {
            out.push(o);
        }
        out
    }

    fn subjects_of(out: &[Outbound]) -> Vec<&str> {
        out.iter().map(|o| o.subject.as_str()).collect()
    }

    fn friend_request(sender: Uuid, recipient: Uuid) -> FriendRequest {
        FriendRequest {
            sender,
            recipient,
            expiry: Utc::now() + chrono::Duration::seconds(60),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    //  1. Friend-request flows
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn friend_request_round_trip_preserves_pair() {
        let h = harness();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let (accepted, inverse, id) = h.friends.add_or_update(friend_request(a, b)).unwrap();
        assert!(accepted && !inverse);
        assert!(id.is_some());

        // The acceptance resolves to the exact request that was stored.
        let resolved = h.friends.accept(a, b).unwrap();
        assert_eq!((resolved.sender, resolved.recipient), (a, b));
        assert!(h.friends.get_all().is_empty());
    }

    #[tokio::test]
    async fn crossing_requests_collapse_into_one_acceptance() {
        let mut h = harness();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        h.friends.add_or_update(friend_request(a, b)).unwrap();
        h.friends.add_or_update(friend_request(b, a)).unwrap();

        let out = drain(&mut h.rx);
        assert_eq!(subjects_of(&out), vec![subjects::FRIENDS_ACCEPT_NOTIFY]);
        let body: FriendRequest = serde_json::from_slice(&out[0].payload).unwrap();
        assert_eq!((body.sender, body.recipient), (a, b), "first direction wins");
        assert!(h.friends.get_all().is_empty(), "no second request stored");
    }

    // ═══════════════════════════════════════════════════════════════
    //  2. Invite → party lifecycle
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn first_invite_bootstraps_party_and_acceptance_joins() {
        let mut h = harness();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let invite = h.invites.create_invite(a, None, b).unwrap();
        let party_id = invite.party_id;

        let party = h.parties.get_party_snapshot(party_id).unwrap();
        assert_eq!(party.current_leader, a);
        assert_eq!(party.active_invites.len(), 1);

        h.invites.accept(invite.id).unwrap();

        let party = h.parties.get_party_snapshot(party_id).unwrap();
        assert!(party.is_member(b));
        assert!(party.active_invites.is_empty());
        assert!(h.invites.get(invite.id).is_none());

        let out = drain(&mut h.rx);
        assert_eq!(
            subjects_of(&out),
            vec![subjects::PARTY_CREATE_NOTIFY, subjects::PARTY_JOIN_NOTIFY]
        );
        let join: PartyOnePlayerPacket = serde_json::from_slice(&out[1].payload).unwrap();
        assert_eq!(join.party_id, party_id);
        assert_eq!(join.player_id, b);
    }

    #[tokio::test]
    async fn leader_departure_promotes_first_moderator() {
        let mut h = harness();
        let a = Uuid::new_v4();
        let m = Uuid::new_v4();
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();

        // Build: leader a, moderator m, members [x, y].
        let party_id = {
            let invite = h.invites.create_invite(a, None, m).unwrap();
            h.invites.accept(invite.id).unwrap();
            for player in [x, y] {
                let invite = h.invites.create_invite(a, Some(invite.party_id), player).unwrap();
                h.invites.accept(invite.id).unwrap();
            }
            h.parties.promote(a, invite.party_id, m).unwrap();
            invite.party_id
        };
        drain(&mut h.rx);

        h.parties.leave_party(a).unwrap();

        let party = h.parties.get_party_snapshot(party_id).unwrap();
        assert_eq!(party.current_leader, m);
        assert!(party.moderators.is_empty());
        assert_eq!(party.members, vec![x, y]);

        let out = drain(&mut h.rx);
        assert_eq!(subjects_of(&out), vec![subjects::PARTY_TRANSFER_LEFT]);
        let transfer: PartyTwoPlayerPacket = serde_json::from_slice(&out[0].payload).unwrap();
        assert_eq!(transfer.sender_id, a);
        assert_eq!(transfer.player_id, m);
    }

    #[tokio::test]
    async fn kick_to_lone_leader_removes_party_everywhere() {
        let mut h = harness();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let invite = h.invites.create_invite(a, None, b).unwrap();
        h.invites.accept(invite.id).unwrap();
        drain(&mut h.rx);

        h.parties.kick(a, invite.party_id, b).unwrap();

        assert!(h.parties.get_party_snapshot(invite.party_id).is_none());
        assert_eq!(
            subjects_of(&drain(&mut h.rx)),
            vec![subjects::PARTY_KICK_NOTIFY, subjects::PARTY_DISBAND_EMPTY_NOTIFY]
        );
    }

    // ═══════════════════════════════════════════════════════════════
    //  3. Timers across registries
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_preserves_party_slot() {
        let mut h = harness();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let invite = h.invites.create_invite(a, None, b).unwrap();
        h.invites.accept(invite.id).unwrap();
        drain(&mut h.rx);

        h.parties.handle_disconnect(b).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        h.parties.handle_reconnect(b).unwrap();
        tokio::time::sleep(DISCONNECT_GRACE).await;

        assert!(h.parties.get_party_snapshot(invite.party_id).unwrap().is_member(b));
        let out = drain(&mut h.rx);
        assert_eq!(
            subjects_of(&out),
            vec![subjects::PARTY_STATUS_DISCONNECT, subjects::PARTY_STATUS_RECONNECT]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_invite_expiry_tears_down_fresh_party() {
        let mut h = harness();
        let a = Uuid::new_v4();

        let invite = h.invites.create_invite(a, None, Uuid::new_v4()).unwrap();
        drain(&mut h.rx);

        tokio::time::sleep(INVITE_TTL + Duration::from_secs(1)).await;

        assert!(h.invites.get(invite.id).is_none());
        assert!(h.parties.get_party_snapshot(invite.party_id).is_none());
        assert_eq!(
            subjects_of(&drain(&mut h.rx)),
            vec![subjects::PARTIES_INVITE_EXPIRE, subjects::PARTY_DISBAND_EMPTY_NOTIFY]
        );
    }

    // ═══════════════════════════════════════════════════════════════
    //  4. Broadcast failure
    // ═══════════════════════════════════════════════════════════════

    /// With the publisher gone, every notify fails: the operations report
    /// ERR_BROADCAST_FAILED, but the mutations themselves stand.
    #[tokio::test]
    async fn broadcast_failure_is_reported_without_rollback() {
        let h = harness();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let invite = h.invites.create_invite(a, None, b).unwrap();
        let party_id = invite.party_id;
        h.invites.accept(invite.id).unwrap();
        drop(h.rx);

        assert_eq!(
            h.parties.toggle_open(a, party_id, true),
            Err(ErrorCode::BroadcastFailed)
        );
        assert!(
            h.parties.get_party_snapshot(party_id).unwrap().open,
            "toggle applied despite the lost broadcast"
        );

        // The leave removes b, the now-lone-leader party disbands, and the
        // single combined failure is reported after both mutations ran.
        assert_eq!(h.parties.leave_party(b), Err(ErrorCode::BroadcastFailed));
        assert!(h.parties.get_party_snapshot(party_id).is_none());

        // Friends: the inverse fast-accept still consumes the older request.
        let (c, d) = (Uuid::new_v4(), Uuid::new_v4());
        h.friends.add_or_update(friend_request(c, d)).unwrap();
        let err = h.friends.add_or_update(friend_request(d, c)).unwrap_err();
        assert_eq!(err, FriendCode::BroadcastFailed);
        assert!(h.friends.get_all().is_empty());
    }

    // ═══════════════════════════════════════════════════════════════
    //  5. Cross-registry invariants
    // ═══════════════════════════════════════════════════════════════

    /// Run a battery of operations, then check the party invariants hold:
    /// disjoint role sets, single-party membership, synced invite views,
    /// and no empty party left behind.
    #[tokio::test]
    async fn invariants_hold_after_mixed_operations() {
        let mut h = harness();
        let players: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();

        // Party one: players[0] invites 1 and 2; 1 joins, gets promoted.
        let inv = h.invites.create_invite(players[0], None, players[1]).unwrap();
        let party_one = inv.party_id;
        h.invites.accept(inv.id).unwrap();
        h.parties.promote(players[0], party_one, players[1]).unwrap();
        let inv = h.invites.create_invite(players[0], Some(party_one), players[2]).unwrap();
        h.invites.accept(inv.id).unwrap();

        // Party two: players[3] invites 4; 4 joins; leadership transferred.
        let inv = h.invites.create_invite(players[3], None, players[4]).unwrap();
        let party_two = inv.party_id;
        h.invites.accept(inv.id).unwrap();
        h.parties.transfer(players[3], party_two, players[4]).unwrap();

        // A rejected cross-party join must change nothing.
        assert_eq!(
            h.parties.join_party(party_one, players[4], true),
            Err(ErrorCode::AlreadyInParty)
        );

        // Pending invite in party one for players[5].
        h.invites.create_invite(players[0], Some(party_one), players[5]).unwrap();

        let parties = h.parties.get_all_parties();
        assert_eq!(parties.len(), 2);

        for party in &parties {
            // Invariant: leader is in neither role list, lists are disjoint.
            assert!(!party.moderators.contains(&party.current_leader));
            assert!(!party.members.contains(&party.current_leader));
            for m in &party.moderators {
                assert!(!party.members.contains(m));
            }
            // Invariant: no empty party survives.
            assert!(party.occupancy() > 0);
            // Invariant: both invite views agree.
            for (id, invite) in &party.active_invites {
                assert_eq!(invite.id, *id);
                assert_eq!(invite.party_id, party.id);
                assert_eq!(h.invites.get(*id).unwrap().party_id, party.id);
            }
        }

        // Invariant: every player is in at most one party.
        for player in &players {
            let holding = parties.iter().filter(|p| p.is_in_party(*player)).count();
            assert!(holding <= 1, "player {player} is in {holding} parties");
        }

        // Invariant: at most one active invite per (party, recipient).
        let invites = h.invites.get_all();
        for invite in &invites {
            let dupes = invites
                .iter()
                .filter(|i| i.party_id == invite.party_id && i.recipient == invite.recipient)
                .count();
            assert_eq!(dupes, 1);
        }

        drain(&mut h.rx);
    }
}
