//! Catalog of every subject the service owns, plus the environment-prefix
//! helpers. Subjects are stored unprefixed; the deployment tag (e.g. `dev`,
//! `prod`) is applied at the bus boundary.

// ── Inbound request subjects ────────────────────────────────────────

pub const SERVERS_REGISTER: &str = "servers.register";
pub const SERVERS_SHUTDOWN: &str = "servers.shutdown";
pub const SERVERS_LIST: &str = "servers.list";
pub const SERVERS_PROXY_STARTUP: &str = "servers.proxy.startup";
pub const SERVERS_CREATE: &str = "servers.create";
pub const SERVERS_DELETE: &str = "servers.delete";
pub const SERVERS_DELETE_ALL: &str = "servers.delete.all";
pub const SERVERS_UPDATE: &str = "servers.update";

pub const FRIENDS_REQUEST: &str = "friends.request";
pub const FRIENDS_ACCEPT: &str = "friends.accept";
pub const FRIENDS_ACCEPT_BY_ID: &str = "friends.accept.by_id";
pub const FRIENDS_DECLINE: &str = "friends.decline";
pub const FRIENDS_DECLINE_BY_ID: &str = "friends.decline.by_id";

pub const PARTY_INVITES_SEND: &str = "party.invites.send";
pub const PARTY_INVITES_ACCEPT: &str = "party.invites.accept";
pub const PARTY_DISBAND_REQUEST: &str = "party.disband.request";
/// Wildcard: the terminal segment `bypass` skips the open-party check.
pub const PARTY_JOIN_REQUEST: &str = "party.join.request.*";
pub const PARTY_LEAVE_REQUEST: &str = "party.leave.request";
pub const PARTY_PROMOTE_REQUEST: &str = "party.promote.request";
pub const PARTY_TRANSFER_REQUEST: &str = "party.transfer.request";
pub const PARTY_KICK_REQUEST: &str = "party.kick.request";
pub const PARTY_YOINK_REQUEST: &str = "party.yoink.request";
/// Wildcard: the third segment selects the toggle (`mute`, `open`, `open_invites`).
pub const PARTY_STATE_REQUEST: &str = "party.state.*.request";
pub const PARTY_FETCH_REQUEST: &str = "party.fetch.request";

pub const PLAYERS_CONNECT: &str = "players.connect";
pub const PLAYERS_DISCONNECT: &str = "players.disconnect";

/// Per-server health probe; the server id is appended.
pub const HEALTH_CHECK: &str = "health.check";

// ── Outbound notification subjects ──────────────────────────────────

pub const FRIENDS_REQUEST_NOTIFY: &str = "friends.request.notify";
pub const FRIENDS_ACCEPT_NOTIFY: &str = "friends.accept.notify";
pub const FRIENDS_DECLINE_NOTIFY: &str = "friends.decline.notify";
pub const FRIENDS_EXPIRE_NOTIFY: &str = "friends.expire.notify";

pub const SERVERS_PROXY_STARTUP_NOTIFY: &str = "servers.proxy.startup.notify";
pub const SERVERS_PROXY_SHUTDOWN_NOTIFY: &str = "servers.proxy.shutdown.notify";

pub const PARTY_CREATE_NOTIFY: &str = "party.create.notify";
pub const PARTY_JOIN_NOTIFY: &str = "party.join.notify";
pub const PARTY_KICK_NOTIFY: &str = "party.kick.notify";
pub const PARTY_YOINK_NOTIFY: &str = "party.yoink.notify";
pub const PARTY_DISBAND_COMMAND_NOTIFY: &str = "party.disband.notify.command";
pub const PARTY_DISBAND_EMPTY_NOTIFY: &str = "party.disband.notify.empty";
pub const PARTY_LEAVE_LEFT_NOTIFY: &str = "party.leave.notify.left";
pub const PARTY_LEAVE_DISCONNECTED_NOTIFY: &str = "party.leave.notify.disconnected";
pub const PARTY_TRANSFER_COMMAND: &str = "party.transfer.command";
pub const PARTY_TRANSFER_LEFT: &str = "party.transfer.left";
pub const PARTY_TRANSFER_DISCONNECTED: &str = "party.transfer.disconnected";
pub const PARTY_PROMOTE_MODERATOR_NOTIFY: &str = "party.promote.notify.moderator";
pub const PARTY_PROMOTE_LEADER_NOTIFY: &str = "party.promote.notify.leader";
pub const PARTY_STATE_MUTE_NOTIFY: &str = "party.state.mute.notify";
pub const PARTY_STATE_OPEN_NOTIFY: &str = "party.state.open.notify";
pub const PARTY_STATE_OPEN_INVITES_NOTIFY: &str = "party.state.open_invites.notify";
pub const PARTY_STATUS_DISCONNECT: &str = "party.status.disconnect";
pub const PARTY_STATUS_RECONNECT: &str = "party.status.reconnect";

pub const PARTY_INVITES_SEND_NOTIFY: &str = "party.invites.send.notify";
pub const PARTY_INVITES_ACCEPT_NOTIFY: &str = "party.invites.accept.notify";
pub const PARTIES_INVITE_EXPIRE: &str = "parties.invite.expire";

// ── Prefix helpers ──────────────────────────────────────────────────

/// Apply the environment tag to a subject. Idempotent: an already-prefixed
/// subject (or an empty prefix) passes through unchanged.
pub fn ensure_prefixed(prefix: &str, subject: &str) -> String {
    if prefix.is_empty() || subject.starts_with(&format!("{prefix}.")) {
        return subject.to_string();
    }
    format!("{prefix}.{subject}")
}

/// Remove the environment tag so wildcard handlers can parse segments at
/// stable offsets.
pub fn strip_prefix<'a>(prefix: &str, subject: &'a str) -> &'a str {
    if prefix.is_empty() {
        return subject;
    }
    subject
        .strip_prefix(prefix)
        .and_then(|s| s.strip_prefix('.'))
        .unwrap_or(subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixing_is_idempotent() {
        assert_eq!(ensure_prefixed("dev", "party.fetch.request"), "dev.party.fetch.request");
        assert_eq!(
            ensure_prefixed("dev", "dev.party.fetch.request"),
            "dev.party.fetch.request"
        );
        assert_eq!(ensure_prefixed("", "party.fetch.request"), "party.fetch.request");
    }

    #[test]
    fn strip_prefix_restores_segment_offsets() {
        assert_eq!(
            strip_prefix("prod", "prod.party.state.mute.request"),
            "party.state.mute.request"
        );
        assert_eq!(strip_prefix("", "party.state.mute.request"), "party.state.mute.request");
        // A subject that never carried the prefix is left alone.
        assert_eq!(strip_prefix("prod", "party.join.request.bypass"), "party.join.request.bypass");
    }
}
