pub mod packets;

use std::fmt;

use uuid::Uuid;

/// Unique identifier for a player, as minted by the game servers.
pub type PlayerId = Uuid;

/// Unique identifier for a party.
pub type PartyId = Uuid;

/// Unique identifier for a party invite.
pub type InviteId = Uuid;

/// Unique identifier for a friend request (generated on receipt, not by the sender).
pub type RequestId = Uuid;

/// Error codes carried in the `message` field of party-subsystem replies.
/// The wire form is the UPPER_SNAKE_CASE string; everything before the wire
/// boundary works with this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AlreadyInParty,
    NotInParty,
    InvalidParty,
    TargetNotInParty,
    NoInvite,
    NotLeader,
    NoPermission,
    NoKickPermission,
    AlreadyLeader,
    CannotKickLeader,
    CannotKickSelf,
    AlreadyInvited,
    InvalidInvite,
    StateMismatchServer,
    StateMismatchService,
    MarshalInvite,
    InvalidAction,
    InvalidMessageFormat,
    BroadcastFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyInParty => "ERR_ALREADY_IN_PARTY",
            Self::NotInParty => "ERR_NOT_IN_PARTY",
            Self::InvalidParty => "ERR_INVALID_PARTY",
            Self::TargetNotInParty => "ERR_TARGET_NOT_IN_PARTY",
            Self::NoInvite => "ERR_NO_INVITE",
            Self::NotLeader => "ERR_NOT_LEADER",
            Self::NoPermission => "ERR_NO_PERMISSION",
            Self::NoKickPermission => "ERR_NO_KICK_PERMISSION",
            Self::AlreadyLeader => "ERR_ALREADY_LEADER",
            Self::CannotKickLeader => "ERR_CANNOT_KICK_LEADER",
            Self::CannotKickSelf => "ERR_CANNOT_KICK_SELF",
            Self::AlreadyInvited => "ERR_ALREADY_INVITED",
            Self::InvalidInvite => "ERR_INVALID_INVITE",
            Self::StateMismatchServer => "ERR_STATE_MISMATCH_SERVER",
            Self::StateMismatchService => "ERR_STATE_MISMATCH_SERVICE",
            Self::MarshalInvite => "ERR_MARSHAL_INVITE",
            Self::InvalidAction => "ERR_INVALID_ACTION",
            Self::InvalidMessageFormat => "ERR_INVALID_MESSAGE_FORMAT",
            Self::BroadcastFailed => "ERR_BROADCAST_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status codes for the friend-request subsystem's three-field envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendCode {
    Success,
    AlreadySent,
    NotFound,
    InvalidMessageFormat,
    /// The mutation succeeded but its notify never made it onto the bus.
    BroadcastFailed,
}

impl FriendCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::AlreadySent => "ALREADY_SENT",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidMessageFormat => "INVALID_MESSAGE_FORMAT",
            Self::BroadcastFailed => "ERR_BROADCAST_FAILED",
        }
    }
}

impl fmt::Display for FriendCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_upper_snake() {
        for code in [
            ErrorCode::AlreadyInParty,
            ErrorCode::NoKickPermission,
            ErrorCode::StateMismatchService,
            ErrorCode::BroadcastFailed,
        ] {
            let s = code.as_str();
            assert!(s.starts_with("ERR_"), "{s} should carry the ERR_ prefix");
            assert_eq!(s, s.to_uppercase());
        }
    }

    #[test]
    fn friend_code_wire_forms() {
        assert_eq!(FriendCode::Success.as_str(), "SUCCESS");
        assert_eq!(FriendCode::AlreadySent.as_str(), "ALREADY_SENT");
        assert_eq!(FriendCode::NotFound.as_str(), "NOT_FOUND");
        assert_eq!(FriendCode::BroadcastFailed.as_str(), "ERR_BROADCAST_FAILED");
    }
}
