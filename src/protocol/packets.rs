//! Wire packets for every bus operation. Field names follow the subjects'
//! JSON contracts; identifiers serialize as canonical hyphenated UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorCode, FriendCode, InviteId, PartyId, PlayerId, RequestId};

// ── Envelopes ───────────────────────────────────────────────────────

/// Reply envelope for the friend-request subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
}

impl FriendResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: FriendCode::Success.as_str().to_string(),
            message: message.into(),
        }
    }

    pub fn err(code: FriendCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.as_str().to_string(),
            message: message.into(),
        }
    }
}

/// Reply envelope for the party subsystem. `message` carries the error code
/// on failure and may carry serialized data on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyResponse {
    pub success: bool,
    pub message: String,
}

impl PartyResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn err(code: ErrorCode) -> Self {
        Self {
            success: false,
            message: code.as_str().to_string(),
        }
    }
}

impl From<Result<(), ErrorCode>> for PartyResponse {
    fn from(result: Result<(), ErrorCode>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(code) => Self::err(code),
        }
    }
}

/// Reply envelope for the instance-scaling handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceResponse {
    pub success: bool,
    pub message: String,
}

impl InstanceResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "SUCCESS".to_string(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ── Friend packets ──────────────────────────────────────────────────

/// Accept/decline by the `(sender, recipient)` pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FriendPairPacket {
    pub sender: PlayerId,
    pub recipient: PlayerId,
}

/// Accept/decline by the registry-generated request id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FriendByIdPacket {
    pub request_id: RequestId,
}

/// Broadcast when a new friend request is stored. Carries the generated id
/// so clients can use the by-id accept/decline subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestNotifyPacket {
    pub request_id: RequestId,
    pub sender: PlayerId,
    pub recipient: PlayerId,
    pub expiry: DateTime<Utc>,
}

// ── Party packets ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyInviteSendPacket {
    /// Absent when the sender has no party yet; one is created lazily.
    #[serde(default)]
    pub party_id: Option<PartyId>,
    pub sender_id: PlayerId,
    pub recipient_id: PlayerId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyInviteAcceptPacket {
    pub request_id: InviteId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyInviteExpirePacket {
    pub request_id: InviteId,
    pub party_id: PartyId,
    pub recipient: PlayerId,
    pub sender_id: PlayerId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyLeaveRequestPacket {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyOnePlayerPacket {
    pub party_id: PartyId,
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyTwoPlayerPacket {
    pub party_id: PartyId,
    pub player_id: PlayerId,
    pub sender_id: PlayerId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartyStateChangePacket {
    pub party_id: PartyId,
    pub player_id: PlayerId,
    pub state: bool,
}

// ── Player presence ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatusPacket {
    pub uuid: PlayerId,
    pub username: String,
}

// ── Instance scaling ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceCreateRequest {
    pub instance_type: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDeleteRequest {
    pub instance_type: String,
    pub alloc_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDeleteAllRequest {
    pub instance_type: String,
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn uuids_serialize_as_canonical_strings() {
        let packet = PartyOnePlayerPacket {
            party_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&packet).unwrap();
        let id = json["party_id"].as_str().unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn invite_send_accepts_null_party() {
        let json = format!(
            r#"{{"party_id":null,"sender_id":"{}","recipient_id":"{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let packet: PartyInviteSendPacket = serde_json::from_str(&json).unwrap();
        assert!(packet.party_id.is_none());
    }

    #[test]
    fn instance_requests_use_camel_case() {
        let packet: InstanceCreateRequest =
            serde_json::from_str(r#"{"instanceType":"lobby","quantity":3}"#).unwrap();
        assert_eq!(packet.instance_type, "lobby");
        assert_eq!(packet.quantity, 3);
    }

    #[test]
    fn party_response_carries_code_in_message() {
        let resp = PartyResponse::err(crate::protocol::ErrorCode::NoPermission);
        assert!(!resp.success);
        assert_eq!(resp.message, "ERR_NO_PERMISSION");
    }
}
