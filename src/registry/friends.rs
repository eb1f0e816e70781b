//! Pending friend requests with TTL expiry. At most one active request per
//! ordered `(sender, recipient)` pair; a request whose inverse is already
//! pending short-circuits into a mutual acceptance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{Notifier, subjects};
use crate::protocol::{FriendCode, PlayerId, RequestId};

/// An active friend request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FriendRequest {
    pub sender: PlayerId,
    pub recipient: PlayerId,
    pub expiry: DateTime<Utc>,
}

struct FriendState {
    /// Keyed by the registry-generated request id.
    requests: HashMap<RequestId, FriendRequest>,
    /// Cancel handles for the pending expiry timers.
    expiry_tokens: HashMap<RequestId, CancellationToken>,
}

pub struct FriendRegistry {
    inner: Mutex<FriendState>,
    notifier: Notifier,
}

impl FriendRegistry {
    pub fn new(notifier: Notifier) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(FriendState {
                requests: HashMap::new(),
                expiry_tokens: HashMap::new(),
            }),
            notifier,
        })
    }

    /// Store a new request. Returns `(accepted, accepted_inverse)`:
    /// - `(false, false)` — an identical pair is already pending.
    /// - `(true, true)` — the inverse pair was pending; both sides are now
    ///   friends. The acceptance notify carries the *older* request's
    ///   direction, the older request is removed, and nothing new is stored.
    /// - `(true, false)` — stored fresh; the caller should broadcast the
    ///   request notify with the returned id.
    ///
    /// A failed acceptance broadcast on the inverse path surfaces as
    /// `Err(FriendCode::BroadcastFailed)`; the older request is still
    /// consumed.
    pub fn add_or_update(
        self: &Arc<Self>,
        req: FriendRequest,
    ) -> Result<(bool, bool, Option<RequestId>), FriendCode> {
        let mut state = self.inner.lock().unwrap();

        if state
            .requests
            .values()
            .any(|r| r.sender == req.sender && r.recipient == req.recipient)
        {
            debug!(sender = %req.sender, recipient = %req.recipient, "friend request already pending");
            return Ok((false, false, None));
        }

        let inverse = state
            .requests
            .iter()
            .find(|(_, r)| r.sender == req.recipient && r.recipient == req.sender)
            .map(|(id, r)| (*id, *r));
        if let Some((inverse_id, inverse_req)) = inverse {
            info!(sender = %req.sender, recipient = %req.recipient, "inverse request pending, accepting both");
            remove_request(&mut state, inverse_id);
            if !self
                .notifier
                .notify(subjects::FRIENDS_ACCEPT_NOTIFY, &inverse_req)
            {
                return Err(FriendCode::BroadcastFailed);
            }
            return Ok((true, true, None));
        }

        let request_id = Uuid::new_v4();
        state.requests.insert(request_id, req);
        self.schedule_expiry(&mut state, request_id, req.expiry);

        info!(%request_id, sender = %req.sender, "stored friend request");
        Ok((true, false, Some(request_id)))
    }

    /// Find and remove by pair. The caller broadcasts the acceptance.
    pub fn accept(&self, sender: PlayerId, recipient: PlayerId) -> Option<FriendRequest> {
        self.take_pair(sender, recipient, "accepted")
    }

    pub fn accept_by_id(&self, id: RequestId) -> Option<FriendRequest> {
        self.take_by_id(id, "accepted")
    }

    /// Functionally the same as accept, but the caller sends a different
    /// message.
    pub fn decline(&self, sender: PlayerId, recipient: PlayerId) -> Option<FriendRequest> {
        self.take_pair(sender, recipient, "declined")
    }

    pub fn decline_by_id(&self, id: RequestId) -> Option<FriendRequest> {
        self.take_by_id(id, "declined")
    }

    /// Snapshot of all pending requests.
    pub fn get_all(&self) -> Vec<FriendRequest> {
        let state = self.inner.lock().unwrap();
        state.requests.values().copied().collect()
    }

    pub fn get(&self, id: RequestId) -> Option<FriendRequest> {
        let state = self.inner.lock().unwrap();
        state.requests.get(&id).copied()
    }

    fn take_pair(&self, sender: PlayerId, recipient: PlayerId, action: &str) -> Option<FriendRequest> {
        let mut state = self.inner.lock().unwrap();
        let id = state
            .requests
            .iter()
            .find(|(_, r)| r.sender == sender && r.recipient == recipient)
            .map(|(id, _)| *id)?;
        let req = remove_request(&mut state, id);
        info!(request_id = %id, action, "resolved friend request");
        req
    }

    fn take_by_id(&self, id: RequestId, action: &str) -> Option<FriendRequest> {
        let mut state = self.inner.lock().unwrap();
        let req = remove_request(&mut state, id);
        if req.is_some() {
            info!(request_id = %id, action, "resolved friend request");
        } else {
            debug!(request_id = %id, "attempted to resolve unknown friend request");
        }
        req
    }

    /// Race a sleep until `expiry` against the request's cancel token.
    fn schedule_expiry(
        self: &Arc<Self>,
        state: &mut FriendState,
        id: RequestId,
        expiry: DateTime<Utc>,
    ) {
        let token = CancellationToken::new();
        state.expiry_tokens.insert(id, token.clone());

        let delay = (expiry - Utc::now()).to_std().unwrap_or_default();
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => registry.expire_request(id),
            }
        });
    }

    /// Timer path: drop the request and broadcast the expiry. There is no
    /// caller to report a failed broadcast to, so it is logged only.
    fn expire_request(&self, id: RequestId) {
        let mut state = self.inner.lock().unwrap();
        let Some(req) = remove_request(&mut state, id) else {
            return;
        };
        info!(request_id = %id, "friend request expired");
        if !self.notifier.notify(subjects::FRIENDS_EXPIRE_NOTIFY, &req) {
            warn!(request_id = %id, "expiry broadcast failed");
        }
    }
}

/// Remove a request and cancel its expiry timer.
fn remove_request(state: &mut FriendState, id: RequestId) -> Option<FriendRequest> {
    let req = state.requests.remove(&id);
    if let Some(token) = state.expiry_tokens.remove(&id) {
        token.cancel();
    }
    req
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::bus::Outbound;

    fn registry() -> (Arc<FriendRegistry>, UnboundedReceiver<Outbound>) {
        let (notifier, rx) = Notifier::channel("");
        (FriendRegistry::new(notifier), rx)
    }

    fn request(sender: PlayerId, recipient: PlayerId) -> FriendRequest {
        FriendRequest {
            sender,
            recipient,
            expiry: Utc::now() + chrono::Duration::seconds(60),
        }
    }

    #[tokio::test]
    async fn duplicate_pair_is_rejected() {
        let (registry, _rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(registry.add_or_update(request(a, b)).unwrap().0);
        let (accepted, inverse, id) = registry.add_or_update(request(a, b)).unwrap();
        assert!(!accepted);
        assert!(!inverse);
        assert!(id.is_none());
        assert_eq!(registry.get_all().len(), 1);
    }

    #[tokio::test]
    async fn inverse_pair_becomes_mutual_acceptance() {
        let (registry, mut rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.add_or_update(request(a, b)).unwrap();
        let (accepted, inverse, id) = registry.add_or_update(request(b, a)).unwrap();
        assert!(accepted);
        assert!(inverse);
        assert!(id.is_none());

        // The acceptance carries the older request's direction.
        let out = rx.try_recv().unwrap();
        assert_eq!(out.subject, subjects::FRIENDS_ACCEPT_NOTIFY);
        let body: FriendRequest = serde_json::from_slice(&out.payload).unwrap();
        assert_eq!(body.sender, a);
        assert_eq!(body.recipient, b);

        // Neither direction is stored any more.
        assert!(registry.get_all().is_empty());
    }

    #[tokio::test]
    async fn accept_by_pair_removes_request() {
        let (registry, _rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.add_or_update(request(a, b)).unwrap();
        let req = registry.accept(a, b).unwrap();
        assert_eq!(req.sender, a);
        assert!(registry.accept(a, b).is_none());
    }

    #[tokio::test]
    async fn decline_by_id_removes_request() {
        let (registry, _rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let (_, _, id) = registry.add_or_update(request(a, b)).unwrap();
        let id = id.unwrap();
        assert!(registry.get(id).is_some());
        assert!(registry.decline_by_id(id).is_some());
        assert!(registry.decline_by_id(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_timer_fires_and_notifies() {
        let (registry, mut rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.add_or_update(request(a, b)).unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;

        let out = rx.try_recv().unwrap();
        assert_eq!(out.subject, subjects::FRIENDS_EXPIRE_NOTIFY);
        assert!(registry.get_all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn accept_cancels_expiry_timer() {
        let (registry, mut rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.add_or_update(request(a, b)).unwrap();
        registry.accept(a, b).unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err(), "no expiry notify after acceptance");
    }

    #[tokio::test(start_paused = true)]
    async fn mutual_acceptance_cancels_the_older_timer() {
        let (registry, mut rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.add_or_update(request(a, b)).unwrap();
        registry.add_or_update(request(b, a)).unwrap();

        // Drain the acceptance notify, then make sure expiry never fires.
        assert_eq!(rx.try_recv().unwrap().subject, subjects::FRIENDS_ACCEPT_NOTIFY);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn inverse_acceptance_reports_failed_broadcast() {
        let (registry, rx) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.add_or_update(request(a, b)).unwrap();
        drop(rx);

        let err = registry.add_or_update(request(b, a)).unwrap_err();
        assert_eq!(err, FriendCode::BroadcastFailed);
        // The acceptance itself is not rolled back.
        assert!(registry.get_all().is_empty());
    }
}
