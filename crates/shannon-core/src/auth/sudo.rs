//! Time-bounded permission escalation ("sudo").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use super::permission::PermissionLevel;
use crate::error::{Result, ShannonError};

pub type SudoRequestId = String;

struct PendingRequest {
    platform: String,
    user_id: String,
    target_level: PermissionLevel,
}

struct ActiveEscalation {
    target_level: PermissionLevel,
    expires_at: Instant,
}

/// Tracks outstanding sudo requests and active escalations. Process-local,
/// as the spec requires — no attempt is made to persist across restarts.
pub struct SudoManager {
    timeout: Duration,
    pending: Mutex<HashMap<SudoRequestId, PendingRequest>>,
    active: Mutex<HashMap<(String, String), ActiveEscalation>>,
}

impl SudoManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// A user of any level may request escalation to `target_level`.
    pub fn request_sudo(
        &self,
        platform: &str,
        user_id: &str,
        target_level: PermissionLevel,
    ) -> SudoRequestId {
        let id = Uuid::new_v4().to_string();
        self.pending.lock().insert(
            id.clone(),
            PendingRequest {
                platform: platform.to_string(),
                user_id: user_id.to_string(),
                target_level,
            },
        );
        id
    }

    /// Approve a pending request. Caller must already have verified the
    /// approver is an admin; this method enforces only request existence.
    pub fn approve_sudo(&self, admin_level: PermissionLevel, id: &SudoRequestId) -> Result<()> {
        if admin_level < PermissionLevel::Admin {
            return Err(ShannonError::PermissionDenied(
                "only admins may approve sudo requests".into(),
            ));
        }
        let req = self
            .pending
            .lock()
            .remove(id)
            .ok_or_else(|| ShannonError::NotFound(format!("sudo request {id}")))?;

        let key = (req.platform, req.user_id);
        let expires_at = Instant::now() + self.timeout;
        self.active.lock().insert(
            key,
            ActiveEscalation {
                target_level: req.target_level,
                expires_at,
            },
        );
        Ok(())
    }

    /// Deny a pending request.
    pub fn deny_sudo(&self, admin_level: PermissionLevel, id: &SudoRequestId) -> Result<()> {
        if admin_level < PermissionLevel::Admin {
            return Err(ShannonError::PermissionDenied(
                "only admins may deny sudo requests".into(),
            ));
        }
        self.pending
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ShannonError::NotFound(format!("sudo request {id}")))
    }

    /// Returns the user's escalated level if an active, unexpired escalation
    /// exists. Expiry is silent: it simply stops applying; no error.
    pub fn active_level(&self, platform: &str, user_id: &str) -> Option<PermissionLevel> {
        let key = (platform.to_string(), user_id.to_string());
        let mut active = self.active.lock();
        match active.get(&key) {
            Some(esc) if esc.expires_at > Instant::now() => Some(esc.target_level),
            Some(_) => {
                active.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Re-requesting while already active extends the window rather than
    /// stacking a second escalation.
    pub fn extend_if_active(&self, platform: &str, user_id: &str) -> bool {
        let key = (platform.to_string(), user_id.to_string());
        let mut active = self.active.lock();
        if let Some(esc) = active.get_mut(&key) {
            esc.expires_at = Instant::now() + self.timeout;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_elevates_requester() {
        let mgr = SudoManager::new(Duration::from_secs(60));
        let id = mgr.request_sudo("discord", "u1", PermissionLevel::Admin);
        mgr.approve_sudo(PermissionLevel::Admin, &id).unwrap();
        assert_eq!(
            mgr.active_level("discord", "u1"),
            Some(PermissionLevel::Admin)
        );
    }

    #[test]
    fn approve_by_non_admin_denied() {
        let mgr = SudoManager::new(Duration::from_secs(60));
        let id = mgr.request_sudo("discord", "u1", PermissionLevel::Admin);
        let err = mgr.approve_sudo(PermissionLevel::Operator, &id).unwrap_err();
        assert!(matches!(err, ShannonError::PermissionDenied(_)));
    }

    #[test]
    fn approve_unknown_id_not_found() {
        let mgr = SudoManager::new(Duration::from_secs(60));
        let err = mgr
            .approve_sudo(PermissionLevel::Admin, &"missing".to_string())
            .unwrap_err();
        assert!(matches!(err, ShannonError::NotFound(_)));
    }

    #[test]
    fn expired_escalation_is_silent() {
        let mgr = SudoManager::new(Duration::from_millis(1));
        let id = mgr.request_sudo("discord", "u1", PermissionLevel::Admin);
        mgr.approve_sudo(PermissionLevel::Admin, &id).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(mgr.active_level("discord", "u1"), None);
    }

    #[test]
    fn re_request_extends_window() {
        let mgr = SudoManager::new(Duration::from_secs(60));
        let id = mgr.request_sudo("discord", "u1", PermissionLevel::Operator);
        mgr.approve_sudo(PermissionLevel::Admin, &id).unwrap();
        assert!(mgr.extend_if_active("discord", "u1"));
    }
}
