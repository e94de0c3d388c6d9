//! Combines permission lookup, rate limiting, and sudo escalation.

use std::time::Duration;

use super::permission::{PermissionLevel, UserLists};
use super::rate_limit::RateLimiter;
use super::sudo::{SudoManager, SudoRequestId};
use crate::error::Result;

pub struct AuthManager {
    lists: UserLists,
    rate_limiter: RateLimiter,
    sudo: SudoManager,
}

impl AuthManager {
    pub fn new(lists: UserLists, rate_limit_per_minute: usize, sudo_timeout: Duration) -> Self {
        Self {
            lists,
            rate_limiter: RateLimiter::new(rate_limit_per_minute),
            sudo: SudoManager::new(sudo_timeout),
        }
    }

    /// The user's effective permission: the higher of their configured
    /// level and any active sudo escalation.
    pub fn effective_permission(&self, platform: &str, user_id: &str) -> PermissionLevel {
        let base = self.lists.effective_permission(platform, user_id);
        match self.sudo.active_level(platform, user_id) {
            Some(escalated) if escalated > base => escalated,
            _ => base,
        }
    }

    pub fn check_rate_limit(&self, platform: &str, user_id: &str) -> bool {
        self.rate_limiter.check_rate_limit(platform, user_id)
    }

    pub fn request_sudo(
        &self,
        platform: &str,
        user_id: &str,
        target_level: PermissionLevel,
    ) -> SudoRequestId {
        if self.sudo.extend_if_active(platform, user_id) {
            // Fall through: still issue a fresh request id so the caller
            // has something to reference, but the window is already
            // extended.
        }
        self.sudo.request_sudo(platform, user_id, target_level)
    }

    pub fn approve_sudo(&self, approver_level: PermissionLevel, id: &SudoRequestId) -> Result<()> {
        self.sudo.approve_sudo(approver_level, id)
    }

    pub fn deny_sudo(&self, approver_level: PermissionLevel, id: &SudoRequestId) -> Result<()> {
        self.sudo.deny_sudo(approver_level, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_permission_prefers_active_sudo() {
        let mgr = AuthManager::new(UserLists::default(), 100, Duration::from_secs(60));
        assert_eq!(
            mgr.effective_permission("discord", "u1"),
            PermissionLevel::Public
        );
        let id = mgr.request_sudo("discord", "u1", PermissionLevel::Admin);
        mgr.approve_sudo(PermissionLevel::Admin, &id).unwrap();
        assert_eq!(
            mgr.effective_permission("discord", "u1"),
            PermissionLevel::Admin
        );
    }

    #[test]
    fn rate_limit_denies_past_budget() {
        let mgr = AuthManager::new(UserLists::default(), 1, Duration::from_secs(60));
        assert!(mgr.check_rate_limit("discord", "u1"));
        assert!(!mgr.check_rate_limit("discord", "u1"));
    }
}
