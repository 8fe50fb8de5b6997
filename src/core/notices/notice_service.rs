// Notice & ban ledger - core business logic for infraction tracking.
//
// This service handles:
// - Recording image infractions as notices with a rolling expiry
// - Auto-banning a user once enough notices are still active
// - Recording banned IPs for rejected uploads
//
// Blocking requests by IP is somebody else's admission check; this side
// only maintains the ledger.

use super::notice_models::{ip_document_id, BannedIp, Notice, MAX_ACTIVE_NOTICES};
use crate::core::moderation::{StoreError, UserPatch, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoticeError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Port for persisting notices.
#[async_trait]
pub trait NoticeStore: Send + Sync {
    /// Append one notice, returning its generated id.
    async fn add_notice(&self, notice: &Notice) -> Result<String, StoreError>;

    /// Count this user's notices (any kind) with `expiraEn > now`.
    async fn count_active_notices(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Port for the banned-IP ledger. Keyed by `ip_document_id`, so repeated
/// writes for one IP collapse into a single record.
#[async_trait]
pub trait IpBanStore: Send + Sync {
    async fn upsert_banned_ip(&self, doc_id: &str, record: &BannedIp) -> Result<(), StoreError>;
}

/// What recording an infraction amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfractionOutcome {
    /// No user to hold accountable - nothing recorded.
    SkippedAnonymous,
    /// Notice appended; user still under the threshold.
    Recorded { active: usize },
    /// Notice appended and the user crossed the threshold.
    AutoBanned { active: usize },
}

/// Infraction ledger with ban escalation.
pub struct NoticeLedger<N: NoticeStore, U: UserStore, I: IpBanStore> {
    notices: N,
    users: U,
    ip_bans: I,
}

impl<N: NoticeStore, U: UserStore, I: IpBanStore> NoticeLedger<N, U, I> {
    pub fn new(notices: N, users: U, ip_bans: I) -> Self {
        Self {
            notices,
            users,
            ip_bans,
        }
    }

    /// Record one rejected review image against its author.
    ///
    /// Appends an `imagen_inadecuada` notice, then counts the user's
    /// still-active notices; at `MAX_ACTIVE_NOTICES` the user record is
    /// merge-set to banned. The ban is monotonic - this never unsets it.
    pub async fn record_image_infraction(
        &self,
        user_id: Option<&str>,
        review_id: &str,
    ) -> Result<InfractionOutcome, NoticeError> {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            return Ok(InfractionOutcome::SkippedAnonymous);
        };

        let now = Utc::now();
        self.notices
            .add_notice(&Notice::image_infraction(user_id, review_id, now))
            .await?;

        let active = self.notices.count_active_notices(user_id, now).await?;
        if active >= MAX_ACTIVE_NOTICES {
            self.users.merge_user(user_id, UserPatch::ban(now)).await?;
            tracing::warn!(
                user_id,
                active,
                "User auto-banned after reaching the active-notice threshold"
            );
            Ok(InfractionOutcome::AutoBanned { active })
        } else {
            Ok(InfractionOutcome::Recorded { active })
        }
    }

    /// Upsert the banned-IP record for a rejected upload. Returns whether
    /// anything was written (no-op without an IP).
    pub async fn record_ip_infraction(&self, ip: Option<&str>) -> Result<bool, NoticeError> {
        let Some(ip) = ip.filter(|ip| !ip.is_empty()) else {
            return Ok(false);
        };

        let record = BannedIp {
            ip: ip.to_string(),
            banned_since: Utc::now(),
        };
        self.ip_bans
            .upsert_banned_ip(&ip_document_id(ip), &record)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::{InMemoryIpBanStore, InMemoryNoticeStore, InMemoryUserStore};
    use chrono::Duration;

    fn ledger() -> NoticeLedger<InMemoryNoticeStore, InMemoryUserStore, InMemoryIpBanStore> {
        NoticeLedger::new(
            InMemoryNoticeStore::new(),
            InMemoryUserStore::new(),
            InMemoryIpBanStore::new(),
        )
    }

    async fn seed_notices(store: &InMemoryNoticeStore, user_id: &str, active: usize, expired: usize) {
        let now = Utc::now();
        for i in 0..active {
            let notice = Notice::image_infraction(user_id, &format!("r{i}"), now);
            store.add_notice(&notice).await.unwrap();
        }
        for i in 0..expired {
            let mut notice = Notice::image_infraction(user_id, &format!("old{i}"), now);
            notice.expires_at = now - Duration::days(1);
            store.add_notice(&notice).await.unwrap();
        }
    }

    #[tokio::test]
    async fn anonymous_author_is_never_escalated() {
        let ledger = ledger();
        let outcome = ledger.record_image_infraction(None, "r1").await.unwrap();
        assert_eq!(outcome, InfractionOutcome::SkippedAnonymous);
    }

    #[tokio::test]
    async fn fifth_active_notice_flips_the_ban() {
        let notices = InMemoryNoticeStore::new();
        let users = InMemoryUserStore::new();
        seed_notices(&notices, "u1", 4, 0).await;

        let ledger = NoticeLedger::new(notices, users.clone(), InMemoryIpBanStore::new());
        let outcome = ledger
            .record_image_infraction(Some("u1"), "r9")
            .await
            .unwrap();

        assert_eq!(outcome, InfractionOutcome::AutoBanned { active: 5 });
        let user = users.get("u1").expect("user record created by the ban");
        assert!(user.banned);
        assert!(user.banned_since.is_some());
    }

    #[tokio::test]
    async fn expired_notices_do_not_count_toward_the_threshold() {
        let notices = InMemoryNoticeStore::new();
        let users = InMemoryUserStore::new();
        seed_notices(&notices, "u1", 3, 1).await;

        let ledger = NoticeLedger::new(notices, users.clone(), InMemoryIpBanStore::new());
        let outcome = ledger
            .record_image_infraction(Some("u1"), "r9")
            .await
            .unwrap();

        assert_eq!(outcome, InfractionOutcome::Recorded { active: 4 });
        assert!(users.get("u1").is_none());
    }

    #[tokio::test]
    async fn ban_does_not_clobber_unrelated_user_fields() {
        let notices = InMemoryNoticeStore::new();
        let users = InMemoryUserStore::new();
        users.insert(crate::core::moderation::User {
            id: "u1".to_string(),
            ban_reason: Some("historial previo".to_string()),
            ..Default::default()
        });
        seed_notices(&notices, "u1", 4, 0).await;

        let ledger = NoticeLedger::new(notices, users.clone(), InMemoryIpBanStore::new());
        ledger
            .record_image_infraction(Some("u1"), "r9")
            .await
            .unwrap();

        let user = users.get("u1").unwrap();
        assert!(user.banned);
        assert_eq!(user.ban_reason.as_deref(), Some("historial previo"));
    }

    #[tokio::test]
    async fn ip_infractions_upsert_one_record_per_ip() {
        let ip_bans = InMemoryIpBanStore::new();
        let ledger = NoticeLedger::new(
            InMemoryNoticeStore::new(),
            InMemoryUserStore::new(),
            ip_bans.clone(),
        );

        assert!(ledger
            .record_ip_infraction(Some("10.0.0.7"))
            .await
            .unwrap());
        assert!(ledger
            .record_ip_infraction(Some("10.0.0.7"))
            .await
            .unwrap());
        assert!(!ledger.record_ip_infraction(None).await.unwrap());

        assert_eq!(ip_bans.len(), 1);
        assert!(ip_bans.contains("10-0-0-7"));
    }
}
