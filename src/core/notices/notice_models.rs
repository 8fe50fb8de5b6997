// Notice domain models - ledger entries recording infractions against a
// user, plus the banned-IP record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Active notices at which a user is auto-banned.
pub const MAX_ACTIVE_NOTICES: usize = 5;

/// Rolling expiry window for a notice, in days.
pub const NOTICE_TTL_DAYS: i64 = 30;

/// Notices are never mutated; `estado` stays `activo` for their lifetime
/// and expiry is evaluated lazily against `expiraEn`.
pub const NOTICE_STATE_ACTIVE: &str = "activo";

/// Motive written on an image-infraction notice.
pub const IMAGE_INFRACTION_REASON: &str = "La imagen subida en una reseña infringía las normas";

/// Motive written on a ban notice when the user record carries none.
pub const DEFAULT_BAN_REASON: &str = "Usuario baneado por infracciones reiteradas";

/// Longest document id derived from an IP string.
const IP_DOC_ID_MAX_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    #[serde(rename = "imagen_inadecuada")]
    InappropriateImage,
    #[serde(rename = "baneo_usuario")]
    UserBanned,
}

/// One infraction recorded against a user. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(rename = "usuarioId")]
    pub user_id: String,
    #[serde(rename = "tipo")]
    pub kind: NoticeKind,
    #[serde(rename = "motivo")]
    pub reason: String,
    #[serde(rename = "resenaId")]
    pub review_id: Option<String>,
    #[serde(rename = "fecha")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "expiraEn")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "estado")]
    pub state: String,
}

impl Notice {
    fn new(
        user_id: &str,
        kind: NoticeKind,
        reason: String,
        review_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            reason,
            review_id,
            created_at: now,
            expires_at: now + Duration::days(NOTICE_TTL_DAYS),
            state: NOTICE_STATE_ACTIVE.to_string(),
        }
    }

    /// Notice recording one rejected review image.
    pub fn image_infraction(user_id: &str, review_id: &str, now: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            NoticeKind::InappropriateImage,
            IMAGE_INFRACTION_REASON.to_string(),
            Some(review_id.to_string()),
            now,
        )
    }

    /// Notice recording a user ban, carrying the ban motive from the user
    /// record or the fixed default.
    pub fn user_ban(user_id: &str, reason: Option<&str>, now: DateTime<Utc>) -> Self {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(DEFAULT_BAN_REASON);
        Self::new(user_id, NoticeKind::UserBanned, reason.to_string(), None, now)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Ledger entry for an IP that produced a rejected image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedIp {
    pub ip: String,
    #[serde(rename = "baneadaDesde")]
    pub banned_since: DateTime<Utc>,
}

/// Deterministic document id for an IP so repeated infractions upsert the
/// same record: every non-alphanumeric character becomes `-`, bounded in
/// length.
pub fn ip_document_id(ip: &str) -> String {
    ip.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(IP_DOC_ID_MAX_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_document_id_is_deterministic_and_sanitized() {
        assert_eq!(ip_document_id("192.168.0.1"), "192-168-0-1");
        assert_eq!(ip_document_id("2001:db8::1"), "2001-db8--1");
        assert_eq!(ip_document_id("10.0.0.2"), ip_document_id("10.0.0.2"));
    }

    #[test]
    fn ip_document_id_is_bounded() {
        let long = "x".repeat(500);
        assert_eq!(ip_document_id(&long).len(), 120);
    }

    #[test]
    fn notices_expire_after_thirty_days() {
        let now = Utc::now();
        let notice = Notice::image_infraction("u1", "r1", now);
        assert_eq!(notice.expires_at - notice.created_at, Duration::days(30));
        assert!(notice.is_active(now));
        assert!(!notice.is_active(now + Duration::days(31)));
    }

    #[test]
    fn ban_notice_falls_back_to_the_default_reason() {
        let now = Utc::now();
        assert_eq!(
            Notice::user_ban("u1", None, now).reason,
            DEFAULT_BAN_REASON
        );
        assert_eq!(
            Notice::user_ban("u1", Some("  "), now).reason,
            DEFAULT_BAN_REASON
        );
        assert_eq!(
            Notice::user_ban("u1", Some("spam"), now).reason,
            "spam"
        );
    }
}
