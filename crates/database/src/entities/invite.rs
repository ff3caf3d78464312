use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::RoleName;
use crate::types::parse_timestamp;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventInvite {
    pub id: String,
    pub event_id: String,
    pub code: String,
    pub role_name: RoleName,
    pub created_by: Option<String>,
    pub max_uses: Option<i64>,
    pub use_count: i64,
    pub expires_at: Option<String>,
    pub disabled: bool,
    pub note: Option<String>,
    pub created_at: String,
}

impl EventInvite {
    /// Reason the invite cannot be redeemed at `now`, if any.
    pub fn unusable_reason(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if self.disabled {
            return Some("Invite link is disabled");
        }
        if let Some(expires_at) = self.expires_at.as_deref().and_then(parse_timestamp) {
            if expires_at <= now {
                return Some("Invite link has expired");
            }
        }
        if let Some(max_uses) = self.max_uses {
            if self.use_count >= max_uses {
                return Some("Invite link has reached its maximum uses");
            }
        }
        None
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewInvite {
    pub role_name: RoleName,
    pub max_uses: Option<i64>,
    pub expires_at: Option<String>,
    pub note: Option<String>,
}

/// Public view of an invite code.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvitePreview {
    pub event_name: String,
    pub event_slug: String,
    pub role_name: RoleName,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invite() -> EventInvite {
        EventInvite {
            id: "inv".into(),
            event_id: "evt".into(),
            code: "code".into(),
            role_name: RoleName::Reporter,
            created_by: None,
            max_uses: None,
            use_count: 0,
            expires_at: None,
            disabled: false,
            note: None,
            created_at: crate::types::now(),
        }
    }

    #[test]
    fn fresh_invite_is_usable() {
        assert_eq!(invite().unusable_reason(Utc::now()), None);
    }

    #[test]
    fn disabled_expired_and_exhausted_invites_are_rejected() {
        let now = Utc::now();

        let mut disabled = invite();
        disabled.disabled = true;
        assert!(disabled.unusable_reason(now).is_some());

        let mut expired = invite();
        expired.expires_at = Some(crate::types::timestamp(now - Duration::minutes(1)));
        assert_eq!(expired.unusable_reason(now), Some("Invite link has expired"));

        let mut exhausted = invite();
        exhausted.max_uses = Some(2);
        exhausted.use_count = 2;
        assert!(exhausted.unusable_reason(now).is_some());
    }
}
