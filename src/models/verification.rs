use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A one-time handoff code. The code itself is never serialized into API
/// responses; it only travels inside the recipient's notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCode {
    #[serde(skip_serializing, default)]
    pub code: String,
    pub generated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
}

impl VerificationCode {
    pub fn issue(code: String, now: DateTime<Utc>) -> Self {
        Self {
            code,
            generated_at: now,
            verified_at: None,
            verified_by: None,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.verified_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessPickupCode {
    pub business_id: Uuid,
    #[serde(flatten)]
    pub code: VerificationCode,
}
