mod long_term;
mod medium_term;
mod sessions;
mod short_term;

pub use long_term::LongTermRepository;
pub use medium_term::MediumTermRepository;
pub use sessions::SessionRepository;
pub use short_term::ShortTermRepository;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, StrataError};

pub(crate) fn parse_tenant(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| StrataError::Internal(format!("Stored tenant id '{raw}' is invalid: {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
