//! Physical devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tw_core::{AssetId, MediaType};

/// A device that can be targeted by wipe jobs.
///
/// Immutable once referenced by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Unique identifier.
    pub id: AssetId,
    /// Storage medium; drives the policy decision table.
    pub media_type: MediaType,
    /// Manufacturer model string.
    pub model: Option<String>,
    /// Manufacturer serial number.
    pub serial_number: Option<String>,
    /// Raw capacity.
    pub capacity_bytes: Option<i64>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Register a device.
    pub fn new(
        media_type: MediaType,
        model: Option<String>,
        serial_number: Option<String>,
        capacity_bytes: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssetId::new(),
            media_type,
            model,
            serial_number,
            capacity_bytes,
            created_at: now,
        }
    }
}
