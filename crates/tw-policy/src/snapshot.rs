//! # Frozen Job Policy
//!
//! A [`PolicySnapshot`] is computed once, when a job is created, and stored
//! verbatim on the job row. Later changes to the decision table never
//! rewrite the snapshot of an existing job.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tw_core::{MediaType, NistCategory, WipeMethod, WipeScope};

use crate::recommend::{is_method_valid_for_media, recommend, Recommendation};

/// Upper bound on operator-requested overwrite passes (Gutmann).
pub const MAX_OVERWRITE_PASSES: u32 = 35;

/// Operator-supplied policy input for a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    /// Target assurance level.
    pub nist_category: NistCategory,
    /// Explicit method override; `None` accepts the recommendation.
    #[serde(default)]
    pub method: Option<WipeMethod>,
    /// Number of overwrite passes, when the method overwrites.
    #[serde(default)]
    pub overwrite_passes: Option<u32>,
    /// Verification sampling override (0-100).
    #[serde(default)]
    pub verify_sample_percent: Option<u8>,
}

impl PolicyRequest {
    /// A request that accepts the engine's recommendation unchanged.
    pub fn for_category(nist_category: NistCategory) -> Self {
        Self {
            nist_category,
            method: None,
            overwrite_passes: None,
            verify_sample_percent: None,
        }
    }
}

/// Policy frozen onto a job at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySnapshot {
    /// Medium the policy was resolved for.
    pub media_type: MediaType,
    /// Scope the policy was resolved for.
    pub scope: WipeScope,
    /// Target assurance level.
    pub nist_category: NistCategory,
    /// Method the agent must execute.
    pub method: WipeMethod,
    /// Whether an operator override replaced the recommended method.
    pub method_overridden: bool,
    /// Overwrite passes requested by the operator.
    pub overwrite_passes: Option<u32>,
    /// Effective verification sampling percentage.
    pub verify_sample_percent: u8,
    /// The engine's full recommendation at creation time.
    pub recommendation: Recommendation,
}

/// Rejected operator policy input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The override is physically inapplicable to the medium.
    #[error("wipe method {method} is not valid for {media} media")]
    MethodNotValidForMedia {
        /// Requested method.
        method: WipeMethod,
        /// Asset medium.
        media: MediaType,
    },

    /// Folder wipes can only overwrite.
    #[error("wipe method {method} cannot be applied to {scope} scope")]
    MethodNotValidForScope {
        /// Requested method.
        method: WipeMethod,
        /// Job scope.
        scope: WipeScope,
    },

    /// Sampling percentage outside 0-100.
    #[error("verify sample percent must be between 0 and 100, got {value}")]
    SamplePercentOutOfRange {
        /// Rejected value.
        value: u8,
    },

    /// Overwrite pass count outside 1-35.
    #[error("overwrite passes must be between 1 and {MAX_OVERWRITE_PASSES}, got {value}")]
    OverwritePassesOutOfRange {
        /// Rejected value.
        value: u32,
    },
}

/// Resolve the policy for a new job.
///
/// The recommendation is always computed; an operator override replaces
/// only the method, and only after it passes the media and scope checks.
pub fn resolve(
    media: MediaType,
    scope: WipeScope,
    request: &PolicyRequest,
) -> Result<PolicySnapshot, PolicyError> {
    if let Some(value) = request.verify_sample_percent {
        if value > 100 {
            return Err(PolicyError::SamplePercentOutOfRange { value });
        }
    }
    if let Some(value) = request.overwrite_passes {
        if value == 0 || value > MAX_OVERWRITE_PASSES {
            return Err(PolicyError::OverwritePassesOutOfRange { value });
        }
    }

    let recommendation = recommend(media, scope, request.nist_category);

    let method = match request.method {
        Some(method) => {
            if !is_method_valid_for_media(media, method) {
                return Err(PolicyError::MethodNotValidForMedia { method, media });
            }
            if scope == WipeScope::Folder && method != WipeMethod::Overwrite {
                return Err(PolicyError::MethodNotValidForScope { method, scope });
            }
            method
        }
        None => recommendation.method,
    };

    Ok(PolicySnapshot {
        media_type: media,
        scope,
        nist_category: request.nist_category,
        method,
        method_overridden: request.method.is_some_and(|m| m != recommendation.method),
        overwrite_passes: request.overwrite_passes,
        verify_sample_percent: request
            .verify_sample_percent
            .unwrap_or(recommendation.verification.sample_percent),
        recommendation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_override_uses_recommendation() {
        let req = PolicyRequest::for_category(NistCategory::Purge);
        let snap = resolve(MediaType::Ssd, WipeScope::Drive, &req).unwrap();
        assert_eq!(snap.method, WipeMethod::NvmeSanitize);
        assert!(!snap.method_overridden);
        assert_eq!(snap.verify_sample_percent, 0);
    }

    #[test]
    fn valid_override_is_kept() {
        let req = PolicyRequest {
            method: Some(WipeMethod::Overwrite),
            overwrite_passes: Some(3),
            ..PolicyRequest::for_category(NistCategory::Purge)
        };
        let snap = resolve(MediaType::Hdd, WipeScope::Drive, &req).unwrap();
        assert_eq!(snap.method, WipeMethod::Overwrite);
        assert!(snap.method_overridden);
        assert_eq!(snap.overwrite_passes, Some(3));
        assert_eq!(snap.recommendation.method, WipeMethod::AtaSecureErase);
    }

    #[test]
    fn crypto_erase_on_hdd_rejected() {
        let req = PolicyRequest {
            method: Some(WipeMethod::CryptoErase),
            ..PolicyRequest::for_category(NistCategory::Clear)
        };
        let err = resolve(MediaType::Hdd, WipeScope::Drive, &req).unwrap_err();
        assert_eq!(
            err,
            PolicyError::MethodNotValidForMedia {
                method: WipeMethod::CryptoErase,
                media: MediaType::Hdd,
            }
        );
    }

    #[test]
    fn folder_scope_rejects_controller_methods() {
        let req = PolicyRequest {
            method: Some(WipeMethod::NvmeSanitize),
            ..PolicyRequest::for_category(NistCategory::Purge)
        };
        let err = resolve(MediaType::Nvme, WipeScope::Folder, &req).unwrap_err();
        assert!(matches!(err, PolicyError::MethodNotValidForScope { .. }));
    }

    #[test]
    fn sample_percent_override_and_bounds() {
        let req = PolicyRequest {
            verify_sample_percent: Some(40),
            ..PolicyRequest::for_category(NistCategory::Clear)
        };
        let snap = resolve(MediaType::Hdd, WipeScope::Drive, &req).unwrap();
        assert_eq!(snap.verify_sample_percent, 40);

        let req = PolicyRequest {
            verify_sample_percent: Some(101),
            ..PolicyRequest::for_category(NistCategory::Clear)
        };
        assert_eq!(
            resolve(MediaType::Hdd, WipeScope::Drive, &req).unwrap_err(),
            PolicyError::SamplePercentOutOfRange { value: 101 }
        );
    }

    #[test]
    fn overwrite_passes_bounds() {
        for bad in [0, MAX_OVERWRITE_PASSES + 1] {
            let req = PolicyRequest {
                overwrite_passes: Some(bad),
                ..PolicyRequest::for_category(NistCategory::Clear)
            };
            assert!(resolve(MediaType::Hdd, WipeScope::Drive, &req).is_err());
        }
    }

    #[test]
    fn snapshot_round_trips_through_json_verbatim() {
        let req = PolicyRequest::for_category(NistCategory::Destroy);
        let snap = resolve(MediaType::Hdd, WipeScope::Drive, &req).unwrap();
        let stored = serde_json::to_value(&snap).unwrap();
        let loaded: PolicySnapshot = serde_json::from_value(stored.clone()).unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(stored["recommendation"]["warnings"][0],
            "Physical destruction required after software sanitization");
    }
}
