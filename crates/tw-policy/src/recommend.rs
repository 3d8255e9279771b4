//! # Decision Table
//!
//! The table is keyed first by media type, then by NIST category. Scope is
//! applied last: a folder wipe always falls back to file-level overwrite.
//!
//! | Media | CLEAR | PURGE | DESTROY |
//! |---|---|---|---|
//! | HDD | OVERWRITE, 5% | ATA_SECURE_ERASE, 15% | OVERWRITE, 25%, destroy |
//! | SSD / NVME | CRYPTO_ERASE, no read-back | NVME_SANITIZE, 0%, no read-back | NVME_SANITIZE, destroy |
//! | FLASH / REMOVABLE | OVERWRITE | OVERWRITE | OVERWRITE |

use serde::{Deserialize, Serialize};
use tw_core::{MediaType, NistCategory, WipeMethod, WipeScope};

const WARN_HDD_DESTROY: &str = "Physical destruction required after software sanitization";
const WARN_SSD_DESTROY: &str = "Physical destruction required for DESTROY category";
const WARN_WEAR_LEVELING: &str =
    "SSD wear-leveling may leave data in unmapped areas. Controller-level sanitization preferred.";
const WARN_FLASH: &str =
    "Flash memory may have wear-leveling - complete sanitization not guaranteed";
const WARN_FOLDER: &str =
    "Folder wipe cannot sanitize file system metadata and may leave traces in unallocated space";
const FOLDER_RATIONALE_SUFFIX: &str =
    " File-level overwrite with freespace wiping on containing volume";

/// Post-wipe verification the agent must perform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequirements {
    /// Percentage of sectors to sample after the wipe (0-100).
    pub sample_percent: u8,
    /// Whether sampled sectors must be read back and compared.
    pub read_back_required: bool,
}

/// Output of the policy engine for one (media, scope, category) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Recommended sanitization technique.
    pub method: WipeMethod,
    /// Human-readable justification referencing NIST SP 800-88.
    pub rationale: String,
    /// Verification sampling the agent must perform.
    pub verification: VerificationRequirements,
    /// Operator-facing caveats, in the order they were raised.
    pub warnings: Vec<String>,
    /// Rough wall-clock estimate, e.g. `"15-30 minutes"`.
    pub estimated_duration: String,
}

impl Recommendation {
    fn baseline() -> Self {
        Self {
            method: WipeMethod::Overwrite,
            rationale: String::new(),
            verification: VerificationRequirements {
                sample_percent: 10,
                read_back_required: true,
            },
            warnings: Vec::new(),
            estimated_duration: "30-60 minutes".to_string(),
        }
    }
}

/// Recommend a wipe method for the given medium, scope, and category.
///
/// Pure and deterministic: identical inputs always yield an identical
/// [`Recommendation`].
pub fn recommend(media: MediaType, scope: WipeScope, category: NistCategory) -> Recommendation {
    let mut rec = Recommendation::baseline();

    match media {
        MediaType::Hdd => match category {
            NistCategory::Clear => {
                rec.method = WipeMethod::Overwrite;
                rec.rationale =
                    "Multi-pass overwrite suitable for HDD Clear category per NIST SP 800-88"
                        .to_string();
                rec.verification.sample_percent = 5;
                rec.estimated_duration = "15-30 minutes".to_string();
            }
            NistCategory::Purge => {
                rec.method = WipeMethod::AtaSecureErase;
                rec.rationale =
                    "ATA Secure Erase provides lab-resistant sanitization for HDD".to_string();
                rec.verification.sample_percent = 15;
                rec.estimated_duration = "30-90 minutes".to_string();
            }
            NistCategory::Destroy => {
                rec.method = WipeMethod::Overwrite;
                rec.rationale =
                    "Multiple overwrite passes followed by physical destruction".to_string();
                rec.verification.sample_percent = 25;
                rec.warnings.push(WARN_HDD_DESTROY.to_string());
                rec.estimated_duration = "60+ minutes".to_string();
            }
        },
        MediaType::Ssd | MediaType::Nvme => {
            match category {
                NistCategory::Clear => {
                    rec.method = WipeMethod::CryptoErase;
                    rec.rationale =
                        "Cryptographic erase effective for SSD/NVMe Clear category".to_string();
                    rec.verification.read_back_required = false;
                    rec.estimated_duration = "5-15 minutes".to_string();
                }
                NistCategory::Purge => {
                    rec.method = WipeMethod::NvmeSanitize;
                    rec.rationale =
                        "NVMe Sanitize command provides comprehensive SSD sanitization".to_string();
                    rec.verification.sample_percent = 0;
                    rec.verification.read_back_required = false;
                    rec.estimated_duration = "15-45 minutes".to_string();
                }
                NistCategory::Destroy => {
                    rec.method = WipeMethod::NvmeSanitize;
                    rec.rationale = "NVMe Sanitize followed by physical destruction".to_string();
                    rec.warnings.push(WARN_SSD_DESTROY.to_string());
                    rec.estimated_duration = "30-60 minutes".to_string();
                }
            }
            rec.warnings.push(WARN_WEAR_LEVELING.to_string());
        }
        MediaType::Flash | MediaType::Removable => {
            rec.method = WipeMethod::Overwrite;
            rec.rationale = "Multiple overwrite passes for flash media".to_string();
            rec.warnings.push(WARN_FLASH.to_string());
            rec.estimated_duration = "10-30 minutes".to_string();
        }
    }

    if scope == WipeScope::Folder {
        rec.method = WipeMethod::Overwrite;
        rec.rationale.push_str(FOLDER_RATIONALE_SUFFIX);
        rec.warnings.push(WARN_FOLDER.to_string());
    }

    rec
}

/// The methods that are physically applicable to a medium.
pub fn valid_methods_for_media(media: MediaType) -> &'static [WipeMethod] {
    match media {
        MediaType::Hdd => &[WipeMethod::Overwrite, WipeMethod::AtaSecureErase],
        MediaType::Ssd | MediaType::Nvme => &[
            WipeMethod::Overwrite,
            WipeMethod::CryptoErase,
            WipeMethod::NvmeSanitize,
        ],
        MediaType::Flash | MediaType::Removable => &[WipeMethod::Overwrite],
    }
}

/// Whether `method` may be applied to `media`.
pub fn is_method_valid_for_media(media: MediaType, method: WipeMethod) -> bool {
    valid_methods_for_media(media).contains(&method)
}
