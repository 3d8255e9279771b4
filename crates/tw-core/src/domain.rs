//! # Sanitization Vocabulary
//!
//! The closed set of media types, wipe scopes, NIST SP 800-88 categories,
//! wipe methods, and delivery methods. Every value has a stable
//! SCREAMING_CASE wire name used in JSON, SQL, and log fields.
//!
//! Adding a variant forces every `match` in the workspace (most importantly
//! the policy decision table) to handle it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseEnumError;

// ─── Media Type ──────────────────────────────────────────────────────

/// Physical storage medium of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    /// Rotating magnetic disk.
    Hdd,
    /// SATA/SAS solid-state drive.
    Ssd,
    /// NVMe solid-state drive.
    Nvme,
    /// Embedded flash (eMMC, UFS).
    Flash,
    /// Removable media (USB sticks, SD cards).
    Removable,
}

impl MediaType {
    /// Every media type, in declaration order.
    pub const ALL: [MediaType; 5] = [
        Self::Hdd,
        Self::Ssd,
        Self::Nvme,
        Self::Flash,
        Self::Removable,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hdd => "HDD",
            Self::Ssd => "SSD",
            Self::Nvme => "NVME",
            Self::Flash => "FLASH",
            Self::Removable => "REMOVABLE",
        }
    }

    /// Whether the medium is solid-state with a wear-levelling controller.
    pub fn is_solid_state(&self) -> bool {
        matches!(self, Self::Ssd | Self::Nvme)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HDD" => Ok(Self::Hdd),
            "SSD" => Ok(Self::Ssd),
            "NVME" => Ok(Self::Nvme),
            "FLASH" => Ok(Self::Flash),
            "REMOVABLE" => Ok(Self::Removable),
            _ => Err(ParseEnumError::new("media type", s)),
        }
    }
}

// ─── Wipe Scope ──────────────────────────────────────────────────────

/// What a job sanitizes: a whole drive or a folder on a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WipeScope {
    /// Entire physical drive.
    Drive,
    /// A directory tree on a mounted file system.
    Folder,
}

impl WipeScope {
    /// Every scope, in declaration order.
    pub const ALL: [WipeScope; 2] = [Self::Drive, Self::Folder];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drive => "DRIVE",
            Self::Folder => "FOLDER",
        }
    }
}

impl std::fmt::Display for WipeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WipeScope {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRIVE" => Ok(Self::Drive),
            "FOLDER" => Ok(Self::Folder),
            _ => Err(ParseEnumError::new("wipe scope", s)),
        }
    }
}

// ─── NIST Category ───────────────────────────────────────────────────

/// NIST SP 800-88 sanitization assurance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NistCategory {
    /// Protects against simple non-invasive recovery.
    Clear,
    /// Protects against laboratory recovery.
    Purge,
    /// Renders the medium unusable; requires physical destruction.
    Destroy,
}

impl NistCategory {
    /// Every category, in ascending assurance order.
    pub const ALL: [NistCategory; 3] = [Self::Clear, Self::Purge, Self::Destroy];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "CLEAR",
            Self::Purge => "PURGE",
            Self::Destroy => "DESTROY",
        }
    }
}

impl std::fmt::Display for NistCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NistCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CLEAR" => Ok(Self::Clear),
            "PURGE" => Ok(Self::Purge),
            "DESTROY" => Ok(Self::Destroy),
            _ => Err(ParseEnumError::new("NIST category", s)),
        }
    }
}

// ─── Wipe Method ─────────────────────────────────────────────────────

/// Sanitization technique executed by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WipeMethod {
    /// Software overwrite of every addressable block.
    Overwrite,
    /// ATA SECURITY ERASE UNIT.
    AtaSecureErase,
    /// Destruction of the media encryption key.
    CryptoErase,
    /// NVMe Sanitize command (block erase or crypto erase).
    NvmeSanitize,
}

impl WipeMethod {
    /// Every method, in declaration order.
    pub const ALL: [WipeMethod; 4] = [
        Self::Overwrite,
        Self::AtaSecureErase,
        Self::CryptoErase,
        Self::NvmeSanitize,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "OVERWRITE",
            Self::AtaSecureErase => "ATA_SECURE_ERASE",
            Self::CryptoErase => "CRYPTO_ERASE",
            Self::NvmeSanitize => "NVME_SANITIZE",
        }
    }
}

impl std::fmt::Display for WipeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WipeMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OVERWRITE" => Ok(Self::Overwrite),
            "ATA_SECURE_ERASE" => Ok(Self::AtaSecureErase),
            "CRYPTO_ERASE" => Ok(Self::CryptoErase),
            "NVME_SANITIZE" => Ok(Self::NvmeSanitize),
            _ => Err(ParseEnumError::new("wipe method", s)),
        }
    }
}

// ─── Delivery Method ─────────────────────────────────────────────────

/// Transport used to hand a certificate to a recycler partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    /// HTTP POST of a JSON envelope to the partner's webhook URL.
    Webhook,
    /// SMTP message with the certificate attached.
    Email,
    /// HTTP POST to the partner's certificate API with bearer auth.
    Api,
}

impl DeliveryMethod {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "WEBHOOK",
            Self::Email => "EMAIL",
            Self::Api => "API",
        }
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WEBHOOK" => Ok(Self::Webhook),
            "EMAIL" => Ok(Self::Email),
            "API" => Ok(Self::Api),
            _ => Err(ParseEnumError::new("delivery method", s)),
        }
    }
}
