//! # Trust Store
//!
//! The set of CA certificates a signer chain must terminate in. Loaded
//! once at startup from a PEM bundle and shared read-only afterwards.
//!
//! Individual certificates that fail to parse are skipped with a warning;
//! a bundle in which nothing parses is an error for [`TrustStore::load`]
//! and an empty (degraded) store for [`TrustStore::load_or_degraded`].

use std::path::{Path, PathBuf};

use der::DecodePem;
use x509_cert::Certificate;

use crate::error::CryptoError;
use crate::signer::{common_name, UNKNOWN_NAME};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Trusted CA certificates.
#[derive(Clone, Default)]
pub struct TrustStore {
    anchors: Vec<Certificate>,
    source: Option<PathBuf>,
}

impl TrustStore {
    /// A store with no anchors. Chain validation is skipped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse every `CERTIFICATE` block in a PEM bundle.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CryptoError> {
        let text = String::from_utf8_lossy(pem);
        let mut anchors = Vec::new();
        let mut rest = text.as_ref();

        while let Some(start) = rest.find(PEM_BEGIN) {
            let Some(end) = rest[start..].find(PEM_END) else {
                tracing::warn!("CA bundle has an unterminated certificate block");
                break;
            };
            let block_end = start + end + PEM_END.len();
            match Certificate::from_pem(&rest[start..block_end]) {
                Ok(cert) => anchors.push(cert),
                Err(e) => tracing::warn!(error = %e, "skipping unparseable CA certificate"),
            }
            rest = &rest[block_end..];
        }

        Ok(Self {
            anchors,
            source: None,
        })
    }

    /// Load a bundle from disk, failing if nothing usable is found.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();
        let err = |reason: String| CryptoError::TrustStore {
            path: path.display().to_string(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| err(e.to_string()))?;
        let mut store = Self::from_pem(&bytes)?;
        if store.anchors.is_empty() {
            return Err(err("no certificates found".to_string()));
        }
        store.source = Some(path.to_path_buf());
        tracing::info!(
            path = %path.display(),
            count = store.anchors.len(),
            "loaded CA bundle"
        );
        Ok(store)
    }

    /// Load a bundle from disk, falling back to an empty store.
    pub fn load_or_degraded(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to load CA bundle, proceeding without certificate chain validation"
                );
                Self::empty()
            }
        }
    }

    /// Whether at least one anchor is present.
    pub fn is_loaded(&self) -> bool {
        !self.anchors.is_empty()
    }

    /// Number of anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// The trusted certificates.
    pub fn anchors(&self) -> &[Certificate] {
        &self.anchors
    }

    /// File the store was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subjects: Vec<String> = self
            .anchors
            .iter()
            .map(|c| {
                common_name(&c.tbs_certificate.subject).unwrap_or_else(|| UNKNOWN_NAME.to_string())
            })
            .collect();
        f.debug_struct("TrustStore")
            .field("anchors", &subjects)
            .field("source", &self.source)
            .finish()
    }
}
