//! # Offline Commands
//!
//! Commands that run without a datastore and print JSON to stdout:
//!
//! ```bash
//! trustwipe recommend --media SSD --scope DRIVE --category PURGE
//! trustwipe verify --document result.json --signature result.p7s --ca-bundle ca.pem
//! trustwipe hash --document result.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tw_core::{MediaType, NistCategory, WipeScope};
use tw_crypto::{Pkcs7Verifier, TrustStore, VerificationOutcome};
use tw_policy::Recommendation;

/// Exit code of `verify` when the signature does not verify.
pub const EXIT_INVALID_SIGNATURE: u8 = 2;

// ── recommend ───────────────────────────────────────────────────────

/// Arguments for `trustwipe recommend`.
#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// Storage medium (HDD, SSD, NVME, FLASH, REMOVABLE).
    #[arg(long)]
    pub media: MediaType,

    /// Wipe scope (DRIVE, FOLDER).
    #[arg(long, default_value = "DRIVE")]
    pub scope: WipeScope,

    /// NIST SP 800-88 category (CLEAR, PURGE, DESTROY).
    #[arg(long)]
    pub category: NistCategory,
}

/// Policy engine output for the requested triple.
pub fn recommendation(args: &RecommendArgs) -> Recommendation {
    tw_policy::recommend(args.media, args.scope, args.category)
}

/// Execute `trustwipe recommend`.
pub fn run_recommend(args: &RecommendArgs) -> Result<u8> {
    print_json(&recommendation(args))?;
    Ok(0)
}

// ── verify ──────────────────────────────────────────────────────────

/// Arguments for `trustwipe verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signed JSON document.
    #[arg(long)]
    pub document: PathBuf,

    /// Detached PKCS#7 signature (PEM or DER).
    #[arg(long)]
    pub signature: PathBuf,

    /// Trusted CA bundle (PEM). Without it the chain is not checked.
    #[arg(long, env = "CA_BUNDLE_PATH")]
    pub ca_bundle: Option<PathBuf>,
}

/// Verify the detached signature over the document.
pub fn verdict(args: &VerifyArgs) -> Result<VerificationOutcome> {
    let trust = match &args.ca_bundle {
        Some(path) => TrustStore::load(path)
            .with_context(|| format!("loading CA bundle {}", path.display()))?,
        None => {
            tracing::warn!("no CA bundle given, certificate chain will not be checked");
            TrustStore::empty()
        }
    };
    let document = read(&args.document)?;
    let signature = read(&args.signature)?;
    Ok(Pkcs7Verifier::new(Arc::new(trust)).verify(&document, &signature))
}

/// Execute `trustwipe verify`. Exits non-zero when the signature is invalid.
pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    let outcome = verdict(args)?;
    print_json(&outcome)?;
    Ok(if outcome.valid {
        0
    } else {
        EXIT_INVALID_SIGNATURE
    })
}

// ── hash ────────────────────────────────────────────────────────────

/// Arguments for `trustwipe hash`.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// JSON document to hash.
    #[arg(long)]
    pub document: PathBuf,
}

#[derive(Debug, Serialize)]
struct HashOutput<'a> {
    algorithm: &'static str,
    hash: &'a str,
}

/// Canonical SHA-256 content hash of a JSON object document.
pub fn document_hash(path: &Path) -> Result<String> {
    let bytes = read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    tw_state::certificate::content_hash(&value)
        .with_context(|| format!("hashing {}", path.display()))
}

/// Execute `trustwipe hash`.
pub fn run_hash(args: &HashArgs) -> Result<u8> {
    let hash = document_hash(&args.document)?;
    print_json(&HashOutput {
        algorithm: "sha256",
        hash: &hash,
    })?;
    Ok(0)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_core::WipeMethod;

    const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../tw-crypto/tests/fixtures");

    fn fixture(name: &str) -> PathBuf {
        Path::new(FIXTURES).join(name)
    }

    #[test]
    fn recommend_ssd_purge() {
        let rec = recommendation(&RecommendArgs {
            media: MediaType::Ssd,
            scope: WipeScope::Drive,
            category: NistCategory::Purge,
        });
        assert_eq!(rec.method, WipeMethod::NvmeSanitize);
    }

    #[test]
    fn expired_signer_is_invalid() {
        let outcome = verdict(&VerifyArgs {
            document: fixture("document.json"),
            signature: fixture("document.expired_signer.p7s"),
            ca_bundle: Some(fixture("ca.pem")),
        })
        .unwrap();
        assert!(!outcome.valid);
        assert!(outcome.errors.iter().any(|e| e.contains("expired")));
    }

    #[test]
    fn missing_ca_bundle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = verdict(&VerifyArgs {
            document: fixture("document.json"),
            signature: fixture("document.signer.p7s"),
            ca_bundle: Some(dir.path().join("absent.pem")),
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("absent.pem"));
    }

    #[test]
    fn unchecked_chain_without_bundle() {
        let outcome = verdict(&VerifyArgs {
            document: fixture("document.json"),
            signature: fixture("document.signer.p7s"),
            ca_bundle: None,
        })
        .unwrap();
        assert!(!outcome.chain_checked);
    }

    #[test]
    fn hash_ignores_key_order_and_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, br#"{"serial":"WD-1","passes":3}"#).unwrap();
        std::fs::write(&b, b"{\n  \"passes\": 3,\n  \"serial\": \"WD-1\"\n}\n").unwrap();

        let ha = document_hash(&a).unwrap();
        assert_eq!(ha, document_hash(&b).unwrap());
        assert_eq!(ha.len(), 64);
    }

    #[test]
    fn hash_rejects_non_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.json");
        std::fs::write(&path, b"[1, 2, 3]").unwrap();
        assert!(document_hash(&path).is_err());

        std::fs::write(&path, b"not json").unwrap();
        assert!(document_hash(&path).is_err());
    }
}
