//! Signer certificate details surfaced in verification results and
//! stored on certificate records as `caDetails`.

use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;
use der::Encode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_cert::name::Name;
use x509_cert::time::Time;
use x509_cert::Certificate;

use crate::error::CryptoError;

const ID_AT_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Placeholder when a name carries no common name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Identity and validity of the certificate that produced a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerDetails {
    /// Issuer common name.
    pub issuer: String,
    /// Subject common name.
    pub subject: String,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_to: DateTime<Utc>,
    /// Serial number, lowercase hex.
    pub serial_number: String,
    /// SHA-256 over the certificate DER, lowercase hex.
    pub fingerprint: String,
}

impl SignerDetails {
    /// Extract details from a parsed X.509 certificate.
    pub fn from_certificate(cert: &Certificate) -> Result<Self, CryptoError> {
        let tbs = &cert.tbs_certificate;
        Ok(Self {
            issuer: common_name(&tbs.issuer).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            subject: common_name(&tbs.subject).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            valid_from: to_utc(tbs.validity.not_before),
            valid_to: to_utc(tbs.validity.not_after),
            serial_number: hex::encode(tbs.serial_number.as_bytes()),
            fingerprint: fingerprint(cert)?,
        })
    }

    /// Whether `now` falls inside the validity window (inclusive).
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && now <= self.valid_to
    }
}

/// First common name in an X.509 name, if any.
pub fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == ID_AT_COMMON_NAME)
        .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
        .map(str::to_string)
}

/// SHA-256 fingerprint of a certificate's DER encoding.
pub fn fingerprint(cert: &Certificate) -> Result<String, CryptoError> {
    Ok(hex::encode(Sha256::digest(cert.to_der()?)))
}

pub(crate) fn to_utc(time: Time) -> DateTime<Utc> {
    let secs = i64::try_from(time.to_unix_duration().as_secs()).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
