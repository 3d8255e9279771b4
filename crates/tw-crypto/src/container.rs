//! # Signature Containers
//!
//! Agents upload the detached signature in whatever form their tooling
//! produced: PEM (`CMS` or `PKCS7` label), raw DER, or bare base64. All
//! three decode to the same CMS `ContentInfo` carrying `SignedData`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::asn1::ObjectIdentifier;
use der::{Decode, Encode};
use x509_cert::Certificate;

use crate::error::CryptoError;

/// `id-signedData` (RFC 5652 §5.1).
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// A decoded CMS signed-data value plus the certificates it embeds.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    /// The `SignedData` structure.
    pub signed_data: SignedData,
    /// X.509 certificates carried in the `certificates` field, in order.
    pub certificates: Vec<Certificate>,
}

impl SignedEnvelope {
    /// Decode a signature blob in any supported transport form.
    pub fn decode(raw: &[u8]) -> Result<Self, CryptoError> {
        let der_bytes = unwrap_transport(raw)?;
        let info = ContentInfo::from_der(&der_bytes)
            .map_err(|e| malformed(format!("invalid CMS structure: {e}")))?;
        if info.content_type != ID_SIGNED_DATA {
            return Err(malformed(format!(
                "content type {} is not signed-data",
                info.content_type
            )));
        }
        let signed_data = SignedData::from_der(&info.content.to_der()?)
            .map_err(|e| malformed(format!("invalid signed-data: {e}")))?;

        let certificates = signed_data
            .certificates
            .as_ref()
            .map(|set| {
                set.0
                    .iter()
                    .filter_map(|choice| match choice {
                        CertificateChoices::Certificate(cert) => Some(cert.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            signed_data,
            certificates,
        })
    }
}

/// Strip PEM armour or base64 encoding, returning DER bytes.
pub fn unwrap_transport(raw: &[u8]) -> Result<Vec<u8>, CryptoError> {
    // DER SEQUENCE tag.
    if raw.first() == Some(&0x30) {
        return Ok(raw.to_vec());
    }
    let text = std::str::from_utf8(raw)
        .map_err(|_| malformed("signature is neither DER nor text".to_string()))?
        .trim();

    let body: String = if text.starts_with("-----BEGIN") {
        text.lines()
            .map(str::trim)
            .skip(1)
            .take_while(|line| !line.starts_with("-----END"))
            .filter(|line| !line.contains(':'))
            .collect()
    } else {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    };

    if body.is_empty() {
        return Err(malformed("signature is empty".to_string()));
    }
    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| malformed(format!("invalid base64: {e}")))
}

fn malformed(reason: String) -> CryptoError {
    CryptoError::MalformedSignature(reason)
}
