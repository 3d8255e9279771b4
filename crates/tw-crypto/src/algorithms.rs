//! # Algorithm Dispatch
//!
//! Maps the OIDs found in CMS structures and X.509 certificates onto the
//! concrete RustCrypto primitives. Supported: RSA PKCS#1 v1.5 and ECDSA
//! over P-256, each with SHA-256, SHA-384, or SHA-512.

use der::asn1::ObjectIdentifier;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::CryptoError;

// ─── Object Identifiers ──────────────────────────────────────────────

pub const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
pub const ID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
pub const ID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
pub const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
pub const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

pub const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
pub const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
pub const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
pub const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");

// ─── Hashes ──────────────────────────────────────────────────────────

/// Message digest algorithms accepted in signer infos and certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Resolve a digest algorithm OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self, CryptoError> {
        [
            (ID_SHA256, Self::Sha256),
            (ID_SHA384, Self::Sha384),
            (ID_SHA512, Self::Sha512),
        ]
        .into_iter()
        .find(|(known, _)| known == oid)
        .map(|(_, hash)| hash)
        .ok_or_else(|| unsupported(oid))
    }

    /// Hash `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn pkcs1v15(self) -> Pkcs1v15Sign {
        match self {
            Self::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            Self::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
            Self::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }
}

// ─── Signatures ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    EcP256,
}

/// Resolve a signature algorithm OID into a key family and hash.
///
/// CMS signer infos commonly carry the bare key algorithm (`rsaEncryption`
/// or `id-ecPublicKey`) and put the hash in a separate field; `digest`
/// supplies it in that case.
fn resolve_scheme(
    signature_alg: &ObjectIdentifier,
    digest: Option<HashAlgorithm>,
) -> Result<(KeyFamily, HashAlgorithm), CryptoError> {
    const COMBINED: [(ObjectIdentifier, KeyFamily, HashAlgorithm); 6] = [
        (SHA256_WITH_RSA, KeyFamily::Rsa, HashAlgorithm::Sha256),
        (SHA384_WITH_RSA, KeyFamily::Rsa, HashAlgorithm::Sha384),
        (SHA512_WITH_RSA, KeyFamily::Rsa, HashAlgorithm::Sha512),
        (ECDSA_WITH_SHA256, KeyFamily::EcP256, HashAlgorithm::Sha256),
        (ECDSA_WITH_SHA384, KeyFamily::EcP256, HashAlgorithm::Sha384),
        (ECDSA_WITH_SHA512, KeyFamily::EcP256, HashAlgorithm::Sha512),
    ];

    if let Some((_, family, hash)) = COMBINED.iter().find(|(oid, _, _)| oid == signature_alg) {
        return Ok((*family, *hash));
    }
    let family = if *signature_alg == RSA_ENCRYPTION {
        KeyFamily::Rsa
    } else if *signature_alg == ID_EC_PUBLIC_KEY {
        KeyFamily::EcP256
    } else {
        return Err(unsupported(signature_alg));
    };
    digest
        .map(|d| (family, d))
        .ok_or_else(|| unsupported(signature_alg))
}

/// Verify `signature` over `message` with the key in `spki`.
///
/// `message` is hashed here; callers pass the exact signed bytes (the
/// DER of the signed attributes, or a certificate's TBS encoding).
pub fn verify_signature(
    spki: &SubjectPublicKeyInfoOwned,
    signature_alg: &ObjectIdentifier,
    digest: Option<HashAlgorithm>,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let (family, hash) = resolve_scheme(signature_alg, digest)?;
    let key_bytes = spki.subject_public_key.raw_bytes();
    let hashed = hash.digest(message);

    match family {
        KeyFamily::Rsa => {
            if spki.algorithm.oid != RSA_ENCRYPTION {
                return Err(CryptoError::InvalidKey(format!(
                    "expected an RSA key, found {}",
                    spki.algorithm.oid
                )));
            }
            let key = RsaPublicKey::from_pkcs1_der(key_bytes)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            key.verify(hash.pkcs1v15(), &hashed, signature)
                .map_err(|_| CryptoError::SignatureMismatch)
        }
        KeyFamily::EcP256 => {
            if spki.algorithm.oid != ID_EC_PUBLIC_KEY {
                return Err(CryptoError::InvalidKey(format!(
                    "expected an EC key, found {}",
                    spki.algorithm.oid
                )));
            }
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            let sig = p256::ecdsa::Signature::from_der(signature)
                .map_err(|_| CryptoError::SignatureMismatch)?;
            key.verify_prehash(&hashed, &sig)
                .map_err(|_| CryptoError::SignatureMismatch)
        }
    }
}

fn unsupported(oid: &ObjectIdentifier) -> CryptoError {
    CryptoError::UnsupportedAlgorithm {
        oid: oid.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_oids_resolve() {
        assert_eq!(HashAlgorithm::from_oid(&ID_SHA256).unwrap(), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::from_oid(&ID_SHA512).unwrap(), HashAlgorithm::Sha512);
        let md5 = ObjectIdentifier::new_unwrap("1.2.840.113549.2.5");
        assert!(matches!(
            HashAlgorithm::from_oid(&md5),
            Err(CryptoError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(HashAlgorithm::Sha256.digest(b"x").len(), 32);
        assert_eq!(HashAlgorithm::Sha384.digest(b"x").len(), 48);
        assert_eq!(HashAlgorithm::Sha512.digest(b"x").len(), 64);
    }

    #[test]
    fn bare_key_algorithm_needs_digest() {
        assert!(resolve_scheme(&RSA_ENCRYPTION, None).is_err());
        assert_eq!(
            resolve_scheme(&RSA_ENCRYPTION, Some(HashAlgorithm::Sha384)).unwrap(),
            (KeyFamily::Rsa, HashAlgorithm::Sha384)
        );
        assert_eq!(
            resolve_scheme(&ECDSA_WITH_SHA256, Some(HashAlgorithm::Sha512)).unwrap(),
            (KeyFamily::EcP256, HashAlgorithm::Sha256)
        );
    }
}
