//! Key derivation engine: response bytes to a P-256 key pair.
//!
//! The response is hashed with SHA-256 (the hash acts as an extractor for
//! biased, correlated PUF bits), read as a big-endian integer and reduced
//! modulo the group order. A candidate that reduces to zero is replaced by
//! `SHA-256(response || attempt)`, for at most [`MAX_DERIVATION_ATTEMPTS`].

use core::fmt;

use p256::elliptic_curve::bigint::U256;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{NonZeroScalar, PublicKey, Scalar, SecretKey};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::config::CurveId;
use crate::Error;

/// Upper bound on scalar candidates tried for one response.
pub const MAX_DERIVATION_ATTEMPTS: u32 = 8;

/// Key pair derived from a PUF response.
///
/// The secret key zeroizes itself on drop and is never printed.
#[derive(Clone)]
pub struct DerivedKey {
    curve: CurveId,
    secret: SecretKey,
    public: PublicKey,
    attempts: u32,
}

impl DerivedKey {
    pub fn curve(&self) -> CurveId {
        self.curve
    }

    /// Private scalar as big-endian bytes.
    ///
    /// This is key material: keep it out of logs and drop it promptly.
    pub fn scalar_bytes(&self) -> Zeroizing<[u8; 32]> {
        let bytes = Zeroizing::new(self.secret.to_bytes());
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&bytes);
        out
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Uncompressed SEC1 encoding: `0x04 || X || Y`.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    /// [`DerivedKey::public_key_bytes`] as lowercase hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Number of scalar candidates consumed (1 unless a candidate reduced to 0).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Constant-time comparison of the public key against a hex encoding.
    ///
    /// Hex case is ignored; malformed hex never matches.
    pub fn matches_public_hex(&self, public_key_hex: &str) -> bool {
        match hex::decode(public_key_hex) {
            Ok(other) => self.public_key_bytes().ct_eq(&other).into(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("curve", &self.curve)
            .field("public_key", &self.public_key_hex())
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Scalar candidate digest for a given attempt.
fn candidate_digest(response: &[u8], attempt: u32) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(response);
    if attempt > 0 {
        hasher.update(attempt.to_be_bytes());
    }

    let mut digest = Zeroizing::new([0u8; 32]);
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Reduce a big-endian candidate modulo the P-256 order, rejecting zero.
fn reduce_candidate(candidate: &[u8; 32]) -> Option<NonZeroScalar> {
    let scalar = <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(candidate));
    Option::from(NonZeroScalar::new(scalar))
}

/// Bounded retry over scalar candidates.
fn derive_scalar<F>(mut candidate: F) -> Result<(NonZeroScalar, u32), Error>
where
    F: FnMut(u32) -> Zeroizing<[u8; 32]>,
{
    for attempt in 0..MAX_DERIVATION_ATTEMPTS {
        if let Some(scalar) = reduce_candidate(&candidate(attempt)) {
            return Ok((scalar, attempt + 1));
        }
        tracing::warn!(attempt, "scalar candidate reduced to zero, retrying");
    }
    Err(Error::Derivation {
        attempts: MAX_DERIVATION_ATTEMPTS,
    })
}

fn build_key(curve: CurveId, scalar: NonZeroScalar, attempts: u32) -> DerivedKey {
    let secret = SecretKey::from(scalar);
    let public = secret.public_key();
    DerivedKey {
        curve,
        secret,
        public,
        attempts,
    }
}

/// Map response bytes to a key pair on `curve`.
///
/// # Errors
///
/// - [`Error::CurveMismatch`] if `curve` is not supported
/// - [`Error::Derivation`] if every candidate reduced to zero
pub fn derive_keypair(response_bytes: &[u8], curve: CurveId) -> Result<DerivedKey, Error> {
    curve.ensure_supported()?;

    let (scalar, attempts) = derive_scalar(|attempt| candidate_digest(response_bytes, attempt))?;
    tracing::debug!(%curve, attempts, "derived key pair");

    Ok(build_key(curve, scalar, attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::elliptic_curve::{Curve, PrimeField};
    use p256::NistP256;

    const ORDER_HEX: &str = "ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551";

    /// Public key for the response word `0` (eight zero bytes).
    const ZERO_BIT_PUBLIC: &str = "049a4bb97974cc723a502150ddc2f39d4f0f041f33604c3483e7bba3473dfa441b617e310ecbbfcdda3142c0f98e87b8c7e608254ec136b9cb17b2fa27545221db";

    /// Public key for the response word `1`.
    const ONE_BIT_PUBLIC: &str = "044083a64afb4b630ce7683674a6cdcebc7007aef7cb08f10b2cd491b6ce24ca1204f88bd2a2068e27591f1c5cfbd4fddf9a51f7b2360d784ee1e8fbec8f7476a6";

    fn order_bytes() -> [u8; 32] {
        let mut out = [0u8; 32];
        hex::decode_to_slice(ORDER_HEX, &mut out).unwrap();
        out
    }

    #[test]
    fn test_known_vectors() {
        let zero = derive_keypair(&[0u8; 8], CurveId::Secp256r1).unwrap();
        assert_eq!(zero.public_key_hex(), ZERO_BIT_PUBLIC);

        let one = derive_keypair(&[1, 0, 0, 0, 0, 0, 0, 0], CurveId::Secp256r1).unwrap();
        assert_eq!(one.public_key_hex(), ONE_BIT_PUBLIC);
        assert_eq!(one.attempts(), 1);
    }

    #[test]
    fn test_scalar_is_digest_below_order() {
        // SHA-256 of eight zero bytes is already below the order
        let key = derive_keypair(&[0u8; 8], CurveId::Secp256r1).unwrap();
        let expected = Sha256::digest([0u8; 8]);
        assert_eq!(&key.scalar_bytes()[..], expected.as_slice());
    }

    #[test]
    fn test_order_reduces_to_zero() {
        assert!(reduce_candidate(&order_bytes()).is_none());
        assert!(reduce_candidate(&[0u8; 32]).is_none());
    }

    #[test]
    fn test_order_plus_one_reduces_to_one() {
        let mut candidate = order_bytes();
        candidate[31] += 1;
        let scalar = reduce_candidate(&candidate).unwrap();
        let mut one = [0u8; 32];
        one[31] = 1;
        assert_eq!(scalar.to_repr().as_slice(), &one);
    }

    #[test]
    fn test_retry_after_zero_candidate() {
        let order = order_bytes();
        let (scalar, attempts) = derive_scalar(|attempt| {
            if attempt == 0 {
                Zeroizing::new(order)
            } else {
                candidate_digest(b"retry", attempt)
            }
        })
        .unwrap();
        assert_eq!(attempts, 2);
        let expected = reduce_candidate(&candidate_digest(b"retry", 1)).unwrap();
        assert_eq!(scalar.to_repr(), expected.to_repr());
    }

    #[test]
    fn test_retry_is_bounded() {
        let mut calls = 0u32;
        let err = derive_scalar(|_| {
            calls += 1;
            Zeroizing::new([0u8; 32])
        })
        .err().unwrap();
        assert!(matches!(
            err,
            Error::Derivation { attempts } if attempts == MAX_DERIVATION_ATTEMPTS
        ));
        assert_eq!(calls, MAX_DERIVATION_ATTEMPTS);
    }

    #[test]
    fn test_retry_digest_differs_from_first() {
        assert_ne!(*candidate_digest(b"x", 0), *candidate_digest(b"x", 1));
        assert_eq!(*candidate_digest(b"x", 0), <[u8; 32]>::from(Sha256::digest(b"x")));
    }

    #[test]
    fn test_unsupported_curve() {
        for curve in [CurveId::Secp384r1, CurveId::Secp521r1, CurveId::Secp256k1] {
            let err = derive_keypair(&[0u8; 8], curve).unwrap_err();
            assert!(matches!(err, Error::CurveMismatch { .. }));
        }
    }

    #[test]
    fn test_encoding_is_on_curve() {
        let key = derive_keypair(b"some response", CurveId::Secp256r1).unwrap();
        let bytes = key.public_key_bytes();
        assert_eq!(bytes.len(), CurveId::Secp256r1.encoded_point_len());
        assert_eq!(bytes[0], 0x04);
        let decoded = PublicKey::from_sec1_bytes(&bytes).unwrap();
        assert_eq!(&decoded, key.public_key());
    }

    #[test]
    fn test_scalar_in_range() {
        let key = derive_keypair(b"range", CurveId::Secp256r1).unwrap();
        let scalar = U256::from_be_slice(&key.scalar_bytes()[..]);
        assert!(scalar > U256::ZERO);
        assert!(scalar < NistP256::ORDER);
    }

    #[test]
    fn test_matches_public_hex() {
        let key = derive_keypair(&[0u8; 8], CurveId::Secp256r1).unwrap();
        assert!(key.matches_public_hex(ZERO_BIT_PUBLIC));
        assert!(key.matches_public_hex(&ZERO_BIT_PUBLIC.to_uppercase()));
        assert!(!key.matches_public_hex(ONE_BIT_PUBLIC));
        assert!(!key.matches_public_hex("04zz"));
        assert!(!key.matches_public_hex(""));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = derive_keypair(&[0u8; 8], CurveId::Secp256r1).unwrap();
        let rendered = format!("{:?}", key);
        let scalar_hex = hex::encode(&key.scalar_bytes()[..]);
        assert!(rendered.contains(ZERO_BIT_PUBLIC));
        assert!(!rendered.contains(&scalar_hex));
    }
}
