//! pufkey: deterministic elliptic-curve identities rooted in PUF responses.
//!
//! This crate turns the response of a Physically Unclonable Function (PUF)
//! into a reproducible P-256 keypair whose public half can be registered
//! with an external key ledger.
//!
//! # Architecture
//!
//! The pipeline is strictly one-directional:
//!
//! ```text
//! (bit_length, device_seed) ──► ArbiterPuf ─┐
//!                                           ├─► Response ─► SHA-256 ─► scalar ─► keypair ─► hex
//! (bit_length, challenge_seed) ► Challenge ─┘
//! ```
//!
//! - [`puf`]: simulated arbiter PUF, challenge generation and response packing
//! - [`derive`]: digest, reduction into `[1, n)` and SEC1 export
//! - [`quality`]: accounting of how many response bits were really harvested
//! - [`registry`]: typed calls against an injected [`KeyRegistry`] client
//! - [`config`]: serializable [`DerivationParams`] and [`CurveId`]
//!
//! Every stage is a pure function of its explicit parameters. Generators are
//! seeded and created inside each call, so derivations can run on any number
//! of threads without coordination.
//!
//! # Example
//!
//! ```rust
//! use pufkey::{derive_public_key, CurveId};
//!
//! let public_key = derive_public_key(256, 45, 1, CurveId::Secp256r1).unwrap();
//! assert_eq!(public_key.len(), 130);
//! assert!(public_key.starts_with("04"));
//! ```
//!
//! # Harvested entropy
//!
//! By default one challenge is evaluated and the key is stretched out of a
//! single response bit, so a device can only ever map to one of two keys.
//! Raise [`DerivationParams::harvest`] to evaluate more challenges; the
//! [`QualityPolicy`] reports how many bits a response actually carries.

#![forbid(unsafe_code)]

pub mod config;
pub mod derive;
pub mod puf;
pub mod quality;
pub mod registry;
pub mod traits;

// Re-exports
pub use config::{CurveId, DerivationParams};
pub use derive::{derive_keypair, DerivedKey, MAX_DERIVATION_ATTEMPTS};
pub use puf::{
    generate_response, generate_response_with, harvest_response, ArbiterPuf, Challenge,
    ChallengeStream, Response, MAX_BIT_LENGTH, MAX_HARVEST,
};
pub use quality::{Anomaly, AnomalyKind, QualityPolicy, QualityReport, ResponseStats};
pub use registry::{
    BatchFailure, BatchReport, KeyRecord, LedgerCall, LedgerOutcome, Provisioned, Provisioner,
    Receipt, RegistryError,
};
pub use traits::{KeyRegistry, PufModel};

/// Error types for pufkey operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A construction input is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The device model could not be instantiated.
    #[error("Device model construction failed: {reason}")]
    ModelConstruction { reason: String },

    /// The requested curve is outside the supported set.
    #[error("Unsupported curve: {curve}")]
    CurveMismatch { curve: String },

    /// No valid non-zero scalar after the bounded retry.
    #[error("Key derivation failed after {attempts} attempts")]
    Derivation { attempts: u32 },

    /// The ledger client rejected an operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A re-derived public key differs from the registered one.
    #[error("Identity mismatch for key {key}")]
    IdentityMismatch { key: String },
}

/// Derive the uncompressed public key of a simulated device as lowercase hex.
///
/// Evaluates one challenge (see the crate docs on harvested entropy). The
/// result has `2 * (1 + 2 * field_byte_width)` characters, 130 for P-256.
///
/// # Errors
///
/// - [`Error::CurveMismatch`] if `curve` is not supported
/// - [`Error::InvalidParameter`] if `bit_length` is 0
/// - [`Error::ModelConstruction`] if `bit_length` exceeds [`MAX_BIT_LENGTH`]
pub fn derive_public_key(
    bit_length: usize,
    device_seed: u64,
    challenge_seed: u64,
    curve: CurveId,
) -> Result<String, Error> {
    let params = DerivationParams::new(bit_length, device_seed, challenge_seed).with_curve(curve);
    derive_public_key_with(&params)
}

/// Same as [`derive_public_key`], driven by a full parameter set.
pub fn derive_public_key_with(params: &DerivationParams) -> Result<String, Error> {
    derive_key(params).map(|key| key.public_key_hex())
}

/// Run the whole pipeline and return the derived key pair.
///
/// The curve is checked before any device model is built, so an unsupported
/// curve never produces partial output.
pub fn derive_key(params: &DerivationParams) -> Result<DerivedKey, Error> {
    params.curve.ensure_supported()?;

    let response = generate_response_with(params)?;

    let report = QualityPolicy::default().validate(&response);
    if !report.acceptable {
        tracing::warn!(
            harvested_bits = report.stats.bits,
            anomalies = report.anomalies.len(),
            "response carries less entropy than the quality floor"
        );
    }

    derive_keypair(response.as_bytes(), params.curve)
}
