//! Derivation parameters and curve identifiers.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::puf::check_dimensions;
use crate::Error;

/// Named SEC curves a caller may ask for.
///
/// Only [`CurveId::Secp256r1`] is supported for derivation; the other names
/// parse so that configuration naming them fails with
/// [`Error::CurveMismatch`] instead of a generic parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveId {
    /// NIST P-256.
    #[serde(alias = "prime256v1", alias = "P-256", alias = "p256")]
    Secp256r1,
    /// NIST P-384.
    #[serde(alias = "P-384", alias = "p384")]
    Secp384r1,
    /// NIST P-521.
    #[serde(alias = "P-521", alias = "p521")]
    Secp521r1,
    /// Koblitz curve used by Bitcoin.
    #[serde(alias = "k256")]
    Secp256k1,
}

impl CurveId {
    const SUPPORTED: &'static [CurveId] = &[CurveId::Secp256r1];

    /// Curves [`crate::derive_keypair`] accepts.
    pub fn supported() -> &'static [CurveId] {
        Self::SUPPORTED
    }

    /// SEC name of the curve.
    pub fn name(self) -> &'static str {
        match self {
            CurveId::Secp256r1 => "secp256r1",
            CurveId::Secp384r1 => "secp384r1",
            CurveId::Secp521r1 => "secp521r1",
            CurveId::Secp256k1 => "secp256k1",
        }
    }

    /// Byte width of a field element.
    pub fn field_byte_width(self) -> usize {
        match self {
            CurveId::Secp256r1 | CurveId::Secp256k1 => 32,
            CurveId::Secp384r1 => 48,
            CurveId::Secp521r1 => 66,
        }
    }

    /// Length of an uncompressed SEC1 point in bytes.
    pub fn encoded_point_len(self) -> usize {
        1 + 2 * self.field_byte_width()
    }

    /// Length of the hex-encoded uncompressed point.
    pub fn encoded_hex_len(self) -> usize {
        2 * self.encoded_point_len()
    }

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    /// Fail with [`Error::CurveMismatch`] unless the curve is supported.
    pub fn ensure_supported(self) -> Result<(), Error> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(Error::CurveMismatch {
                curve: self.name().to_string(),
            })
        }
    }
}

impl Default for CurveId {
    fn default() -> Self {
        CurveId::Secp256r1
    }
}

impl fmt::Display for CurveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CurveId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256r1" | "prime256v1" | "p-256" | "p256" => Ok(CurveId::Secp256r1),
            "secp384r1" | "p-384" | "p384" => Ok(CurveId::Secp384r1),
            "secp521r1" | "p-521" | "p521" => Ok(CurveId::Secp521r1),
            "secp256k1" | "k256" => Ok(CurveId::Secp256k1),
            _ => Err(Error::CurveMismatch {
                curve: s.to_string(),
            }),
        }
    }
}

fn default_harvest() -> usize {
    1
}

/// Everything that determines a derived identity.
///
/// Two equal parameter sets always produce the same public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationParams {
    /// Number of challenge bits (device model width).
    pub bit_length: usize,
    /// Seed identifying the simulated device instance.
    pub device_seed: u64,
    /// Seed of the challenge stream.
    pub challenge_seed: u64,
    /// Target curve.
    #[serde(default)]
    pub curve: CurveId,
    /// Number of challenges evaluated, one response bit each.
    #[serde(default = "default_harvest")]
    pub harvest: usize,
}

impl Default for DerivationParams {
    fn default() -> Self {
        Self {
            bit_length: 256,
            device_seed: 45,
            challenge_seed: 1,
            curve: CurveId::Secp256r1,
            harvest: 1,
        }
    }
}

impl DerivationParams {
    /// Single-challenge parameters on the default curve.
    pub fn new(bit_length: usize, device_seed: u64, challenge_seed: u64) -> Self {
        Self {
            bit_length,
            device_seed,
            challenge_seed,
            ..Self::default()
        }
    }

    pub fn with_curve(mut self, curve: CurveId) -> Self {
        self.curve = curve;
        self
    }

    /// Evaluate `harvest` challenges instead of one.
    pub fn with_harvest(mut self, harvest: usize) -> Self {
        self.harvest = harvest;
        self
    }

    /// Evaluate one challenge per challenge bit.
    pub fn with_full_harvest(self) -> Self {
        let bits = self.bit_length;
        self.with_harvest(bits)
    }

    /// Check the parameters without building anything.
    ///
    /// Reports the same error the pipeline would: curve first, then
    /// `bit_length`, then `harvest`.
    pub fn validate(&self) -> Result<(), Error> {
        self.curve.ensure_supported()?;
        check_dimensions(self.bit_length, self.harvest)
    }

    /// Parse and validate parameters from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let params: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidParameter(format!("malformed parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
