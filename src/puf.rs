//! Simulated arbiter PUF and deterministic challenge/response generation.
//!
//! The device is modelled as a linear threshold function over the parity
//! features of a ±1 challenge. Stage weights and the bias are drawn from a
//! standard normal distribution using a ChaCha20 generator seeded with the
//! device seed, so `(bit_length, device_seed)` fully determines the device.
//!
//! Generators are created inside each constructor. Nothing here keeps state
//! between calls.
//!
//! # Portability
//!
//! The generator output is platform independent, but the normal samples go
//! through `f64::ln` and `f64::cos`, which are not guaranteed to round
//! identically on every target or libm. A challenge whose delay lands within
//! a few ulps of zero may threshold differently across machines. Enrol and
//! verify a device on the same platform family, or harvest enough bits that
//! such a flip is caught by verification.

use core::f64::consts::TAU;
use core::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::config::DerivationParams;
use crate::{Error, PufModel};

/// Largest supported challenge width.
pub const MAX_BIT_LENGTH: usize = 1 << 16;

/// Largest number of challenges evaluated for one response.
pub const MAX_HARVEST: usize = 4096;

/// Bytes per packed response bit (one little-endian `i64` per bit).
const BIT_WORD_BYTES: usize = 8;

fn check_bit_length(bit_length: usize) -> Result<(), Error> {
    if bit_length == 0 {
        return Err(Error::InvalidParameter(
            "bit_length must be greater than 0".into(),
        ));
    }
    if bit_length > MAX_BIT_LENGTH {
        return Err(Error::ModelConstruction {
            reason: format!(
                "bit_length {} exceeds maximum {}",
                bit_length, MAX_BIT_LENGTH
            ),
        });
    }
    Ok(())
}

fn check_harvest(harvest: usize) -> Result<(), Error> {
    if harvest == 0 {
        return Err(Error::InvalidParameter(
            "harvest must be greater than 0".into(),
        ));
    }
    if harvest > MAX_HARVEST {
        return Err(Error::ModelConstruction {
            reason: format!("harvest {} exceeds maximum {}", harvest, MAX_HARVEST),
        });
    }
    Ok(())
}

/// Range checks shared by [`harvest_response`] and [`DerivationParams::validate`].
///
/// `bit_length` is checked before `harvest`.
pub(crate) fn check_dimensions(bit_length: usize, harvest: usize) -> Result<(), Error> {
    check_bit_length(bit_length)?;
    check_harvest(harvest)
}

/// Draw one standard normal sample (Box-Muller).
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // u1 in (0, 1] keeps ln finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Simulated arbiter PUF instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterPuf {
    device_seed: u64,
    /// Per-stage delay differences.
    weights: Vec<f64>,
    bias: f64,
}

impl ArbiterPuf {
    /// Build the device identified by `(bit_length, device_seed)`.
    pub fn new(bit_length: usize, device_seed: u64) -> Result<Self, Error> {
        check_bit_length(bit_length)?;

        let mut rng = ChaCha20Rng::seed_from_u64(device_seed);
        let mut weights = Vec::new();
        weights.try_reserve_exact(bit_length).map_err(|e| Error::ModelConstruction {
            reason: format!("cannot allocate {} stage weights: {}", bit_length, e),
        })?;
        weights.extend((0..bit_length).map(|_| standard_normal(&mut rng)));
        let bias = standard_normal(&mut rng);

        Ok(Self {
            device_seed,
            weights,
            bias,
        })
    }

    /// Seed this device was built from.
    pub fn device_seed(&self) -> u64 {
        self.device_seed
    }

    /// Stage weights, in challenge order.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Constant delay offset added to every evaluation.
    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl PufModel for ArbiterPuf {
    fn bit_length(&self) -> usize {
        self.weights.len()
    }

    fn eval(&self, challenge: &Challenge) -> Result<f64, Error> {
        if challenge.len() != self.weights.len() {
            return Err(Error::InvalidParameter(format!(
                "challenge has {} bits, device expects {}",
                challenge.len(),
                self.weights.len()
            )));
        }

        // Parity feature i is the product of challenge bits i..n
        let mut parity = 1i8;
        let mut delay = self.bias;
        for (&c, &w) in challenge.bits.iter().zip(&self.weights).rev() {
            parity *= c;
            delay += w * f64::from(parity);
        }
        Ok(delay)
    }
}

/// A ±1 challenge vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Challenge {
    bits: Vec<i8>,
}

impl Challenge {
    /// First challenge of the stream seeded with `challenge_seed`.
    pub fn from_seed(bit_length: usize, challenge_seed: u64) -> Result<Self, Error> {
        let mut stream = ChallengeStream::new(bit_length, challenge_seed)?;
        Ok(stream.next_challenge())
    }

    /// Wrap explicit ±1 values.
    pub fn from_bits(bits: Vec<i8>) -> Result<Self, Error> {
        check_bit_length(bits.len())?;
        if let Some(pos) = bits.iter().position(|&b| b != 1 && b != -1) {
            return Err(Error::InvalidParameter(format!(
                "challenge bit {} is {}, expected 1 or -1",
                pos, bits[pos]
            )));
        }
        Ok(Self { bits })
    }

    /// Number of challenge bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Always false for a constructed challenge.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The ±1 values, in stage order.
    pub fn as_slice(&self) -> &[i8] {
        &self.bits
    }
}

/// Reproducible sequence of challenges drawn from one seed.
#[derive(Debug, Clone)]
pub struct ChallengeStream {
    rng: ChaCha20Rng,
    bit_length: usize,
}

impl ChallengeStream {
    /// Start the stream of `bit_length`-bit challenges for `challenge_seed`.
    ///
    /// Fails like [`ArbiterPuf::new`] on an out-of-range `bit_length`.
    pub fn new(bit_length: usize, challenge_seed: u64) -> Result<Self, Error> {
        check_bit_length(bit_length)?;
        Ok(Self {
            rng: ChaCha20Rng::seed_from_u64(challenge_seed),
            bit_length,
        })
    }

    /// Draw the next challenge.
    pub fn next_challenge(&mut self) -> Challenge {
        let bits = (0..self.bit_length)
            .map(|_| if self.rng.gen::<bool>() { 1 } else { -1 })
            .collect();
        Challenge { bits }
    }
}

impl Iterator for ChallengeStream {
    type Item = Challenge;

    fn next(&mut self) -> Option<Challenge> {
        Some(self.next_challenge())
    }
}

/// Thresholded PUF response, packed for key derivation.
///
/// Each bit occupies one little-endian 64-bit word (`1` or `0`), in
/// challenge order. The bytes are zeroized on drop and compared in
/// constant time.
#[derive(Clone)]
pub struct Response {
    bytes: Zeroizing<Vec<u8>>,
}

impl Response {
    /// Pack response bits.
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut bytes = Zeroizing::new(Vec::with_capacity(bits.len() * BIT_WORD_BYTES));
        for &bit in bits {
            bytes.extend_from_slice(&i64::from(bit).to_le_bytes());
        }
        Self { bytes }
    }

    /// Packed bytes fed to the key derivation engine.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of response bits this response carries.
    pub fn harvested_bits(&self) -> usize {
        self.bytes.len() / BIT_WORD_BYTES
    }

    /// Unpacked response bits.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.bytes.chunks_exact(BIT_WORD_BYTES).map(|word| word[0] == 1)
    }
}

impl ConstantTimeEq for Response {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.as_bytes().ct_eq(other.as_bytes())
    }
}

impl PartialEq for Response {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Response {}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("harvested_bits", &self.harvested_bits())
            .finish_non_exhaustive()
    }
}

/// Evaluate a device on one challenge and pack the single response bit.
///
/// # Errors
///
/// - [`Error::InvalidParameter`] if `bit_length` is 0
/// - [`Error::ModelConstruction`] if the device model cannot be built
pub fn generate_response(
    bit_length: usize,
    device_seed: u64,
    challenge_seed: u64,
) -> Result<Response, Error> {
    harvest_response(bit_length, device_seed, challenge_seed, 1)
}

/// Evaluate a device on the first `harvest` challenges of a stream.
///
/// `harvest == 1` is exactly [`generate_response`].
pub fn harvest_response(
    bit_length: usize,
    device_seed: u64,
    challenge_seed: u64,
    harvest: usize,
) -> Result<Response, Error> {
    check_dimensions(bit_length, harvest)?;

    let device = ArbiterPuf::new(bit_length, device_seed)?;

    let bits = ChallengeStream::new(bit_length, challenge_seed)?
        .take(harvest)
        .map(|challenge| device.response_bit(&challenge))
        .collect::<Result<Vec<bool>, Error>>()?;

    tracing::debug!(bit_length, harvest, "evaluated PUF challenges");

    Ok(Response::from_bits(&bits))
}

/// [`harvest_response`] driven by a parameter set.
pub fn generate_response_with(params: &DerivationParams) -> Result<Response, Error> {
    harvest_response(
        params.bit_length,
        params.device_seed,
        params.challenge_seed,
        params.harvest,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_deterministic() {
        let a = ArbiterPuf::new(256, 45).unwrap();
        let b = ArbiterPuf::new(256, 45).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.bit_length(), 256);
        assert_eq!(a.device_seed(), 45);
    }

    #[test]
    fn test_devices_differ_by_seed() {
        let a = ArbiterPuf::new(64, 1).unwrap();
        let b = ArbiterPuf::new(64, 2).unwrap();
        assert_ne!(a.weights(), b.weights());
    }

    #[test]
    fn test_weights_look_gaussian() {
        let device = ArbiterPuf::new(MAX_BIT_LENGTH, 7).unwrap();
        let n = device.weights().len() as f64;
        let mean = device.weights().iter().sum::<f64>() / n;
        let var = device
            .weights()
            .iter()
            .map(|w| (w - mean) * (w - mean))
            .sum::<f64>()
            / n;
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.05, "variance {}", var);
        assert!(device.weights().iter().all(|w| w.is_finite()));
    }

    #[test]
    fn test_challenge_from_seed_is_reproducible() {
        let a = Challenge::from_seed(256, 1).unwrap();
        let b = Challenge::from_seed(256, 1).unwrap();
        let c = Challenge::from_seed(256, 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 256);
        assert!(a.as_slice().iter().all(|&x| x == 1 || x == -1));
    }

    #[test]
    fn test_stream_starts_with_seeded_challenge() {
        let first = Challenge::from_seed(32, 9).unwrap();
        let mut stream = ChallengeStream::new(32, 9).unwrap();
        assert_eq!(stream.next_challenge(), first);
        assert_ne!(stream.next_challenge(), first);
    }

    #[test]
    fn test_challenge_from_bits_validation() {
        assert!(Challenge::from_bits(vec![1, -1, 1]).is_ok());
        assert!(matches!(
            Challenge::from_bits(vec![1, 0, 1]),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            Challenge::from_bits(vec![]),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_eval_parity_features() {
        let device = ArbiterPuf {
            device_seed: 0,
            weights: vec![1.0, 2.0, 4.0],
            bias: 0.5,
        };
        // features for [1, -1, -1]: [1, 1, -1]
        let challenge = Challenge::from_bits(vec![1, -1, -1]).unwrap();
        assert_eq!(device.eval(&challenge).unwrap(), 0.5 + 1.0 + 2.0 - 4.0);
        assert!(!device.response_bit(&challenge).unwrap());

        // features for [-1, 1, 1]: [-1, 1, 1]
        let challenge = Challenge::from_bits(vec![-1, 1, 1]).unwrap();
        assert_eq!(device.eval(&challenge).unwrap(), 0.5 - 1.0 + 2.0 + 4.0);
        assert!(device.response_bit(&challenge).unwrap());
    }

    #[test]
    fn test_eval_rejects_wrong_width() {
        let device = ArbiterPuf::new(8, 1).unwrap();
        let challenge = Challenge::from_seed(16, 1).unwrap();
        assert!(matches!(
            device.eval(&challenge),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_single_bit_layout() {
        let response = generate_response(256, 45, 1).unwrap();
        let bytes = response.as_bytes();
        assert_eq!(bytes.len(), 8);
        assert!(bytes[0] == 0 || bytes[0] == 1);
        assert!(bytes[1..].iter().all(|&b| b == 0));
        assert_eq!(response.harvested_bits(), 1);
    }

    #[test]
    fn test_response_packing() {
        let response = Response::from_bits(&[true, false, true]);
        assert_eq!(
            response.as_bytes(),
            &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(response.bits().collect::<Vec<_>>(), vec![true, false, true]);
    }

    #[test]
    fn test_harvest_one_matches_generate() {
        let single = generate_response(128, 5, 6).unwrap();
        let harvested = harvest_response(128, 5, 6, 1).unwrap();
        assert_eq!(single, harvested);
    }

    #[test]
    fn test_harvest_prefix_stability() {
        let short = harvest_response(64, 5, 6, 8).unwrap();
        let long = harvest_response(64, 5, 6, 32).unwrap();
        assert_eq!(short.as_bytes(), &long.as_bytes()[..short.as_bytes().len()]);
        assert_eq!(long.harvested_bits(), 32);
    }

    #[test]
    fn test_harvest_bounds() {
        assert!(matches!(
            harvest_response(64, 1, 1, 0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            harvest_response(64, 1, 1, MAX_HARVEST + 1),
            Err(Error::ModelConstruction { .. })
        ));
        assert!(matches!(
            generate_response(0, 1, 1),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            generate_response(MAX_BIT_LENGTH + 1, 1, 1),
            Err(Error::ModelConstruction { .. })
        ));
    }

    #[test]
    fn test_response_equality() {
        let a = Response::from_bits(&[true, false, true, true]);
        let b = Response::from_bits(&[true, false, true, true]);
        let flipped = Response::from_bits(&[true, false, true, false]);
        let shorter = Response::from_bits(&[true, false, true]);

        assert_eq!(a, b);
        assert!(bool::from(a.ct_eq(&b)));
        assert_ne!(a, flipped);
        assert!(!bool::from(a.ct_eq(&flipped)));
        assert_ne!(a, shorter);
    }

    #[test]
    fn test_reference_delay_is_far_from_threshold() {
        // Keeps the pinned identity stable across libm rounding differences
        let device = ArbiterPuf::new(256, 45).unwrap();
        let challenge = Challenge::from_seed(256, 1).unwrap();
        let delay = device.eval(&challenge).unwrap();
        assert!(delay < -1.0, "delay {}", delay);
    }

    #[test]
    fn test_harvest_checks_bit_length_first() {
        let err = harvest_response(MAX_BIT_LENGTH + 1, 1, 1, 0).unwrap_err();
        assert!(matches!(
            err,
            Error::ModelConstruction { ref reason } if reason.contains("bit_length")
        ));
        let err = harvest_response(0, 1, 1, MAX_HARVEST + 1).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(ref m) if m.contains("bit_length")));
    }

    #[test]
    fn test_response_debug_redacts_bits() {
        let response = Response::from_bits(&[true; 4]);
        let rendered = format!("{:?}", response);
        assert!(rendered.contains("harvested_bits: 4"));
        assert!(!rendered.contains("bytes"));
    }
}
