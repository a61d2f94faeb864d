//! Derive a device identity with the default parameters.
//!
//! Run with: `RUST_LOG=debug cargo run --example basic_enrollment`

use pufkey::{derive_key, derive_public_key, generate_response, CurveId, DerivationParams};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 256-bit arbiter model, device 45, challenge stream 1
    let public_key = derive_public_key(256, 45, 1, CurveId::Secp256r1)?;
    println!("Public key: {}", public_key);

    let response = generate_response(256, 45, 1)?;
    println!(
        "Response: {} bit(s), {} bytes",
        response.harvested_bits(),
        response.as_bytes().len()
    );

    // The full key pair; Debug output never includes the private scalar
    let key = derive_key(&DerivationParams::default())?;
    println!("{:?}", key);
    assert_eq!(key.public_key_hex(), public_key);

    Ok(())
}
