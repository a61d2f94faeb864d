//! Load derivation parameters from JSON and compare single-challenge and
//! harvested responses.
//!
//! Run with: `cargo run --example custom_params`

use pufkey::{derive_public_key_with, generate_response_with, DerivationParams, QualityPolicy};

const CONFIG: &str = r#"{
    "bit_length": 128,
    "device_seed": 7,
    "challenge_seed": 99,
    "curve": "prime256v1",
    "harvest": 256
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let harvested = DerivationParams::from_json(CONFIG)?;
    let single = harvested.clone().with_harvest(1);
    let policy = QualityPolicy::default();

    for (label, params) in [("single", &single), ("harvested", &harvested)] {
        let report = policy.validate(&generate_response_with(params)?);
        println!("{} challenge(s) [{}]", params.harvest, label);
        println!("  Public key: {}", derive_public_key_with(params)?);
        println!(
            "  Bits: {}  Ones: {}  Bias: {:.3}  Acceptable: {}",
            report.stats.bits, report.stats.ones, report.stats.bias, report.acceptable
        );
        for anomaly in &report.anomalies {
            println!("  {:?}: {}", anomaly.kind, anomaly.detail);
        }
    }

    println!("\nEffective config:\n{}", harvested.to_json()?);

    // Unsupported curves are rejected before any model is built
    let err = DerivationParams::from_json(
        r#"{"bit_length":128,"device_seed":7,"challenge_seed":99,"curve":"secp384r1"}"#,
    )
    .unwrap_err();
    println!("\nsecp384r1: {}", err);

    Ok(())
}
