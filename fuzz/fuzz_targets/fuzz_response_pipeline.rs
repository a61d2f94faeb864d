#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pufkey::{derive_public_key_with, harvest_response, DerivationParams, QualityPolicy};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    bit_length: u16,
    device_seed: u64,
    challenge_seed: u64,
    harvest: u8,
}

fuzz_target!(|input: FuzzInput| {
    // Keep the model small enough for the fuzzer to iterate quickly
    let bit_length = usize::from(input.bit_length % 512);
    let harvest = usize::from(input.harvest);

    let params = DerivationParams::new(bit_length, input.device_seed, input.challenge_seed)
        .with_harvest(harvest);

    match harvest_response(bit_length, input.device_seed, input.challenge_seed, harvest) {
        Ok(response) => {
            assert_eq!(response.harvested_bits(), harvest);
            let report = QualityPolicy::default().validate(&response);
            assert_eq!(report.stats.bits, harvest);
            assert!(derive_public_key_with(&params).is_ok());
        }
        Err(_) => assert!(params.validate().is_err()),
    }
});
