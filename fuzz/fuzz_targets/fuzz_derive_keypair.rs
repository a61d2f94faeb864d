#![no_main]

use libfuzzer_sys::fuzz_target;
use pufkey::{derive_keypair, CurveId};

fuzz_target!(|data: &[u8]| {
    let key = derive_keypair(data, CurveId::Secp256r1).expect("P-256 derivation must succeed");

    assert_eq!(key.public_key_hex().len(), CurveId::Secp256r1.encoded_hex_len());
    assert!(key.matches_public_hex(&key.public_key_hex()));
    assert!(key.scalar_bytes().iter().any(|&b| b != 0));

    // Same bytes, same key
    let again = derive_keypair(data, CurveId::Secp256r1).unwrap();
    assert_eq!(key.public_key_hex(), again.public_key_hex());
});
