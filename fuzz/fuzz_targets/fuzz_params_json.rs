#![no_main]

use libfuzzer_sys::fuzz_target;
use pufkey::DerivationParams;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(params) = DerivationParams::from_json(s) {
            // Anything from_json accepts must pass validation and survive a reparse
            assert!(params.validate().is_ok());
            let json = params.to_json().unwrap();
            assert_eq!(DerivationParams::from_json(&json).unwrap(), params);
        }
    }
});
