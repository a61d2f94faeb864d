#![no_main]

use libfuzzer_sys::fuzz_target;
use pufkey::{KeyRecord, LedgerCall, Receipt};

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<KeyRecord>(data);
    let _ = serde_json::from_slice::<Vec<KeyRecord>>(data);
    let _ = serde_json::from_slice::<Receipt>(data);

    if let Ok(call) = serde_json::from_slice::<LedgerCall>(data) {
        let _ = call.function_name();
        let _ = call.args();
        let _ = call.is_invoke();
    }
});
