//! Provision a batch of devices against a ledger client, then re-derive
//! and verify one of them.
//!
//! The ledger here is an in-process stand-in; a real deployment injects a
//! client for its own network.
//!
//! Run with: `RUST_LOG=info cargo run --example verify_device`

use std::collections::HashMap;
use std::sync::Mutex;

use pufkey::{
    DerivationParams, Error, KeyRecord, KeyRegistry, LedgerCall, LedgerOutcome, Provisioner,
    Receipt, RegistryError,
};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct LocalLedger {
    records: Mutex<HashMap<String, KeyRecord>>,
}

impl LocalLedger {
    fn tx_id(&self) -> String {
        let len = self.records.lock().map(|r| r.len()).unwrap_or_default();
        format!("local-{:04}", len)
    }

    fn insert(
        &self,
        key: &str,
        public_key: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Receipt, RegistryError> {
        let tx_id = self.tx_id();
        let mut records = self.records.lock().unwrap();
        if records.contains_key(key) {
            return Err(RegistryError::AlreadyExists(key.to_string()));
        }
        records.insert(
            key.to_string(),
            KeyRecord {
                key: key.to_string(),
                consumed: false,
                tx_id: tx_id.clone(),
                image_url: image_url.map(str::to_string),
                public_key: public_key.map(str::to_string),
            },
        );
        Ok(Receipt {
            key: key.to_string(),
            tx_id,
        })
    }
}

impl KeyRegistry for LocalLedger {
    fn create_key(
        &self,
        key: &str,
        public_key_hex: Option<&str>,
    ) -> Result<Receipt, RegistryError> {
        self.insert(key, public_key_hex, None)
    }

    fn create_key_with_image(&self, key: &str, image_url: &str) -> Result<Receipt, RegistryError> {
        self.insert(key, None, Some(image_url))
    }

    fn read_key(&self, key: &str) -> Result<KeyRecord, RegistryError> {
        self.records
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    fn consume_key(&self, key: &str) -> Result<Receipt, RegistryError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        if record.consumed {
            return Err(RegistryError::AlreadyConsumed(key.to_string()));
        }
        record.consumed = true;
        Ok(Receipt {
            key: key.to_string(),
            tx_id: record.tx_id.clone(),
        })
    }

    fn list_keys(&self) -> Result<Vec<KeyRecord>, RegistryError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let provisioner = Provisioner::new(LocalLedger::default());

    // Device 2 repeats device 0, so its create is rejected as a duplicate
    let devices: Vec<DerivationParams> = [11u64, 12, 11, 13]
        .iter()
        .map(|&seed| DerivationParams::new(128, seed, 5).with_harvest(128))
        .collect();

    let report = provisioner.provision_many(&devices);
    println!("Created: {}", report.created.len());
    for failure in &report.failed {
        println!("Failed device {}: {}", failure.index, failure.reason);
    }

    let badge = DerivationParams::new(128, 14, 5).with_harvest(128);
    let with_image = provisioner.provision_with_image(&badge, "https://example.com/badge14.png")?;
    println!("Device with image: {}", with_image.receipt.tx_id);

    let enrolled = &report.created[0];
    let record = provisioner.verify_device(&devices[0], &enrolled.public_key)?;
    println!("Device 0 verified (tx {})", record.tx_id);

    // A different device does not match device 0's record
    match provisioner.verify_device(&devices[1], &enrolled.public_key) {
        Err(Error::IdentityMismatch { .. }) => println!("Device 1 rejected for device 0's key"),
        other => println!("Unexpected: {:?}", other),
    }

    provisioner.retire(&enrolled.public_key)?;
    if let Err(e) = provisioner.verify_device(&devices[0], &enrolled.public_key) {
        println!("After retirement: {}", e);
    }

    let call = LedgerCall::QueryAllKeys;
    if let LedgerOutcome::Records(records) = call.dispatch(provisioner.registry())? {
        println!("\n{} records on ledger:", records.len());
        println!("{}", serde_json::to_string_pretty(&records)?);
    }

    Ok(())
}
