//! Typed ledger calls and device provisioning against a [`KeyRegistry`].
//!
//! The ledger client is injected: nothing here owns connection details or
//! decides ledger rules. Calls are structured values with typed arguments,
//! never interpolated command strings.

use serde::{Deserialize, Serialize};

use crate::config::DerivationParams;
use crate::{derive_key, Error, KeyRegistry};

/// Failure reported by a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Key {0} already exists")]
    AlreadyExists(String),

    #[error("Key {0} does not exist")]
    NotFound(String),

    #[error("Key {0} is already consumed")]
    AlreadyConsumed(String),

    /// Transport, endorsement or any other client-side failure.
    #[error("Ledger backend error: {0}")]
    Backend(String),
}

/// A key record as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Ledger identifier of the record.
    pub key: String,
    /// Whether the key has been consumed.
    pub consumed: bool,
    /// Transaction that created the record.
    #[serde(rename = "transactionID")]
    pub tx_id: String,
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Uncompressed public key, lowercase hex.
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Acknowledgement of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub key: String,
    #[serde(rename = "transactionID")]
    pub tx_id: String,
}

/// A ledger operation with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function")]
pub enum LedgerCall {
    CreateKey {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_key: Option<String>,
    },
    CreateKeyWithImage {
        key: String,
        image_url: String,
    },
    ReadKey {
        key: String,
    },
    ConsumeKey {
        key: String,
    },
    QueryAllKeys,
}

/// Result of dispatching a [`LedgerCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    Submitted(Receipt),
    Record(KeyRecord),
    Records(Vec<KeyRecord>),
}

impl LedgerCall {
    /// Chaincode function name.
    pub fn function_name(&self) -> &'static str {
        match self {
            LedgerCall::CreateKey { .. } => "CreateKey",
            LedgerCall::CreateKeyWithImage { .. } => "CreateKeyWithImage",
            LedgerCall::ReadKey { .. } => "ReadKey",
            LedgerCall::ConsumeKey { .. } => "ConsumeKey",
            LedgerCall::QueryAllKeys => "QueryAllKeys",
        }
    }

    /// Positional arguments, in chaincode order.
    pub fn args(&self) -> Vec<&str> {
        match self {
            LedgerCall::CreateKey { key, public_key } => {
                let mut args = vec![key.as_str()];
                args.extend(public_key.as_deref());
                args
            }
            LedgerCall::CreateKeyWithImage { key, image_url } => {
                vec![key.as_str(), image_url.as_str()]
            }
            LedgerCall::ReadKey { key } | LedgerCall::ConsumeKey { key } => vec![key.as_str()],
            LedgerCall::QueryAllKeys => Vec::new(),
        }
    }

    /// Whether the call submits a transaction (as opposed to a query).
    pub fn is_invoke(&self) -> bool {
        matches!(
            self,
            LedgerCall::CreateKey { .. }
                | LedgerCall::CreateKeyWithImage { .. }
                | LedgerCall::ConsumeKey { .. }
        )
    }

    /// Execute the call against a registry client.
    pub fn dispatch<R: KeyRegistry + ?Sized>(
        &self,
        registry: &R,
    ) -> Result<LedgerOutcome, RegistryError> {
        match self {
            LedgerCall::CreateKey { key, public_key } => registry
                .create_key(key, public_key.as_deref())
                .map(LedgerOutcome::Submitted),
            LedgerCall::CreateKeyWithImage { key, image_url } => registry
                .create_key_with_image(key, image_url)
                .map(LedgerOutcome::Submitted),
            LedgerCall::ReadKey { key } => registry.read_key(key).map(LedgerOutcome::Record),
            LedgerCall::ConsumeKey { key } => {
                registry.consume_key(key).map(LedgerOutcome::Submitted)
            }
            LedgerCall::QueryAllKeys => registry.list_keys().map(LedgerOutcome::Records),
        }
    }
}

/// A device identity registered on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    /// Public key hex, also the ledger identifier.
    pub public_key: String,
    pub receipt: Receipt,
}

/// One device that could not be provisioned in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the device in the input.
    pub index: usize,
    pub reason: String,
}

/// Result of [`Provisioner::provision_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub created: Vec<Provisioned>,
    pub failed: Vec<BatchFailure>,
}

/// Derives device identities and records them through an injected client.
#[derive(Debug, Clone)]
pub struct Provisioner<R> {
    registry: R,
}

impl<R: KeyRegistry> Provisioner<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Derive the device key and register it under its public key hex.
    ///
    /// Derivation errors are returned before anything is submitted.
    pub fn provision(&self, params: &DerivationParams) -> Result<Provisioned, Error> {
        let public_key = derive_key(params)?.public_key_hex();

        let receipt = self
            .registry
            .create_key(&public_key, Some(&public_key))?;

        tracing::info!(
            key = %short_key(&public_key),
            tx_id = %receipt.tx_id,
            "provisioned device identity"
        );

        Ok(Provisioned {
            public_key,
            receipt,
        })
    }

    /// Derive the device key and register it together with an image reference.
    ///
    /// The record is keyed by the public key hex; the image URL is stored as given.
    pub fn provision_with_image(
        &self,
        params: &DerivationParams,
        image_url: &str,
    ) -> Result<Provisioned, Error> {
        let public_key = derive_key(params)?.public_key_hex();

        let receipt = self
            .registry
            .create_key_with_image(&public_key, image_url)?;

        tracing::info!(
            key = %short_key(&public_key),
            tx_id = %receipt.tx_id,
            "provisioned device identity with image"
        );

        Ok(Provisioned {
            public_key,
            receipt,
        })
    }

    /// Provision several devices, recording failures instead of stopping.
    pub fn provision_many(&self, devices: &[DerivationParams]) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, params) in devices.iter().enumerate() {
            match self.provision(params) {
                Ok(provisioned) => report.created.push(provisioned),
                Err(e) => {
                    tracing::warn!(index, error = %e, "device provisioning failed");
                    report.failed.push(BatchFailure {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Re-derive the device key and check it against the ledger record.
    ///
    /// Consumed records never verify.
    pub fn verify_device(&self, params: &DerivationParams, key: &str) -> Result<KeyRecord, Error> {
        let derived = derive_key(params)?;
        let record = self.registry.read_key(key)?;

        if record.consumed {
            return Err(RegistryError::AlreadyConsumed(key.to_string()).into());
        }

        let registered = record.public_key.as_deref().unwrap_or(&record.key);
        if !derived.matches_public_hex(registered) {
            tracing::warn!(key = %short_key(key), "re-derived identity does not match ledger");
            return Err(Error::IdentityMismatch {
                key: key.to_string(),
            });
        }

        Ok(record)
    }

    /// Consume a key record.
    pub fn retire(&self, key: &str) -> Result<Receipt, Error> {
        let receipt = self.registry.consume_key(key)?;
        tracing::info!(key = %short_key(key), tx_id = %receipt.tx_id, "retired key");
        Ok(receipt)
    }
}

/// Abbreviate long identifiers for log lines.
fn short_key(key: &str) -> &str {
    key.get(..18).unwrap_or(key)
}
