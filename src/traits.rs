//! Core traits for device models and ledger key registries.

use crate::puf::Challenge;
use crate::registry::{KeyRecord, Receipt, RegistryError};
use crate::Error;

/// A challenge/response device model.
pub trait PufModel {
    /// Number of challenge bits the device accepts.
    fn bit_length(&self) -> usize;

    /// Evaluate the device on a challenge, returning the raw response value.
    ///
    /// The response bit is `value > 0`.
    fn eval(&self, challenge: &Challenge) -> Result<f64, Error>;

    /// Evaluate and threshold to a single response bit.
    fn response_bit(&self, challenge: &Challenge) -> Result<bool, Error> {
        Ok(self.eval(challenge)? > 0.0)
    }
}

/// Client for a permissioned ledger holding key records.
///
/// The crate never decides ledger rules; implementations report them through
/// [`RegistryError`].
pub trait KeyRegistry {
    /// Submit a new key record, optionally carrying a public key.
    fn create_key(
        &self,
        key: &str,
        public_key_hex: Option<&str>,
    ) -> Result<Receipt, RegistryError>;

    /// Submit a new key record that references an image.
    fn create_key_with_image(&self, key: &str, image_url: &str) -> Result<Receipt, RegistryError>;

    /// Query a single key record.
    fn read_key(&self, key: &str) -> Result<KeyRecord, RegistryError>;

    /// Submit a consumption of an existing key.
    fn consume_key(&self, key: &str) -> Result<Receipt, RegistryError>;

    /// Query all key records.
    fn list_keys(&self) -> Result<Vec<KeyRecord>, RegistryError>;
}

impl<R: KeyRegistry + ?Sized> KeyRegistry for &R {
    fn create_key(
        &self,
        key: &str,
        public_key_hex: Option<&str>,
    ) -> Result<Receipt, RegistryError> {
        (**self).create_key(key, public_key_hex)
    }

    fn create_key_with_image(&self, key: &str, image_url: &str) -> Result<Receipt, RegistryError> {
        (**self).create_key_with_image(key, image_url)
    }

    fn read_key(&self, key: &str) -> Result<KeyRecord, RegistryError> {
        (**self).read_key(key)
    }

    fn consume_key(&self, key: &str) -> Result<Receipt, RegistryError> {
        (**self).consume_key(key)
    }

    fn list_keys(&self) -> Result<Vec<KeyRecord>, RegistryError> {
        (**self).list_keys()
    }
}

impl<R: KeyRegistry + ?Sized> KeyRegistry for std::sync::Arc<R> {
    fn create_key(
        &self,
        key: &str,
        public_key_hex: Option<&str>,
    ) -> Result<Receipt, RegistryError> {
        (**self).create_key(key, public_key_hex)
    }

    fn create_key_with_image(&self, key: &str, image_url: &str) -> Result<Receipt, RegistryError> {
        (**self).create_key_with_image(key, image_url)
    }

    fn read_key(&self, key: &str) -> Result<KeyRecord, RegistryError> {
        (**self).read_key(key)
    }

    fn consume_key(&self, key: &str) -> Result<Receipt, RegistryError> {
        (**self).consume_key(key)
    }

    fn list_keys(&self) -> Result<Vec<KeyRecord>, RegistryError> {
        (**self).list_keys()
    }
}
