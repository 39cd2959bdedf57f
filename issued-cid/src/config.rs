use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{crypto::CidEncryptor, CidPlaintext, LOC_CID_COUNT};

/// Parameters governing the connection IDs a connection issues
///
/// Default values issue no CIDs at all: without an encryptor the endpoint runs with zero-length
/// connection IDs.
#[derive(Clone)]
pub struct IssuedCidConfig {
    /// 1. Mints CIDs; `None` selects zero-length CIDs
    pub(crate) encryptor: Option<Arc<dyn CidEncryptor>>,
    /// 2. Maximum number of CIDs outstanding at once
    pub(crate) active_connection_id_limit: usize,
    /// 3. Blueprint of every CID this connection issues
    pub(crate) template: CidPlaintext,
}

impl IssuedCidConfig {
    /// Create a configuration issuing CIDs minted by `encryptor`
    pub fn new(encryptor: Arc<dyn CidEncryptor>) -> Self {
        Self {
            encryptor: Some(encryptor),
            ..Self::default()
        }
    }

    /// Replace the CID encryptor, or disable CIDs with `None`
    pub fn encryptor(&mut self, encryptor: Option<Arc<dyn CidEncryptor>>) -> &mut Self {
        self.encryptor = encryptor;
        self
    }

    /// Maximum number of issued CIDs that may be outstanding at once
    ///
    /// Must be between 1 and [`LOC_CID_COUNT`]. Defaults to [`LOC_CID_COUNT`].
    pub fn active_connection_id_limit(&mut self, value: usize) -> Result<&mut Self, ConfigError> {
        if !(1..=LOC_CID_COUNT).contains(&value) {
            return Err(ConfigError::OutOfBounds);
        }
        self.active_connection_id_limit = value;
        Ok(self)
    }

    /// Per-connection fields merged into every CID
    ///
    /// The `sequence` field is ignored; the set assigns sequence numbers itself.
    pub fn template(&mut self, template: CidPlaintext) -> &mut Self {
        self.template = template;
        self
    }
}

impl Default for IssuedCidConfig {
    fn default() -> Self {
        Self {
            encryptor: None,
            active_connection_id_limit: LOC_CID_COUNT,
            template: CidPlaintext::default(),
        }
    }
}

impl fmt::Debug for IssuedCidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCidConfig")
            .field("encryptor", &self.encryptor.is_some())
            .field(
                "active_connection_id_limit",
                &self.active_connection_id_limit,
            )
            .field("template", &self.template)
            .finish()
    }
}

/// Errors in the configuration of an endpoint
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Value exceeds supported bounds
    #[error("value exceeds supported bounds")]
    OutOfBounds,
}
