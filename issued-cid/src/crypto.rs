use thiserror::Error;

use crate::{shared::ConnectionId, token::ResetToken};

/// 1. Connection ID protection based on *ring*
#[cfg(feature = "ring")]
pub mod ring;

/// 1. Abstract description of a locally issued connection ID
///
/// The set overwrites `sequence` for every CID it mints; every other field is carried through from
/// the template in [`IssuedCidConfig`](crate::IssuedCidConfig) untouched.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CidPlaintext {
    /// Identifies the connection within the issuing thread
    pub master_id: u32,
    /// Sequence number of the CID within its connection
    pub sequence: u64,
    /// Identifies the thread owning the connection
    pub thread_id: u32,
    /// Identifies the node owning the connection, zero in single-node deployments
    pub node_id: u32,
}

/// 2. Turns [`CidPlaintext`]s into connection IDs and back
///
/// Shared by every connection of an endpoint, hence `Send + Sync`.
pub trait CidEncryptor: Send + Sync {
    /// 1. Produce the wire CID and the stateless reset token bound to it
    ///
    /// Called exactly once per sequence number.
    fn encrypt_cid(&self, plaintext: &CidPlaintext) -> (ConnectionId, ResetToken);
    /// 2. Recover the description a CID was produced from
    ///
    /// Used by packet routing outside of [`IssuedCidSet`](crate::IssuedCidSet).
    fn decrypt_cid(&self, cid: &[u8]) -> Result<CidPlaintext, CidDecodeError>;
}

/// 3. Reasons why a CID could not be decrypted
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum CidDecodeError {
    /// 1. The CID does not have a length this encryptor produces
    #[error("unexpected CID length {0}")]
    InvalidLength(usize),
}

/// 4. A key for signing with HMAC-based algorithms
pub trait HmacKey: Send + Sync {
    /// Method for signing a message
    fn sign(&self, data: &[u8], signature_out: &mut [u8]);
    /// Length of `sign`'s output
    fn signature_len(&self) -> usize;
    /// Method for verifying a message
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
}

/// 5. Generic crypto errors
#[derive(Debug)]
pub struct CryptoError;
