//! Bookkeeping for the connection IDs a QUIC endpoint issues to its peer
//!
//! [`IssuedCidSet`] tracks every locally issued connection ID from the moment it is minted, through
//! transmission in a NEW_CONNECTION_ID frame, acknowledgment or loss, until the peer retires it.
//! Wire encoding, loss detection and timers belong to the surrounding connection; this crate only
//! records state transitions and hands out what the frame encoder needs.

#[cfg(test)]
mod tests;

// 1. basic components
mod varint;
pub use varint::{VarInt, VarIntBoundsExceeded};

// 2
mod shared;
pub use crate::shared::ConnectionId;

/// 3
pub mod token;
pub use token::ResetToken;

/// 4. used for [`ResetToken`]
mod constant_time;

/// 5
pub mod crypto;
pub use crate::crypto::{CidDecodeError, CidEncryptor, CidPlaintext};
#[cfg(feature = "ring")]
pub use crate::crypto::ring::HmacCidEncryptor;

/// 6
pub mod frame;

/// 7. config
mod config;
pub use crate::config::{ConfigError, IssuedCidConfig};

/// 8
mod stats;
pub use crate::stats::IssuedCidStats;

/// 9. the set itself
mod issued_cid;
pub use crate::issued_cid::{IssuedCid, IssuedCidSet, IssuedCidState};

/// 1
const MAX_CID_SIZE: usize = 20;
/// 2
const RESET_TOKEN_SIZE: usize = 16;
/// The maximum number of CIDs we bother to issue per connection
pub const LOC_CID_COUNT: usize = 8;
