use std::fmt;

use rand::Rng;
use ring::{hkdf, hmac};

use crate::{
    crypto::{self, CidDecodeError, CidEncryptor, CidPlaintext, CryptoError},
    shared::ConnectionId,
    token::ResetToken,
    MAX_CID_SIZE,
};

impl crypto::HmacKey for hmac::Key {
    fn sign(&self, data: &[u8], out: &mut [u8]) {
        out.copy_from_slice(hmac::sign(self, data).as_ref());
    }

    fn signature_len(&self) -> usize {
        32
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        Ok(hmac::verify(self, data, signature)?)
    }
}

impl From<ring::error::Unspecified> for CryptoError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self
    }
}

/// Protects connection IDs with a keyed Feistel permutation
///
/// CIDs are 16 bytes long, or 20 bytes when [`CidPlaintext::node_id`] is non-zero, and carry no
/// information an outside observer could use to link two CIDs of the same connection. The stateless
/// reset token of a CID is a MAC over it, so an endpoint keyed with the same secret can recompute it
/// after losing all connection state.
pub struct HmacCidEncryptor {
    /// Keys the Feistel round function
    cid_key: hmac::Key,
    /// Signs CIDs into reset tokens
    reset_key: hmac::Key,
}

impl HmacCidEncryptor {
    /// Create an encryptor with a random secret
    pub fn new() -> Self {
        Self::from_secret(&rand::thread_rng().gen::<[u8; 32]>())
    }

    /// Create an encryptor with a specific secret
    ///
    /// Allows a restarted endpoint to decrypt the CIDs and regenerate the reset tokens it issued
    /// before.
    pub fn from_secret(secret: &[u8]) -> Self {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT).extract(secret);
        Self {
            cid_key: expand(&prk, b"cid key"),
            reset_key: expand(&prk, b"reset key"),
        }
    }

    /// Run the permutation forwards over `buf`, or backwards if `decrypt` is set
    fn permute(&self, buf: &mut [u8], decrypt: bool) {
        let len = buf.len() as u8;
        let mid = buf.len() / 2;
        let (left, right) = buf.split_at_mut(mid);
        for i in 0..ROUNDS {
            if decrypt {
                xor_mask(right, self.round(ROUNDS - 1 - i, len, left).as_ref());
            } else {
                xor_mask(left, self.round(i, len, right).as_ref());
            }
            left.swap_with_slice(right);
        }
    }

    fn round(&self, round: u8, len: u8, half: &[u8]) -> hmac::Tag {
        let mut ctx = hmac::Context::with_key(&self.cid_key);
        ctx.update(&[round, len]);
        ctx.update(half);
        ctx.sign()
    }
}

impl Default for HmacCidEncryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HmacCidEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacCidEncryptor").finish_non_exhaustive()
    }
}

impl CidEncryptor for HmacCidEncryptor {
    fn encrypt_cid(&self, plaintext: &CidPlaintext) -> (ConnectionId, ResetToken) {
        let mut buf = [0; MAX_CID_SIZE];
        buf[0..4].copy_from_slice(&plaintext.master_id.to_be_bytes());
        buf[4..8].copy_from_slice(&plaintext.thread_id.to_be_bytes());
        buf[8..16].copy_from_slice(&plaintext.sequence.to_be_bytes());
        let len = match plaintext.node_id {
            0 => SHORT_CID_LEN,
            node_id => {
                buf[16..20].copy_from_slice(&node_id.to_be_bytes());
                LONG_CID_LEN
            }
        };
        self.permute(&mut buf[..len], false);

        let cid = ConnectionId::new(&buf[..len]);
        let token = ResetToken::new(&self.reset_key, &cid);
        (cid, token)
    }

    fn decrypt_cid(&self, cid: &[u8]) -> Result<CidPlaintext, CidDecodeError> {
        if cid.len() != SHORT_CID_LEN && cid.len() != LONG_CID_LEN {
            return Err(CidDecodeError::InvalidLength(cid.len()));
        }
        let mut buf = [0; MAX_CID_SIZE];
        let buf = &mut buf[..cid.len()];
        buf.copy_from_slice(cid);
        self.permute(buf, true);

        let be_u32 = |range: std::ops::Range<usize>| {
            let mut bytes = [0; 4];
            bytes.copy_from_slice(&buf[range]);
            u32::from_be_bytes(bytes)
        };
        let mut sequence = [0; 8];
        sequence.copy_from_slice(&buf[8..16]);
        Ok(CidPlaintext {
            master_id: be_u32(0..4),
            thread_id: be_u32(4..8),
            sequence: u64::from_be_bytes(sequence),
            node_id: match cid.len() {
                LONG_CID_LEN => be_u32(16..20),
                _ => 0,
            },
        })
    }
}

fn expand(prk: &hkdf::Prk, label: &[u8]) -> hmac::Key {
    hmac::Key::from(
        prk.expand(&[label], hmac::HMAC_SHA256)
            .expect("digest length is a valid HKDF-SHA256 output length"),
    )
}

fn xor_mask(half: &mut [u8], mask: &[u8]) {
    for (byte, mask) in half.iter_mut().zip(mask) {
        *byte ^= mask;
    }
}

const HKDF_SALT: &[u8] = b"issued connection ID protection";
/// Feistel rounds per permutation
const ROUNDS: u8 = 4;
const SHORT_CID_LEN: usize = 16;
const LONG_CID_LEN: usize = 20;
