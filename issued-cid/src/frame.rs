use std::fmt;

use crate::{shared::ConnectionId, token::ResetToken, MAX_CID_SIZE, RESET_TOKEN_SIZE};

/// Frame type code
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Type(u64);

macro_rules! frame_types {
    {$($name:ident = $val:expr,)*} => {
        impl Type {
            $(pub const $name: Type = Type($val);)*
        }

        impl fmt::Debug for Type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    _ => write!(f, "Type({:02x})", self.0)
                }
            }
        }

        impl fmt::Display for Type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.0 {
                    $($val => f.write_str(stringify!($name)),)*
                    _ => write!(f, "<unknown {:02x}>", self.0),
                }
            }
        }
    }
}

frame_types! {
    NEW_CONNECTION_ID = 0x18,
    RETIRE_CONNECTION_ID = 0x19,
}

/// Contents of a NEW_CONNECTION_ID frame advertising one issued CID
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NewConnectionId {
    /// 1. Sequence number of the advertised CID
    pub sequence: u64,
    /// 2. The peer should retire every CID with a smaller sequence number
    pub retire_prior_to: u64,
    /// 3. The CID itself
    pub id: ConnectionId,
    /// 4. Stateless reset token bound to `id`
    pub reset_token: ResetToken,
}

impl NewConnectionId {
    /// Smallest number of bytes this type of frame is guaranteed to fit within.
    pub const SIZE_BOUND: usize = 1 + 8 + 8 + 1 + MAX_CID_SIZE + RESET_TOKEN_SIZE;
}
