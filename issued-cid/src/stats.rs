/// Counters of the state transitions an [`IssuedCidSet`](crate::IssuedCidSet) went through
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub struct IssuedCidStats {
    /// 1. CIDs minted, including the handshake CID and replacements
    pub issued: u64,
    /// 2. CIDs handed to the frame encoder, retransmissions included
    pub sent: u64,
    /// 3. CIDs that became delivered
    pub acked: u64,
    /// 4. CIDs requeued after a loss
    pub lost: u64,
    /// 5. CIDs retired
    pub retired: u64,
}
