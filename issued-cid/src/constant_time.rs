/// Compares byte strings in time independent of their contents
pub(crate) fn eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && diff(a, b) == 0
}

// Kept out of line so the optimizer cannot turn the fold into an early exit.
#[inline(never)]
fn diff(a: &[u8], b: &[u8]) -> u8 {
    a.iter().zip(b).fold(0, |acc, (x, y)| acc | (x ^ y))
}
