use std::hint::black_box;

/// Compares two byte strings in time that depends only on the length of the
/// longer input.
///
/// Every byte position up to the longer length is visited, whatever the
/// position of the first difference, and a length mismatch is folded into
/// the result rather than returned early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let Fold { diff, .. } = fold(a, b);
    diff == 0
}

struct Fold {
    diff: usize,
    #[cfg_attr(not(test), allow(dead_code))]
    visited: usize,
}

#[inline(never)]
fn fold(a: &[u8], b: &[u8]) -> Fold {
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();
    let mut visited = 0;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= black_box(usize::from(x ^ y));
        visited += 1;
    }
    Fold { diff, visited }
}
