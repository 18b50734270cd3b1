/// `floor(log2(v))` for a positive double, read straight off the IEEE-754
/// exponent bits so that no transcendental rounding is involved.
///
/// # Panics
///
/// Panics in debug builds if `v` is not strictly positive and finite.
pub(crate) fn ilogb(v: f64) -> i64 {
    debug_assert!(v > 0.0 && v.is_finite());

    let bits = v.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i64;
    if biased == 0 {
        // Subnormal: v = m * 2^-1074 with m < 2^52.
        let m = bits & ((1u64 << 52) - 1);
        (63 - i64::from(m.leading_zeros())) - 1074
    } else {
        biased - 1023
    }
}

/// Merge two ascending variable lists into their ascending union using two
/// parallel indices.
pub(crate) fn sorted_union(lhs: &[u64], rhs: &[u64]) -> Vec<u64> {
    let mut merged = Vec::with_capacity(lhs.len() + rhs.len());
    let (mut a, mut b) = (0, 0);

    while a < lhs.len() && b < rhs.len() {
        match lhs[a].cmp(&rhs[b]) {
            std::cmp::Ordering::Less => {
                merged.push(lhs[a]);
                a += 1;
            }
            std::cmp::Ordering::Greater => {
                merged.push(rhs[b]);
                b += 1;
            }
            std::cmp::Ordering::Equal => {
                merged.push(lhs[a]);
                a += 1;
                b += 1;
            }
        }
    }
    merged.extend_from_slice(&lhs[a..]);
    merged.extend_from_slice(&rhs[b..]);
    merged
}

/// Ascending intersection of two ascending variable lists.
pub(crate) fn sorted_intersection(lhs: &[u64], rhs: &[u64]) -> Vec<u64> {
    let mut shared = Vec::new();
    let (mut a, mut b) = (0, 0);

    while a < lhs.len() && b < rhs.len() {
        match lhs[a].cmp(&rhs[b]) {
            std::cmp::Ordering::Less => a += 1,
            std::cmp::Ordering::Greater => b += 1,
            std::cmp::Ordering::Equal => {
                shared.push(lhs[a]);
                a += 1;
                b += 1;
            }
        }
    }
    shared
}
