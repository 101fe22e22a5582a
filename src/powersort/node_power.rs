//! Node power computations.
//!
//! The node between two adjacent runs `A` and `B` of a range of length `n`
//! has power `1 + k`, where `k` is the number of leading binary fraction
//! digits shared by the normalized run midpoints `(mid(A)) / n` and
//! `(mid(B)) / n`. Powersort stores the left run of every pending merge at
//! its node's power and drains all strictly deeper levels before a shallower
//! node is pushed, which realizes a merge tree within an additive constant
//! of the optimal binary search tree over the run-length distribution.

/// A strategy computing the power of the node separating two adjacent runs
pub trait NodePower {
    /// The largest range length the strategy supports
    const MAX_LEN: usize;

    /// Whether a power is computed in constant time
    const CONSTANT_TIME: bool;

    /// The power of the node between the adjacent runs `run_a` and `run_b`
    /// of a range of length `n`.
    ///
    /// Requires `run_a.start < run_a.end == run_b.start < run_b.end <= n`
    /// and `n <= MAX_LEN`. The result lies in `1..=log2(n) + 1`, and
    /// computing the powers of two node pairs sharing a run always yields
    /// two distinct values.
    fn node_power(n: usize, run_a: std::ops::Range<usize>, run_b: std::ops::Range<usize>) -> usize;
}

/// Constant time node power via the most significant differing bit.
///
/// Doubled midpoints are scaled to 32-bit fixed-point fractions of the
/// range, whose shared prefix length is the leading zero count of their
/// XOR. The widening to 64 bits before the `<< 30` keeps the scaling exact
/// for every range length up to [`NodePower::MAX_LEN`].
#[derive(Debug, Clone, Copy)]
pub struct Msb;

impl NodePower for Msb {
    // Scaled doubled midpoints must fit the top half of 64 bits
    const MAX_LEN: usize = i32::MAX as usize;

    const CONSTANT_TIME: bool = true;

    fn node_power(n: usize, run_a: std::ops::Range<usize>, run_b: std::ops::Range<usize>) -> usize {
        debug_assert!(n <= Self::MAX_LEN);
        debug_assert!(run_a.end == run_b.start);

        // Doubled run midpoints; the exclusive ends absorb the +1 of the
        // inclusive formulation
        let l = (run_a.start + run_b.start) as u64;
        let r = (run_b.start + run_b.end) as u64;

        // Fixed-point fractions of the doubled range, 30 fraction bits
        let a = ((l << 30) / n as u64) as u32;
        let b = ((r << 30) / n as u64) as u32;

        (a ^ b).leading_zeros() as usize
    }
}

/// Node power via bit-by-bit long division.
///
/// Extracts one binary fraction digit of both normalized midpoints per
/// iteration (a digit is set iff the running remainder reaches `n`) and
/// counts iterations until the digits differ. Linear in the resulting
/// power, but free of any range length restriction a fixed-width
/// fixed-point representation imposes.
#[derive(Debug, Clone, Copy)]
pub struct DivisionLoop;

impl NodePower for DivisionLoop {
    // Remainders stay below 2n and are shifted left once per digit
    const MAX_LEN: usize = usize::MAX >> 2;

    const CONSTANT_TIME: bool = false;

    fn node_power(n: usize, run_a: std::ops::Range<usize>, run_b: std::ops::Range<usize>) -> usize {
        debug_assert!(n <= Self::MAX_LEN);
        debug_assert!(run_a.end == run_b.start);

        // Doubled run midpoints, both in [0, 2n)
        let mut l = run_a.start + run_b.start;
        let mut r = run_b.start + run_b.end;

        let mut common_bits = 0;
        let mut digit_a = l >= n;
        let mut digit_b = r >= n;
        while digit_a == digit_b {
            common_bits += 1;
            if digit_a {
                l -= n;
                r -= n;
            }
            l <<= 1;
            r <<= 1;
            digit_a = l >= n;
            digit_b = r >= n;
        }

        common_bits + 1
    }
}
