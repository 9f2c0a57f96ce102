//! # Confidence Bound
//!
//! UCB1 exploration bonus in pure integer arithmetic:
//!
//! ```text
//! bound(t, n) = isqrt(2 * C^2 * ilog2(C^2 * (t + 1)) / n)
//! ```
//!
//! `C` scales the result so that the integer square root does not lose the
//! fractional part of the bonus. No floating point is involved, so two runs
//! over the same event sequence produce identical scores.

/// Integer square root (floor), bit-by-bit method
#[inline]
pub fn int_sqrt(x: u128) -> u128 {
    if x < 2 {
        return x;
    }

    let mut rem = x;
    let mut root: u128 = 0;
    let mut bit: u128 = 1 << ((127 - x.leading_zeros()) & !1);

    while bit != 0 {
        let trial = root + bit;
        root >>= 1;
        if rem >= trial {
            rem -= trial;
            root += bit;
        }
        bit >>= 2;
    }

    root
}

/// Upper confidence bound for an entry played `plays` times by round `round`
///
/// Returns 0 when there is no history (`round == 0` or `plays == 0`).
#[inline]
pub fn upper_bound(scale: u64, round: u64, plays: u64) -> u64 {
    if round == 0 || plays == 0 {
        return 0;
    }

    let scale_sq = (scale as u128) * (scale as u128);
    let log = scale_sq
        .saturating_mul(round as u128 + 1)
        .checked_ilog2()
        .unwrap_or(0) as u128;
    let root = int_sqrt(scale_sq.saturating_mul(2).saturating_mul(log) / plays as u128);

    u64::try_from(root).unwrap_or(u64::MAX)
}

/// Bound calculator bound to one scaling factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceBound {
    scale: u64,
}

impl ConfidenceBound {
    /// Create a calculator for scale `C`
    pub const fn new(scale: u64) -> Self {
        Self { scale }
    }

    /// Scaling factor
    #[inline(always)]
    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// Exploration bonus at `round` for `plays` prior plays
    #[inline]
    pub fn bound(&self, round: u64, plays: u64) -> u64 {
        upper_bound(self.scale, round, plays)
    }

    /// Score correction applied on a hit at `round`
    ///
    /// `bound(round - 1, plays) - bound(round, plays) * plays`, wrapping.
    #[inline]
    pub fn hit_correction(&self, round: u64, plays: u64) -> i64 {
        let previous = self.bound(round.saturating_sub(1), plays) as i64;
        let current = (self.bound(round, plays) as i64).wrapping_mul(plays as i64);
        previous.wrapping_sub(current)
    }
}
