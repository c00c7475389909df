//! Exponential block durations.
//!
//! Each consecutive block for the same reason doubles the duration, up to
//! `2^cap` times the base. Streak 0 (first block) uses the base duration.

/// Duration of a block given how many times in a row the BSSID has already
/// been blocked for this reason.
///
/// Saturates at `i64::MAX` instead of overflowing.
#[must_use]
pub fn block_duration_ms(base_ms: i64, streak: u32, cap: u32) -> i64 {
    let exp = streak.min(cap).min(62);
    base_ms.saturating_mul(2_i64.saturating_pow(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: i64 = 300_000;

    #[test]
    fn first_block_uses_base() {
        assert_eq!(block_duration_ms(BASE, 0, 7), BASE);
    }

    #[test]
    fn doubles_per_streak() {
        assert_eq!(block_duration_ms(BASE, 1, 7), 600_000);
        assert_eq!(block_duration_ms(BASE, 2, 7), 1_200_000);
        assert_eq!(block_duration_ms(BASE, 7, 7), BASE * 128);
    }

    #[test]
    fn stops_growing_at_cap() {
        assert_eq!(block_duration_ms(BASE, 8, 7), block_duration_ms(BASE, 7, 7));
        assert_eq!(
            block_duration_ms(BASE, u32::MAX, 7),
            block_duration_ms(BASE, 7, 7)
        );
    }

    #[test]
    fn zero_cap_is_constant() {
        for streak in 0..10 {
            assert_eq!(block_duration_ms(30_000, streak, 0), 30_000);
        }
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(block_duration_ms(i64::MAX / 2, 30, 30), i64::MAX);
    }
}
