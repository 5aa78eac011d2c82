/// Lowest level. The output pin is latched low.
pub const LEVEL_OFF: u8 = 0;
/// Highest level. The output pin is latched high.
pub const LEVEL_FULL: u8 = 100;

/// Power linearization table.
///
/// The index is the output power in percent. The entry is the firing
/// point within the mains half wave as a fraction of 2^16, so that the
/// compare value can be computed with a widening multiply and a shift
/// instead of a division or floating point math.
///
/// The table compensates for the nonlinear relationship between the
/// triac firing angle and the real power delivered to a resistive load.
/// It is a fixed calibration, monotonically non-increasing: a higher
/// level fires earlier in the half wave and conducts longer.
#[rustfmt::skip]
pub const LEVEL_TABLE: [u16; 101] = [
    65535, 57934, 55907, 54462, 53297, 52300, 51419, 50621, 49889, 49208,
    48568, 47964, 47390, 46841, 46314, 45807, 45317, 44842, 44381, 43933,
    43495, 43068, 42650, 42240, 41838, 41443, 41055, 40672, 40295, 39923,
    39556, 39193, 38834, 38479, 38127, 37778, 37432, 37089, 36748, 36409,
    36072, 35737, 35403, 35071, 34740, 34410, 34080, 33752, 33424, 33096,
    32768, 32440, 32112, 31784, 31456, 31126, 30796, 30465, 30133, 29799,
    29464, 29127, 28788, 28447, 28104, 27758, 27409, 27057, 26702, 26343,
    25980, 25613, 25241, 24864, 24481, 24093, 23698, 23296, 22886, 22468,
    22041, 21603, 21155, 20694, 20219, 19729, 19222, 18695, 18146, 17572,
    16968, 16328, 15647, 14915, 14117, 13236, 12239, 11074,  9629,  7602,
        0,
];

/// Compute the phase timer compare value for a dimming level.
///
/// `half_period` is the mains half wave length in timer ticks.
/// Only meaningful for levels `1..=99`. Levels 0 and >=100 bypass
/// phase timing entirely and latch the pin instead.
#[inline]
pub fn compare_value(level: u8, half_period: u16) -> u16 {
    let frac = LEVEL_TABLE[level.min(LEVEL_FULL) as usize];
    ((frac as u32 * half_period as u32) >> 16) as u16
}

#[cfg(test)]
mod test {
    use super::*;

    const HALF_PERIOD: u16 = 16667;

    #[test]
    fn test_table_shape() {
        assert_eq!(LEVEL_TABLE.len(), 101);
        assert_eq!(LEVEL_TABLE[0], 65535);
        assert_eq!(LEVEL_TABLE[50], 32768);
        assert_eq!(LEVEL_TABLE[100], 0);
    }

    #[test]
    fn test_monotonic() {
        // A higher power level must always fire strictly earlier.
        for level in 1..99u8 {
            let a = compare_value(level, HALF_PERIOD);
            let b = compare_value(level + 1, HALF_PERIOD);
            assert!(a > b, "level {} -> {}, level {} -> {}", level, a, level + 1, b);
        }
    }

    #[test]
    fn test_within_half_period() {
        for level in 1..=99u8 {
            assert!(compare_value(level, HALF_PERIOD) < HALF_PERIOD);
        }
    }

    #[test]
    fn test_mid_level() {
        // Level 50 sits at exactly half of the fraction range.
        assert_eq!(compare_value(50, HALF_PERIOD), ((32768u32 * 16667) >> 16) as u16);
    }

    #[test]
    fn test_full_is_zero() {
        assert_eq!(compare_value(100, HALF_PERIOD), 0);
        // Out of range levels clamp to the last entry.
        assert_eq!(compare_value(200, HALF_PERIOD), 0);
    }
}

// vim: ts=4 sw=4 expandtab
