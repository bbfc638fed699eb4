//! Error-diffusion weight tables.
//!
//! Offsets are relative to the current pixel; only pixels not yet
//! visited by a row-major scan appear (`dy > 0`, or `dy == 0, dx > 0`).

/// One diffusion target: offset and numerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tap {
    pub dx: isize,
    pub dy: isize,
    pub weight: u32,
}

const fn tap(dx: isize, dy: isize, weight: u32) -> Tap {
    Tap { dx, dy, weight }
}

/// Taps sharing a common denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightTable {
    pub taps: &'static [Tap],
    pub divisor: u32,
}

impl WeightTable {
    /// Sum of all numerators; equals the divisor when error is conserved.
    pub fn total_weight(&self) -> u32 {
        self.taps.iter().map(|t| t.weight).sum()
    }
}

pub const NONE: WeightTable = WeightTable {
    taps: &[],
    divisor: 1,
};

pub const FLOYD_STEINBERG: WeightTable = WeightTable {
    taps: &[tap(1, 0, 7), tap(-1, 1, 3), tap(0, 1, 5), tap(1, 1, 1)],
    divisor: 16,
};

/// Spreads only 6/8 of the error, which keeps highlights and shadows clean.
pub const ATKINSON: WeightTable = WeightTable {
    taps: &[
        tap(1, 0, 1),
        tap(2, 0, 1),
        tap(-1, 1, 1),
        tap(0, 1, 1),
        tap(1, 1, 1),
        tap(0, 2, 1),
    ],
    divisor: 8,
};

pub const JARVIS: WeightTable = WeightTable {
    taps: &[
        tap(1, 0, 7),
        tap(2, 0, 5),
        tap(-2, 1, 3),
        tap(-1, 1, 5),
        tap(0, 1, 7),
        tap(1, 1, 5),
        tap(2, 1, 3),
        tap(-2, 2, 1),
        tap(-1, 2, 3),
        tap(0, 2, 5),
        tap(1, 2, 3),
        tap(2, 2, 1),
    ],
    divisor: 48,
};

pub const STUCKI: WeightTable = WeightTable {
    taps: &[
        tap(1, 0, 8),
        tap(2, 0, 4),
        tap(-2, 1, 2),
        tap(-1, 1, 4),
        tap(0, 1, 8),
        tap(1, 1, 4),
        tap(2, 1, 2),
        tap(-2, 2, 1),
        tap(-1, 2, 2),
        tap(0, 2, 4),
        tap(1, 2, 2),
        tap(2, 2, 1),
    ],
    divisor: 42,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conserving_tables_sum_to_divisor() {
        for table in [FLOYD_STEINBERG, JARVIS, STUCKI] {
            assert_eq!(table.total_weight(), table.divisor);
        }
        assert_eq!(ATKINSON.total_weight(), 6);
        assert_eq!(NONE.total_weight(), 0);
    }

    #[test]
    fn taps_only_point_forward() {
        for table in [FLOYD_STEINBERG, ATKINSON, JARVIS, STUCKI] {
            for t in table.taps {
                assert!(t.dy > 0 || (t.dy == 0 && t.dx > 0), "{t:?}");
            }
        }
    }
}
