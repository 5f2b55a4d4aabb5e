//! Tiered significance policy for decimal odds.
//!
//! Equal absolute moves matter less as odds grow, so the threshold widens
//! with the reference value:
//!
//! | reference      | threshold |
//! |----------------|-----------|
//! | < 1.10         | 0.01      |
//! | [1.10, 1.20)   | 0.02      |
//! | [1.20, 1.30)   | 0.03      |
//! | [1.30, 1.40)   | 0.04      |
//! | [1.40, 1.60)   | 0.05      |
//! | [1.60, 1.90)   | 0.07      |
//! | [1.90, 2.20)   | 0.10      |
//! | [2.20, 2.50)   | 0.15      |
//! | [2.50, 3.00)   | 0.20      |
//! | [3.00, 4.00)   | 0.30      |
//! | ≥ 4.00         | 0.50      |

/// `(exclusive upper bound, threshold)` in ascending order.
const BUCKETS: [(f64, f64); 10] = [
    (1.10, 0.01),
    (1.20, 0.02),
    (1.30, 0.03),
    (1.40, 0.04),
    (1.60, 0.05),
    (1.90, 0.07),
    (2.20, 0.10),
    (2.50, 0.15),
    (3.00, 0.20),
    (4.00, 0.30),
];

const TOP_THRESHOLD: f64 = 0.50;

/// Absorbs binary representation error so that e.g. 2.00 → 1.90 meets 0.10.
const DIFF_TOLERANCE: f64 = 1e-9;

/// Index of the bucket a reference value falls into (0..=10).
///
/// Anything below the table, including NaN and non-positive values, lands in
/// the first bucket.
pub fn bucket(reference: f64) -> usize {
    if reference.is_nan() {
        return 0;
    }
    BUCKETS
        .iter()
        .position(|(upper, _)| reference < *upper)
        .unwrap_or(BUCKETS.len())
}

/// Minimum absolute move from `reference` that counts as significant.
pub fn threshold(reference: f64) -> f64 {
    BUCKETS
        .get(bucket(reference))
        .map(|(_, t)| *t)
        .unwrap_or(TOP_THRESHOLD)
}

/// Whether moving from `reference` to `current` crosses the threshold.
/// Direction does not matter.
pub fn is_significant(reference: f64, current: f64) -> bool {
    if current == reference {
        return false;
    }
    (current - reference).abs() + DIFF_TOLERANCE >= threshold(reference)
}
