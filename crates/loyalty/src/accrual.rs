//! Points earned on a sale.

/// `floor(amount * rate * tier_multiplier * category_multiplier)`.
///
/// Fractional points are dropped, never rounded up. Negative or non-finite
/// inputs are clamped to zero so the result is never negative.
pub fn compute_points(
    amount_spent: f64,
    points_per_unit: f64,
    tier_multiplier: f64,
    category_multiplier: f64,
) -> u64 {
    let raw = clamp(amount_spent)
        * clamp(points_per_unit)
        * clamp(tier_multiplier)
        * clamp(category_multiplier);
    if !raw.is_finite() {
        return 0;
    }
    raw.floor() as u64
}

fn clamp(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_rate() {
        assert_eq!(compute_points(10.0, 1.0, 1.0, 1.0), 10);
        assert_eq!(compute_points(12.99, 1.0, 1.0, 1.0), 12);
    }

    #[test]
    fn test_multipliers_compose_before_floor() {
        // 10 * 1 * 1.2 * 1.5 = 18
        assert_eq!(compute_points(10.0, 1.0, 1.2, 1.5), 18);
        // 7.5 * 2 * 1.5 = 22.5 -> 22
        assert_eq!(compute_points(7.5, 2.0, 1.5, 1.0), 22);
    }

    #[test]
    fn test_truncates_never_rounds_up() {
        assert_eq!(compute_points(0.99, 1.0, 1.0, 1.0), 0);
        assert_eq!(compute_points(4.0, 1.0, 1.2, 1.0), 4);
    }

    #[test]
    fn test_defensive_clamp() {
        assert_eq!(compute_points(-50.0, 1.0, 1.0, 1.0), 0);
        assert_eq!(compute_points(f64::NAN, 1.0, 1.0, 1.0), 0);
        assert_eq!(compute_points(10.0, -1.0, 1.0, 1.0), 0);
        assert_eq!(compute_points(f64::INFINITY, 1.0, 1.0, 1.0), 0);
    }

    proptest! {
        #[test]
        fn prop_matches_floored_product(
            amount in 0.0f64..100_000.0,
            rate in 0.0f64..10.0,
            tier in 1.0f64..3.0,
            category in 0.0f64..5.0,
        ) {
            let expected = (amount * rate * tier * category).floor() as u64;
            prop_assert_eq!(compute_points(amount, rate, tier, category), expected);
        }

        #[test]
        fn prop_never_exceeds_product(
            amount in any::<f64>(),
            rate in any::<f64>(),
            tier in any::<f64>(),
            category in any::<f64>(),
        ) {
            let points = compute_points(amount, rate, tier, category);
            if amount.is_nan() || amount <= 0.0 || rate.is_nan() || rate <= 0.0 {
                prop_assert_eq!(points, 0);
            } else if points > 0 {
                prop_assert!(points as f64 <= amount * rate * tier * category);
            }
        }
    }
}
