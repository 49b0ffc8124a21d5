/// Money amounts are rounded half-up to 2 decimals at the point they become
/// visible; intermediate arithmetic stays in full `f64` precision.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scaled = value * 100.0;
    // Nudge by one ulp-scale epsilon so values like 2.675 (stored as
    // 2.67499...) round the way a decimal half-up rounder would.
    let nudged = scaled + scaled.abs() * f64::EPSILON * 4.0;
    let adjusted = if nudged < 0.0 {
        nudged - 0.5
    } else {
        nudged + 0.5
    };
    adjusted.trunc() / 100.0
}

/// Round a ratio to 4 decimals for display (percentages keep more precision
/// than money).
pub fn round4(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scaled = value * 10_000.0;
    let nudged = scaled + scaled.abs() * f64::EPSILON * 4.0;
    let adjusted = if nudged < 0.0 {
        nudged - 0.5
    } else {
        nudged + 0.5
    };
    adjusted.trunc() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(1.004), 1.0);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(130_812.499), 130_812.5);
    }

    #[test]
    fn rounds_negative_half_away_from_zero() {
        assert_eq!(round2(-1.005), -1.01);
        assert_eq!(round2(-1.004), -1.0);
    }

    #[test]
    fn zero_and_exact_values_pass_through() {
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(455.0), 455.0);
        assert_eq!(round4(0.4525), 0.4525);
    }
}
