use float_cmp::ApproxEqRatio as _;

/// Compares two floating-point values for approximate equality using a ratio-based approach.
///
/// When comparing two values, the smaller value cannot deviate by more than 0.000001% of the larger value. Two NaN
/// values are considered equal, and so are two zeroes.
pub fn float_eq(l_value: f64, r_value: f64) -> bool {
    const RATIO_ERROR: f64 = 0.00000001;

    (l_value.is_nan() && r_value.is_nan())
        || (l_value == 0.0 && r_value == 0.0)
        || l_value.approx_eq_ratio(&r_value, RATIO_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroes_are_equal() {
        assert!(float_eq(0.0, 0.0));
        assert!(float_eq(-0.0, 0.0));
    }

    #[test]
    fn ratio_tolerance() {
        assert!(float_eq(1200.0, 1200.0 + 1e-9));
        assert!(!float_eq(1200.0, 1200.1));
    }
}
