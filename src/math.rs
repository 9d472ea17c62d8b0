use std::f64::consts::PI;

// ---------------------------------------------------------------------------
// Scalar helpers shared by the physics, calculators and the engine
// ---------------------------------------------------------------------------

/// Relative tolerance used by [`equals`]. Also the near-zero band (half of it).
pub const EPSILON: f64 = 0.000_000_01;

pub fn pow2(x: f64) -> f64 {
    x * x
}

pub fn pow3(x: f64) -> f64 {
    x * x * x
}

pub fn pow4(x: f64) -> f64 {
    (x * x) * (x * x)
}

/// Clamp `x` into `[min, max]`. Unlike `f64::clamp` this never panics on
/// an inverted range; the lower bound wins.
pub fn clamp(x: f64, min: f64, max: f64) -> f64 {
    if x < min {
        return min;
    }
    if x > max {
        return max;
    }
    x
}

/// Linearly map `value` from `[from_min, from_max]` onto `[to_min, to_max]`.
///
/// Returns `None` when the source range is singular but the target is not.
pub fn map(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> Option<f64> {
    if equals(to_min, to_max) {
        return Some(to_min);
    }
    if equals(from_min, from_max) {
        return None;
    }
    Some((value - from_min) / (from_max - from_min) * (to_max - to_min) + to_min)
}

/// Minimum of two values. A single NaN argument is ignored.
pub fn min(x: f64, y: f64) -> f64 {
    if y.is_nan() {
        return x;
    }
    if x < y {
        x
    } else {
        y
    }
}

/// Maximum of two values. A single NaN argument is ignored.
pub fn max(x: f64, y: f64) -> f64 {
    if x.is_nan() {
        return y;
    }
    if x < y {
        y
    } else {
        x
    }
}

pub fn min3(x: f64, y: f64, z: f64) -> f64 {
    min(min(x, y), z)
}

pub fn max3(x: f64, y: f64, z: f64) -> f64 {
    max(max(x, y), z)
}

/// `sqrt(x² + y²)` without the overflow guards of `f64::hypot`.
pub fn hypot(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}

/// Reduce an angle to `[0, 2π)`.
pub fn reduce_360(x: f64) -> f64 {
    let d = (x / (2.0 * PI)).floor();
    x - d * 2.0 * PI
}

/// Reduce an angle to `[-π, π]`. Either end may be returned for odd multiples of π.
pub fn reduce_180(x: f64) -> f64 {
    let d = (x / (2.0 * PI)).round_ties_even();
    x - d * 2.0 * PI
}

/// Tolerant equality: absolute near zero, relative elsewhere.
pub fn equals(a: f64, b: f64) -> bool {
    let abs_b = b.abs();
    if abs_b < EPSILON / 2.0 {
        return a.abs() < EPSILON / 2.0;
    }
    (a - b).abs() < EPSILON * abs_b
}

/// Sign of `x` as ±1. Zero and NaN report +1.
pub fn sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn powers() {
        assert_eq!(pow2(3.0), 9.0);
        assert_eq!(pow3(-2.0), -8.0);
        assert_eq!(pow4(2.0), 16.0);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(5.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.25, 0.0, 1.0), 0.25);
    }

    #[test]
    fn map_ranges() {
        assert_eq!(map(5.0, 0.0, 10.0, 0.0, 1.0), Some(0.5));
        assert_eq!(map(3.0, 1.0, 1.0, 2.0, 2.0), Some(2.0));
        assert_eq!(map(3.0, 1.0, 1.0, 0.0, 2.0), None);
    }

    #[test]
    fn nan_tolerant_min_max() {
        assert_eq!(min(1.0, f64::NAN), 1.0);
        assert_eq!(min(f64::NAN, 1.0), 1.0);
        assert_eq!(max(f64::NAN, 2.0), 2.0);
        assert_eq!(max(2.0, f64::NAN), 2.0);
        assert_eq!(min3(3.0, 1.0, 2.0), 1.0);
        assert_eq!(max3(3.0, f64::NAN, 4.0), 4.0);
    }

    #[test]
    fn angle_reduction() {
        assert_abs_diff_eq!(reduce_360(-PI / 2.0), 1.5 * PI, epsilon = 1e-12);
        assert_abs_diff_eq!(reduce_360(5.0 * PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(reduce_180(1.5 * PI), -PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(reduce_180(0.25), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn tolerant_equality() {
        assert!(equals(1.0, 1.0 + 1e-10));
        assert!(!equals(1.0, 1.001));
        assert!(equals(1e-10, 0.0));
        assert!(!equals(1e-6, 0.0));
    }

    #[test]
    fn sign_never_zero() {
        assert_eq!(sign(-0.1), -1.0);
        assert_eq!(sign(0.0), 1.0);
        assert_eq!(sign(7.0), 1.0);
    }

    #[test]
    fn hypotenuse() {
        assert_eq!(hypot(3.0, 4.0), 5.0);
    }
}
