// Math utilities shared by the input routing code

use glam::Vec2;

/// Clamp a value to the 0..=1 range
pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Scale a vector down to unit length if it is longer than one
///
/// Shorter vectors are returned unchanged, so analog stick values keep their
/// magnitude while digital diagonals (length sqrt(2)) stop at 1.
pub fn clamp_unit(v: Vec2) -> Vec2 {
    if v.length_squared() > 1.0 {
        v.normalize_or_zero()
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clamp01() {
        assert_eq!(clamp01(0.5), 0.5);
        assert_eq!(clamp01(-5.0), 0.0);
        assert_eq!(clamp01(15.0), 1.0);
    }

    #[test]
    fn test_clamp_unit_diagonal() {
        let v = clamp_unit(Vec2::new(1.0, 1.0));
        assert_relative_eq!(v.length(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(v.x, v.y);
    }

    #[test]
    fn test_clamp_unit_keeps_short_vectors() {
        let v = clamp_unit(Vec2::new(0.3, -0.4));
        assert_eq!(v, Vec2::new(0.3, -0.4));
        assert_eq!(clamp_unit(Vec2::ZERO), Vec2::ZERO);
    }
}
