//! Fixed-point math utilities for deterministic simulation.
//!
//! All match simulation uses fixed-point arithmetic so that the server and
//! any replaying client compute bit-identical results. Positions live on
//! the ground plane; orientation is a yaw around the vertical axis.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Fixed-point 2D vector on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point numbers written as decimals.
///
/// Used by hand-authored data files (unit catalogs, match configs) where
/// `2.5` reads better than `10737418240`. The value is converted once at
/// load time; nothing on the wire goes through this path.
pub mod decimal_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| serde::de::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Unit vector along +X, the default facing.
    pub const UNIT_X: Self = Self {
        x: Fixed::ONE,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    ///
    /// Saturates instead of overflowing for far-apart points.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x.saturating_mul(factor), self.y.saturating_mul(factor))
    }

    /// Check if both components are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Shorten the vector to at most `max_len`, keeping direction.
    #[must_use]
    pub fn clamp_length(self, max_len: Fixed) -> Self {
        let len = self.length();
        if len <= max_len || len == Fixed::ZERO {
            self
        } else {
            self.scale(max_len / len)
        }
    }

    /// Arithmetic mean of a set of points, or `None` for an empty set.
    #[must_use]
    pub fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let count = Fixed::from_num(points.len());
        let sum = points.iter().fold(Self::ZERO, |acc, p| acc + *p);
        Some(Self::new(sum.x / count, sum.y / count))
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        if mid == low {
            break;
        }
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Cosine of an angle given in degrees.
///
/// Range-reduced to `[0, 90]` degrees and evaluated with a Taylor
/// polynomial, so every platform gets the same bits.
#[must_use]
pub fn cos_degrees(degrees: Fixed) -> Fixed {
    let full = Fixed::from_num(360);
    let mut angle = degrees % full;
    if angle < Fixed::ZERO {
        angle += full;
    }
    // cos is symmetric around 180
    if angle > Fixed::from_num(180) {
        angle = full - angle;
    }
    let (angle, sign) = if angle > Fixed::from_num(90) {
        (Fixed::from_num(180) - angle, -Fixed::ONE)
    } else {
        (angle, Fixed::ONE)
    };

    let pi = Fixed::from_num(fixed::consts::PI);
    let x = angle * pi / Fixed::from_num(180);
    let x2 = x * x;

    // 1 - x²/2! + x⁴/4! - x⁶/6! + x⁸/8! - x¹⁰/10!
    let mut term = Fixed::ONE;
    let mut sum = Fixed::ONE;
    for k in 1..=5i32 {
        let denom = Fixed::from_num((2 * k - 1) * (2 * k));
        term = -term * x2 / denom;
        sum += term;
    }

    sum * sign
}

/// Yaw-only rotation quaternion used on the wire.
///
/// The simulation keeps a unit facing vector; snapshots carry the
/// equivalent rotation about the vertical axis so presentation layers can
/// consume a conventional transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuatFixed {
    /// X component.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y component (vertical axis).
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Z component.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
    /// W component.
    #[serde(with = "fixed_serde")]
    pub w: Fixed,
}

impl QuatFixed {
    /// Identity rotation (facing +X).
    pub const IDENTITY: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
        w: Fixed::ONE,
    };

    /// Build the yaw rotation that turns +X onto `facing`.
    #[must_use]
    pub fn from_facing(facing: Vec2Fixed) -> Self {
        let dir = facing.normalize();
        if dir.is_zero() {
            return Self::IDENTITY;
        }
        let half = Fixed::from_num(2);
        let w = fixed_sqrt((Fixed::ONE + dir.x) / half);
        let mut y = fixed_sqrt((Fixed::ONE - dir.x) / half);
        if dir.y < Fixed::ZERO {
            y = -y;
        }
        Self {
            x: Fixed::ZERO,
            y,
            z: Fixed::ZERO,
            w,
        }
    }

    /// Facing vector on the ground plane.
    #[must_use]
    pub fn facing(self) -> Vec2Fixed {
        let two = Fixed::from_num(2);
        Vec2Fixed::new(self.w * self.w - self.y * self.y, two * self.w * self.y)
    }
}

impl Default for QuatFixed {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_add(rhs.x),
            y: self.y.saturating_add(rhs.y),
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Fixed, b: Fixed) -> bool {
        (a - b).abs() < Fixed::ONE / Fixed::from_num(1000)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::from_ints(3, 0);
        let b = Vec2Fixed::from_ints(0, 4);
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
        assert!(close(a.distance(b), Fixed::from_num(5)));
    }

    #[test]
    fn test_far_points_saturate() {
        let far = Vec2Fixed::new(Fixed::MAX, Fixed::MAX);
        let near = Vec2Fixed::new(Fixed::MIN, Fixed::ZERO);
        assert_eq!(far.distance_squared(near), Fixed::MAX);
        assert_eq!(far.dot(far), Fixed::MAX);
        assert_eq!((far + far).x, Fixed::MAX);
        assert_eq!((near - far).x, Fixed::MIN);
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
        assert_eq!(cos_degrees(Fixed::from_num(37)), cos_degrees(Fixed::from_num(37)));
    }

    #[test]
    fn test_vec2_normalize() {
        let norm = Vec2Fixed::from_ints(3, 4).normalize();
        assert!(close(norm.dot(norm), Fixed::ONE));
        assert!(close(norm.x * Fixed::from_num(4), norm.y * Fixed::from_num(3)));
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec2Fixed::from_ints(30, 40).clamp_length(Fixed::from_num(5));
        assert!(close(v.length(), Fixed::from_num(5)));

        let short = Vec2Fixed::from_ints(1, 0);
        assert_eq!(short.clamp_length(Fixed::from_num(5)), short);
    }

    #[test]
    fn test_centroid() {
        let points = [Vec2Fixed::from_ints(0, 0), Vec2Fixed::from_ints(4, 2)];
        assert_eq!(Vec2Fixed::centroid(&points), Some(Vec2Fixed::from_ints(2, 1)));
        assert_eq!(Vec2Fixed::centroid(&[]), None);
    }

    #[test]
    fn test_cos_degrees_known_values() {
        assert!(close(cos_degrees(Fixed::ZERO), Fixed::ONE));
        assert!(close(cos_degrees(Fixed::from_num(60)), Fixed::from_num(0.5)));
        assert!(close(cos_degrees(Fixed::from_num(90)), Fixed::ZERO));
        assert!(close(cos_degrees(Fixed::from_num(180)), -Fixed::ONE));
        assert!(close(cos_degrees(Fixed::from_num(-60)), Fixed::from_num(0.5)));
        assert!(close(cos_degrees(Fixed::from_num(300)), Fixed::from_num(0.5)));
    }

    #[test]
    fn test_quat_facing_roundtrip() {
        for facing in [
            Vec2Fixed::from_ints(1, 0),
            Vec2Fixed::from_ints(0, 1),
            Vec2Fixed::from_ints(-1, 0),
            Vec2Fixed::from_ints(0, -1),
            Vec2Fixed::from_ints(3, -4),
        ] {
            let back = QuatFixed::from_facing(facing).facing();
            let expected = facing.normalize();
            assert!(close(back.x, expected.x), "x mismatch for {facing:?}");
            assert!(close(back.y, expected.y), "y mismatch for {facing:?}");
        }
    }
}
