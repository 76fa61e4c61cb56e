//! Fixed-point math utilities for deterministic simulation.
//!
//! All gameplay state uses fixed-point arithmetic so that every participant
//! computes bit-identical results. Floating-point operations can produce
//! different results on different CPUs and compilers.

use fixed::types::{I16F16, I24F8};
use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Fixed-point number type for positions, velocities, distances, HP and MP.
///
/// 16 integer bits and 16 fractional bits.
/// Range: approximately -32,768 to 32,767
/// Precision: approximately 0.000015
pub type Fixed = I16F16;

/// Fixed-point type for millisecond timers (cooldowns, conditions, respawn).
///
/// 24 integer bits give roughly 2.3 hours of range at 1/256 ms precision.
pub type Timer = I24F8;

/// Builds `num / den` as a [`Fixed`] in a const context, rounded to nearest.
#[must_use]
pub const fn ratio(num: i32, den: i32) -> Fixed {
    let scaled = (num as i64) << 16;
    let half = (den as i64) / 2;
    let bits = if scaled >= 0 {
        (scaled + half) / den as i64
    } else {
        (scaled - half) / den as i64
    };
    Fixed::from_bits(bits as i32)
}

/// Builds a millisecond [`Timer`] in a const context.
#[must_use]
pub const fn millis(ms: i32) -> Timer {
    Timer::const_from_int(ms)
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i32)
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
        let bits = i32::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for millisecond timers, stored as raw bits.
pub mod timer_serde {
    use super::Timer;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a timer as its raw bit representation.
    pub fn serialize<S>(value: &Timer, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a timer from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Timer, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i32::deserialize(deserializer)?;
        Ok(Timer::from_bits(bits))
    }
}

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Build a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Build a vector from raw 16.16 bit patterns (the wire representation).
    #[must_use]
    pub const fn from_bits(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_bits(x), Fixed::from_bits(y))
    }

    /// Raw 16.16 bit patterns of both coordinates.
    #[must_use]
    pub const fn to_bits(self) -> (i32, i32) {
        (self.x.to_bits(), self.y.to_bits())
    }

    /// Unit vector pointing at `angle` radians.
    #[must_use]
    pub fn from_angle(angle: Fixed) -> Self {
        Self::new(cos(angle), sin(angle))
    }

    /// True for the zero vector.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        (self - other).length_squared()
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Length of the vector. The zero vector yields zero without taking a root.
    #[must_use]
    pub fn length(self) -> Fixed {
        let len_sq = self.length_squared();
        if len_sq == Fixed::ZERO {
            return Fixed::ZERO;
        }
        fixed_sqrt(len_sq)
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        self.x * other.y - self.y * other.x
    }

    /// Vector rotated by +90 degrees.
    #[must_use]
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Normalize vector using fixed-point math. The zero vector stays zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Same direction, new length.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Geometry`] if `length` is negative.
    pub fn set_length(self, length: Fixed) -> Result<Self> {
        if length < Fixed::ZERO {
            return Err(GameError::Geometry(format!(
                "cannot set vector length to {length}"
            )));
        }
        Ok(self.normalize() * length)
    }

    /// Clamp the length into `[low, high]`.
    ///
    /// Vectors shorter than `low` collapse to zero, longer ones are rescaled
    /// to exactly `high`. A negative `high` leaves the vector unchanged.
    #[must_use]
    pub fn clip_length(self, high: Fixed, low: Fixed) -> Self {
        if self.is_zero() || high < Fixed::ZERO {
            return self;
        }
        let len = self.length();
        if len < low {
            Self::ZERO
        } else if len > high {
            Self::new(self.x / len * high, self.y / len * high)
        } else {
            self
        }
    }

    /// Rotate counter-clockwise (in map coordinates) by `angle` radians.
    #[must_use]
    pub fn rotate(self, angle: Fixed) -> Self {
        let (s, c) = (sin(angle), cos(angle));
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
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

    for _ in 0..32 {
        let mid = low + (high - low) / 2;
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Sine via range reduction and a Taylor polynomial up to x⁹.
#[must_use]
pub fn sin(angle: Fixed) -> Fixed {
    let mut a = angle % Fixed::TAU;
    if a > Fixed::PI {
        a -= Fixed::TAU;
    } else if a < -Fixed::PI {
        a += Fixed::TAU;
    }
    if a > Fixed::FRAC_PI_2 {
        a = Fixed::PI - a;
    } else if a < -Fixed::FRAC_PI_2 {
        a = -Fixed::PI - a;
    }

    let a2 = a * a;
    let mut term = a;
    let mut sum = a;
    for divisor in [6, 20, 42, 72] {
        term = -(term * a2) / divisor;
        sum += term;
    }
    sum
}

/// Cosine, defined through [`sin`].
#[must_use]
pub fn cos(angle: Fixed) -> Fixed {
    sin(angle + Fixed::FRAC_PI_2)
}

/// Four-quadrant arctangent, result in `[-π, π]`.
///
/// Maximum error is about 0.0015 rad.
#[must_use]
pub fn atan2(y: Fixed, x: Fixed) -> Fixed {
    if x == Fixed::ZERO && y == Fixed::ZERO {
        return Fixed::ZERO;
    }
    let (ax, ay) = (x.abs(), y.abs());
    let mut angle = if ax >= ay {
        atan_unit(ay / ax)
    } else {
        Fixed::FRAC_PI_2 - atan_unit(ax / ay)
    };
    if x < Fixed::ZERO {
        angle = Fixed::PI - angle;
    }
    if y < Fixed::ZERO {
        angle = -angle;
    }
    angle
}

/// atan(z) for z in [0, 1].
fn atan_unit(z: Fixed) -> Fixed {
    const A: Fixed = ratio(2447, 10000);
    const B: Fixed = ratio(663, 10000);
    Fixed::FRAC_PI_4 * z - z * (z - Fixed::ONE) * (A + B * z)
}

/// The eight compass orientations of the isometric map.
///
/// Declaration order is the stable numeric code used by flow-field data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Orientation {
    /// East.
    E,
    /// North.
    N,
    /// North-east.
    NE,
    /// North-west.
    NW,
    /// South.
    S,
    /// South-east.
    SE,
    /// South-west.
    SW,
    /// West.
    W,
}

impl Orientation {
    /// All orientations in code order.
    pub const ALL: [Self; 8] = [
        Self::E,
        Self::N,
        Self::NE,
        Self::NW,
        Self::S,
        Self::SE,
        Self::SW,
        Self::W,
    ];

    /// Unit direction in map coordinates.
    #[must_use]
    pub fn direction(self) -> Vec2Fixed {
        let d = Fixed::FRAC_1_SQRT_2;
        match self {
            Self::E => Vec2Fixed::new(d, -d),
            Self::N => Vec2Fixed::new(-d, -d),
            Self::NE => Vec2Fixed::new(Fixed::ZERO, -Fixed::ONE),
            Self::NW => Vec2Fixed::new(-Fixed::ONE, Fixed::ZERO),
            Self::S => Vec2Fixed::new(d, d),
            Self::SE => Vec2Fixed::new(Fixed::ONE, Fixed::ZERO),
            Self::SW => Vec2Fixed::new(Fixed::ZERO, Fixed::ONE),
            Self::W => Vec2Fixed::new(-d, d),
        }
    }

    /// Nearest orientation of a non-zero direction vector.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Geometry`] if the rounded octant falls outside
    /// `[-4, 4]`, which only happens when the angle math is broken.
    pub fn from_vector(v: Vec2Fixed) -> Result<Self> {
        let octant = (atan2(v.y, v.x) / Fixed::FRAC_PI_4).round();
        Self::from_octant(octant.to_num::<i32>())
    }

    /// Map a rounded `angle / (π/4)` value onto the compass table.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Geometry`] for values outside `[-4, 4]`.
    pub fn from_octant(octant: i32) -> Result<Self> {
        match octant {
            -4 | 4 => Ok(Self::NW),
            -3 => Ok(Self::N),
            -2 => Ok(Self::NE),
            -1 => Ok(Self::E),
            0 => Ok(Self::SE),
            1 => Ok(Self::S),
            2 => Ok(Self::SW),
            3 => Ok(Self::W),
            other => Err(GameError::Geometry(format!(
                "orientation octant {other} outside [-4, 4]"
            ))),
        }
    }
}

/// Axis-aligned rectangle in map coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    #[serde(with = "fixed_serde")]
    pub left: Fixed,
    /// Top edge.
    #[serde(with = "fixed_serde")]
    pub top: Fixed,
    /// Width.
    #[serde(with = "fixed_serde")]
    pub width: Fixed,
    /// Height.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
}

impl Rect {
    /// Create a rectangle.
    #[must_use]
    pub const fn new(left: Fixed, top: Fixed, width: Fixed, height: Fixed) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle with integer bounds.
    #[must_use]
    pub fn from_ints(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(
            Fixed::from_num(left),
            Fixed::from_num(top),
            Fixed::from_num(width),
            Fixed::from_num(height),
        )
    }

    /// Right edge (exclusive).
    #[must_use]
    pub fn right(&self) -> Fixed {
        self.left + self.width
    }

    /// Bottom edge (exclusive).
    #[must_use]
    pub fn bottom(&self) -> Fixed {
        self.top + self.height
    }

    /// Half-open containment test.
    #[must_use]
    pub fn contains(&self, p: Vec2Fixed) -> bool {
        p.x >= self.left && p.x < self.right() && p.y >= self.top && p.y < self.bottom()
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.left + self.width / 2, self.top + self.height / 2)
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl std::ops::Mul<Fixed> for Vec2Fixed {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Div<Fixed> for Vec2Fixed {
    type Output = Self;

    fn div(self, rhs: Fixed) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn epsilon() -> Fixed {
        Fixed::ONE / 1000
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::from_ints(3, 0);
        let b = Vec2Fixed::from_ints(0, 4);
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_length_of_zero_is_zero() {
        assert_eq!(Vec2Fixed::ZERO.length(), Fixed::ZERO);
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_length_pythagorean() {
        let len = Vec2Fixed::from_ints(3, 4).length();
        assert!((len - Fixed::from_num(5)).abs() < epsilon());
    }

    #[test]
    fn test_vec2_normalize() {
        let norm = Vec2Fixed::from_ints(3, 4).normalize();
        let len_sq = norm.length_squared();
        assert!(
            (len_sq - Fixed::ONE).abs() < epsilon(),
            "normalized vector length² should be ~1, got {len_sq:?}"
        );
        let ratio_diff = norm.x * 4 - norm.y * 3;
        assert!(ratio_diff.abs() < epsilon(), "direction not preserved");
    }

    #[test]
    fn test_set_length_rejects_negative() {
        let v = Vec2Fixed::from_ints(1, 1);
        assert!(matches!(
            v.set_length(Fixed::from_num(-1)),
            Err(GameError::Geometry(_))
        ));
        let scaled = v.set_length(Fixed::from_num(2)).unwrap();
        assert!((scaled.length() - Fixed::from_num(2)).abs() < epsilon());
    }

    #[test]
    fn test_clip_length_bounds() {
        let v = Vec2Fixed::from_ints(6, 8);
        let clipped = v.clip_length(Fixed::from_num(5), Fixed::ZERO);
        assert!((clipped.length() - Fixed::from_num(5)).abs() < epsilon());

        let tiny = Vec2Fixed::new(Fixed::from_num(0.001), Fixed::ZERO);
        assert_eq!(tiny.clip_length(Fixed::from_num(5), ratio(1, 100)), Vec2Fixed::ZERO);

        assert_eq!(v.clip_length(Fixed::from_num(-1), Fixed::ZERO), v);
        assert_eq!(
            Vec2Fixed::from_ints(1, 0).clip_length(Fixed::from_num(5), Fixed::ZERO),
            Vec2Fixed::from_ints(1, 0)
        );
    }

    #[test]
    fn test_trig_reference_points() {
        assert!(sin(Fixed::ZERO).abs() < epsilon());
        assert!((sin(Fixed::FRAC_PI_2) - Fixed::ONE).abs() < epsilon());
        assert!((cos(Fixed::ZERO) - Fixed::ONE).abs() < epsilon());
        assert!((cos(Fixed::PI) + Fixed::ONE).abs() < epsilon());
        assert!((sin(-Fixed::FRAC_PI_2) + Fixed::ONE).abs() < epsilon());
        assert!((sin(Fixed::TAU + Fixed::FRAC_PI_2) - Fixed::ONE).abs() < epsilon());
    }

    #[test]
    fn test_atan2_quadrants() {
        let tol = Fixed::from_num(0.002);
        assert!((atan2(Fixed::ONE, Fixed::ONE) - Fixed::FRAC_PI_4).abs() < tol);
        assert!((atan2(Fixed::ONE, -Fixed::ONE) - (Fixed::PI - Fixed::FRAC_PI_4)).abs() < tol);
        assert!((atan2(-Fixed::ONE, -Fixed::ONE) + (Fixed::PI - Fixed::FRAC_PI_4)).abs() < tol);
        assert!((atan2(-Fixed::ONE, Fixed::ZERO) + Fixed::FRAC_PI_2).abs() < tol);
        assert_eq!(atan2(Fixed::ZERO, -Fixed::ONE), Fixed::PI);
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let r = Vec2Fixed::from_ints(1, 0).rotate(Fixed::FRAC_PI_2);
        assert!(r.x.abs() < epsilon());
        assert!((r.y - Fixed::ONE).abs() < epsilon());
    }

    #[test]
    fn test_cross_and_perpendicular() {
        let a = Vec2Fixed::from_ints(2, 0);
        assert_eq!(a.perpendicular(), Vec2Fixed::from_ints(0, 2));
        assert_eq!(a.cross(Vec2Fixed::from_ints(0, 3)), Fixed::from_num(6));
    }

    #[test]
    fn test_orientation_round_trip_through_direction() {
        for orientation in Orientation::ALL {
            let back = Orientation::from_vector(orientation.direction()).unwrap();
            assert_eq!(back, orientation);
        }
    }

    #[test]
    fn test_orientation_octant_out_of_range_is_error() {
        assert!(matches!(
            Orientation::from_octant(5),
            Err(GameError::Geometry(_))
        ));
        assert_eq!(Orientation::from_octant(-4).unwrap(), Orientation::NW);
    }

    #[test]
    fn test_rect_contains_is_half_open() {
        let r = Rect::from_ints(1, 1, 2, 2);
        assert!(r.contains(Vec2Fixed::from_ints(1, 1)));
        assert!(!r.contains(Vec2Fixed::from_ints(3, 1)));
        assert!(!r.contains(Vec2Fixed::from_ints(1, 3)));
    }

    #[test]
    fn test_ratio_rounds_to_nearest() {
        assert_eq!(ratio(1, 2), Fixed::from_num(0.5));
        assert_eq!(ratio(-3, 2), Fixed::from_num(-1.5));
        assert_eq!(ratio(50, 1000).to_bits(), 3277);
    }

    proptest! {
        #[test]
        fn prop_raw_bits_round_trip(x in any::<i32>(), y in any::<i32>()) {
            let v = Vec2Fixed::from_bits(x, y);
            prop_assert_eq!(v.to_bits(), (x, y));
            let bytes = bincode::serialize(&v).unwrap();
            let back: Vec2Fixed = bincode::deserialize(&bytes).unwrap();
            prop_assert_eq!(back, v);
        }

        #[test]
        fn prop_normalize_is_unit_or_zero(x in -100i32..100, y in -100i32..100) {
            let n = Vec2Fixed::from_ints(x, y).normalize();
            if x == 0 && y == 0 {
                prop_assert_eq!(n, Vec2Fixed::ZERO);
            } else {
                prop_assert!((n.length_squared() - Fixed::ONE).abs() < Fixed::ONE / 100);
            }
        }
    }
}
