//! Fixed-precision rational numbers for decision values.
//!
//! Solver models hand back positions and times either as exact rational
//! numerals or as floating approximations. Both are mapped onto [`Rational`]
//! and snapped to a grid of `1 / RATIONAL_PRECISION`, which keeps exact
//! verification on an integer lattice.
//!
//! Equality and ordering compare the floating conversions, so two rationals
//! with different representations of the same value compare equal.
//!
//! # Example
//!
//! ```rust
//! use seqarrange_core::rational::{Rational, RATIONAL_PRECISION};
//!
//! let third = Rational::new(1, 3).normalize();
//! assert_eq!(third.denominator, RATIONAL_PRECISION);
//! assert_eq!(third.numerator, 333_333);
//! assert_eq!(third.normalize(), third);
//! ```

use crate::session::ModelValue;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Grid resolution of decision values.
pub const RATIONAL_PRECISION: i64 = 1_000_000;

/// Magnitudes below this are treated as exact zero when decoding.
pub const EPSILON: f64 = 1e-9;

/// A rational number with `i64` numerator and positive denominator.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rational {
    /// Numerator.
    pub numerator: i64,
    /// Denominator, always positive.
    pub denominator: i64,
}

impl Rational {
    /// Zero.
    pub const ZERO: Rational = Rational {
        numerator: 0,
        denominator: 1,
    };

    /// One.
    pub const ONE: Rational = Rational {
        numerator: 1,
        denominator: 1,
    };

    /// Creates `numerator / denominator`, moving the sign to the numerator.
    ///
    /// A zero denominator yields [`Rational::ZERO`].
    pub fn new(numerator: i64, denominator: i64) -> Self {
        if denominator == 0 {
            log::warn!("rational with zero denominator ({}/0) mapped to zero", numerator);
            return Self::ZERO;
        }
        if denominator < 0 {
            Self {
                numerator: numerator.saturating_neg(),
                denominator: denominator.saturating_neg(),
            }
        } else {
            Self {
                numerator,
                denominator,
            }
        }
    }

    /// Creates an integer-valued rational.
    pub const fn from_integer(value: i64) -> Self {
        Self {
            numerator: value,
            denominator: 1,
        }
    }

    /// Snaps a floating value onto the precision grid.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value.abs() < EPSILON {
            return Self::ZERO;
        }
        let scaled = (value * RATIONAL_PRECISION as f64).round();
        Self {
            numerator: scaled as i64,
            denominator: RATIONAL_PRECISION,
        }
    }

    /// Decodes a value read from a solver model.
    ///
    /// Exact numerals with a non-zero numerator and denominator are taken as
    /// they are. Anything else goes through the floating approximation, which
    /// maps tiny magnitudes to zero.
    pub fn from_model_value(value: &ModelValue) -> Self {
        match *value {
            ModelValue::Exact {
                numerator,
                denominator,
            } if numerator != 0 && denominator != 0 => Self::new(numerator, denominator),
            ModelValue::Exact {
                numerator,
                denominator,
            } => {
                if denominator == 0 {
                    Self::ZERO
                } else {
                    Self::from_f64(numerator as f64 / denominator as f64)
                }
            }
            ModelValue::Approximate(v) => Self::from_f64(v),
            ModelValue::Bool(b) => Self::from_integer(i64::from(b)),
        }
    }

    /// Returns true if the value is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.numerator > 0
    }

    /// Returns true if the value is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.numerator < 0
    }

    /// Returns true if the value is zero.
    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// Floating conversion.
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Integer part, truncated toward zero.
    pub fn as_i64(&self) -> i64 {
        self.numerator / self.denominator
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Self {
            numerator: self.numerator.saturating_abs(),
            denominator: self.denominator,
        }
    }

    /// Re-snaps onto the precision grid, rounding half away from zero.
    ///
    /// Idempotent: a value already on the grid is returned unchanged.
    pub fn normalize(&self) -> Self {
        if self.denominator == RATIONAL_PRECISION {
            return *self;
        }
        let scaled = self.numerator as i128 * RATIONAL_PRECISION as i128;
        let den = self.denominator as i128;
        let quotient = scaled / den;
        let remainder = scaled % den;
        let rounded = if 2 * remainder.abs() >= den {
            quotient + scaled.signum()
        } else {
            quotient
        };
        match i64::try_from(rounded) {
            Ok(numerator) => Self {
                numerator,
                denominator: RATIONAL_PRECISION,
            },
            Err(_) => Self::from_f64(self.as_f64()),
        }
    }

    /// Returns the value in lowest terms.
    pub fn reduced(&self) -> Self {
        let g = gcd(self.numerator.unsigned_abs(), self.denominator.unsigned_abs());
        if g <= 1 {
            return *self;
        }
        let g = g as i64;
        Self {
            numerator: self.numerator / g,
            denominator: self.denominator / g,
        }
    }

    /// Builds a reduced rational from wide intermediates; falls back to the
    /// precision grid when the result does not fit `i64`.
    fn from_wide(numerator: i128, denominator: i128) -> Self {
        if denominator == 0 {
            return Self::ZERO;
        }
        let (mut n, mut d) = if denominator < 0 {
            (-numerator, -denominator)
        } else {
            (numerator, denominator)
        };
        let g = gcd_wide(n.unsigned_abs(), d.unsigned_abs());
        if g > 1 {
            n /= g as i128;
            d /= g as i128;
        }
        match (i64::try_from(n), i64::try_from(d)) {
            (Ok(numerator), Ok(denominator)) => Self {
                numerator,
                denominator,
            },
            _ => {
                log::debug!("rational overflow, snapping {}/{} to grid", n, d);
                Self::from_f64(n as f64 / d as f64)
            }
        }
    }

    /// Exact lattice coordinate on the precision grid.
    pub fn grid_value(&self) -> i128 {
        self.normalize().numerator as i128
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn gcd_wide(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl PartialEq for Rational {
    fn eq(&self, other: &Self) -> bool {
        self.as_f64() == other.as_f64()
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.as_f64().partial_cmp(&other.as_f64())
    }
}

impl Add for Rational {
    type Output = Rational;

    fn add(self, rhs: Rational) -> Rational {
        let n = self.numerator as i128 * rhs.denominator as i128
            + rhs.numerator as i128 * self.denominator as i128;
        let d = self.denominator as i128 * rhs.denominator as i128;
        Rational::from_wide(n, d)
    }
}

impl Sub for Rational {
    type Output = Rational;

    fn sub(self, rhs: Rational) -> Rational {
        self + (-rhs)
    }
}

impl Mul for Rational {
    type Output = Rational;

    fn mul(self, rhs: Rational) -> Rational {
        Rational::from_wide(
            self.numerator as i128 * rhs.numerator as i128,
            self.denominator as i128 * rhs.denominator as i128,
        )
    }
}

impl Neg for Rational {
    type Output = Rational;

    fn neg(self) -> Rational {
        Rational {
            numerator: self.numerator.saturating_neg(),
            denominator: self.denominator,
        }
    }
}

impl Add<i64> for Rational {
    type Output = Rational;

    fn add(self, rhs: i64) -> Rational {
        self + Rational::from_integer(rhs)
    }
}

impl Mul<i64> for Rational {
    type Output = Rational;

    fn mul(self, rhs: i64) -> Rational {
        self * Rational::from_integer(rhs)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}
