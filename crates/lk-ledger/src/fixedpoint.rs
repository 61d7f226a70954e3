//! Fixed-point money and quantity types.
//!
//! # Scales
//!
//! - [`Micros`]: money at 1e-6. 1 USD = `Micros::new(1_000_000)`.
//! - [`Qty`]: item quantity at 1e-3. 1 unit = `Qty::from_milli(1_000)`.
//!
//! Purchase documents arrive with decimal quantities (pounds, gallons, half
//! cases) and decimal prices. Both are converted exactly once, at the
//! ingestion boundary, through [`Micros::from_dollars`] / [`Qty::from_units`].
//! Everything downstream is integer arithmetic.
//!
//! There is no `From<i64>` for either type: a raw integer must
//! be declared as micros or milli-units explicitly.

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Money scale: micros (1e-6).
pub const MICROS_SCALE: i64 = 1_000_000;

/// Quantity scale: milli-units (1e-3).
pub const QTY_SCALE: i64 = 1_000;

fn i128_to_i64_clamp(x: i128) -> i64 {
    if x > i64::MAX as i128 {
        i64::MAX
    } else if x < i64::MIN as i128 {
        i64::MIN
    } else {
        x as i64
    }
}

/// Convert a caller-supplied decimal to a scaled integer.
///
/// Returns `None` for NaN, infinities and values that do not fit in `i64`
/// after scaling.
fn scale_f64(value: f64, scale: i64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = (value * scale as f64).round();
    if scaled >= i64::MAX as f64 || scaled <= i64::MIN as f64 {
        return None;
    }
    Some(scaled as i64)
}

// ---------------------------------------------------------------------------
// Micros
// ---------------------------------------------------------------------------

/// A fixed-point monetary amount at 1e-6 scale.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);
    pub const MAX: Micros = Micros(i64::MAX);
    pub const MIN: Micros = Micros(i64::MIN);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Whole dollars, mostly for tests and fixtures.
    #[inline]
    pub const fn dollars(d: i64) -> Self {
        Micros(d * MICROS_SCALE)
    }

    /// Boundary conversion from a decimal dollar amount (`57.38`).
    pub fn from_dollars(value: f64) -> Option<Self> {
        scale_f64(value, MICROS_SCALE).map(Micros)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Lossy view for ratio math (percent variance, reports).
    #[inline]
    pub fn as_dollars_f64(self) -> f64 {
        self.0 as f64 / MICROS_SCALE as f64
    }

    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    /// Absolute value. `Micros::MIN.abs()` saturates to `Micros::MAX`.
    #[inline]
    pub fn abs(self) -> Micros {
        Micros(self.0.saturating_abs())
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Extended value of `qty` units at this unit price, in micros (i128, exact
    /// up to the final rounding to the nearest micro).
    pub fn extended_i128(self, qty: Qty) -> i128 {
        let num = (self.0 as i128) * (qty.milli() as i128);
        let half = (QTY_SCALE / 2) as i128;
        if num >= 0 {
            (num + half) / QTY_SCALE as i128
        } else {
            (num - half) / QTY_SCALE as i128
        }
    }

    /// Extended value clamped into `Micros`.
    pub fn extended(self, qty: Qty) -> Micros {
        Micros(i128_to_i64_clamp(self.extended_i128(qty)))
    }

    /// Build from an i128 accumulator, clamping at the i64 extremes.
    pub fn from_i128_clamped(x: i128) -> Micros {
        Micros(i128_to_i64_clamp(x))
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 / MICROS_SCALE;
        let frac = (self.0 % MICROS_SCALE).abs();
        if self.0 < 0 && dollars == 0 {
            write!(f, "-{dollars}.{frac:06}")
        } else {
            write!(f, "{dollars}.{frac:06}")
        }
    }
}

// ---------------------------------------------------------------------------
// Qty
// ---------------------------------------------------------------------------

/// An item quantity at 1e-3 scale (milli-units).
///
/// Signed so a credit-memo line can carry its sign up to the ingestion
/// boundary; lot quantities themselves are always `>= 0`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qty(i64);

impl Qty {
    pub const ZERO: Qty = Qty(0);

    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Qty(milli)
    }

    /// Whole units.
    #[inline]
    pub const fn units(n: i64) -> Self {
        Qty(n * QTY_SCALE)
    }

    /// Boundary conversion from a decimal unit count (`2.5`).
    pub fn from_units(value: f64) -> Option<Self> {
        scale_f64(value, QTY_SCALE).map(Qty)
    }

    #[inline]
    pub const fn milli(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_units_f64(self) -> f64 {
        self.0 as f64 / QTY_SCALE as f64
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn abs(self) -> Qty {
        Qty(self.0.saturating_abs())
    }

    #[inline]
    pub fn saturating_add(self, rhs: Qty) -> Qty {
        Qty(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn checked_add(self, rhs: Qty) -> Option<Qty> {
        self.0.checked_add(rhs.0).map(Qty)
    }

    /// Subtract, flooring at zero.
    #[inline]
    pub fn saturating_sub_floor(self, rhs: Qty) -> Qty {
        Qty(self.0.saturating_sub(rhs.0).max(0))
    }
}

impl Add for Qty {
    type Output = Qty;
    #[inline]
    fn add(self, rhs: Qty) -> Qty {
        Qty(self.0 + rhs.0)
    }
}

impl Sub for Qty {
    type Output = Qty;
    #[inline]
    fn sub(self, rhs: Qty) -> Qty {
        Qty(self.0 - rhs.0)
    }
}

impl AddAssign for Qty {
    #[inline]
    fn add_assign(&mut self, rhs: Qty) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Qty {
    #[inline]
    fn sub_assign(&mut self, rhs: Qty) {
        self.0 -= rhs.0;
    }
}

/// Saturates at the `i64` extremes. Code that must detect overflow sums
/// `milli()` as `i128` instead.
impl std::iter::Sum for Qty {
    fn sum<I: Iterator<Item = Qty>>(iter: I) -> Qty {
        iter.fold(Qty::ZERO, Qty::saturating_add)
    }
}

impl std::fmt::Display for Qty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / QTY_SCALE;
        let frac = (self.0 % QTY_SCALE).abs();
        if self.0 < 0 && whole == 0 {
            write!(f, "-{whole}.{frac:03}")
        } else {
            write!(f, "{whole}.{frac:03}")
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
