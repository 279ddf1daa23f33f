//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In many billing systems:                                               │
//! │    R$ 100.00 / 3 = R$ 33.33 (×3 = R$ 99.99)  → Lost R$ 0.01!           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Centavos + Explicit Remainder                    │
//! │    10000 / 3 = 3333 + 3333 + 3334                                       │
//! │    The LAST installment absorbs the remainder, always.                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use cotar_core::money::Money;
//!
//! let total = Money::from_cents(10_000); // R$ 100,00
//! let parts = total.split_installments(3);
//! assert_eq!(parts, vec![
//!     Money::from_cents(3333),
//!     Money::from_cents(3333),
//!     Money::from_cents(3334),
//! ]);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (centavos).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for adjustments and discounts
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use cotar_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // R$ 10,99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in centavos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (reais) portion.
    #[inline]
    pub const fn reais(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (centavos) portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition; `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked multiplication by a quantity; `None` on overflow.
    #[inline]
    pub fn checked_mul(self, qty: i64) -> Option<Money> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Splits this value into `n` installments that sum exactly back.
    ///
    /// ## Remainder Policy
    /// Integer division truncates; the remainder lands on the LAST
    /// installment. This matches how the installment schedule is written
    /// to the ERP store: 10000 / 3 → `[3333, 3333, 3334]`.
    ///
    /// ## Edge Cases
    /// - `n == 0` returns an empty vector (callers validate the schedule
    ///   before asking for a split)
    /// - negative totals split the same way, remainder still on the last
    ///
    /// ## Example
    /// ```rust
    /// use cotar_core::money::Money;
    ///
    /// let parts = Money::from_cents(10_000).split_installments(3);
    /// let sum: i64 = parts.iter().map(|m| m.cents()).sum();
    /// assert_eq!(sum, 10_000);
    /// assert_eq!(parts.last().unwrap().cents(), 3334);
    /// ```
    pub fn split_installments(self, n: usize) -> Vec<Money> {
        if n == 0 {
            return Vec::new();
        }

        let n_i64 = n as i64;
        let base = self.0 / n_i64;
        let last = self.0 - base * (n_i64 - 1);

        let mut parts = vec![Money(base); n - 1];
        parts.push(Money(last));
        parts
    }
}

// =============================================================================
// Arithmetic Operators
// =============================================================================

impl Add for Money {
    type Output = Money;

    #[inline]
    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Money) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    #[inline]
    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Money) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    #[inline]
    fn mul(self, qty: i64) -> Money {
        Money(self.0 * qty)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Money {
    /// Formats as `R$ 1234,56` (display only - storage is always centavos).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}R$ {},{:02}", sign, self.reais().abs(), self.cents_part())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents_roundtrip() {
        let m = Money::from_cents(1099);
        assert_eq!(m.cents(), 1099);
        assert_eq!(m.reais(), 10);
        assert_eq!(m.cents_part(), 99);
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!((b * 4).cents(), 1000);
    }

    #[test]
    fn test_split_exact() {
        let parts = Money::from_cents(9000).split_installments(3);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.cents() == 3000));
    }

    #[test]
    fn test_split_remainder_on_last() {
        // 100.00 over 3: 33.33 + 33.33 + 33.34
        let parts = Money::from_cents(10_000).split_installments(3);
        assert_eq!(
            parts.iter().map(Money::cents).collect::<Vec<_>>(),
            vec![3333, 3333, 3334]
        );
    }

    #[test]
    fn test_split_sums_back() {
        for total in [1, 99, 100, 10_000, 99_999, 123_457] {
            for n in 1..=12 {
                let parts = Money::from_cents(total).split_installments(n);
                let sum: i64 = parts.iter().map(|m| m.cents()).sum();
                assert_eq!(sum, total, "total {} over {} parts", total, n);
            }
        }
    }

    #[test]
    fn test_split_zero_installments() {
        assert!(Money::from_cents(500).split_installments(0).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(123_456).to_string(), "R$ 1234,56");
        assert_eq!(Money::from_cents(-550).to_string(), "-R$ 5,50");
    }
}
