//! # Amounts and Fixed-Point Prices
//!
//! `Amount` is the only representation of value in the workspace: an unsigned
//! 128-bit integer in the asset's smallest unit. `FixedPointPrice` is a ratio
//! scaled by [`NOMINATOR`] (1e18).
//!
//! ## Serialization
//!
//! Both types serialize as base-10 strings. Deserialization also accepts
//! plain JSON/YAML integers for hand-written configs, but JSON cannot carry
//! integers above `u64::MAX` exactly: quote large amounts (`"1000000000000000000000"`).
//!
//! ## Rounding
//!
//! [`FixedPointPrice::convert`] floors. `convert(100, 2e18) == 50`,
//! `convert(100, 3e18) == 33`. The remainder stays with whoever holds the
//! converted side.
//!
//! The intermediate `amount * 1e18` may exceed 128 bits; conversion only
//! fails when the quotient itself does not fit.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Fixed-point scale for prices: 1e18.
pub const NOMINATOR: u128 = 1_000_000_000_000_000_000;

/// A non-negative amount of some asset, in its smallest unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u128);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Construct from a raw integer.
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// The raw integer value.
    pub const fn value(&self) -> u128 {
        self.0
    }

    /// Whether this amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn checked_sum<I>(iter: I) -> Result<Amount, CoreError>
    where
        I: IntoIterator<Item = Amount>,
    {
        iter.into_iter().try_fold(Amount::ZERO, |acc, a| {
            acc.checked_add(a)
                .ok_or_else(|| CoreError::Overflow(format!("{acc} + {a}")))
        })
    }

    /// Parse a base-10 integer string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim().replace('_', "");
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidAmount(s.to_string()));
        }
        trimmed
            .parse::<u128>()
            .map(Amount)
            .map_err(|_| CoreError::InvalidAmount(s.to_string()))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a non-negative integer or a base-10 integer string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
        Ok(Amount(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        u64::try_from(v)
            .map(Amount::from)
            .map_err(|_| E::custom(format!("amount must not be negative, got {v}")))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Amount, E> {
        u128::try_from(v)
            .map(Amount)
            .map_err(|_| E::custom(format!("amount must not be negative, got {v}")))
    }

    // Unquoted integers past u64::MAX arrive here as floats.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        Err(E::custom(format!(
            "amount {v} is not an exact integer; quote large amounts as strings, e.g. \"1000000000000000000000\""
        )))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

/// A price expressed as a 1e18-scaled fixed-point ratio.
///
/// `FixedPointPrice::from_raw(NOMINATOR)` is 1:1, `from_raw(2 * NOMINATOR)`
/// halves every converted amount. A zero price is representable so that
/// configuration validation can report it; [`convert`](Self::convert) refuses
/// to divide by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedPointPrice(u128);

impl FixedPointPrice {
    /// Construct from the raw scaled value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Construct a whole-number price (`n * 1e18`).
    pub fn from_integer(n: u128) -> Result<Self, CoreError> {
        n.checked_mul(NOMINATOR)
            .map(Self)
            .ok_or_else(|| CoreError::Overflow(format!("{n} * 1e18")))
    }

    /// The raw scaled value.
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Whether the price is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Convert `amount` through this price: `floor(amount * 1e18 / price)`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Overflow`] if the price is zero or the converted amount
    /// exceeds 128 bits.
    pub fn convert(&self, amount: Amount) -> Result<Amount, CoreError> {
        if self.0 == 0 {
            return Err(CoreError::Overflow("division by zero price".to_string()));
        }
        mul_div_floor(amount.0, NOMINATOR, self.0)
            .map(Amount)
            .ok_or_else(|| CoreError::Overflow(format!("{amount} * 1e18 / {self}")))
    }
}

/// `floor(a * b / d)` without a wide intermediate, `None` when the quotient
/// does not fit in 128 bits. `d` must be non-zero.
///
/// With `a = q*d + r`, the result is `q*b + floor(r*b / d)`. The second term
/// is built one bit of `b` at a time while keeping the running remainder
/// below `d`, so no step exceeds 128 bits.
fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    let (q, r) = (a / d, a % d);
    let whole = q.checked_mul(b)?;

    let mut frac: u128 = 0;
    let mut rem: u128 = 0;
    for bit in (0..u128::BITS).rev() {
        // rem' = 2 * rem (mod d)
        frac <<= 1;
        if rem >= d - rem {
            rem -= d - rem;
            frac += 1;
        } else {
            rem += rem;
        }
        // rem' += r (mod d)
        if (b >> bit) & 1 == 1 {
            if rem >= d - r {
                rem -= d - r;
                frac += 1;
            } else {
                rem += r;
            }
        }
    }
    whole.checked_add(frac)
}

impl std::fmt::Display for FixedPointPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for FixedPointPrice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FixedPointPrice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Amount::deserialize(deserializer).map(|a| Self(a.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_to_one_price_is_identity() {
        let price = FixedPointPrice::from_raw(NOMINATOR);
        assert_eq!(price.convert(Amount(100)).unwrap(), Amount(100));
    }

    #[test]
    fn double_price_halves() {
        let price = FixedPointPrice::from_integer(2).unwrap();
        assert_eq!(price.raw(), 2 * NOMINATOR);
        assert_eq!(price.convert(Amount(100)).unwrap(), Amount(50));
    }

    #[test]
    fn conversion_floors() {
        let price = FixedPointPrice::from_integer(3).unwrap();
        assert_eq!(price.convert(Amount(100)).unwrap(), Amount(33));
        let price = FixedPointPrice::from_integer(2).unwrap();
        assert_eq!(price.convert(Amount(1)).unwrap(), Amount::ZERO);
    }

    #[test]
    fn sub_unit_price_multiplies() {
        // 0.5 output-scale: every input unit converts to two output units.
        let price = FixedPointPrice::from_raw(NOMINATOR / 2);
        assert_eq!(price.convert(Amount(100)).unwrap(), Amount(200));
    }

    #[test]
    fn zero_price_and_overflow_rejected() {
        assert!(FixedPointPrice::from_raw(0).convert(Amount(1)).is_err());
        // 1:1 passes every amount through, even past the 1e18 product limit.
        let price = FixedPointPrice::from_raw(NOMINATOR);
        assert_eq!(price.convert(Amount(u128::MAX)).unwrap(), Amount(u128::MAX));
        // Only a quotient above 128 bits fails.
        let half = FixedPointPrice::from_raw(NOMINATOR / 2);
        assert!(half.convert(Amount(u128::MAX)).is_err());
        assert!(FixedPointPrice::from_integer(u128::MAX).is_err());
    }

    #[test]
    fn eighteen_decimal_amounts_convert() {
        let thousand_tokens = Amount(1000 * NOMINATOR);
        let one_to_one = FixedPointPrice::from_raw(NOMINATOR);
        assert_eq!(one_to_one.convert(thousand_tokens).unwrap(), thousand_tokens);
        let double = FixedPointPrice::from_integer(2).unwrap();
        assert_eq!(double.convert(thousand_tokens).unwrap(), Amount(500 * NOMINATOR));
        let third = FixedPointPrice::from_integer(3).unwrap();
        assert_eq!(
            third.convert(thousand_tokens).unwrap(),
            Amount(333_333_333_333_333_333_333)
        );
    }

    #[test]
    fn mul_div_floor_matches_direct_arithmetic() {
        assert_eq!(mul_div_floor(100, NOMINATOR, 3 * NOMINATOR), Some(33));
        assert_eq!(mul_div_floor(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
        assert_eq!(mul_div_floor(u128::MAX, 2, u128::MAX - 1), Some(2));
        assert_eq!(mul_div_floor(u128::MAX, 3, 2), None);
        assert_eq!(mul_div_floor(u128::MAX - 1, u128::MAX - 2, u128::MAX), Some(u128::MAX - 3));
        assert_eq!(mul_div_floor(0, u128::MAX, 7), Some(0));
    }

    #[test]
    fn amount_parse() {
        assert_eq!(Amount::parse("1000").unwrap(), Amount(1000));
        assert_eq!(Amount::parse("1_000").unwrap(), Amount(1000));
        assert!(Amount::parse("").is_err());
        assert!(Amount::parse("-5").is_err());
        assert!(Amount::parse("1.5").is_err());
        assert!(Amount::parse("340282366920938463463374607431768211456").is_err());
    }

    #[test]
    fn amount_serde_accepts_string_and_integer() {
        let json = serde_json::to_string(&Amount(u128::MAX)).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Amount(u128::MAX));
        let from_int: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(from_int, Amount(42));
        assert!(serde_json::from_str::<Amount>("\"abc\"").is_err());
        assert!(serde_json::from_str::<Amount>("-1").is_err());
    }

    #[test]
    fn unquoted_large_amount_asks_for_quotes() {
        let err = serde_json::from_str::<Amount>("1000000000000000000000").unwrap_err();
        assert!(err.to_string().contains("quote large amounts"), "{err}");
        let quoted: Amount = serde_json::from_str("\"1000000000000000000000\"").unwrap();
        assert_eq!(quoted, Amount(1000 * NOMINATOR));
    }

    #[test]
    fn checked_sum_detects_overflow() {
        let ok = Amount::checked_sum([Amount(1), Amount(2), Amount(3)]).unwrap();
        assert_eq!(ok, Amount(6));
        assert!(Amount::checked_sum([Amount(u128::MAX), Amount(1)]).is_err());
    }

    proptest! {
        /// Amounts past the 128-bit product limit convert exactly: the
        /// quotient undoes a whole-number price.
        #[test]
        fn convert_handles_wide_products(
            out in 0u128..=(u128::MAX / (1000 * NOMINATOR)),
            n in 1u128..=1000,
        ) {
            let price = FixedPointPrice::from_integer(n).unwrap();
            let amount = Amount(out * n);
            prop_assert_eq!(price.convert(amount).unwrap(), Amount(out));
        }

        /// The converted amount is the largest value whose cost does not
        /// exceed the scaled input.
        #[test]
        fn convert_is_floor_division(
            amount in 0u128..=u64::MAX as u128,
            price in 1u128..=(1000 * NOMINATOR),
        ) {
            let out = FixedPointPrice::from_raw(price).convert(Amount(amount)).unwrap().0;
            let scaled = amount * NOMINATOR;
            prop_assert!(out * price <= scaled);
            prop_assert!((out + 1) * price > scaled);
        }

        /// A higher price never yields more output.
        #[test]
        fn convert_is_monotone_in_price(
            amount in 0u128..=u64::MAX as u128,
            low in 1u128..=(100 * NOMINATOR),
            bump in 0u128..=(100 * NOMINATOR),
        ) {
            let a = FixedPointPrice::from_raw(low).convert(Amount(amount)).unwrap();
            let b = FixedPointPrice::from_raw(low + bump).convert(Amount(amount)).unwrap();
            prop_assert!(b <= a);
        }
    }
}
