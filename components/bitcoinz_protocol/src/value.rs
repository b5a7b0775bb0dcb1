use std::convert::{Infallible, TryFrom};
use std::error;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

#[cfg(feature = "std")]
use memuse::DynamicUsage;

pub const COIN: u64 = 1_0000_0000;
pub const MAX_MONEY: u64 = 21_000_000_000 * COIN;

/// The maximum number of fractional digits in a decimal BTCZ value.
pub const COIN_DECIMALS: usize = 8;

/// A type-safe representation of some nonnegative amount of BitcoinZ.
///
/// A Zatoshis can only be constructed from an integer that is within the valid monetary
/// range of `{0..MAX_MONEY}` (where `MAX_MONEY` = 21,000,000,000 × 10⁸ zatoshis).
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
pub struct Zatoshis(u64);

#[cfg(feature = "std")]
memuse::impl_no_dynamic_usage!(Zatoshis);

impl Zatoshis {
    /// Returns the identity `Zatoshis`
    pub const ZERO: Self = Zatoshis(0);

    /// Returns this Zatoshis as a u64.
    pub fn into_u64(self) -> u64 {
        self.0
    }

    /// Creates a Zatoshis from a u64.
    ///
    /// Returns an error if the amount is outside the range `{0..MAX_MONEY}`.
    pub fn from_u64(amount: u64) -> Result<Self, BalanceError> {
        if amount <= MAX_MONEY {
            Ok(Zatoshis(amount))
        } else {
            Err(BalanceError::Overflow)
        }
    }

    /// Creates a constant Zatoshis from a u64.
    ///
    /// Panics: if the amount is outside the range `{0..MAX_MONEY}`.
    pub const fn const_from_u64(amount: u64) -> Self {
        assert!(amount <= MAX_MONEY); // contains is not const
        Zatoshis(amount)
    }

    /// Creates a Zatoshis from an i64.
    ///
    /// Returns an error if the amount is negative or greater than `MAX_MONEY`.
    pub fn from_nonnegative_i64(amount: i64) -> Result<Self, BalanceError> {
        u64::try_from(amount)
            .map_err(|_| BalanceError::Underflow)
            .and_then(Self::from_u64)
    }

    /// Combines a whole number of coins and a remainder of zatoshis.
    pub fn from_coins_and_remainder(coins: u64, zats: u64) -> Result<Self, BalanceError> {
        coins
            .checked_mul(COIN)
            .and_then(|coin_zats| coin_zats.checked_add(zats))
            .ok_or(BalanceError::Overflow)
            .and_then(Self::from_u64)
    }

    /// Splits this value into whole coins and the remaining zatoshis.
    pub fn split_coins(self) -> (u64, u64) {
        (self.0 / COIN, self.0 % COIN)
    }

    /// Returns whether or not this `Zatoshis` is the zero value.
    pub fn is_zero(&self) -> bool {
        self == &Zatoshis::ZERO
    }

    /// Returns whether or not this `Zatoshis` is positive.
    pub fn is_positive(&self) -> bool {
        self > &Zatoshis::ZERO
    }

    /// Subtracts `rhs`, clamping at zero.
    pub fn saturating_sub(self, rhs: Zatoshis) -> Zatoshis {
        Zatoshis(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Zatoshis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_coins(*self))
    }
}

impl From<Zatoshis> for u64 {
    fn from(n: Zatoshis) -> Self {
        n.into_u64()
    }
}

impl TryFrom<u64> for Zatoshis {
    type Error = BalanceError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Zatoshis::from_u64(value)
    }
}

impl Add<Zatoshis> for Zatoshis {
    type Output = Option<Zatoshis>;

    fn add(self, rhs: Zatoshis) -> Option<Zatoshis> {
        Self::from_u64(self.0.checked_add(rhs.0)?).ok()
    }
}

impl Add<Zatoshis> for Option<Zatoshis> {
    type Output = Self;

    fn add(self, rhs: Zatoshis) -> Option<Zatoshis> {
        self.and_then(|lhs| lhs + rhs)
    }
}

impl Sub<Zatoshis> for Zatoshis {
    type Output = Option<Zatoshis>;

    fn sub(self, rhs: Zatoshis) -> Option<Zatoshis> {
        Zatoshis::from_u64(self.0.checked_sub(rhs.0)?).ok()
    }
}

impl Sub<Zatoshis> for Option<Zatoshis> {
    type Output = Self;

    fn sub(self, rhs: Zatoshis) -> Option<Zatoshis> {
        self.and_then(|lhs| lhs - rhs)
    }
}

impl Sum<Zatoshis> for Option<Zatoshis> {
    fn sum<I: Iterator<Item = Zatoshis>>(iter: I) -> Self {
        iter.fold(Some(Zatoshis::ZERO), |acc, a| acc? + a)
    }
}

impl<'a> Sum<&'a Zatoshis> for Option<Zatoshis> {
    fn sum<I: Iterator<Item = &'a Zatoshis>>(iter: I) -> Self {
        iter.fold(Some(Zatoshis::ZERO), |acc, a| acc? + *a)
    }
}

/// A type for balance violations in amount addition and subtraction
/// (overflow and underflow of allowed ranges)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BalanceError {
    Overflow,
    Underflow,
}

impl error::Error for BalanceError {}

impl fmt::Display for BalanceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            BalanceError::Overflow => {
                write!(f, "Zatoshis addition resulted in a value outside the valid range.")
            }
            BalanceError::Underflow => write!(
                f,
                "Zatoshis subtraction resulted in a value outside the valid range."
            ),
        }
    }
}

impl From<Infallible> for BalanceError {
    fn from(_value: Infallible) -> Self {
        unreachable!()
    }
}

/// Errors that may be produced when interpreting a decimal BTCZ string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmountError {
    /// The input was empty after trimming whitespace.
    Empty,
    /// The input contained something other than digits and a single decimal point.
    InvalidFormat(String),
    /// More than [`COIN_DECIMALS`] fractional digits were supplied.
    TooManyDecimals(usize),
    /// The value exceeds `MAX_MONEY`.
    OutOfRange,
}

impl error::Error for AmountError {}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AmountError::Empty => write!(f, "No amount was provided."),
            AmountError::InvalidFormat(s) => write!(f, "{s:?} is not a valid BTCZ amount."),
            AmountError::TooManyDecimals(n) => write!(
                f,
                "BTCZ amounts have at most {COIN_DECIMALS} decimal places; {n} were given."
            ),
            AmountError::OutOfRange => {
                write!(f, "Amount exceeds the maximum possible BitcoinZ value.")
            }
        }
    }
}

/// Parses a decimal BTCZ value such as `"1"`, `"0.5"` or `"1.00001"` into zatoshis.
///
/// Surrounding whitespace is ignored. Signs, exponents, thousands separators and more than
/// eight fractional digits are rejected.
pub fn parse_coins(input: &str) -> Result<Zatoshis, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (s, None),
    };

    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    let well_formed = is_digits(whole)
        && frac.map_or(true, is_digits)
        && !(whole.is_empty() && frac.map_or(true, str::is_empty));
    if !well_formed {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }

    let coins = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| AmountError::OutOfRange)?
    };
    let zats = match frac {
        Some(f) if f.len() > COIN_DECIMALS => return Err(AmountError::TooManyDecimals(f.len())),
        Some(f) if !f.is_empty() => format!("{:0<8}", f)
            .parse::<u64>()
            .map_err(|_| AmountError::InvalidFormat(s.to_string()))?,
        _ => 0,
    };

    Zatoshis::from_coins_and_remainder(coins, zats).map_err(|_| AmountError::OutOfRange)
}

/// Renders a value as the shortest decimal BTCZ string that represents it exactly.
pub fn format_coins(amount: Zatoshis) -> String {
    let (coins, zats) = amount.split_coins();
    if zats == 0 {
        format!("{}", coins)
    } else {
        format!("{}.{:0>8}", coins, zats)
            .trim_end_matches('0')
            .to_string()
    }
}

#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use proptest::prelude::prop_compose;

    use super::{Zatoshis, MAX_MONEY};

    prop_compose! {
        pub fn arb_zatoshis()(amt in 0u64..MAX_MONEY) -> Zatoshis {
            Zatoshis::from_u64(amt).unwrap()
        }
    }

    prop_compose! {
        pub fn arb_positive_zatoshis()(amt in 1u64..MAX_MONEY) -> Zatoshis {
            Zatoshis::from_u64(amt).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::proptest;

    use super::{
        format_coins, parse_coins, testing::arb_zatoshis, AmountError, Zatoshis, COIN, MAX_MONEY,
    };

    #[test]
    fn amount_in_range() {
        assert_eq!(Zatoshis::from_u64(MAX_MONEY), Ok(Zatoshis(MAX_MONEY)));
        assert!(Zatoshis::from_u64(MAX_MONEY + 1).is_err());
        assert!(Zatoshis::from_nonnegative_i64(-1).is_err());
        assert_eq!(Zatoshis::from_nonnegative_i64(5), Ok(Zatoshis(5)));
    }

    #[test]
    fn add_overflow() {
        let v = Zatoshis(MAX_MONEY);
        assert_eq!(v + Zatoshis(1), None)
    }

    #[test]
    fn sub_underflow() {
        assert_eq!(Zatoshis(0) - Zatoshis(1), None);
        assert_eq!(Zatoshis(0).saturating_sub(Zatoshis(1)), Zatoshis::ZERO);
    }

    #[test]
    fn parse_simple_amounts() {
        assert_eq!(parse_coins("1"), Ok(Zatoshis(COIN)));
        assert_eq!(parse_coins("1.0"), Ok(Zatoshis(COIN)));
        assert_eq!(parse_coins(" 0.5 "), Ok(Zatoshis(COIN / 2)));
        assert_eq!(parse_coins(".25"), Ok(Zatoshis(COIN / 4)));
        assert_eq!(parse_coins("3."), Ok(Zatoshis(3 * COIN)));
        assert_eq!(parse_coins("1.00001"), Ok(Zatoshis(COIN + 1000)));
        assert_eq!(parse_coins("0.00000001"), Ok(Zatoshis(1)));
    }

    #[test]
    fn parse_rejects_malformed_amounts() {
        assert_eq!(parse_coins(""), Err(AmountError::Empty));
        assert_eq!(parse_coins("   "), Err(AmountError::Empty));
        assert!(matches!(parse_coins("."), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(parse_coins("-1"), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(parse_coins("1e5"), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(parse_coins("1.2.3"), Err(AmountError::InvalidFormat(_))));
        assert!(matches!(parse_coins("1,000"), Err(AmountError::InvalidFormat(_))));
        assert_eq!(
            parse_coins("0.000000001"),
            Err(AmountError::TooManyDecimals(9))
        );
        assert_eq!(parse_coins("21000000000.00000001"), Err(AmountError::OutOfRange));
        assert_eq!(parse_coins("99999999999999999999"), Err(AmountError::OutOfRange));
    }

    #[test]
    fn format_is_shortest() {
        assert_eq!(format_coins(Zatoshis(0)), "0");
        assert_eq!(format_coins(Zatoshis(COIN)), "1");
        assert_eq!(format_coins(Zatoshis(COIN / 2)), "0.5");
        assert_eq!(format_coins(Zatoshis(COIN + 1000)), "1.00001");
        assert_eq!(format_coins(Zatoshis(1)), "0.00000001");
    }

    proptest! {
        #[test]
        fn prop_format_then_parse(amt in arb_zatoshis()) {
            assert_eq!(parse_coins(&format_coins(amt)), Ok(amt));
        }
    }
}
