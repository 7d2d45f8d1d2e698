use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const MINOR_PER_MAJOR: i64 = 100;

/// An amount of money held as minor currency units (paise).
///
/// On the wire it travels as a decimal number of major units, so `1000`
/// in a JSON body is stored as `100000` minor units. Payment gateways are
/// always handed the minor-unit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Rounds to the nearest minor unit.
    pub fn from_major(major: f64) -> Self {
        Self((major * MINOR_PER_MAJOR as f64).round() as i64)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub fn major(&self) -> f64 {
        self.0 as f64 / MINOR_PER_MAJOR as f64
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `None` on overflow
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// `None` on overflow
    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / MINOR_PER_MAJOR as u64,
            abs % MINOR_PER_MAJOR as u64
        )
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.0 % MINOR_PER_MAJOR == 0 {
            serializer.serialize_i64(self.0 / MINOR_PER_MAJOR)
        } else {
            serializer.serialize_f64(self.major())
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let major = f64::deserialize(deserializer)?;
        if !major.is_finite() {
            return Err(serde::de::Error::custom("amount must be a finite number"));
        }
        Ok(Money::from_major(major))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_minor_conversion() {
        assert_eq!(Money::from_major(1000.0).minor(), 100_000);
        assert_eq!(Money::from_major(499.99).minor(), 49_999);
        assert_eq!(Money::from_minor(12_345).to_string(), "123.45");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
    }

    #[test]
    fn test_wire_format_uses_major_units() {
        let json = serde_json::to_string(&Money::from_major(1000.0)).unwrap();
        assert_eq!(json, "1000");

        let json = serde_json::to_string(&Money::from_minor(1050)).unwrap();
        assert_eq!(json, "10.5");

        let parsed: Money = serde_json::from_str("249.5").unwrap();
        assert_eq!(parsed, Money::from_minor(24_950));
    }

    #[test]
    fn test_checked_arithmetic() {
        let line = Money::from_major(120.0).checked_mul(3).unwrap();
        let total = line.checked_add(Money::from_major(50.0)).unwrap();
        assert_eq!(total, Money::from_major(410.0));

        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
        assert_eq!(
            Money::from_major(1000.0).checked_mul(u32::MAX),
            Some(Money::from_minor(100_000 * i64::from(u32::MAX)))
        );
        assert_eq!(Money::from_minor(i64::MAX / 2).checked_mul(3), None);
    }
}
