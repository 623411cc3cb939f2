use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// A 3-letter currency code, stored uppercase.
///
/// eg/ "BRL", "USD"
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Currency(SmolStr);

impl Currency {
    /// Brazilian Real - the default base currency for consolidated views.
    pub const BRL: Currency = Currency(SmolStr::new_static("BRL"));

    /// United States Dollar.
    pub const USD: Currency = Currency(SmolStr::new_static("USD"));

    /// Construct a new [`Currency`], uppercasing the provided code.
    pub fn new<S>(code: S) -> Self
    where
        S: AsRef<str>,
    {
        let code = code.as_ref().trim();
        if code.chars().all(char::is_uppercase) {
            Self(SmolStr::new(code))
        } else {
            Self(SmolStr::new(code.to_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Currency {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_new_uppercases() {
        assert_eq!(Currency::new("brl"), Currency::BRL);
        assert_eq!(Currency::new(" usd "), Currency::USD);
        assert_eq!(Currency::new("EUR").as_str(), "EUR");
    }

    #[test]
    fn test_currency_de() {
        let actual = serde_json::from_str::<Currency>(r#""BRL""#).unwrap();
        assert_eq!(actual, Currency::BRL);
    }
}
