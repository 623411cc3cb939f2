use crate::asset::AssetKind;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Canonical ticker symbol - uppercase, without any exchange suffix.
///
/// The ticker alone identifies an asset across the system. Quote providers that require a
/// `.SA` suffix for B3 listed symbols receive it via [`Ticker::wire_symbol`]; the suffix is
/// never stored.
///
/// eg/ "PETR4", "HGLG11", "AAPL"
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Ticker(SmolStr);

impl Ticker {
    /// Construct a new [`Ticker`] from raw input - trims, uppercases, and strips a trailing
    /// `.SA` exchange suffix.
    pub fn new<S>(raw: S) -> Self
    where
        S: AsRef<str>,
    {
        let raw = raw.as_ref().trim();
        let upper = raw.to_uppercase();
        let canonical = upper.strip_suffix(".SA").unwrap_or(&upper);
        Self(SmolStr::new(canonical))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if this ticker matches the B3 (Brazilian) listing shape: 4-6 characters, a letter
    /// prefix of at least 3 letters, and a numeric suffix of 1-2 digits.
    ///
    /// eg/ "PETR4", "VALE3", "HGLG11", but not "AAPL" or "BRK.B".
    pub fn is_brazilian(&self) -> bool {
        self.split_b3().is_some()
    }

    /// The symbol to send over the wire to providers that list B3 symbols under a `.SA` suffix.
    pub fn wire_symbol(&self) -> SmolStr {
        if self.is_brazilian() {
            SmolStr::new(format!("{}.SA", self.0))
        } else {
            self.0.clone()
        }
    }

    /// Infer the [`AssetKind`] from the ticker shape.
    ///
    /// B3 conventions: a 4-letter prefix with suffix 11 is an FII, suffix 34 or 35 a BDR, and
    /// "AGRO"/"FIAG" names a FIAGRO. Anything non-Brazilian defaults to a stock.
    pub fn infer_kind(&self) -> AssetKind {
        let Some((letters, suffix)) = self.split_b3() else {
            return AssetKind::Stock;
        };

        if suffix == 11 && letters.len() == 4 {
            return AssetKind::Fii;
        }
        if suffix == 34 || suffix == 35 {
            return AssetKind::Bdr;
        }
        if self.0.contains("AGRO") || self.0.starts_with("FIAG") {
            return AssetKind::Fiagro;
        }

        AssetKind::Stock
    }

    /// Split a B3-shaped ticker into its letter prefix and numeric suffix.
    fn split_b3(&self) -> Option<(&str, u32)> {
        let symbol = self.0.as_str();
        if !(4..=6).contains(&symbol.len()) {
            return None;
        }

        let letters = symbol.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = &symbol[letters.len()..];

        if letters.len() < 3 || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        if digits.is_empty() || digits.len() > 2 {
            return None;
        }

        digits.parse().ok().map(|suffix| (letters, suffix))
    }
}

impl Display for Ticker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Ticker {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Ticker {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_new_normalises() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let cases = vec![
            TestCase {
                input: "petr4",
                expected: "PETR4",
            },
            TestCase {
                input: "PETR4.SA",
                expected: "PETR4",
            },
            TestCase {
                input: " vale3.sa ",
                expected: "VALE3",
            },
            TestCase {
                input: "AAPL",
                expected: "AAPL",
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(Ticker::new(test.input).as_str(), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_ticker_is_brazilian() {
        struct TestCase {
            input: &'static str,
            expected: bool,
        }

        let cases = vec![
            TestCase {
                input: "PETR4",
                expected: true,
            },
            TestCase {
                input: "HGLG11",
                expected: true,
            },
            TestCase {
                input: "B3SA3",
                expected: true,
            },
            TestCase {
                input: "AAPL",
                expected: false,
            },
            TestCase {
                input: "MSFT",
                expected: false,
            },
            // Digit suffix longer than 2
            TestCase {
                input: "ABC123",
                expected: false,
            },
            // Letter prefix shorter than 3
            TestCase {
                input: "AB3",
                expected: false,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                Ticker::new(test.input).is_brazilian(),
                test.expected,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_ticker_infer_kind() {
        struct TestCase {
            input: &'static str,
            expected: AssetKind,
        }

        let cases = vec![
            TestCase {
                input: "PETR4",
                expected: AssetKind::Stock,
            },
            TestCase {
                input: "HGLG11",
                expected: AssetKind::Fii,
            },
            TestCase {
                input: "AAPL34",
                expected: AssetKind::Bdr,
            },
            TestCase {
                input: "MSFT35",
                expected: AssetKind::Bdr,
            },
            TestCase {
                input: "FIAGR11",
                expected: AssetKind::Stock, // 7 chars - not B3 shaped
            },
            TestCase {
                input: "AGRO3",
                expected: AssetKind::Fiagro,
            },
            TestCase {
                input: "AAPL",
                expected: AssetKind::Stock,
            },
            TestCase {
                input: "TAEE11",
                expected: AssetKind::Fii,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                Ticker::new(test.input).infer_kind(),
                test.expected,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_ticker_wire_symbol() {
        assert_eq!(Ticker::new("PETR4").wire_symbol(), "PETR4.SA");
        assert_eq!(Ticker::new("AAPL").wire_symbol(), "AAPL");
        assert_eq!(Ticker::new("VALE3.SA").wire_symbol(), "VALE3.SA");
    }
}
