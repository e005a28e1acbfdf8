//! Amount extraction patterns.
//!
//! Every pattern captures exactly one decimal number in group 1. All matches
//! of all patterns are scored; list order only decides ties.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Decimal number with an optional one- or two-digit fraction.
const AMOUNT: &str = r"([0-9]+(?:[.,][0-9]{1,2})?)";

/// Currency symbols recognized in front of an amount.
const SYMBOL: &str = r"[$€£¥]";

/// Which shape of text produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// `$150`, `€20`.
    CurrencySymbol,
    /// `150 dollars`, `250 aud`.
    CurrencyWord,
    /// `bid 150`, `bid $150`.
    BidWord,
    /// `+50`, `+ $50`.
    PlusSign,
    /// `plus 50`, `add $50`.
    PlusWord,
    /// Any number at all.
    BareNumber,
}

impl PatternKind {
    /// Pattern means "add this to the current bid".
    #[inline]
    pub fn is_increment(self) -> bool {
        matches!(self, PatternKind::PlusSign | PatternKind::PlusWord)
    }

    /// Pattern is anchored on a bid word or admits a currency symbol.
    #[inline]
    pub fn is_direct(self) -> bool {
        matches!(
            self,
            PatternKind::CurrencySymbol
                | PatternKind::BidWord
                | PatternKind::PlusSign
                | PatternKind::PlusWord
        )
    }
}

/// A compiled extraction pattern.
#[derive(Debug)]
pub struct BidPattern {
    pub kind: PatternKind,
    pub regex: Regex,
}

/// Patterns in order of specificity. Input is expected lower-cased.
pub static BID_PATTERNS: Lazy<Vec<BidPattern>> = Lazy::new(|| {
    [
        (PatternKind::CurrencySymbol, format!(r"{SYMBOL}{AMOUNT}")),
        (
            PatternKind::CurrencyWord,
            format!(r"{AMOUNT}\s*(?:dollars?|eur|gbp|jpy|aud)"),
        ),
        (PatternKind::BidWord, format!(r"bid\s*{SYMBOL}?{AMOUNT}")),
        (PatternKind::PlusSign, format!(r"\+\s*{SYMBOL}?{AMOUNT}")),
        (PatternKind::PlusWord, format!(r"(?:plus|add)\s*{SYMBOL}?{AMOUNT}")),
        (PatternKind::BareNumber, AMOUNT.to_string()),
    ]
    .into_iter()
    .map(|(kind, source)| BidPattern {
        kind,
        regex: Regex::new(&source).expect("Invalid bid pattern regex"),
    })
    .collect()
});

/// Parse a captured amount, accepting `,` as the decimal separator.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_capture(kind: PatternKind, text: &str) -> Option<String> {
        let pattern = BID_PATTERNS.iter().find(|p| p.kind == kind)?;
        pattern
            .regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    #[test]
    fn test_pattern_order() {
        let kinds: Vec<_> = BID_PATTERNS.iter().map(|p| p.kind).collect();
        assert_eq!(kinds.first(), Some(&PatternKind::CurrencySymbol));
        assert_eq!(kinds.last(), Some(&PatternKind::BareNumber));
        assert_eq!(kinds.len(), 6);
    }

    #[test]
    fn test_symbol_patterns() {
        assert_eq!(first_capture(PatternKind::CurrencySymbol, "i bid $150"), Some("150".into()));
        assert_eq!(first_capture(PatternKind::CurrencySymbol, "€20.5 please"), Some("20.5".into()));
        assert_eq!(first_capture(PatternKind::CurrencySymbol, "150"), None);
    }

    #[test]
    fn test_word_patterns() {
        assert_eq!(first_capture(PatternKind::CurrencyWord, "250 aud"), Some("250".into()));
        assert_eq!(first_capture(PatternKind::CurrencyWord, "40 dollar"), Some("40".into()));
        assert_eq!(first_capture(PatternKind::BidWord, "bid £75"), Some("75".into()));
        assert_eq!(first_capture(PatternKind::BidWord, "bid75"), Some("75".into()));
    }

    #[test]
    fn test_increment_patterns() {
        assert_eq!(first_capture(PatternKind::PlusSign, "+ $50 more"), Some("50".into()));
        assert_eq!(first_capture(PatternKind::PlusWord, "add 20"), Some("20".into()));
        assert_eq!(first_capture(PatternKind::PlusWord, "plus $5"), Some("5".into()));
        assert!(PatternKind::PlusSign.is_increment());
        assert!(PatternKind::PlusWord.is_direct());
        assert!(!PatternKind::CurrencyWord.is_direct());
        assert!(!PatternKind::BareNumber.is_increment());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("150"), Some(150.0));
        assert_eq!(parse_amount("12,5"), Some(12.5));
        assert_eq!(parse_amount("12.50"), Some(12.5));
        assert_eq!(parse_amount("abc"), None);
    }
}
