//! Number formatting conventions per locale.

/// Where the currency symbol goes relative to the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPosition {
    Prefix,
    Suffix,
}

/// How integer digits are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// Groups of three: 1,234,567.
    Thousands,
    /// Last three, then pairs: 12,34,567.
    Indian,
}

/// Separators and symbol placement for one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleFormat {
    pub tag: &'static str,
    pub decimal: char,
    pub group: char,
    pub grouping: Grouping,
    pub symbol_position: SymbolPosition,
    pub symbol_space: bool,
}

const fn locale(
    tag: &'static str,
    decimal: char,
    group: char,
    symbol_position: SymbolPosition,
    symbol_space: bool,
) -> LocaleFormat {
    LocaleFormat {
        tag,
        decimal,
        group,
        grouping: Grouping::Thousands,
        symbol_position,
        symbol_space,
    }
}

use SymbolPosition::{Prefix, Suffix};

static LOCALES: &[LocaleFormat] = &[
    locale("en-US", '.', ',', Prefix, false),
    locale("en-GB", '.', ',', Prefix, false),
    locale("id-ID", ',', '.', Prefix, true),
    locale("de-DE", ',', '.', Suffix, true),
    locale("fr-FR", ',', ' ', Suffix, true),
    locale("ja-JP", '.', ',', Prefix, false),
    locale("ko-KR", '.', ',', Prefix, false),
    locale("en-SG", '.', ',', Prefix, false),
    locale("ms-MY", '.', ',', Prefix, false),
    locale("vi-VN", ',', '.', Suffix, true),
    locale("th-TH", '.', ',', Prefix, false),
    LocaleFormat {
        tag: "en-IN",
        decimal: '.',
        group: ',',
        grouping: Grouping::Indian,
        symbol_position: Prefix,
        symbol_space: false,
    },
    locale("zh-CN", '.', ',', Prefix, false),
    locale("en-AU", '.', ',', Prefix, false),
    locale("en-CA", '.', ',', Prefix, false),
    locale("en-PH", '.', ',', Prefix, false),
];

/// Look up a locale tag. Matching ignores case and accepts `_` for `-`.
/// A bare language (`id`) resolves to the first locale of that language.
pub fn lookup(tag: &str) -> Option<&'static LocaleFormat> {
    let tag = tag.trim().replace('_', "-");
    if tag.is_empty() {
        return None;
    }

    if let Some(found) = LOCALES.iter().find(|l| l.tag.eq_ignore_ascii_case(&tag)) {
        return Some(found);
    }

    let language = tag.split('-').next().unwrap_or_default();
    LOCALES.iter().find(|l| {
        l.tag
            .split('-')
            .next()
            .map_or(false, |lang| lang.eq_ignore_ascii_case(language))
    })
}

/// Insert group separators into a string of ASCII digits.
pub fn group_digits(digits: &str, separator: char, grouping: Grouping) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 2);

    for (i, ch) in digits.chars().enumerate() {
        let remaining = len - i;
        if i > 0 && is_group_boundary(remaining, grouping) {
            out.push(separator);
        }
        out.push(ch);
    }

    out
}

fn is_group_boundary(remaining: usize, grouping: Grouping) -> bool {
    match grouping {
        Grouping::Thousands => remaining % 3 == 0,
        Grouping::Indian => remaining == 3 || (remaining > 3 && (remaining - 3) % 2 == 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("id-ID").unwrap().decimal, ',');
        assert_eq!(lookup("ID_id").unwrap().tag, "id-ID");
        assert_eq!(lookup("de").unwrap().tag, "de-DE");
        assert_eq!(lookup("en").unwrap().tag, "en-US");
        assert!(lookup("xx-YY").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_digits("0", ',', Grouping::Thousands), "0");
        assert_eq!(group_digits("999", ',', Grouping::Thousands), "999");
        assert_eq!(group_digits("1000", ',', Grouping::Thousands), "1,000");
        assert_eq!(
            group_digits("1500000", '.', Grouping::Thousands),
            "1.500.000"
        );
    }

    #[test]
    fn test_group_indian() {
        assert_eq!(group_digits("1000", ',', Grouping::Indian), "1,000");
        assert_eq!(group_digits("100000", ',', Grouping::Indian), "1,00,000");
        assert_eq!(group_digits("1234567", ',', Grouping::Indian), "12,34,567");
    }
}
