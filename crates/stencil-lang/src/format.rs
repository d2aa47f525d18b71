use std::{
    fmt::Write,
    sync::{LazyLock, RwLock},
};

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::format::{Item, StrftimeItems};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared,
    number::{Number, decimal_to_string},
    settings::{Settings, split_boolean_format},
    value::{DateKind, DateValue},
};

/// Decimal and grouping separators of a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbols {
    pub decimal: char,
    pub grouping: char,
}

impl Symbols {
    pub fn for_locale(locale: &str) -> Self {
        let language = locale
            .split(['_', '-'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match language.as_str() {
            "de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" => Symbols {
                decimal: ',',
                grouping: '.',
            },
            "fr" | "ru" | "pl" | "cs" | "sv" | "fi" | "nb" | "uk" => Symbols {
                decimal: ',',
                grouping: '\u{a0}',
            },
            _ => Symbols {
                decimal: '.',
                grouping: ',',
            },
        }
    }
}

/// A parsed number pattern such as `#,##0.00`, or the computer format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberFormat {
    Computer,
    Pattern {
        min_int: usize,
        min_frac: usize,
        max_frac: usize,
        grouping: Option<usize>,
    },
}

impl NumberFormat {
    pub fn parse(pattern: &str) -> Result<NumberFormat, String> {
        match pattern {
            "computer" | "c" => return Ok(NumberFormat::Computer),
            "number" => return NumberFormat::parse("#,##0.###"),
            _ => {}
        }

        let (int_part, frac_part) = pattern.split_once('.').unwrap_or((pattern, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err("empty number pattern".to_string());
        }
        if let Some(c) = int_part.chars().find(|c| !matches!(c, '#' | '0' | ',')) {
            return Err(format!("unexpected character '{c}' in the integer part"));
        }
        if let Some(c) = frac_part.chars().find(|c| !matches!(c, '#' | '0')) {
            return Err(format!("unexpected character '{c}' in the fraction part"));
        }

        let grouping = int_part
            .rfind(',')
            .map(|i| int_part.len() - i - 1)
            .filter(|size| *size > 0);

        Ok(NumberFormat::Pattern {
            min_int: int_part.chars().filter(|c| *c == '0').count(),
            min_frac: frac_part.chars().take_while(|c| *c == '0').count(),
            max_frac: frac_part.len(),
            grouping,
        })
    }

    pub fn format(&self, number: &Number, symbols: Symbols) -> String {
        let NumberFormat::Pattern {
            min_int,
            min_frac,
            max_frac,
            grouping,
        } = self
        else {
            return number.to_string();
        };

        let Some(decimal) = number.to_decimal() else {
            // NaN and infinities have no digits to lay out.
            return number.to_string();
        };

        let rounded = decimal.with_scale_round(*max_frac as i64, RoundingMode::HalfEven);
        let negative = rounded < BigDecimal::from(0);
        let text = decimal_to_string(&rounded.abs());
        let (int_digits, frac_digits) = text.split_once('.').unwrap_or((&text, ""));

        let mut int_digits = int_digits.trim_start_matches('0').to_string();
        while int_digits.len() < *min_int {
            int_digits.insert(0, '0');
        }
        if int_digits.is_empty() {
            int_digits.push('0');
        }

        let mut frac_digits = frac_digits.to_string();
        while frac_digits.len() < *min_frac {
            frac_digits.push('0');
        }

        let mut out = String::new();
        if negative && (int_digits.chars().chain(frac_digits.chars()).any(|c| c != '0')) {
            out.push('-');
        }

        match grouping {
            Some(size) => {
                let len = int_digits.len();
                for (i, c) in int_digits.chars().enumerate() {
                    if i > 0 && (len - i) % size == 0 {
                        out.push(symbols.grouping);
                    }
                    out.push(c);
                }
            }
            None => out.push_str(&int_digits),
        }

        if !frac_digits.is_empty() {
            out.push(symbols.decimal);
            out.push_str(&frac_digits);
        }
        out
    }
}

static NUMBER_FORMATS: LazyLock<RwLock<FxHashMap<(SmolStr, SmolStr), Shared<NumberFormat>>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// Parsed number format for `(locale, pattern)`, shared across renders.
pub fn number_format(locale: &str, pattern: &str) -> Result<Shared<NumberFormat>, String> {
    let key = (SmolStr::new(locale), SmolStr::new(pattern));

    if let Some(format) = NUMBER_FORMATS
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&key)
    {
        return Ok(Shared::clone(format));
    }

    let mut formats = NUMBER_FORMATS.write().unwrap_or_else(|e| e.into_inner());
    if let Some(format) = formats.get(&key) {
        return Ok(Shared::clone(format));
    }

    let format = Shared::new(NumberFormat::parse(pattern)?);
    tracing::trace!(locale, pattern, "caching number format");
    formats.insert(key, Shared::clone(&format));
    Ok(format)
}

/// Formats a date with a strftime pattern without panicking on bad patterns.
pub fn format_date(date: &DateValue, pattern: &str) -> Result<String, String> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date pattern \"{pattern}\""));
    }

    let mut out = String::new();
    write!(out, "{}", date.value.format(pattern))
        .map_err(|_| format!("date cannot be formatted with \"{pattern}\""))?;
    Ok(out)
}

/// Renders scalars according to the active settings.
#[derive(Debug, Clone)]
pub struct Formatter {
    number: Shared<NumberFormat>,
    symbols: Symbols,
    true_text: SmolStr,
    false_text: SmolStr,
    date_format: String,
    time_format: String,
    datetime_format: String,
}

impl Formatter {
    pub fn new(settings: &Settings) -> Result<Self, String> {
        let (true_text, false_text) = split_boolean_format(&settings.boolean_format)
            .ok_or_else(|| format!("invalid boolean format \"{}\"", settings.boolean_format))?;

        Ok(Self {
            number: number_format(&settings.locale, &settings.number_format)?,
            symbols: Symbols::for_locale(&settings.locale),
            true_text: SmolStr::new(true_text),
            false_text: SmolStr::new(false_text),
            date_format: settings.date_format.clone(),
            time_format: settings.time_format.clone(),
            datetime_format: settings.datetime_format.clone(),
        })
    }

    pub fn number(&self, number: &Number) -> String {
        self.number.format(number, self.symbols)
    }

    /// Formats with an explicit pattern, as `?string("0.00")` does.
    pub fn number_with(&self, number: &Number, pattern: &str) -> Result<String, String> {
        NumberFormat::parse(pattern).map(|format| format.format(number, self.symbols))
    }

    pub fn boolean(&self, b: bool) -> SmolStr {
        if b {
            self.true_text.clone()
        } else {
            self.false_text.clone()
        }
    }

    pub fn date(&self, date: &DateValue) -> Result<String, String> {
        let pattern = match date.kind {
            DateKind::Date => &self.date_format,
            DateKind::Time => &self.time_format,
            DateKind::DateTime => &self.datetime_format,
            DateKind::Unknown => {
                return Err("a date of unknown kind cannot be formatted".to_string());
            }
        };
        format_date(date, pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use std::str::FromStr;

    fn dec(s: &str) -> Number {
        Number::Decimal(BigDecimal::from_str(s).unwrap())
    }

    #[rstest]
    #[case("0.00", dec("3.14159"), "en_US", "3.14")]
    #[case("0.00", Number::Int(3), "en_US", "3.00")]
    #[case("#.##", dec("2.5"), "en_US", "2.5")]
    #[case("#.##", dec("0.5"), "en_US", "0.5")]
    #[case("#,##0.00", dec("1234567.891"), "en_US", "1,234,567.89")]
    #[case("#,##0.00", dec("1234567.891"), "de_DE", "1.234.567,89")]
    #[case("000", Number::Int(7), "en_US", "007")]
    #[case("0", dec("-0.2"), "en_US", "0")]
    #[case("0.0", dec("-1.25"), "en_US", "-1.2")]
    #[case("number", dec("1234.5"), "en_US", "1,234.5")]
    #[case("computer", dec("1234.50"), "de_DE", "1234.5")]
    fn test_number_format(
        #[case] pattern: &str,
        #[case] number: Number,
        #[case] locale: &str,
        #[case] expected: &str,
    ) {
        let format = number_format(locale, pattern).unwrap();
        assert_eq!(format.format(&number, Symbols::for_locale(locale)), expected);
    }

    #[rstest]
    #[case("0.0x")]
    #[case("abc")]
    #[case("")]
    fn test_number_format_rejects(#[case] pattern: &str) {
        assert!(NumberFormat::parse(pattern).is_err());
    }

    #[test]
    fn test_number_formats_are_cached() {
        let a = number_format("en_US", "0.0000").unwrap();
        let b = number_format("en_US", "0.0000").unwrap();
        assert!(Shared::ptr_eq(&a, &b));
    }

    #[test]
    fn test_formatter_from_settings() {
        let settings = Settings {
            boolean_format: "yes,no".to_string(),
            ..Settings::default()
        };
        let formatter = Formatter::new(&settings).unwrap();
        let date = DateValue::date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        assert_eq!(formatter.boolean(true), "yes");
        assert_eq!(formatter.boolean(false), "no");
        assert_eq!(formatter.date(&date), Ok("2024-02-29".to_string()));
        assert_eq!(formatter.number(&Number::Int(42)), "42");
    }

    #[test]
    fn test_format_date_rejects_bad_pattern() {
        let date = DateValue::date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(format_date(&date, "%Q").is_err());
        assert_eq!(format_date(&date, "%d.%m.%Y"), Ok("29.02.2024".to_string()));
    }
}
