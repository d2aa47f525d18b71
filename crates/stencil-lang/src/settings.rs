use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{format::NumberFormat, number::ArithmeticKind};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid settings file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unknown setting \"{0}\"")]
    UnknownSetting(String),
    #[error("Invalid value \"{value}\" for setting \"{name}\": {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Render-time configuration.
///
/// Template headers and `Setting` instructions override single keys for the
/// rest of a render; the engine's copy is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Locale tag such as `en_US`; selects decimal and grouping separators.
    pub locale: String,
    /// `computer`, `number`, or a pattern such as `#,##0.00`.
    pub number_format: String,
    /// `true_text,false_text`.
    pub boolean_format: String,
    /// strftime patterns.
    pub date_format: String,
    pub time_format: String,
    pub datetime_format: String,
    pub arithmetic_engine: ArithmeticKind,
    /// Minimum fractional digits kept by decimal division.
    pub decimal_scale: u32,
    /// Maximum nesting of macro and function calls.
    pub max_call_depth: u32,
}

#[cfg(debug_assertions)]
const DEFAULT_MAX_CALL_DEPTH: u32 = 64; // Lower depth for debug builds.
#[cfg(not(debug_assertions))]
const DEFAULT_MAX_CALL_DEPTH: u32 = 512;

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: "en_US".to_string(),
            number_format: "computer".to_string(),
            boolean_format: "true,false".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M:%S".to_string(),
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            arithmetic_engine: ArithmeticKind::Decimal,
            decimal_scale: 12,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overrides one setting by name, validating the value.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason,
        };

        match name {
            "locale" => self.locale = value.to_string(),
            "number_format" => {
                NumberFormat::parse(value).map_err(invalid)?;
                self.number_format = value.to_string();
            }
            "boolean_format" => {
                split_boolean_format(value).ok_or_else(|| {
                    invalid("expected two values separated by a comma".to_string())
                })?;
                self.boolean_format = value.to_string();
            }
            "date_format" => self.date_format = value.to_string(),
            "time_format" => self.time_format = value.to_string(),
            "datetime_format" => self.datetime_format = value.to_string(),
            "arithmetic_engine" => self.arithmetic_engine = value.parse().map_err(invalid)?,
            "decimal_scale" => {
                self.decimal_scale = value.parse().map_err(|e| invalid(format!("{e}")))?
            }
            "max_call_depth" => {
                self.max_call_depth = value.parse().map_err(|e| invalid(format!("{e}")))?
            }
            _ => return Err(ConfigError::UnknownSetting(name.to_string())),
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        NumberFormat::parse(&self.number_format).map_err(|reason| ConfigError::InvalidValue {
            name: "number_format".to_string(),
            value: self.number_format.clone(),
            reason,
        })?;
        split_boolean_format(&self.boolean_format).ok_or_else(|| ConfigError::InvalidValue {
            name: "boolean_format".to_string(),
            value: self.boolean_format.clone(),
            reason: "expected two values separated by a comma".to_string(),
        })?;
        Ok(())
    }
}

/// `"yes,no"` into `("yes", "no")`; `c` is the computer format.
pub(crate) fn split_boolean_format(format: &str) -> Option<(&str, &str)> {
    if format == "c" {
        return Some(("true", "false"));
    }
    format.split_once(',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_from_toml_str() {
        let settings = Settings::from_toml_str(
            r##"
            locale = "de_DE"
            number_format = "#,##0.00"
            arithmetic_engine = "conservative"
            "##,
        )
        .unwrap();

        assert_eq!(settings.locale, "de_DE");
        assert_eq!(settings.number_format, "#,##0.00");
        assert_eq!(settings.arithmetic_engine, ArithmeticKind::Conservative);
        assert_eq!(settings.boolean_format, "true,false");
    }

    #[rstest]
    #[case("colour = \"red\"")]
    #[case("boolean_format = \"yes\"")]
    #[case("decimal_scale = \"many\"")]
    fn test_from_toml_str_rejects(#[case] input: &str) {
        assert!(Settings::from_toml_str(input).is_err());
    }

    #[rstest]
    #[case("boolean_format", "yes,no", true)]
    #[case("boolean_format", "yes", false)]
    #[case("number_format", "0.00", true)]
    #[case("arithmetic_engine", "conservative", true)]
    #[case("arithmetic_engine", "fast", false)]
    #[case("max_call_depth", "10", true)]
    #[case("max_call_depth", "-1", false)]
    #[case("colour", "red", false)]
    fn test_set(#[case] name: &str, #[case] value: &str, #[case] ok: bool) {
        let mut settings = Settings::default();
        assert_eq!(settings.set(name, value).is_ok(), ok);
    }
}
