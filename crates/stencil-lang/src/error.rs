pub mod runtime;

use miette::{Diagnostic, SourceOffset, SourceSpan};
use smol_str::SmolStr;

pub use runtime::{BoundSide, EvaluationError, RuntimeError};

/// A render failure with enough context for a rich report.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: RuntimeError,
    /// Name of the template that was executing when the error was raised.
    pub template_name: SmolStr,
    /// The source text of that template, empty when the tree came without one.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(
        template_name: impl Into<SmolStr>,
        source_code: Option<&str>,
        cause: RuntimeError,
    ) -> Self {
        let source_code = source_code.unwrap_or_default().to_string();
        let range = cause.location();

        let location = if source_code.is_empty() {
            SourceSpan::new(0.into(), 0)
        } else {
            let start = SourceOffset::from_location(
                &source_code,
                range.start.line as usize,
                range.start.column,
            );
            let end =
                SourceOffset::from_location(&source_code, range.end.line as usize, range.end.column);
            SourceSpan::new(
                start,
                std::cmp::max(end.offset().saturating_sub(start.offset()), 1),
            )
        };

        Self {
            cause,
            template_name: template_name.into(),
            source_code,
            location,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new(format!("RuntimeError::{}", self.cause.kind())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            RuntimeError::InvalidReference(..) => Some(
                "Use a default operator or a parenthesized existence check if the value may be missing."
                    .to_string(),
            ),
            RuntimeError::NonBoolean(..) => {
                Some("Conditions must evaluate to true or false.".to_string())
            }
            RuntimeError::NonNumerical(..) => {
                Some("Arithmetic operands must be numbers.".to_string())
            }
            RuntimeError::Evaluation(_, EvaluationError::AmbiguousMethod { .. }) => Some(
                "Convert an argument explicitly so that exactly one overload is most specific."
                    .to_string(),
            ),
            RuntimeError::MissingParameter(_, _, param) => {
                Some(format!("Pass a value for \"{param}\" or give it a default."))
            }
            RuntimeError::IndexOutOfBounds { .. } | RuntimeError::NegativeIndex(..) => {
                Some("Index out of bounds. Check your sequence or string indices.".to_string())
            }
            RuntimeError::DivisionByZero(_) => Some("Division by zero is not allowed.".to_string()),
            RuntimeError::RecursionLimit(_, depth) => Some(format!(
                "Macro calls nested deeper than {depth} levels. Raise max_call_depth if this is intended."
            )),
            RuntimeError::TemplateLoad(_, name, _) => Some(format!(
                "Template '{name}' could not be resolved. Check the name or the search path."
            )),
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        if self.source_code.is_empty() {
            return None;
        }

        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        if self.source_code.is_empty() {
            None
        } else {
            Some(&self.source_code)
        }
    }
}
