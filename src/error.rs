//! Error type shared by the compiler, evaluator and registry.

/// Everything that can go wrong while compiling or rendering a template.
///
/// `Lex`, `Parse` and `TagMismatch` are compile-time errors: compilation
/// stops at the first one and no partial template is returned. The rest
/// abort the render in progress. Missing variables and missing keys are
/// never errors; they evaluate to `Value::Null`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Unterminated tag or string literal, or a character the tokenizer
    /// does not recognize.
    #[error("Lex error at byte {position}: {message}")]
    Lex { message: String, position: usize },

    /// Unexpected token or unbalanced grouping inside a tag.
    #[error("Parse error at byte {position}: {message} (found {found})")]
    Parse {
        message: String,
        found: String,
        position: usize,
    },

    /// Missing, extra, or mismatched closing tag.
    #[error("Tag mismatch: {message}")]
    TagMismatch {
        message: String,
        /// The block that was left open, if any.
        opener: Option<String>,
    },

    /// A filter (or filter-style call) name that is not in the catalog.
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// A runtime failure: bad filter input, host callable error, or an
    /// exhausted render budget.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// The registry holds no template under this reference.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
}

impl Error {
    pub(crate) fn lex(message: impl Into<String>, position: usize) -> Self {
        Error::Lex {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn parse(message: impl Into<String>, found: impl Into<String>, position: usize) -> Self {
        Error::Parse {
            message: message.into(),
            found: found.into(),
            position,
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Error::Evaluation(message.into())
    }

    /// True for errors raised while compiling, as opposed to rendering.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Error::Lex { .. } | Error::Parse { .. } | Error::TagMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
