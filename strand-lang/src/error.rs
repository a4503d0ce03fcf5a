use std::fmt;
use strand_types::Span;

/// Errors raised while turning source text into kernel statements
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LangError {
    #[error("Lexer error at {span}: {message}")]
    Lexer { span: Span, message: String },

    #[error("Parser error at {span}: {message}")]
    Parser { span: Span, message: String },

    #[error("Lowering error at {span}: {message}")]
    Lower { span: Span, message: String },
}

impl LangError {
    pub fn span(&self) -> Span {
        match self {
            LangError::Lexer { span, .. } | LangError::Parser { span, .. } | LangError::Lower { span, .. } => {
                *span
            }
        }
    }

    pub(crate) fn parser(span: Span, message: impl Into<String>) -> Self {
        LangError::Parser {
            span,
            message: message.into(),
        }
    }

    pub(crate) fn lower(span: Span, message: impl Into<String>) -> Self {
        LangError::Lower {
            span,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LangError>;

/// Renders an error against its source: position plus a caret line
pub struct ErrorContext<'a> {
    pub source: &'a str,
    pub error: &'a LangError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(source: &'a str, error: &'a LangError) -> Self {
        Self { source, error }
    }

    fn start(&self) -> usize {
        self.error.span().start.min(self.source.len())
    }

    /// The source line containing the start of the error
    pub fn source_line(&self) -> &'a str {
        let start = self.start();
        let line_start = self.source[..start].rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        let line_end = self.source[start..]
            .find('\n')
            .map(|pos| start + pos)
            .unwrap_or(self.source.len());
        &self.source[line_start..line_end]
    }

    /// Line and column numbers (1-indexed)
    pub fn line_col(&self) -> (usize, usize) {
        let start = self.start();
        let line = self.source[..start].matches('\n').count() + 1;
        let line_start = self.source[..start].rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        (line, start - line_start + 1)
    }
}

impl fmt::Display for ErrorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        writeln!(f, "Error at line {}, column {}:", line, col)?;
        writeln!(f, "  {}", self.error)?;

        let source_line = self.source_line();
        writeln!(f)?;
        writeln!(f, "  {}", source_line)?;
        let col_start = col - 1;
        let width = self
            .error
            .span()
            .len()
            .min(source_line.len().saturating_sub(col_start))
            .max(1);
        writeln!(f, "  {}{}", " ".repeat(col_start), "^".repeat(width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_points_at_span() {
        let source = "var x = 1\nx = $\n";
        let error = LangError::Lexer {
            span: Span::new(14, 15),
            message: "Invalid token: $".to_string(),
        };
        let ctx = ErrorContext::new(source, &error);
        assert_eq!(ctx.line_col(), (2, 5));
        assert_eq!(ctx.source_line(), "x = $");
        let rendered = ctx.to_string();
        assert!(rendered.contains("line 2, column 5"));
        assert!(rendered.ends_with("  x = $\n      ^\n"));
    }
}
