use strand_types::Span;

/// Errors raised while executing kernel statements
///
/// Every variant carries the span of the statement that failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("Unification conflict at {span}: cannot unify {left} with {right}")]
    UnificationConflict {
        span: Span,
        left: String,
        right: String,
    },

    #[error("Unbound identifier at {span}: {name}")]
    UnboundIdentifier { span: Span, name: String },

    #[error("Arity mismatch at {span}: expected {expected}, got {got}")]
    ArityMismatch {
        span: Span,
        expected: usize,
        got: usize,
    },

    #[error("Type mismatch at {span}: expected {expected}, got {got}")]
    TypeMismatch {
        span: Span,
        expected: String,
        got: String,
    },

    #[error("Duplicate feature at {span}: {feature}")]
    DuplicateFeature { span: Span, feature: String },

    #[error("Missing feature at {span}: {feature}")]
    MissingFeature { span: Span, feature: String },

    #[error("Arithmetic error at {span}: {message}")]
    Arithmetic { span: Span, message: String },

    #[error("Actor {address} cannot ask itself (at {span})")]
    SelfAsk { span: Span, address: String },

    #[error("Failed value used at {span}: {message}")]
    FailedValue { span: Span, message: String },

    #[error("Unhandled message at {span}: {message}")]
    Unhandled { span: Span, message: String },

    #[error("Actor host error at {span}: {message}")]
    Host { span: Span, message: String },
}

impl KernelError {
    pub fn span(&self) -> Span {
        match self {
            KernelError::UnificationConflict { span, .. }
            | KernelError::UnboundIdentifier { span, .. }
            | KernelError::ArityMismatch { span, .. }
            | KernelError::TypeMismatch { span, .. }
            | KernelError::DuplicateFeature { span, .. }
            | KernelError::MissingFeature { span, .. }
            | KernelError::Arithmetic { span, .. }
            | KernelError::SelfAsk { span, .. }
            | KernelError::FailedValue { span, .. }
            | KernelError::Unhandled { span, .. }
            | KernelError::Host { span, .. } => *span,
        }
    }

    pub(crate) fn type_mismatch(span: Span, expected: impl Into<String>, got: impl Into<String>) -> Self {
        KernelError::TypeMismatch {
            span,
            expected: expected.into(),
            got: got.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
