use miette::Diagnostic;
use thiserror::Error;

pub type ParamResult<T> = Result<T, ParamError>;

#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum ParamError {
    #[error("Parameter not found: {name}")]
    #[diagnostic(
        code(query_data::parameter_not_found),
        help("the client request must supply every external parameter the plan declares")
    )]
    ParameterNotFound { name: String },

    /// With `strict` set the result was required for final linking, which
    /// means the plan referenced a result that no transaction produced.
    #[error("Result {result_index} of transaction {tx_index} is not available yet")]
    #[diagnostic(code(query_data::upstream_not_ready))]
    UpstreamResultNotReady {
        tx_index: usize,
        result_index: usize,
        strict: bool,
    },

    #[error("Malformed parameter binding: {message}")]
    #[diagnostic(
        code(query_data::malformed_binding),
        help("the compiled plan is corrupt or was produced by an incompatible compiler")
    )]
    MalformedBinding { message: String },

    #[error("Clock value {value} for {kind} does not fit in 32 bits")]
    #[diagnostic(
        code(query_data::clock_overflow),
        help("check the time source configured for this query")
    )]
    ClockOverflow { kind: &'static str, value: i128 },

    #[error("Allocator misuse: {message}")]
    #[diagnostic(code(query_data::allocator_misuse))]
    AllocatorMisuse { message: String },

    #[error("Type mismatch: {message}")]
    #[diagnostic(code(query_data::type_mismatch))]
    TypeMismatch { message: String },

    #[error("Arena exhausted: {requested} more bytes would exceed the limit of {limit}")]
    #[diagnostic(
        code(query_data::arena_exhausted),
        help("raise `memory_limit` in the query data configuration")
    )]
    ArenaExhausted { requested: usize, limit: usize },

    #[error("Transport chunk error: {message}")]
    #[diagnostic(code(query_data::transport))]
    Transport { message: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(query_data::config))]
    Config { message: String },
}

impl ParamError {
    /// Invariant violations that must terminate the current query instead of
    /// being branched on by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParamError::MalformedBinding { .. }
                | ParamError::ClockOverflow { .. }
                | ParamError::AllocatorMisuse { .. }
                | ParamError::UpstreamResultNotReady { strict: true, .. }
        )
    }

    pub(crate) fn misuse(message: impl Into<String>) -> Self {
        ParamError::AllocatorMisuse {
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        ParamError::TypeMismatch {
            message: message.into(),
        }
    }
}
