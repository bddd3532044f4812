use crate::runtime::error::ParamError;
use miette::{Diagnostic, Report};
use thiserror::Error;
use tracing::error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueKind {
    /// The request cannot be bound to the plan; the client can fix it.
    BadRequest,
    /// Retry once the missing upstream data exists.
    Unavailable,
    /// Engine-side failure that should never happen in correct operation.
    Internal,
}

/// Error as reported back to the client issuing the query.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
#[error("{message}")]
pub struct UserIssue {
    pub kind: IssueKind,
    pub message: String,
    #[help]
    pub help: Option<String>,
}

pub fn user_issue(err: &ParamError) -> UserIssue {
    match err {
        ParamError::ParameterNotFound { name } => UserIssue {
            kind: IssueKind::BadRequest,
            message: format!("Missing value for parameter: {name}"),
            help: Some("declare and pass every parameter used by the query".into()),
        },
        ParamError::TypeMismatch { message } => UserIssue {
            kind: IssueKind::BadRequest,
            message: format!("Invalid parameter value: {message}"),
            help: None,
        },
        ParamError::UpstreamResultNotReady { strict: false, .. } => UserIssue {
            kind: IssueKind::Unavailable,
            message: err.to_string(),
            help: None,
        },
        other => {
            error!(err = %other, fatal = other.is_fatal(), "internal parameter failure");
            UserIssue {
                kind: IssueKind::Internal,
                message: "Internal error while binding query parameters".into(),
                help: None,
            }
        }
    }
}

/// Renders `err` with its diagnostic code and help text for engine logs.
pub fn render_param_error(err: &ParamError) -> String {
    format!("{:?}", Report::new(err.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_client_parameter_names_it() {
        let issue = user_issue(&ParamError::ParameterNotFound {
            name: "$limit".into(),
        });
        assert_eq!(issue.kind, IssueKind::BadRequest);
        assert!(issue.message.contains("$limit"));
    }

    #[test]
    fn invariant_violations_are_hidden_behind_internal_error() {
        let issue = user_issue(&ParamError::ClockOverflow {
            kind: "CURRENT_DATETIME",
            value: 1 << 33,
        });
        assert_eq!(issue.kind, IssueKind::Internal);
        assert!(!issue.message.contains("CURRENT_DATETIME"));
    }

    #[test]
    fn missing_result_at_final_linking_is_internal() {
        let strict = ParamError::UpstreamResultNotReady {
            tx_index: 1,
            result_index: 0,
            strict: true,
        };
        assert_eq!(user_issue(&strict).kind, IssueKind::Internal);
        let pending = ParamError::UpstreamResultNotReady {
            tx_index: 1,
            result_index: 0,
            strict: false,
        };
        assert_eq!(user_issue(&pending).kind, IssueKind::Unavailable);
    }

    #[test]
    fn rendered_report_carries_diagnostic_code() {
        let rendered = render_param_error(&ParamError::MalformedBinding {
            message: "unknown tag".into(),
        });
        assert!(rendered.contains("query_data::malformed_binding"));
    }
}
