use plotline_stream::{StreamFailure, StreamSession};

/// Status texts opening with one of these render as access-denial errors.
/// The backend emits them verbatim when a collection is restricted, and the
/// transport reuses the permission wording for HTTP 403, so both paths
/// classify identically.
pub const ACCESS_DENIED_PREFIXES: [&str; 2] =
    ["You don't have access", "You don't have permission"];

/// How a status line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSeverity {
    Info,
    Error,
}

pub fn is_access_denied(status: &str) -> bool {
    ACCESS_DENIED_PREFIXES
        .iter()
        .any(|prefix| status.starts_with(prefix))
}

/// Severity of the session's current status line.
pub fn status_severity(session: &StreamSession) -> StatusSeverity {
    if session.failure().is_some() || is_access_denied(session.current_status()) {
        StatusSeverity::Error
    } else {
        StatusSeverity::Info
    }
}

/// Short user-facing hint for a failure class, shown next to the status.
pub fn failure_hint(failure: StreamFailure) -> &'static str {
    match failure {
        StreamFailure::AuthFailed => "Check your credentials and try again.",
        StreamFailure::PermissionDenied => "Ask the collection owner for access.",
        StreamFailure::HttpStatus(_) => "The server rejected the request.",
        StreamFailure::Transport => "Check your connection and try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotline_stream::{QueryEvent, StreamClose};

    #[test]
    fn denial_prefixes_classify_as_access_denied() {
        assert!(is_access_denied("You don't have access to collection 'x'."));
        assert!(is_access_denied(
            "You don't have permission to access this resource."
        ));
        assert!(!is_access_denied("Searching documents"));
        // Prefix match only; a denial mentioned mid-sentence is not one.
        assert!(!is_access_denied("Note: You don't have access"));
    }

    #[test]
    fn backend_denial_status_renders_as_error_while_streaming() {
        let mut session = StreamSession::new();
        session.begin();
        session.apply(QueryEvent::Status(
            "You don't have access to collection 'finance'.".to_string(),
        ));

        assert!(session.is_streaming());
        assert_eq!(status_severity(&session), StatusSeverity::Error);
    }

    #[test]
    fn transport_denial_renders_as_error() {
        let mut session = StreamSession::new();
        session.begin();
        session.close(StreamClose::PermissionDenied);

        assert_eq!(status_severity(&session), StatusSeverity::Error);
    }

    #[test]
    fn ordinary_progress_is_informational() {
        let mut session = StreamSession::new();
        session.begin();
        session.apply(QueryEvent::Status("Generating answer".to_string()));

        assert_eq!(status_severity(&session), StatusSeverity::Info);
    }
}
