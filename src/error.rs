use std::fmt;

/// The §7 error taxonomy. Pure functions (classifier, accumulator) never
/// produce this type — it surfaces only from I/O-touching code: the
/// registry, the multiplexer adapter call sites, the HTTP clients, and
/// the Control API handlers.
#[derive(Debug, thiserror::Error)]
pub enum OvercodeError {
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("session is remote and read-only: {0}")]
    RemoteReadOnly(String),

    #[error("budget exceeded: spent ${spent:.2} of ${budget:.2}")]
    BudgetExceeded { spent: f64, budget: f64 },

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl OvercodeError {
    /// Stable, lowercase machine-readable kind for the Control API's
    /// `{ok: false, error: "<kind>"}` envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            OvercodeError::TransientIo(_) => "transient_io",
            OvercodeError::NotFound(_) => "not_found",
            OvercodeError::Conflict(_) => "conflict",
            OvercodeError::RemoteReadOnly(_) => "remote_read_only",
            OvercodeError::BudgetExceeded { .. } => "budget_exceeded",
            OvercodeError::Malformed(_) => "malformed",
            OvercodeError::Fatal(_) => "fatal",
        }
    }

    /// Whether a caller should map this to a 4xx (caller fault) or
    /// 5xx (server fault) HTTP status in the Control API.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            OvercodeError::NotFound(_)
                | OvercodeError::Conflict(_)
                | OvercodeError::RemoteReadOnly(_)
                | OvercodeError::BudgetExceeded { .. }
                | OvercodeError::Malformed(_)
        )
    }
}

/// JSON envelope shape used by every Control API response.
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub ok: bool,
    pub error: String,
    pub message: String,
}

impl From<&OvercodeError> for ApiError {
    fn from(e: &OvercodeError) -> Self {
        ApiError {
            ok: false,
            error: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}
