/// Error types for the polygon query engine
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The remote stage a request belongs to, used to name failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Catchments,
    Flowlines,
    DownstreamFlowlines,
    BoundedGages,
    DownstreamGages,
    StationStatus,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Catchments => "catchment overlay",
            Stage::Flowlines => "flowline network",
            Stage::DownstreamFlowlines => "downstream flowline trace",
            Stage::BoundedGages => "gage bounds",
            Stage::DownstreamGages => "downstream gage trace",
            Stage::StationStatus => "station status lookup",
        };
        f.write_str(name)
    }
}

/// Main error type for polygon query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Input geometry is unsupported or structurally invalid
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    /// Inbound request fields are out of range
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A remote call failed or returned something that could not be parsed
    #[error("{stage} request failed, quitting polygon query: {reason}")]
    UpstreamUnavailable { stage: Stage, reason: String },

    /// The optional active-status lookup failed
    #[error("active status annotation skipped: {0}")]
    DegradedAnnotation(String),

    /// The HTTP client could not be constructed
    #[cfg(feature = "api")]
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl QueryError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        QueryError::MalformedGeometry(reason.into())
    }

    pub fn upstream(stage: Stage, reason: impl ToString) -> Self {
        QueryError::UpstreamUnavailable {
            stage,
            reason: reason.to_string(),
        }
    }

    /// True when the caller supplied bad input rather than a remote stage failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::MalformedGeometry(_) | QueryError::InvalidRequest(_)
        )
    }

    /// HTTP status the web layer reports for this failure.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}

/// Body returned to the caller when a query fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub detail: String,
}

impl From<&QueryError> for ErrorResponse {
    fn from(error: &QueryError) -> Self {
        ErrorResponse {
            status: error.status_code(),
            detail: error.to_string(),
        }
    }
}

/// Type alias for Results using QueryError
pub type Result<T> = std::result::Result<T, QueryError>;
