//! Error types for the advisory pipeline.

use thiserror::Error;

/// Result type alias using [`AdvisorError`].
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Which identifier space a lookup started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpace {
    /// Route catalog massif ids.
    Catalog,
    /// Avalanche-bulletin massif ids.
    Weather,
}

impl std::fmt::Display for IdSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdSpace::Catalog => write!(f, "catalog"),
            IdSpace::Weather => write!(f, "weather"),
        }
    }
}

/// Failure talking to an upstream service.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{service} request timed out")]
    Timeout { service: &'static str },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    #[error("{service} request failed: {reason}")]
    Transport {
        service: &'static str,
        reason: String,
    },
}

impl FetchError {
    /// Classify a transport error raised while talking to `service`.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { service }
        } else if err.is_decode() {
            FetchError::Decode {
                service,
                reason: err.to_string(),
            }
        } else {
            FetchError::Transport {
                service,
                reason: err.to_string(),
            }
        }
    }

    pub fn decode(service: &'static str, reason: impl std::fmt::Display) -> Self {
        FetchError::Decode {
            service,
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// Errors produced by the advisory pipeline.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("no {space}-space mapping for massif id {id}")]
    CrossReferenceGap { id: String, space: IdSpace },

    #[error("topo {route_id} unavailable: {source}")]
    TopoUnavailable {
        route_id: String,
        #[source]
        source: FetchError,
    },

    #[error("summarization failed: {0}")]
    Summarization(String),

    #[error("weather id {weather_id} is mapped from both catalog ids {first} and {second}")]
    DuplicateMapping {
        weather_id: String,
        first: String,
        second: String,
    },

    #[error("malformed cross-reference table: {0}")]
    MalformedCrossReference(#[source] serde_json::Error),

    #[error("failed to load reference data from {path}: {reason}")]
    ReferenceData { path: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl AdvisorError {
    pub fn reference_data(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AdvisorError::ReferenceData {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
