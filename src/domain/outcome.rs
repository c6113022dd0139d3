use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumIter, IntoStaticStr};

/// Why a request never produced a response.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of a single request. Consumed by checks and metrics, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub duration: Duration,
    pub error: Option<TransportError>,
    pub body: Option<String>,
}

impl RequestOutcome {
    pub fn response(status: u16, duration: Duration, body: Option<String>) -> Self {
        Self {
            status: Some(status),
            duration,
            error: None,
            body,
        }
    }

    pub fn transport_error(duration: Duration, error: TransportError) -> Self {
        Self {
            status: None,
            duration,
            error: Some(error),
            body: None,
        }
    }

    /// Failed in the `http_req_failed` sense: no response, or a status
    /// outside 200..=399.
    pub fn is_failed(&self) -> bool {
        !matches!(self.status, Some(code) if (200..400).contains(&code))
    }
}
