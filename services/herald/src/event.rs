//! Service events handed to the dispatch subsystem by the polling scheduler

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a watched service at the time of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub online: bool,
}

/// Details of a failed health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub issue: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ping_ms: Option<f64>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

/// Immutable snapshot of a service state transition
///
/// A success event carries no failure; a failure event carries the
/// failure record describing what went wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub service: Service,
    #[serde(default)]
    pub failure: Option<Failure>,
}

impl ServiceEvent {
    pub fn success(service: Service) -> Self {
        Self {
            service,
            failure: None,
        }
    }

    pub fn failure(service: Service, failure: Failure) -> Self {
        Self {
            service,
            failure: Some(failure),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// The fixed example service used for test sends
    pub fn example() -> Self {
        Self::failure(
            Service {
                id: 6283,
                name: "Example Service".to_string(),
                domain: "https://www.example.com".to_string(),
                port: Some(443),
                latency_ms: Some(412.0),
                online: false,
            },
            Failure::example(),
        )
    }
}

impl Failure {
    pub fn new(issue: impl Into<String>) -> Self {
        Self {
            issue: issue.into(),
            timestamp: Utc::now(),
            ping_ms: None,
            status_code: None,
        }
    }

    /// The fixed failure attached to [`ServiceEvent::example`]
    pub fn example() -> Self {
        Self {
            issue: "HTTP Status Code 500 did not match 200".to_string(),
            timestamp: Utc
                .with_ymd_and_hms(2020, 1, 1, 12, 0, 0)
                .single()
                .unwrap_or_default(),
            ping_ms: Some(412.0),
            status_code: Some(500),
        }
    }
}
