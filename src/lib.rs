use std::{fmt::Display, ops::Deref, str::FromStr, time::Duration};

use http::StatusCode;
use serde::{Deserialize, Serialize};

pub mod account;
pub mod client;
pub mod newtypes;
pub mod oauth;
pub mod urls;
pub mod vehicle;

#[cfg(test)]
mod testing;

pub use client::{Client, Config, ReqwestTransport, Transport};

/// Dereferences to the body, so `odometer.distance` works directly.
#[derive(Clone, Debug, PartialEq)]
pub struct Response<T> {
    pub body: T,
    pub headers: ResponseHeaders,
}

impl<T> Response<T> {
    pub fn into_body(self) -> T {
        self.body
    }
}

impl<T> Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.body
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseHeaders {
    /// Time at which the vehicle last reported this data (`Sc-Data-Age`).
    #[serde(rename = "sc-data-age")]
    pub data_age: Option<String>,
    #[serde(rename = "sc-request-id")]
    pub request_id: Option<String>,
    /// Unit system the payload is rendered in. Unrecognised values are dropped.
    #[serde(
        rename = "sc-unit-system",
        default,
        deserialize_with = "deserialize_lenient_unit_system"
    )]
    pub unit_system: Option<UnitSystem>,
}

fn deserialize_lenient_unit_system<'de, D>(deserializer: D) -> Result<Option<UnitSystem>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|value| value.parse().ok()))
}

#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

impl Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for UnitSystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "metric" => Ok(Self::Metric),
            "imperial" => Ok(Self::Imperial),
            other => Err(Error::Validation(format!(
                "Unit system must be metric or imperial, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    Validation(String),
    #[error("HTTP error: {0:?}")]
    Http(reqwest::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to build request: {0}")]
    InvalidRequest(http::Error),
    #[error("Failed to encode request body: {0:?}")]
    RequestEncoding(serde_urlencoded::ser::Error),
    #[error("Failed to encode JSON request body: {0:?}")]
    JsonEncoding(serde_json::Error),
    #[error("Failed to decode response body: {0:?}")]
    ResponseDecoding(serde_json::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Api(ApiError),
}

impl Error {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Api(err) => Some(err.kind),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({status}): {name}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: StatusCode,
    /// Machine-readable error name, e.g. `rate_limited`.
    pub name: String,
    pub message: String,
    pub code: Option<String>,
}

impl ApiError {
    pub(crate) fn from_body(status: StatusCode, body: ErrorBody) -> ApiError {
        ApiError {
            kind: ErrorKind::from_status(status),
            status,
            name: body.error,
            message: body.message,
            code: body.code,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Permission,
    ResourceNotFound,
    VehicleStateConflict,
    RateLimited,
    MonthlyLimitExceeded,
    ServerError,
    NotCapable,
    GatewayTimeout,
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: StatusCode) -> ErrorKind {
        match status.as_u16() {
            400 => Self::Validation,
            401 => Self::Authentication,
            403 => Self::Permission,
            404 => Self::ResourceNotFound,
            409 => Self::VehicleStateConflict,
            429 => Self::RateLimited,
            430 => Self::MonthlyLimitExceeded,
            500 => Self::ServerError,
            501 => Self::NotCapable,
            _ => Self::GatewayTimeout,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Permission => "permission",
            Self::ResourceNotFound => "resource_not_found",
            Self::VehicleStateConflict => "vehicle_state",
            Self::RateLimited => "rate_limited",
            Self::MonthlyLimitExceeded => "monthly_limit_exceeded",
            Self::ServerError => "server",
            Self::NotCapable => "not_capable",
            Self::GatewayTimeout => "gateway_timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}
