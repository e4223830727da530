//! Error taxonomy shared by every service and gateway.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Bad input, rejected before any side effect.
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not enough money: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    #[error("not enough items of '{item}' in inventory: {available} available")]
    InsufficientStock { item: String, available: i64 },

    #[error("no available couriers")]
    NoCourierAvailable,

    /// A downstream service answered with an error we cannot classify.
    #[error("remote service error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// The downstream service could not be reached or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Body of every error response, also decoded by the HTTP gateways.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<i64>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            balance: None,
            requested: None,
            item: None,
            available: None,
        }
    }
}

impl CheckoutError {
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "invalid_argument",
            CheckoutError::Unauthorized(_) => "unauthorized",
            CheckoutError::NotFound(_) => "not_found",
            CheckoutError::AlreadyExists(_) => "already_exists",
            CheckoutError::InsufficientFunds { .. } => "insufficient_funds",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::NoCourierAvailable => "no_courier_available",
            CheckoutError::Remote { .. } => "remote_error",
            CheckoutError::Transport(_) => "transport_error",
            CheckoutError::Storage(_) => "storage_error",
            CheckoutError::Broker(_) => "broker_error",
            CheckoutError::Serialization(_) => "serialization_error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            CheckoutError::Validation(_) => 400,
            CheckoutError::Unauthorized(_) => 401,
            CheckoutError::InsufficientFunds { .. } => 402,
            CheckoutError::NotFound(_) => 404,
            CheckoutError::AlreadyExists(_)
            | CheckoutError::InsufficientStock { .. }
            | CheckoutError::NoCourierAvailable => 409,
            CheckoutError::Remote { .. } => 502,
            CheckoutError::Transport(_) => 503,
            CheckoutError::Storage(_)
            | CheckoutError::Broker(_)
            | CheckoutError::Serialization(_) => 500,
        }
    }

    /// Client-caused failures map to 4xx, infrastructure failures to 5xx.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    pub fn to_body(&self) -> ErrorBody {
        let mut body = ErrorBody::new(self.to_string(), self.code());
        match self {
            CheckoutError::InsufficientFunds { balance, requested } => {
                body.balance = Some(*balance);
                body.requested = Some(*requested);
            }
            CheckoutError::InsufficientStock { item, available } => {
                body.item = Some(item.clone());
                body.available = Some(*available);
            }
            _ => {}
        }
        body
    }

    /// Rebuilds a typed error from a downstream error response.
    pub fn from_remote(status: u16, body: ErrorBody) -> Self {
        match body.code.as_str() {
            "invalid_argument" => CheckoutError::Validation(body.error),
            "not_found" => CheckoutError::NotFound(body.error),
            "already_exists" => CheckoutError::AlreadyExists(body.error),
            "insufficient_funds" => CheckoutError::InsufficientFunds {
                balance: body.balance.unwrap_or_default(),
                requested: body.requested.unwrap_or_default(),
            },
            "insufficient_stock" => CheckoutError::InsufficientStock {
                item: body.item.unwrap_or_default(),
                available: body.available.unwrap_or_default(),
            },
            "no_courier_available" => CheckoutError::NoCourierAvailable,
            _ if status == 404 => CheckoutError::NotFound(body.error),
            _ => CheckoutError::Remote {
                status,
                message: body.error,
            },
        }
    }
}

impl From<diesel::result::Error> for CheckoutError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => CheckoutError::NotFound("record not found".to_string()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                CheckoutError::AlreadyExists(info.message().to_string())
            }
            other => CheckoutError::Storage(other.to_string()),
        }
    }
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for CheckoutError {
    fn from(err: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        CheckoutError::Storage(format!("connection pool: {err}"))
    }
}

impl From<rdkafka::error::KafkaError> for CheckoutError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        CheckoutError::Broker(err.to_string())
    }
}

impl From<reqwest::Error> for CheckoutError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CheckoutError::Remote {
                status: err.status().map(|s| s.as_u16()).unwrap_or(502),
                message: format!("undecodable response: {err}"),
            }
        } else {
            CheckoutError::Transport(err.to_string())
        }
    }
}
