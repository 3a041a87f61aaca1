//! HTTP response envelope.
//!
//! Every HTTP-facing caller answers with the same shape:
//!
//! ```json
//! { "status": "success", "msg": "shops fetched", "data": [ ... ] }
//! ```
//!
//! Cache hits and upstream responses serialize identically. A response
//! built from a last-known-good fallback carries `"stale": true`; the field
//! is omitted otherwise.

use serde::{Deserialize, Serialize};

use crate::cache::Served;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: Status,
    pub msg: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

impl<T> Envelope<T> {
    pub fn success(msg: impl Into<String>, data: T) -> Self {
        Self {
            status: Status::Success,
            msg: msg.into(),
            data: Some(data),
            stale: false,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            msg: msg.into(),
            data: None,
            stale: false,
        }
    }

    /// Wrap a read-through result.
    ///
    /// Errors become a generic client-safe message; internal error text
    /// never reaches the body.
    pub fn from_served(msg: impl Into<String>, result: Result<Served<T>>) -> Self {
        match result {
            Ok(served) => {
                let stale = served.is_stale();
                Self {
                    stale,
                    ..Self::success(msg, served.value)
                }
            }
            Err(e) => Self::error(e.user_message()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
