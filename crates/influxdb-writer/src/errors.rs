// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

/// Rejection reasons returned by [`crate::batch::Batch::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("buffer size exceeded")]
    SizeExceeded,
    #[error("entries limit exceeded")]
    CountExceeded,
}

/// Body of a non-204 response, either the server's `error` field or the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Error(String),
    Raw(String),
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(message) => write!(f, "error: {message}"),
            Self::Raw(body) => write!(f, "body: '{body}'"),
        }
    }
}

/// The server answered, but not with 204 No Content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub status_code: u16,
    pub request_id: Option<String>,
    pub body: ResponseBody,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status_code: {}", self.status_code)?;
        if let Some(request_id) = &self.request_id {
            write!(f, ", request_id: {request_id}")?;
        }
        write!(f, ", {}", self.body)
    }
}

impl std::error::Error for ServerError {}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Connection, protocol or body-read failure before a status could be classified.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl SendError {
    #[must_use]
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        !self.is_server()
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server(e) => Some(e.status_code),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Timeout(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid auth token: {0}")]
    InvalidToken(String),
    #[error("invalid https proxy: {0}")]
    InvalidProxy(String),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
    #[error("send interval must be greater than zero")]
    ZeroSendInterval,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}
