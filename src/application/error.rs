use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::{context::ContextError, repos::RepoError},
    infra::error::InfraError,
};

/// Diagnostic detail attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failure of a read operation as seen by its callers.
///
/// Cloneable so one coalesced fetch can hand the same failure to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error("request canceled")]
    Canceled,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ServiceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Repo(RepoError::Timeout))
    }
}

impl From<ContextError> for ServiceError {
    fn from(error: ContextError) -> Self {
        match error {
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
            ContextError::Canceled => Self::Canceled,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
