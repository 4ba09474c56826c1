//! Error taxonomy for provisioning operations

use std::fmt;

use kubeforge_models::{Cloud, ClusterIdentity, Role};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {kind}: {message}")]
    Validation { kind: &'static str, message: String },

    #[error("cluster {0} already exists")]
    DuplicateRecord(ClusterIdentity),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{role} constraint violated: {message}")]
    ConstraintViolation { role: Role, message: String },

    #[error("timed out waiting for {what} after {attempts} failed attempts: {last_error}")]
    Timeout {
        what: String,
        attempts: u32,
        last_error: String,
    },

    #[error("provider call '{call}' failed: {message}")]
    Provider { call: String, message: String },

    #[error("state storage: {0}")]
    Storage(String),

    #[error(transparent)]
    Fleet(#[from] FleetFailure),

    #[error("{operation} is not supported by the {cloud} provider")]
    Unsupported {
        operation: &'static str,
        cloud: Cloud,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn validation(kind: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn provider(call: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Provider {
            call: call.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(message: impl fmt::Display) -> Self {
        Error::Storage(message.to_string())
    }

    pub fn constraint(role: Role, message: impl Into<String>) -> Self {
        Error::ConstraintViolation {
            role,
            message: message.into(),
        }
    }

    /// The innermost error, looking through any [`Error::Context`] layers
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Error::Context { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.root(), Error::DuplicateRecord(_))
    }

    /// Whether a poller may try the same call again
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Error::Provider { .. })
    }
}

/// Attach operation context (role, resource kind, cluster) to an error
pub trait ErrorContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| Error::Context {
            context: context.into(),
            source: Box::new(source),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Context {
            context: f().into(),
            source: Box::new(source),
        })
    }
}

/// Every task error collected from one parallel fan-out
#[derive(Debug)]
pub struct FleetFailure {
    pub role: Role,
    pub total: usize,
    /// `(index, error)` for each failed task, ordered by index
    pub failures: Vec<(usize, Error)>,
}

impl FleetFailure {
    /// The error surfaced to callers
    pub fn first(&self) -> Option<&Error> {
        self.failures.first().map(|(_, e)| e)
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|(i, _)| *i).collect()
    }
}

impl fmt::Display for FleetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} {} tasks failed",
            self.failures.len(),
            self.total,
            self.role
        )?;
        if let Some((index, err)) = self.failures.first() {
            write!(f, "; first failure at index {}: {}", index, err)?;
        }
        Ok(())
    }
}

impl std::error::Error for FleetFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}
