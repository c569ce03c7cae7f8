//! Error type for `PersistencePort` operations.
//!
//! Grounded directly on the teacher's `RepositoryError` +
//! `ErrorContext` pattern, trimmed of the Diesel/Postgres-specific
//! `From` impls since this crate implements no ORM backend (spec §1,
//! Out of scope) — only the trait boundary.

use std::fmt;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Structured context for persistence errors: what operation, on what
/// entity, was in flight when the error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={op}"));
        }
        if let Some(ref entity) = self.entity {
            parts.push(format!("entity={entity}"));
        }
        if let Some(ref id) = self.entity_id {
            parts.push(format!("id={id}"));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("connection error: {message} {context}")]
    Connection { message: String, context: ErrorContext },

    #[error("query error: {message} {context}")]
    Query { message: String, context: ErrorContext },

    #[error("not found: {message} {context}")]
    NotFound { message: String, context: ErrorContext },

    #[error("validation error: {message} {context}")]
    Validation { message: String, context: ErrorContext },

    #[error("transaction error: {message} {context}")]
    Transaction { message: String, context: ErrorContext },

    #[error("timeout error: {message} {context}")]
    Timeout { message: String, context: ErrorContext },
}

impl PersistenceError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { context, .. }
            | Self::Timeout { context, .. }
            | Self::Query { context, .. }
            | Self::Transaction { context, .. } => context.retryable,
            _ => false,
        }
    }
}
