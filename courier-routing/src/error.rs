//! Typed error handling for routing operations.
//!
//! The collaborators each report their own error type. The routing context
//! sorts them into three groups:
//! - resolution failures from the domain list, users repository and rewrite
//!   table, wrapped into [`ResolutionError`] so a lookup failure is never
//!   mistaken for "not local"
//! - construction failures while building a bounce or an envelope
//! - queue failures, which are handed back untouched

use courier_common::{AddressError, Domain, MailAddress, MessageError};
use thiserror::Error;

use crate::users::Principal;

/// Errors raised by a [`DomainList`](crate::DomainList).
#[derive(Debug, Error)]
pub enum DomainListError {
    /// The backing store could not answer.
    #[error("Domain list lookup failed: {0}")]
    Lookup(String),

    #[error("Domain already registered: {0}")]
    AlreadyExists(Domain),

    #[error("Domain not registered: {0}")]
    NotFound(Domain),

    /// The default domain must stay registered.
    #[error("Cannot remove the default domain: {0}")]
    DefaultDomain(Domain),
}

/// Errors raised by a [`UsersRepository`](crate::UsersRepository).
#[derive(Debug, Error)]
pub enum UsersRepositoryError {
    /// The backing store could not answer.
    #[error("Users repository lookup failed: {0}")]
    Lookup(String),

    #[error("User already exists: {0}")]
    AlreadyExists(Principal),

    #[error("User not found: {0}")]
    NotFound(Principal),

    /// The name does not fit the repository's virtual hosting mode.
    #[error("Invalid username {name}: {reason}")]
    InvalidUsername { name: String, reason: String },
}

/// Errors raised by a [`RecipientRewriteTable`](crate::RecipientRewriteTable).
#[derive(Debug, Error)]
pub enum RewriteTableError {
    /// The backing store could not answer.
    #[error("Rewrite table lookup failed: {0}")]
    Lookup(String),

    /// An error mapping matched the address being resolved.
    #[error("Error mapping for {address}: {message}")]
    ErrorMapping {
        address: MailAddress,
        message: String,
    },

    /// Alias resolution went deeper than the recursion limit, usually a loop.
    #[error("Too many mappings resolving {address} (limit {limit})")]
    TooManyMappings { address: MailAddress, limit: usize },

    #[error("Mapping already exists for {0}")]
    AlreadyExists(String),

    #[error("Mapping not found for {0}")]
    NotFound(String),
}

/// Errors raised by a [`MailQueue`](crate::MailQueue).
#[derive(Debug, Error)]
pub enum QueueError {
    /// A bounded queue has no room left.
    #[error("Queue {name} is full: {capacity} mails")]
    Full { name: String, capacity: usize },

    /// The queue cannot take mail at the moment.
    #[error("Queue {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

/// A lookup against one of the local resolution authorities failed.
///
/// Callers must treat this as "unknown", never as a negative answer. The
/// failing authority is kept as the source.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Local resolution failed: {0}")]
    DomainList(#[from] DomainListError),

    #[error("Local resolution failed: {0}")]
    UsersRepository(#[from] UsersRepositoryError),

    #[error("Local resolution failed: {0}")]
    RewriteTable(#[from] RewriteTableError),
}

impl ResolutionError {
    /// Name of the authority that failed, for logging.
    #[must_use]
    pub const fn authority(&self) -> &'static str {
        match self {
            Self::DomainList(_) => "domain list",
            Self::UsersRepository(_) => "users repository",
            Self::RewriteTable(_) => "rewrite table",
        }
    }
}

/// Errors raised while bouncing a mail back to its sender.
#[derive(Debug, Error)]
pub enum BounceError {
    /// The original message could not be read, so no report was queued.
    #[error("Cannot build bounce for {name}: {source}")]
    Message {
        name: String,
        #[source]
        source: MessageError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors raised when a mail has to be built from a bare message.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Cannot build envelope from message: {0}")]
    Message(#[from] MessageError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors raised while setting up a routing context.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid postmaster address {value}: {source}")]
    InvalidPostmaster {
        value: String,
        #[source]
        source: AddressError,
    },

    #[error("Cannot determine postmaster: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_resolution_error_keeps_cause() {
        let err = ResolutionError::from(DomainListError::Lookup("fail!".to_string()));

        assert_eq!(err.authority(), "domain list");
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Local resolution failed: Domain list lookup failed: fail!"
        );
    }

    #[test]
    fn test_resolution_error_authorities() {
        let users = ResolutionError::from(UsersRepositoryError::Lookup("fail!".to_string()));
        let table = ResolutionError::from(RewriteTableError::Lookup("fail!".to_string()));

        assert_eq!(users.authority(), "users repository");
        assert_eq!(table.authority(), "rewrite table");
    }

    #[test]
    fn test_queue_error_is_transparent_in_bounce() {
        let err = BounceError::from(QueueError::Full {
            name: "spool".to_string(),
            capacity: 1,
        });

        assert_eq!(err.to_string(), "Queue spool is full: 1 mails");
    }
}
