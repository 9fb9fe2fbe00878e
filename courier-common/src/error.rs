//! Error types for the courier-common crate.
//!
//! These cover the two ways a caller-supplied value can be rejected before
//! any routing decision is made: an address that does not follow RFC 5321
//! mailbox syntax, and a message whose headers cannot be read.

use std::str::Utf8Error;

use thiserror::Error;

/// Errors that can occur while parsing a mailbox, reverse-path or domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Empty input
    #[error("Empty address")]
    Empty,

    /// Path exceeds 256 octets
    #[error("Path exceeds 256 octets")]
    PathTooLong,

    /// Local-part exceeds 64 octets
    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,

    /// Domain exceeds 255 octets
    #[error("Domain exceeds 255 octets")]
    DomainTooLong,

    /// Missing closing angle bracket
    #[error("Missing closing angle bracket '>'")]
    MissingCloseBracket,

    /// Missing '@' separator in mailbox
    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),

    #[error("Unclosed quoted string in local-part")]
    UnclosedQuotedString,

    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),

    /// `<>` was supplied where a mailbox is required.
    #[error("The null sender is not a mailbox")]
    NullSender,
}

/// Errors that can occur while reading a message's headers.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The header block is not valid UTF-8.
    #[error("Invalid UTF-8 in headers: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    /// `mailparse` rejected the header block.
    #[error("Malformed headers: {0}")]
    Malformed(#[from] mailparse::MailParseError),

    /// A header required to build an envelope is missing.
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// A header carries an address that is not a valid mailbox.
    #[error("Invalid address in {header} header: {source}")]
    InvalidAddress {
        header: &'static str,
        #[source]
        source: AddressError,
    },
}

impl MessageError {
    /// Returns `true` if the message itself is unreadable, as opposed to
    /// merely lacking the information a caller asked for.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::InvalidUtf8(_) | Self::Malformed(_))
    }
}
