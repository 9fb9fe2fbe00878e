//! RFC 5321 mailbox addresses
//!
//! A [`MailAddress`] is a validated `local-part@domain` pair. The envelope
//! sender is modelled separately as a [`MaybeSender`], because SMTP allows a
//! null reverse-path (`<>`) that is never itself a delivery target.
//!
//! # ABNF Grammar (RFC 5321 Section 4.1.2)
//!
//! ```text
//! Reverse-path   = Path / "<>"
//! Path           = "<" [ A-d-l ":" ] Mailbox ">"
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *("." Atom)
//! Quoted-string  = DQUOTE *QcontentSMTP DQUOTE
//! ```

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{domain::Domain, error::AddressError};

const MAX_PATH_LENGTH: usize = 256;
const MAX_LOCAL_PART_LENGTH: usize = 64;

/// A parsed mailbox (local-part@domain)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MailAddress {
    local_part: String,
    domain: Domain,
}

impl MailAddress {
    /// Build an address from an already separated local part and domain
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if `local_part` is not a valid dot-string
    /// or quoted-string.
    pub fn new(local_part: impl Into<String>, domain: Domain) -> Result<Self, AddressError> {
        let local_part = local_part.into();
        validate_local_part(&local_part)?;

        Ok(Self { local_part, domain })
    }

    /// Parse a mailbox, either bare (`user@example.com`) or as a path
    /// (`<user@example.com>`, optionally with a deprecated source route)
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if the input is not a valid mailbox. The
    /// null reverse-path `<>` is rejected with [`AddressError::NullSender`].
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        if trimmed.len() > MAX_PATH_LENGTH {
            return Err(AddressError::PathTooLong);
        }

        if trimmed == "<>" {
            return Err(AddressError::NullSender);
        }

        let mailbox = match trimmed.strip_prefix('<') {
            Some(rest) => {
                let content = rest
                    .strip_suffix('>')
                    .ok_or(AddressError::MissingCloseBracket)?;
                find_source_route_colon(content).map_or(content, |colon| &content[colon + 1..])
            }
            None => trimmed,
        };

        let at = find_unquoted_at(mailbox)?;
        let (local_part, domain) = (&mailbox[..at], &mailbox[at + 1..]);

        if local_part.len() > MAX_LOCAL_PART_LENGTH {
            return Err(AddressError::LocalPartTooLong);
        }

        Self::new(local_part, Domain::parse(domain)?)
    }

    /// The part before the `@`
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    #[must_use]
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The same address with a different domain, as produced by a domain
    /// rewrite.
    #[must_use]
    pub fn with_domain(&self, domain: Domain) -> Self {
        Self {
            local_part: self.local_part.clone(),
            domain,
        }
    }
}

impl Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl FromStr for MailAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MailAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MailAddress> for String {
    fn from(address: MailAddress) -> Self {
        address.to_string()
    }
}

/// The envelope sender of a mail
///
/// `NoSender` means the sender was never set, `Null` is the explicit `<>`
/// reverse-path used by delivery reports. Neither can receive a bounce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaybeSender {
    #[default]
    NoSender,
    Null,
    Sender(MailAddress),
}

impl MaybeSender {
    /// Parse a reverse-path (MAIL FROM argument)
    ///
    /// Accepts `<>` as the null sender, and any form [`MailAddress::parse`]
    /// accepts as a real sender.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if the input is neither `<>` nor a mailbox.
    pub fn parse_reverse_path(input: &str) -> Result<Self, AddressError> {
        match MailAddress::parse(input) {
            Ok(address) => Ok(Self::Sender(address)),
            Err(AddressError::NullSender) => Ok(Self::Null),
            Err(err) => Err(err),
        }
    }

    /// Returns `true` if there is an address a report could be sent back to
    #[must_use]
    pub const fn has_sender(&self) -> bool {
        matches!(self, Self::Sender(_))
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_address(&self) -> Option<&MailAddress> {
        match self {
            Self::Sender(address) => Some(address),
            Self::NoSender | Self::Null => None,
        }
    }
}

impl Display for MaybeSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender(address) => Display::fmt(address, f),
            Self::NoSender | Self::Null => f.write_str("<>"),
        }
    }
}

impl From<MailAddress> for MaybeSender {
    fn from(address: MailAddress) -> Self {
        Self::Sender(address)
    }
}

impl From<Option<MailAddress>> for MaybeSender {
    fn from(address: Option<MailAddress>) -> Self {
        address.map_or(Self::NoSender, Self::Sender)
    }
}

/// Find the position of ':' ending a source route (not inside brackets)
fn find_source_route_colon(input: &str) -> Option<usize> {
    let mut in_brackets = false;
    let mut last_colon = None;

    for (i, ch) in input.char_indices() {
        match ch {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            ':' if !in_brackets => last_colon = Some(i),
            _ => {}
        }
    }

    last_colon
}

/// Find the position of '@' that is not inside a quoted string or address literal
fn find_unquoted_at(input: &str) -> Result<usize, AddressError> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut prev_was_backslash = false;

    for (i, ch) in input.char_indices() {
        if ch == '"' && !prev_was_backslash && !in_brackets {
            in_quotes = !in_quotes;
        } else if ch == '[' && !in_quotes {
            in_brackets = true;
        } else if ch == ']' && !in_quotes {
            in_brackets = false;
        } else if ch == '@' && !in_quotes && !in_brackets {
            return Ok(i);
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    Err(AddressError::MissingAtSign)
}

fn validate_local_part(input: &str) -> Result<(), AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty local-part".to_string(),
        ));
    }

    if input.len() > MAX_LOCAL_PART_LENGTH {
        return Err(AddressError::LocalPartTooLong);
    }

    if input.starts_with('"') {
        validate_quoted_string(input)
    } else {
        validate_dot_string(input)
    }
}

/// Validate a Dot-string: Atom *("." Atom)
fn validate_dot_string(input: &str) -> Result<(), AddressError> {
    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot start or end with '.'".to_string(),
        ));
    }

    for atom in input.split('.') {
        if atom.is_empty() {
            return Err(AddressError::InvalidLocalPart(
                "Dot-string cannot contain consecutive dots".to_string(),
            ));
        }

        if let Some(ch) = atom.chars().find(|ch| !is_atext(*ch)) {
            return Err(AddressError::InvalidLocalPart(format!(
                "Invalid character '{ch}' in atom"
            )));
        }
    }

    Ok(())
}

/// Validate a Quoted-string: DQUOTE *`QcontentSMTP` DQUOTE
fn validate_quoted_string(input: &str) -> Result<(), AddressError> {
    let Some(content) = input
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return Err(AddressError::UnclosedQuotedString);
    };

    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if next.is_ascii_graphic() || next == ' ' => {}
                Some(next) => {
                    return Err(AddressError::InvalidQuotedString(format!(
                        "Invalid quoted-pair: \\{next}"
                    )));
                }
                None => {
                    return Err(AddressError::InvalidQuotedString(
                        "Backslash at end of quoted string".to_string(),
                    ));
                }
            }
        } else if !is_qtext_smtp(ch) {
            return Err(AddressError::InvalidQuotedString(format!(
                "Invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(())
}

/// atext = ALPHA / DIGIT / "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" /
///         "-" / "/" / "=" / "?" / "^" / "_" / "\`" / "{" / "|" / "}" / "~"
#[inline]
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// qtextSMTP = %d32-33 / %d35-91 / %d93-126
#[inline]
const fn is_qtext_smtp(ch: char) -> bool {
    matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
}
