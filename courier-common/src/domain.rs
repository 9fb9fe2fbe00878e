//! Domain newtype for type safety
//!
//! Wraps validated, lower-cased domain names so that local-server membership
//! checks compare like with like, and so that email addresses or arbitrary
//! strings cannot be passed where a domain is expected.

use std::{
    fmt::{self, Display},
    net::{Ipv4Addr, Ipv6Addr},
    ops::Deref,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

const MAX_DOMAIN_LENGTH: usize = 255;

/// A validated domain name
///
/// Domains are compared case-insensitively by normalising to lower case at
/// construction. Address literals (`[192.0.2.1]`, `[IPv6:2001:db8::1]`) are
/// accepted because they are valid domains of an RFC 5321 mailbox.
///
/// # Examples
///
/// ```
/// use courier_common::Domain;
///
/// let domain = Domain::parse("Example.COM").unwrap();
/// assert_eq!(domain.as_str(), "example.com");
///
/// assert!(Domain::parse("-bad-.example").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(Arc<str>);

impl Domain {
    /// Parse and normalise a domain name
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if `input` is not a sequence of LDH
    /// sub-domains or an address literal.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();

        if trimmed.len() > MAX_DOMAIN_LENGTH {
            return Err(AddressError::DomainTooLong);
        }

        if trimmed.starts_with('[') {
            validate_address_literal(trimmed)?;
        } else {
            validate_domain(trimmed)?;
        }

        Ok(Self(Arc::from(trimmed.to_ascii_lowercase())))
    }

    /// The domain served when nothing else has been configured
    #[must_use]
    pub fn localhost() -> Self {
        Self(Arc::from("localhost"))
    }

    /// Get the domain as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this domain is an address literal rather than a name
    #[must_use]
    pub fn is_address_literal(&self) -> bool {
        self.0.starts_with('[')
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for Domain {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0.to_string()
    }
}

/// Validate a Domain: sub-domain *("." sub-domain)
fn validate_domain(input: &str) -> Result<(), AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidDomain(
            "Domain cannot start or end with '.'".to_string(),
        ));
    }

    input.split('.').try_for_each(validate_subdomain)
}

/// Validate a sub-domain: Let-dig [Ldh-str]
fn validate_subdomain(input: &str) -> Result<(), AddressError> {
    let (Some(first), Some(last)) = (input.chars().next(), input.chars().last()) else {
        return Err(AddressError::InvalidDomain("Empty subdomain".to_string()));
    };

    if !first.is_ascii_alphanumeric() {
        return Err(AddressError::InvalidDomain(format!(
            "Subdomain must start with letter or digit, got '{first}'"
        )));
    }

    if !last.is_ascii_alphanumeric() {
        return Err(AddressError::InvalidDomain(format!(
            "Subdomain must end with letter or digit, got '{last}'"
        )));
    }

    match input
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '-')
    {
        Some(ch) => Err(AddressError::InvalidDomain(format!(
            "Invalid character '{ch}' in subdomain"
        ))),
        None => Ok(()),
    }
}

/// Validate an address-literal: `[IPv4]`, `[IPv6:...]` or `[tag:...]`
fn validate_address_literal(input: &str) -> Result<(), AddressError> {
    let Some(content) = input
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return Err(AddressError::InvalidAddressLiteral(
            "Address literal must be enclosed in brackets".to_string(),
        ));
    };

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(());
    }

    if let Some(ipv6) = content.strip_prefix("IPv6:")
        && ipv6.parse::<Ipv6Addr>().is_ok()
    {
        return Ok(());
    }

    match content.split_once(':') {
        Some((tag, value)) if !tag.is_empty() && !value.is_empty() => Ok(()),
        _ => Err(AddressError::InvalidAddressLiteral(format!(
            "Invalid address literal format: {content}"
        ))),
    }
}
