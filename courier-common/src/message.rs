//! Immutable MIME payloads
//!
//! A [`Message`] is the raw RFC 5322 byte stream a mail carries. It is cheap
//! to clone (the bytes are shared) and is only parsed on demand, so that a
//! malformed message travels through routing untouched until something
//! actually needs to read its headers.

use std::{fmt::Write as _, sync::Arc};

use mailparse::{MailAddr, MailHeaderMap};

use crate::{address::MailAddress, error::MessageError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message(Arc<[u8]>);

impl Message {
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Start building a simple `text/plain` message
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The header section of the message, without the blank separator line
    ///
    /// A message with no body is all headers.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidUtf8`] if the header section is not UTF-8.
    pub fn header_block(&self) -> Result<&str, MessageError> {
        let end = self
            .0
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .or_else(|| self.0.windows(2).position(|w| w == b"\n\n"))
            .unwrap_or(self.0.len());

        Ok(std::str::from_utf8(&self.0[..end])?)
    }

    /// Parse all headers, in order
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] if the header section is not UTF-8 or
    /// cannot be parsed.
    pub fn headers(&self) -> Result<Vec<(String, String)>, MessageError> {
        let (headers, _) = mailparse::parse_headers(self.header_block()?.as_bytes())?;

        Ok(headers
            .iter()
            .map(|header| (header.get_key(), header.get_value()))
            .collect())
    }

    /// The first value of the named header, if present
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] if the header section cannot be parsed.
    pub fn header(&self, name: &str) -> Result<Option<String>, MessageError> {
        let (headers, _) = mailparse::parse_headers(self.header_block()?.as_bytes())?;

        Ok(headers.get_first_value(name))
    }

    /// # Errors
    ///
    /// Returns a [`MessageError`] if the header section cannot be parsed.
    pub fn subject(&self) -> Result<Option<String>, MessageError> {
        self.header("Subject")
    }

    /// Every mailbox listed in the named address header(s), group members
    /// included, in order of appearance
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] if the headers cannot be parsed or one of
    /// the listed addresses is not a valid mailbox.
    pub fn addresses(&self, name: &'static str) -> Result<Vec<MailAddress>, MessageError> {
        let (headers, _) = mailparse::parse_headers(self.header_block()?.as_bytes())?;

        let mut addresses = Vec::new();
        for header in headers.get_all_headers(name) {
            for addr in mailparse::addrparse_header(header)?.iter() {
                match addr {
                    MailAddr::Single(info) => addresses.push(parse_listed(name, &info.addr)?),
                    MailAddr::Group(group) => {
                        for info in &group.addrs {
                            addresses.push(parse_listed(name, &info.addr)?);
                        }
                    }
                }
            }
        }

        Ok(addresses)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&[u8]> for Message {
    fn from(value: &[u8]) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self(Arc::from(value.as_bytes()))
    }
}

fn parse_listed(header: &'static str, addr: &str) -> Result<MailAddress, MessageError> {
    MailAddress::parse(addr).map_err(|source| MessageError::InvalidAddress { header, source })
}

/// Builder for simple single-part messages
///
/// # Examples
///
/// ```
/// use courier_common::Message;
///
/// let message = Message::builder()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .text("Simple text")
///     .build();
///
/// assert_eq!(message.subject().unwrap().as_deref(), Some("Hello"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    text: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(email.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, email: impl Into<String>) -> Self {
        self.cc.push(email.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a custom header; headers are written in insertion order
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Message {
        let mut raw = String::new();

        if let Some(from) = &self.from {
            let _ = write!(raw, "From: {from}\r\n");
        }
        if !self.to.is_empty() {
            let _ = write!(raw, "To: {}\r\n", self.to.join(", "));
        }
        if !self.cc.is_empty() {
            let _ = write!(raw, "Cc: {}\r\n", self.cc.join(", "));
        }
        if let Some(subject) = &self.subject {
            let _ = write!(raw, "Subject: {subject}\r\n");
        }
        for (name, value) in &self.headers {
            let _ = write!(raw, "{name}: {value}\r\n");
        }

        raw.push_str("MIME-Version: 1.0\r\n");
        raw.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        raw.push_str("Content-Transfer-Encoding: 8bit\r\n");
        raw.push_str("\r\n");
        raw.push_str(self.text.as_deref().unwrap_or_default());

        Message::from(raw.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_header_block_stops_at_blank_line() {
        let message = Message::from("Subject: Test\r\nX-Other: 1\r\n\r\nBody\r\n\r\nMore");
        assert_eq!(message.header_block().unwrap(), "Subject: Test\r\nX-Other: 1");
    }

    #[test]
    fn test_headers_only_message() {
        let message = Message::from("header: value\r\n");
        assert_eq!(
            message.headers().unwrap(),
            vec![("header".to_string(), "value".to_string())]
        );
        assert_eq!(message.subject().unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_headers() {
        let message = Message::from(b"Subject: \xff\xfe\r\n\r\nBody".as_slice());
        assert!(matches!(
            message.subject(),
            Err(MessageError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_builder_round_trips_headers() {
        let message = Message::builder()
            .from("sender@example.com")
            .to("one@example.com")
            .to("two@example.com")
            .cc("three@example.com")
            .subject("Hello")
            .text("Simple text")
            .build();

        assert_eq!(message.subject().unwrap().as_deref(), Some("Hello"));
        assert_eq!(
            message
                .addresses("To")
                .unwrap()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["one@example.com", "two@example.com"]
        );
        assert_eq!(message.addresses("Cc").unwrap().len(), 1);
        assert!(message.addresses("Bcc").unwrap().is_empty());
        assert!(String::from_utf8_lossy(message.as_bytes()).ends_with("\r\n\r\nSimple text"));
    }

    #[test]
    fn test_addresses_expand_groups() {
        let message = Message::from(
            "To: Friends: a@example.com, b@example.com;\r\n\r\n",
        );

        assert_eq!(message.addresses("To").unwrap().len(), 2);
    }

    #[test]
    fn test_addresses_rejects_bad_mailbox() {
        let message = Message::from("From: not-an-address\r\n\r\n");
        assert!(message.addresses("From").is_err());
    }
}
