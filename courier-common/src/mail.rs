//! The mail envelope handed between processing stages
//!
//! A [`Mail`] couples a [`Message`] with its SMTP envelope (sender and
//! recipients) and the name of the processing [`State`] that should handle
//! it next.

use std::{
    borrow::Cow,
    fmt::{self, Display},
};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    address::{MailAddress, MaybeSender},
    message::Message,
};

/// The label of the processing stage a mail is waiting for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Cow<'static, str>);

impl State {
    /// Ready for initial processing
    pub const ROOT: Self = Self(Cow::Borrowed("root"));
    pub const ERROR: Self = Self(Cow::Borrowed("error"));
    pub const TRANSPORT: Self = Self(Cow::Borrowed("transport"));
    pub const LOCAL_DELIVERY: Self = Self(Cow::Borrowed("local-delivery"));
    /// Processing is finished and the mail should be dropped
    pub const GHOST: Self = Self(Cow::Borrowed("ghost"));

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl Default for State {
    fn default() -> Self {
        Self::ROOT
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for State {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for State {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A message together with its envelope and processing state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    name: String,
    sender: MaybeSender,
    recipients: Vec<MailAddress>,
    message: Message,
    state: State,
    error_message: Option<String>,
    attributes: AHashMap<String, String>,
}

impl Mail {
    #[must_use]
    pub fn builder() -> MailBuilder {
        MailBuilder::default()
    }

    /// A fresh, unique mail name
    #[must_use]
    pub fn generate_name() -> String {
        format!("Mail{}", ulid::Ulid::new())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn sender(&self) -> &MaybeSender {
        &self.sender
    }

    pub fn set_sender(&mut self, sender: impl Into<MaybeSender>) {
        self.sender = sender.into();
    }

    #[must_use]
    pub fn recipients(&self) -> &[MailAddress] {
        &self.recipients
    }

    pub fn set_recipients(&mut self, recipients: Vec<MailAddress>) {
        self.recipients = recipients;
    }

    #[must_use]
    pub const fn message(&self) -> &Message {
        &self.message
    }

    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    #[must_use]
    pub const fn attributes(&self) -> &AHashMap<String, String> {
        &self.attributes
    }
}

/// Builder for [`Mail`]
///
/// Unset fields take their defaults: a generated name, no sender, no
/// recipients, an empty message and the [`State::ROOT`] state.
#[derive(Debug, Clone, Default)]
pub struct MailBuilder {
    name: Option<String>,
    sender: MaybeSender,
    recipients: Vec<MailAddress>,
    message: Option<Message>,
    state: Option<State>,
    attributes: AHashMap<String, String>,
}

impl MailBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn sender(mut self, sender: impl Into<MaybeSender>) -> Self {
        self.sender = sender.into();
        self
    }

    #[must_use]
    pub fn recipient(mut self, recipient: MailAddress) -> Self {
        self.recipients.push(recipient);
        self
    }

    #[must_use]
    pub fn recipients(mut self, recipients: impl IntoIterator<Item = MailAddress>) -> Self {
        self.recipients.extend(recipients);
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<Message>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: impl Into<State>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Mail {
        Mail {
            name: self.name.unwrap_or_else(Mail::generate_name),
            sender: self.sender,
            recipients: self.recipients,
            message: self.message.unwrap_or_else(|| Message::from(Vec::new())),
            state: self.state.unwrap_or_default(),
            error_message: None,
            attributes: self.attributes,
        }
    }
}
