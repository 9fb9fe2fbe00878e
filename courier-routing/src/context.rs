//! The routing context handed to mail processors
//!
//! It answers local delivery questions through [`LocalResources`], builds
//! bounces, and dispatches mail into the spool queue. All dispatch goes
//! through [`RoutingContext::enqueue`].

use std::sync::Arc;

use courier_common::{
    Domain, Mail, MailAddress, MaybeSender, Message, MessageError, State,
    tracing::{debug, info, warn},
};

use crate::{
    bounce::build_bounce,
    config::ContextConfig,
    error::{BounceError, ConfigError, QueueError, ResolutionError, SendError},
    queue::{Delay, MailQueue, MailQueueFactory, TimeUnit},
    resources::LocalResources,
};

/// Attribute set on every mail dispatched by the context
pub const SENT_BY_CONTEXT_ATTRIBUTE: &str = "sent-by-context";

/// A mail on its way into the spool
///
/// Without a state override the mail keeps its own state; without a delay it
/// is queued for immediate processing.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub mail: Mail,
    pub state: Option<State>,
    pub delay: Option<Delay>,
}

impl EnqueueRequest {
    #[must_use]
    pub const fn new(mail: Mail) -> Self {
        Self {
            mail,
            state: None,
            delay: None,
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<State>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.delay = Some(Delay::new(amount, unit));
        self
    }
}

impl From<Mail> for EnqueueRequest {
    fn from(mail: Mail) -> Self {
        Self::new(mail)
    }
}

pub struct RoutingContext {
    resources: LocalResources,
    spool: Arc<dyn MailQueue>,
    postmaster: MailAddress,
    config: ContextConfig,
}

impl RoutingContext {
    /// Build a context dispatching into the configured spool queue
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the spool queue name is empty, the
    /// configured postmaster is not a valid address, or the default domain
    /// cannot be read to derive one.
    pub fn new(
        resources: LocalResources,
        queues: &dyn MailQueueFactory,
        config: ContextConfig,
    ) -> Result<Self, ConfigError> {
        if config.spool_queue.trim().is_empty() {
            return Err(ConfigError::InvalidConfiguration {
                field: "spool_queue",
                reason: "queue name is empty".to_string(),
            });
        }

        let postmaster = match &config.postmaster {
            Some(value) => {
                MailAddress::parse(value).map_err(|source| ConfigError::InvalidPostmaster {
                    value: value.clone(),
                    source,
                })?
            }
            None => {
                let domain = resources.default_domain()?;
                MailAddress::new("postmaster", domain.clone()).map_err(|source| {
                    ConfigError::InvalidPostmaster {
                        value: format!("postmaster@{domain}"),
                        source,
                    }
                })?
            }
        };

        match resources.is_local_server(postmaster.domain()) {
            Ok(true) => {}
            Ok(false) => warn!(
                %postmaster,
                "The postmaster domain is not a local domain, bounces may loop"
            ),
            Err(err) => warn!(
                %postmaster,
                error = %err,
                "Could not check whether the postmaster domain is local"
            ),
        }

        let spool = queues.create_queue(&config.spool_queue);

        info!(
            %postmaster,
            spool = %config.spool_queue,
            "Routing context ready"
        );

        Ok(Self {
            resources,
            spool,
            postmaster,
            config,
        })
    }

    /// The address bounces come from
    #[must_use]
    pub const fn postmaster(&self) -> &MailAddress {
        &self.postmaster
    }

    #[must_use]
    pub fn server_info() -> String {
        format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    #[must_use]
    pub const fn resources(&self) -> &LocalResources {
        &self.resources
    }

    #[must_use]
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// See [`LocalResources::is_local_server`]
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if the domain list cannot be read.
    pub fn is_local_server(&self, domain: &Domain) -> Result<bool, ResolutionError> {
        self.resources.is_local_server(domain)
    }

    /// See [`LocalResources::is_local_user`]
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if any authority cannot be read.
    pub fn is_local_user(&self, user: Option<&str>) -> Result<bool, ResolutionError> {
        self.resources.is_local_user(user)
    }

    /// See [`LocalResources::is_local_email`]
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if any authority cannot be read.
    pub fn is_local_email(&self, address: Option<&MailAddress>) -> Result<bool, ResolutionError> {
        self.resources.is_local_email(address)
    }

    /// See [`LocalResources::local_recipients`]
    ///
    /// # Errors
    ///
    /// Returns the first [`ResolutionError`] encountered.
    pub fn local_recipients(
        &self,
        recipients: &[MailAddress],
    ) -> Result<Vec<MailAddress>, ResolutionError> {
        self.resources.local_recipients(recipients)
    }

    /// Send a delivery report for `mail` back to its sender, from the
    /// postmaster
    ///
    /// # Errors
    ///
    /// See [`RoutingContext::bounce_as`].
    pub fn bounce(&self, mail: &Mail, explanation: &str) -> Result<(), BounceError> {
        self.bounce_as(mail, explanation, None)
    }

    /// Send a delivery report for `mail` back to its sender, from `bouncer`
    ///
    /// Mail without a sender, or with the null sender, is never bounced.
    ///
    /// # Errors
    ///
    /// Returns [`BounceError::Message`] if the original message cannot be
    /// read, or [`BounceError::Queue`] if the report cannot be queued.
    #[tracing::instrument(skip_all, fields(mail = %mail.name()))]
    pub fn bounce_as(
        &self,
        mail: &Mail,
        explanation: &str,
        bouncer: Option<&MailAddress>,
    ) -> Result<(), BounceError> {
        let sender = match mail.sender() {
            MaybeSender::Sender(sender) => sender,
            MaybeSender::Null | MaybeSender::NoSender => {
                info!(sender = %mail.sender(), "Mail has no sender, not bouncing");
                return Ok(());
            }
        };

        let bouncer = bouncer.unwrap_or(&self.postmaster);
        let report = build_bounce(mail, sender, explanation, bouncer, &self.config.reporting_mta)?;

        self.enqueue(EnqueueRequest::new(report))
            .map_err(BounceError::Queue)
    }

    /// Dispatch `request` into the spool
    ///
    /// This is the single path every `send_*` operation and [`bounce`]
    /// takes. The queue sees exactly one `enqueue` or `enqueue_delayed` call.
    ///
    /// # Errors
    ///
    /// Returns the queue's [`QueueError`] unchanged.
    ///
    /// [`bounce`]: RoutingContext::bounce
    #[tracing::instrument(skip_all, fields(mail = %request.mail.name()))]
    pub fn enqueue(&self, request: EnqueueRequest) -> Result<(), QueueError> {
        let EnqueueRequest {
            mut mail,
            state,
            delay,
        } = request;

        if let Some(state) = state {
            mail.set_state(state);
        }
        mail.set_attribute(SENT_BY_CONTEXT_ATTRIBUTE, "true");

        debug!(
            state = %mail.state(),
            recipients = mail.recipients().len(),
            ?delay,
            queue = %self.spool.name(),
            "Enqueueing mail"
        );

        match delay {
            Some(Delay { amount, unit }) => self.spool.enqueue_delayed(mail, amount, unit),
            None => self.spool.enqueue(mail),
        }
    }

    /// Queue `mail` for immediate processing in its current state
    ///
    /// # Errors
    ///
    /// Returns the queue's [`QueueError`] unchanged.
    pub fn send_mail(&self, mail: Mail) -> Result<(), QueueError> {
        self.enqueue(EnqueueRequest::new(mail))
    }

    /// # Errors
    ///
    /// Returns the queue's [`QueueError`] unchanged.
    pub fn send_mail_with_state(
        &self,
        mail: Mail,
        state: impl Into<State>,
    ) -> Result<(), QueueError> {
        self.enqueue(EnqueueRequest::new(mail).with_state(state))
    }

    /// Queue `mail` in its current state, after `amount` of `unit`
    ///
    /// # Errors
    ///
    /// Returns the queue's [`QueueError`] unchanged.
    pub fn send_mail_delayed(
        &self,
        mail: Mail,
        amount: u64,
        unit: TimeUnit,
    ) -> Result<(), QueueError> {
        self.enqueue(EnqueueRequest::new(mail).with_delay(amount, unit))
    }

    /// # Errors
    ///
    /// Returns the queue's [`QueueError`] unchanged.
    pub fn send_mail_with_state_delayed(
        &self,
        mail: Mail,
        state: impl Into<State>,
        amount: u64,
        unit: TimeUnit,
    ) -> Result<(), QueueError> {
        self.enqueue(
            EnqueueRequest::new(mail)
                .with_state(state)
                .with_delay(amount, unit),
        )
    }

    /// Queue a bare message, taking the envelope from its headers
    ///
    /// The sender is the first `From` mailbox; recipients are every `To`,
    /// `Cc` and `Bcc` mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Message`] if the headers cannot be read, there is
    /// no `From` mailbox, or a listed address is invalid. Queue failures are
    /// returned as [`SendError::Queue`].
    pub fn send_message(&self, message: Message) -> Result<(), SendError> {
        let sender = message
            .addresses("From")?
            .into_iter()
            .next()
            .ok_or(MessageError::MissingHeader("From"))?;

        let mut recipients = message.addresses("To")?;
        recipients.extend(message.addresses("Cc")?);
        recipients.extend(message.addresses("Bcc")?);

        self.send_message_to_with_state(sender, recipients, message, State::ROOT)
    }

    /// Queue `message` for `recipients`, from `sender`, in the root state
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Queue`] if the queue rejects the mail.
    pub fn send_message_to(
        &self,
        sender: impl Into<MaybeSender>,
        recipients: Vec<MailAddress>,
        message: Message,
    ) -> Result<(), SendError> {
        self.send_message_to_with_state(sender, recipients, message, State::ROOT)
    }

    /// # Errors
    ///
    /// Returns [`SendError::Queue`] if the queue rejects the mail.
    pub fn send_message_to_with_state(
        &self,
        sender: impl Into<MaybeSender>,
        recipients: Vec<MailAddress>,
        message: Message,
        state: impl Into<State>,
    ) -> Result<(), SendError> {
        let mail = Mail::builder()
            .name(Mail::generate_name())
            .sender(sender)
            .recipients(recipients)
            .message(message)
            .build();

        self.enqueue(EnqueueRequest::new(mail).with_state(state))
            .map_err(SendError::Queue)
    }
}

impl std::fmt::Debug for RoutingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingContext")
            .field("postmaster", &self.postmaster)
            .field("spool", &self.spool.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::DomainListConfig,
        domains::MemoryDomainList,
        queue::MemoryMailQueueFactory,
        rewrite::MemoryRecipientRewriteTable,
        users::MemoryUsersRepository,
    };

    fn resources() -> LocalResources {
        LocalResources::new(
            Arc::new(MemoryDomainList::from_config(
                &DomainListConfig::with_default_domain(Domain::parse("domain.com").unwrap()),
            )),
            Arc::new(MemoryUsersRepository::default()),
            Arc::new(MemoryRecipientRewriteTable::default()),
        )
    }

    #[test]
    fn test_default_postmaster() {
        let queues = MemoryMailQueueFactory::default();
        let context = RoutingContext::new(resources(), &queues, ContextConfig::default()).unwrap();

        assert_eq!(context.postmaster().to_string(), "postmaster@domain.com");
    }

    #[test]
    fn test_configured_postmaster() {
        let queues = MemoryMailQueueFactory::default();
        let config = ContextConfig {
            postmaster: Some("admin@remote.com".to_string()),
            ..ContextConfig::default()
        };
        let context = RoutingContext::new(resources(), &queues, config).unwrap();

        assert_eq!(context.postmaster().to_string(), "admin@remote.com");
    }

    #[test]
    fn test_invalid_configuration() {
        let queues = MemoryMailQueueFactory::default();

        let config = ContextConfig {
            postmaster: Some("not an address".to_string()),
            ..ContextConfig::default()
        };
        assert!(matches!(
            RoutingContext::new(resources(), &queues, config),
            Err(ConfigError::InvalidPostmaster { .. })
        ));

        let config = ContextConfig {
            spool_queue: String::new(),
            ..ContextConfig::default()
        };
        assert!(matches!(
            RoutingContext::new(resources(), &queues, config),
            Err(ConfigError::InvalidConfiguration { field: "spool_queue", .. })
        ));
    }

    #[test]
    fn test_enqueue_marks_mail() {
        let queues = MemoryMailQueueFactory::default();
        let context = RoutingContext::new(resources(), &queues, ContextConfig::default()).unwrap();

        context
            .send_mail(Mail::builder().name("mail").state("custom").build())
            .unwrap();

        let mail = queues.queue("spool").dequeue().unwrap();
        assert_eq!(mail.attribute(SENT_BY_CONTEXT_ATTRIBUTE), Some("true"));
        assert_eq!(mail.state().as_str(), "custom");
    }

    #[test]
    fn test_server_info() {
        assert!(RoutingContext::server_info().starts_with("courier-routing/"));
    }
}
