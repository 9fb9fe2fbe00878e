//! Spying and failing collaborators for routing context tests
//!
//! Each authority wraps its in-memory implementation, counts the calls made
//! to it, and can be switched into a failing mode. The queue records every
//! call instead of storing mail.
#![allow(dead_code)] // Test utility module - not all helpers used in every test
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use courier_common::{Domain, Mail, MailAddress};
use courier_routing::{
    ContextConfig, DomainList, DomainListConfig, DomainListError, LocalResources, MailQueue,
    MailQueueFactory, MappingKind, Mappings, MemoryDomainList, MemoryRecipientRewriteTable,
    MemoryUsersRepository, Principal, QueueError, RecipientRewriteTable, RewriteTableError,
    RoutingContext, TimeUnit, UsersRepository, UsersRepositoryError,
};
use parking_lot::Mutex;

pub const DOMAIN: &str = "domain.com";
pub const USER: &str = "user";

#[must_use]
pub fn domain(s: &str) -> Domain {
    Domain::parse(s).unwrap()
}

#[must_use]
pub fn address(s: &str) -> MailAddress {
    MailAddress::parse(s).unwrap()
}

#[must_use]
pub fn user_address() -> MailAddress {
    address(&format!("{USER}@{DOMAIN}"))
}

/// Call counter plus failure switch shared by the spies
#[derive(Debug, Default)]
pub struct Switch {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl Switch {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Record a call, returning `true` if it should fail
    fn hit(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fail.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct SpyDomainList {
    pub inner: MemoryDomainList,
    pub switch: Switch,
}

impl DomainList for SpyDomainList {
    fn contains_domain(&self, domain: &Domain) -> Result<bool, DomainListError> {
        if self.switch.hit() {
            return Err(DomainListError::Lookup("domain list is down".to_string()));
        }
        self.inner.contains_domain(domain)
    }

    fn default_domain(&self) -> Result<Domain, DomainListError> {
        if self.switch.hit() {
            return Err(DomainListError::Lookup("domain list is down".to_string()));
        }
        self.inner.default_domain()
    }
}

#[derive(Debug, Default)]
pub struct SpyUsersRepository {
    pub inner: MemoryUsersRepository,
    pub switch: Switch,
}

impl UsersRepository for SpyUsersRepository {
    fn contains(&self, principal: &Principal) -> Result<bool, UsersRepositoryError> {
        if self.switch.hit() {
            return Err(UsersRepositoryError::Lookup("users repository is down".to_string()));
        }
        self.inner.contains(principal)
    }

    fn principal_for(&self, address: &MailAddress) -> Result<Principal, UsersRepositoryError> {
        if self.switch.hit() {
            return Err(UsersRepositoryError::Lookup("users repository is down".to_string()));
        }
        self.inner.principal_for(address)
    }
}

#[derive(Debug, Default)]
pub struct SpyRewriteTable {
    pub inner: MemoryRecipientRewriteTable,
    pub switch: Switch,
}

impl RecipientRewriteTable for SpyRewriteTable {
    fn resolved_mappings(
        &self,
        local_part: &str,
        domain: &Domain,
        kinds: &[MappingKind],
    ) -> Result<Mappings, RewriteTableError> {
        if self.switch.hit() {
            return Err(RewriteTableError::Lookup("rewrite table is down".to_string()));
        }
        self.inner.resolved_mappings(local_part, domain, kinds)
    }
}

/// A call the routing context made on the queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueCall {
    Enqueue(Mail),
    EnqueueDelayed(Mail, u64, TimeUnit),
}

impl QueueCall {
    #[must_use]
    pub const fn mail(&self) -> &Mail {
        match self {
            Self::Enqueue(mail) | Self::EnqueueDelayed(mail, _, _) => mail,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingQueue {
    calls: Mutex<Vec<QueueCall>>,
    pub switch: Switch,
}

impl RecordingQueue {
    #[must_use]
    pub fn calls(&self) -> Vec<QueueCall> {
        self.calls.lock().clone()
    }

    /// The only call made, failing the test if there were none or several
    #[must_use]
    pub fn single_call(&self) -> QueueCall {
        let calls = self.calls();
        assert_eq!(calls.len(), 1, "expected exactly one queue call: {calls:?}");
        calls[0].clone()
    }

    fn record(&self, call: QueueCall) -> Result<(), QueueError> {
        if self.switch.hit() {
            return Err(QueueError::Unavailable {
                name: "spool".to_string(),
                reason: "queue is down".to_string(),
            });
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl MailQueue for RecordingQueue {
    fn name(&self) -> &str {
        "spool"
    }

    fn enqueue(&self, mail: Mail) -> Result<(), QueueError> {
        self.record(QueueCall::Enqueue(mail))
    }

    fn enqueue_delayed(&self, mail: Mail, amount: u64, unit: TimeUnit) -> Result<(), QueueError> {
        self.record(QueueCall::EnqueueDelayed(mail, amount, unit))
    }
}

/// Hands out the same recording queue for every name, remembering the names
#[derive(Debug, Default)]
pub struct RecordingQueueFactory {
    pub queue: Arc<RecordingQueue>,
    pub requested: Mutex<Vec<String>>,
}

impl MailQueueFactory for RecordingQueueFactory {
    fn create_queue(&self, name: &str) -> Arc<dyn MailQueue> {
        self.requested.lock().push(name.to_string());
        self.queue.clone()
    }
}

/// A routing context over spying collaborators
///
/// Serves `domain.com` as the default domain, with virtual hosting.
pub struct Harness {
    pub domains: Arc<SpyDomainList>,
    pub users: Arc<SpyUsersRepository>,
    pub rewrite_table: Arc<SpyRewriteTable>,
    pub queues: RecordingQueueFactory,
    pub context: RoutingContext,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ContextConfig) -> Self {
        let domains = Arc::new(SpyDomainList::default());
        domains
            .inner
            .configure(&DomainListConfig::with_default_domain(domain(DOMAIN)));

        let users = Arc::new(SpyUsersRepository::default());
        let rewrite_table = Arc::new(SpyRewriteTable::default());
        let queues = RecordingQueueFactory::default();

        let resources = LocalResources::new(domains.clone(), users.clone(), rewrite_table.clone());
        let context = RoutingContext::new(resources, &queues, config).unwrap();

        Self {
            domains,
            users,
            rewrite_table,
            queues,
            context,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &RecordingQueue {
        &self.queues.queue
    }

    /// Total calls made to the three authorities
    #[must_use]
    pub fn authority_calls(&self) -> usize {
        self.domains.switch.calls() + self.users.switch.calls() + self.rewrite_table.switch.calls()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
