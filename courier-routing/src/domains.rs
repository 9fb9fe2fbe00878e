//! The set of domains this server accepts final delivery for

use ahash::AHashSet;
use courier_common::{Domain, tracing::debug};
use parking_lot::RwLock;

use crate::{config::DomainListConfig, error::DomainListError};

/// Registry of locally served domains
pub trait DomainList: Send + Sync {
    /// Returns `true` if mail for `domain` is delivered locally.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainListError`] if the registry cannot be read.
    fn contains_domain(&self, domain: &Domain) -> Result<bool, DomainListError>;

    /// The domain appended to user names that have no domain part.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainListError`] if the registry cannot be read.
    fn default_domain(&self) -> Result<Domain, DomainListError>;
}

#[derive(Debug)]
struct Inner {
    domains: AHashSet<Domain>,
    default_domain: Domain,
}

/// In-memory domain registry
///
/// The default domain is always a member; it is `localhost` until configured
/// otherwise.
#[derive(Debug)]
pub struct MemoryDomainList {
    inner: RwLock<Inner>,
}

impl MemoryDomainList {
    #[must_use]
    pub fn new() -> Self {
        let default_domain = Domain::localhost();

        Self {
            inner: RwLock::new(Inner {
                domains: AHashSet::from_iter([default_domain.clone()]),
                default_domain,
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &DomainListConfig) -> Self {
        let list = Self::new();
        list.configure(config);
        list
    }

    /// Apply `config`, registering the default domain and every listed domain
    ///
    /// Domains registered earlier stay registered.
    pub fn configure(&self, config: &DomainListConfig) {
        let mut inner = self.inner.write();

        if let Some(default_domain) = &config.default_domain {
            inner.default_domain = default_domain.clone();
        }

        let default_domain = inner.default_domain.clone();
        inner.domains.insert(default_domain);
        inner.domains.extend(config.domains.iter().cloned());

        debug!(
            default_domain = %inner.default_domain,
            domains = inner.domains.len(),
            "Configured domain list"
        );
    }

    /// # Errors
    ///
    /// Returns [`DomainListError::AlreadyExists`] if `domain` is registered.
    pub fn add_domain(&self, domain: Domain) -> Result<(), DomainListError> {
        let mut inner = self.inner.write();

        if inner.domains.contains(&domain) {
            return Err(DomainListError::AlreadyExists(domain));
        }

        inner.domains.insert(domain);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomainListError::NotFound`] if `domain` is not registered,
    /// or [`DomainListError::DefaultDomain`] if it is the default domain.
    pub fn remove_domain(&self, domain: &Domain) -> Result<(), DomainListError> {
        let mut inner = self.inner.write();

        if inner.default_domain == *domain {
            return Err(DomainListError::DefaultDomain(domain.clone()));
        }

        if inner.domains.remove(domain) {
            Ok(())
        } else {
            Err(DomainListError::NotFound(domain.clone()))
        }
    }

    /// All registered domains, sorted
    #[must_use]
    pub fn domains(&self) -> Vec<Domain> {
        let mut domains: Vec<_> = self.inner.read().domains.iter().cloned().collect();
        domains.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        domains
    }
}

impl Default for MemoryDomainList {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainList for MemoryDomainList {
    fn contains_domain(&self, domain: &Domain) -> Result<bool, DomainListError> {
        Ok(self.inner.read().domains.contains(domain))
    }

    fn default_domain(&self) -> Result<Domain, DomainListError> {
        Ok(self.inner.read().default_domain.clone())
    }
}
