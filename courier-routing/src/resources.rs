//! Answers "is this ours?" for domains, user names and addresses
//!
//! Every answer comes from the three injected authorities. A failing
//! authority is reported as a [`ResolutionError`], never as a negative
//! answer, so callers can tell "not local" apart from "could not tell".

use std::sync::Arc;

use courier_common::{Domain, MailAddress, tracing::debug};

use crate::{
    domains::DomainList,
    error::ResolutionError,
    rewrite::{MappingKind, RecipientRewriteTable},
    users::{Principal, UsersRepository},
};

/// The authorities consulted for local delivery decisions
#[derive(Clone)]
pub struct LocalResources {
    domains: Arc<dyn DomainList>,
    users: Arc<dyn UsersRepository>,
    rewrite_table: Arc<dyn RecipientRewriteTable>,
}

impl LocalResources {
    #[must_use]
    pub fn new(
        domains: Arc<dyn DomainList>,
        users: Arc<dyn UsersRepository>,
        rewrite_table: Arc<dyn RecipientRewriteTable>,
    ) -> Self {
        Self {
            domains,
            users,
            rewrite_table,
        }
    }

    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if the domain list cannot be read.
    pub fn default_domain(&self) -> Result<Domain, ResolutionError> {
        Ok(self.domains.default_domain()?)
    }

    /// Whether mail for `domain` is delivered locally
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if the domain list cannot be read.
    pub fn is_local_server(&self, domain: &Domain) -> Result<bool, ResolutionError> {
        let local = self.domains.contains_domain(domain)?;
        debug!(%domain, local, "Resolved local server");
        Ok(local)
    }

    /// Whether `user` names a local mailbox
    ///
    /// `user` is either a full address or a bare user name, which is taken to
    /// live in the default domain. Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if any authority cannot be read.
    pub fn is_local_user(&self, user: Option<&str>) -> Result<bool, ResolutionError> {
        let Some(user) = user.filter(|user| !user.is_empty()) else {
            return Ok(false);
        };

        let user = user.to_lowercase();
        let address = if user.contains('@') {
            MailAddress::parse(&user)
        } else {
            MailAddress::new(user.as_str(), self.default_domain()?)
        };

        match address {
            Ok(address) => self.is_local_email(Some(&address)),
            Err(err) => {
                debug!(%user, %err, "Not a valid user name");
                Ok(false)
            }
        }
    }

    /// Whether `address` is a local mailbox: its domain is served here and
    /// it resolves to a known user
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if any authority cannot be read, or the
    /// rewrite table rejects the address.
    pub fn is_local_email(&self, address: Option<&MailAddress>) -> Result<bool, ResolutionError> {
        let Some(address) = address else {
            return Ok(false);
        };

        if !self.is_local_server(address.domain())? {
            return Ok(false);
        }

        let principal = self.principal_for(address)?;
        let local = self.users.contains(&principal)?;

        debug!(%address, %principal, local, "Resolved local email");
        Ok(local)
    }

    /// The subset of `recipients` that are local mailboxes, in order
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first [`ResolutionError`].
    pub fn local_recipients(
        &self,
        recipients: &[MailAddress],
    ) -> Result<Vec<MailAddress>, ResolutionError> {
        let mut local = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            if self.is_local_email(Some(recipient))? {
                local.push(recipient.clone());
            }
        }

        Ok(local)
    }

    /// The principal `address` is stored under, after rewriting
    fn principal_for(&self, address: &MailAddress) -> Result<Principal, ResolutionError> {
        let mappings = self.rewrite_table.resolved_mappings(
            address.local_part(),
            address.domain(),
            &MappingKind::ALL,
        )?;

        let target = mappings.first_address().unwrap_or(address);
        Ok(self.users.principal_for(target)?)
    }
}

impl std::fmt::Debug for LocalResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalResources").finish_non_exhaustive()
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
        rewrite::MemoryRecipientRewriteTable,
        users::MemoryUsersRepository,
    };

    struct Fixture {
        domains: Arc<MemoryDomainList>,
        users: Arc<MemoryUsersRepository>,
        rewrite_table: Arc<MemoryRecipientRewriteTable>,
        resources: LocalResources,
    }

    fn fixture() -> Fixture {
        let domains = Arc::new(MemoryDomainList::from_config(
            &DomainListConfig::with_default_domain(Domain::parse("domain.com").unwrap()),
        ));
        let users = Arc::new(MemoryUsersRepository::with_virtual_hosting());
        let rewrite_table = Arc::new(MemoryRecipientRewriteTable::default());
        let resources = LocalResources::new(domains.clone(), users.clone(), rewrite_table.clone());

        Fixture {
            domains,
            users,
            rewrite_table,
            resources,
        }
    }

    fn address(s: &str) -> MailAddress {
        MailAddress::parse(s).unwrap()
    }

    #[test]
    fn test_bare_user_uses_default_domain() {
        let fixture = fixture();
        fixture.users.add_user("user@domain.com").unwrap();

        assert!(fixture.resources.is_local_user(Some("user")).unwrap());
        assert!(fixture.resources.is_local_user(Some("USER")).unwrap());
        assert!(!fixture.resources.is_local_user(Some("other")).unwrap());
    }

    #[test]
    fn test_empty_and_invalid_users() {
        let fixture = fixture();

        assert!(!fixture.resources.is_local_user(None).unwrap());
        assert!(!fixture.resources.is_local_user(Some("")).unwrap());
        assert!(!fixture.resources.is_local_user(Some("a b@domain.com")).unwrap());
        assert!(!fixture.resources.is_local_user(Some("user@")).unwrap());
    }

    #[test]
    fn test_unknown_domain_is_not_local() {
        let fixture = fixture();
        fixture.users.add_user("user@other.com").unwrap();

        assert!(!fixture.resources.is_local_email(Some(&address("user@other.com"))).unwrap());

        fixture
            .domains
            .add_domain(Domain::parse("other.com").unwrap())
            .unwrap();
        assert!(fixture.resources.is_local_email(Some(&address("user@other.com"))).unwrap());
    }

    #[test]
    fn test_alias_resolves_to_user() {
        let fixture = fixture();
        fixture.users.add_user("user@domain.com").unwrap();
        fixture
            .rewrite_table
            .add_alias(address("alias@domain.com"), address("user@domain.com"))
            .unwrap();

        assert!(fixture.resources.is_local_email(Some(&address("alias@domain.com"))).unwrap());
        assert!(fixture.resources.is_local_user(Some("alias")).unwrap());
    }

    #[test]
    fn test_error_mapping_is_a_failure() {
        let fixture = fixture();
        fixture
            .rewrite_table
            .add_error_mapping(address("gone@domain.com"), "left the company")
            .unwrap();

        let result = fixture.resources.is_local_email(Some(&address("gone@domain.com")));
        assert!(matches!(result, Err(ResolutionError::RewriteTable(_))));
    }

    #[test]
    fn test_local_recipients_keeps_order_and_duplicates() {
        let fixture = fixture();
        fixture.users.add_user("a@domain.com").unwrap();
        fixture.users.add_user("b@domain.com").unwrap();

        let recipients = [
            address("b@domain.com"),
            address("x@remote.com"),
            address("a@domain.com"),
            address("b@domain.com"),
        ];

        assert_eq!(
            fixture.resources.local_recipients(&recipients).unwrap(),
            vec![
                address("b@domain.com"),
                address("a@domain.com"),
                address("b@domain.com"),
            ]
        );
        assert!(fixture.resources.local_recipients(&[]).unwrap().is_empty());
    }
}
