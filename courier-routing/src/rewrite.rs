//! Recipient rewriting: aliases, address forwards and domain rewrites
//!
//! A mapping source is either a single address or a whole domain. Resolving
//! an address follows its mappings recursively, so `alias@d -> user@d ->
//! user@e` resolves to `user@e`, until a mapping points back at the address
//! itself or the recursion limit is reached.

use std::fmt::{self, Display};

use ahash::AHashMap;
use courier_common::{Domain, MailAddress, tracing::trace};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{config::RewriteTableConfig, error::RewriteTableError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingKind {
    Address,
    Alias,
    Domain,
    Error,
}

impl MappingKind {
    pub const ALL: [Self; 4] = [Self::Address, Self::Alias, Self::Domain, Self::Error];
}

/// A single rewrite rule target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mapping {
    /// Deliver to another address instead
    Address(MailAddress),
    /// Another name for an existing user
    Alias(MailAddress),
    /// Keep the local part, swap the domain
    Domain(Domain),
    /// Reject with a message
    Error(String),
}

impl Mapping {
    #[must_use]
    pub const fn kind(&self) -> MappingKind {
        match self {
            Self::Address(_) => MappingKind::Address,
            Self::Alias(_) => MappingKind::Alias,
            Self::Domain(_) => MappingKind::Domain,
            Self::Error(_) => MappingKind::Error,
        }
    }

    /// The address this mapping resolves `source` to, if it names one
    fn target(&self, source: &MailAddress) -> Option<MailAddress> {
        match self {
            Self::Address(target) | Self::Alias(target) => Some(target.clone()),
            Self::Domain(domain) => Some(source.with_domain(domain.clone())),
            Self::Error(_) => None,
        }
    }
}

/// What a mapping applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingSource {
    Address(MailAddress),
    Domain(Domain),
}

impl MappingSource {
    /// The key a source is stored and looked up under
    ///
    /// Local parts match case-insensitively, like user names do.
    fn normalized(&self) -> Self {
        match self {
            Self::Address(address) => Self::Address(lowercase_local_part(address)),
            Self::Domain(domain) => Self::Domain(domain.clone()),
        }
    }
}

fn lowercase_local_part(address: &MailAddress) -> MailAddress {
    MailAddress::new(address.local_part().to_lowercase(), address.domain().clone())
        .unwrap_or_else(|_| address.clone())
}

impl Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => Display::fmt(address, f),
            Self::Domain(domain) => write!(f, "*@{domain}"),
        }
    }
}

/// The fully resolved mappings of an address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mappings(Vec<Mapping>);

impl Mappings {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.0.iter()
    }

    /// The first address the mappings resolve to
    #[must_use]
    pub fn first_address(&self) -> Option<&MailAddress> {
        self.0.iter().find_map(|mapping| match mapping {
            Mapping::Address(address) | Mapping::Alias(address) => Some(address),
            Mapping::Domain(_) | Mapping::Error(_) => None,
        })
    }
}

impl FromIterator<Mapping> for Mappings {
    fn from_iter<T: IntoIterator<Item = Mapping>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Address rewriting consulted before user lookups
pub trait RecipientRewriteTable: Send + Sync {
    /// The final mappings for `local_part@domain`, considering only `kinds`
    ///
    /// Empty when no rule applies.
    ///
    /// # Errors
    ///
    /// Returns a [`RewriteTableError`] if the table cannot be read, an error
    /// mapping applies, or resolution exceeds the recursion limit.
    fn resolved_mappings(
        &self,
        local_part: &str,
        domain: &Domain,
        kinds: &[MappingKind],
    ) -> Result<Mappings, RewriteTableError>;
}

/// In-memory rewrite table
#[derive(Debug)]
pub struct MemoryRecipientRewriteTable {
    recursion_limit: usize,
    mappings: RwLock<AHashMap<MappingSource, Vec<Mapping>>>,
}

impl MemoryRecipientRewriteTable {
    #[must_use]
    pub fn new(config: &RewriteTableConfig) -> Self {
        Self {
            recursion_limit: config.recursion_limit,
            mappings: RwLock::default(),
        }
    }

    /// # Errors
    ///
    /// Returns [`RewriteTableError::AlreadyExists`] if the exact mapping is
    /// already present for `source`.
    pub fn add_mapping(
        &self,
        source: MappingSource,
        mapping: Mapping,
    ) -> Result<(), RewriteTableError> {
        let mut mappings = self.mappings.write();
        let entry = mappings.entry(source.normalized()).or_default();

        if entry.contains(&mapping) {
            return Err(RewriteTableError::AlreadyExists(source.to_string()));
        }

        entry.push(mapping);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RewriteTableError::NotFound`] if `mapping` is not present.
    pub fn remove_mapping(
        &self,
        source: &MappingSource,
        mapping: &Mapping,
    ) -> Result<(), RewriteTableError> {
        let mut mappings = self.mappings.write();
        let not_found = || RewriteTableError::NotFound(source.to_string());
        let key = source.normalized();

        let entry = mappings.get_mut(&key).ok_or_else(not_found)?;
        let position = entry
            .iter()
            .position(|existing| existing == mapping)
            .ok_or_else(not_found)?;

        entry.remove(position);
        if entry.is_empty() {
            mappings.remove(&key);
        }

        Ok(())
    }

    /// # Errors
    ///
    /// See [`MemoryRecipientRewriteTable::add_mapping`].
    pub fn add_alias(
        &self,
        alias: MailAddress,
        user: MailAddress,
    ) -> Result<(), RewriteTableError> {
        self.add_mapping(MappingSource::Address(alias), Mapping::Alias(user))
    }

    /// # Errors
    ///
    /// See [`MemoryRecipientRewriteTable::add_mapping`].
    pub fn add_address_mapping(
        &self,
        source: MailAddress,
        target: MailAddress,
    ) -> Result<(), RewriteTableError> {
        self.add_mapping(MappingSource::Address(source), Mapping::Address(target))
    }

    /// # Errors
    ///
    /// See [`MemoryRecipientRewriteTable::add_mapping`].
    pub fn add_domain_mapping(
        &self,
        source: Domain,
        target: Domain,
    ) -> Result<(), RewriteTableError> {
        self.add_mapping(MappingSource::Domain(source), Mapping::Domain(target))
    }

    /// # Errors
    ///
    /// See [`MemoryRecipientRewriteTable::add_mapping`].
    pub fn add_error_mapping(
        &self,
        source: MailAddress,
        message: impl Into<String>,
    ) -> Result<(), RewriteTableError> {
        self.add_mapping(MappingSource::Address(source), Mapping::Error(message.into()))
    }

    /// Raw mappings for `address`: its own rules, or else its domain's
    fn stored_mappings(&self, address: &MailAddress) -> Vec<Mapping> {
        let mappings = self.mappings.read();

        mappings
            .get(&MappingSource::Address(lowercase_local_part(address)))
            .or_else(|| mappings.get(&MappingSource::Domain(address.domain().clone())))
            .cloned()
            .unwrap_or_default()
    }

    fn resolve(
        &self,
        address: &MailAddress,
        kinds: &[MappingKind],
        depth: usize,
    ) -> Result<Vec<Mapping>, RewriteTableError> {
        if depth > self.recursion_limit {
            return Err(RewriteTableError::TooManyMappings {
                address: address.clone(),
                limit: self.recursion_limit,
            });
        }

        let mut resolved = Vec::new();

        for mapping in self.stored_mappings(address) {
            if !kinds.contains(&mapping.kind()) {
                continue;
            }

            if let Mapping::Error(message) = mapping {
                return Err(RewriteTableError::ErrorMapping {
                    address: address.clone(),
                    message,
                });
            }

            let Some(target) = mapping.target(address) else {
                continue;
            };

            trace!(%address, %target, depth, "Following rewrite mapping");

            if lowercase_local_part(&target) == lowercase_local_part(address) {
                resolved.push(Mapping::Address(target));
                continue;
            }

            let nested = self.resolve(&target, kinds, depth + 1)?;
            if nested.is_empty() {
                resolved.push(match mapping {
                    Mapping::Alias(_) => Mapping::Alias(target),
                    _ => Mapping::Address(target),
                });
            } else {
                resolved.extend(nested);
            }
        }

        Ok(resolved)
    }
}

impl Default for MemoryRecipientRewriteTable {
    fn default() -> Self {
        Self::new(&RewriteTableConfig::default())
    }
}

impl RecipientRewriteTable for MemoryRecipientRewriteTable {
    fn resolved_mappings(
        &self,
        local_part: &str,
        domain: &Domain,
        kinds: &[MappingKind],
    ) -> Result<Mappings, RewriteTableError> {
        let Ok(address) = MailAddress::new(local_part, domain.clone()) else {
            return Ok(Mappings::default());
        };

        self.resolve(&address, kinds, 0).map(Mappings)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn address(s: &str) -> MailAddress {
        MailAddress::parse(s).unwrap()
    }

    fn domain(s: &str) -> Domain {
        Domain::parse(s).unwrap()
    }

    fn resolve(
        table: &MemoryRecipientRewriteTable,
        s: &str,
    ) -> Result<Mappings, RewriteTableError> {
        let addr = address(s);
        table.resolved_mappings(addr.local_part(), addr.domain(), &MappingKind::ALL)
    }

    #[test]
    fn test_no_mapping_is_empty() {
        let table = MemoryRecipientRewriteTable::default();

        let mappings = resolve(&table, "user@domain.com").unwrap();
        assert!(mappings.is_empty());
        assert_eq!(mappings.first_address(), None);
    }

    #[test]
    fn test_alias_chain_is_followed() {
        let table = MemoryRecipientRewriteTable::default();
        table
            .add_alias(address("alias@domain.com"), address("middle@domain.com"))
            .unwrap();
        table
            .add_address_mapping(address("middle@domain.com"), address("user@domain.com"))
            .unwrap();

        let mappings = resolve(&table, "alias@domain.com").unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings.first_address(), Some(&address("user@domain.com")));
    }

    #[test]
    fn test_local_part_matches_case_insensitively() {
        let table = MemoryRecipientRewriteTable::default();
        table
            .add_alias(address("Sales@domain.com"), address("user@domain.com"))
            .unwrap();

        for alias in ["sales@domain.com", "SALES@domain.com", "Sales@DOMAIN.com"] {
            let mappings = resolve(&table, alias).unwrap();
            assert_eq!(mappings.first_address(), Some(&address("user@domain.com")));
        }

        table
            .remove_mapping(
                &MappingSource::Address(address("sales@domain.com")),
                &Mapping::Alias(address("user@domain.com")),
            )
            .unwrap();
        assert!(resolve(&table, "Sales@domain.com").unwrap().is_empty());
    }

    #[test]
    fn test_domain_mapping_rewrites_domain() {
        let table = MemoryRecipientRewriteTable::default();
        table
            .add_domain_mapping(domain("old.com"), domain("new.com"))
            .unwrap();

        let mappings = resolve(&table, "user@old.com").unwrap();
        assert_eq!(mappings.first_address(), Some(&address("user@new.com")));
    }

    #[test]
    fn test_address_mapping_wins_over_domain_mapping() {
        let table = MemoryRecipientRewriteTable::default();
        table
            .add_domain_mapping(domain("old.com"), domain("new.com"))
            .unwrap();
        table
            .add_address_mapping(address("boss@old.com"), address("ceo@corp.com"))
            .unwrap();

        let mappings = resolve(&table, "boss@old.com").unwrap();
        assert_eq!(mappings.first_address(), Some(&address("ceo@corp.com")));
    }

    #[test]
    fn test_self_mapping_stops_recursion() {
        let table = MemoryRecipientRewriteTable::default();
        table
            .add_address_mapping(address("user@domain.com"), address("user@domain.com"))
            .unwrap();
        table
            .add_address_mapping(address("user@domain.com"), address("copy@domain.com"))
            .unwrap();

        let mappings = resolve(&table, "user@domain.com").unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings.first_address(), Some(&address("user@domain.com")));
    }

    #[test]
    fn test_error_mapping_fails() {
        let table = MemoryRecipientRewriteTable::default();
        table
            .add_error_mapping(address("gone@domain.com"), "user left")
            .unwrap();

        assert!(matches!(
            resolve(&table, "gone@domain.com"),
            Err(RewriteTableError::ErrorMapping { .. })
        ));

        let addr = address("gone@domain.com");
        let ignored = table
            .resolved_mappings(addr.local_part(), addr.domain(), &[MappingKind::Alias])
            .unwrap();
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_loop_hits_recursion_limit() {
        let table = MemoryRecipientRewriteTable::new(&RewriteTableConfig { recursion_limit: 3 });
        table
            .add_alias(address("a@domain.com"), address("b@domain.com"))
            .unwrap();
        table
            .add_alias(address("b@domain.com"), address("a@domain.com"))
            .unwrap();

        assert!(matches!(
            resolve(&table, "a@domain.com"),
            Err(RewriteTableError::TooManyMappings { limit: 3, .. })
        ));
    }

    #[test]
    fn test_add_and_remove_mapping() {
        let table = MemoryRecipientRewriteTable::default();
        let source = MappingSource::Address(address("alias@domain.com"));
        let mapping = Mapping::Alias(address("user@domain.com"));

        table.add_mapping(source.clone(), mapping.clone()).unwrap();
        assert!(matches!(
            table.add_mapping(source.clone(), mapping.clone()),
            Err(RewriteTableError::AlreadyExists(_))
        ));

        table.remove_mapping(&source, &mapping).unwrap();
        assert!(resolve(&table, "alias@domain.com").unwrap().is_empty());
        assert!(matches!(
            table.remove_mapping(&source, &mapping),
            Err(RewriteTableError::NotFound(_))
        ));
    }
}
