//! Known local users and the principal they are looked up by

use std::fmt::{self, Display};

use ahash::AHashSet;
use courier_common::MailAddress;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::UsersRepositoryError;

/// The canonical, lower-cased name a user is stored under
///
/// Either a full address (virtual hosting) or a bare local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// The principal for `address` under virtual hosting
    #[must_use]
    pub fn from_address(address: &MailAddress) -> Self {
        Self::new(&address.to_string())
    }

    /// The principal for `address` without virtual hosting
    #[must_use]
    pub fn from_local_part(address: &MailAddress) -> Self {
        Self::new(address.local_part())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of local users
pub trait UsersRepository: Send + Sync {
    /// Returns `true` if `principal` is a known user.
    ///
    /// # Errors
    ///
    /// Returns a [`UsersRepositoryError`] if the repository cannot be read.
    fn contains(&self, principal: &Principal) -> Result<bool, UsersRepositoryError>;

    /// The principal `address` is stored under
    ///
    /// # Errors
    ///
    /// Returns a [`UsersRepositoryError`] if the repository cannot derive one.
    fn principal_for(&self, address: &MailAddress) -> Result<Principal, UsersRepositoryError> {
        Ok(Principal::from_address(address))
    }
}

/// In-memory user registry
#[derive(Debug)]
pub struct MemoryUsersRepository {
    virtual_hosting: bool,
    users: RwLock<AHashSet<Principal>>,
}

impl MemoryUsersRepository {
    /// Users are full addresses, so the same local part in two domains are
    /// two different users
    #[must_use]
    pub fn with_virtual_hosting() -> Self {
        Self {
            virtual_hosting: true,
            users: RwLock::default(),
        }
    }

    /// Users are bare local parts shared by every local domain
    #[must_use]
    pub fn without_virtual_hosting() -> Self {
        Self {
            virtual_hosting: false,
            users: RwLock::default(),
        }
    }

    #[must_use]
    pub const fn supports_virtual_hosting(&self) -> bool {
        self.virtual_hosting
    }

    /// # Errors
    ///
    /// Returns [`UsersRepositoryError::InvalidUsername`] if `name` does not
    /// match the hosting mode, or [`UsersRepositoryError::AlreadyExists`].
    pub fn add_user(&self, name: &str) -> Result<(), UsersRepositoryError> {
        let principal = self.principal_from_name(name)?;
        let mut users = self.users.write();

        if users.contains(&principal) {
            return Err(UsersRepositoryError::AlreadyExists(principal));
        }

        users.insert(principal);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`UsersRepositoryError::NotFound`] if the user is unknown.
    pub fn remove_user(&self, name: &str) -> Result<(), UsersRepositoryError> {
        let principal = self.principal_from_name(name)?;

        if self.users.write().remove(&principal) {
            Ok(())
        } else {
            Err(UsersRepositoryError::NotFound(principal))
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.users.read().len()
    }

    fn principal_from_name(&self, name: &str) -> Result<Principal, UsersRepositoryError> {
        let invalid = |reason: &str| UsersRepositoryError::InvalidUsername {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if self.virtual_hosting {
            let address = MailAddress::parse(name).map_err(|err| invalid(&err.to_string()))?;
            Ok(Principal::from_address(&address))
        } else if name.contains('@') {
            Err(invalid("domain part given without virtual hosting"))
        } else if name.trim().is_empty() {
            Err(invalid("empty username"))
        } else {
            Ok(Principal::new(name.trim()))
        }
    }
}

impl Default for MemoryUsersRepository {
    fn default() -> Self {
        Self::with_virtual_hosting()
    }
}

impl UsersRepository for MemoryUsersRepository {
    fn contains(&self, principal: &Principal) -> Result<bool, UsersRepositoryError> {
        Ok(self.users.read().contains(principal))
    }

    fn principal_for(&self, address: &MailAddress) -> Result<Principal, UsersRepositoryError> {
        Ok(if self.virtual_hosting {
            Principal::from_address(address)
        } else {
            Principal::from_local_part(address)
        })
    }
}
