//! Configuration for the routing context and its in-memory collaborators
//!
//! Every struct here deserializes from the RON configuration file and falls
//! back to its defaults for omitted fields:
//!
//! ```ron
//! ContextConfig (
//!     postmaster: Some("postmaster@example.com"),
//!     reporting_mta: "mx.example.com",
//!     spool_queue: "spool",
//! )
//! ```

use courier_common::Domain;
use serde::{Deserialize, Serialize};

/// Settings for the [`RoutingContext`](crate::RoutingContext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Address bounces are sent from
    ///
    /// When omitted, `postmaster@<default domain>` is used.
    pub postmaster: Option<String>,
    /// Hostname for the Reporting-MTA field of delivery reports
    pub reporting_mta: String,
    /// Name of the queue mail is dispatched into
    pub spool_queue: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            postmaster: None,
            reporting_mta: "localhost".to_string(),
            spool_queue: "spool".to_string(),
        }
    }
}

/// Settings for the [`MemoryDomainList`](crate::MemoryDomainList)
///
/// ```ron
/// DomainListConfig (
///     default_domain: Some("example.com"),
///     domains: ["example.org"],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainListConfig {
    /// Domain appended to bare user names; `localhost` when omitted
    ///
    /// The default domain is always registered as a local domain.
    pub default_domain: Option<Domain>,
    /// Additional local domains
    pub domains: Vec<Domain>,
}

impl DomainListConfig {
    #[must_use]
    pub fn with_default_domain(default_domain: Domain) -> Self {
        Self {
            default_domain: Some(default_domain),
            domains: Vec::new(),
        }
    }
}

/// Settings for the [`MemoryRecipientRewriteTable`](crate::MemoryRecipientRewriteTable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteTableConfig {
    /// Maximum alias hops followed before resolution gives up
    pub recursion_limit: usize,
}

impl Default for RewriteTableConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 10,
        }
    }
}

/// Settings for the [`MemoryMailQueue`](crate::MemoryMailQueue)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryQueueConfig {
    /// Maximum number of mails held (omit for unlimited)
    pub capacity: Option<usize>,
}
