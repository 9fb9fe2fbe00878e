//! Local delivery resolution, bounces and spool dispatch
//!
//! [`RoutingContext`] is what mail processors talk to: it decides whether an
//! address or domain is served locally, bounces mail back to its sender, and
//! puts mail into the spool queue. The authorities it consults and the queue
//! it writes to are injected as trait objects, with in-memory
//! implementations provided for tests and small deployments.

pub mod bounce;
pub mod config;
pub mod context;
pub mod domains;
pub mod error;
pub mod queue;
pub mod resources;
pub mod rewrite;
pub mod users;

pub use config::{ContextConfig, DomainListConfig, MemoryQueueConfig, RewriteTableConfig};
pub use context::{EnqueueRequest, RoutingContext, SENT_BY_CONTEXT_ATTRIBUTE};
pub use domains::{DomainList, MemoryDomainList};
pub use error::{
    BounceError, ConfigError, DomainListError, QueueError, ResolutionError, RewriteTableError,
    SendError, UsersRepositoryError,
};
pub use queue::{
    Delay, MailQueue, MailQueueFactory, MemoryMailQueue, MemoryMailQueueFactory, QueueItem,
    TimeUnit,
};
pub use resources::LocalResources;
pub use rewrite::{
    Mapping, MappingKind, MappingSource, Mappings, MemoryRecipientRewriteTable,
    RecipientRewriteTable,
};
pub use users::{MemoryUsersRepository, Principal, UsersRepository};
