//! Shared types for the courier mail routing context: addresses, domains,
//! messages and the mail envelope that moves between processing stages.

pub mod address;
pub mod domain;
pub mod error;
pub mod logging;
pub mod mail;
pub mod message;

pub use address::{MailAddress, MaybeSender};
pub use domain::Domain;
pub use error::{AddressError, MessageError};
pub use mail::{Mail, MailBuilder, State};
pub use message::{Message, MessageBuilder};
pub use tracing;
