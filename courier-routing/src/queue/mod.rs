//! Mail queues the routing context dispatches into
//!
//! The context only ever writes: it hands a [`Mail`] to a named queue,
//! optionally with a delay, and the queue's consumer takes it from there.

mod memory;

use std::{sync::Arc, time::Duration};

use courier_common::Mail;
use serde::{Deserialize, Serialize};

pub use self::memory::{MemoryMailQueue, MemoryMailQueueFactory, QueueItem};
use crate::error::QueueError;

/// Unit a delay amount is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// `amount` of this unit, saturating at [`Duration::MAX`]
    #[must_use]
    pub const fn duration(self, amount: u64) -> Duration {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;
        const DAY: u64 = 24 * HOUR;

        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(MINUTE)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(HOUR)),
            Self::Days => Duration::from_secs(amount.saturating_mul(DAY)),
        }
    }
}

/// How long a mail waits in the queue before it may be consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delay {
    pub amount: u64,
    pub unit: TimeUnit,
}

impl Delay {
    #[must_use]
    pub const fn new(amount: u64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.unit.duration(self.amount)
    }
}

/// A named queue mail can be dispatched into
pub trait MailQueue: Send + Sync {
    /// The name this queue was created under
    fn name(&self) -> &str;

    /// Queue `mail` for immediate consumption
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the queue rejects the mail.
    fn enqueue(&self, mail: Mail) -> Result<(), QueueError>;

    /// Queue `mail`, holding it back for `amount` of `unit`
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the queue rejects the mail.
    fn enqueue_delayed(&self, mail: Mail, amount: u64, unit: TimeUnit) -> Result<(), QueueError>;
}

/// Hands out queues by name
pub trait MailQueueFactory: Send + Sync {
    /// The queue called `name`, created on first use
    ///
    /// Asking twice for the same name returns the same queue.
    fn create_queue(&self, name: &str) -> Arc<dyn MailQueue>;
}
