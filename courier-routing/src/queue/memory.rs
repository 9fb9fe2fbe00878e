use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use courier_common::{Mail, tracing::debug};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{Delay, MailQueue, MailQueueFactory, TimeUnit};
use crate::{config::MemoryQueueConfig, error::QueueError};

/// A mail held by a [`MemoryMailQueue`]
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub mail: Mail,
    /// The delay requested at enqueue time, if any
    pub delay: Option<Delay>,
    available_at: Instant,
}

impl QueueItem {
    /// Whether the item's delay has elapsed
    #[must_use]
    pub fn is_ready(&self) -> bool {
        Instant::now() >= self.available_at
    }
}

/// In-memory FIFO mail queue
///
/// Delayed mail stays in the queue, in enqueue order, but is skipped by
/// [`MemoryMailQueue::dequeue`] until its delay has elapsed.
///
/// # Capacity Management
/// With a capacity set, enqueueing into a full queue fails with
/// [`QueueError::Full`] and the mail is not stored.
#[derive(Debug)]
pub struct MemoryMailQueue {
    name: String,
    capacity: Option<usize>,
    items: Mutex<VecDeque<QueueItem>>,
}

impl MemoryMailQueue {
    /// Create an unbounded queue
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            items: Mutex::default(),
        }
    }

    #[must_use]
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &MemoryQueueConfig) -> Self {
        Self {
            capacity: config.capacity,
            ..Self::new(name)
        }
    }

    /// Remove and return the oldest mail whose delay has elapsed
    pub fn dequeue(&self) -> Option<Mail> {
        let mut items = self.items.lock();
        let position = items.iter().position(QueueItem::is_ready)?;
        items.remove(position).map(|item| item.mail)
    }

    /// Snapshot of every held item in enqueue order, ready or not
    #[must_use]
    pub fn items(&self) -> Vec<QueueItem> {
        self.items.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    fn push(&self, mail: Mail, delay: Option<Delay>) -> Result<(), QueueError> {
        let mut items = self.items.lock();

        if let Some(capacity) = self.capacity
            && items.len() >= capacity
        {
            return Err(QueueError::Full {
                name: self.name.clone(),
                capacity,
            });
        }

        let wait = delay.map_or(Duration::ZERO, |delay| delay.as_duration());
        let now = Instant::now();
        // Delays past what `Instant` can represent are held for a century
        let available_at = now
            .checked_add(wait)
            .or_else(|| now.checked_add(TimeUnit::Days.duration(36_500)))
            .unwrap_or(now);

        debug!(queue = %self.name, mail = %mail.name(), ?delay, "Queued mail");

        items.push_back(QueueItem {
            mail,
            delay,
            available_at,
        });

        Ok(())
    }
}

impl MailQueue for MemoryMailQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, mail: Mail) -> Result<(), QueueError> {
        self.push(mail, None)
    }

    fn enqueue_delayed(&self, mail: Mail, amount: u64, unit: TimeUnit) -> Result<(), QueueError> {
        self.push(mail, Some(Delay::new(amount, unit)))
    }
}

/// Creates [`MemoryMailQueue`]s on demand, one per name
#[derive(Debug, Default)]
pub struct MemoryMailQueueFactory {
    config: MemoryQueueConfig,
    queues: DashMap<String, Arc<MemoryMailQueue>>,
}

impl MemoryMailQueueFactory {
    #[must_use]
    pub fn new(config: MemoryQueueConfig) -> Self {
        Self {
            config,
            queues: DashMap::new(),
        }
    }

    /// The concrete queue called `name`, created on first use
    #[must_use]
    pub fn queue(&self, name: &str) -> Arc<MemoryMailQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryMailQueue::from_config(name, &self.config)))
            .clone()
    }

    /// Names of all queues created so far, sorted
    #[must_use]
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.queues.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl MailQueueFactory for MemoryMailQueueFactory {
    fn create_queue(&self, name: &str) -> Arc<dyn MailQueue> {
        self.queue(name)
    }
}
