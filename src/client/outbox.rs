//! Outbound buffer for messages sent while the socket is down

use std::collections::VecDeque;

use crate::client::types::{OutboundMessage, SendConfig, SendPolicy};

/// Result of offering a message to the outbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// Held for delivery on the next open
    Queued,
    /// Held, and the oldest queued message was evicted to make room
    QueuedEvictedOldest,
    /// Discarded (Drop policy)
    Dropped,
}

#[derive(Debug)]
pub struct Outbox {
    policy: SendPolicy,
    capacity: usize,
    queue: VecDeque<OutboundMessage>,
}

impl Outbox {
    pub fn new(config: &SendConfig) -> Self {
        Self {
            policy: config.policy,
            capacity: config.queue_capacity.max(1),
            queue: VecDeque::new(),
        }
    }

    pub fn offer(&mut self, msg: OutboundMessage) -> Offer {
        match self.policy {
            SendPolicy::Drop => Offer::Dropped,
            SendPolicy::Queue => {
                let evicted = if self.queue.len() >= self.capacity {
                    self.queue.pop_front();
                    true
                } else {
                    false
                };
                self.queue.push_back(msg);
                if evicted {
                    Offer::QueuedEvictedOldest
                } else {
                    Offer::Queued
                }
            }
        }
    }

    /// Put a message that failed mid-flush back at the head of the queue
    pub fn requeue_front(&mut self, msg: OutboundMessage) {
        if self.policy == SendPolicy::Queue {
            if self.queue.len() >= self.capacity {
                self.queue.pop_back();
            }
            self.queue.push_front(msg);
        }
    }

    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.queue.pop_front()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
