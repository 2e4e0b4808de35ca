//! In-process face
//!
//! A face backed by in-memory queues: replies are scripted per name,
//! expressed interests and published objects are recorded. Used by
//! the test suite and for driving the engine without a forwarder.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use tracing::trace;

use crate::face::{Face, FaceEvent, Interest};
use crate::metadata::Data;
use crate::name::Name;

/// A scripted reply to one expression of a name.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this object.
    Data(Data),
    /// Let the request expire.
    Timeout,
    /// Refuse the request.
    Nack(String),
}

/// An in-memory [`Face`].
///
/// Each `express_interest` consumes the next scripted reply for that
/// name and turns it into a pending event; names with no script are
/// left unanswered. `next_event` drains pending events and returns
/// `None` once the face is idle.
#[derive(Debug, Default)]
pub struct MemoryFace {
    replies: HashMap<Name, VecDeque<Reply>>,
    events: VecDeque<FaceEvent>,
    expressed: Vec<Interest>,
    published: Vec<Data>,
    registered: Vec<Name>,
    failing_prefixes: HashSet<Name>,
}

impl MemoryFace {
    /// Create an idle face with no scripted replies.
    pub fn new() -> Self {
        MemoryFace::default()
    }

    /// Script a Data reply for the next expression of `name`.
    pub fn queue_data(&mut self, name: Name, data: Data) {
        self.replies.entry(name).or_default().push_back(Reply::Data(data));
    }

    /// Script a timeout for the next expression of `name`.
    pub fn queue_timeout(&mut self, name: Name) {
        self.replies.entry(name).or_default().push_back(Reply::Timeout);
    }

    /// Script a NACK for the next expression of `name`.
    pub fn queue_nack(&mut self, name: Name, reason: impl Into<String>) {
        self.replies
            .entry(name)
            .or_default()
            .push_back(Reply::Nack(reason.into()));
    }

    /// Make registrations under `prefix` fail.
    pub fn fail_registration(&mut self, prefix: Name) {
        self.failing_prefixes.insert(prefix);
    }

    /// Inject an event directly, e.g. an inbound interest or an
    /// out-of-order completion.
    pub fn push_event(&mut self, event: FaceEvent) {
        self.events.push_back(event);
    }

    /// Every interest expressed through this face, in order.
    pub fn expressed(&self) -> &[Interest] {
        &self.expressed
    }

    /// Every object published through this face, in order.
    pub fn published(&self) -> &[Data] {
        &self.published
    }

    /// Every prefix registered at this face, in order.
    pub fn registered(&self) -> &[Name] {
        &self.registered
    }
}

#[async_trait]
impl Face for MemoryFace {
    async fn express_interest(&mut self, interest: Interest) -> Result<()> {
        trace!("expressing {}", interest.name());
        let reply = self
            .replies
            .get_mut(interest.name())
            .and_then(|queue| queue.pop_front());
        self.expressed.push(interest.clone());
        match reply {
            Some(Reply::Data(data)) => self.events.push_back(FaceEvent::Data { interest, data }),
            Some(Reply::Timeout) => self.events.push_back(FaceEvent::Timeout { interest }),
            Some(Reply::Nack(reason)) => {
                self.events.push_back(FaceEvent::Nack { interest, reason })
            }
            // No script: the request stays unanswered.
            None => {}
        }
        Ok(())
    }

    async fn put(&mut self, data: Data) -> Result<()> {
        trace!("publishing {}", data.name());
        self.published.push(data);
        Ok(())
    }

    async fn register_prefix(&mut self, prefix: Name) -> Result<()> {
        if self.failing_prefixes.contains(&prefix) {
            self.events.push_back(FaceEvent::RegisterFailed {
                prefix,
                reason: "registration refused".to_string(),
            });
        } else {
            self.registered.push(prefix);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<FaceEvent> {
        self.events.pop_front()
    }
}
