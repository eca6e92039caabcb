//! Change notification feed.
//!
//! An explicit publish/subscribe channel: executor workers publish one
//! [`ChangeEvent`] per recompiled template, right after its artifacts are on
//! disk; subscribers (the websocket server, tests) each get their own
//! crossbeam receiver.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use crate::ident::LogicalId;

/// A template that was recompiled this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub id: LogicalId,
    /// Original source path
    pub orig: PathBuf,
    /// Compiled code path in the cache directory
    pub file: PathBuf,
    /// Exported component name
    pub name: String,
    /// Compiled code
    pub code: String,
}

/// Everything the feed carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Changed(ChangeEvent),
    Failed {
        id: LogicalId,
        path: PathBuf,
        error: String,
    },
}

/// Cloneable handle to the shared subscriber list.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    subscribers: Arc<Mutex<Vec<Sender<BuildEvent>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<BuildEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: BuildEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
