//! Config-seeded discovery adapter.
//!
//! Each route gets a `tokio::sync::watch` channel holding the latest
//! candidate-server snapshot. `watch` hands out a stream that yields the
//! current snapshot immediately and then every subsequent push, matching the
//! discovery port's "most recent snapshot is authoritative" contract. Pushes
//! come from configuration (the seed) or from whatever refresh mechanism the
//! embedding application wires up.
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use futures_util::{StreamExt, stream::BoxStream};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::{core::origin::Server, ports::discovery::Discovery};

/// Discovery adapter backed by per-route watch channels.
pub struct StaticDiscovery {
    channels: Mutex<HashMap<String, watch::Sender<Vec<Server>>>>,
}

impl Default for StaticDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Publish a fresh snapshot for a route, creating its channel on first
    /// use. Existing watchers observe the update; new watchers start from it.
    pub fn push(&self, route: &str, servers: Vec<Server>) {
        let mut channels = self.lock();
        match channels.get(route) {
            Some(sender) => {
                // send_replace keeps working even with no active receivers
                sender.send_replace(servers);
            }
            None => {
                let (sender, _) = watch::channel(servers);
                channels.insert(route.to_string(), sender);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Vec<Server>>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Discovery for StaticDiscovery {
    fn watch(&self, route: &str) -> BoxStream<'static, Vec<Server>> {
        let mut channels = self.lock();
        let sender = channels
            .entry(route.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        WatchStream::new(sender.subscribe()).boxed()
    }
}
