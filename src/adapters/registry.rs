//! In-memory filter registry with atomic snapshot swap.
//!
//! Registration rebuilds a fully sorted snapshot and publishes it through an
//! `ArcSwap`. Requests that already hold a snapshot keep executing against
//! it; a concurrent registration only affects requests that start afterward.
//! This is the hot-reload model: a reload is just a new snapshot.
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::{
    core::filter::{
        EndpointFilter, ErrorFilter, FilterSnapshot, InboundFilter, OutboundFilter,
    },
    ports::registry::FilterRegistry,
};

#[derive(Default)]
struct Registrations {
    next_index: usize,
    inbound: Vec<(i32, usize, Arc<dyn InboundFilter>)>,
    endpoint: Vec<(i32, usize, Arc<dyn EndpointFilter>)>,
    outbound: Vec<(i32, usize, Arc<dyn OutboundFilter>)>,
    error: Vec<(i32, usize, Arc<dyn ErrorFilter>)>,
}

impl Registrations {
    fn build_snapshot(&self) -> FilterSnapshot {
        fn sorted<T: ?Sized>(entries: &[(i32, usize, Arc<T>)]) -> Vec<Arc<T>> {
            let mut entries: Vec<_> = entries.to_vec();
            entries.sort_by_key(|(order, index, _)| (*order, *index));
            entries.into_iter().map(|(_, _, filter)| filter).collect()
        }

        FilterSnapshot {
            inbound: sorted(&self.inbound),
            endpoint: sorted(&self.endpoint),
            outbound: sorted(&self.outbound),
            error: sorted(&self.error),
        }
    }
}

/// Registry adapter holding filters registered in process.
pub struct InMemoryFilterRegistry {
    registrations: Mutex<Registrations>,
    snapshot: ArcSwap<FilterSnapshot>,
}

impl Default for InMemoryFilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFilterRegistry {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Registrations::default()),
            snapshot: ArcSwap::from_pointee(FilterSnapshot::default()),
        }
    }

    pub fn register_inbound(&self, filter: Arc<dyn InboundFilter>) {
        self.with_registrations(|r| {
            let order = filter.descriptor().order;
            let index = r.next_index;
            r.next_index += 1;
            r.inbound.push((order, index, filter));
        });
    }

    pub fn register_endpoint(&self, filter: Arc<dyn EndpointFilter>) {
        self.with_registrations(|r| {
            let order = filter.descriptor().order;
            let index = r.next_index;
            r.next_index += 1;
            r.endpoint.push((order, index, filter));
        });
    }

    pub fn register_outbound(&self, filter: Arc<dyn OutboundFilter>) {
        self.with_registrations(|r| {
            let order = filter.descriptor().order;
            let index = r.next_index;
            r.next_index += 1;
            r.outbound.push((order, index, filter));
        });
    }

    pub fn register_error(&self, filter: Arc<dyn ErrorFilter>) {
        self.with_registrations(|r| {
            let order = filter.descriptor().order;
            let index = r.next_index;
            r.next_index += 1;
            r.error.push((order, index, filter));
        });
    }

    /// Drop every registered filter and publish an empty snapshot.
    pub fn clear(&self) {
        self.with_registrations(|r| *r = Registrations::default());
    }

    fn with_registrations(&self, mutate: impl FnOnce(&mut Registrations)) {
        let mut guard = self
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        mutate(&mut guard);
        self.snapshot.store(Arc::new(guard.build_snapshot()));
    }
}

impl FilterRegistry for InMemoryFilterRegistry {
    fn snapshot(&self) -> Arc<FilterSnapshot> {
        self.snapshot.load_full()
    }
}
