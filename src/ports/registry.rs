use std::sync::Arc;

use crate::core::filter::FilterSnapshot;

/// FilterRegistry defines the port (interface) for sourcing filters.
///
/// The pipeline only requires an ordered, type-partitioned snapshot per
/// request; how filters are loaded, compiled or wired is the registry's
/// concern. Hot reload is modeled as the registry producing a new snapshot:
/// a request takes one snapshot when it starts and never observes a swap
/// mid-flight.
pub trait FilterRegistry: Send + Sync + 'static {
    /// The current immutable filter snapshot.
    fn snapshot(&self) -> Arc<FilterSnapshot>;
}
