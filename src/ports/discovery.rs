use futures_util::stream::BoxStream;

use crate::core::origin::Server;

/// Discovery defines the port (interface) for backend membership updates.
///
/// `watch` yields a stream of full candidate-set snapshots for a route,
/// pushed whenever membership changes. Consumers treat the most recent
/// snapshot as authoritative and never block waiting for one; until the
/// first snapshot arrives the configured seed set stays in effect.
pub trait Discovery: Send + Sync + 'static {
    /// Subscribe to candidate-set updates for one route name.
    fn watch(&self, route: &str) -> BoxStream<'static, Vec<Server>>;
}
