//! Concrete implementations of the outbound ports.

pub mod http_transport;
pub mod pool;
pub mod registry;
pub mod static_discovery;

pub use http_transport::HttpTransport;
pub use pool::BoundedPool;
pub use registry::InMemoryFilterRegistry;
pub use static_discovery::StaticDiscovery;
