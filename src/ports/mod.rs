pub mod discovery;
pub mod pool;
pub mod registry;
pub mod transport;
