pub mod admission;
pub mod attempt;
pub mod chain;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod headers;
pub mod message;
pub mod origin;

pub use chain::Pipeline;
pub use dispatch::OriginDispatcher;
pub use origin::OriginManager;
