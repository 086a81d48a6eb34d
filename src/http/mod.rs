//! HTTP transport for service tests
//!
//! Concrete executor and reachability probe used by the engine.

mod client;
mod probe;

pub use client::HttpExecutor;
pub use probe::TcpProbe;
