//! Stream and discovery transports
//!
//! - [`memory`] - in-process network for tests and demos
//! - [`tcp`] - TCP sockets standing in for the radio link

pub mod memory;
pub mod tcp;

pub use memory::{MemoryDiscovery, MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;
