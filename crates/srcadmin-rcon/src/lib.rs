//! srcadmin RCON - admin-channel protocol support
//!
//! Implements the Source RCON wire format (length-prefixed little-endian
//! frames), a single-session client with sentinel-based multi-frame
//! reassembly, and a per-instance connection pool.

pub mod client;
pub mod packet;
pub mod pool;

pub use client::RconClient;
pub use packet::{Packet, TYPE_AUTH, TYPE_AUTH_RESPONSE, TYPE_EXEC, TYPE_VALUE};
pub use pool::RconPool;
