//! Client-facing network layer.
//!
//! ```text
//! TCP connection
//!     → listener.rs   (bounded accept; one permit per open connection)
//!     → connection.rs (id for log correlation, open-connection count)
//!     → handed to the dispatcher
//! ```

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
