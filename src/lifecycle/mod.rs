//! Process lifecycle.
//!
//! ```text
//! main.rs:     load config → validate → build ProxyServer → bind listener
//! signals.rs:  SIGINT / SIGTERM → Shutdown::trigger
//! server.rs:   ShutdownSignal fires → stop accepting → drain (bounded) → exit
//! ```
//!
//! Any startup error is fatal. In-flight connections get one drain window.

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
