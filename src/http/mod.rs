//! HTTP/1.x relay subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, one task per connection)
//!     → dispatcher.rs (drive the request)
//!         → request.rs (read raw bytes under the client-read budget)
//!         → [load balancer picks a backend]
//!         → resilience::timeouts (connect / forward / read, each bounded)
//!         → response.rs (relay verbatim, or synthetic 503/504)
//!     → Close client connection
//! ```
//!
//! framing.rs decides when a buffered message is complete; it is the only
//! place that looks inside the bytes.

pub mod dispatcher;
pub mod framing;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
pub use request::{HttpRequestReader, RawRequest, ReadError, RequestHead, RequestReader};
pub use response::SyntheticResponse;
pub use server::ProxyServer;
