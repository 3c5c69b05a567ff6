//! txelevator-gateway: serves snapshot streams to downstream WebSocket clients.
//!
//! One accept loop hands connections round-robin to N [`Worker`]s. Each
//! worker owns a bus receiver, a pair of local event streams and its
//! connections. A connection's [`Session`] keeps at most one listener per
//! topic and drops them all when the connection ends.

pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod worker;

pub use error::GatewayError;
pub use protocol::{ClientRequest, ServerMessage};
pub use server::{Gateway, GatewayConfig};
pub use session::{Frame, Session, WorkerStreams};
pub use worker::{serve_connection, Worker, WELCOME};
