//! WAMP server
//!
//! The dispatcher, the application handler trait, outbound delivery and
//! the router that ties them to client connections.

pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod outbound;
pub mod router;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use handler::WampHandler;
pub use outbound::{ConnectionTable, Outbound};
pub use router::{ClientHandle, WampServer};
