//! Topic registry for pub/sub routing
//!
//! The registry maps fully-qualified topic URIs to the session ids of their
//! subscribers. It is shared by every connection of a server and injected
//! into the dispatcher as an `Arc<TopicRegistry>`.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<TopicRegistry>
//!                     ┌─────────────────────────┐
//!                     │ topics: HashMap<Uri,    │
//!                     │   TopicEntry {          │
//!                     │     subscribers,        │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    PUBLISH                 frame_rx.recv()         frame_rx.recv()
//!         │                       │                       │
//!         └──► registry.publish() ──► Outbound::deliver() ──► transport
//! ```
//!
//! # Zero-Copy Fan-out
//!
//! An EVENT is serialized once into `bytes::Bytes`; every recipient's queue
//! receives a reference-counted clone of the same allocation.

pub mod config;
pub mod entry;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{TopicEntry, TopicStats};
pub use store::TopicRegistry;
