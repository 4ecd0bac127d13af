//! bucketplay: a playground for S3-style object store operations
//!
//! The interesting part is the asynchronous-call completion handoff: a
//! non-blocking upload submission whose single completion is observed by
//! an independent waiter through a [`CompletionSignal`]. The stores behind
//! the [`store::ObjectStore`] trait are in-process stand-ins for a real
//! provider's client.

pub mod acl;
pub mod gate;
pub mod model;
pub mod signal;
pub mod store;

pub use gate::CompletionGate;
pub use signal::CompletionSignal;
pub use store::{ObjectStore, ObjectStoreExt, ObjectStoreInstance};
