//! Storage layer of a chat backend: users, rooms, memberships, messages,
//! devices and push subscriptions behind one provider interface, plus the
//! adapter that keeps the push service in step with datastore cascades.

pub mod completion;
pub mod config;
pub mod ctx;
pub mod datastore;
pub mod error;
pub mod model;
pub mod notification;

pub use config::{BackendKind, DatastoreConfig, PushConfig};
pub use ctx::Ctx;
pub use datastore::{connect, AsyncStore, Provider};
pub use error::{ErrorKind, ProblemDetail, StoreError, StoreResult};
