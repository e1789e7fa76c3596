//! Firebase Realtime Database implementation of [`RemoteStore`](super::RemoteStore).

mod config;
mod error;
mod models;
mod store;
mod stream;

pub use config::FirebaseConfig;
pub use error::{FirebaseDaoError, FirebaseResult};
pub use store::FirebaseStore;
