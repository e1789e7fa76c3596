/// Authenticated principal shared with every remote store.
pub mod identity;
/// Canonical tracker state and the durable document shape.
pub mod models;
/// Raw backend payloads to canonical state.
pub mod normalize;
/// Backend adapters behind the `RemoteStore` trait.
pub mod remote_store;
/// Storage error taxonomy shared by every backend.
pub mod storage;
