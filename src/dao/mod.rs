/// Entity definitions shared across layers.
pub mod models;
/// Persistence abstraction and its backends.
pub mod room_store;
/// Backend-agnostic storage errors.
pub mod storage;
