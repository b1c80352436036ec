//! MongoDB backend for the [`RoomStore`](crate::dao::room_store::RoomStore)
//! abstraction.

pub mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoRoomStore;

use error::is_duplicate_key;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        if let MongoDaoError::InsertBatch {
            constraint, source, ..
        } = &err
            && is_duplicate_key(source)
        {
            return StorageError::duplicate(constraint);
        }

        StorageError::unavailable(err.to_string(), err)
    }
}
