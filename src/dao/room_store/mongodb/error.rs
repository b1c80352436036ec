use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB-backed operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Errors raised by the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection string could not be parsed.
    #[error("invalid MongoDB URI `{uri}`")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// Driver-side parse failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A required environment variable is missing.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the missing variable.
        var: &'static str,
    },
    /// The driver client could not be constructed.
    #[error("failed to construct MongoDB client")]
    ClientConstruction {
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// The initial ping never succeeded.
    #[error("MongoDB did not answer the initial ping after {attempts} attempts")]
    InitialPing {
        /// Number of attempts performed.
        attempts: u32,
        /// Last ping failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Index creation failed on startup.
    #[error("failed to ensure index `{index}` on `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index keys description.
        index: &'static str,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A room document could not be loaded.
    #[error("failed to load room `{code}`")]
    LoadRoom {
        /// Room code.
        code: String,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A room document could not be updated.
    #[error("failed to update room `{code}`")]
    UpdateRoom {
        /// Room code.
        code: String,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// The mission or event catalog could not be listed.
    #[error("failed to list the {catalog} catalog")]
    ListCatalog {
        /// Which catalog was queried.
        catalog: &'static str,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// Assignment rows could not be read for a room.
    #[error("failed to load assignments of room `{code}`")]
    LoadAssignments {
        /// Room code.
        code: String,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A batch insert failed (possibly on a uniqueness constraint).
    #[error("failed to insert into `{collection}`")]
    InsertBatch {
        /// Target collection.
        collection: &'static str,
        /// Uniqueness constraint guarding the collection.
        constraint: &'static str,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// An assignment row could not be updated.
    #[error("failed to update assignment of player `{player_id}`")]
    UpdateAssignment {
        /// Player whose row was targeted.
        player_id: Uuid,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A room event row could not be updated.
    #[error("failed to update event `{event_id}`")]
    UpdateEvent {
        /// Event occurrence identifier.
        event_id: Uuid,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// The history snapshot could not be written or read.
    #[error("failed to access history of room `{code}`")]
    History {
        /// Room code.
        code: String,
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
    /// A stored document does not round-trip into its entity.
    #[error("corrupt document in `{collection}`: {detail}")]
    CorruptDocument {
        /// Collection the document came from.
        collection: &'static str,
        /// What failed to parse.
        detail: String,
    },
    /// The health ping failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        /// Driver-side failure.
        #[source]
        source: mongodb::error::Error,
    },
}

/// Whether a driver error is a duplicate-key rejection (error code 11000).
///
/// Single writes surface the code through `WriteFailure`; `insert_many`
/// surfaces duplicate keys through the aggregated error message.
pub fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = error.kind.as_ref() {
        return write_error.code == 11000;
    }
    error.to_string().contains("E11000")
}
