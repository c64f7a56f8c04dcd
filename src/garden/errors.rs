use thiserror::Error;

/// Errors that can arise while operating on gardens and their storage layer.
#[derive(Debug, Error)]
pub enum GardenError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Coin or item quantity below what the operation requires.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Operation aimed at a player or tile it cannot apply to.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Planting onto a tile that already holds something.
    #[error("tile ({x}, {y}) is occupied")]
    OccupiedTile { x: u8, y: u8 },

    /// A trade offer that can no longer be satisfied. The offer is purged
    /// before this is returned; callers surface it the same as a missing offer.
    #[error("trade offer no longer satisfiable")]
    StaleOffer,
}
