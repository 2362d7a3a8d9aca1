//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

/// ID generator for client-minted rows and storage object names.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are lexicographically sortable, so id-ordered pagination matches
    /// creation order.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a random UUID v4 (no time component).
    ///
    /// Used for storage object names where collision resistance matters and
    /// sortability does not.
    #[must_use]
    pub fn generate_uuid_v4(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Generate a compact random token without hyphens.
    #[must_use]
    pub fn generate_token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
