use serde::Serialize;
use uuid::Uuid;

/// Free-form JSON object, as supplied by the caller.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Keys the server owns on a student record. Callers cannot set them.
pub const RESERVED_KEYS: [&str; 2] = ["id", "owner_id"];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredential {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StudentRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(flatten)]
    #[sqlx(json)]
    pub fields: Document,
}

/// Drops the server-owned keys from a caller document.
pub fn strip_reserved(mut fields: Document) -> Document {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    fields
}
