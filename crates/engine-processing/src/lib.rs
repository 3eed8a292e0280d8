pub mod cb;
pub mod error;
pub mod redaction;
pub mod retry;
pub mod transform;
pub mod upsert;
