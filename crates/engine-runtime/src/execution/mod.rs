pub mod executor;
pub mod stores;
