pub mod dedup;
pub mod filter;
pub mod pipeline;
pub mod salt;
