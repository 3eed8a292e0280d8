pub mod batch;
pub mod merge;
pub mod record;
pub mod row;
