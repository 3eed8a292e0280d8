pub mod csv;
pub mod source;
pub mod target;
