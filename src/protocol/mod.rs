pub mod connection;
pub mod message;

// a single command never needs more than this
pub const MAX_LINE_LEN: usize = 1024;
