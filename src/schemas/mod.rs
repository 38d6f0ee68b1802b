pub mod common;
pub mod poster;
