pub mod common;
pub mod data;
pub mod model;
pub mod utils;
