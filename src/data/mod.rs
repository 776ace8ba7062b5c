pub mod batch;
pub mod conversion;
pub mod labels;
pub mod loader;
pub mod normalize;
