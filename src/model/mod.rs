pub mod artifact;
pub mod blocks;
pub mod bottleneck;
pub mod evaluate;
pub mod inference;
pub mod pretrained;
pub mod resnet;
pub mod training;
