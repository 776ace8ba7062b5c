/// Side length the images are resized to before entering the network.
pub const WIDTH: usize = 224;
pub const HEIGHT: usize = 224;
pub const CHANNELS: usize = 3;

/// Classes in the ImageNet head shipped with the torchvision weights.
pub const PRETRAINED_CLASSES: usize = 1000;
