use burn::{
    nn::{
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::*,
};

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    device: &Device<B>,
) -> Conv2d<B> {
    let padding = kernel / 2;
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .init(device)
}

// Field names mirror the torchvision state dict.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    norm3: BatchNorm<B, 2>,
    relu: Relu,
    downsample: Option<Downsample<B>>,
}

#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        Self {
            conv: conv([in_channels, out_channels], 1, stride, device),
            norm: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(input))
    }
}

impl<B: Backend> Bottleneck<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let width = out_channels / 4;
        let downsample = (in_channels != out_channels || stride != 1)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: conv([in_channels, width], 1, 1, device),
            norm1: BatchNormConfig::new(width).init(device),
            conv2: conv([width, width], 3, stride, device),
            norm2: BatchNormConfig::new(width).init(device),
            conv3: conv([width, out_channels], 1, 1, device),
            norm3: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            downsample,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.relu.forward(self.norm1.forward(self.conv1.forward(input)));
        let x = self.relu.forward(self.norm2.forward(self.conv2.forward(x)));
        let x = self.norm3.forward(self.conv3.forward(x));

        self.relu.forward(x + shortcut)
    }
}

#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<Bottleneck<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &Device<B>,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|b| match b {
                0 => Bottleneck::new(in_channels, out_channels, stride, device),
                _ => Bottleneck::new(out_channels, out_channels, 1, device),
            })
            .collect();

        Self { blocks }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |x, block| block.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn strided_stage_halves_resolution_and_widens() {
        let device = Default::default();
        let stage = LayerBlock::<NdArray>::new(2, 16, 32, 2, &device);
        let input = Tensor::<NdArray, 4>::ones([1, 16, 8, 8], &device);

        assert_eq!(stage.forward(input).dims(), [1, 32, 4, 4]);
    }

    #[test]
    fn same_width_unit_has_no_projection() {
        let device = Default::default();
        let block = Bottleneck::<NdArray>::new(16, 16, 1, &device);
        assert!(block.downsample.is_none());

        let input = Tensor::<NdArray, 4>::ones([2, 16, 5, 5], &device);
        assert_eq!(block.forward(input).dims(), [2, 16, 5, 5]);
    }
}
