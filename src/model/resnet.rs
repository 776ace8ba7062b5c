use crate::model::blocks::LayerBlock;
use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    #[default]
    ResNet50,
    ResNet101,
}

impl Architecture {
    pub fn blocks(self) -> [usize; 4] {
        match self {
            Architecture::ResNet50 => [3, 4, 6, 3],
            Architecture::ResNet101 => [3, 4, 23, 3],
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::ResNet50 => write!(f, "ResNet-50"),
            Architecture::ResNet101 => write!(f, "ResNet-101"),
        }
    }
}

const BOTTLENECK_EXPANSION: usize = 4;

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: LayerBlock<B>,
    layer2: LayerBlock<B>,
    layer3: LayerBlock<B>,
    layer4: LayerBlock<B>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// Builds a bottleneck ResNet. `base_width` is the width of the first
    /// stage before expansion (64 for the torchvision models).
    pub fn new(
        blocks: [usize; 4],
        num_classes: usize,
        base_width: usize,
        device: &Device<B>,
    ) -> Self {
        let conv1 = Conv2dConfig::new([3, base_width], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let widths = [1, 2, 4, 8].map(|m| base_width * m * BOTTLENECK_EXPANSION);

        Self {
            conv1,
            norm1: BatchNormConfig::new(base_width).init(device),
            relu: Relu::new(),
            maxpool,
            layer1: LayerBlock::new(blocks[0], base_width, widths[0], 1, device),
            layer2: LayerBlock::new(blocks[1], widths[0], widths[1], 2, device),
            layer3: LayerBlock::new(blocks[2], widths[1], widths[2], 2, device),
            layer4: LayerBlock::new(blocks[3], widths[2], widths[3], 2, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(widths[3], num_classes).init(device),
        }
    }

    pub fn from_architecture(
        architecture: Architecture,
        num_classes: usize,
        device: &Device<B>,
    ) -> Self {
        Self::new(architecture.blocks(), num_classes, 64, device)
    }

    pub fn features(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.relu.forward(self.norm1.forward(x));
        let x = self.maxpool.forward(x);

        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

        self.avgpool.forward(x).flatten(1, 3)
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.features(input))
    }

    pub fn num_features(&self) -> usize {
        self.fc.weight.val().dims()[0]
    }

    pub fn num_classes(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }

    pub fn with_head(mut self, head: Linear<B>) -> Self {
        self.fc = head;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny(num_classes: usize) -> ResNet<TestBackend> {
        ResNet::new([1, 1, 1, 1], num_classes, 4, &Default::default())
    }

    #[test]
    fn resnet50_layout() {
        assert_eq!(Architecture::default(), Architecture::ResNet50);
        assert_eq!(Architecture::ResNet50.blocks().iter().sum::<usize>(), 16);
        assert_eq!(Architecture::ResNet101.blocks().iter().sum::<usize>(), 33);
    }

    #[test]
    fn features_are_pooled_per_image() {
        let device = Default::default();
        let model = tiny(5);
        let input = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);

        assert_eq!(model.num_features(), 128);
        assert_eq!(model.features(input.clone()).dims(), [2, 128]);
        assert_eq!(model.forward(input).dims(), [2, 5]);
    }

    #[test]
    fn replacing_the_head_changes_class_count() {
        let device = Default::default();
        let model = tiny(1000);
        let head = LinearConfig::new(model.num_features(), 3).init(&device);
        let model = model.with_head(head);

        assert_eq!(model.num_classes(), 3);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 40, 40], &device);
        assert_eq!(model.forward(input).dims(), [1, 3]);
    }
}
