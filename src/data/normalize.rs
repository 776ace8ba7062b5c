use burn::{prelude::*, tensor::Tensor};

pub struct NormalizeConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl NormalizeConfig {
    pub fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self::imagenet()
    }
}

pub fn normalize<B: Backend>(tensor: Tensor<B, 4>, config: &NormalizeConfig) -> Tensor<B, 4> {
    let device = tensor.device();
    let channel = |values: [f32; 3]| {
        Tensor::<B, 4>::from_data(
            TensorData::new(values.to_vec(), [1, 3, 1, 1]).convert::<B::FloatElem>(),
            &device,
        )
    };

    (tensor - channel(config.mean)) / channel(config.std)
}
