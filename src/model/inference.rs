use crate::{
    data::{
        conversion::{convert_image_to_tensor, decode_image},
        labels::LabelMap,
        normalize::{NormalizeConfig, normalize},
    },
    model::{artifact::load_model, resnet::ResNet},
};
use burn::{
    prelude::*,
    tensor::{activation::softmax, cast::ToElement},
};
use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

pub struct Predictor<B: Backend> {
    model: ResNet<B>,
    labels: LabelMap,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: ResNet<B>, labels: LabelMap, device: B::Device) -> Self {
        Self {
            model,
            labels,
            device,
        }
    }

    pub fn load(model_path: &Path, device: B::Device) -> Result<Self> {
        let (model, labels) = load_model(model_path, &device)?;
        Ok(Self::new(model, labels, device))
    }

    pub fn predict(&self, image_path: &Path) -> Result<Prediction> {
        let img = decode_image(image_path)?;
        let images = normalize(
            convert_image_to_tensor::<B>(&img, &self.device),
            &NormalizeConfig::default(),
        );
        let (score, idx) = softmax(self.model.forward(images), 1).max_dim_with_indices(1);
        let key = idx.into_scalar().to_usize();
        let label = self
            .labels
            .decode(key)
            .ok_or_else(|| eyre!("Predicted key {key} has no label"))
            .wrap_err_with(|| format!("Failed to classify {}", image_path.display()))?;

        Ok(Prediction {
            label: label.to_string(),
            score: score.into_scalar().to_f32(),
        })
    }
}
