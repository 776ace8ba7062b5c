use crate::{data::batch::ImageBatch, model::resnet::ResNet};

use burn::{
    data::{
        dataloader::{DataLoader, batcher::Batcher},
        dataset::Dataset,
    },
    prelude::*,
    tensor::Tensor,
};
use color_eyre::{Result, eyre::eyre};
use log::info;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct BottleneckSet {
    dim: usize,
    features: Arc<Vec<f32>>,
    labels: Arc<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct BottleneckItem {
    pub features: Vec<f32>,
    pub label: usize,
}

impl BottleneckSet {
    pub fn new(dim: usize, features: Vec<f32>, labels: Vec<usize>) -> Self {
        assert_eq!(features.len(), dim * labels.len(), "Feature rows mismatch");
        Self {
            dim,
            features: Arc::new(features),
            labels: Arc::new(labels),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl Dataset<BottleneckItem> for BottleneckSet {
    fn get(&self, index: usize) -> Option<BottleneckItem> {
        let label = *self.labels.get(index)?;
        let start = index * self.dim;
        Some(BottleneckItem {
            features: self.features[start..start + self.dim].to_vec(),
            label,
        })
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}

pub fn compute_bottlenecks<B: Backend>(
    model: &ResNet<B>,
    dataloader: &Arc<dyn DataLoader<B, ImageBatch<B>>>,
) -> Result<BottleneckSet> {
    let dim = model.num_features();
    let mut features = Vec::new();
    let mut labels = Vec::new();

    for (iteration, batch) in dataloader.iter().enumerate() {
        if batch.is_empty() {
            continue;
        }
        let rows = model
            .features(batch.images)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| eyre!("Failed to read bottleneck values: {e:?}"))?;
        let keys = batch
            .labels
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| eyre!("Failed to read labels: {e:?}"))?;

        features.extend(rows);
        labels.extend(keys.into_iter().map(|k| k as usize));

        if iteration % 10 == 0 {
            info!("Bottleneck values computed for {} images", labels.len());
        }
    }

    Ok(BottleneckSet::new(dim, features, labels))
}

#[derive(Clone, Debug)]
pub struct FeatureBatch<B: Backend> {
    pub features: Tensor<B, 2>,
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Clone, Default)]
pub struct FeatureBatcher {}

impl<B: Backend> Batcher<B, BottleneckItem, FeatureBatch<B>> for FeatureBatcher {
    fn batch(&self, items: Vec<BottleneckItem>, device: &B::Device) -> FeatureBatch<B> {
        let rows = items.len();
        let dim = items.first().map_or(0, |item| item.features.len());
        let (features, labels): (Vec<Vec<f32>>, Vec<i64>) = items
            .into_iter()
            .map(|item| (item.features, item.label as i64))
            .unzip();

        let features = Tensor::from_data(
            TensorData::new(features.concat(), [rows, dim]).convert::<B::FloatElem>(),
            device,
        );
        let labels = Tensor::from_data(
            TensorData::new(labels, [rows]).convert::<B::IntElem>(),
            device,
        );
        FeatureBatch { features, labels }
    }
}
