use crate::{
    data::batch::ImageBatch,
    model::{bottleneck::FeatureBatch, resnet::ResNet},
    utils::metrics::{MulticlassEvaluator, MulticlassMetrics, accuracy},
};
use burn::{
    data::dataloader::DataLoader,
    nn::{Linear, loss::CrossEntropyLossConfig},
    prelude::*,
    tensor::activation::softmax,
};
use color_eyre::{
    Result,
    eyre::{bail, eyre},
};
use log::info;
use std::sync::Arc;

pub fn validate_epoch<B: Backend>(
    head: &Linear<B>,
    dataloader: &Arc<dyn DataLoader<B, FeatureBatch<B>>>,
) -> Result<(f32, f32)> {
    let mut total_loss = 0.0;
    let mut total_accuracy = 0.0;
    let mut batch_count = 0;

    for batch in dataloader.iter() {
        let output = head.forward(batch.features);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), batch.labels.clone());
        let accuracy = accuracy(output, batch.labels);

        total_loss += loss.into_scalar().elem::<f32>();
        total_accuracy += accuracy;
        batch_count += 1;
    }
    if batch_count == 0 {
        bail!("Validation set is empty");
    }

    Ok((
        total_loss / batch_count as f32,
        total_accuracy / batch_count as f32,
    ))
}

/// Scores every test image with the fitted model and computes multiclass metrics.
pub fn evaluate<B: Backend>(
    model: &ResNet<B>,
    dataloader: &Arc<dyn DataLoader<B, ImageBatch<B>>>,
    top_k: usize,
) -> Result<MulticlassMetrics> {
    let num_classes = model.num_classes();
    let mut evaluator = MulticlassEvaluator::new(num_classes, top_k);

    for batch in dataloader.iter() {
        if batch.is_empty() {
            continue;
        }
        let probabilities = softmax(model.forward(batch.images), 1)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| eyre!("Failed to read predictions: {e:?}"))?;
        let labels = batch
            .labels
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| eyre!("Failed to read labels: {e:?}"))?;

        for (row, label) in probabilities.chunks(num_classes).zip(labels) {
            evaluator.update(row, label as usize);
        }
    }

    let metrics = evaluator.finish()?;
    info!(
        "Evaluated test set: micro accuracy {:.4}, log-loss {:.4}",
        metrics.micro_accuracy, metrics.log_loss
    );
    Ok(metrics)
}
