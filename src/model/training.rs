use crate::{
    data::{
        batch::{ImageBatch, ImageBatcher},
        loader::SplitDataset,
    },
    model::{
        bottleneck::{BottleneckSet, FeatureBatch, FeatureBatcher, compute_bottlenecks},
        evaluate::validate_epoch,
        resnet::{Architecture, ResNet},
    },
    utils::metrics::accuracy,
};

use burn::{
    data::{dataloader::DataLoader, dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    nn::{Linear, LinearConfig, loss::CrossEntropyLossConfig},
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use color_eyre::{
    Result,
    eyre::{WrapErr, bail},
};
use log::info;
use std::{path::Path, sync::Arc};

#[derive(Config)]
pub struct TrainingConfig {
    pub architecture: Architecture,

    pub optimizer: AdamWConfig,

    #[config(default = 200)]
    pub num_epochs: usize,

    #[config(default = 20)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub num_workers: usize,

    #[config(default = 0)]
    pub seed: u64,

    #[config(default = 1.0e-2)]
    pub learning_rate: f64,

    #[config(default = 0.0)]
    pub label_smoothing: f32,

    #[config(default = 10)]
    pub lr_step_size: usize,

    #[config(default = 0.5)]
    pub lr_gamma: f64,

    #[config(default = 20)]
    pub early_stopping_patience: usize,

    /// Smallest validation accuracy gain (as a fraction) that counts as progress.
    #[config(default = 0.01)]
    pub early_stopping_min_delta: f32,

    #[config(default = 0.3)]
    pub test_fraction: f32,

    #[config(default = 0.1)]
    pub validation_fraction: f32,

    #[config(default = 3)]
    pub top_k: usize,
}

impl TrainingConfig {
    pub fn from_file_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path)
                .wrap_err_with(|| format!("Failed to load training config {}", path.display())),
            None => Ok(Self::new(
                Architecture::default(),
                AdamWConfig::new().with_weight_decay(1.0e-2),
            )),
        }
    }
}

pub fn prepare_workspace(workspace: &Path, config: &TrainingConfig) -> Result<()> {
    std::fs::create_dir_all(workspace)
        .wrap_err_with(|| format!("Failed to create workspace {}", workspace.display()))?;
    config
        .save(workspace.join("config.json"))
        .wrap_err("Failed to save training config JSON")?;
    Ok(())
}

pub fn image_loader<B: Backend>(
    dataset: SplitDataset,
    config: &TrainingConfig,
) -> Arc<dyn DataLoader<B, ImageBatch<B>>> {
    DataLoaderBuilder::new(ImageBatcher::default())
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(dataset)
}

/// Fits the classifier: the pretrained backbone stays frozen, its bottleneck
/// values are computed once, and only the linear head is trained on them.
pub fn fit<B: AutodiffBackend>(
    model: ResNet<B::InnerBackend>,
    train: SplitDataset,
    validation: SplitDataset,
    config: &TrainingConfig,
    device: B::Device,
) -> Result<ResNet<B::InnerBackend>> {
    B::seed(config.seed);
    let num_classes = model.num_classes();

    info!("Computing bottleneck values for {} training images", train.len());
    let train_features = compute_bottlenecks(&model, &image_loader(train, config))
        .wrap_err("Failed to compute training bottleneck values")?;
    let validation_features = if validation.is_empty() {
        BottleneckSet::default()
    } else {
        info!(
            "Computing bottleneck values for {} validation images",
            validation.len()
        );
        compute_bottlenecks(&model, &image_loader(validation, config))
            .wrap_err("Failed to compute validation bottleneck values")?
    };
    let validation_features = if validation_features.is_empty() {
        info!("No validation images, early stopping monitors the training set");
        train_features.clone()
    } else {
        validation_features
    };

    let trained = train_head::<B>(
        train_features,
        validation_features,
        num_classes,
        config,
        device,
    )
    .wrap_err("Head training failed")?;

    Ok(model.with_head(trained.head))
}

pub struct TrainedHead<B: Backend> {
    /// Head from the epoch with the best validation accuracy.
    pub head: Linear<B>,
    pub best_epoch: usize,
    pub best_val_accuracy: f32,
    pub epochs_run: usize,
}

pub fn train_head<B: AutodiffBackend>(
    train: BottleneckSet,
    validation: BottleneckSet,
    num_classes: usize,
    config: &TrainingConfig,
    device: B::Device,
) -> Result<TrainedHead<B::InnerBackend>> {
    if train.is_empty() {
        bail!("No decodable training images");
    }

    let mut head: Linear<B> = LinearConfig::new(train.dim(), num_classes).init(&device);

    let dataloader_train: Arc<dyn DataLoader<B, FeatureBatch<B>>> =
        DataLoaderBuilder::new(FeatureBatcher::default())
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .build(train);
    let dataloader_val: Arc<dyn DataLoader<B::InnerBackend, FeatureBatch<B::InnerBackend>>> =
        DataLoaderBuilder::new(FeatureBatcher::default())
            .batch_size(config.batch_size)
            .build(validation);

    let loss_fn = CrossEntropyLossConfig::new()
        .with_smoothing((config.label_smoothing > 0.0).then_some(config.label_smoothing))
        .init(&device);
    let mut optim = config.optimizer.init();
    let mut best_head = head.valid();
    let mut best_val_accuracy = f32::NEG_INFINITY;
    let mut best_epoch = 0;
    let mut epochs_run = 0;
    let mut patience_counter = 0;
    let mut current_lr = config.learning_rate;
    let min_delta = config.early_stopping_min_delta * 100.0;

    info!(
        "Starting head training: {} epochs, {} classes, {} features",
        config.num_epochs,
        num_classes,
        head.weight.val().dims()[0]
    );
    info!("Initial learning rate: {:.6}", current_lr);

    for epoch in 1..config.num_epochs + 1 {
        epochs_run = epoch;
        let mut total_loss = 0.0;
        let mut total_accuracy = 0.0;
        let mut batch_count = 0;

        for batch in dataloader_train.iter() {
            let output = head.forward(batch.features);
            let loss = loss_fn.forward(output.clone(), batch.labels.clone());
            let accuracy = accuracy(output, batch.labels);

            total_loss += loss.clone().into_scalar().elem::<f32>();
            total_accuracy += accuracy;
            batch_count += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &head);
            head = optim.step(current_lr, head, grads);
        }

        let train_loss = total_loss / batch_count as f32;
        let train_acc = total_accuracy / batch_count as f32;

        let head_valid = head.valid();
        let (val_loss, val_acc) =
            validate_epoch(&head_valid, &dataloader_val).wrap_err("Validation epoch failed")?;

        info!(
            "Epoch {}: Train Loss {:.4}, Train Acc {:.2}% | Val Loss {:.4}, Val Acc {:.2}%",
            epoch, train_loss, train_acc, val_loss, val_acc
        );

        if epoch % config.lr_step_size == 0 {
            current_lr *= config.lr_gamma;
            info!("Learning rate decayed to: {:.6}", current_lr);
        }

        if val_acc > best_val_accuracy + min_delta {
            best_val_accuracy = val_acc;
            best_head = head_valid;
            best_epoch = epoch;
            patience_counter = 0;
        } else {
            patience_counter += 1;
            if patience_counter >= config.early_stopping_patience {
                info!(
                    "Early stopping triggered at epoch {} (best val acc: {:.2}%)",
                    epoch, best_val_accuracy
                );
                break;
            }
        }
    }

    Ok(TrainedHead {
        head: best_head,
        best_epoch,
        best_val_accuracy,
        epochs_run,
    })
}
