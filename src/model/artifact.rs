use crate::{
    common::WIDTH,
    data::labels::LabelMap,
    model::resnet::{Architecture, ResNet},
};

use burn::{prelude::*, record::CompactRecorder};
use color_eyre::{
    Result,
    eyre::{WrapErr, bail},
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Config)]
pub struct ModelArtifactConfig {
    pub architecture: Architecture,
    pub classes: Vec<String>,
    #[config(default = 224)]
    pub image_size: usize,
}

impl ModelArtifactConfig {
    pub fn labels(&self) -> LabelMap {
        LabelMap::new(self.classes.clone())
    }
}

// Extensions are appended so dotted names such as `flowers.v2` survive.
fn with_suffix(model_path: &Path, extension: &str) -> PathBuf {
    let mut path = model_path.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

fn sidecar_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, "json")
}

// The recorder swaps the last extension for `mpk`, so hand it the full name.
fn record_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, "mpk")
}

/// Writes `<model_path>.mpk` with the weights and `<model_path>.json` with
/// the architecture and the class names.
pub fn save_model<B: Backend>(
    model: ResNet<B>,
    labels: &LabelMap,
    architecture: Architecture,
    model_path: &Path,
) -> Result<()> {
    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
    }

    ModelArtifactConfig::new(architecture, labels.classes().to_vec())
        .with_image_size(WIDTH)
        .save(sidecar_path(model_path))
        .wrap_err("Failed to save model description")?;
    model
        .save_file(record_path(model_path), &CompactRecorder::new())
        .wrap_err_with(|| format!("Failed to save model to {}", model_path.display()))?;

    info!("Model saved to {}", model_path.display());
    Ok(())
}

pub fn load_artifact_config(model_path: &Path) -> Result<ModelArtifactConfig> {
    let path = sidecar_path(model_path);
    let config = ModelArtifactConfig::load(&path)
        .wrap_err_with(|| format!("Failed to read model description {}", path.display()))?;
    if config.classes.is_empty() {
        bail!("Model description {} lists no classes", path.display());
    }
    Ok(config)
}

pub fn load_model<B: Backend>(
    model_path: &Path,
    device: &Device<B>,
) -> Result<(ResNet<B>, LabelMap)> {
    let config = load_artifact_config(model_path)?;
    let labels = config.labels();
    let model = ResNet::from_architecture(config.architecture, labels.len(), device)
        .load_file(record_path(model_path), &CompactRecorder::new(), device)
        .wrap_err_with(|| format!("Failed to load model from {}", model_path.display()))?;
    Ok((model, labels))
}
