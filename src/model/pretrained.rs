use crate::{
    common::PRETRAINED_CLASSES,
    model::resnet::{Architecture, ResNet, ResNetRecord},
};

use burn::{
    nn::LinearConfig,
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use color_eyre::{
    Result,
    eyre::{WrapErr, bail},
};
use log::info;
use std::path::Path;

/// Key renames from the torchvision state dict onto the [`ResNet`] module tree.
const KEY_REMAP: [(&str, &str); 6] = [
    (r"^bn1\.(.+)$", "norm1.$1"),
    (
        r"^layer([1-4])\.(\d+)\.conv([123])\.(.+)$",
        "layer$1.blocks.$2.conv$3.$4",
    ),
    (
        r"^layer([1-4])\.(\d+)\.bn([123])\.(.+)$",
        "layer$1.blocks.$2.norm$3.$4",
    ),
    (
        r"^layer([1-4])\.(\d+)\.downsample\.0\.(.+)$",
        "layer$1.blocks.$2.downsample.conv.$3",
    ),
    (
        r"^layer([1-4])\.(\d+)\.downsample\.1\.(.+)$",
        "layer$1.blocks.$2.downsample.norm.$3",
    ),
    (r"^fc\.(.+)$", "fc.$1"),
];

/// Loads torchvision ImageNet weights and swaps the head for a fresh
/// `num_classes`-way linear layer.
pub fn load_pretrained<B: Backend>(
    weights_path: &Path,
    architecture: Architecture,
    num_classes: usize,
    device: &Device<B>,
) -> Result<ResNet<B>> {
    if !weights_path.exists() {
        bail!(
            "Missing weights file: {}. Expected pretrained PyTorch {architecture} weights.",
            weights_path.display()
        );
    }

    let load_args = KEY_REMAP.iter().fold(
        LoadArgs::new(weights_path.to_path_buf()),
        |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
    );
    let record: ResNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(load_args, device)
        .wrap_err_with(|| {
            format!(
                "Failed to load / map {} into a {architecture} record",
                weights_path.display()
            )
        })?;

    let model =
        ResNet::from_architecture(architecture, PRETRAINED_CLASSES, device).load_record(record);
    let head = LinearConfig::new(model.num_features(), num_classes).init(device);
    info!("Loaded pretrained {architecture} from {}", weights_path.display());

    Ok(model.with_head(head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn missing_weights_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("resnet50.pth");

        let err = load_pretrained::<NdArray>(
            &missing,
            Architecture::ResNet50,
            5,
            &Default::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Missing weights file"));
    }
}
