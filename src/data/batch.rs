use crate::{
    common::{CHANNELS, HEIGHT, WIDTH},
    data::{
        conversion::{convert_image_to_tensor, convert_label_to_tensor, decode_image},
        loader::FlowerItem,
        normalize::{NormalizeConfig, normalize},
    },
};

use burn::{data::dataloader::batcher::Batcher, prelude::*, tensor::Tensor};
use log::warn;

#[derive(Clone, Default)]
pub struct ImageBatcher {}

#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B: Backend> Batcher<B, FlowerItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<FlowerItem>, device: &B::Device) -> ImageBatch<B> {
        let (images, labels): (Vec<Tensor<B, 4>>, Vec<Tensor<B, 1, Int>>) = items
            .iter()
            .filter_map(|item| match decode_image(&item.image_path) {
                Ok(img) => Some((
                    convert_image_to_tensor::<B>(&img, device),
                    convert_label_to_tensor::<B>(item.label, device),
                )),
                Err(e) => {
                    warn!("Skipping {}: {e:#}", item.image_path.display());
                    None
                }
            })
            .unzip();

        if images.is_empty() {
            return ImageBatch {
                images: Tensor::zeros([0, CHANNELS, HEIGHT, WIDTH], device),
                labels: Tensor::zeros([0], device),
            };
        }

        // Concatenate along the batch dimension
        let images = normalize(Tensor::cat(images, 0), &NormalizeConfig::default());
        let labels = Tensor::cat(labels, 0);
        ImageBatch { images, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use std::{fs, path::PathBuf};

    type TestBackend = NdArray;

    fn item(path: PathBuf, label: usize) -> FlowerItem {
        FlowerItem {
            image_path: path,
            label,
        }
    }

    #[test]
    fn undecodable_items_are_skipped_with_their_labels() {
        let dir = tempfile::tempdir().unwrap();
        let good_a = dir.path().join("a.png");
        let good_b = dir.path().join("b.png");
        let broken = dir.path().join("broken.jpg");
        RgbImage::from_pixel(8, 8, Rgb([200, 0, 0]))
            .save(&good_a)
            .unwrap();
        RgbImage::from_pixel(8, 8, Rgb([0, 200, 0]))
            .save(&good_b)
            .unwrap();
        fs::write(&broken, b"garbage").unwrap();

        let device = Default::default();
        let batch: ImageBatch<TestBackend> = ImageBatcher::default().batch(
            vec![item(good_a, 2), item(broken, 0), item(good_b, 1)],
            &device,
        );

        assert_eq!(batch.images.dims(), [2, CHANNELS, HEIGHT, WIDTH]);
        assert_eq!(batch.labels.into_data().to_vec::<i64>().unwrap(), vec![2, 1]);
    }

    #[test]
    fn batch_without_decodable_images_is_empty() {
        let device = Default::default();
        let batch: ImageBatch<TestBackend> = ImageBatcher::default().batch(
            vec![item(PathBuf::from("/does/not/exist.jpg"), 0)],
            &device,
        );

        assert!(batch.is_empty());
    }
}
