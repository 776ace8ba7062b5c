use crate::common::{CHANNELS, HEIGHT, WIDTH};

use burn::{prelude::*, tensor::Tensor};
use color_eyre::{Result, eyre::WrapErr};
use image::{RgbImage, imageops::FilterType};
use std::{fs, path::Path};

/// Reads the raw bytes of an image file, decodes them and resizes to the network input size.
pub fn decode_image(path: &Path) -> Result<RgbImage> {
    let bytes = fs::read(path).wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let image = image::load_from_memory(&bytes)
        .wrap_err_with(|| format!("Failed to decode {}", path.display()))?;
    Ok(image
        .resize_exact(WIDTH as u32, HEIGHT as u32, FilterType::Triangle)
        .to_rgb8())
}

pub fn convert_image_to_tensor<B: Backend>(img: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let hw = height * width;
    let mut buf = vec![0f32; CHANNELS * hw];
    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = y as usize * width + x as usize;
        for c in 0..CHANNELS {
            buf[c * hw + idx] = pixel[c] as f32 / 255.0;
        }
    }
    Tensor::<B, 3>::from_data(
        TensorData::new(buf, [CHANNELS, height, width]).convert::<B::FloatElem>(),
        device,
    )
    .reshape([1, CHANNELS, height, width])
}

pub fn convert_label_to_tensor<B: Backend>(label: usize, device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::from_data(
        TensorData::new(vec![label as i64], [1]).convert::<B::IntElem>(),
        device,
    )
}
