//! Fixed image-to-tensor transform

use image::imageops::{self, FilterType};
use image::DynamicImage;
use ndarray::Array4;

/// Square input resolution expected by the classifier
pub const INPUT_SIZE: u32 = 224;

/// Color channels fed to the classifier (RGB)
pub const INPUT_CHANNELS: usize = 3;

/// Resampling kernel used for the resize step (bicubic)
pub const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// Normalized NHWC tensor with a leading batch dimension of 1
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTensor {
    data: Array4<f32>,
}

impl PreparedTensor {
    /// Tensor shape `[1, 224, 224, 3]`
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    /// Row-major view of the values
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }

    pub fn view(&self) -> ndarray::ArrayView4<'_, f32> {
        self.data.view()
    }
}

/// Prepare a decoded image for the model.
///
/// 1. Force 3-channel RGB (alpha dropped, grayscale replicated)
/// 2. Resize to 224x224 with [`RESAMPLE_FILTER`], ignoring aspect ratio
/// 3. Scale every channel value into [0, 1] by dividing by 255
/// 4. Add the batch dimension
pub fn prepare(image: &DynamicImage) -> PreparedTensor {
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, RESAMPLE_FILTER);

    let size = INPUT_SIZE as usize;
    let mut data = Array4::<f32>::zeros((1, size, size, INPUT_CHANNELS));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..INPUT_CHANNELS {
            data[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }

    PreparedTensor { data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb, Rgba};
    use proptest::prelude::*;

    #[test]
    fn test_shape_from_rectangle() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(640, 120, Rgb([255, 0, 0])));
        let tensor = prepare(&img);
        assert_eq!(tensor.shape(), [1, 224, 224, 3]);

        let view = tensor.view();
        assert_eq!(view[[0, 100, 100, 0]], 1.0);
        assert_eq!(view[[0, 100, 100, 1]], 0.0);
        assert_eq!(view[[0, 100, 100, 2]], 0.0);
    }

    #[test]
    fn test_normalization() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(50, 50, Rgb([128, 128, 128])));
        let tensor = prepare(&img);
        let expected = 128.0 / 255.0;
        for v in tensor.as_slice().unwrap() {
            assert!((v - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(512, 512, Rgba([0, 255, 0, 10])));
        let tensor = prepare(&img);
        let view = tensor.view();
        assert_eq!(view[[0, 0, 0, 0]], 0.0);
        assert_eq!(view[[0, 0, 0, 1]], 1.0);
        assert_eq!(view[[0, 0, 0, 2]], 0.0);
    }

    #[test]
    fn test_grayscale_replicated() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(10, 30, Luma([51])));
        let tensor = prepare(&img);
        let view = tensor.view();
        for c in 0..3 {
            assert!((view[[0, 5, 5, c]] - 0.2).abs() < 1e-6);
        }
    }

    proptest! {
        #[test]
        fn prop_shape_and_range(
            w in 1u32..96,
            h in 1u32..96,
            seed in any::<u64>(),
        ) {
            let img = ImageBuffer::from_fn(w, h, |x, y| {
                let v = seed
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add((x as u64) << 16 | y as u64);
                Rgb([(v >> 8) as u8, (v >> 24) as u8, (v >> 40) as u8])
            });
            let tensor = prepare(&DynamicImage::ImageRgb8(img));

            prop_assert_eq!(tensor.shape(), [1, 224, 224, 3]);
            for v in tensor.as_slice().unwrap() {
                prop_assert!((0.0..=1.0).contains(v));
            }
        }

        #[test]
        fn prop_deterministic(w in 1u32..64, h in 1u32..64, r: u8, g: u8, b: u8) {
            let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(w, h, Rgb([r, g, b])));
            prop_assert_eq!(prepare(&img), prepare(&img));
        }
    }
}
