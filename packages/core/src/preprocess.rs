/// # Image Preprocessing
/// Turns captured eye images into the normalized channel-first tensor the
/// on-device classifier expects.
use crate::error::PreprocessingError;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use smartsight_types::image::{self, DynamicImage, imageops::FilterType};

/// Default spatial size of the classifier input
pub const DEFAULT_INPUT_SIZE: u32 = 256;

/// ImageNet channel means, RGB order
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations, RGB order
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// Model input of shape `[1, 3, height, width]`.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

#[derive(Clone, Debug)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    normalization: Normalization,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }
}

impl Preprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            normalization: Normalization::default(),
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Decode encoded image bytes (JPEG, PNG, ...) and build the tensor.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor, PreprocessingError> {
        if bytes.is_empty() {
            return Err(PreprocessingError::Empty);
        }
        let image = image::load_from_memory(bytes)?;
        self.preprocess_image(&image)
    }

    pub fn preprocess_image(
        &self,
        image: &DynamicImage,
    ) -> Result<ImageTensor, PreprocessingError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessingError::InvalidDimensions {
                width: image.width(),
                height: image.height(),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(PreprocessingError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let resized = image.resize_exact(self.width, self.height, FilterType::Triangle);
        let rgb = resized.to_rgb8();

        let Normalization { mean, std } = self.normalization;
        let mut input = Array4::<f32>::zeros((1, 3, self.height as usize, self.width as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
            }
        }

        Ok(ImageTensor { data: input })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartsight_types::image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_png(image: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_output_shape_is_channel_first() {
        let png = encode_png(RgbImage::from_pixel(40, 30, Rgb([10, 20, 30])));
        let tensor = Preprocessor::new(32, 24).preprocess(&png).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 24, 32]);
    }

    #[test]
    fn test_solid_colour_normalization() {
        let png = encode_png(RgbImage::from_pixel(8, 8, Rgb([255, 0, 128])));
        let tensor = Preprocessor::new(4, 4).preprocess(&png).unwrap();
        let data = tensor.as_array();

        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        let blue = (128.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        for y in 0..4 {
            for x in 0..4 {
                assert!((data[[0, 0, y, x]] - red).abs() < 1e-4);
                assert!((data[[0, 1, y, x]] - green).abs() < 1e-4);
                assert!((data[[0, 2, y, x]] - blue).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_identity_normalization_scales_to_unit_range() {
        let png = encode_png(RgbImage::from_pixel(2, 2, Rgb([255, 51, 0])));
        let tensor = Preprocessor::new(2, 2)
            .with_normalization(Normalization {
                mean: [0.0; 3],
                std: [1.0; 3],
            })
            .preprocess(&png)
            .unwrap();
        let data = tensor.as_array();
        assert!((data[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((data[[0, 1, 1, 1]] - 0.2).abs() < 1e-6);
        assert!(data[[0, 2, 0, 1]].abs() < 1e-6);
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        let err = Preprocessor::default()
            .preprocess(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, PreprocessingError::Decode(_)));
    }

    #[test]
    fn test_rejects_empty_input_and_zero_target() {
        assert!(matches!(
            Preprocessor::default().preprocess(&[]),
            Err(PreprocessingError::Empty)
        ));

        let png = encode_png(RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])));
        assert!(matches!(
            Preprocessor::new(0, 10).preprocess(&png),
            Err(PreprocessingError::InvalidDimensions { .. })
        ));
    }
}
