use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Black and white copy split at the Otsu level of the lightly blurred input
pub fn binarize(img: &GrayImage) -> GrayImage {
    let smoothed = apply_blur(img, 0.8);
    let level = otsu_level(&smoothed);
    map_colors(&smoothed, |Luma([value])| {
        if value > level { Luma([255u8]) } else { Luma([0u8]) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binarize_outputs_two_levels() {
        let gradient = GrayImage::from_fn(64, 16, |x, _| Luma([(x * 4) as u8]));
        let binary = binarize(&gradient);
        assert_eq!(binary.dimensions(), (64, 16));
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(binary.get_pixel(0, 8)[0], 0);
        assert_eq!(binary.get_pixel(63, 8)[0], 255);
    }
}
