//! Normalized geometry shared by detectors and renderers.
//!
//! Points are stored in unit space with the origin at the upper-left corner
//! of the image. The origin convention of the target view is only chosen when
//! converting to pixels.

use serde::{Deserialize, Serialize};

/// Vertical origin of a pixel coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    UpperLeft,
    LowerLeft,
}

/// Size of the view (or image) a quad is rendered into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: f64,
    pub height: f64,
}

impl ViewSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn from_dimensions((width, height): (u32, u32)) -> Self {
        Self::new(width as f64, height as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point in unit space, both coordinates in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    /// Create a point, clamping both coordinates into `[0, 1]`.
    /// NaN collapses to 0.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn to_pixel(self, view: ViewSize, origin: Origin) -> PixelPoint {
        to_pixel_coordinates(self, view, origin)
    }

    pub fn from_pixel(point: PixelPoint, view: ViewSize, origin: Origin) -> Self {
        to_normalized_coordinates(point, view, origin)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Map a normalized point into the pixel space of `view`.
pub fn to_pixel_coordinates(point: NormalizedPoint, view: ViewSize, origin: Origin) -> PixelPoint {
    let y = match origin {
        Origin::UpperLeft => point.y,
        Origin::LowerLeft => 1.0 - point.y,
    };
    PixelPoint::new(point.x * view.width, y * view.height)
}

/// Inverse of [`to_pixel_coordinates`]. Points outside the view are clamped
/// to its edges; a degenerate view maps everything to 0.
pub fn to_normalized_coordinates(point: PixelPoint, view: ViewSize, origin: Origin) -> NormalizedPoint {
    let x = if view.width > 0.0 { point.x / view.width } else { 0.0 };
    let y = if view.height > 0.0 { point.y / view.height } else { 0.0 };
    let y = match origin {
        Origin::UpperLeft => y,
        Origin::LowerLeft => 1.0 - y,
    };
    NormalizedPoint::new(x, y)
}

/// Axis-aligned bounds of a quad, in unit space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl NormalizedRect {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Four corners of a detected region. The quad is not required to be axis
/// aligned or convex; renderers should draw it as an arbitrary path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingQuad {
    pub top_left: NormalizedPoint,
    pub top_right: NormalizedPoint,
    pub bottom_right: NormalizedPoint,
    pub bottom_left: NormalizedPoint,
}

impl BoundingQuad {
    pub fn new(
        top_left: NormalizedPoint,
        top_right: NormalizedPoint,
        bottom_right: NormalizedPoint,
        bottom_left: NormalizedPoint,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Build a quad from pixel corners of an image with an upper-left origin.
    /// Corners are given as top-left, top-right, bottom-right, bottom-left.
    pub fn from_pixel_corners(corners: [PixelPoint; 4], image: ViewSize) -> Self {
        let [tl, tr, br, bl] =
            corners.map(|corner| to_normalized_coordinates(corner, image, Origin::UpperLeft));
        Self::new(tl, tr, br, bl)
    }

    /// Axis-aligned quad covering a pixel rectangle
    pub fn from_pixel_rect(x: f64, y: f64, width: f64, height: f64, image: ViewSize) -> Self {
        Self::from_pixel_corners(
            [
                PixelPoint::new(x, y),
                PixelPoint::new(x + width, y),
                PixelPoint::new(x + width, y + height),
                PixelPoint::new(x, y + height),
            ],
            image,
        )
    }

    pub fn corners(&self) -> [NormalizedPoint; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// Corners in the pixel space of `view`, in the same order as [`Self::corners`]
    pub fn to_pixels(&self, view: ViewSize, origin: Origin) -> [PixelPoint; 4] {
        self.corners().map(|corner| corner.to_pixel(view, origin))
    }

    pub fn bounds(&self) -> NormalizedRect {
        let corners = self.corners();
        let mut rect = NormalizedRect {
            min_x: f64::MAX,
            min_y: f64::MAX,
            max_x: f64::MIN,
            max_y: f64::MIN,
        };
        for corner in corners {
            rect.min_x = rect.min_x.min(corner.x);
            rect.min_y = rect.min_y.min(corner.y);
            rect.max_x = rect.max_x.max(corner.x);
            rect.max_y = rect.max_y.max(corner.y);
        }
        rect
    }

    /// Mean of the four corners
    pub fn center(&self) -> NormalizedPoint {
        let corners = self.corners();
        let x = corners.iter().map(|c| c.x).sum::<f64>() / 4.0;
        let y = corners.iter().map(|c| c.y).sum::<f64>() / 4.0;
        NormalizedPoint::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{} != {}", a, b);
    }

    #[test]
    fn test_upper_left_conversion() {
        let view = ViewSize::new(200.0, 100.0);
        let pixel = NormalizedPoint::new(0.25, 0.1).to_pixel(view, Origin::UpperLeft);
        assert_close(pixel.x, 50.0);
        assert_close(pixel.y, 10.0);
    }

    #[test]
    fn test_lower_left_conversion_flips_y() {
        let view = ViewSize::new(200.0, 100.0);
        let pixel = NormalizedPoint::new(0.25, 0.1).to_pixel(view, Origin::LowerLeft);
        assert_close(pixel.x, 50.0);
        assert_close(pixel.y, 90.0);
    }

    #[test]
    fn test_round_trip_both_origins() {
        let views = [
            ViewSize::new(1.0, 1.0),
            ViewSize::new(640.0, 480.0),
            ViewSize::new(3.0, 4096.0),
        ];
        let samples = [0.0, 0.001, 0.25, 0.5, 0.73, 0.999, 1.0];

        for origin in [Origin::UpperLeft, Origin::LowerLeft] {
            for view in views {
                for &x in &samples {
                    for &y in &samples {
                        let p = NormalizedPoint::new(x, y);
                        let back = NormalizedPoint::from_pixel(p.to_pixel(view, origin), view, origin);
                        assert_close(back.x, p.x);
                        assert_close(back.y, p.y);
                    }
                }
            }
        }
    }

    #[test]
    fn test_pixel_round_trip() {
        let view = ViewSize::new(320.0, 240.0);
        let pixel = PixelPoint::new(17.5, 200.25);
        for origin in [Origin::UpperLeft, Origin::LowerLeft] {
            let back = to_pixel_coordinates(to_normalized_coordinates(pixel, view, origin), view, origin);
            assert_close(back.x, pixel.x);
            assert_close(back.y, pixel.y);
        }
    }

    #[test]
    fn test_new_clamps_out_of_range() {
        let p = NormalizedPoint::new(-0.5, 1.5);
        assert_eq!(p, NormalizedPoint { x: 0.0, y: 1.0 });
        assert_eq!(NormalizedPoint::new(f64::NAN, 0.5).x, 0.0);
    }

    #[test]
    fn test_degenerate_view_normalizes_to_zero() {
        let p = to_normalized_coordinates(PixelPoint::new(10.0, 10.0), ViewSize::new(0.0, 0.0), Origin::UpperLeft);
        assert_eq!(p, NormalizedPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_quad_from_pixel_rect() {
        let image = ViewSize::new(100.0, 50.0);
        let quad = BoundingQuad::from_pixel_rect(10.0, 5.0, 20.0, 10.0, image);
        assert_eq!(quad.top_left, NormalizedPoint::new(0.1, 0.1));
        assert_eq!(quad.bottom_right, NormalizedPoint::new(0.3, 0.3));

        let bounds = quad.bounds();
        assert_close(bounds.width(), 0.2);
        assert_close(bounds.height(), 0.2);
        let center = quad.center();
        assert_close(center.x, 0.2);
        assert_close(center.y, 0.2);
    }

    #[test]
    fn test_quad_to_pixels_lower_left() {
        let image = ViewSize::new(100.0, 100.0);
        let quad = BoundingQuad::from_pixel_rect(0.0, 0.0, 10.0, 20.0, image);
        let pixels = quad.to_pixels(image, Origin::LowerLeft);
        assert_close(pixels[0].y, 100.0);
        assert_close(pixels[2].x, 10.0);
        assert_close(pixels[2].y, 80.0);
    }

    #[test]
    fn test_rotated_quad_bounds() {
        let image = ViewSize::new(10.0, 10.0);
        let quad = BoundingQuad::from_pixel_corners(
            [
                PixelPoint::new(5.0, 0.0),
                PixelPoint::new(10.0, 5.0),
                PixelPoint::new(5.0, 10.0),
                PixelPoint::new(0.0, 5.0),
            ],
            image,
        );
        let bounds = quad.bounds();
        assert_close(bounds.min_x, 0.0);
        assert_close(bounds.max_x, 1.0);
        assert_close(bounds.min_y, 0.0);
        assert_close(bounds.max_y, 1.0);
    }
}
