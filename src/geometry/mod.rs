//! Rectangles, dimensions and coordinate spaces.
//!
//! A [`Rect`] is tagged with the coordinate space it lives in. The detector
//! juggles four of them per detection, and the tag keeps arithmetic between
//! e.g. an output-grid rectangle and an original-image rectangle from
//! compiling. Conversions between spaces are explicit via [`Rect::cast`].

mod space;

use std::fmt;
use std::marker::PhantomData;

pub use space::{Canvas, Grid, Original, Space, Untyped};

/// Rectangle in original image pixels.
pub type OriginalRect = Rect<Original>;
/// Rectangle in resized, padded network-input (canvas) pixels.
pub type CanvasRect = Rect<Canvas>;
/// Rectangle in output-grid cells.
pub type GridRect = Rect<Grid>;

/// Height and width of an image, canvas or grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dims {
    pub height: usize,
    pub width: usize,
}

impl Dims {
    /// Creates dimensions from height and width.
    #[inline]
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Returns `true` if both dimensions are at least those of `other`.
    #[inline]
    pub fn fits(&self, other: Dims) -> bool {
        self.height >= other.height && self.width >= other.width
    }

    /// Returns `height * width`.
    #[inline]
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// Returns the largest of the two dimensions.
    #[inline]
    pub fn max_dim(&self) -> usize {
        self.height.max(self.width)
    }

    /// Multiplies both dimensions by `factor`, truncating toward zero.
    pub fn scaled(&self, factor: f64) -> Dims {
        Dims::new(
            (self.height as f64 * factor) as usize,
            (self.width as f64 * factor) as usize,
        )
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

impl From<(usize, usize)> for Dims {
    fn from((height, width): (usize, usize)) -> Self {
        Dims::new(height, width)
    }
}

/// Axis-aligned rectangle stored as top-left corner plus size.
///
/// Height and width are expected to be non-negative; operations that resize
/// a rectangle with positive factors preserve this.
pub struct Rect<S = Untyped> {
    pub top: f32,
    pub left: f32,
    pub height: f32,
    pub width: f32,
    space: PhantomData<S>,
}

impl<S> Clone for Rect<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Rect<S> {}

impl<S> PartialEq for Rect<S> {
    fn eq(&self, other: &Self) -> bool {
        self.top == other.top
            && self.left == other.left
            && self.height == other.height
            && self.width == other.width
    }
}

impl<S> Default for Rect<S> {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

impl<S: Space> fmt::Debug for Rect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::NAME)
            .field("top", &self.top)
            .field("left", &self.left)
            .field("height", &self.height)
            .field("width", &self.width)
            .finish()
    }
}

impl<S> fmt::Display for Rect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.height, self.width, self.top, self.left
        )
    }
}

impl<S> Rect<S> {
    /// Creates a rectangle from its top-left corner and size.
    #[inline]
    pub const fn new(top: f32, left: f32, height: f32, width: f32) -> Self {
        Self {
            top,
            left,
            height,
            width,
            space: PhantomData,
        }
    }

    /// Creates a rectangle covering `dims` anchored at the origin.
    pub fn from_dims(dims: Dims) -> Self {
        Self::new(0.0, 0.0, dims.height as f32, dims.width as f32)
    }

    /// Creates a rectangle from its top-left and bottom-right corners.
    pub fn from_corners(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        Self::new(top, left, (bottom - top).max(0.0), (right - left).max(0.0))
    }

    /// Reinterprets this rectangle in another coordinate space.
    #[inline]
    pub fn cast<T>(self) -> Rect<T> {
        Rect::new(self.top, self.left, self.height, self.width)
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    #[inline]
    pub fn hcenter(&self) -> f32 {
        self.top + self.height / 2.0
    }

    #[inline]
    pub fn wcenter(&self) -> f32 {
        self.left + self.width / 2.0
    }

    /// Returns the center as `(h, w)`.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.hcenter(), self.wcenter())
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.height * self.width
    }

    /// Half of the diagonal length.
    pub fn radius(&self) -> f32 {
        let hh = self.height / 2.0;
        let hw = self.width / 2.0;
        (hh * hh + hw * hw).sqrt()
    }

    /// Returns the overlapping part of two rectangles, if any.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let top = self.top.max(other.top);
        let left = self.left.max(other.left);
        let bottom = self.bottom().min(other.bottom());
        let right = self.right().min(other.right());
        if bottom <= top || right <= left {
            return None;
        }
        Some(Self::from_corners(top, left, bottom, right))
    }

    /// Area of the intersection, zero when disjoint.
    pub fn intersection_area(&self, other: &Self) -> f32 {
        self.intersection(other).map_or(0.0, |r| r.area())
    }

    /// Area of the union.
    pub fn union_area(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    /// Intersection over union in `[0, 1]`.
    ///
    /// Symmetric; 1 for identical non-empty rectangles and 0 for disjoint
    /// ones. Two empty rectangles match with 0.
    pub fn match_ratio(&self, other: &Self) -> f32 {
        let union = self.union_area(other);
        if union <= 0.0 {
            return 0.0;
        }
        (self.intersection_area(other) / union).clamp(0.0, 1.0)
    }

    /// Euclidean distance between the two centers.
    pub fn center_distance(&self, other: &Self) -> f32 {
        let dh = self.hcenter() - other.hcenter();
        let dw = self.wcenter() - other.wcenter();
        (dh * dh + dw * dw).sqrt()
    }

    /// Absolute vertical distance between centers.
    #[inline]
    pub fn center_h_distance(&self, other: &Self) -> f32 {
        (self.hcenter() - other.hcenter()).abs()
    }

    /// Absolute horizontal distance between centers.
    #[inline]
    pub fn center_w_distance(&self, other: &Self) -> f32 {
        (self.wcenter() - other.wcenter()).abs()
    }

    /// Vertical center distance relative to this rectangle's height.
    pub fn relative_h_distance(&self, other: &Self) -> f32 {
        if self.height <= 0.0 {
            return f32::INFINITY;
        }
        self.center_h_distance(other) / self.height
    }

    /// Horizontal center distance relative to this rectangle's width.
    pub fn relative_w_distance(&self, other: &Self) -> f32 {
        if self.width <= 0.0 {
            return f32::INFINITY;
        }
        self.center_w_distance(other) / self.width
    }

    /// Scales the rectangle about its own center.
    ///
    /// For positive factors the result never has negative size.
    pub fn scale_centered(&self, sh: f32, sw: f32) -> Self {
        let add_h = self.height * (sh - 1.0);
        let add_w = self.width * (sw - 1.0);
        Self::new(
            self.top - add_h / 2.0,
            self.left - add_w / 2.0,
            (self.height + add_h).max(0.0),
            (self.width + add_w).max(0.0),
        )
    }

    /// Sets the width to `height * w_over_h`, keeping the horizontal center.
    pub fn with_aspect(&self, w_over_h: f32) -> Self {
        let width = (self.height * w_over_h).max(0.0);
        Self::new(
            self.top,
            self.left - (width - self.width) / 2.0,
            self.height,
            width,
        )
    }

    /// Translates the rectangle.
    #[inline]
    pub fn shifted(&self, dh: f32, dw: f32) -> Self {
        Self::new(self.top + dh, self.left + dw, self.height, self.width)
    }

    /// Multiplies every coordinate, mapping into a space with a different
    /// pixel pitch.
    #[inline]
    pub fn rescaled(&self, fh: f32, fw: f32) -> Self {
        Self::new(
            self.top * fh,
            self.left * fw,
            self.height * fh,
            self.width * fw,
        )
    }

    /// Returns `true` if the rectangle lies entirely inside `[0, dims)`.
    pub fn is_within(&self, dims: Dims) -> bool {
        self.top >= 0.0
            && self.left >= 0.0
            && self.bottom() <= dims.height as f32
            && self.right() <= dims.width as f32
    }

    /// Returns `true` if every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.top.is_finite()
            && self.left.is_finite()
            && self.height.is_finite()
            && self.width.is_finite()
    }
}
