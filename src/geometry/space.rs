/// Marker trait for the coordinate spaces a [`Rect`](super::Rect) can live in.
pub trait Space {
    /// Short name used by `Debug` output.
    const NAME: &'static str;
}

/// Coordinates with no particular space attached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Untyped;

/// Pixels of the image handed to the detector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Original;

/// Pixels of the resized, padded canvas fed to the scoring module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Canvas;

/// Cells of a scoring module's output grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Grid;

impl Space for Untyped {
    const NAME: &'static str = "Rect";
}

impl Space for Original {
    const NAME: &'static str = "OriginalRect";
}

impl Space for Canvas {
    const NAME: &'static str = "CanvasRect";
}

impl Space for Grid {
    const NAME: &'static str = "GridRect";
}
