#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::panel::Panel;

/// A point in model (figure canvas) space or original-image space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Half-open containment: the right and bottom edges belong to the neighbour.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.right() && p.y < self.bottom()
    }

    pub fn scaled(&self, factor: f64) -> Rect {
        Rect::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Mapping between original-image space and a transient view space
/// (an edit modal, a zoomed viewport).
///
/// `view = original * scale + offset`. Only original-image coordinates are
/// ever persisted; a view transform lives exactly as long as the view does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self { scale: 1.0, offset_x: 0.0, offset_y: 0.0 }
    }
}

impl ViewTransform {
    pub fn new(scale: f64, offset_x: f64, offset_y: f64) -> Self {
        Self { scale, offset_x, offset_y }
    }

    /// Transform that shows an image of `image_w`×`image_h` fitted and
    /// centred in a `view_w`×`view_h` viewport.
    pub fn fit(image_w: f64, image_h: f64, view_w: f64, view_h: f64) -> Self {
        if image_w <= 0.0 || image_h <= 0.0 {
            return Self::default();
        }
        let scale = (view_w / image_w).min(view_h / image_h);
        Self {
            scale,
            offset_x: (view_w - image_w * scale) * 0.5,
            offset_y: (view_h - image_h * scale) * 0.5,
        }
    }

    pub fn to_view(&self, p: Point) -> Point {
        Point::new(p.x * self.scale + self.offset_x, p.y * self.scale + self.offset_y)
    }

    /// Inverse of [`ViewTransform::to_view`]. A zero scale maps everything to the offset origin.
    pub fn to_original(&self, p: Point) -> Point {
        if self.scale == 0.0 {
            return Point::default();
        }
        Point::new(
            (p.x - self.offset_x) / self.scale,
            (p.y - self.offset_y) / self.scale,
        )
    }

    pub fn length_to_original(&self, len: f64) -> f64 {
        if self.scale == 0.0 { 0.0 } else { len / self.scale }
    }
}

/// Map a pointer position (in the host's client coordinates) onto the figure
/// canvas model.
///
/// `element` is where the canvas is displayed on screen; `canvas_w`/`canvas_h`
/// are its backing dimensions. The displayed element may be CSS-scaled, so the
/// two axes are mapped independently.
pub fn pointer_to_model(pointer: Point, element: Rect, canvas_w: f64, canvas_h: f64) -> Point {
    let sx = if element.width > 0.0 { canvas_w / element.width } else { 1.0 };
    let sy = if element.height > 0.0 { canvas_h / element.height } else { 1.0 };
    Point::new((pointer.x - element.x) * sx, (pointer.y - element.y) * sy)
}

/// Topmost panel (highest `order`) whose frame contains `p`.
pub fn hit_test(panels: &[Panel], p: Point) -> Option<Uuid> {
    panels
        .iter()
        .filter(|panel| panel.geometry.frame.contains(p))
        .max_by_key(|panel| panel.order)
        .map(|panel| panel.id)
}

/// Round `value` to the nearest multiple of `grid`. Non-positive grids disable snapping.
pub fn snap(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 || !grid.is_finite() {
        return value;
    }
    (value / grid).round() * grid
}

pub fn snap_point(p: Point, grid: f64) -> Point {
    Point::new(snap(p.x, grid), snap(p.y, grid))
}
