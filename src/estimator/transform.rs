use crate::landmarks::Point;
use ndarray::{array, Array1, Array2};
use serde::{Deserialize, Serialize};

/// Rotation + uniform scale + translation.
///
/// Stored as parameters rather than a free 2×3 matrix so the mapping can
/// never pick up shear or anisotropic scale:
///
/// ```text
/// [ s·cosθ  -s·sinθ  tx ]
/// [ s·sinθ   s·cosθ  ty ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTransform {
    scale: f64,
    /// Radians, counter-clockwise in a y-down pixel frame
    rotation: f64,
    tx: f64,
    ty: f64,
}

impl SimilarityTransform {
    pub fn new(scale: f64, rotation_radians: f64, tx: f64, ty: f64) -> Self {
        Self {
            scale,
            rotation: rotation_radians,
            tx,
            ty,
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Transform with the given scale/rotation that maps `from` exactly onto `to`.
    pub fn anchored(scale: f64, rotation_radians: f64, from: Point, to: Point) -> Self {
        let linear = Self::new(scale, rotation_radians, 0.0, 0.0).apply(from);
        Self::new(scale, rotation_radians, to.x - linear.x, to.y - linear.y)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn rotation_radians(&self) -> f64 {
        self.rotation
    }

    pub fn rotation_degrees(&self) -> f64 {
        self.rotation.to_degrees()
    }

    pub fn tx(&self) -> f64 {
        self.tx
    }

    pub fn ty(&self) -> f64 {
        self.ty
    }

    fn linear_terms(&self) -> (f64, f64) {
        (self.scale * self.rotation.cos(), self.scale * self.rotation.sin())
    }

    /// The 2×3 forward matrix.
    pub fn matrix(&self) -> [[f64; 3]; 2] {
        let (a, b) = self.linear_terms();
        [[a, -b, self.tx], [b, a, self.ty]]
    }

    pub fn to_array(&self) -> Array2<f64> {
        let (a, b) = self.linear_terms();
        array![[a, -b, self.tx], [b, a, self.ty]]
    }

    pub fn apply(&self, p: Point) -> Point {
        let (a, b) = self.linear_terms();
        Point::new(a * p.x - b * p.y + self.tx, b * p.x + a * p.y + self.ty)
    }

    /// Map an `n × 2` array of points.
    pub fn apply_many(&self, points: &Array2<f64>) -> Array2<f64> {
        let (a, b) = self.linear_terms();
        let linear = array![[a, -b], [b, a]];
        let translation: Array1<f64> = array![self.tx, self.ty];
        let mut mapped = points.dot(&linear.t());
        mapped += &translation;
        mapped
    }

    /// Shift the translation component.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.scale, self.rotation, self.tx + dx, self.ty + dy)
    }

    /// Inverse mapping, `None` when the scale is not strictly positive.
    pub fn inverse(&self) -> Option<Self> {
        if !(self.scale > 0.0) || !self.scale.is_finite() {
            return None;
        }
        let inv_scale = 1.0 / self.scale;
        let inv_rotation = -self.rotation;
        let back = Self::new(inv_scale, inv_rotation, 0.0, 0.0).apply(Point::new(self.tx, self.ty));
        Some(Self::new(inv_scale, inv_rotation, -back.x, -back.y))
    }
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::identity()
    }
}
