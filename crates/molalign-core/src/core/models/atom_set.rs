use super::label::AtomLabel;
use crate::core::error::{ShapeMismatch, WeightError, check_weights};
use crate::core::utils::geometry::mirror_points;
use nalgebra::Point3;

/// A caller-owned set of labeled points handed to the aligner.
///
/// Holds the Cartesian coordinates of every atom together with its invariant
/// label, whether it is a real atom or a ghost, and optional per-atom weights.
/// The aligner only ever reads an `AtomSet`.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomSet {
    coords: Vec<Point3<f64>>,
    labels: Vec<AtomLabel>,
    real: Vec<bool>,
    weights: Option<Vec<f64>>,
}

impl AtomSet {
    /// Creates a set of real atoms from coordinates and labels.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeMismatch`] if `labels` and `coords` differ in length.
    pub fn new(coords: Vec<Point3<f64>>, labels: Vec<AtomLabel>) -> Result<Self, ShapeMismatch> {
        ShapeMismatch::check("atom labels", coords.len(), labels.len())?;
        let real = vec![true; coords.len()];
        Ok(Self {
            coords,
            labels,
            real,
            weights: None,
        })
    }

    /// Creates a set in which every atom carries the same empty label.
    ///
    /// Useful when the caller already knows the atom ordering corresponds and
    /// has no labels at hand.
    pub fn from_coords(coords: Vec<Point3<f64>>) -> Self {
        let n = coords.len();
        Self {
            coords,
            labels: vec![AtomLabel::default(); n],
            real: vec![true; n],
            weights: None,
        }
    }

    /// Builds a set from `(label, x, y, z)` rows.
    pub fn from_rows<L: Into<AtomLabel>>(rows: impl IntoIterator<Item = (L, [f64; 3])>) -> Self {
        let (labels, coords): (Vec<AtomLabel>, Vec<Point3<f64>>) = rows
            .into_iter()
            .map(|(label, [x, y, z])| (label.into(), Point3::new(x, y, z)))
            .unzip();
        let n = coords.len();
        Self {
            coords,
            labels,
            real: vec![true; n],
            weights: None,
        }
    }

    /// Marks which atoms are real (`true`) and which are ghosts (`false`).
    pub fn with_real_flags(mut self, real: Vec<bool>) -> Result<Self, ShapeMismatch> {
        ShapeMismatch::check("real/ghost flags", self.coords.len(), real.len())?;
        self.real = real;
        Ok(self)
    }

    /// Attaches per-atom weights for weighted superposition.
    ///
    /// # Errors
    ///
    /// Returns [`WeightError`] unless there is one finite, non-negative weight
    /// per atom and the weights sum to a positive value.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self, WeightError> {
        check_weights(self.coords.len(), &weights)?;
        self.weights = Some(weights);
        Ok(self)
    }

    /// The same atoms with every coordinate mirrored through the xz plane.
    pub fn mirrored(&self) -> Self {
        Self {
            coords: mirror_points(&self.coords),
            ..self.clone()
        }
    }

    /// The same atoms placed at new coordinates.
    pub fn with_coords(&self, coords: Vec<Point3<f64>>) -> Result<Self, ShapeMismatch> {
        ShapeMismatch::check("coordinates", self.coords.len(), coords.len())?;
        Ok(Self {
            coords,
            ..self.clone()
        })
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn coords(&self) -> &[Point3<f64>] {
        &self.coords
    }

    pub fn labels(&self) -> &[AtomLabel] {
        &self.labels
    }

    pub fn real_flags(&self) -> &[bool] {
        &self.real
    }

    pub fn is_ghost(&self, index: usize) -> bool {
        !self.real[index]
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }
}
