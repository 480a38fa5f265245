use crate::core::error::ShapeMismatch;
use crate::core::utils::geometry::{is_orthogonal, mirror_matrix, mirror_point};
use nalgebra::{DMatrix, Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const ROTATION_TOLERANCE: f64 = 1.0e-6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("Atom map is not a permutation of 0..{len}: {atom_map:?}")]
    InvalidAtomMap { len: usize, atom_map: Vec<usize> },
    #[error("Rotation matrix is not orthogonal")]
    NonOrthogonalRotation,
    #[error("Rotation matrix is improper (determinant {determinant:.6}); use the mirror flag instead")]
    ImproperRotation { determinant: f64 },
}

/// Recipe carrying a moving atom set onto a reference: optional mirror,
/// translation, rotation and atom reordering.
///
/// In the forward direction a point is mirrored (y inverted) when `mirror` is
/// set, has `shift` subtracted, and is right-multiplied by `rotation`; rows are
/// then reordered so that row `i` of the result is the atom that sat at
/// `atom_map[i]` in the moving set. Every `apply_*` method uses that same
/// recipe, so quantities attached to one molecule stay mutually consistent
/// as long as a single transform is used for all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentTransform {
    shift: Vector3<f64>,
    rotation: Matrix3<f64>,
    atom_map: Vec<usize>,
    mirror: bool,
}

impl AlignmentTransform {
    /// Creates a transform after checking its invariants.
    ///
    /// # Errors
    ///
    /// * [`TransformError::InvalidAtomMap`] if `atom_map` is not a bijection on `0..len`.
    /// * [`TransformError::NonOrthogonalRotation`] / [`TransformError::ImproperRotation`]
    ///   if `rotation` is not a proper rotation.
    pub fn new(
        shift: Vector3<f64>,
        rotation: Matrix3<f64>,
        atom_map: Vec<usize>,
        mirror: bool,
    ) -> Result<Self, TransformError> {
        if !is_permutation(&atom_map) {
            return Err(TransformError::InvalidAtomMap {
                len: atom_map.len(),
                atom_map,
            });
        }
        if !is_orthogonal(&rotation, ROTATION_TOLERANCE) {
            return Err(TransformError::NonOrthogonalRotation);
        }
        let determinant = rotation.determinant();
        if determinant < 0.0 {
            return Err(TransformError::ImproperRotation { determinant });
        }
        Ok(Self {
            shift,
            rotation,
            atom_map,
            mirror,
        })
    }

    pub fn identity(natom: usize) -> Self {
        Self {
            shift: Vector3::zeros(),
            rotation: Matrix3::identity(),
            atom_map: (0..natom).collect(),
            mirror: false,
        }
    }

    pub fn shift(&self) -> &Vector3<f64> {
        &self.shift
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn atom_map(&self) -> &[usize] {
        &self.atom_map
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }

    pub fn natom(&self) -> usize {
        self.atom_map.len()
    }

    /// The full orthogonal map acting on attached vectors: `M·R`, where `M`
    /// is the y inversion when `mirror` is set.
    fn orthogonal_part(&self) -> Matrix3<f64> {
        if self.mirror {
            mirror_matrix() * self.rotation
        } else {
            self.rotation
        }
    }

    fn check_natom(&self, context: &'static str, found: usize) -> Result<(), ShapeMismatch> {
        ShapeMismatch::check(context, self.atom_map.len(), found)
    }

    /// Maps coordinates (a geometry or a displaced geometry).
    ///
    /// With `reverse = false` this applies mirror, shift, rotation and
    /// reordering. With `reverse = true` it applies the exact inverse: rows
    /// are returned to their original order, rotated by `rotationᵀ`, shifted
    /// back and finally mirrored.
    pub fn apply_to_points(
        &self,
        points: &[Point3<f64>],
        reverse: bool,
    ) -> Result<Vec<Point3<f64>>, ShapeMismatch> {
        self.check_natom("points", points.len())?;
        if reverse {
            let mut restored = vec![Point3::origin(); points.len()];
            for (i, p) in points.iter().enumerate() {
                let unrotated = self.rotation * p.coords + self.shift;
                let q = Point3::from(unrotated);
                restored[self.atom_map[i]] = if self.mirror { mirror_point(&q) } else { q };
            }
            Ok(restored)
        } else {
            Ok(self
                .atom_map
                .iter()
                .map(|&src| {
                    let p = &points[src];
                    let p = if self.mirror { mirror_point(p) } else { *p };
                    Point3::from(self.rotation.transpose() * (p.coords - self.shift))
                })
                .collect())
        }
    }

    /// Reorders per-atom labels (symbols, masses, charges, ...) by the atom map.
    pub fn apply_to_atom_labels<T: Clone>(&self, labels: &[T]) -> Result<Vec<T>, ShapeMismatch> {
        self.check_natom("atom labels", labels.len())?;
        Ok(self.atom_map.iter().map(|&src| labels[src].clone()).collect())
    }

    /// Inverse of [`apply_to_atom_labels`](Self::apply_to_atom_labels).
    pub fn restore_atom_labels<T: Clone>(&self, labels: &[T]) -> Result<Vec<T>, ShapeMismatch> {
        self.check_natom("atom labels", labels.len())?;
        let mut slots: Vec<Option<T>> = vec![None; labels.len()];
        for (i, label) in labels.iter().enumerate() {
            slots[self.atom_map[i]] = Some(label.clone());
        }
        // atom_map is a bijection, so every slot is filled.
        Ok(slots.into_iter().flatten().collect())
    }

    /// Rotates a vector attached to the whole molecule (e.g. a dipole).
    pub fn apply_to_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.orthogonal_part().transpose() * vector
    }

    /// Rotates then reorders one vector per atom (e.g. a gradient).
    pub fn apply_to_per_atom_vector(
        &self,
        vectors: &[Vector3<f64>],
    ) -> Result<Vec<Vector3<f64>>, ShapeMismatch> {
        self.check_natom("per-atom vectors", vectors.len())?;
        let q_t = self.orthogonal_part().transpose();
        Ok(self.atom_map.iter().map(|&src| q_t * vectors[src]).collect())
    }

    /// Transforms a `3N × 3N` tensor of 3×3 atom-pair blocks (e.g. a Hessian).
    ///
    /// Each block is rotated on both sides (`Rᵀ·B·R`) before the block rows and
    /// columns are reordered by the atom map.
    pub fn apply_to_pair_tensor(&self, tensor: &DMatrix<f64>) -> Result<DMatrix<f64>, ShapeMismatch> {
        let n = self.atom_map.len();
        ShapeMismatch::check("pair tensor rows", 3 * n, tensor.nrows())?;
        ShapeMismatch::check("pair tensor columns", 3 * n, tensor.ncols())?;
        let q = self.orthogonal_part();
        let q_t = q.transpose();

        let mut rotated = DMatrix::zeros(3 * n, 3 * n);
        for iat in 0..n {
            for jat in 0..n {
                let block: Matrix3<f64> = tensor.fixed_view::<3, 3>(3 * iat, 3 * jat).into_owned();
                rotated
                    .fixed_view_mut::<3, 3>(3 * iat, 3 * jat)
                    .copy_from(&(q_t * block * q));
            }
        }

        let mut aligned = DMatrix::zeros(3 * n, 3 * n);
        for (i, &src_i) in self.atom_map.iter().enumerate() {
            for (j, &src_j) in self.atom_map.iter().enumerate() {
                aligned
                    .fixed_view_mut::<3, 3>(3 * i, 3 * j)
                    .copy_from(&rotated.fixed_view::<3, 3>(3 * src_i, 3 * src_j));
            }
        }
        Ok(aligned)
    }

    /// Transforms nuclear derivatives of a vector quantity (e.g. dipole
    /// derivatives), laid out as a `3 × 3N` matrix whose rows are the x, y, z
    /// components of the vector.
    pub fn apply_to_vector_gradient(
        &self,
        derivatives: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, ShapeMismatch> {
        let n = self.atom_map.len();
        ShapeMismatch::check("vector gradient rows", 3, derivatives.nrows())?;
        ShapeMismatch::check("vector gradient columns", 3 * n, derivatives.ncols())?;
        let q = self.orthogonal_part();
        let q_t = q.transpose();

        let mut aligned = DMatrix::zeros(3, 3 * n);
        for (at, &src) in self.atom_map.iter().enumerate() {
            let block: Matrix3<f64> = derivatives.fixed_view::<3, 3>(0, 3 * src).into_owned();
            aligned
                .fixed_view_mut::<3, 3>(0, 3 * at)
                .copy_from(&(q_t * block * q));
        }
        Ok(aligned)
    }
}

impl fmt::Display for AlignmentTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(40);
        writeln!(f, "{rule}")?;
        writeln!(f, "{:^40}", "AlignmentTransform")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Mirror:   {}", self.mirror)?;
        writeln!(f, "Atom Map: {:?}", self.atom_map)?;
        writeln!(
            f,
            "Shift:    [{:.8}, {:.8}, {:.8}]",
            self.shift.x, self.shift.y, self.shift.z
        )?;
        writeln!(f, "Rotation:")?;
        for row in self.rotation.row_iter() {
            writeln!(f, "  [{:12.8}, {:12.8}, {:12.8}]", row[0], row[1], row[2])?;
        }
        write!(f, "{rule}")
    }
}

fn is_permutation(atom_map: &[usize]) -> bool {
    let mut seen = vec![false; atom_map.len()];
    for &idx in atom_map {
        match seen.get_mut(idx) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}
