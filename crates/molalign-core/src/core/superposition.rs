use crate::core::error::{ShapeMismatch, WeightError, check_weights};
use crate::core::utils::geometry::{calculate_weighted_rmsd, centroid};
use nalgebra::{Matrix3, Point3, Vector3};
use thiserror::Error;

/// Point sets closer than this everywhere are treated as already superimposed.
const COINCIDENT_TOLERANCE: f64 = 1.0e-8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SuperpositionError {
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
    #[error(transparent)]
    Weights(#[from] WeightError),
    #[error("Superposition input contains non-finite coordinates")]
    NonFiniteCoordinates,
    #[error("RMSD of the superposed points is not finite")]
    NonFiniteRmsd,
}

/// Optimal rigid motion carrying a moving point set onto a reference.
///
/// Uses the row-vector convention shared with
/// [`AlignmentTransform`](crate::core::models::transform::AlignmentTransform):
/// an aligned point is `(moving - shift) · rotation`.
#[derive(Debug, Clone, PartialEq)]
pub struct Superposition {
    pub shift: Vector3<f64>,
    pub rotation: Matrix3<f64>,
    pub rmsd: f64,
}

impl Superposition {
    pub fn identity() -> Self {
        Self {
            shift: Vector3::zeros(),
            rotation: Matrix3::identity(),
            rmsd: 0.0,
        }
    }

    /// Applies the motion to a single moving point.
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.transpose() * (p.coords - self.shift))
    }
}

/// Kabsch least-squares superposition of `moving` onto `reference`.
///
/// Both sets must already be in correspondence (row `i` of one matches row `i`
/// of the other). The returned rotation is always proper (`det = +1`): when
/// the unconstrained optimum is a reflection, the axis of the smallest
/// singular value is flipped. The RMSD is measured on the aligned points
/// rather than recovered from the singular values.
///
/// Degenerate geometries (a single atom, collinear atoms) are not errors; any
/// valid minimizing rotation is returned.
///
/// # Arguments
///
/// * `reference` - Fixed points.
/// * `moving` - Points to be moved onto `reference`.
/// * `weights` - Optional per-row weights; uniform when `None`.
///
/// # Errors
///
/// * [`SuperpositionError::Shape`] for empty input or mismatched lengths.
/// * [`SuperpositionError::Weights`] for negative or non-finite weights, or
///   weights that sum to zero.
/// * [`SuperpositionError::NonFiniteCoordinates`] for NaN or infinite input.
/// * [`SuperpositionError::NonFiniteRmsd`] when the fit breaks down numerically.
pub fn kabsch(
    reference: &[Point3<f64>],
    moving: &[Point3<f64>],
    weights: Option<&[f64]>,
) -> Result<Superposition, SuperpositionError> {
    if reference.is_empty() {
        return Err(ShapeMismatch::new("superposition points", 1, 0).into());
    }
    ShapeMismatch::check("superposition points", reference.len(), moving.len())?;
    if let Some(w) = weights {
        check_weights(reference.len(), w)?;
    }
    if reference
        .iter()
        .chain(moving)
        .any(|p| p.coords.iter().any(|c| !c.is_finite()))
    {
        return Err(SuperpositionError::NonFiniteCoordinates);
    }

    let coincident = reference
        .iter()
        .zip(moving)
        .all(|(r, m)| (r - m).amax() <= COINCIDENT_TOLERANCE);
    if coincident {
        // The SVD of a rank-deficient covariance can return a spurious spin
        // about a symmetry axis; identical sets need no motion at all.
        let rmsd = finite_rmsd(reference, moving, weights)?;
        return Ok(Superposition {
            rmsd,
            ..Superposition::identity()
        });
    }

    let ref_center = centroid(reference, weights);
    let mov_center = centroid(moving, weights);

    let mut covariance = Matrix3::zeros();
    for (i, (r, m)) in reference.iter().zip(moving).enumerate() {
        let w = weights.map_or(1.0, |w| w[i]);
        covariance += (m.coords - mov_center) * (r.coords - ref_center).transpose() * w;
    }

    let to_reference = optimal_rotation(&covariance);
    let rotation = to_reference.transpose();
    let shift = mov_center - rotation * ref_center;

    let motion = Superposition {
        shift,
        rotation,
        rmsd: 0.0,
    };
    let aligned: Vec<Point3<f64>> = moving.iter().map(|m| motion.apply(m)).collect();
    let rmsd = finite_rmsd(reference, &aligned, weights)?;

    Ok(Superposition { rmsd, ..motion })
}

fn finite_rmsd(
    reference: &[Point3<f64>],
    aligned: &[Point3<f64>],
    weights: Option<&[f64]>,
) -> Result<f64, SuperpositionError> {
    calculate_weighted_rmsd(reference, aligned, weights)
        .filter(|rmsd| rmsd.is_finite())
        .ok_or(SuperpositionError::NonFiniteRmsd)
}

/// Proper rotation `Q` maximizing `tr(Q·H)` for `H = Σ m ⊗ r`, so `Q·m ≈ r`.
fn optimal_rotation(covariance: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = covariance.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix3::identity();
    };
    let v = v_t.transpose();
    let u_t = u.transpose();

    let d = if (v * u_t).determinant() < 0.0 { -1.0 } else { 1.0 };
    let smallest = svd.singular_values.imin();
    let mut correction = Matrix3::identity();
    correction[(smallest, smallest)] = d;

    v * correction * u_t
}
