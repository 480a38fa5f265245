use nalgebra::{Matrix3, Point3, Vector3};
use rand::Rng;
use std::f64::consts::PI;

/// Index of the Cartesian axis inverted by a mirror operation (y).
pub const MIRROR_AXIS: usize = 1;

pub fn mirror_point(p: &Point3<f64>) -> Point3<f64> {
    let mut m = *p;
    m[MIRROR_AXIS] = -m[MIRROR_AXIS];
    m
}

pub fn mirror_points(points: &[Point3<f64>]) -> Vec<Point3<f64>> {
    points.iter().map(mirror_point).collect()
}

/// The reflection matrix matching [`mirror_point`].
pub fn mirror_matrix() -> Matrix3<f64> {
    let mut m = Matrix3::identity();
    m[(MIRROR_AXIS, MIRROR_AXIS)] = -1.0;
    m
}

/// Weighted centroid; uniform weights when `weights` is `None`.
///
/// Callers guarantee `points` is non-empty and `weights` has matching length
/// and a positive sum.
pub fn centroid(points: &[Point3<f64>], weights: Option<&[f64]>) -> Vector3<f64> {
    match weights {
        Some(w) => {
            let total: f64 = w.iter().sum();
            let sum = points
                .iter()
                .zip(w)
                .fold(Vector3::zeros(), |acc, (p, &wi)| acc + p.coords * wi);
            sum / total
        }
        None => {
            let sum = points
                .iter()
                .fold(Vector3::zeros(), |acc, p| acc + p.coords);
            sum / points.len() as f64
        }
    }
}

pub fn calculate_weighted_rmsd(
    coords1: &[Point3<f64>],
    coords2: &[Point3<f64>],
    weights: Option<&[f64]>,
) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    match weights {
        Some(w) if w.len() != coords1.len() => None,
        Some(w) => {
            let total: f64 = w.iter().sum();
            if total <= 0.0 {
                return None;
            }
            let squared_dist_sum: f64 = coords1
                .iter()
                .zip(coords2)
                .zip(w)
                .map(|((p1, p2), &wi)| wi * (p1 - p2).norm_squared())
                .sum();
            Some((squared_dist_sum / total).sqrt())
        }
        None => {
            let n = coords1.len() as f64;
            let squared_dist_sum: f64 = coords1
                .iter()
                .zip(coords2)
                .map(|(p1, p2)| (p1 - p2).norm_squared())
                .sum();
            Some((squared_dist_sum / n).sqrt())
        }
    }
}

/// Coulomb-like sum `Σ z_i z_j / r_ij` with caller-supplied pseudo charges.
///
/// Invariant under rigid motion, reflection and any permutation that carries
/// charges along with their atoms. Coincident pairs are skipped.
pub fn pseudo_nuclear_repulsion(charges: &[f64], coords: &[Point3<f64>]) -> f64 {
    let mut energy = 0.0;
    for i in 0..coords.len() {
        for j in 0..i {
            let dist = (coords[i] - coords[j]).norm();
            if dist > f64::EPSILON {
                energy += charges[i] * charges[j] / dist;
            }
        }
    }
    energy
}

/// Random proper rotation following Arvo, "Fast Random Rotation Matrices"
/// (Graphics Gems III).
///
/// `deflection` scales the randomness: `0.0` yields the identity, `0.1` a
/// small perturbation and `1.0` a uniformly random rotation.
pub fn random_rotation_matrix(deflection: f64, rng: &mut impl Rng) -> Matrix3<f64> {
    let x0: f64 = rng.r#gen();
    let x1: f64 = rng.r#gen();
    let x2: f64 = rng.r#gen();

    let theta = x0 * 2.0 * PI * deflection;
    let phi = x1 * 2.0 * PI;
    let z = x2 * 2.0 * deflection;

    let r = z.sqrt();
    let v = Vector3::new(phi.sin() * r, phi.cos() * r, (2.0 - z).sqrt());

    let (st, ct) = theta.sin_cos();
    let spin = Matrix3::new(ct, st, 0.0, -st, ct, 0.0, 0.0, 0.0, 1.0);

    // Arvo's matrix sends the pole to -z at zero deflection; the half turn
    // about z brings that back to the identity.
    let half_turn = Matrix3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0);
    half_turn * (v * v.transpose() - Matrix3::identity()) * spin
}

/// Whether `m` is orthogonal within `tolerance` (max abs entry of `mᵀm - I`).
pub fn is_orthogonal(m: &Matrix3<f64>, tolerance: f64) -> bool {
    (m.transpose() * m - Matrix3::identity()).amax() <= tolerance
}
