use super::align::{AlignmentResult, align};
use crate::core::error::ShapeMismatch;
use crate::core::models::atom_set::AtomSet;
use crate::core::models::transform::AlignmentTransform;
use crate::core::utils::geometry::random_rotation_matrix;
use crate::engine::classify::effective_labels;
use crate::engine::config::{AlignConfig, ConvergenceCriterion};
use crate::engine::error::AlignError;
use crate::engine::progress::ProgressReporter;
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, instrument};

/// Largest per-axis displacement drawn for a random shift.
const MAX_RANDOM_SHIFT: f64 = 3.0;

/// Tolerance on RMSD and on every aligned coordinate for a round trip.
pub const ROUND_TRIP_TOLERANCE: f64 = 1.0e-6;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Resort {
    #[default]
    Random,
    Identity,
    /// Used as the transform's atom map directly.
    Explicit(Vec<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Shift {
    /// Uniform on `[-3, 3)` per axis.
    #[default]
    Random,
    Zero,
    Explicit(Vector3<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rotate {
    /// Arvo random rotation; `deflection = 1.0` is uniform over rotations,
    /// `0.0` is the identity.
    Random { deflection: f64 },
    Identity,
    Explicit(Matrix3<f64>),
}

impl Default for Rotate {
    fn default() -> Self {
        Self::Random { deflection: 1.0 }
    }
}

/// How to build a synthetic transform for round-trip testing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrambleSpec {
    pub resort: Resort,
    pub shift: Shift,
    pub rotate: Rotate,
    pub mirror: bool,
}

impl ScrambleSpec {
    /// Whether the scramble reorders atoms, so that aligning back needs the
    /// correspondence search.
    pub fn resorts(&self) -> bool {
        !matches!(self.resort, Resort::Identity)
    }
}

/// Draws an [`AlignmentTransform`] for `natom` atoms as described by `spec`.
///
/// # Errors
///
/// Returns [`AlignError::DimensionMismatch`] if an explicit atom map has the
/// wrong length, or [`AlignError::Transform`] if an explicit map is not a
/// permutation or an explicit rotation is not proper.
pub fn compute_scramble(
    natom: usize,
    spec: &ScrambleSpec,
    rng: &mut impl Rng,
) -> Result<AlignmentTransform, AlignError> {
    let atom_map = match &spec.resort {
        Resort::Random => {
            let mut map: Vec<usize> = (0..natom).collect();
            map.shuffle(rng);
            map
        }
        Resort::Identity => (0..natom).collect(),
        Resort::Explicit(map) => {
            ShapeMismatch::check("scramble atom map", natom, map.len())?;
            map.clone()
        }
    };

    let shift = match spec.shift {
        Shift::Random => Vector3::from_fn(|_, _| rng.gen_range(-MAX_RANDOM_SHIFT..MAX_RANDOM_SHIFT)),
        Shift::Zero => Vector3::zeros(),
        Shift::Explicit(v) => v,
    };

    let rotation = match spec.rotate {
        Rotate::Random { deflection } => random_rotation_matrix(deflection, rng),
        Rotate::Identity => Matrix3::identity(),
        Rotate::Explicit(m) => m,
    };

    Ok(AlignmentTransform::new(shift, rotation, atom_map, spec.mirror)?)
}

/// Produces a moving set from `reference` by running a freshly drawn
/// transform in reverse. Applying the returned transform forward to the
/// moving set gives back `reference`.
pub fn scramble(
    reference: &AtomSet,
    spec: &ScrambleSpec,
    rng: &mut impl Rng,
) -> Result<(AtomSet, AlignmentTransform), AlignError> {
    let transform = compute_scramble(reference.len(), spec, rng)?;

    let coords = transform.apply_to_points(reference.coords(), true)?;
    let labels = transform.restore_atom_labels(reference.labels())?;
    let real = transform.restore_atom_labels(reference.real_flags())?;
    let mut moving = AtomSet::new(coords, labels)?.with_real_flags(real)?;
    if let Some(weights) = reference.weights() {
        moving = moving.with_weights(transform.restore_atom_labels(weights)?)?;
    }

    debug!(
        "Scrambled {} atoms (mirror = {}, atom map {:?}).",
        reference.len(),
        transform.mirror(),
        transform.atom_map()
    );
    Ok((moving, transform))
}

/// Scrambles `reference`, aligns the result back onto it and checks that the
/// reference is recovered.
///
/// The alignment runs with `base` except that `mols_align` is asserted,
/// `atoms_map` is set exactly when the scramble keeps the atom order, and
/// `run_mirror` follows `spec.mirror`.
///
/// # Errors
///
/// Returns [`AlignError::Verification`] when the RMSD is not near zero, an
/// aligned coordinate or label misses its reference, or a mirror was used
/// although the scramble did not mirror. Alignment errors propagate.
#[instrument(skip_all, name = "round_trip", fields(natom = reference.len(), mirror = spec.mirror))]
pub fn verify_round_trip(
    reference: &AtomSet,
    spec: &ScrambleSpec,
    base: &AlignConfig,
    rng: &mut impl Rng,
) -> Result<AlignmentResult, AlignError> {
    let (moving, _) = scramble(reference, spec, rng)?;
    let config = AlignConfig {
        atoms_map: !spec.resorts(),
        mols_align: ConvergenceCriterion::Exact,
        run_mirror: spec.mirror,
        ..base.clone()
    };
    let result = align(reference, &moving, &config, &ProgressReporter::new())?;

    if result.rmsd > ROUND_TRIP_TOLERANCE {
        return Err(AlignError::Verification(format!(
            "RMSD {:.3e} exceeds {:.0e}",
            result.rmsd, ROUND_TRIP_TOLERANCE
        )));
    }

    let aligned = result.aligned_set(&moving)?;
    let deviation = aligned
        .coords()
        .iter()
        .zip(reference.coords())
        .map(|(a, r)| (a - r).amax())
        .fold(0.0, f64::max);
    if deviation > ROUND_TRIP_TOLERANCE {
        return Err(AlignError::Verification(format!(
            "aligned geometry deviates from the reference by {deviation:.3e}"
        )));
    }

    if effective_labels(&aligned, config.generic_ghosts) != effective_labels(reference, config.generic_ghosts) {
        return Err(AlignError::Verification(
            "aligned atom labels do not match the reference order".to_string(),
        ));
    }

    if result.transform.mirror() && !spec.mirror {
        return Err(AlignError::Verification(
            "alignment used a mirror image that the scramble did not".to_string(),
        ));
    }

    debug!("Round trip recovered the reference after {} trials.", result.trials);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn s22_12() -> AtomSet {
        AtomSet::from_rows([
            ("C", [-1.2471894, -1.1718212, -0.6961388]),
            ("C", [-1.2471894, -1.1718212, 0.6961388]),
            ("N", [-0.2589510, -1.7235771, 1.4144796]),
            ("C", [0.7315327, -2.2652221, 0.6967288]),
            ("C", [0.7315327, -2.2652221, -0.6967288]),
            ("N", [-0.2589510, -1.7235771, -1.4144796]),
            ("H", [-2.0634363, -0.7223199, -1.2472797]),
            ("H", [-2.0634363, -0.7223199, 1.2472797]),
            ("H", [1.5488004, -2.7128282, 1.2475604]),
            ("H", [1.5488004, -2.7128282, -1.2475604]),
            ("C", [-0.3380031, 2.0800608, 1.1300452]),
            ("C", [0.8540254, 1.3593471, 1.1306308]),
            ("N", [1.4701787, 0.9907598, 0.0000000]),
            ("C", [0.8540254, 1.3593471, -1.1306308]),
            ("C", [-0.3380031, 2.0800608, -1.1300452]),
            ("N", [-0.9523059, 2.4528836, 0.0000000]),
            ("H", [-0.8103758, 2.3643033, 2.0618643]),
            ("H", [1.3208583, 1.0670610, 2.0623986]),
            ("H", [1.3208583, 1.0670610, -2.0623986]),
            ("H", [-0.8103758, 2.3643033, -2.0618643]),
        ])
    }

    fn chiral() -> AtomSet {
        AtomSet::from_rows([
            ("C", [0.000000, 0.000000, 0.000000]),
            ("Br", [0.000000, 0.000000, 1.949834]),
            ("F", [1.261262, 0.000000, -0.451181]),
            ("Cl", [-0.845465, 1.497406, -0.341118]),
            ("H", [-0.524489, -0.897662, -0.376047]),
        ])
    }

    fn pruned() -> AlignConfig {
        AlignConfig {
            uno_cutoff: Some(1.0e-3),
            ..AlignConfig::default()
        }
    }

    #[test]
    fn identity_scramble_is_the_identity_transform() {
        let spec = ScrambleSpec {
            resort: Resort::Identity,
            shift: Shift::Zero,
            rotate: Rotate::Identity,
            mirror: false,
        };
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(compute_scramble(4, &spec, &mut rng).unwrap(), AlignmentTransform::identity(4));
    }

    #[test]
    fn explicit_scramble_is_used_verbatim() {
        let rotation = Matrix3::new(
            0.39078817, -0.9101616, -0.13744259, 0.36750838, 0.29117465, -0.88326379, 0.84393258, 0.29465774,
            0.44827962,
        );
        let shift = Vector3::new(-1.82564537, 2.25391838, -2.56591963);
        let spec = ScrambleSpec {
            resort: Resort::Explicit(vec![1, 2, 0, 3]),
            shift: Shift::Explicit(shift),
            rotate: Rotate::Explicit(rotation),
            mirror: false,
        };
        let transform = compute_scramble(4, &spec, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(transform.atom_map(), &[1, 2, 0, 3]);
        assert_eq!(*transform.shift(), shift);
        assert_eq!(*transform.rotation(), rotation);

        let short = ScrambleSpec {
            resort: Resort::Explicit(vec![1, 0]),
            ..spec
        };
        assert!(matches!(
            compute_scramble(4, &short, &mut StdRng::seed_from_u64(0)),
            Err(AlignError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn random_shift_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let transform = compute_scramble(3, &ScrambleSpec::default(), &mut rng).unwrap();
            assert!(transform.shift().iter().all(|c| (-3.0..3.0).contains(c)));
            assert!((transform.rotation().determinant() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn scrambled_set_maps_back_onto_the_reference() {
        let reference = chiral();
        let spec = ScrambleSpec {
            mirror: true,
            ..ScrambleSpec::default()
        };
        let (moving, transform) = scramble(&reference, &spec, &mut StdRng::seed_from_u64(3)).unwrap();
        let back = transform.apply_to_points(moving.coords(), false).unwrap();
        for (a, r) in back.iter().zip(reference.coords()) {
            assert!((a - r).amax() < 1e-10);
        }
        assert_eq!(
            transform.apply_to_atom_labels(moving.labels()).unwrap(),
            reference.labels()
        );
    }

    #[test]
    fn dimer_descrambles_after_resorting() {
        let reference = s22_12();
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..5 {
            let result = verify_round_trip(&reference, &ScrambleSpec::default(), &pruned(), &mut rng).unwrap();
            assert!(!result.transform.mirror());
        }
    }

    #[test]
    fn dimer_descrambles_in_place() {
        let reference = s22_12();
        let spec = ScrambleSpec {
            resort: Resort::Identity,
            ..ScrambleSpec::default()
        };
        let mut rng = StdRng::seed_from_u64(99);
        let (moving, scrambled) = scramble(&reference, &spec, &mut rng).unwrap();
        let config = AlignConfig {
            atoms_map: true,
            mols_align: ConvergenceCriterion::Exact,
            ..AlignConfig::default()
        };
        let result = align(&reference, &moving, &config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.trials, 1);
        assert!((result.transform.rotation() - scrambled.rotation()).amax() < 1e-8);
        assert!((result.transform.shift() - scrambled.shift()).amax() < 1e-8);

        for _ in 0..3 {
            verify_round_trip(&reference, &spec, &AlignConfig::default(), &mut rng).unwrap();
        }
    }

    #[test]
    fn fixed_frame_round_trip_needs_no_motion() {
        let spec = ScrambleSpec {
            resort: Resort::Identity,
            shift: Shift::Zero,
            rotate: Rotate::Identity,
            mirror: false,
        };
        let result =
            verify_round_trip(&s22_12(), &spec, &AlignConfig::default(), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(result.rmsd, 0.0);
        assert_eq!(*result.transform.rotation(), Matrix3::identity());
    }

    #[test]
    fn chiral_molecule_descrambles_with_and_without_mirror() {
        let reference = chiral();
        let mut rng = StdRng::seed_from_u64(5);
        verify_round_trip(&reference, &ScrambleSpec::default(), &AlignConfig::default(), &mut rng).unwrap();
        let in_order = ScrambleSpec {
            resort: Resort::Identity,
            ..ScrambleSpec::default()
        };
        verify_round_trip(&reference, &in_order, &AlignConfig::default(), &mut rng).unwrap();

        let mirrored = ScrambleSpec {
            mirror: true,
            ..ScrambleSpec::default()
        };
        for _ in 0..5 {
            let result = verify_round_trip(&reference, &mirrored, &AlignConfig::default(), &mut rng).unwrap();
            assert!(result.transform.mirror());
            assert!(result.mirror_searched);
        }
    }

    #[test]
    fn mirrored_scramble_without_mirror_search_fails_verification() {
        let reference = chiral();
        let spec = ScrambleSpec {
            mirror: true,
            ..ScrambleSpec::default()
        };
        let (moving, _) = scramble(&reference, &spec, &mut StdRng::seed_from_u64(8)).unwrap();
        let result = align(&reference, &moving, &AlignConfig::default(), &ProgressReporter::new()).unwrap();
        assert!(result.rmsd > 0.1);
    }
}
