use crate::core::models::atom_set::AtomSet;
use crate::core::models::label::AtomLabel;
use crate::core::models::transform::AlignmentTransform;
use crate::core::utils::geometry::{calculate_weighted_rmsd, mirror_points, pseudo_nuclear_repulsion};
use crate::engine::classify::{classify_sets, effective_labels};
use crate::engine::config::{
    AlignConfig, ConvergenceCriterion, EXACT_RMSD_ACCEPTANCE, EXACT_RMSD_THRESHOLD, Weighting,
};
use crate::engine::error::AlignError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::search::{PassInput, run_pass};
use crate::engine::seed::seed;
use crate::engine::state::{SearchOutcome, SearchState};
use itertools::Itertools;
use nalgebra::Point3;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Reduced-cost cutoff used when probing whether the moving set is
/// superimposable on its own mirror image.
const MIRROR_PROBE_CUTOFF: f64 = 0.1;

/// Relative tolerance on the pseudo nuclear repulsion before and after the
/// transform.
const REPULSION_TOLERANCE: f64 = 1.0e-4;

#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// RMSD between the reference and the aligned moving set.
    pub rmsd: f64,
    pub transform: AlignmentTransform,
    /// Terminal state of the pass that produced the winning candidate.
    pub state: SearchState,
    /// Candidates scored over every pass, probe excluded.
    pub trials: u64,
    /// Whether the mirrored moving set was actually searched.
    pub mirror_searched: bool,
}

impl AlignmentResult {
    /// The moving set carried into the reference frame and order.
    pub fn aligned_set(&self, moving: &AtomSet) -> Result<AtomSet, AlignError> {
        let coords = self.transform.apply_to_points(moving.coords(), false)?;
        let labels = self.transform.apply_to_atom_labels(moving.labels())?;
        let real = self.transform.apply_to_atom_labels(moving.real_flags())?;
        let set = AtomSet::new(coords, labels)?.with_real_flags(real)?;
        match moving.weights() {
            Some(w) => Ok(set.with_weights(self.transform.apply_to_atom_labels(w)?)?),
            None => Ok(set),
        }
    }
}

/// Finds the transform that best carries `moving` onto `reference`.
///
/// Atoms are grouped into equivalence classes by label, a seed correspondence
/// is built per class and alternatives are enumerated and superimposed until
/// the convergence criterion is met or every candidate has been scored. With
/// `run_mirror`, the mirror image of `moving` is searched too unless it is
/// superimposable on `moving` itself.
///
/// # Arguments
///
/// * `reference` - The fixed atom set.
/// * `moving` - The atom set to be carried onto `reference`.
/// * `config` - Search options.
/// * `reporter` - Receives phase and per-trial progress events.
///
/// # Errors
///
/// * [`AlignError::AtomCountMismatch`] / [`AlignError::AtomClassMismatch`] when
///   the two sets cannot correspond.
/// * [`AlignError::PreconditionViolation`] when `generic_ghosts` is set without
///   `mols_align = true`, when reference weights are requested but missing,
///   or when `mols_align = true` and the best RMSD is not near zero.
/// * [`AlignError::Config`] for out-of-range options.
#[instrument(skip_all, name = "align_workflow", fields(natom = reference.len()))]
pub fn align(
    reference: &AtomSet,
    moving: &AtomSet,
    config: &AlignConfig,
    reporter: &ProgressReporter,
) -> Result<AlignmentResult, AlignError> {
    config.validate()?;
    if config.generic_ghosts && !config.mols_align.is_exact() {
        return Err(AlignError::PreconditionViolation(
            "generic_ghosts requires mols_align = true".to_string(),
        ));
    }
    info!(
        "Starting alignment of {} atoms (atoms_map = {}, run_mirror = {}).",
        reference.len(),
        config.atoms_map,
        config.run_mirror
    );

    let result = run(reference, moving, config, reporter)?;

    if config.mols_align.is_exact() && result.rmsd > EXACT_RMSD_ACCEPTANCE {
        warn!(
            "mols_align = true, but the best RMSD is {:.6e} after {} trials; rejecting the alignment.",
            result.rmsd, result.trials
        );
        return Err(AlignError::PreconditionViolation(format!(
            "mols_align = true asserts a zero-RMSD superposition, but the best RMSD is {:.6e}",
            result.rmsd
        )));
    }
    if let Some(threshold) = config.early_exit().filter(|&t| result.rmsd > t) {
        warn!(
            "Search exhausted without reaching RMSD {:.3e}; keeping the best at {:.8}.",
            threshold, result.rmsd
        );
    }

    info!(
        "Alignment complete: RMSD {:.8} after {} trials (mirror = {}).",
        result.rmsd,
        result.trials,
        result.transform.mirror()
    );
    Ok(result)
}

fn run(
    reference: &AtomSet,
    moving: &AtomSet,
    config: &AlignConfig,
    reporter: &ProgressReporter,
) -> Result<AlignmentResult, AlignError> {
    // === Phase 1: Classification ===
    reporter.report(Progress::PhaseStart {
        name: "Classification",
    });
    let classes = classify_sets(reference, moving, config.generic_ghosts)?;
    let weights = resolve_weights(reference, config.weighting)?;
    let plan = if config.resorts() {
        Some(seed(&classes, reference.coords(), moving.coords(), config.uno_cutoff)?)
    } else {
        None
    };
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Mirror probe ===
    let want_mirror = config.run_mirror && !mirror_superimposable(moving, config, reporter)?;

    // === Phase 3: Direct search ===
    let early_exit = config.early_exit();
    reporter.report(Progress::PhaseStart { name: "Search" });
    let direct_input = PassInput {
        reference: reference.coords(),
        moving: moving.coords(),
        weights,
        mirror: false,
        trial_offset: 0,
    };
    let direct = run_pass(&direct_input, plan.as_ref(), early_exit, reporter)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Mirror search ===
    let mut trials = direct.trials;
    let mut winner = direct;
    let mut mirror_searched = false;
    let converged = early_exit.is_some_and(|threshold| winner.best.rmsd <= threshold);
    if want_mirror && !converged {
        reporter.report(Progress::PhaseStart {
            name: "Mirror Search",
        });
        // Class signatures are reflection invariant, so the seed plan carries over.
        let mirrored = mirror_points(moving.coords());
        let mirror_input = PassInput {
            moving: &mirrored,
            mirror: true,
            trial_offset: trials,
            ..direct_input
        };
        let outcome = run_pass(&mirror_input, plan.as_ref(), early_exit, reporter)?;
        trials += outcome.trials;
        mirror_searched = true;
        debug!(
            "Mirror pass best RMSD {:.8} against direct {:.8}.",
            outcome.best.rmsd, winner.best.rmsd
        );
        if outcome.best > winner.best {
            winner = outcome;
        }
        reporter.report(Progress::PhaseFinish);
    } else if want_mirror {
        debug!("Direct pass already converged; mirror pass skipped.");
        reporter.report(Progress::Message(
            "Direct search converged; mirror search skipped.".to_string(),
        ));
    }

    // === Phase 5: Finalize ===
    let SearchOutcome { best, state, .. } = winner;
    let transform = AlignmentTransform::new(
        best.superposition.shift,
        best.superposition.rotation,
        best.atom_map,
        best.mirror,
    )?;
    let aligned = transform.apply_to_points(moving.coords(), false)?;
    let rmsd = calculate_weighted_rmsd(reference.coords(), &aligned, weights)
        .ok_or_else(|| AlignError::Internal("RMSD of the final alignment is undefined.".to_string()))?;
    check_repulsion(moving, &transform, &aligned, config.generic_ghosts)?;

    Ok(AlignmentResult {
        rmsd,
        transform,
        state,
        trials,
        mirror_searched,
    })
}

fn resolve_weights(reference: &AtomSet, weighting: Weighting) -> Result<Option<&[f64]>, AlignError> {
    match weighting {
        Weighting::Uniform => Ok(None),
        Weighting::Reference => reference.weights().map(Some).ok_or_else(|| {
            AlignError::PreconditionViolation(
                "weighting = reference, but the reference set carries no weights".to_string(),
            )
        }),
    }
}

/// Whether `moving` can be rigidly superimposed on its own mirror image, in
/// which case a mirror pass cannot find anything new.
fn mirror_superimposable(
    moving: &AtomSet,
    config: &AlignConfig,
    reporter: &ProgressReporter,
) -> Result<bool, AlignError> {
    reporter.report(Progress::PhaseStart {
        name: "Mirror Probe",
    });
    let probe = AlignConfig {
        mols_align: ConvergenceCriterion::Tolerance(EXACT_RMSD_THRESHOLD),
        uno_cutoff: Some(MIRROR_PROBE_CUTOFF),
        generic_ghosts: config.generic_ghosts,
        ..AlignConfig::default()
    };
    let outcome = run(moving, &moving.mirrored(), &probe, &ProgressReporter::new())?;
    let superimposable = outcome.rmsd <= EXACT_RMSD_THRESHOLD;
    debug!(
        "Mirror probe RMSD {:.8}: moving set is {}superimposable on its mirror image.",
        outcome.rmsd,
        if superimposable { "" } else { "not " }
    );
    if superimposable {
        reporter.report(Progress::Message(
            "Moving set is superimposable on its mirror image; mirror search skipped.".to_string(),
        ));
    }
    reporter.report(Progress::PhaseFinish);
    Ok(superimposable)
}

/// Pseudo nuclear repulsion with charges `1, 2, ...` assigned to the sorted
/// distinct labels must survive the transform.
fn check_repulsion(
    moving: &AtomSet,
    transform: &AlignmentTransform,
    aligned: &[Point3<f64>],
    generic_ghosts: bool,
) -> Result<(), AlignError> {
    let labels = effective_labels(moving, generic_ghosts);
    let rank: HashMap<&AtomLabel, f64> = labels
        .iter()
        .sorted()
        .dedup()
        .enumerate()
        .map(|(i, label)| (label, (i + 1) as f64))
        .collect();
    let charges: Vec<f64> = labels
        .iter()
        .map(|label| rank.get(label).copied().unwrap_or(0.0))
        .collect();

    let before = pseudo_nuclear_repulsion(&charges, moving.coords());
    let after = pseudo_nuclear_repulsion(&transform.apply_to_atom_labels(&charges)?, aligned);
    if (before - after).abs() > REPULSION_TOLERANCE * before.abs().max(1.0) {
        return Err(AlignError::Internal(format!(
            "Pseudo nuclear repulsion changed under the alignment: {before:.8} -> {after:.8}."
        )));
    }
    Ok(())
}
