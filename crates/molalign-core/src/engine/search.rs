use super::error::AlignError;
use super::progress::{Progress, ProgressReporter};
use super::seed::{ClassPlan, SeedPlan, identity_seed};
use super::state::{BestTracker, Candidate, SearchOutcome, SearchState};
use crate::core::matching::graph::Matching;
use crate::core::matching::uno::UnoEnumerator;
use crate::core::superposition::{Superposition, kabsch};
use nalgebra::Point3;
use tracing::{debug, instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Largest number of candidates scored together. Batches start at one so the
/// common case (the seed already fits) costs a single superposition.
const MAX_BATCH: usize = 256;

/// Lazy Cartesian product of the per-class matching sequences.
///
/// Works like an odometer over the classes that admit alternatives, with the
/// last class turning fastest. Each class's matchings are pulled from its
/// enumerator only when the odometer first reaches them and cached for the
/// later wrap-arounds. The first atom map yielded is the seed.
pub struct CandidateProduct<'p> {
    plans: Vec<&'p ClassPlan>,
    enumerators: Vec<UnoEnumerator>,
    cache: Vec<Vec<Matching>>,
    complete: Vec<bool>,
    digits: Vec<usize>,
    current: Vec<usize>,
    started: bool,
    finished: bool,
}

impl<'p> CandidateProduct<'p> {
    pub fn new(plan: &'p SeedPlan) -> Result<Self, AlignError> {
        let plans: Vec<&ClassPlan> = plan.classes.iter().filter(|p| !p.class.is_trivial()).collect();
        let enumerators = plans
            .iter()
            .map(|p| UnoEnumerator::new(p.graph.clone(), &p.seed))
            .collect::<Result<Vec<_>, _>>()?;
        let n = plans.len();
        Ok(Self {
            plans,
            enumerators,
            cache: vec![Vec::new(); n],
            complete: vec![false; n],
            digits: vec![0; n],
            current: plan.atom_map.clone(),
            started: false,
            finished: false,
        })
    }

    /// Matching number `index` of class `class`, pulling from its enumerator
    /// if needed. `None` once the class has no more matchings.
    fn fetch(&mut self, class: usize, index: usize) -> Option<&Matching> {
        while self.cache[class].len() <= index && !self.complete[class] {
            match self.enumerators[class].next() {
                Some(m) => self.cache[class].push(m),
                None => self.complete[class] = true,
            }
        }
        self.cache[class].get(index)
    }

    fn apply_digit(&mut self, class: usize) {
        let index = self.digits[class];
        if let Some(matching) = self.cache[class].get(index) {
            self.plans[class].scatter(matching, &mut self.current);
        }
    }

    /// Turns the odometer by one. Returns `false` when every combination has
    /// been visited.
    fn advance(&mut self) -> bool {
        for class in (0..self.plans.len()).rev() {
            let next = self.digits[class] + 1;
            if self.fetch(class, next).is_some() {
                self.digits[class] = next;
                self.apply_digit(class);
                return true;
            }
            self.digits[class] = 0;
            self.apply_digit(class);
        }
        false
    }
}

impl Iterator for CandidateProduct<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            // Every enumerator yields its seed first, matching the seed map.
            for class in 0..self.plans.len() {
                self.fetch(class, 0);
            }
            return Some(self.current.clone());
        }
        if self.advance() {
            Some(self.current.clone())
        } else {
            self.finished = true;
            None
        }
    }
}

/// Inputs to one search pass over one orientation of the moving set.
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a> {
    pub reference: &'a [Point3<f64>],
    /// Moving coordinates, already mirrored for a mirror pass.
    pub moving: &'a [Point3<f64>],
    pub weights: Option<&'a [f64]>,
    pub mirror: bool,
    /// Number of trials scored by earlier passes; keeps trial numbers unique.
    pub trial_offset: u64,
}

impl PassInput<'_> {
    /// Superimposes the moving atoms, reordered by `atom_map`, onto the reference.
    pub fn score(&self, atom_map: &[usize]) -> Result<Superposition, AlignError> {
        let reordered: Vec<Point3<f64>> = atom_map.iter().map(|&m| self.moving[m]).collect();
        Ok(kabsch(self.reference, &reordered, self.weights)?)
    }
}

/// Runs one pass of the correspondence search.
///
/// With `plan = None` the identity correspondence is trusted, scored once,
/// and the pass converges immediately. Otherwise candidates from
/// [`CandidateProduct`] are scored in enumeration order until one reaches
/// `early_exit` (state [`SearchState::Converged`]) or none remain
/// ([`SearchState::Exhausted`]).
#[instrument(skip_all, name = "search_pass", fields(mirror = input.mirror))]
pub fn run_pass(
    input: &PassInput,
    plan: Option<&SeedPlan>,
    early_exit: Option<f64>,
    reporter: &ProgressReporter,
) -> Result<SearchOutcome, AlignError> {
    let mut tracker = BestTracker::new();
    let mut state = SearchState::Seeded;
    let mut trials = 0u64;

    let Some(plan) = plan else {
        let atom_map = identity_seed(input.reference.len());
        let superposition = input.score(&atom_map)?;
        record(input, &mut tracker, reporter, &mut trials, atom_map, superposition);
        return finish(tracker, SearchState::Converged, trials);
    };

    let mut candidates = CandidateProduct::new(plan)?;
    let mut batch_size = 1usize;

    loop {
        let batch: Vec<Vec<usize>> = candidates.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            state = SearchState::Exhausted;
            break;
        }

        #[cfg(not(feature = "parallel"))]
        let iterator = batch.into_iter();

        #[cfg(feature = "parallel")]
        let iterator = batch.into_par_iter();

        let scored = iterator
            .map(|atom_map| input.score(&atom_map).map(|s| (atom_map, s)))
            .collect::<Result<Vec<_>, AlignError>>()?;

        let mut converged = false;
        for (atom_map, superposition) in scored {
            let rmsd = superposition.rmsd;
            record(input, &mut tracker, reporter, &mut trials, atom_map, superposition);
            if early_exit.is_some_and(|threshold| rmsd <= threshold) {
                converged = true;
                break;
            }
        }
        if converged {
            state = SearchState::Converged;
            break;
        }

        if state == SearchState::Seeded {
            debug!(
                "Seed correspondence scored RMSD {:.8}; state {} -> {}.",
                tracker.best_rmsd().unwrap_or(f64::NAN),
                SearchState::Seeded,
                SearchState::Searching
            );
            state = SearchState::Searching;
        }
        batch_size = (batch_size * 2).min(MAX_BATCH);
    }

    finish(tracker, state, trials)
}

fn record(
    input: &PassInput,
    tracker: &mut BestTracker,
    reporter: &ProgressReporter,
    trials: &mut u64,
    atom_map: Vec<usize>,
    superposition: Superposition,
) {
    *trials += 1;
    let trial = input.trial_offset + *trials;
    let rmsd = superposition.rmsd;
    let improved = tracker.offer(Candidate {
        rmsd,
        trial,
        mirror: input.mirror,
        atom_map,
        superposition,
    });
    trace!(trial, rmsd, mirror = input.mirror, improved, "Scored candidate.");
    reporter.report(Progress::TrialScored {
        trial,
        rmsd,
        mirror: input.mirror,
        improved,
    });
}

fn finish(tracker: BestTracker, state: SearchState, trials: u64) -> Result<SearchOutcome, AlignError> {
    let best = tracker
        .into_best()
        .ok_or_else(|| AlignError::Internal("Search pass scored no candidates.".to_string()))?;
    debug!(
        "Search pass {} after {} trials; best RMSD {:.8} (trial {}).",
        state, trials, best.rmsd, best.trial
    );
    Ok(SearchOutcome { best, state, trials })
}
