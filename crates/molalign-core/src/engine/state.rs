use crate::core::superposition::Superposition;
use std::cmp::Ordering;
use std::fmt;

/// Lifecycle of one search pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// The seed correspondence has been scored.
    Seeded,
    /// Alternative correspondences are being pulled and scored.
    Searching,
    /// Stopped early: the RMSD reached the requested tolerance, or the
    /// correspondence was trusted as given.
    Converged,
    /// Every candidate was scored without meeting the early-exit tolerance.
    Exhausted,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Seeded => "seeded",
            Self::Searching => "searching",
            Self::Converged => "converged",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// RMSD resolution used when ranking candidates. Symmetry-equivalent
/// correspondences score equal up to round-off; quantizing keeps the earliest.
const RMSD_RESOLUTION: f64 = 1.0e-8;

fn quantized(rmsd: f64) -> f64 {
    (rmsd / RMSD_RESOLUTION).round()
}

/// A scored correspondence.
///
/// Ordered so that the *better* candidate compares greater: lower RMSD
/// (at a resolution of 1e-8) first, and among equal RMSD the earlier trial.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rmsd: f64,
    pub trial: u64,
    pub mirror: bool,
    pub atom_map: Vec<usize>,
    pub superposition: Superposition,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        quantized(other.rmsd)
            .partial_cmp(&quantized(self.rmsd))
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.trial.cmp(&self.trial))
    }
}

/// Best-so-far bookkeeping for a search.
#[derive(Debug, Default)]
pub struct BestTracker {
    best: Option<Candidate>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `candidate` if it beats the current best. Returns whether it did.
    pub fn offer(&mut self, candidate: Candidate) -> bool {
        let improved = self.best.as_ref().is_none_or(|best| candidate > *best);
        if improved {
            self.best = Some(candidate);
        }
        improved
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    pub fn best_rmsd(&self) -> Option<f64> {
        self.best.as_ref().map(|c| c.rmsd)
    }

    pub fn into_best(self) -> Option<Candidate> {
        self.best
    }
}

/// Result of one search pass over one orientation of the moving set.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: Candidate,
    pub state: SearchState,
    pub trials: u64,
}
