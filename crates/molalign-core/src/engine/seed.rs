use super::classify::EquivalenceClass;
use super::error::AlignError;
use crate::core::matching::assignment;
use crate::core::matching::graph::{BipartiteGraph, Matching};
use nalgebra::{DMatrix, Point3};
use tracing::{debug, trace};

/// Scale applied to the inverse-distance sums so that costs are not tiny.
const SIGNATURE_SCALE: f64 = 100.0;

/// Seed and enumeration graph for one equivalence class.
///
/// Left nodes are the class's reference slots, right nodes its moving atoms,
/// both in class-local numbering.
#[derive(Debug, Clone)]
pub struct ClassPlan {
    pub class: EquivalenceClass,
    pub seed: Matching,
    pub graph: BipartiteGraph,
}

impl ClassPlan {
    /// Writes a class-local matching into a global atom map.
    pub fn scatter(&self, matching: &Matching, atom_map: &mut [usize]) {
        for &(slot, local) in matching.pairs() {
            atom_map[self.class.reference[slot]] = self.class.moving[local];
        }
    }
}

/// The seed correspondence for every class, and the full atom map it implies.
#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub atom_map: Vec<usize>,
    pub classes: Vec<ClassPlan>,
}

/// The trusted 1:1 correspondence.
pub fn identity_seed(natom: usize) -> Vec<usize> {
    (0..natom).collect()
}

/// Per-atom `100 · Σ 1/r` over the other atoms of the same class.
///
/// The sum depends only on internal distances, so it is unchanged by any rigid
/// motion or reflection. Coincident atoms contribute nothing.
pub fn class_signature(points: &[Point3<f64>], members: &[usize]) -> Vec<f64> {
    members
        .iter()
        .map(|&i| {
            let sum: f64 = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (points[i] - points[j]).norm())
                .filter(|&d| d > f64::EPSILON)
                .map(|d| 1.0 / d)
                .sum();
            SIGNATURE_SCALE * sum
        })
        .collect()
}

/// Cost of placing moving atom `m` into reference slot `k` of `class`:
/// squared difference of their class signatures.
pub fn seeding_cost(
    class: &EquivalenceClass,
    reference: &[Point3<f64>],
    moving: &[Point3<f64>],
) -> DMatrix<f64> {
    let sig_ref = class_signature(reference, &class.reference);
    let sig_mov = class_signature(moving, &class.moving);
    DMatrix::from_fn(class.len(), class.len(), |k, m| (sig_ref[k] - sig_mov[m]).powi(2))
}

/// Seeds one class by optimal assignment on the signature cost and builds the
/// graph of pairings the enumerator may explore.
///
/// With `uno_cutoff = None` the graph is complete. Otherwise only pairs whose
/// reduced cost is below the cutoff are kept; the seed's own edges always are.
pub fn seed_class(
    class: &EquivalenceClass,
    reference: &[Point3<f64>],
    moving: &[Point3<f64>],
    uno_cutoff: Option<f64>,
) -> Result<ClassPlan, AlignError> {
    let n = class.len();
    if class.is_trivial() {
        return Ok(ClassPlan {
            class: class.clone(),
            seed: Matching::from_permutation(&identity_seed(n)),
            graph: BipartiteGraph::complete(n, n),
        });
    }

    let cost = seeding_cost(class, reference, moving);
    let solution = assignment::solve(&cost)?;
    let seed = Matching::from_permutation(&solution.row_to_col);

    let graph = match uno_cutoff {
        None => BipartiteGraph::complete(n, n),
        Some(cutoff) => {
            let edges = (0..n)
                .flat_map(|k| (0..n).map(move |m| (k, m)))
                .filter(|&(k, m)| solution.reduced_cost[(k, m)] < cutoff)
                .chain(seed.pairs().iter().copied());
            BipartiteGraph::from_edges(n, n, edges)?
        }
    };

    trace!(
        "Class '{}': seed cost {:.6}, {} of {} pairings kept.",
        class.label,
        solution.total_cost,
        graph.edge_count(),
        n * n
    );

    Ok(ClassPlan {
        class: class.clone(),
        seed,
        graph,
    })
}

/// Seeds every class and assembles the global seed correspondence:
/// `atom_map[i]` is the moving atom placed at reference position `i`.
pub fn seed(
    classes: &[EquivalenceClass],
    reference: &[Point3<f64>],
    moving: &[Point3<f64>],
    uno_cutoff: Option<f64>,
) -> Result<SeedPlan, AlignError> {
    let plans = classes
        .iter()
        .map(|class| seed_class(class, reference, moving, uno_cutoff))
        .collect::<Result<Vec<_>, AlignError>>()?;

    let mut atom_map = vec![usize::MAX; reference.len()];
    for plan in &plans {
        plan.scatter(&plan.seed, &mut atom_map);
    }
    if atom_map.iter().any(|&m| m == usize::MAX) {
        return Err(AlignError::Internal(
            "Equivalence classes do not cover every atom.".to_string(),
        ));
    }

    debug!(
        "Seeded {} classes; {} admit alternatives.",
        plans.len(),
        plans.iter().filter(|p| !p.class.is_trivial()).count()
    );
    Ok(SeedPlan {
        atom_map,
        classes: plans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::label::AtomLabel;
    use crate::engine::classify::classify;

    fn water_dimer_like() -> (Vec<Point3<f64>>, Vec<AtomLabel>) {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.96, 0.0, 0.0),
            Point3::new(-0.24, 0.93, 0.0),
            Point3::new(2.9, 0.1, 0.0),
            Point3::new(3.3, 0.9, 0.3),
            Point3::new(3.4, -0.6, -0.2),
        ];
        let labels = ["O", "H", "H", "N", "H", "H"].iter().map(|&s| AtomLabel::from(s)).collect();
        (pts, labels)
    }

    #[test]
    fn signatures_are_rotation_invariant() {
        let (pts, _) = water_dimer_like();
        let members = vec![1, 2, 4, 5];
        let rotated: Vec<Point3<f64>> = pts.iter().map(|p| Point3::new(-p.y, p.x, p.z + 1.0)).collect();
        let a = class_signature(&pts, &members);
        let b = class_signature(&rotated, &members);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn seed_recovers_a_shuffle_of_distinct_atoms() {
        let (pts, labels) = water_dimer_like();
        let order = [3, 5, 0, 4, 2, 1];
        let moving: Vec<Point3<f64>> = order.iter().map(|&i| pts[i]).collect();
        let moving_labels: Vec<AtomLabel> = order.iter().map(|&i| labels[i].clone()).collect();

        let classes = classify(&labels, &moving_labels).unwrap();
        let plan = seed(&classes, &pts, &moving, None).unwrap();
        for (i, &m) in plan.atom_map.iter().enumerate() {
            assert_eq!(order[m], i);
        }
    }

    #[test]
    fn seed_is_a_permutation_within_classes() {
        let (pts, labels) = water_dimer_like();
        let classes = classify(&labels, &labels).unwrap();
        let plan = seed(&classes, &pts, &pts, None).unwrap();
        let mut sorted = plan.atom_map.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, identity_seed(6));
        for (i, &m) in plan.atom_map.iter().enumerate() {
            assert_eq!(labels[i], labels[m]);
        }
    }

    #[test]
    fn cutoff_prunes_but_keeps_seed_edges() {
        let (pts, labels) = water_dimer_like();
        let classes = classify(&labels, &labels).unwrap();
        let hydrogens = &classes[1];

        let full = seed_class(hydrogens, &pts, &pts, None).unwrap();
        assert_eq!(full.graph.edge_count(), 16);

        let pruned = seed_class(hydrogens, &pts, &pts, Some(1e-3)).unwrap();
        assert!(pruned.graph.edge_count() < 16);
        for &(k, m) in pruned.seed.pairs() {
            assert!(pruned.graph.has_edge(k, m));
        }
    }

    #[test]
    fn trivial_class_needs_no_assignment() {
        let class = EquivalenceClass {
            label: AtomLabel::from("C"),
            reference: vec![2],
            moving: vec![0],
        };
        let plan = seed_class(&class, &[], &[], Some(0.1)).unwrap();
        let mut atom_map = vec![0; 3];
        plan.scatter(&plan.seed, &mut atom_map);
        assert_eq!(atom_map[2], 0);
        assert_eq!(plan.graph.edge_count(), 1);
    }
}
