use super::error::AlignError;
use crate::core::models::atom_set::AtomSet;
use crate::core::models::label::AtomLabel;
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Atoms sharing one label: positions in the reference and in the moving set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalenceClass {
    pub label: AtomLabel,
    pub reference: Vec<usize>,
    pub moving: Vec<usize>,
}

impl EquivalenceClass {
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// A class of one atom admits only one correspondence.
    pub fn is_trivial(&self) -> bool {
        self.reference.len() <= 1
    }
}

/// Labels as seen by the classifier. With `generic_ghosts`, every ghost atom
/// is relabeled to [`AtomLabel::generic_ghost`].
pub fn effective_labels(set: &AtomSet, generic_ghosts: bool) -> Vec<AtomLabel> {
    set.labels()
        .iter()
        .zip(set.real_flags())
        .map(|(label, &real)| {
            if generic_ghosts && !real {
                AtomLabel::generic_ghost()
            } else {
                label.clone()
            }
        })
        .collect()
}

/// Partitions both label sequences into classes of interchangeable atoms.
///
/// Classes appear in order of first appearance in `reference`; indices inside
/// a class are ascending.
///
/// # Errors
///
/// * [`AlignError::AtomCountMismatch`] if the sequences differ in length.
/// * [`AlignError::AtomClassMismatch`] if the label multisets differ.
pub fn classify(
    reference: &[AtomLabel],
    moving: &[AtomLabel],
) -> Result<Vec<EquivalenceClass>, AlignError> {
    if reference.len() != moving.len() {
        return Err(AlignError::AtomCountMismatch {
            reference: reference.len(),
            moving: moving.len(),
        });
    }

    let mut index: HashMap<&AtomLabel, usize> = HashMap::new();
    let mut classes: Vec<EquivalenceClass> = Vec::new();
    for (i, label) in reference.iter().enumerate() {
        let slot = *index.entry(label).or_insert_with(|| {
            classes.push(EquivalenceClass {
                label: label.clone(),
                reference: Vec::new(),
                moving: Vec::new(),
            });
            classes.len() - 1
        });
        classes[slot].reference.push(i);
    }

    for (i, label) in moving.iter().enumerate() {
        match index.get(label) {
            Some(&slot) => classes[slot].moving.push(i),
            None => return Err(class_mismatch(reference, moving)),
        }
    }
    if classes.iter().any(|c| c.reference.len() != c.moving.len()) {
        return Err(class_mismatch(reference, moving));
    }

    debug!(
        "Classified {} atoms into {} classes (largest has {} atoms).",
        reference.len(),
        classes.len(),
        classes.iter().map(EquivalenceClass::len).max().unwrap_or(0)
    );
    Ok(classes)
}

/// Classifies two atom sets, applying generic-ghost lumping if requested.
pub fn classify_sets(
    reference: &AtomSet,
    moving: &AtomSet,
    generic_ghosts: bool,
) -> Result<Vec<EquivalenceClass>, AlignError> {
    classify(
        &effective_labels(reference, generic_ghosts),
        &effective_labels(moving, generic_ghosts),
    )
}

fn class_mismatch(reference: &[AtomLabel], moving: &[AtomLabel]) -> AlignError {
    AlignError::AtomClassMismatch {
        reference: reference.iter().sorted().join(" "),
        moving: moving.iter().sorted().join(" "),
    }
}
