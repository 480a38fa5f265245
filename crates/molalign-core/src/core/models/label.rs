use serde::{Deserialize, Serialize};
use std::fmt;

const GENERIC_GHOST_KEY: &str = "@ghost";
const GHOST_PREFIX: &str = "Gh:";

/// Opaque per-atom invariant used to decide which atoms may exchange places.
///
/// Two atoms are interchangeable exactly when their labels compare equal. The
/// aligner never looks inside a label; equality is exact string equality so
/// classification stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomLabel(String);

impl AtomLabel {
    /// Wraps an arbitrary caller-supplied key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Builds the usual key from an element symbol and isotope mass.
    ///
    /// The mass is rendered with six decimals so that masses read from the
    /// same table always produce the same key. Ghost atoms (`real == false`)
    /// get a distinct prefix, so a ghost never matches a real atom of the same
    /// element unless generic ghost lumping is requested.
    ///
    /// # Arguments
    ///
    /// * `symbol` - Element symbol, e.g. `"C"` or `"Cl"`.
    /// * `mass` - Isotope mass in Daltons.
    /// * `real` - Whether the atom carries nuclear charge.
    pub fn from_nucleus(symbol: &str, mass: f64, real: bool) -> Self {
        let prefix = if real { "" } else { GHOST_PREFIX };
        Self(format!("{}{}@{:.6}", prefix, symbol.trim(), mass))
    }

    /// The single key every ghost collapses onto in generic-ghost mode.
    pub fn generic_ghost() -> Self {
        Self(GENERIC_GHOST_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AtomLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AtomLabel {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for AtomLabel {
    fn from(key: String) -> Self {
        Self(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_nucleus_distinguishes_isotopes() {
        let o16 = AtomLabel::from_nucleus("O", 15.994914620, true);
        let o18 = AtomLabel::from_nucleus("O", 17.999159613, true);
        assert_ne!(o16, o18);
        assert_eq!(o16, AtomLabel::from_nucleus(" O ", 15.994914620, true));
    }

    #[test]
    fn from_nucleus_distinguishes_ghosts_from_real_atoms() {
        let real = AtomLabel::from_nucleus("He", 4.002603254, true);
        let ghost = AtomLabel::from_nucleus("He", 4.002603254, false);
        assert_ne!(real, ghost);
        assert!(ghost.as_str().starts_with("Gh:"));
    }

    #[test]
    fn generic_ghost_is_stable() {
        assert_eq!(AtomLabel::generic_ghost(), AtomLabel::generic_ghost());
        assert_ne!(AtomLabel::generic_ghost(), AtomLabel::from("He"));
    }

    #[test]
    fn labels_are_totally_ordered() {
        let mut labels = vec![AtomLabel::from("O"), AtomLabel::from("C"), AtomLabel::from("H")];
        labels.sort();
        assert_eq!(
            labels.iter().map(AtomLabel::as_str).collect::<Vec<_>>(),
            vec!["C", "H", "O"]
        );
    }
}
