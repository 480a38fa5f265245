//! Combinatorial machinery for atom correspondence: optimal assignment and
//! enumeration of alternative matchings within an equivalence class.

pub mod assignment;
pub mod graph;
pub mod uno;
