//! # Core Module
//!
//! Stateless data types and pure algorithms underneath the alignment engine.
//!
//! ## Overview
//!
//! Everything here is deterministic and free of configuration: given the same
//! inputs, every function returns the same result. The stateful search that
//! ties these pieces together lives in [`crate::engine`].
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Atom labels, atom sets and the alignment transform
//! - **Superposition** ([`superposition`]) - Kabsch least-squares rigid motion for a fixed correspondence
//! - **Matching** ([`matching`]) - Linear assignment and Uno's enumeration of bipartite matchings
//! - **Geometry** ([`utils`]) - Centroids, RMSD, mirroring, random rotations
//! - **Errors** ([`error`]) - Shape validation shared by every layer
//!
//! ## Conventions
//!
//! Points are treated as row vectors when a transform is described: an aligned
//! point is `(p - shift) · rotation`. Mirroring always inverts the y axis.

pub mod error;
pub mod matching;
pub mod models;
pub mod superposition;
pub mod utils;
