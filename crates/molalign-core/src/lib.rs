//! # molalign
//!
//! Superimposes one labeled point set (a molecule) onto another: finds the
//! atom correspondence, optional mirror image, translation and rotation that
//! minimize the RMSD, and applies that transform consistently to geometries,
//! gradients, Hessians and other per-atom quantities.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Stateless models (`AtomSet`, `AtomLabel`,
//!   `AlignmentTransform`) and pure algorithms: Kabsch superposition, linear
//!   assignment and perfect matching enumeration.
//!
//! - **[`engine`]: The Search.** Configuration, equivalence classes, seeding
//!   and the candidate search driver with its state and progress reporting.
//!
//! - **[`workflows`]: The Public API.** [`workflows::align::align`] runs a
//!   complete alignment; [`workflows::scramble`] generates and verifies
//!   synthetic round trips.

pub mod core;
pub mod engine;
pub mod workflows;
