//! # Workflows Module
//!
//! High-level entry points that tie the [`engine`](crate::engine) and
//! [`core`](crate::core) layers together.
//!
//! ## Overview
//!
//! - **Alignment** ([`align`]) - Classifies the atoms of two sets, searches
//!   atom correspondences (optionally also against the mirror image) and
//!   returns the best [`AlignmentTransform`](crate::core::models::transform::AlignmentTransform)
//!   with its RMSD.
//! - **Scrambling** ([`scramble`]) - Draws synthetic transforms, builds moved
//!   and reordered copies of a set, and checks that alignment recovers the
//!   original.

pub mod align;
pub mod scramble;
