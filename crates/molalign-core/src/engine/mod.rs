//! # Engine Module
//!
//! The stateful correspondence search that turns two labeled atom sets into a
//! best-fit alignment.
//!
//! ## Overview
//!
//! A search partitions both atom sets into classes of interchangeable atoms,
//! seeds one correspondence per class with an optimal assignment, and then
//! walks alternative correspondences with Uno's matching enumeration,
//! superimposing and scoring each one. A pass moves through the states
//! `Seeded -> Searching -> Converged | Exhausted`, stopping early once the
//! requested RMSD tolerance is met.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Search flags, convergence criteria and TOML loading
//! - **Classification** ([`classify`]) - Partitioning atoms into equivalence classes
//! - **Seeding** ([`seed`]) - Assignment-based initial correspondence and enumeration graphs
//! - **Search** ([`search`]) - Candidate product, scoring and early exit for one pass
//! - **State Tracking** ([`state`]) - Search states and best-candidate bookkeeping
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - The aggregated alignment error type

pub mod classify;
pub mod config;
pub mod error;
pub mod progress;
pub mod search;
pub mod seed;
pub mod state;
