pub mod atom_set;
pub mod label;
pub mod transform;
