use thiserror::Error;

/// Two arrays that must agree in length do not.
///
/// Raised before any numeric work whenever point sets, labels, weights or
/// atom maps disagree in size.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Dimension mismatch for {context}: expected {expected}, found {found}")]
pub struct ShapeMismatch {
    pub context: &'static str,
    pub expected: usize,
    pub found: usize,
}

impl ShapeMismatch {
    pub fn new(context: &'static str, expected: usize, found: usize) -> Self {
        Self {
            context,
            expected,
            found,
        }
    }

    pub(crate) fn check(context: &'static str, expected: usize, found: usize) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(Self::new(context, expected, found))
        }
    }
}

/// Per-atom weights that cannot drive a weighted superposition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeightError {
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
    #[error("Weight of atom {index} must be finite and non-negative, found {value}")]
    Invalid { index: usize, value: f64 },
    #[error("Weights must sum to a positive value, found {total}")]
    NonPositiveTotal { total: f64 },
}

/// Checks that `weights` has one finite, non-negative entry per atom and a
/// positive sum.
pub fn check_weights(natom: usize, weights: &[f64]) -> Result<(), WeightError> {
    ShapeMismatch::check("atom weights", natom, weights.len())?;
    if let Some((index, &value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(WeightError::Invalid { index, value });
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(WeightError::NonPositiveTotal { total });
    }
    Ok(())
}
