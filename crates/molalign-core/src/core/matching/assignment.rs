use super::graph::MatchingError;
use crate::core::error::ShapeMismatch;
use nalgebra::DMatrix;

/// Optimal solution of a square linear assignment problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// `row_to_col[i]` is the column assigned to row `i`.
    pub row_to_col: Vec<usize>,
    /// Sum of the chosen costs.
    pub total_cost: f64,
    /// `cost - u - v` for the final dual potentials. Non-negative everywhere
    /// and zero on every assigned cell; any other zero marks an alternative
    /// that is equally optimal.
    pub reduced_cost: DMatrix<f64>,
}

/// Solves the minimum-cost perfect assignment on a square cost matrix using
/// the shortest augmenting path form of the Hungarian algorithm, `O(n³)`.
///
/// # Errors
///
/// Returns [`MatchingError::Shape`] if the matrix is not square, or
/// [`MatchingError::NonFiniteCost`] if any entry is NaN or infinite.
pub fn solve(cost: &DMatrix<f64>) -> Result<Assignment, MatchingError> {
    let n = cost.nrows();
    ShapeMismatch::check("assignment cost columns", n, cost.ncols())?;
    if let Some(idx) = cost.iter().position(|c| !c.is_finite()) {
        // column-major storage
        return Err(MatchingError::NonFiniteCost {
            row: idx % n,
            col: idx / n,
        });
    }

    // Potentials and bookkeeping are 1-based; slot 0 is the virtual root.
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; n + 1];
    let mut col_owner = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for row in 1..=n {
        col_owner[0] = row;
        let mut j0 = 0;
        let mut min_slack = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = col_owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let slack = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[col_owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }
            j0 = j1;
            if col_owner[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            col_owner[j0] = col_owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_to_col = vec![0usize; n];
    for j in 1..=n {
        row_to_col[col_owner[j] - 1] = j - 1;
    }
    let total_cost = row_to_col
        .iter()
        .enumerate()
        .map(|(i, &j)| cost[(i, j)])
        .sum();
    let reduced_cost = DMatrix::from_fn(n, n, |i, j| (cost[(i, j)] - u[i + 1] - v[j + 1]).max(0.0));

    Ok(Assignment {
        row_to_col,
        total_cost,
        reduced_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn brute_force_minimum(cost: &DMatrix<f64>) -> f64 {
        let n = cost.nrows();
        (0..n)
            .permutations(n)
            .map(|p| p.iter().enumerate().map(|(i, &j)| cost[(i, j)]).sum::<f64>())
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn solves_small_textbook_problem() {
        let cost = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0]);
        let a = solve(&cost).unwrap();
        assert_eq!(a.row_to_col, vec![1, 0, 2]);
        assert!((a.total_cost - 5.0).abs() < 1e-12);
    }

    #[test]
    fn matches_brute_force_on_dense_matrices() {
        for seed in 0..5u64 {
            let cost = DMatrix::from_fn(5, 5, |i, j| {
                (((i * 31 + j * 17 + seed as usize * 13) % 23) as f64).sqrt()
            });
            let a = solve(&cost).unwrap();
            assert!((a.total_cost - brute_force_minimum(&cost)).abs() < 1e-9);
            let mut cols = a.row_to_col.clone();
            cols.sort_unstable();
            assert_eq!(cols, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn reduced_cost_is_zero_on_the_assignment_and_nonnegative_elsewhere() {
        let cost = DMatrix::from_row_slice(3, 3, &[7.0, 5.0, 11.0, 5.0, 4.0, 1.0, 9.0, 3.0, 2.0]);
        let a = solve(&cost).unwrap();
        for (i, &j) in a.row_to_col.iter().enumerate() {
            assert!(a.reduced_cost[(i, j)].abs() < 1e-12);
        }
        assert!(a.reduced_cost.iter().all(|&c| c >= 0.0));
    }

    #[test]
    fn degenerate_costs_expose_every_optimum() {
        let cost = DMatrix::from_element(3, 3, 2.5);
        let a = solve(&cost).unwrap();
        assert!(a.reduced_cost.iter().all(|&c| c.abs() < 1e-12));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            solve(&DMatrix::zeros(2, 3)),
            Err(MatchingError::Shape(_))
        ));
        let mut cost = DMatrix::zeros(2, 2);
        cost[(1, 0)] = f64::NAN;
        assert_eq!(
            solve(&cost).unwrap_err(),
            MatchingError::NonFiniteCost { row: 1, col: 0 }
        );
    }

    #[test]
    fn empty_problem_is_trivial() {
        let a = solve(&DMatrix::zeros(0, 0)).unwrap();
        assert!(a.row_to_col.is_empty());
        assert_eq!(a.total_cost, 0.0);
    }
}
