//! Structural linear solver used for dependency propagation through the
//! implicit algebraic/ODE coupling.
//!
//! Only the pattern of `A` matters. Rows are matched to columns with a
//! maximum transversal; the variable matched to row `r` then depends on
//! `b[r]` and on every other variable appearing in row `r`. Iterating this
//! to a fixpoint gives the dependencies of the block triangular solve.

use std::{cell::RefCell, fmt, rc::Rc};

use tracing::warn;

use crate::{
    error::{Error, Result},
    fx::DeepCopyMap,
    matrix::Bvec,
    sparsity::Sparsity,
};

struct Transversal {
    /// Columns present in each row.
    row_cols: Vec<Vec<usize>>,
    /// Column matched to each row; `None` when the pattern is structurally
    /// singular.
    matching: Option<Vec<usize>>,
}

impl Transversal {
    fn new(sparsity: &Sparsity) -> Self {
        let n = sparsity.nrow();
        let mut row_cols = vec![Vec::new(); n];
        for (r, c) in sparsity.entries() {
            row_cols[r].push(c);
        }
        let mut col_match: Vec<Option<usize>> = vec![None; sparsity.ncol()];
        let mut perfect = true;
        for r in 0..n {
            let mut visited = vec![false; sparsity.ncol()];
            if !augment(r, &row_cols, &mut col_match, &mut visited) {
                perfect = false;
            }
        }
        let matching = perfect.then(|| {
            let mut m = vec![0; n];
            for (c, r) in col_match.iter().enumerate() {
                if let Some(r) = r {
                    m[*r] = c;
                }
            }
            m
        });
        Self { row_cols, matching }
    }

    fn solve(&self, b: &[Bvec], x: &mut [Bvec]) {
        let Some(matching) = &self.matching else {
            let all = b.iter().fold(0, |acc, v| acc | v);
            x.iter_mut().for_each(|v| *v = all);
            return;
        };
        x.iter_mut().for_each(|v| *v = 0);
        loop {
            let mut changed = false;
            for (r, cols) in self.row_cols.iter().enumerate() {
                let c = matching[r];
                let bits = cols.iter().fold(b[r] | x[c], |acc, &j| acc | x[j]);
                if bits != x[c] {
                    x[c] = bits;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

/// Kuhn's augmenting path search from row `r`.
fn augment(r: usize, row_cols: &[Vec<usize>], col_match: &mut [Option<usize>], visited: &mut [bool]) -> bool {
    for &c in &row_cols[r] {
        if visited[c] {
            continue;
        }
        visited[c] = true;
        let free = match col_match[c] {
            None => true,
            Some(other) => augment(other, row_cols, col_match, visited),
        };
        if free {
            col_match[c] = Some(r);
            return true;
        }
    }
    false
}

struct LinearSolverNode {
    sparsity: Sparsity,
    plain: Transversal,
    transposed: Transversal,
}

/// Shared handle to a structural solver for one square pattern.
#[derive(Clone)]
pub struct LinearSolver(Rc<RefCell<LinearSolverNode>>);

impl LinearSolver {
    pub fn new(sparsity: Sparsity) -> Result<Self> {
        if sparsity.nrow() != sparsity.ncol() {
            return Err(Error::ShapeMismatch {
                what: "linear system matrix".to_string(),
                expected: (sparsity.nrow(), sparsity.nrow()),
                got: sparsity.shape(),
            });
        }
        let plain = Transversal::new(&sparsity);
        let transposed = Transversal::new(&sparsity.transpose());
        if plain.matching.is_none() {
            warn!(n = sparsity.nrow(), "linear system pattern is structurally singular");
        }
        Ok(LinearSolver(Rc::new(RefCell::new(LinearSolverNode {
            sparsity,
            plain,
            transposed,
        }))))
    }

    pub fn sparsity(&self) -> Sparsity {
        self.0.borrow().sparsity.clone()
    }

    pub fn is_structurally_singular(&self) -> bool {
        self.0.borrow().plain.matching.is_none()
    }

    /// Lanes of `b` each solution entry of `A x = b` (or `A' x = b`) can
    /// depend on.
    pub fn sp_solve(&self, b: &[Bvec], transpose: bool) -> Vec<Bvec> {
        let node = self.0.borrow();
        let mut x = vec![0; b.len()];
        if transpose {
            node.transposed.solve(b, &mut x);
        } else {
            node.plain.solve(b, &mut x);
        }
        x
    }

    pub fn is_same(&self, other: &LinearSolver) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn deep_copy(&self, copies: &mut DeepCopyMap) -> Result<LinearSolver> {
        if let Some(s) = copies.solvers.get(&self.id()) {
            return Ok(s.clone());
        }
        let copy = LinearSolver::new(self.sparsity())?;
        copies.solvers.insert(self.id(), copy.clone());
        Ok(copy)
    }
}

impl fmt::Debug for LinearSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinearSolver({:?})", self.0.borrow().sparsity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_system_keeps_lanes_apart() {
        let s = LinearSolver::new(Sparsity::diag(3)).unwrap();
        assert_eq!(s.sp_solve(&[0b001, 0b010, 0b100], false), vec![0b001, 0b010, 0b100]);
    }

    #[test]
    fn lower_triangular_propagates_downwards_only() {
        // [a 0; b c]: x0 from b0, x1 from b0 and b1
        let sp = Sparsity::from_triplets(2, 2, &[(0, 0), (1, 0), (1, 1)]);
        let s = LinearSolver::new(sp).unwrap();
        assert_eq!(s.sp_solve(&[0b01, 0b10], false), vec![0b01, 0b11]);
        assert_eq!(s.sp_solve(&[0b01, 0b10], true), vec![0b11, 0b10]);
    }

    #[test]
    fn permuted_pattern_uses_matching() {
        // [0 a; b 0]: x1 from b0, x0 from b1
        let sp = Sparsity::from_triplets(2, 2, &[(0, 1), (1, 0)]);
        let s = LinearSolver::new(sp).unwrap();
        assert!(!s.is_structurally_singular());
        assert_eq!(s.sp_solve(&[0b01, 0b10], false), vec![0b10, 0b01]);
    }

    #[test]
    fn singular_pattern_is_conservative() {
        let sp = Sparsity::from_triplets(2, 2, &[(0, 0), (1, 0)]);
        let s = LinearSolver::new(sp).unwrap();
        assert!(s.is_structurally_singular());
        assert_eq!(s.sp_solve(&[0b01, 0b10], false), vec![0b11, 0b11]);
    }

    #[test]
    fn rectangular_pattern_is_rejected() {
        assert!(LinearSolver::new(Sparsity::dense(2, 3)).is_err());
    }
}
