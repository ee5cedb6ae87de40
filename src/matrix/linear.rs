//! Linear solves: A x = b via LU with partial pivoting.

use std::ops::{Index, IndexMut};

use crate::{Float, error::{Error, Result}};

/// Square dense matrix in row-major storage.
#[derive(Clone, Debug)]
pub struct DenseMatrix {
    n: usize,
    data: Vec<Float>,
}

impl DenseMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Solve A x = b, returning x.
    pub fn lin_solve(&self, b: &[Float]) -> Result<Vec<Float>> {
        let mut b_copy = b.to_vec();
        self.lin_solve_mut(&mut b_copy)?;
        Ok(b_copy)
    }

    /// In-place solve: overwrites `b` with `x`.
    pub fn lin_solve_mut(&self, b: &mut [Float]) -> Result<()> {
        let n = self.n;
        assert_eq!(
            b.len(),
            n,
            "dimension mismatch in solve: A is {}x{}, b has length {}",
            n,
            n,
            b.len()
        );
        let mut a = self.data.clone();

        // LU with partial pivoting, applying permutations to b
        for k in 0..n {
            let mut pivot_row = k;
            let mut pivot_val = a[k * n + k].abs();
            for i in (k + 1)..n {
                let val = a[i * n + k].abs();
                if val > pivot_val {
                    pivot_val = val;
                    pivot_row = i;
                }
            }
            if pivot_val == 0.0 {
                return Err(Error::SingularMatrix);
            }
            if pivot_row != k {
                for j in 0..n {
                    a.swap(k * n + j, pivot_row * n + j);
                }
                b.swap(k, pivot_row);
            }
            // Eliminate below the pivot
            let akk = a[k * n + k];
            for i in (k + 1)..n {
                let factor = a[i * n + k] / akk;
                a[i * n + k] = factor;
                for j in (k + 1)..n {
                    a[i * n + j] -= factor * a[k * n + j];
                }
            }
        }

        // Forward solve Ly = Pb (b is permuted)
        for i in 0..n {
            let mut sum = b[i];
            for k in 0..i {
                sum -= a[i * n + k] * b[k];
            }
            b[i] = sum;
        }
        // Backward solve Ux = y
        for i in (0..n).rev() {
            let mut sum = b[i];
            for k in (i + 1)..n {
                sum -= a[i * n + k] * b[k];
            }
            b[i] = sum / a[i * n + i];
        }
        Ok(())
    }
}

impl Index<(usize, usize)> for DenseMatrix {
    type Output = Float;

    fn index(&self, (i, j): (usize, usize)) -> &Float {
        &self.data[i * self.n + j]
    }
}

impl IndexMut<(usize, usize)> for DenseMatrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Float {
        &mut self.data[i * self.n + j]
    }
}

#[cfg(test)]
mod tests {
    use super::DenseMatrix;

    #[test]
    fn solve_full_2x2() {
        // A = [[3, 2],[1, 4]], b = [5, 6] -> x = [0.8, 1.3]
        let mut a = DenseMatrix::zeros(2);
        a[(0, 0)] = 3.0;
        a[(0, 1)] = 2.0;
        a[(1, 0)] = 1.0;
        a[(1, 1)] = 4.0;
        let x = a.lin_solve(&[5.0, 6.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.3).abs() < 1e-12);
    }

    #[test]
    fn singular_is_reported() {
        let mut a = DenseMatrix::zeros(2);
        a[(0, 0)] = 1.0;
        a[(1, 0)] = 2.0;
        assert!(a.lin_solve(&[1.0, 1.0]).is_err());
    }
}
