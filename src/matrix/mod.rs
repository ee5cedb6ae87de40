//! Numeric matrices over a sparsity pattern, and dense Newton matrices.

mod linear;

pub use linear::DenseMatrix;

use crate::{Float, sparsity::Sparsity};

/// One lane mask per structural nonzero, used for dependency propagation.
/// Each of the 64 bits tracks an independent seed.
pub type Bvec = u64;

/// Numeric matrix storing only the structural nonzeros of its pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct DMatrix {
    sparsity: Sparsity,
    data: Vec<Float>,
}

impl DMatrix {
    pub fn zeros(sparsity: Sparsity) -> Self {
        let data = vec![0.0; sparsity.nnz()];
        Self { sparsity, data }
    }

    /// Wrap nonzero values in a pattern.
    pub fn from_nonzeros(sparsity: Sparsity, data: Vec<Float>) -> Self {
        assert_eq!(sparsity.nnz(), data.len(), "nonzero count does not match pattern");
        Self { sparsity, data }
    }

    /// Dense column vector.
    pub fn column(values: &[Float]) -> Self {
        Self::from_nonzeros(Sparsity::column(values.len()), values.to_vec())
    }

    pub fn scalar(value: Float) -> Self {
        Self::from_nonzeros(Sparsity::scalar(), vec![value])
    }

    pub fn sparsity(&self) -> &Sparsity {
        &self.sparsity
    }

    pub fn data(&self) -> &[Float] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Float] {
        &mut self.data
    }

    /// Number of structural nonzeros.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.sparsity.shape()
    }

    /// Copy nonzeros from a matrix with the same pattern.
    pub fn set(&mut self, other: &DMatrix) {
        assert_eq!(self.sparsity, other.sparsity, "set from a matrix with a different pattern");
        self.data.copy_from_slice(&other.data);
    }

    /// Overwrite the nonzeros from a slice.
    pub fn set_nonzeros(&mut self, values: &[Float]) {
        self.data.copy_from_slice(values);
    }

    pub fn fill(&mut self, value: Float) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Re-express in another pattern of the same shape: entries missing from
    /// `sparsity` are dropped, entries missing from `self` become zero.
    pub fn project(&self, sparsity: &Sparsity) -> DMatrix {
        assert_eq!(self.shape(), sparsity.shape(), "projection between mismatched shapes");
        if &self.sparsity == sparsity {
            return self.clone();
        }
        let mut ret = DMatrix::zeros(sparsity.clone());
        for (k, (r, c)) in self.sparsity.entries().enumerate() {
            if let Some(j) = sparsity.get_nz(r, c) {
                ret.data[j] = self.data[k];
            }
        }
        ret
    }

    pub fn densify(&self) -> DMatrix {
        let (nrow, ncol) = self.shape();
        self.project(&Sparsity::dense(nrow, ncol))
    }

    /// Dense element values of a column vector.
    pub fn to_dense_vec(&self) -> Vec<Float> {
        self.densify().data
    }

    /// Stack column vectors.
    pub fn vertcat(parts: &[DMatrix]) -> DMatrix {
        let patterns: Vec<&Sparsity> = parts.iter().map(|p| &p.sparsity).collect();
        let sparsity = Sparsity::vertcat(&patterns);
        let data = parts.iter().flat_map(|p| p.data.iter().copied()).collect();
        DMatrix::from_nonzeros(sparsity, data)
    }

    /// Split a dense column vector at cumulative row offsets.
    pub fn vertsplit(&self, offsets: &[usize]) -> Vec<DMatrix> {
        let dense = self.densify();
        offsets
            .windows(2)
            .map(|w| DMatrix::column(&dense.data[w[0]..w[1]]))
            .collect()
    }
}
