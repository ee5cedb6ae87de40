//! Compressed-column sparsity patterns

use std::fmt;

/// Structural nonzero pattern of an `nrow x ncol` matrix in compressed-column
/// form. Row indices are sorted within each column.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Sparsity {
    nrow: usize,
    ncol: usize,
    colind: Vec<usize>,
    row: Vec<usize>,
}

impl Sparsity {
    /// Construct from raw compressed-column data.
    pub fn new(nrow: usize, ncol: usize, colind: Vec<usize>, row: Vec<usize>) -> Self {
        debug_assert_eq!(colind.len(), ncol + 1);
        debug_assert_eq!(colind[ncol], row.len());
        debug_assert!(row.iter().all(|&r| r < nrow));
        Self {
            nrow,
            ncol,
            colind,
            row,
        }
    }

    pub fn dense(nrow: usize, ncol: usize) -> Self {
        let colind = (0..=ncol).map(|c| c * nrow).collect();
        let row = (0..ncol).flat_map(|_| 0..nrow).collect();
        Self::new(nrow, ncol, colind, row)
    }

    /// Dense `n x 1` column.
    pub fn column(n: usize) -> Self {
        Self::dense(n, 1)
    }

    /// Structurally empty `nrow x ncol` pattern.
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        Self::new(nrow, ncol, vec![0; ncol + 1], Vec::new())
    }

    /// `1 x 1` dense scalar.
    pub fn scalar() -> Self {
        Self::dense(1, 1)
    }

    pub fn diag(n: usize) -> Self {
        Self::new(n, n, (0..=n).collect(), (0..n).collect())
    }

    /// Column vector with nonzeros at the given rows.
    pub fn sparse_column(nrow: usize, rows: &[usize]) -> Self {
        let mut row = rows.to_vec();
        row.sort_unstable();
        row.dedup();
        Self::new(nrow, 1, vec![0, row.len()], row)
    }

    /// Build from (row, col) pairs; duplicates are merged.
    pub fn from_triplets(nrow: usize, ncol: usize, entries: &[(usize, usize)]) -> Self {
        let mut cols: Vec<Vec<usize>> = vec![Vec::new(); ncol];
        for &(r, c) in entries {
            cols[c].push(r);
        }
        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::with_capacity(entries.len());
        colind.push(0);
        for mut rows in cols {
            rows.sort_unstable();
            rows.dedup();
            row.extend(rows);
            colind.push(row.len());
        }
        Self::new(nrow, ncol, colind, row)
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    /// Number of structural nonzeros.
    pub fn nnz(&self) -> usize {
        self.row.len()
    }

    pub fn numel(&self) -> usize {
        self.nrow * self.ncol
    }

    pub fn is_dense(&self) -> bool {
        self.nnz() == self.numel()
    }

    pub fn is_column(&self) -> bool {
        self.ncol == 1 || self.numel() == 0
    }

    pub fn colind(&self) -> &[usize] {
        &self.colind
    }

    pub fn row(&self) -> &[usize] {
        &self.row
    }

    /// Iterate over `(row, col)` of all structural nonzeros in storage order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.ncol).flat_map(move |c| {
            self.row[self.colind[c]..self.colind[c + 1]]
                .iter()
                .map(move |&r| (r, c))
        })
    }

    /// Nonzero index of entry `(r, c)`, if structurally present.
    pub fn get_nz(&self, r: usize, c: usize) -> Option<usize> {
        let start = self.colind[c];
        let rows = &self.row[start..self.colind[c + 1]];
        rows.binary_search(&r).ok().map(|k| start + k)
    }

    /// Union of two patterns of equal shape.
    pub fn union(&self, other: &Sparsity) -> Sparsity {
        assert_eq!(self.shape(), other.shape(), "pattern union of mismatched shapes");
        let entries: Vec<_> = self.entries().chain(other.entries()).collect();
        Self::from_triplets(self.nrow, self.ncol, &entries)
    }

    pub fn transpose(&self) -> Sparsity {
        let entries: Vec<_> = self.entries().map(|(r, c)| (c, r)).collect();
        Self::from_triplets(self.ncol, self.nrow, &entries)
    }

    /// Horizontal concatenation; all parts must have the same row count.
    pub fn horzcat(parts: &[&Sparsity]) -> Sparsity {
        let nrow = parts.first().map_or(0, |p| p.nrow);
        let mut colind = vec![0];
        let mut row = Vec::new();
        let mut ncol = 0;
        for p in parts {
            assert_eq!(p.nrow, nrow, "horzcat of mismatched row counts");
            for c in 0..p.ncol {
                row.extend_from_slice(&p.row[p.colind[c]..p.colind[c + 1]]);
                colind.push(row.len());
            }
            ncol += p.ncol;
        }
        Self::new(nrow, ncol, colind, row)
    }

    /// Vertical concatenation; all parts must have the same column count.
    /// Parts with no elements are skipped.
    pub fn vertcat(parts: &[&Sparsity]) -> Sparsity {
        let parts: Vec<&Sparsity> = parts.iter().copied().filter(|p| p.numel() > 0).collect();
        let ncol = parts.first().map_or(1, |p| p.ncol);
        let mut entries = Vec::new();
        let mut offset = 0;
        for p in &parts {
            assert_eq!(p.ncol, ncol, "vertcat of mismatched column counts");
            entries.extend(p.entries().map(|(r, c)| (r + offset, c)));
            offset += p.nrow;
        }
        Self::from_triplets(offset, ncol, &entries)
    }
}

impl fmt::Debug for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sparsity({}x{}, nnz={})", self.nrow, self.ncol, self.nnz())
    }
}
