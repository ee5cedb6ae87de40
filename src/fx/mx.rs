//! Vector expression graphs.
//!
//! An [`Mx`] node stands for a whole column vector with a fixed sparsity
//! pattern. Nodes are immutable and shared; identity is by address.

use std::{fmt, rc::Rc};

use crate::{
    error::{Error, Result},
    sparsity::Sparsity,
};

use super::Function;

pub(crate) struct CallNode {
    pub(crate) f: Function,
    pub(crate) args: Vec<Mx>,
}

pub(crate) fn call_id(call: &Rc<CallNode>) -> usize {
    Rc::as_ptr(call) as *const () as usize
}

pub(crate) enum MxOp {
    Symbol(String),
    Zeros,
    /// Result nonzero `k` is argument nonzero `src[k]`, or zero for `None`.
    /// Every argument nonzero is used at most once.
    Remap { arg: Mx, src: Vec<Option<usize>> },
    VertCat(Vec<Mx>),
    /// Both operands carry the result pattern.
    Add(Mx, Mx),
    Output { call: Rc<CallNode>, index: usize },
}

pub(crate) struct MxNode {
    pub(crate) sparsity: Sparsity,
    pub(crate) op: MxOp,
}

/// Symbolic column vector.
#[derive(Clone)]
pub struct Mx(pub(crate) Rc<MxNode>);

impl Mx {
    fn node(sparsity: Sparsity, op: MxOp) -> Mx {
        Mx(Rc::new(MxNode { sparsity, op }))
    }

    pub fn sym(name: &str, sparsity: Sparsity) -> Mx {
        Mx::node(sparsity, MxOp::Symbol(name.to_string()))
    }

    pub fn zeros(sparsity: Sparsity) -> Mx {
        Mx::node(sparsity, MxOp::Zeros)
    }

    /// Placeholder for an argument that is absent; calls replace it by zeros
    /// of the expected pattern.
    pub fn empty() -> Mx {
        Mx::zeros(Sparsity::empty(0, 0))
    }

    pub fn sparsity(&self) -> &Sparsity {
        &self.0.sparsity
    }

    pub fn shape(&self) -> (usize, usize) {
        self.0.sparsity.shape()
    }

    pub fn nnz(&self) -> usize {
        self.0.sparsity.nnz()
    }

    pub fn is_empty(&self) -> bool {
        self.0.sparsity.numel() == 0
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.0.op, MxOp::Symbol(_))
    }

    pub fn name(&self) -> Option<&str> {
        match &self.0.op {
            MxOp::Symbol(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn remap(arg: &Mx, src: Vec<Option<usize>>, sparsity: Sparsity) -> Mx {
        debug_assert_eq!(src.len(), sparsity.nnz());
        if matches!(arg.0.op, MxOp::Zeros) || src.iter().all(Option::is_none) {
            return Mx::zeros(sparsity);
        }
        Mx::node(sparsity, MxOp::Remap { arg: arg.clone(), src })
    }

    /// Same values in another pattern of the same shape.
    pub fn project(&self, sparsity: &Sparsity) -> Mx {
        if self.sparsity() == sparsity {
            return self.clone();
        }
        assert_eq!(self.shape(), sparsity.shape(), "projection between mismatched shapes");
        let src = sparsity
            .entries()
            .map(|(r, c)| self.sparsity().get_nz(r, c))
            .collect();
        Mx::remap(self, src, sparsity.clone())
    }

    pub fn densify(&self) -> Mx {
        let (nrow, ncol) = self.shape();
        self.project(&Sparsity::dense(nrow, ncol))
    }

    /// Stack column vectors; parts without elements are skipped.
    pub fn vertcat(parts: &[Mx]) -> Mx {
        let parts: Vec<Mx> = parts.iter().filter(|p| !p.is_empty()).cloned().collect();
        match parts.len() {
            0 => Mx::zeros(Sparsity::column(0)),
            1 => parts[0].clone(),
            _ => {
                let patterns: Vec<&Sparsity> = parts.iter().map(Mx::sparsity).collect();
                let sparsity = Sparsity::vertcat(&patterns);
                Mx::node(sparsity, MxOp::VertCat(parts))
            }
        }
    }

    /// Split a column vector at cumulative row offsets.
    pub fn vertsplit(&self, offsets: &[usize]) -> Vec<Mx> {
        assert!(self.sparsity().is_column(), "vertsplit of a non-column");
        let rows = self.sparsity().row();
        offsets
            .windows(2)
            .map(|w| {
                let (begin, end) = (w[0], w[1]);
                let mut sub_rows = Vec::new();
                let mut src = Vec::new();
                for (k, &r) in rows.iter().enumerate() {
                    if r >= begin && r < end {
                        sub_rows.push(r - begin);
                        src.push(Some(k));
                    }
                }
                Mx::remap(self, src, Sparsity::sparse_column(end - begin, &sub_rows))
            })
            .collect()
    }

    /// Element-wise sum over the union pattern.
    pub fn add(&self, other: &Mx) -> Mx {
        if matches!(other.0.op, MxOp::Zeros) && other.shape() == self.shape() {
            return self.project(&self.sparsity().union(other.sparsity()));
        }
        if matches!(self.0.op, MxOp::Zeros) && other.shape() == self.shape() {
            return other.project(&self.sparsity().union(other.sparsity()));
        }
        let sparsity = self.sparsity().union(other.sparsity());
        Mx::node(sparsity.clone(), MxOp::Add(self.project(&sparsity), other.project(&sparsity)))
    }

    /// Record a call of `f`. Empty arguments stand for zeros; arguments of the
    /// right shape are projected onto the declared input pattern.
    pub fn call(f: &Function, args: &[Mx]) -> Result<Vec<Mx>> {
        if args.len() != f.n_in() {
            return Err(Error::ArgumentCount {
                function: f.name(),
                expected: f.n_in(),
                got: args.len(),
            });
        }
        let args = args
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let sp = f.input_sparsity(i);
                if a.is_empty() {
                    return Ok(Mx::zeros(sp));
                }
                if a.shape() != sp.shape() {
                    return Err(Error::ShapeMismatch {
                        what: format!("argument {} of {}", i, f.name()),
                        expected: sp.shape(),
                        got: a.shape(),
                    });
                }
                Ok(a.project(&sp))
            })
            .collect::<Result<Vec<_>>>()?;
        let call = Rc::new(CallNode { f: f.clone(), args });
        Ok((0..f.n_out())
            .map(|index| {
                Mx::node(
                    f.output_sparsity(index),
                    MxOp::Output {
                        call: call.clone(),
                        index,
                    },
                )
            })
            .collect())
    }
}

impl std::ops::Add for &Mx {
    type Output = Mx;
    fn add(self, rhs: &Mx) -> Mx {
        Mx::add(self, rhs)
    }
}

impl fmt::Debug for Mx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (nrow, ncol) = self.shape();
        match &self.0.op {
            MxOp::Symbol(n) => write!(f, "{}[{}x{}]", n, nrow, ncol),
            MxOp::Zeros => write!(f, "zeros[{}x{}]", nrow, ncol),
            MxOp::Remap { arg, .. } => write!(f, "remap({:?})[{}x{}]", arg, nrow, ncol),
            MxOp::VertCat(parts) => write!(f, "vertcat({:?})", parts),
            MxOp::Add(a, b) => write!(f, "({:?}+{:?})", a, b),
            MxOp::Output { call, index } => write!(f, "{}(...){{{}}}", call.f.name(), index),
        }
    }
}
