//! Function capability interface and its two representations.
//!
//! A [`Function`] is a shared handle to a [`FunctionNode`]. Two node kinds
//! exist: [`SxFunction`], a flat tape of scalar operations, and
//! [`MxFunction`], a graph over vector blocks that may call other functions.
//! Both expose the same capabilities: numeric and symbolic calls, derivative
//! generation for any number of forward and adjoint directions, structural
//! Jacobian queries and bit-vector dependency propagation in both directions.
//!
//! A derivative function for `(nfwd, nadj)` takes the nominal inputs, then
//! `nfwd` blocks of forward seeds (one per input), then `nadj` blocks of
//! adjoint seeds (one per output). It returns the nominal outputs, then `nfwd`
//! blocks of forward sensitivities (one per output), then `nadj` blocks of
//! adjoint sensitivities (one per input).

mod mx;
mod mx_function;
mod sx_function;

pub use mx::Mx;
pub use mx_function::MxFunction;
pub use sx_function::SxFunction;

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use crate::{
    error::{Error, Result},
    linsol::LinearSolver,
    matrix::{Bvec, DMatrix},
    sparsity::Sparsity,
    sx::SxMatrix,
};

/// Representation of a function node, checked before expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Inlined scalar form.
    Sx,
    /// General vector graph.
    Mx,
}

/// Capabilities every function representation provides.
///
/// Arguments reaching a node have already been checked by [`Function`]: the
/// count matches and every argument carries the declared input pattern.
pub trait FunctionNode {
    fn name(&self) -> &str;
    fn kind(&self) -> FunctionKind;
    fn n_in(&self) -> usize;
    fn n_out(&self) -> usize;
    fn input_sparsity(&self, i: usize) -> &Sparsity;
    fn output_sparsity(&self, i: usize) -> &Sparsity;

    fn init(&mut self) -> Result<()>;
    fn is_init(&self) -> bool;

    fn eval(&self, args: &[DMatrix]) -> Result<Vec<DMatrix>>;
    /// Evaluate with scalar expressions, inlining the whole body.
    fn eval_sx(&self, args: &[SxMatrix]) -> Result<Vec<SxMatrix>>;

    /// Forward dependency propagation: `res` is overwritten with the lanes of
    /// `arg` each output nonzero can depend on.
    fn sp_forward(&self, arg: &[Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()>;
    /// Reverse dependency propagation: the lanes seeded on `res` are OR-ed into
    /// every argument nonzero they can depend on, and `res` is cleared.
    fn sp_reverse(&self, arg: &mut [Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()>;

    fn derivative(&self, nfwd: usize, nadj: usize) -> Result<Function>;

    fn deep_copy(&self, copies: &mut DeepCopyMap) -> Function;
}

/// Visited map threaded through a deep copy so that every shared node is
/// copied exactly once.
#[derive(Default)]
pub struct DeepCopyMap {
    pub(crate) functions: HashMap<usize, Function>,
    pub(crate) solvers: HashMap<usize, LinearSolver>,
}

impl DeepCopyMap {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared, reference-counted handle to a function node.
#[derive(Clone)]
pub struct Function(Rc<RefCell<dyn FunctionNode>>);

impl Function {
    pub fn new(node: impl FunctionNode + 'static) -> Self {
        Function(Rc::new(RefCell::new(node)))
    }

    pub fn init(&self) -> Result<()> {
        if self.is_init() {
            return Ok(());
        }
        self.0.borrow_mut().init()
    }

    pub fn is_init(&self) -> bool {
        self.0.borrow().is_init()
    }

    pub fn name(&self) -> String {
        self.0.borrow().name().to_string()
    }

    pub fn kind(&self) -> FunctionKind {
        self.0.borrow().kind()
    }

    pub fn n_in(&self) -> usize {
        self.0.borrow().n_in()
    }

    pub fn n_out(&self) -> usize {
        self.0.borrow().n_out()
    }

    pub fn input_sparsity(&self, i: usize) -> Sparsity {
        self.0.borrow().input_sparsity(i).clone()
    }

    pub fn output_sparsity(&self, i: usize) -> Sparsity {
        self.0.borrow().output_sparsity(i).clone()
    }

    /// Same underlying node.
    pub fn is_same(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Numeric evaluation.
    pub fn call(&self, args: &[DMatrix]) -> Result<Vec<DMatrix>> {
        self.init()?;
        let node = self.0.borrow();
        check_count(&*node, args.len())?;
        let args = args
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let sp = node.input_sparsity(i);
                if a.sparsity().numel() == 0 {
                    return Ok(DMatrix::zeros(sp.clone()));
                }
                check_shape(&*node, i, a.shape())?;
                Ok(a.project(sp))
            })
            .collect::<Result<Vec<_>>>()?;
        node.eval(&args)
    }

    /// Inlined scalar evaluation.
    pub fn call_sx(&self, args: &[SxMatrix]) -> Result<Vec<SxMatrix>> {
        self.init()?;
        let node = self.0.borrow();
        check_count(&*node, args.len())?;
        let args = args
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let sp = node.input_sparsity(i);
                if a.sparsity().numel() == 0 {
                    return Ok(SxMatrix::zeros(sp.clone()));
                }
                check_shape(&*node, i, a.shape())?;
                Ok(a.project(sp))
            })
            .collect::<Result<Vec<_>>>()?;
        node.eval_sx(&args)
    }

    /// Symbolic call, recorded as a call node in a vector graph.
    pub fn call_mx(&self, args: &[Mx]) -> Result<Vec<Mx>> {
        self.init()?;
        Mx::call(self, args)
    }

    pub fn derivative(&self, nfwd: usize, nadj: usize) -> Result<Function> {
        self.init()?;
        let d = self.0.borrow().derivative(nfwd, nadj)?;
        d.init()?;
        Ok(d)
    }

    pub fn sp_forward(&self, arg: &[Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()> {
        self.init()?;
        self.0.borrow().sp_forward(arg, res)
    }

    pub fn sp_reverse(&self, arg: &mut [Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()> {
        self.init()?;
        self.0.borrow().sp_reverse(arg, res)
    }

    /// Structural Jacobian of output `oind` with respect to input `iind`,
    /// with one row per output nonzero and one column per input nonzero.
    pub fn jac_sparsity(&self, iind: usize, oind: usize) -> Result<Sparsity> {
        self.init()?;
        let arg_sp: Vec<Sparsity> = (0..self.n_in()).map(|i| self.input_sparsity(i)).collect();
        let res_sp: Vec<Sparsity> = (0..self.n_out()).map(|i| self.output_sparsity(i)).collect();
        let n_col = arg_sp[iind].nnz();
        let n_row = res_sp[oind].nnz();
        let mut arg: Vec<Vec<Bvec>> = arg_sp.iter().map(|s| vec![0; s.nnz()]).collect();
        let mut res: Vec<Vec<Bvec>> = res_sp.iter().map(|s| vec![0; s.nnz()]).collect();
        let mut entries = Vec::new();
        for offset in (0..n_col).step_by(Bvec::BITS as usize) {
            let lanes = (n_col - offset).min(Bvec::BITS as usize);
            arg[iind].iter_mut().for_each(|b| *b = 0);
            for lane in 0..lanes {
                arg[iind][offset + lane] = 1 << lane;
            }
            self.sp_forward(&arg, &mut res)?;
            for (r, bits) in res[oind].iter().enumerate() {
                for lane in 0..lanes {
                    if bits & (1 << lane) != 0 {
                        entries.push((r, offset + lane));
                    }
                }
            }
        }
        Ok(Sparsity::from_triplets(n_row, n_col, &entries))
    }

    /// Copy the node (and everything it references) unless this deep copy
    /// has already copied it.
    pub fn deep_copy(&self, copies: &mut DeepCopyMap) -> Function {
        if let Some(f) = copies.functions.get(&self.id()) {
            return f.clone();
        }
        let copy = self.0.borrow().deep_copy(copies);
        copies.functions.insert(self.id(), copy.clone());
        copy
    }

    /// Scalar-form copy of this function. Scalar tapes are returned as they
    /// are; vector graphs are evaluated symbolically into a new tape.
    pub fn expand(&self) -> Result<Function> {
        self.init()?;
        match self.kind() {
            FunctionKind::Sx => Ok(self.clone()),
            FunctionKind::Mx => {
                let node = self.0.borrow();
                let n_in = node.n_in();
                let inputs: Vec<SxMatrix> = (0..n_in)
                    .map(|i| SxMatrix::sym(&format!("{}_i{}", node.name(), i), node.input_sparsity(i).clone()))
                    .collect();
                let outputs = node.eval_sx(&inputs)?;
                let f = Function::new(SxFunction::new(node.name(), inputs, outputs));
                f.init()?;
                Ok(f)
            }
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.0.borrow();
        write!(f, "Function({}, {:?}, {} -> {})", node.name(), node.kind(), node.n_in(), node.n_out())
    }
}

fn check_count(node: &dyn FunctionNode, got: usize) -> Result<()> {
    if got != node.n_in() {
        return Err(Error::ArgumentCount {
            function: node.name().to_string(),
            expected: node.n_in(),
            got,
        });
    }
    Ok(())
}

fn check_shape(node: &dyn FunctionNode, i: usize, got: (usize, usize)) -> Result<()> {
    let expected = node.input_sparsity(i).shape();
    if got != expected {
        return Err(Error::ShapeMismatch {
            what: format!("argument {} of {}", i, node.name()),
            expected,
            got,
        });
    }
    Ok(())
}

/// Split a flat list of nonzeros into matrices with the given patterns.
pub(crate) fn split_nonzeros<T: Clone>(flat: &[T], patterns: &[Sparsity]) -> Vec<Vec<T>> {
    let mut offset = 0;
    patterns
        .iter()
        .map(|sp| {
            let part = flat[offset..offset + sp.nnz()].to_vec();
            offset += sp.nnz();
            part
        })
        .collect()
}
