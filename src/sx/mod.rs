//! Scalar expression graphs.
//!
//! An [`Sx`] is a reference-counted node in a directed acyclic graph of scalar
//! operations. Nodes are identified by address, so a shared subexpression is
//! evaluated and differentiated once. Construction folds constants and drops
//! additions of zero and multiplications by zero or one, which keeps the
//! structural dependencies of derived expressions tight.

mod ad;

pub use ad::{forward, reverse, sort};

use std::{
    fmt,
    ops::{Add, Div, Mul, Neg, Sub},
    rc::Rc,
};

use crate::{Float, sparsity::Sparsity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Sin,
    Cos,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Sq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

pub(crate) enum SxNode {
    Constant(Float),
    Symbol(String),
    Unary(UnaryOp, Sx),
    Binary(BinaryOp, Sx, Sx),
}

/// Scalar symbolic expression.
#[derive(Clone)]
pub struct Sx(pub(crate) Rc<SxNode>);

impl UnaryOp {
    pub fn apply(self, a: Float) -> Float {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Sin => a.sin(),
            UnaryOp::Cos => a.cos(),
            UnaryOp::Exp => a.exp(),
            UnaryOp::Log => a.ln(),
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Tanh => a.tanh(),
            UnaryOp::Sq => a * a,
        }
    }
}

impl BinaryOp {
    pub fn apply(self, a: Float, b: Float) -> Float {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

impl Sx {
    pub fn sym(name: &str) -> Sx {
        Sx(Rc::new(SxNode::Symbol(name.to_string())))
    }

    pub fn constant(v: Float) -> Sx {
        Sx(Rc::new(SxNode::Constant(v)))
    }

    pub fn zero() -> Sx {
        Sx::constant(0.0)
    }

    pub fn one() -> Sx {
        Sx::constant(1.0)
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(*self.0, SxNode::Symbol(_))
    }

    pub fn constant_value(&self) -> Option<Float> {
        match *self.0 {
            SxNode::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.constant_value() == Some(0.0)
    }

    pub fn is_one(&self) -> bool {
        self.constant_value() == Some(1.0)
    }

    /// Name of a symbol, `None` for any other node.
    pub fn name(&self) -> Option<&str> {
        match &*self.0 {
            SxNode::Symbol(n) => Some(n),
            _ => None,
        }
    }

    /// Address identity, stable for the lifetime of the node.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn is_same(&self, other: &Sx) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Operands of the node, in order.
    pub(crate) fn deps(&self) -> Vec<&Sx> {
        match &*self.0 {
            SxNode::Constant(_) | SxNode::Symbol(_) => Vec::new(),
            SxNode::Unary(_, a) => vec![a],
            SxNode::Binary(_, a, b) => vec![a, b],
        }
    }

    pub fn unary(op: UnaryOp, a: &Sx) -> Sx {
        if let Some(v) = a.constant_value() {
            return Sx::constant(op.apply(v));
        }
        Sx(Rc::new(SxNode::Unary(op, a.clone())))
    }

    pub fn binary(op: BinaryOp, a: &Sx, b: &Sx) -> Sx {
        if let (Some(x), Some(y)) = (a.constant_value(), b.constant_value()) {
            return Sx::constant(op.apply(x, y));
        }
        match op {
            BinaryOp::Add if a.is_zero() => return b.clone(),
            BinaryOp::Add | BinaryOp::Sub if b.is_zero() => return a.clone(),
            BinaryOp::Sub if a.is_zero() => return Sx::unary(UnaryOp::Neg, b),
            BinaryOp::Mul if a.is_zero() || b.is_zero() => return Sx::zero(),
            BinaryOp::Mul if a.is_one() => return b.clone(),
            BinaryOp::Mul | BinaryOp::Div if b.is_one() => return a.clone(),
            BinaryOp::Div if a.is_zero() => return Sx::zero(),
            _ => {}
        }
        Sx(Rc::new(SxNode::Binary(op, a.clone(), b.clone())))
    }

    pub fn sin(&self) -> Sx {
        Sx::unary(UnaryOp::Sin, self)
    }

    pub fn cos(&self) -> Sx {
        Sx::unary(UnaryOp::Cos, self)
    }

    pub fn exp(&self) -> Sx {
        Sx::unary(UnaryOp::Exp, self)
    }

    pub fn ln(&self) -> Sx {
        Sx::unary(UnaryOp::Log, self)
    }

    pub fn sqrt(&self) -> Sx {
        Sx::unary(UnaryOp::Sqrt, self)
    }

    pub fn tanh(&self) -> Sx {
        Sx::unary(UnaryOp::Tanh, self)
    }

    pub fn sq(&self) -> Sx {
        Sx::unary(UnaryOp::Sq, self)
    }
}

impl From<Float> for Sx {
    fn from(v: Float) -> Self {
        Sx::constant(v)
    }
}

impl fmt::Debug for Sx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            SxNode::Constant(v) => write!(f, "{}", v),
            SxNode::Symbol(n) => write!(f, "{}", n),
            SxNode::Unary(UnaryOp::Neg, a) => write!(f, "(-{:?})", a),
            SxNode::Unary(op, a) => write!(f, "{:?}({:?})", op, a),
            SxNode::Binary(op, a, b) => {
                let s = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                };
                write!(f, "({:?}{}{:?})", a, s, b)
            }
        }
    }
}

impl Neg for &Sx {
    type Output = Sx;
    fn neg(self) -> Sx {
        Sx::unary(UnaryOp::Neg, self)
    }
}

impl Neg for Sx {
    type Output = Sx;
    fn neg(self) -> Sx {
        -&self
    }
}

macro_rules! impl_sx_binary {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Sx> for &Sx {
            type Output = Sx;
            fn $method(self, rhs: &Sx) -> Sx {
                Sx::binary($op, self, rhs)
            }
        }
        impl $trait<Sx> for Sx {
            type Output = Sx;
            fn $method(self, rhs: Sx) -> Sx {
                Sx::binary($op, &self, &rhs)
            }
        }
        impl $trait<&Sx> for Sx {
            type Output = Sx;
            fn $method(self, rhs: &Sx) -> Sx {
                Sx::binary($op, &self, rhs)
            }
        }
        impl $trait<Sx> for &Sx {
            type Output = Sx;
            fn $method(self, rhs: Sx) -> Sx {
                Sx::binary($op, self, &rhs)
            }
        }
        impl $trait<Float> for &Sx {
            type Output = Sx;
            fn $method(self, rhs: Float) -> Sx {
                Sx::binary($op, self, &Sx::constant(rhs))
            }
        }
        impl $trait<Float> for Sx {
            type Output = Sx;
            fn $method(self, rhs: Float) -> Sx {
                Sx::binary($op, &self, &Sx::constant(rhs))
            }
        }
        impl $trait<&Sx> for Float {
            type Output = Sx;
            fn $method(self, rhs: &Sx) -> Sx {
                Sx::binary($op, &Sx::constant(self), rhs)
            }
        }
        impl $trait<Sx> for Float {
            type Output = Sx;
            fn $method(self, rhs: Sx) -> Sx {
                Sx::binary($op, &Sx::constant(self), &rhs)
            }
        }
    };
}

impl_sx_binary!(Add, add, BinaryOp::Add);
impl_sx_binary!(Sub, sub, BinaryOp::Sub);
impl_sx_binary!(Mul, mul, BinaryOp::Mul);
impl_sx_binary!(Div, div, BinaryOp::Div);

/// Scalar expressions laid out over a sparsity pattern, one per nonzero.
#[derive(Clone, Debug)]
pub struct SxMatrix {
    sparsity: Sparsity,
    nz: Vec<Sx>,
}

impl SxMatrix {
    /// Fresh symbols, one per structural nonzero, named `name_k`.
    pub fn sym(name: &str, sparsity: Sparsity) -> Self {
        let nz = (0..sparsity.nnz())
            .map(|k| Sx::sym(&format!("{}_{}", name, k)))
            .collect();
        Self { sparsity, nz }
    }

    /// Dense symbolic column vector.
    pub fn sym_column(name: &str, n: usize) -> Self {
        Self::sym(name, Sparsity::column(n))
    }

    pub fn zeros(sparsity: Sparsity) -> Self {
        let nz = (0..sparsity.nnz()).map(|_| Sx::zero()).collect();
        Self { sparsity, nz }
    }

    pub fn from_nonzeros(sparsity: Sparsity, nz: Vec<Sx>) -> Self {
        assert_eq!(sparsity.nnz(), nz.len(), "nonzero count does not match pattern");
        Self { sparsity, nz }
    }

    /// Dense column vector of the given expressions.
    pub fn column(elements: Vec<Sx>) -> Self {
        Self::from_nonzeros(Sparsity::column(elements.len()), elements)
    }

    /// Structurally empty `0 x 1` column.
    pub fn empty() -> Self {
        Self::zeros(Sparsity::column(0))
    }

    pub fn sparsity(&self) -> &Sparsity {
        &self.sparsity
    }

    pub fn nonzeros(&self) -> &[Sx] {
        &self.nz
    }

    pub fn nnz(&self) -> usize {
        self.nz.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.sparsity.shape()
    }

    /// Expression of nonzero `k`.
    pub fn at(&self, k: usize) -> &Sx {
        &self.nz[k]
    }

    /// See [`crate::matrix::DMatrix::project`].
    pub fn project(&self, sparsity: &Sparsity) -> SxMatrix {
        if &self.sparsity == sparsity {
            return self.clone();
        }
        let mut nz = vec![Sx::zero(); sparsity.nnz()];
        for (k, (r, c)) in self.sparsity.entries().enumerate() {
            if let Some(j) = sparsity.get_nz(r, c) {
                nz[j] = self.nz[k].clone();
            }
        }
        SxMatrix::from_nonzeros(sparsity.clone(), nz)
    }
}
