//! Core of a DAE integrator with automatic sensitivity analysis.
//!
//! An [`Integrator`] solves a semi-explicit DAE
//!
//! ```text
//! dx/dt = ode(t, x, z, p),   0 = alg(t, x, z, p),   dq/dt = quad(t, x, z, p)
//! ```
//!
//! forward over `[t0, tf]`, optionally followed by a backward problem in
//! `(rx, rz, rq)` driven by the forward solution. On top of any numerical
//! method (a [`Stepper`]) it provides:
//!
//! - forward and adjoint sensitivities, by building an augmented DAE whose
//!   states stack the nominal states with their tangents and adjoints
//!   ([`Integrator::augmented`], [`Integrator::derivative`]);
//! - structural dependency propagation from inputs to outputs and back
//!   ([`Integrator::sp_evaluate`], [`Integrator::jac_sparsity`]).
//!
//! DAE callbacks are [`Function`]s, either scalar expression tapes
//! ([`SxFunction`]) or vector graphs of calls ([`MxFunction`]).

mod error;
mod linsol;
mod options;
mod scheme;
mod sparsity;

pub mod fx;
pub mod integrator;
pub mod matrix;
pub mod prelude;
pub mod rk;
pub mod sx;

pub use error::{Error, Result};
pub use fx::{DeepCopyMap, Function, FunctionKind, FunctionNode, Mx, MxFunction, SxFunction};
pub use integrator::{AugOffset, AugmentedProblem, Dims, Integrator, IntegratorCore, IntegratorDerivative, Phase, Stepper};
pub use linsol::LinearSolver;
pub use matrix::{Bvec, DMatrix};
pub use options::{Dictionary, OptionType, OptionValue, Options};
pub use rk::{RkSettings, RkStepper};
pub use scheme::{DaeIn, DaeOut, IntegratorInput, IntegratorOutput, RdaeIn, RdaeOut};
pub use sparsity::Sparsity;
pub use sx::{Sx, SxMatrix};

// Prevent selecting two incompatible float precision features at once.
#[cfg(all(feature = "f32", feature = "f64"))]
compile_error!(
    "features 'f32' and 'f64' cannot both be enabled; pick exactly one Float precision feature"
);

/// Change this to f128, f64, f32 as desired.
#[cfg(feature = "f32")]
pub type Float = f32;
#[cfg(feature = "f64")]
pub type Float = f64;
