//! Convenient prelude: import the most commonly used traits, types, and functions.
//!
//! Bring this into scope with:
//!
//! ```rust
//! use daesens::prelude::*;
//! ```
//!
//! Re-exports included:
//! - Integrator and method: `Integrator`, `Stepper`, `RkStepper`, `RkSettings`.
//! - Callbacks: `Function`, `SxFunction`, `MxFunction`, `Sx`, `SxMatrix`, `Mx`.
//! - Port schemes and values: `DaeIn`, `DaeOut`, `RdaeIn`, `RdaeOut`,
//!   `IntegratorInput`, `IntegratorOutput`, `DMatrix`, `Sparsity`.

pub use crate::{
    DMatrix, DaeIn, DaeOut, Error, Float, Function, Integrator, IntegratorInput, IntegratorOutput, Mx, MxFunction,
    RdaeIn, RdaeOut, RkSettings, RkStepper, Sparsity, Stepper, Sx, SxFunction, SxMatrix,
};
