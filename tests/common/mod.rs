#![allow(dead_code)]

use daesens::prelude::*;

pub const TOL: Float = 1e-6;

pub fn close(a: Float, b: Float) -> bool {
    (a - b).abs() < TOL
}

/// Callback inputs `[t, x, z, p]` with the given sizes.
fn dae_inputs(nx: usize, nz: usize, np: usize) -> Vec<SxMatrix> {
    vec![
        SxMatrix::sym_column("t", 1),
        SxMatrix::sym_column("x", nx),
        SxMatrix::sym_column("z", nz),
        SxMatrix::sym_column("p", np),
    ]
}

/// `x' = -p x`, `q' = x`. From `x0 = 1`, `p = 1` over `[0, 1]`:
/// `xf = e^-1`, `qf = 1 - e^-1`.
pub fn decay() -> Function {
    let inputs = dae_inputs(1, 0, 1);
    let (x, p) = (inputs[1].at(0).clone(), inputs[3].at(0).clone());
    let ode = SxMatrix::column(vec![-(&p * &x)]);
    let quad = SxMatrix::column(vec![x]);
    Function::new(SxFunction::new("decay", inputs, vec![ode, SxMatrix::empty(), quad]))
}

/// `x' = -p x` without quadratures.
pub fn decay_without_quadrature() -> Function {
    let inputs = dae_inputs(1, 0, 1);
    let (x, p) = (inputs[1].at(0).clone(), inputs[3].at(0).clone());
    let ode = SxMatrix::column(vec![-(&p * &x)]);
    Function::new(SxFunction::new("decay", inputs, vec![ode, SxMatrix::empty(), SxMatrix::empty()]))
}

/// Index-1 DAE `x' = -p z / 2`, `0 = z^3 - 8 x^3`, so that `z = 2 x` and
/// `x = e^(-p t)`.
pub fn decay_dae() -> Function {
    let inputs = dae_inputs(1, 1, 1);
    let (x, z, p) = (inputs[1].at(0).clone(), inputs[2].at(0).clone(), inputs[3].at(0).clone());
    let ode = SxMatrix::column(vec![-(&(&p * &z) * 0.5)]);
    let alg = SxMatrix::column(vec![&(&z.sq() * &z) - &(&(&x.sq() * &x) * 8.0)]);
    Function::new(SxFunction::new("decay_dae", inputs, vec![ode, alg, SxMatrix::empty()]))
}

/// `x' = -p x` on the first row of a two-row state column whose second row
/// is structurally zero, with quadrature `q' = x`.
pub fn sparse_decay() -> Function {
    let x_sp = Sparsity::sparse_column(2, &[0]);
    let t = SxMatrix::sym_column("t", 1);
    let x = SxMatrix::sym("x", x_sp.clone());
    let z = SxMatrix::sym_column("z", 0);
    let p = SxMatrix::sym_column("p", 1);
    let (xs, ps) = (x.at(0).clone(), p.at(0).clone());
    let ode = SxMatrix::from_nonzeros(x_sp, vec![-(&ps * &xs)]);
    let quad = SxMatrix::column(vec![xs]);
    Function::new(SxFunction::new("sparse_decay", vec![t, x, z, p], vec![ode, SxMatrix::empty(), quad]))
}

/// Two decoupled states: `x0' = -p x0`, `x1' = x1`, with quadrature
/// `q' = x1`.
pub fn decoupled() -> Function {
    let inputs = dae_inputs(2, 0, 1);
    let (x0, x1, p) = (inputs[1].at(0).clone(), inputs[1].at(1).clone(), inputs[3].at(0).clone());
    let ode = SxMatrix::column(vec![-(&p * &x0), x1.clone()]);
    let quad = SxMatrix::column(vec![x1]);
    Function::new(SxFunction::new("decoupled", inputs, vec![ode, SxMatrix::empty(), quad]))
}

/// Backward problem of [`decay`] in reversed time: `rx' = -p rx`,
/// `rq' = -x rx`. From `rx0 = 1`: `rxf = e^-1`, `rqf = -e^-1`.
pub fn decay_backward() -> Function {
    let t = SxMatrix::sym_column("t", 1);
    let x = SxMatrix::sym_column("x", 1);
    let z = SxMatrix::sym_column("z", 0);
    let p = SxMatrix::sym_column("p", 1);
    let rx = SxMatrix::sym_column("rx", 1);
    let rz = SxMatrix::sym_column("rz", 0);
    let rp = SxMatrix::sym_column("rp", 0);
    let (xs, ps, rxs) = (x.at(0).clone(), p.at(0).clone(), rx.at(0).clone());
    let ode = SxMatrix::column(vec![-(&ps * &rxs)]);
    let quad = SxMatrix::column(vec![-(&xs * &rxs)]);
    Function::new(SxFunction::new(
        "decay_backward",
        vec![t, x, z, p, rx, rz, rp],
        vec![ode, SxMatrix::empty(), quad],
    ))
}

pub fn rk_integrator(f: Function, g: Option<Function>) -> Integrator {
    Integrator::new(f, g, RkStepper::new(RkSettings::default()))
}

/// Initialized integrator with the given `x0` and `p = 1`.
pub fn ready(f: Function, g: Option<Function>, x0: &[Float]) -> Integrator {
    let mut integrator = rk_integrator(f, g);
    integrator.init().unwrap();
    integrator.set_input(IntegratorInput::X0, x0).unwrap();
    integrator.set_input(IntegratorInput::P, &[1.0]).unwrap();
    integrator
}

pub fn e_inv() -> Float {
    (-1.0 as Float).exp()
}
