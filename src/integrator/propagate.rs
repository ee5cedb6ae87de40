//! Structural dependency propagation through an integrator.
//!
//! The terminal states are resolved from the callback's direct dependencies
//! by a structural solve with the pattern
//!
//! ```text
//! [ J(ode, x) + I   J(ode, z) ]
//! [ J(alg, x)       J(alg, z) ]
//! ```
//!
//! which closes the dependencies over the whole trajectory and over the
//! implicit definition of the algebraic states.

use tracing::debug;

use crate::{
    error::{Error, Result},
    fx::Function,
    linsol::LinearSolver,
    matrix::Bvec,
    scheme::{DaeIn, DaeOut, IntegratorInput as In, IntegratorOutput as Out, RdaeIn, RdaeOut},
    sparsity::Sparsity,
};

use super::IntegratorCore;

/// Pattern of the implicit system coupling the states `x` and `z` through the
/// outputs `ode` and `alg` of `f`.
pub(crate) fn jac_pattern(f: &Function, x: usize, z: usize, ode: usize, alg: usize) -> Result<Sparsity> {
    let nx = f.input_sparsity(x).nnz();
    let nz = f.input_sparsity(z).nnz();
    let ode_x = f.jac_sparsity(x, ode)?.union(&Sparsity::diag(nx));
    if nz == 0 {
        return Ok(ode_x);
    }
    let ode_z = f.jac_sparsity(z, ode)?;
    let alg_x = f.jac_sparsity(x, alg)?;
    let alg_z = f.jac_sparsity(z, alg)?;
    let top = Sparsity::horzcat(&[&ode_x, &ode_z]);
    let bottom = Sparsity::horzcat(&[&alg_x, &alg_z]);
    Ok(Sparsity::vertcat(&[&top, &bottom]))
}

fn zeros_like(f: &Function, outputs: bool) -> Vec<Vec<Bvec>> {
    if outputs {
        (0..f.n_out()).map(|o| vec![0; f.output_sparsity(o).nnz()]).collect()
    } else {
        (0..f.n_in()).map(|i| vec![0; f.input_sparsity(i).nnz()]).collect()
    }
}

fn or_into(dst: &mut [Bvec], src: &[Bvec]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d |= *s;
    }
}

fn linsol(s: Option<&LinearSolver>) -> Result<&LinearSolver> {
    s.ok_or_else(|| Error::Internal("linear solver for sparsity propagation missing".to_string()))
}

/// Lanes of the resolved states given the direct dependencies of the
/// right-hand sides and the initial states.
fn resolve(solver: &LinearSolver, ode: &[Bvec], alg: &[Bvec], initial: &[Bvec]) -> (Vec<Bvec>, Vec<Bvec>) {
    let mut b: Vec<Bvec> = ode.iter().zip(initial).map(|(o, i)| o | i).collect();
    b.extend_from_slice(alg);
    let mut v = solver.sp_solve(&b, false);
    let z = v.split_off(ode.len());
    (v, z)
}

pub(crate) fn forward(core: &IntegratorCore, inputs: &[Vec<Bvec>], outputs: &mut [Vec<Bvec>]) -> Result<()> {
    debug!("forward sparsity propagation");
    let f = &core.f;
    let dims = core.dims;

    let mut arg = zeros_like(f, false);
    let mut res = zeros_like(f, true);
    arg[DaeIn::X.index()].copy_from_slice(&inputs[In::X0.index()]);
    arg[DaeIn::P.index()].copy_from_slice(&inputs[In::P.index()]);
    f.sp_forward(&arg, &mut res)?;
    let (xf, zf) = resolve(
        linsol(core.linsol_f.as_ref())?,
        &res[DaeOut::Ode.index()],
        &res[DaeOut::Alg.index()],
        &inputs[In::X0.index()],
    );

    if dims.nq > 0 {
        arg[DaeIn::X.index()].copy_from_slice(&xf);
        arg[DaeIn::Z.index()].copy_from_slice(&zf);
        f.sp_forward(&arg, &mut res)?;
        outputs[Out::Qf.index()].copy_from_slice(&res[DaeOut::Quad.index()]);
    } else {
        outputs[Out::Qf.index()].iter_mut().for_each(|b| *b = 0);
    }
    outputs[Out::Xf.index()].copy_from_slice(&xf);
    outputs[Out::Zf.index()].copy_from_slice(&zf);

    for slot in [Out::Rxf, Out::Rqf, Out::Rzf] {
        outputs[slot.index()].iter_mut().for_each(|b| *b = 0);
    }
    let Some(g) = &core.g else {
        return Ok(());
    };

    let mut arg = zeros_like(g, false);
    let mut res = zeros_like(g, true);
    arg[RdaeIn::X.index()].copy_from_slice(&xf);
    arg[RdaeIn::Z.index()].copy_from_slice(&zf);
    arg[RdaeIn::P.index()].copy_from_slice(&inputs[In::P.index()]);
    arg[RdaeIn::Rx.index()].copy_from_slice(&inputs[In::Rx0.index()]);
    arg[RdaeIn::Rp.index()].copy_from_slice(&inputs[In::Rp.index()]);
    g.sp_forward(&arg, &mut res)?;
    let (rxf, rzf) = resolve(
        linsol(core.linsol_g.as_ref())?,
        &res[RdaeOut::Ode.index()],
        &res[RdaeOut::Alg.index()],
        &inputs[In::Rx0.index()],
    );

    if dims.nrq > 0 {
        arg[RdaeIn::Rx.index()].copy_from_slice(&rxf);
        arg[RdaeIn::Rz.index()].copy_from_slice(&rzf);
        g.sp_forward(&arg, &mut res)?;
        outputs[Out::Rqf.index()].copy_from_slice(&res[RdaeOut::Quad.index()]);
    }
    outputs[Out::Rxf.index()].copy_from_slice(&rxf);
    outputs[Out::Rzf.index()].copy_from_slice(&rzf);
    Ok(())
}

/// Adjoint of [`resolve`]: lanes on the resolved states, mapped back onto
/// the right-hand sides (`ode`, `alg`).
fn resolve_transposed(solver: &LinearSolver, x: &[Bvec], z: &[Bvec]) -> (Vec<Bvec>, Vec<Bvec>) {
    let mut v = x.to_vec();
    v.extend_from_slice(z);
    let mut b = solver.sp_solve(&v, true);
    let alg = b.split_off(x.len());
    (b, alg)
}

pub(crate) fn reverse(core: &IntegratorCore, inputs: &mut [Vec<Bvec>], outputs: &mut [Vec<Bvec>]) -> Result<()> {
    debug!("reverse sparsity propagation");
    let f = &core.f;
    let dims = core.dims;

    let mut x_bar = std::mem::take(&mut outputs[Out::Xf.index()]);
    let mut z_bar = std::mem::take(&mut outputs[Out::Zf.index()]);
    let q_bar = std::mem::take(&mut outputs[Out::Qf.index()]);
    let rx_bar = std::mem::take(&mut outputs[Out::Rxf.index()]);
    let rz_bar = std::mem::take(&mut outputs[Out::Rzf.index()]);
    let rq_bar = std::mem::take(&mut outputs[Out::Rqf.index()]);

    if let Some(g) = &core.g {
        let mut rx_bar = rx_bar.clone();
        let mut rz_bar = rz_bar.clone();
        if dims.nrq > 0 {
            let mut arg = zeros_like(g, false);
            let mut res = zeros_like(g, true);
            res[RdaeOut::Quad.index()].copy_from_slice(&rq_bar);
            g.sp_reverse(&mut arg, &mut res)?;
            or_into(&mut rx_bar, &arg[RdaeIn::Rx.index()]);
            or_into(&mut rz_bar, &arg[RdaeIn::Rz.index()]);
            or_into(&mut x_bar, &arg[RdaeIn::X.index()]);
            or_into(&mut z_bar, &arg[RdaeIn::Z.index()]);
            or_into(&mut inputs[In::P.index()], &arg[RdaeIn::P.index()]);
            or_into(&mut inputs[In::Rp.index()], &arg[RdaeIn::Rp.index()]);
        }
        let (ode_bar, alg_bar) = resolve_transposed(linsol(core.linsol_g.as_ref())?, &rx_bar, &rz_bar);
        or_into(&mut inputs[In::Rx0.index()], &ode_bar);
        let mut arg = zeros_like(g, false);
        let mut res = zeros_like(g, true);
        res[RdaeOut::Ode.index()].copy_from_slice(&ode_bar);
        res[RdaeOut::Alg.index()].copy_from_slice(&alg_bar);
        g.sp_reverse(&mut arg, &mut res)?;
        or_into(&mut x_bar, &arg[RdaeIn::X.index()]);
        or_into(&mut z_bar, &arg[RdaeIn::Z.index()]);
        or_into(&mut inputs[In::P.index()], &arg[RdaeIn::P.index()]);
        or_into(&mut inputs[In::Rx0.index()], &arg[RdaeIn::Rx.index()]);
        or_into(&mut inputs[In::Rp.index()], &arg[RdaeIn::Rp.index()]);
    }

    if dims.nq > 0 {
        let mut arg = zeros_like(f, false);
        let mut res = zeros_like(f, true);
        res[DaeOut::Quad.index()].copy_from_slice(&q_bar);
        f.sp_reverse(&mut arg, &mut res)?;
        or_into(&mut x_bar, &arg[DaeIn::X.index()]);
        or_into(&mut z_bar, &arg[DaeIn::Z.index()]);
        or_into(&mut inputs[In::P.index()], &arg[DaeIn::P.index()]);
    }
    let (ode_bar, alg_bar) = resolve_transposed(linsol(core.linsol_f.as_ref())?, &x_bar, &z_bar);
    or_into(&mut inputs[In::X0.index()], &ode_bar);
    let mut arg = zeros_like(f, false);
    let mut res = zeros_like(f, true);
    res[DaeOut::Ode.index()].copy_from_slice(&ode_bar);
    res[DaeOut::Alg.index()].copy_from_slice(&alg_bar);
    f.sp_reverse(&mut arg, &mut res)?;
    or_into(&mut inputs[In::X0.index()], &arg[DaeIn::X.index()]);
    or_into(&mut inputs[In::P.index()], &arg[DaeIn::P.index()]);

    // Initial guesses for algebraic states never influence the outputs.
    inputs[In::Z0.index()].iter_mut().for_each(|b| *b = 0);
    inputs[In::Rz0.index()].iter_mut().for_each(|b| *b = 0);

    // Cleared seeds keep their length.
    outputs[Out::Xf.index()] = vec![0; x_bar.len()];
    outputs[Out::Zf.index()] = vec![0; z_bar.len()];
    outputs[Out::Qf.index()] = vec![0; q_bar.len()];
    outputs[Out::Rxf.index()] = vec![0; rx_bar.len()];
    outputs[Out::Rzf.index()] = vec![0; rz_bar.len()];
    outputs[Out::Rqf.index()] = vec![0; rq_bar.len()];
    Ok(())
}

/// Block-level worst case: `xf` and `qf` depend on all of `x0` and `p`;
/// `rxf` and `rqf` additionally on all of `rx0` and `rp`.
pub(crate) fn coarse(fwd: bool, inputs: &mut [Vec<Bvec>], outputs: &mut [Vec<Bvec>]) {
    let union = |bufs: &[Vec<Bvec>], slots: &[usize]| slots.iter().flat_map(|&s| bufs[s].iter()).fold(0, |acc, b| acc | b);
    let fill = |bufs: &mut [Vec<Bvec>], slots: &[usize], bits: Bvec| {
        for &s in slots {
            bufs[s].iter_mut().for_each(|b| *b |= bits);
        }
    };
    let forward_in = [In::X0.index(), In::P.index()];
    let backward_in = [In::Rx0.index(), In::Rp.index()];
    let forward_out = [Out::Xf.index(), Out::Qf.index()];
    let backward_out = [Out::Rxf.index(), Out::Rqf.index()];

    if fwd {
        let mut all = union(inputs, &forward_in);
        fill(outputs, &forward_out, all);
        all |= union(inputs, &backward_in);
        fill(outputs, &backward_out, all);
    } else {
        let mut all = union(outputs, &backward_out);
        fill(inputs, &backward_in, all);
        all |= union(outputs, &forward_out);
        fill(inputs, &forward_in, all);
    }
}
