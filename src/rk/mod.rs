//! Fixed-step Runge-Kutta reference stepper for semi-explicit index-1 DAEs.
//!
//! The horizon `[t0, tf]` is split into `number_of_finite_elements` equal
//! steps of the classical RK4 scheme. The algebraic states are eliminated at
//! every stage by a Newton iteration on the algebraic residual, with the
//! Jacobian assembled column by column from forward directional derivatives
//! of the callback.
//!
//! The forward pass records its grid. The backward problem is integrated in
//! reversed time over the same grid, reconstructing the forward states by
//! cubic Hermite interpolation.

mod rk4;
mod trajectory;

use std::io;

use bon::Builder;
use tracing::{debug, trace, warn};

use crate::{
    Float,
    error::{Error, Result},
    fx::Function,
    integrator::{IntegratorCore, Stepper},
    matrix::{DMatrix, DenseMatrix},
    options::{OptionType, Options},
    scheme::{DaeIn, DaeOut, IntegratorInput as In, IntegratorOutput as Out, RdaeIn, RdaeOut},
};

use rk4::{Dynamics, Rk4};
use trajectory::{GridPoint, Trajectory};

/// Defaults for the options the stepper registers on its integrator.
#[derive(Builder, Clone, Debug)]
pub struct RkSettings {
    /// Number of equidistant steps over `[t0, tf]`. Default is 20.
    #[builder(default = 20)]
    pub number_of_finite_elements: usize,
    /// Max-norm tolerance on the algebraic residual. Default is 1e-10.
    #[builder(default = 1e-10)]
    pub newton_tol: Float,
    /// Newton iterations allowed per stage. Default is 50.
    #[builder(default = 50)]
    pub max_newton_iter: usize,
}

impl Default for RkSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Counters of the last evaluation.
#[derive(Clone, Debug, Default)]
pub struct RkStats {
    pub steps: usize,
    pub steps_b: usize,
    pub nfev: usize,
    pub newton_iter: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RkStepper {
    settings: RkSettings,
    jac_f: Option<Function>,
    jac_g: Option<Function>,
    trajectory: Trajectory,
    stats: RkStats,
}

impl RkStepper {
    pub fn new(settings: RkSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Settings in effect; after `init` these reflect the integrator options.
    pub fn settings(&self) -> &RkSettings {
        &self.settings
    }

    pub fn stats(&self) -> &RkStats {
        &self.stats
    }

    fn step_size(&self, core: &IntegratorCore) -> Float {
        (core.tf() - core.t0()) / self.settings.number_of_finite_elements as Float
    }
}

impl Stepper for RkStepper {
    fn name(&self) -> &'static str {
        "rk"
    }

    fn create(&self) -> Box<dyn Stepper> {
        Box::new(RkStepper::new(self.settings.clone()))
    }

    fn register_options(&self, options: &mut Options) {
        options.add_option(
            "number_of_finite_elements",
            OptionType::Integer,
            Some(self.settings.number_of_finite_elements.into()),
            "Number of equidistant integration steps over the time horizon",
        );
        options.add_option(
            "newton_tol",
            OptionType::Real,
            Some(self.settings.newton_tol.into()),
            "Tolerance on the algebraic residual in the Newton iteration",
        );
        options.add_option(
            "max_newton_iter",
            OptionType::Integer,
            Some(self.settings.max_newton_iter.into()),
            "Maximum number of Newton iterations per stage",
        );
    }

    fn init(&mut self, core: &IntegratorCore) -> Result<()> {
        let options = core.options();
        let n = options.get_int("number_of_finite_elements")?;
        if n < 1 {
            return Err(Error::InvalidOption {
                name: "number_of_finite_elements".to_string(),
                reason: format!("must be at least 1, got {}", n),
            });
        }
        let tol = options.get_real("newton_tol")?;
        if !(tol > 0.0) {
            return Err(Error::InvalidOption {
                name: "newton_tol".to_string(),
                reason: format!("must be positive, got {}", tol),
            });
        }
        let max_iter = options.get_int("max_newton_iter")?;
        if max_iter < 1 {
            return Err(Error::InvalidOption {
                name: "max_newton_iter".to_string(),
                reason: format!("must be at least 1, got {}", max_iter),
            });
        }
        if !(core.tf() > core.t0()) {
            return Err(Error::InvalidOption {
                name: "tf".to_string(),
                reason: format!("end time {} must exceed start time {}", core.tf(), core.t0()),
            });
        }
        self.settings = RkSettings::builder()
            .number_of_finite_elements(n as usize)
            .newton_tol(tol)
            .max_newton_iter(max_iter as usize)
            .build();

        let dims = core.dims();
        self.jac_f = if dims.nz > 0 { Some(core.dae().derivative(1, 0)?) } else { None };
        self.jac_g = match core.rdae() {
            Some(g) if dims.nrz > 0 => Some(g.derivative(1, 0)?),
            _ => None,
        };
        self.trajectory.clear();
        self.stats = RkStats::default();
        debug!(steps = n, h = self.step_size(core), "rk stepper initialized");
        Ok(())
    }

    fn reset(&mut self, _core: &mut IntegratorCore) -> Result<()> {
        self.trajectory.clear();
        self.stats = RkStats::default();
        Ok(())
    }

    fn integrate(&mut self, core: &mut IntegratorCore, t_out: Float) -> Result<()> {
        let h_nom = self.step_size(core);
        let eps = 1e-9 * h_nom;
        let mut t = core.time();
        if t_out < t - eps {
            warn!(t, t_out, "requested time precedes the current time, nothing to integrate");
            return Ok(());
        }
        let dims = core.dims();
        let f = core.dae().clone();
        let jac_f = self.jac_f.clone();

        let mut x = core.output(Out::Xf).data().to_vec();
        let mut q = core.output(Out::Qf).data().to_vec();
        let mut args: Vec<DMatrix> = (0..f.n_in()).map(|i| DMatrix::zeros(f.input_sparsity(i))).collect();
        args[DaeIn::Z.index()].set_nonzeros(core.output(Out::Zf).data());
        args[DaeIn::P.index()].set_nonzeros(core.input(In::P).data());

        let mut dae = ForwardDae {
            f: &f,
            jac: jac_f.as_ref(),
            args,
            settings: &self.settings,
            stats: &mut self.stats,
        };
        let mut k1 = vec![0.0; dims.nx];
        let mut kq = vec![0.0; dims.nq];
        dae.rhs(t, &x, &mut k1, &mut kq)?;
        if self.trajectory.is_empty() {
            self.trajectory.push(GridPoint {
                t,
                x: x.clone(),
                dx: k1.clone(),
                z: dae.z().to_vec(),
            });
        }

        let mut rk = Rk4::new(dims.nx, dims.nq);
        while t < t_out - eps {
            let h = h_nom.min(t_out - t);
            rk.step(&mut dae, t, h, 1.0, &mut x, &mut q, &k1, &kq)?;
            t += h;
            // Right-hand side at the new point: grid derivative and next first stage.
            dae.rhs(t, &x, &mut k1, &mut kq)?;
            dae.stats.steps += 1;
            trace!(t, "forward step");
            self.trajectory.push(GridPoint {
                t,
                x: x.clone(),
                dx: k1.clone(),
                z: dae.z().to_vec(),
            });
        }
        let z = dae.z().to_vec();

        core.output_mut(Out::Xf).set_nonzeros(&x);
        core.output_mut(Out::Qf).set_nonzeros(&q);
        core.output_mut(Out::Zf).set_nonzeros(&z);
        core.set_time(t_out);
        debug!(t = t_out, steps = self.stats.steps, nfev = self.stats.nfev, "forward integration finished");
        Ok(())
    }

    fn reset_b(&mut self, _core: &mut IntegratorCore) -> Result<()> {
        if self.trajectory.is_empty() {
            return Err(Error::Internal("backward integration without a forward trajectory".to_string()));
        }
        self.stats.steps_b = 0;
        Ok(())
    }

    fn integrate_b(&mut self, core: &mut IntegratorCore, t_out: Float) -> Result<()> {
        let h_nom = self.step_size(core);
        let eps = 1e-9 * h_nom;
        let mut t = core.time();
        if t_out > t + eps {
            warn!(t, t_out, "requested time follows the current time, nothing to integrate backward");
            return Ok(());
        }
        let dims = core.dims();
        let f = core.dae().clone();
        let g = core
            .rdae()
            .cloned()
            .ok_or_else(|| Error::Internal("backward integration without a backward problem".to_string()))?;
        let (jac_f, jac_g) = (self.jac_f.clone(), self.jac_g.clone());

        let mut rx = core.output(Out::Rxf).data().to_vec();
        let mut rq = core.output(Out::Rqf).data().to_vec();
        let mut f_args: Vec<DMatrix> = (0..f.n_in()).map(|i| DMatrix::zeros(f.input_sparsity(i))).collect();
        f_args[DaeIn::Z.index()].set_nonzeros(core.output(Out::Zf).data());
        f_args[DaeIn::P.index()].set_nonzeros(core.input(In::P).data());
        let mut g_args: Vec<DMatrix> = (0..g.n_in()).map(|i| DMatrix::zeros(g.input_sparsity(i))).collect();
        g_args[RdaeIn::P.index()].set_nonzeros(core.input(In::P).data());
        g_args[RdaeIn::Rp.index()].set_nonzeros(core.input(In::Rp).data());
        g_args[RdaeIn::Rz.index()].set_nonzeros(core.output(Out::Rzf).data());

        let mut rdae = BackwardDae {
            forward: ForwardDae {
                f: &f,
                jac: jac_f.as_ref(),
                args: f_args,
                settings: &self.settings,
                stats: &mut self.stats,
            },
            trajectory: &self.trajectory,
            g: &g,
            jac: jac_g.as_ref(),
            args: g_args,
            x: vec![0.0; dims.nx],
        };
        let mut k1 = vec![0.0; dims.nrx];
        let mut kq = vec![0.0; dims.nrq];
        rdae.rhs(t, &rx, &mut k1, &mut kq)?;

        let mut rk = Rk4::new(dims.nrx, dims.nrq);
        while t > t_out + eps {
            // Step to the previous grid point so that each step lies on one
            // interpolation segment.
            let next = self.trajectory.grid_time_before(t, eps).map_or(t_out, |s| s.max(t_out));
            let h = (t - next).min(h_nom);
            rk.step(&mut rdae, t, h, -1.0, &mut rx, &mut rq, &k1, &kq)?;
            t -= h;
            rdae.rhs(t, &rx, &mut k1, &mut kq)?;
            rdae.forward.stats.steps_b += 1;
            trace!(t, "backward step");
        }
        let rz = rdae.args[RdaeIn::Rz.index()].data().to_vec();

        core.output_mut(Out::Rxf).set_nonzeros(&rx);
        core.output_mut(Out::Rqf).set_nonzeros(&rq);
        core.output_mut(Out::Rzf).set_nonzeros(&rz);
        core.set_time(t_out);
        debug!(t = t_out, steps = self.stats.steps_b, nfev = self.stats.nfev, "backward integration finished");
        Ok(())
    }

    fn print_stats(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "  forward steps:             {}", self.stats.steps)?;
        writeln!(out, "  backward steps:            {}", self.stats.steps_b)?;
        writeln!(out, "  callback evaluations:      {}", self.stats.nfev)?;
        writeln!(out, "  Newton iterations:         {}", self.stats.newton_iter)
    }

    fn deep_copy(&self) -> Box<dyn Stepper> {
        Box::new(self.clone())
    }
}

/// DAE with the algebraic states solved for at every evaluation.
struct ForwardDae<'a> {
    f: &'a Function,
    jac: Option<&'a Function>,
    /// Callback arguments; `z` holds the last consistent algebraic states.
    args: Vec<DMatrix>,
    settings: &'a RkSettings,
    stats: &'a mut RkStats,
}

impl ForwardDae<'_> {
    fn z(&self) -> &[Float] {
        self.args[DaeIn::Z.index()].data()
    }

    /// Set `t` and `x`, then make the algebraic states consistent.
    fn consistent(&mut self, t: Float, x: &[Float]) -> Result<()> {
        self.args[DaeIn::T.index()].fill(t);
        self.args[DaeIn::X.index()].set_nonzeros(x);
        if let Some(jac) = self.jac {
            solve_algebraic(
                self.f,
                jac,
                &mut self.args,
                DaeIn::Z.index(),
                DaeOut::Alg.index(),
                t,
                self.settings,
                self.stats,
            )?;
        }
        Ok(())
    }
}

impl Dynamics for ForwardDae<'_> {
    fn rhs(&mut self, t: Float, y: &[Float], dy: &mut [Float], dq: &mut [Float]) -> Result<()> {
        self.consistent(t, y)?;
        let res = self.f.call(&self.args)?;
        self.stats.nfev += 1;
        dy.copy_from_slice(res[DaeOut::Ode.index()].data());
        dq.copy_from_slice(res[DaeOut::Quad.index()].data());
        Ok(())
    }
}

/// Backward problem in reversed time, evaluated along the stored forward
/// trajectory.
struct BackwardDae<'a> {
    forward: ForwardDae<'a>,
    trajectory: &'a Trajectory,
    g: &'a Function,
    jac: Option<&'a Function>,
    args: Vec<DMatrix>,
    x: Vec<Float>,
}

impl Dynamics for BackwardDae<'_> {
    fn rhs(&mut self, t: Float, y: &[Float], dy: &mut [Float], dq: &mut [Float]) -> Result<()> {
        if let Some(guess) = self.trajectory.algebraic_guess(t) {
            self.forward.args[DaeIn::Z.index()].set_nonzeros(guess);
        }
        self.trajectory.state_at(t, &mut self.x);
        self.forward.consistent(t, &self.x)?;

        self.args[RdaeIn::T.index()].fill(t);
        self.args[RdaeIn::X.index()].set_nonzeros(&self.x);
        self.args[RdaeIn::Z.index()].set_nonzeros(self.forward.z());
        self.args[RdaeIn::Rx.index()].set_nonzeros(y);
        if let Some(jac) = self.jac {
            solve_algebraic(
                self.g,
                jac,
                &mut self.args,
                RdaeIn::Rz.index(),
                RdaeOut::Alg.index(),
                t,
                self.forward.settings,
                self.forward.stats,
            )?;
        }
        let res = self.g.call(&self.args)?;
        self.forward.stats.nfev += 1;
        dy.copy_from_slice(res[RdaeOut::Ode.index()].data());
        dq.copy_from_slice(res[RdaeOut::Quad.index()].data());
        Ok(())
    }
}

/// Newton iteration on `fun(args)[residual] = 0` for `args[unknown]`,
/// starting from its current value. `jac` is the single-direction forward
/// derivative of `fun`.
#[allow(clippy::too_many_arguments)]
fn solve_algebraic(
    fun: &Function,
    jac: &Function,
    args: &mut [DMatrix],
    unknown: usize,
    residual: usize,
    t: Float,
    settings: &RkSettings,
    stats: &mut RkStats,
) -> Result<()> {
    let n = args[unknown].nnz();
    if n == 0 {
        return Ok(());
    }
    let n_out = fun.n_out();
    let mut seeds: Vec<DMatrix> = args.iter().map(|a| DMatrix::zeros(a.sparsity().clone())).collect();
    let mut iter = 0;
    loop {
        let res = fun.call(args)?;
        stats.nfev += 1;
        let r = res[residual].data();
        let norm = r.iter().fold(0.0 as Float, |m, v| m.max(v.abs()));
        if norm <= settings.newton_tol {
            return Ok(());
        }
        if iter == settings.max_newton_iter {
            return Err(Error::NewtonFailure { t, residual: norm });
        }

        let mut jacobian = DenseMatrix::zeros(n);
        for j in 0..n {
            seeds[unknown].fill(0.0);
            seeds[unknown].data_mut()[j] = 1.0;
            let jac_args: Vec<DMatrix> = args.iter().chain(seeds.iter()).cloned().collect();
            let sens = jac.call(&jac_args)?;
            stats.nfev += 1;
            for (i, v) in sens[n_out + residual].data().iter().enumerate() {
                jacobian[(i, j)] = *v;
            }
        }
        let step = jacobian.lin_solve(r)?;
        for (z, d) in args[unknown].data_mut().iter_mut().zip(&step) {
            *z -= d;
        }
        iter += 1;
        stats.newton_iter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fx::SxFunction, sx::SxMatrix};

    /// alg: z^2 - p = 0
    fn square_root() -> Function {
        let z = SxMatrix::sym_column("z", 1);
        let p = SxMatrix::sym_column("p", 1);
        let r = SxMatrix::column(vec![&z.at(0).sq() - p.at(0)]);
        Function::new(SxFunction::new("square_root", vec![z, p], vec![r]))
    }

    #[test]
    fn newton_solves_scalar_residual() {
        let fun = square_root();
        let jac = fun.derivative(1, 0).unwrap();
        let mut args = vec![DMatrix::column(&[1.0]), DMatrix::column(&[2.0])];
        let mut stats = RkStats::default();
        solve_algebraic(&fun, &jac, &mut args, 0, 0, 0.0, &RkSettings::default(), &mut stats).unwrap();
        assert!((args[0].data()[0] - (2.0 as Float).sqrt()).abs() < 1e-9);
        assert!(stats.newton_iter > 0);
    }

    #[test]
    fn newton_reports_failure() {
        let fun = square_root();
        let jac = fun.derivative(1, 0).unwrap();
        // no real root
        let mut args = vec![DMatrix::column(&[1.0]), DMatrix::column(&[-1.0])];
        let settings = RkSettings::builder().max_newton_iter(5).build();
        let err = solve_algebraic(&fun, &jac, &mut args, 0, 0, 0.5, &settings, &mut RkStats::default());
        assert!(matches!(err, Err(Error::NewtonFailure { .. }) | Err(Error::SingularMatrix)));
    }

    #[test]
    fn settings_defaults() {
        let s = RkSettings::default();
        assert_eq!(s.number_of_finite_elements, 20);
        assert_eq!(s.max_newton_iter, 50);
        let mut options = Options::new();
        RkStepper::new(s).register_options(&mut options);
        assert_eq!(options.get_int("number_of_finite_elements").unwrap(), 20);
    }
}
