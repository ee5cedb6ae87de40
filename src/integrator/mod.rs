//! DAE integrator core: contract validation, input/output buffers, the
//! evaluation lifecycle, and the entry points for derivatives and
//! dependency analysis.
//!
//! The numerical method is supplied by a [`Stepper`]. The integrator owns the
//! DAE callback `f`, the optional backward (RDAE) callback `g` and two
//! structural linear solvers used to resolve the implicit coupling between
//! differential and algebraic states during dependency propagation.
//!
//! Lifecycle: `init` → `reset` → `integrate(t)` → [`reset_b` → `integrate_b(t)`].
//! [`Integrator::evaluate`] runs the whole pipeline. Calls out of order
//! return [`Error::Lifecycle`].

mod augmented;
mod derivative;
mod offset;
mod propagate;

pub use augmented::AugmentedProblem;
pub use derivative::IntegratorDerivative;
pub use offset::{AugOffset, Dims, offsets};

use std::io;

use tracing::{debug, trace, warn};

use crate::{
    Float,
    error::{Error, Result},
    fx::{DeepCopyMap, Function},
    linsol::LinearSolver,
    matrix::{Bvec, DMatrix},
    options::{Dictionary, OptionType, OptionValue, Options},
    scheme::{DaeIn, DaeOut, IntegratorInput, IntegratorOutput, RdaeIn, RdaeOut},
    sparsity::Sparsity,
};

/// Stage of the evaluation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    ForwardReset,
    ForwardIntegrated,
    BackwardReset,
    BackwardIntegrated,
    Done,
}

/// Numerical method driving an [`Integrator`].
///
/// `reset` and `reset_b` are called after the core has reset its buffers;
/// `integrate` and `integrate_b` must leave `xf`, `qf`, `zf` (respectively
/// `rxf`, `rqf`, `rzf`) consistent with the DAE at the requested time and
/// update [`IntegratorCore::set_time`].
pub trait Stepper {
    fn name(&self) -> &'static str;

    /// A fresh, uninitialized stepper of the same kind, used for the
    /// integrator of an augmented problem.
    fn create(&self) -> Box<dyn Stepper>;

    fn register_options(&self, _options: &mut Options) {}

    fn init(&mut self, core: &IntegratorCore) -> Result<()>;

    fn reset(&mut self, _core: &mut IntegratorCore) -> Result<()> {
        Ok(())
    }

    fn integrate(&mut self, core: &mut IntegratorCore, t: Float) -> Result<()>;

    fn reset_b(&mut self, _core: &mut IntegratorCore) -> Result<()> {
        Ok(())
    }

    fn integrate_b(&mut self, core: &mut IntegratorCore, t: Float) -> Result<()>;

    fn print_stats(&self, out: &mut dyn io::Write) -> io::Result<()>;

    fn deep_copy(&self) -> Box<dyn Stepper>;
}

/// State shared by every integrator regardless of the stepper.
pub struct IntegratorCore {
    f: Function,
    g: Option<Function>,
    options: Options,
    dims: Dims,
    sizes: Dims,
    t0: Float,
    tf: Float,
    t: Float,
    inputs: Vec<DMatrix>,
    outputs: Vec<DMatrix>,
    linsol_f: Option<LinearSolver>,
    linsol_g: Option<LinearSolver>,
}

impl IntegratorCore {
    pub fn dae(&self) -> &Function {
        &self.f
    }

    pub fn rdae(&self) -> Option<&Function> {
        self.g.as_ref()
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// Row counts of the ports, the block sizes of augmented stacks.
    pub fn sizes(&self) -> Dims {
        self.sizes
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn t0(&self) -> Float {
        self.t0
    }

    pub fn tf(&self) -> Float {
        self.tf
    }

    /// Current time of the integration.
    pub fn time(&self) -> Float {
        self.t
    }

    pub fn set_time(&mut self, t: Float) {
        self.t = t;
    }

    pub fn input(&self, slot: IntegratorInput) -> &DMatrix {
        &self.inputs[slot.index()]
    }

    pub fn output(&self, slot: IntegratorOutput) -> &DMatrix {
        &self.outputs[slot.index()]
    }

    pub fn output_mut(&mut self, slot: IntegratorOutput) -> &mut DMatrix {
        &mut self.outputs[slot.index()]
    }

    fn reset(&mut self) {
        trace!(t0 = self.t0, "reset forward problem");
        self.t = self.t0;
        let (x0, z0) = (self.inputs[IntegratorInput::X0.index()].clone(), self.inputs[IntegratorInput::Z0.index()].clone());
        self.outputs[IntegratorOutput::Xf.index()].set(&x0);
        self.outputs[IntegratorOutput::Zf.index()].set(&z0);
        self.outputs[IntegratorOutput::Qf.index()].fill(0.0);
    }

    fn reset_b(&mut self) {
        trace!(tf = self.tf, "reset backward problem");
        self.t = self.tf;
        let (rx0, rz0) = (
            self.inputs[IntegratorInput::Rx0.index()].clone(),
            self.inputs[IntegratorInput::Rz0.index()].clone(),
        );
        self.outputs[IntegratorOutput::Rxf.index()].set(&rx0);
        self.outputs[IntegratorOutput::Rzf.index()].set(&rz0);
        self.outputs[IntegratorOutput::Rqf.index()].fill(0.0);
    }
}

/// Integrator of a DAE with an optional backward problem.
pub struct Integrator {
    core: IntegratorCore,
    stepper: Box<dyn Stepper>,
    phase: Phase,
}

impl Integrator {
    pub fn new(f: Function, g: Option<Function>, stepper: impl Stepper + 'static) -> Self {
        Self::with_stepper(f, g, Box::new(stepper))
    }

    pub fn with_stepper(f: Function, g: Option<Function>, stepper: Box<dyn Stepper>) -> Self {
        let mut options = Options::new();
        options.add_option("print_stats", OptionType::Boolean, Some(false.into()), "Print out statistics after integration");
        options.add_option("t0", OptionType::Real, Some((0.0 as Float).into()), "Beginning of the time horizon");
        options.add_option("tf", OptionType::Real, Some((1.0 as Float).into()), "End of the time horizon");
        options.add_option(
            "augmented_options",
            OptionType::Dictionary,
            None,
            "Options to be passed down to the augmented integrator, if one is constructed",
        );
        options.add_option(
            "expand_augmented",
            OptionType::Boolean,
            Some(true.into()),
            "If the DAE callbacks are scalar functions, expand the augmented callbacks into scalar form as well",
        );
        options.add_option(
            "conservative_sparsity",
            OptionType::Boolean,
            Some(false.into()),
            "Additionally apply the coarse block dependency table in sparsity propagation",
        );
        options.add_option("name", OptionType::String, Some("unnamed_integrator".into()), "name of the object");
        stepper.register_options(&mut options);

        Self {
            core: IntegratorCore {
                f,
                g,
                options,
                dims: Dims::default(),
                sizes: Dims::default(),
                t0: 0.0,
                tf: 1.0,
                t: 0.0,
                inputs: Vec::new(),
                outputs: Vec::new(),
                linsol_f: None,
                linsol_g: None,
            },
            stepper,
            phase: Phase::Uninitialized,
        }
    }

    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<()> {
        self.core.options.set_option(name, value)
    }

    pub fn set_options(&mut self, dict: &Dictionary) -> Result<()> {
        self.core.options.set_options(dict)
    }

    pub fn get_option(&self, name: &str) -> Result<&OptionValue> {
        self.core.options.get_option(name)
    }

    pub fn has_set_option(&self, name: &str) -> Result<bool> {
        self.core.options.has_set_option(name)
    }

    pub fn options(&self) -> &Options {
        &self.core.options
    }

    pub fn print_options(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.core.options.print_options(out)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn core(&self) -> &IntegratorCore {
        &self.core
    }

    pub fn dims(&self) -> Dims {
        self.core.dims
    }

    pub fn sizes(&self) -> Dims {
        self.core.sizes
    }

    pub fn stepper_name(&self) -> &'static str {
        self.stepper.name()
    }

    pub fn time(&self) -> Float {
        self.core.t
    }

    /// Validate the callbacks, derive dimensions and allocate buffers.
    pub fn init(&mut self) -> Result<()> {
        self.phase = Phase::Uninitialized;
        let core = &mut self.core;
        let f = core.f.clone();
        f.init()?;
        check_counts(&f, "DAE", DaeIn::COUNT, DaeOut::COUNT)?;

        let x_sp = f.input_sparsity(DaeIn::X.index());
        let z_sp = f.input_sparsity(DaeIn::Z.index());
        let p_sp = f.input_sparsity(DaeIn::P.index());
        let q_sp = f.output_sparsity(DaeOut::Quad.index());
        let t_shape = f.input_sparsity(DaeIn::T.index()).shape();
        if t_shape != (1, 1) {
            return Err(Error::ShapeMismatch {
                what: "DAE time input".to_string(),
                expected: (1, 1),
                got: t_shape,
            });
        }
        for (name, sp) in [("DAE x input", &x_sp), ("DAE z input", &z_sp), ("DAE p input", &p_sp), ("DAE quad output", &q_sp)] {
            if !sp.is_column() {
                return Err(Error::NotColumn(name.to_string()));
            }
        }
        check_output(&f, DaeOut::Ode.index(), "DAE ode output", &x_sp)?;
        check_output(&f, DaeOut::Alg.index(), "DAE alg output", &z_sp)?;

        let mut dims = Dims {
            nx: x_sp.nnz(),
            nz: z_sp.nnz(),
            nq: q_sp.nnz(),
            np: p_sp.nnz(),
            ..Dims::default()
        };
        let mut sizes = Dims {
            nx: x_sp.nrow(),
            nz: z_sp.nrow(),
            nq: q_sp.nrow(),
            np: p_sp.nrow(),
            ..Dims::default()
        };

        let (rx_sp, rz_sp, rp_sp, rq_sp) = match &core.g {
            None => (Sparsity::column(0), Sparsity::column(0), Sparsity::column(0), Sparsity::column(0)),
            Some(g) => {
                g.init()?;
                check_counts(g, "RDAE", RdaeIn::COUNT, RdaeOut::COUNT)?;
                let rx_sp = g.input_sparsity(RdaeIn::Rx.index());
                let rz_sp = g.input_sparsity(RdaeIn::Rz.index());
                let rp_sp = g.input_sparsity(RdaeIn::Rp.index());
                let rq_sp = g.output_sparsity(RdaeOut::Quad.index());
                for (name, sp) in [("RDAE rx input", &rx_sp), ("RDAE rz input", &rz_sp), ("RDAE rp input", &rp_sp), ("RDAE quad output", &rq_sp)] {
                    if !sp.is_column() {
                        return Err(Error::NotColumn(name.to_string()));
                    }
                }
                check_input(g, RdaeIn::X.index(), "RDAE x input", &x_sp)?;
                check_input(g, RdaeIn::Z.index(), "RDAE z input", &z_sp)?;
                check_input(g, RdaeIn::P.index(), "RDAE p input", &p_sp)?;
                check_output(g, RdaeOut::Ode.index(), "RDAE ode output", &rx_sp)?;
                check_output(g, RdaeOut::Alg.index(), "RDAE alg output", &rz_sp)?;
                dims.nrx = rx_sp.nnz();
                dims.nrz = rz_sp.nnz();
                dims.nrp = rp_sp.nnz();
                dims.nrq = rq_sp.nnz();
                sizes.nrx = rx_sp.nrow();
                sizes.nrz = rz_sp.nrow();
                sizes.nrp = rp_sp.nrow();
                sizes.nrq = rq_sp.nrow();
                (rx_sp, rz_sp, rp_sp, rq_sp)
            }
        };

        for (name, sp) in [("x", &x_sp), ("z", &z_sp), ("rx", &rx_sp), ("rz", &rz_sp)] {
            if !sp.is_dense() {
                warn!(state = name, "sparse states in integrators are experimental");
            }
        }

        core.inputs = vec![
            DMatrix::zeros(x_sp.clone()),
            DMatrix::zeros(p_sp),
            DMatrix::zeros(z_sp.clone()),
            DMatrix::zeros(rx_sp.clone()),
            DMatrix::zeros(rp_sp),
            DMatrix::zeros(rz_sp.clone()),
        ];
        core.outputs = vec![
            DMatrix::zeros(x_sp),
            DMatrix::zeros(q_sp),
            DMatrix::zeros(z_sp),
            DMatrix::zeros(rx_sp),
            DMatrix::zeros(rq_sp),
            DMatrix::zeros(rz_sp),
        ];
        core.dims = dims;
        core.sizes = sizes;
        debug!(
            nx = dims.nx,
            nz = dims.nz,
            nq = dims.nq,
            np = dims.np,
            nrx = dims.nrx,
            nrz = dims.nrz,
            nrq = dims.nrq,
            nrp = dims.nrp,
            "integrator dimensions"
        );

        core.t0 = core.options.get_real("t0")?;
        core.tf = core.options.get_real("tf")?;
        core.t = core.t0;

        core.linsol_f = Some(LinearSolver::new(propagate::jac_pattern(
            &f,
            DaeIn::X.index(),
            DaeIn::Z.index(),
            DaeOut::Ode.index(),
            DaeOut::Alg.index(),
        )?)?);
        core.linsol_g = match &core.g {
            Some(g) => Some(LinearSolver::new(propagate::jac_pattern(
                g,
                RdaeIn::Rx.index(),
                RdaeIn::Rz.index(),
                RdaeOut::Ode.index(),
                RdaeOut::Alg.index(),
            )?)?),
            None => None,
        };

        self.stepper.init(&self.core)?;
        self.phase = Phase::Initialized;
        Ok(())
    }

    fn require(&self, operation: &'static str, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(Error::Lifecycle {
                operation,
                phase: self.phase,
            })
        }
    }

    fn require_init(&self, operation: &'static str) -> Result<()> {
        if self.phase == Phase::Uninitialized {
            return Err(Error::Lifecycle {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    pub fn input(&self, slot: IntegratorInput) -> Result<&DMatrix> {
        self.require_init("reading an input")?;
        Ok(self.core.input(slot))
    }

    pub fn output(&self, slot: IntegratorOutput) -> Result<&DMatrix> {
        self.require_init("reading an output")?;
        Ok(self.core.output(slot))
    }

    /// Set the nonzeros of an input port.
    pub fn set_input(&mut self, slot: IntegratorInput, values: &[Float]) -> Result<()> {
        self.require_init("setting an input")?;
        let m = &mut self.core.inputs[slot.index()];
        if values.len() != m.nnz() {
            return Err(Error::ShapeMismatch {
                what: format!("values for input {}", slot.label()),
                expected: (m.nnz(), 1),
                got: (values.len(), 1),
            });
        }
        m.set_nonzeros(values);
        Ok(())
    }

    /// Set an input port from a matrix of the same shape, projected onto the
    /// port pattern.
    pub fn set_input_matrix(&mut self, slot: IntegratorInput, value: &DMatrix) -> Result<()> {
        self.require_init("setting an input")?;
        let m = &mut self.core.inputs[slot.index()];
        if value.shape() != m.shape() {
            return Err(Error::ShapeMismatch {
                what: format!("input {}", slot.label()),
                expected: m.shape(),
                got: value.shape(),
            });
        }
        let value = value.project(m.sparsity());
        m.set(&value);
        Ok(())
    }

    /// Reset, integrate forward to `tf`, then backward to `t0` if a backward
    /// problem is present.
    pub fn evaluate(&mut self) -> Result<()> {
        self.require_init("evaluate")?;
        self.reset()?;
        let tf = self.core.tf;
        self.integrate(tf)?;
        if self.core.dims.has_backward() {
            self.reset_b()?;
            let t0 = self.core.t0;
            self.integrate_b(t0)?;
        }
        self.phase = Phase::Done;
        if self.core.options.get_bool("print_stats")? {
            let stdout = io::stdout();
            if let Err(e) = self.print_stats(&mut stdout.lock()) {
                warn!(%e, "failed to print integrator statistics");
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.require_init("reset")?;
        self.core.reset();
        self.stepper.reset(&mut self.core)?;
        self.phase = Phase::ForwardReset;
        Ok(())
    }

    pub fn integrate(&mut self, t: Float) -> Result<()> {
        self.require("integrate", &[Phase::ForwardReset, Phase::ForwardIntegrated])?;
        self.stepper.integrate(&mut self.core, t)?;
        self.phase = Phase::ForwardIntegrated;
        Ok(())
    }

    pub fn reset_b(&mut self) -> Result<()> {
        if self.core.g.is_none() {
            return Err(Error::Lifecycle {
                operation: "reset_b without a backward problem",
                phase: self.phase,
            });
        }
        self.require(
            "reset_b",
            &[Phase::ForwardIntegrated, Phase::BackwardReset, Phase::BackwardIntegrated, Phase::Done],
        )?;
        self.core.reset_b();
        self.stepper.reset_b(&mut self.core)?;
        self.phase = Phase::BackwardReset;
        Ok(())
    }

    pub fn integrate_b(&mut self, t: Float) -> Result<()> {
        self.require("integrate_b", &[Phase::BackwardReset, Phase::BackwardIntegrated])?;
        self.stepper.integrate_b(&mut self.core, t)?;
        self.phase = Phase::BackwardIntegrated;
        Ok(())
    }

    pub fn print_stats(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let name = match self.core.options.get_option("name") {
            Ok(OptionValue::Str(name)) => name.as_str(),
            _ => "",
        };
        writeln!(out, "Statistics for {} integrator {}", self.stepper.name(), name)?;
        self.stepper.print_stats(out)
    }

    /// Forward and backward problems of the system augmented with `nfwd`
    /// forward and `nadj` adjoint sensitivity directions.
    pub fn augmented(&self, nfwd: usize, nadj: usize) -> Result<AugmentedProblem> {
        self.require_init("building an augmented problem")?;
        let expand = self.core.options.get_bool("expand_augmented")?;
        augmented::build(&self.core.f, self.core.g.as_ref(), &self.core.sizes, nfwd, nadj, expand)
    }

    /// Integrator computing the nominal outputs together with `nfwd` forward
    /// and `nadj` adjoint sensitivities.
    pub fn derivative(&self, nfwd: usize, nadj: usize) -> Result<IntegratorDerivative> {
        debug!(nfwd, nadj, "building integrator derivative");
        let aug = self.augmented(nfwd, nadj)?;
        let mut integrator = Integrator::with_stepper(aug.forward, aug.backward, self.stepper.create());
        integrator.set_options(self.core.options.dictionary())?;
        if self.core.options.has_set_option("augmented_options")? {
            let dict = self.core.options.get_dict("augmented_options")?.clone();
            integrator.set_options(&dict)?;
        }
        integrator.init()?;
        let inputs = IntegratorInput::ALL.iter().map(|s| self.core.input(*s).sparsity().clone()).collect();
        let outputs = IntegratorOutput::ALL.iter().map(|s| self.core.output(*s).sparsity().clone()).collect();
        Ok(IntegratorDerivative::new(integrator, aug.offset, nfwd, nadj, self.core.sizes, inputs, outputs))
    }

    /// Structural dependency propagation between the input and output ports.
    ///
    /// Forward: `inputs` carry lanes, `outputs` are overwritten with the lanes
    /// each output nonzero can depend on. Reverse: lanes seeded on `outputs`
    /// are OR-ed into the inputs they can depend on and `outputs` is cleared;
    /// the algebraic initial guesses `z0` and `rz0` never receive any lane.
    pub fn sp_evaluate(&self, fwd: bool, inputs: &mut [Vec<Bvec>], outputs: &mut [Vec<Bvec>]) -> Result<()> {
        self.require_init("sparsity propagation")?;
        check_bit_buffers(
            inputs,
            IntegratorInput::ALL.iter().map(|s| self.core.input(*s).nnz()),
            "integrator input",
        )?;
        check_bit_buffers(
            outputs,
            IntegratorOutput::ALL.iter().map(|s| self.core.output(*s).nnz()),
            "integrator output",
        )?;
        let conservative = self.core.options.get_bool("conservative_sparsity")?;
        if fwd {
            propagate::forward(&self.core, inputs, outputs)?;
            if conservative {
                propagate::coarse(true, inputs, outputs);
            }
        } else {
            // The coarse table reads the output seeds, which the precise pass clears.
            if conservative {
                propagate::coarse(false, inputs, outputs);
            }
            propagate::reverse(&self.core, inputs, outputs)?;
        }
        Ok(())
    }

    /// Structural Jacobian of `oind` with respect to `iind`, one row per
    /// output nonzero and one column per input nonzero.
    pub fn jac_sparsity(&self, iind: IntegratorInput, oind: IntegratorOutput) -> Result<Sparsity> {
        self.require_init("sparsity propagation")?;
        let n_col = self.core.input(iind).nnz();
        let n_row = self.core.output(oind).nnz();
        let mut inputs: Vec<Vec<Bvec>> = IntegratorInput::ALL.iter().map(|s| vec![0; self.core.input(*s).nnz()]).collect();
        let mut outputs: Vec<Vec<Bvec>> = IntegratorOutput::ALL.iter().map(|s| vec![0; self.core.output(*s).nnz()]).collect();
        let mut entries = Vec::new();
        for offset in (0..n_col).step_by(Bvec::BITS as usize) {
            let lanes = (n_col - offset).min(Bvec::BITS as usize);
            inputs.iter_mut().for_each(|v| v.iter_mut().for_each(|b| *b = 0));
            for lane in 0..lanes {
                inputs[iind.index()][offset + lane] = 1 << lane;
            }
            self.sp_evaluate(true, &mut inputs, &mut outputs)?;
            for (r, bits) in outputs[oind.index()].iter().enumerate() {
                for lane in 0..lanes {
                    if bits & (1 << lane) != 0 {
                        entries.push((r, offset + lane));
                    }
                }
            }
        }
        Ok(Sparsity::from_triplets(n_row, n_col, &entries))
    }

    /// Independent copy: callbacks and linear solvers are copied through
    /// `copies`, so objects shared within one deep copy stay shared.
    pub fn deep_copy(&self, copies: &mut DeepCopyMap) -> Result<Integrator> {
        let core = &self.core;
        let linsol_f = match &core.linsol_f {
            Some(s) => Some(s.deep_copy(copies)?),
            None => None,
        };
        let linsol_g = match &core.linsol_g {
            Some(s) => Some(s.deep_copy(copies)?),
            None => None,
        };
        Ok(Integrator {
            core: IntegratorCore {
                f: core.f.deep_copy(copies),
                g: core.g.as_ref().map(|g| g.deep_copy(copies)),
                options: core.options.clone(),
                dims: core.dims,
                sizes: core.sizes,
                t0: core.t0,
                tf: core.tf,
                t: core.t,
                inputs: core.inputs.clone(),
                outputs: core.outputs.clone(),
                linsol_f,
                linsol_g,
            },
            stepper: self.stepper.deep_copy(),
            phase: self.phase,
        })
    }

    /// Structural solvers of the forward and backward problems, built by `init`.
    pub fn linear_solvers(&self) -> (Option<&LinearSolver>, Option<&LinearSolver>) {
        (self.core.linsol_f.as_ref(), self.core.linsol_g.as_ref())
    }
}

fn check_counts(f: &Function, callback: &'static str, n_in: usize, n_out: usize) -> Result<()> {
    if f.n_in() != n_in {
        return Err(Error::InputCount {
            callback,
            expected: n_in,
            got: f.n_in(),
        });
    }
    if f.n_out() != n_out {
        return Err(Error::OutputCount {
            callback,
            expected: n_out,
            got: f.n_out(),
        });
    }
    Ok(())
}

fn check_pattern(what: &str, got: &Sparsity, expected: &Sparsity) -> Result<()> {
    if got.shape() != expected.shape() {
        return Err(Error::ShapeMismatch {
            what: what.to_string(),
            expected: expected.shape(),
            got: got.shape(),
        });
    }
    if got != expected {
        return Err(Error::SparsityMismatch(format!("{} does not match the state pattern", what)));
    }
    Ok(())
}

fn check_input(f: &Function, i: usize, what: &str, expected: &Sparsity) -> Result<()> {
    check_pattern(what, &f.input_sparsity(i), expected)
}

fn check_output(f: &Function, i: usize, what: &str, expected: &Sparsity) -> Result<()> {
    check_pattern(what, &f.output_sparsity(i), expected)
}

fn check_bit_buffers(bufs: &[Vec<Bvec>], sizes: impl Iterator<Item = usize>, what: &str) -> Result<()> {
    let sizes: Vec<usize> = sizes.collect();
    if bufs.len() != sizes.len() {
        return Err(Error::ArgumentCount {
            function: what.to_string(),
            expected: sizes.len(),
            got: bufs.len(),
        });
    }
    for (i, (b, n)) in bufs.iter().zip(&sizes).enumerate() {
        if b.len() != *n {
            return Err(Error::ShapeMismatch {
                what: format!("{} {} bits", what, i),
                expected: (*n, 1),
                got: (b.len(), 1),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fx::SxFunction, rk::RkStepper, sx::SxMatrix};

    /// x' = -z, 0 = z - x p
    fn coupled() -> Function {
        let t = SxMatrix::sym_column("t", 1);
        let x = SxMatrix::sym_column("x", 1);
        let z = SxMatrix::sym_column("z", 1);
        let p = SxMatrix::sym_column("p", 1);
        let ode = SxMatrix::column(vec![-z.at(0)]);
        let alg = SxMatrix::column(vec![z.at(0) - &(x.at(0) * p.at(0))]);
        Function::new(SxFunction::new("coupled", vec![t, x, z, p], vec![ode, alg, SxMatrix::empty()]))
    }

    #[test]
    fn init_builds_structural_solvers() {
        let mut integrator = Integrator::new(coupled(), None, RkStepper::default());
        assert_eq!(integrator.linear_solvers().0.map(|s| s.sparsity()), None);
        integrator.init().unwrap();
        let (f, g) = integrator.linear_solvers();
        let f = f.unwrap();
        assert_eq!(f.sparsity().shape(), (2, 2));
        assert!(!f.is_structurally_singular());
        assert!(g.is_none());
        assert_eq!(integrator.dims(), Dims { nx: 1, nz: 1, np: 1, ..Dims::default() });
    }

    #[test]
    fn deep_copy_copies_solvers() {
        let mut integrator = Integrator::new(coupled(), None, RkStepper::default());
        integrator.init().unwrap();
        let copy = integrator.deep_copy(&mut DeepCopyMap::new()).unwrap();
        let (a, b) = (integrator.linear_solvers().0.unwrap(), copy.linear_solvers().0.unwrap());
        assert!(!a.is_same(b));
        assert_eq!(a.sparsity(), b.sparsity());
        assert_eq!(copy.phase(), Phase::Initialized);
        assert_eq!(copy.stepper_name(), "rk");
    }
}
