use daesens::prelude::*;
use daesens::Bvec;

mod common;
use common::{decay, decay_backward, decay_dae, decay_without_quadrature, decoupled, ready, rk_integrator};

fn initialized(f: Function, g: Option<Function>) -> Integrator {
    let mut integrator = rk_integrator(f, g);
    integrator.init().unwrap();
    integrator
}

fn input_buffers(integrator: &Integrator) -> Vec<Vec<Bvec>> {
    IntegratorInput::ALL
        .iter()
        .map(|s| vec![0; integrator.input(*s).unwrap().nnz()])
        .collect()
}

fn output_buffers(integrator: &Integrator) -> Vec<Vec<Bvec>> {
    IntegratorOutput::ALL
        .iter()
        .map(|s| vec![0; integrator.output(*s).unwrap().nnz()])
        .collect()
}

fn entries(sp: &Sparsity) -> Vec<(usize, usize)> {
    sp.entries().collect()
}

#[test]
fn terminal_state_depends_on_initial_state_and_parameters() {
    let integrator = initialized(decay(), None);
    assert_eq!(integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Xf).unwrap().nnz(), 1);
    assert_eq!(integrator.jac_sparsity(IntegratorInput::P, IntegratorOutput::Xf).unwrap().nnz(), 1);
    assert_eq!(integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Qf).unwrap().nnz(), 1);
}

#[test]
fn missing_quadratures_have_no_dependencies() {
    let integrator = initialized(decay_without_quadrature(), None);
    let sp = integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Qf).unwrap();
    assert_eq!(sp.shape(), (0, 1));
    assert_eq!(integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Xf).unwrap().nnz(), 1);
}

#[test]
fn structure_covers_the_numeric_sensitivities() {
    let integrator = ready(decoupled(), None, &[1.0, 1.0]);
    let structure = integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Xf).unwrap();
    let mut d = integrator.derivative(1, 0).unwrap();
    let empty = || DMatrix::column(&[]);
    for col in 0..2 {
        let mut seed = [0.0; 2];
        seed[col] = 1.0;
        let mut args = vec![DMatrix::column(&[1.0, 1.0]), DMatrix::column(&[1.0]), empty(), empty(), empty(), empty()];
        args.extend([DMatrix::column(&seed), DMatrix::column(&[0.0]), empty(), empty(), empty(), empty()]);
        let res = d.evaluate(&args).unwrap();
        for (row, v) in res[6].data().iter().enumerate() {
            if v.abs() > 1e-12 {
                assert!(structure.get_nz(row, col).is_some(), "missing ({}, {})", row, col);
            }
        }
    }
}

#[test]
fn decoupled_states_stay_decoupled() {
    let integrator = initialized(decoupled(), None);
    let sp = integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Xf).unwrap();
    assert_eq!(sp.shape(), (2, 2));
    assert_eq!(entries(&sp), vec![(0, 0), (1, 1)]);

    let sp = integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Qf).unwrap();
    assert_eq!(entries(&sp), vec![(0, 1)]);

    let sp = integrator.jac_sparsity(IntegratorInput::P, IntegratorOutput::Xf).unwrap();
    assert_eq!(entries(&sp), vec![(0, 0)]);
}

#[test]
fn conservative_sparsity_fills_the_blocks() {
    let mut integrator = rk_integrator(decoupled(), None);
    integrator.set_option("conservative_sparsity", true).unwrap();
    integrator.init().unwrap();
    let sp = integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Xf).unwrap();
    assert_eq!(sp.nnz(), 4);
}

#[test]
fn conservative_sparsity_fills_the_blocks_in_reverse() {
    let mut integrator = rk_integrator(decoupled(), None);
    integrator.set_option("conservative_sparsity", true).unwrap();
    integrator.init().unwrap();
    let mut inputs = input_buffers(&integrator);
    let mut outputs = output_buffers(&integrator);
    outputs[IntegratorOutput::Xf.index()][0] = 0b1;
    integrator.sp_evaluate(false, &mut inputs, &mut outputs).unwrap();

    // the precise pass alone leaves x0[1] untouched
    assert_eq!(inputs[IntegratorInput::X0.index()], vec![0b1, 0b1]);
    assert_eq!(inputs[IntegratorInput::P.index()], vec![0b1]);
    assert!(outputs.iter().flatten().all(|b| *b == 0));
}

#[test]
fn reverse_propagation_reaches_the_dependencies() {
    let integrator = initialized(decoupled(), None);
    let mut inputs = input_buffers(&integrator);
    let mut outputs = output_buffers(&integrator);
    outputs[IntegratorOutput::Xf.index()][0] = 0b01;
    outputs[IntegratorOutput::Qf.index()][0] = 0b10;
    integrator.sp_evaluate(false, &mut inputs, &mut outputs).unwrap();

    assert_eq!(inputs[IntegratorInput::X0.index()], vec![0b01, 0b10]);
    assert_eq!(inputs[IntegratorInput::P.index()], vec![0b01]);
    assert!(outputs.iter().flatten().all(|b| *b == 0));
}

#[test]
fn reverse_propagation_skips_algebraic_guesses() {
    let integrator = initialized(decay_dae(), None);
    let mut inputs = input_buffers(&integrator);
    let mut outputs = output_buffers(&integrator);
    outputs[IntegratorOutput::Zf.index()][0] = 1;
    integrator.sp_evaluate(false, &mut inputs, &mut outputs).unwrap();

    assert_eq!(inputs[IntegratorInput::Z0.index()], vec![0]);
    assert_ne!(inputs[IntegratorInput::X0.index()][0], 0);
    assert_eq!(outputs[IntegratorOutput::Zf.index()], vec![0]);
}

#[test]
fn algebraic_states_follow_the_differential_states() {
    let integrator = initialized(decay_dae(), None);
    let sp = integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Zf).unwrap();
    assert_eq!(sp.nnz(), 1);
    let sp = integrator.jac_sparsity(IntegratorInput::Z0, IntegratorOutput::Xf).unwrap();
    assert_eq!(sp.nnz(), 0);
}

#[test]
fn backward_outputs_are_tighter_than_the_block_table() {
    let integrator = initialized(decay(), Some(decay_backward()));
    // rx' = -p rx does not involve x
    assert_eq!(integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Rxf).unwrap().nnz(), 0);
    assert_eq!(integrator.jac_sparsity(IntegratorInput::Rx0, IntegratorOutput::Rxf).unwrap().nnz(), 1);
    assert_eq!(integrator.jac_sparsity(IntegratorInput::P, IntegratorOutput::Rxf).unwrap().nnz(), 1);
    // rq' = -x rx does
    assert_eq!(integrator.jac_sparsity(IntegratorInput::X0, IntegratorOutput::Rqf).unwrap().nnz(), 1);
    // nothing flows from the backward problem into the forward outputs
    assert_eq!(integrator.jac_sparsity(IntegratorInput::Rx0, IntegratorOutput::Xf).unwrap().nnz(), 0);
}

#[test]
fn forward_and_reverse_agree() {
    let integrator = initialized(decay(), Some(decay_backward()));
    let pairs = [
        (IntegratorInput::X0, IntegratorOutput::Xf),
        (IntegratorInput::P, IntegratorOutput::Rqf),
        (IntegratorInput::X0, IntegratorOutput::Rxf),
        (IntegratorInput::Rx0, IntegratorOutput::Rqf),
    ];
    for (i, o) in pairs {
        let forward = integrator.jac_sparsity(i, o).unwrap().nnz() > 0;

        let mut inputs = input_buffers(&integrator);
        let mut outputs = output_buffers(&integrator);
        outputs[o.index()][0] = 1;
        integrator.sp_evaluate(false, &mut inputs, &mut outputs).unwrap();
        let reverse = inputs[i.index()][0] != 0;
        assert_eq!(forward, reverse, "{:?} -> {:?}", i, o);
    }
}

#[test]
fn buffers_must_match_the_ports() {
    let integrator = initialized(decay(), None);
    let mut inputs = input_buffers(&integrator);
    let mut outputs = output_buffers(&integrator);
    inputs[IntegratorInput::X0.index()].push(0);
    assert!(matches!(
        integrator.sp_evaluate(true, &mut inputs, &mut outputs),
        Err(Error::ShapeMismatch { .. })
    ));
    let mut short = vec![vec![0]; 2];
    assert!(matches!(
        integrator.sp_evaluate(true, &mut short, &mut outputs),
        Err(Error::ArgumentCount { .. })
    ));
}

#[test]
fn propagation_requires_init() {
    let integrator = rk_integrator(decay(), None);
    let mut inputs = vec![Vec::new(); 6];
    let mut outputs = vec![Vec::new(); 6];
    assert!(matches!(
        integrator.sp_evaluate(true, &mut inputs, &mut outputs),
        Err(Error::Lifecycle { .. })
    ));
}
