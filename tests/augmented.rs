use daesens::prelude::*;
use daesens::integrator::offsets;
use daesens::{Dims, FunctionKind, OptionValue};

mod common;
use common::{decay, decay_backward, rk_integrator};

fn initialized(f: Function, g: Option<Function>) -> Integrator {
    let mut integrator = rk_integrator(f, g);
    integrator.init().unwrap();
    integrator
}

fn nnz(f: &Function, i: usize) -> usize {
    f.input_sparsity(i).nnz()
}

#[test]
fn without_directions_the_dae_is_reused() {
    let f = decay();
    let integrator = initialized(f.clone(), None);
    let aug = integrator.augmented(0, 0).unwrap();
    assert!(aug.forward.is_same(&f));
    assert!(aug.backward.is_none());
    assert_eq!(aug.offset.x, vec![0, 1]);
}

#[test]
fn forward_direction_stacks_tangents() {
    let integrator = initialized(decay(), None);
    let aug = integrator.augmented(1, 0).unwrap();
    assert!(aug.backward.is_none());
    assert_eq!(aug.offset.x, vec![0, 1, 2]);
    assert_eq!(aug.offset.p, vec![0, 1, 2]);

    // x = [2, 3], p = [0.5, 1]: ode = [-p x, -p dx - dp x], quad = [x, dx]
    let res = aug
        .forward
        .call(&[
            DMatrix::scalar(0.0),
            DMatrix::column(&[2.0, 3.0]),
            DMatrix::column(&[]),
            DMatrix::column(&[0.5, 1.0]),
        ])
        .unwrap();
    assert_eq!(res[DaeOut::Ode.index()].data(), &[-1.0, -3.5]);
    assert_eq!(res[DaeOut::Quad.index()].data(), &[2.0, 3.0]);
    assert_eq!(res[DaeOut::Alg.index()].nnz(), 0);
}

#[test]
fn adjoint_direction_builds_a_backward_problem() {
    let f = decay();
    let integrator = initialized(f.clone(), None);
    let aug = integrator.augmented(0, 1).unwrap();
    assert!(aug.forward.is_same(&f));
    let g = aug.backward.expect("adjoint directions need a backward problem");
    assert_eq!(aug.offset.rx, vec![0, 1]);
    assert_eq!(aug.offset.rq, vec![0, 1]);
    assert_eq!(aug.offset.rp, vec![0, 1]);

    // rx seeds ode, rp seeds quad: ode = -p rx + rp, quad = -x rx
    let res = g
        .call(&[
            DMatrix::scalar(0.0),
            DMatrix::column(&[2.0]),
            DMatrix::column(&[]),
            DMatrix::column(&[0.5]),
            DMatrix::column(&[3.0]),
            DMatrix::column(&[]),
            DMatrix::column(&[1.0]),
        ])
        .unwrap();
    assert_eq!(res[RdaeOut::Ode.index()].data(), &[-0.5]);
    assert_eq!(res[RdaeOut::Quad.index()].data(), &[-6.0]);
}

#[test]
fn backward_adjoints_become_forward_states() {
    let integrator = initialized(decay(), Some(decay_backward()));
    let aug = integrator.augmented(0, 1).unwrap();
    // x: nominal state, then the adjoint of rx
    assert_eq!(aug.offset.x, vec![0, 1, 2]);
    // p: nominal parameter, then the seed of rqf
    assert_eq!(aug.offset.p, vec![0, 1, 2]);
    assert_eq!(aug.offset.q, vec![0, 1]);

    // x = [2, l], p = [0.5, m]: ode = [-p x, -p l - x m] with the backward
    // solution itself zeroed out
    let res = aug
        .forward
        .call(&[
            DMatrix::scalar(0.0),
            DMatrix::column(&[2.0, 3.0]),
            DMatrix::column(&[]),
            DMatrix::column(&[0.5, 1.0]),
        ])
        .unwrap();
    assert_eq!(res[DaeOut::Ode.index()].data(), &[-1.0, -3.5]);
    assert_eq!(res[DaeOut::Quad.index()].data(), &[2.0]);
    assert!(aug.backward.is_some());
}

#[test]
fn callback_sizes_match_the_offsets() {
    let integrator = initialized(decay(), Some(decay_backward()));
    for (nfwd, nadj) in [(1, 0), (0, 1), (2, 1), (1, 2)] {
        let aug = integrator.augmented(nfwd, nadj).unwrap();
        let dims = aug.offset.dims();
        assert_eq!(dims, offsets(nfwd, nadj, &integrator.sizes()).dims());
        let f = &aug.forward;
        assert_eq!(nnz(f, DaeIn::X.index()), dims.nx);
        assert_eq!(nnz(f, DaeIn::Z.index()), dims.nz);
        assert_eq!(nnz(f, DaeIn::P.index()), dims.np);
        assert_eq!(f.output_sparsity(DaeOut::Quad.index()).nnz(), dims.nq);
        let g = aug.backward.as_ref().unwrap();
        assert_eq!(nnz(g, RdaeIn::Rx.index()), dims.nrx);
        assert_eq!(nnz(g, RdaeIn::Rp.index()), dims.nrp);
        assert_eq!(g.output_sparsity(RdaeOut::Quad.index()).nnz(), dims.nrq);
    }
}

#[test]
fn augmented_dimensions() {
    let dims = Dims {
        nx: 1,
        nq: 1,
        np: 1,
        nrx: 1,
        nrq: 1,
        ..Dims::default()
    };
    let o = offsets(1, 1, &dims);
    assert_eq!(o.dims().nx, 3);
    assert_eq!(o.dims().nrx, 3);
    assert_eq!(o.dims().np, 3);
    assert_eq!(o.dims().nrp, 1);
}

#[test]
fn scalar_callbacks_are_expanded_on_request() {
    let integrator = initialized(decay(), Some(decay_backward()));
    let aug = integrator.augmented(1, 1).unwrap();
    assert_eq!(aug.forward.kind(), FunctionKind::Sx);
    assert_eq!(aug.backward.unwrap().kind(), FunctionKind::Sx);

    let mut integrator = rk_integrator(decay(), Some(decay_backward()));
    integrator.set_option("expand_augmented", false).unwrap();
    integrator.init().unwrap();
    let aug = integrator.augmented(1, 1).unwrap();
    assert_eq!(aug.forward.kind(), FunctionKind::Mx);
    assert_eq!(aug.backward.unwrap().kind(), FunctionKind::Mx);
}

#[test]
fn vector_callbacks_are_not_expanded() {
    let f = decay();
    f.init().unwrap();
    let inputs: Vec<Mx> = ["t", "x", "z", "p"]
        .iter()
        .enumerate()
        .map(|(i, name)| Mx::sym(name, f.input_sparsity(i)))
        .collect();
    let outputs = f.call_mx(&inputs).unwrap();
    let wrapped = Function::new(MxFunction::new("wrapped_decay", inputs, outputs));

    let integrator = initialized(wrapped, None);
    assert_eq!(integrator.get_option("expand_augmented").unwrap(), &OptionValue::Bool(true));
    let aug = integrator.augmented(1, 0).unwrap();
    assert_eq!(aug.forward.kind(), FunctionKind::Mx);

    let res = aug
        .forward
        .call(&[
            DMatrix::scalar(0.0),
            DMatrix::column(&[2.0, 3.0]),
            DMatrix::column(&[]),
            DMatrix::column(&[0.5, 1.0]),
        ])
        .unwrap();
    assert_eq!(res[DaeOut::Ode.index()].data(), &[-1.0, -3.5]);
}

#[test]
fn augmented_problem_requires_init() {
    let integrator = rk_integrator(decay(), None);
    assert!(matches!(integrator.augmented(1, 0), Err(Error::Lifecycle { .. })));
}
