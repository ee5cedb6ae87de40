//! Sensitivities of an integrator through its augmented problem

use crate::{
    error::{Error, Result},
    matrix::DMatrix,
    scheme::{IntegratorInput as In, IntegratorOutput as Out},
    sparsity::Sparsity,
};

use super::{Integrator, augmented::BlockCursor, offset::{AugOffset, Dims}};

/// Evaluates an integrator together with forward and adjoint sensitivities.
///
/// Arguments: the six integrator inputs, then `nfwd` blocks of forward seeds
/// for the six inputs, then `nadj` blocks of adjoint seeds for the six
/// outputs. Results: the six outputs, `nfwd` blocks of forward sensitivities
/// of the outputs, then `nadj` blocks of adjoint sensitivities of the inputs.
pub struct IntegratorDerivative {
    integrator: Integrator,
    offset: AugOffset,
    nfwd: usize,
    nadj: usize,
    sizes: Dims,
    input_sparsity: Vec<Sparsity>,
    output_sparsity: Vec<Sparsity>,
}

impl IntegratorDerivative {
    pub(crate) fn new(
        integrator: Integrator,
        offset: AugOffset,
        nfwd: usize,
        nadj: usize,
        sizes: Dims,
        input_sparsity: Vec<Sparsity>,
        output_sparsity: Vec<Sparsity>,
    ) -> Self {
        Self {
            integrator,
            offset,
            nfwd,
            nadj,
            sizes,
            input_sparsity,
            output_sparsity,
        }
    }

    /// Integrator of the augmented problem.
    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    pub fn offset(&self) -> &AugOffset {
        &self.offset
    }

    pub fn n_in(&self) -> usize {
        In::COUNT * (1 + self.nfwd) + Out::COUNT * self.nadj
    }

    pub fn n_out(&self) -> usize {
        Out::COUNT * (1 + self.nfwd) + In::COUNT * self.nadj
    }

    fn expected_pattern(&self, k: usize) -> &Sparsity {
        let nominal = In::COUNT * (1 + self.nfwd);
        if k < nominal {
            &self.input_sparsity[k % In::COUNT]
        } else {
            &self.output_sparsity[(k - nominal) % Out::COUNT]
        }
    }

    pub fn evaluate(&mut self, args: &[DMatrix]) -> Result<Vec<DMatrix>> {
        if args.len() != self.n_in() {
            return Err(Error::ArgumentCount {
                function: "integrator derivative".to_string(),
                expected: self.n_in(),
                got: args.len(),
            });
        }
        let args = args
            .iter()
            .enumerate()
            .map(|(k, a)| {
                let sp = self.expected_pattern(k);
                if a.sparsity().numel() == 0 {
                    return Ok(DMatrix::zeros(sp.clone()));
                }
                if a.shape() != sp.shape() {
                    return Err(Error::ShapeMismatch {
                        what: format!("argument {} of the integrator derivative", k),
                        expected: sp.shape(),
                        got: a.shape(),
                    });
                }
                Ok(a.project(sp))
            })
            .collect::<Result<Vec<_>>>()?;

        // Stack nominal values and seeds into the augmented initial values,
        // one dense block per port.
        let mut stacks: [Vec<DMatrix>; 6] = Default::default();
        let (nominal, adjoint) = args.split_at(In::COUNT * (1 + self.nfwd));
        for block in nominal.chunks(In::COUNT) {
            for slot in In::ALL {
                stacks[slot.index()].push(block[slot.index()].clone());
            }
        }
        for block in adjoint.chunks(Out::COUNT) {
            stacks[In::Rx0.index()].push(block[Out::Xf.index()].clone());
            stacks[In::Rp.index()].push(block[Out::Qf.index()].clone());
            stacks[In::Rz0.index()].push(block[Out::Zf.index()].clone());
            stacks[In::X0.index()].push(block[Out::Rxf.index()].clone());
            stacks[In::P.index()].push(block[Out::Rqf.index()].clone());
            stacks[In::Z0.index()].push(block[Out::Rzf.index()].clone());
        }
        for slot in In::ALL {
            let data: Vec<_> = stacks[slot.index()].iter().flat_map(|m| m.to_dense_vec()).collect();
            // A reused DAE keeps its own port patterns.
            self.integrator.set_input_matrix(*slot, &DMatrix::column(&data))?;
        }

        self.integrator.evaluate()?;

        let out = |slot: Out| self.integrator.output(slot);
        let mut xf = BlockCursor::new("xf", out(Out::Xf)?.vertsplit(&self.offset.x));
        let mut qf = BlockCursor::new("qf", out(Out::Qf)?.vertsplit(&self.offset.q));
        let mut zf = BlockCursor::new("zf", out(Out::Zf)?.vertsplit(&self.offset.z));
        let mut rxf = BlockCursor::new("rxf", out(Out::Rxf)?.vertsplit(&self.offset.rx));
        let mut rqf = BlockCursor::new("rqf", out(Out::Rqf)?.vertsplit(&self.offset.rq));
        let mut rzf = BlockCursor::new("rzf", out(Out::Rzf)?.vertsplit(&self.offset.rz));

        let d = self.sizes;
        let read = |cursor: &mut BlockCursor<DMatrix>, n: usize, sp: &Sparsity| -> Result<DMatrix> {
            if n > 0 {
                Ok(cursor.next()?.project(sp))
            } else {
                Ok(DMatrix::zeros(sp.clone()))
            }
        };
        let in_sp = &self.input_sparsity;
        let out_sp = &self.output_sparsity;

        let mut res = Vec::with_capacity(self.n_out());
        for _ in 0..=self.nfwd {
            res.push(read(&mut xf, d.nx, &out_sp[Out::Xf.index()])?);
            res.push(read(&mut qf, d.nq, &out_sp[Out::Qf.index()])?);
            res.push(read(&mut zf, d.nz, &out_sp[Out::Zf.index()])?);
            res.push(read(&mut rxf, d.nrx, &out_sp[Out::Rxf.index()])?);
            res.push(read(&mut rqf, d.nrq, &out_sp[Out::Rqf.index()])?);
            res.push(read(&mut rzf, d.nrz, &out_sp[Out::Rzf.index()])?);
        }
        for _ in 0..self.nadj {
            res.push(read(&mut rxf, d.nx, &in_sp[In::X0.index()])?);
            res.push(read(&mut rqf, d.np, &in_sp[In::P.index()])?);
            res.push(read(&mut rzf, d.nz, &in_sp[In::Z0.index()])?);
            res.push(read(&mut xf, d.nrx, &in_sp[In::Rx0.index()])?);
            res.push(read(&mut qf, d.nrp, &in_sp[In::Rp.index()])?);
            res.push(read(&mut zf, d.nrz, &in_sp[In::Rz0.index()])?);
        }
        for cursor in [&xf, &qf, &zf, &rxf, &rqf, &rzf] {
            cursor.finish()?;
        }
        Ok(res)
    }
}
