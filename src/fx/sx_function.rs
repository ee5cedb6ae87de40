//! Functions over scalar expression graphs, evaluated from a flat tape

use std::collections::HashMap;

use crate::{
    Float,
    error::{Error, Result},
    matrix::{Bvec, DMatrix},
    sparsity::Sparsity,
    sx::{self, BinaryOp, Sx, SxMatrix, SxNode, UnaryOp},
};

use super::{DeepCopyMap, Function, FunctionKind, FunctionNode, split_nonzeros};

#[derive(Clone, Debug)]
enum Instruction {
    Input { slot: usize, nz: usize },
    Constant(Float),
    Unary(UnaryOp, usize),
    Binary(BinaryOp, usize, usize),
}

/// Function whose body is a graph of scalar operations.
///
/// Every input nonzero must be a distinct symbol; every symbol reachable from
/// the outputs must be an input.
#[derive(Clone)]
pub struct SxFunction {
    name: String,
    inputs: Vec<SxMatrix>,
    outputs: Vec<SxMatrix>,
    algorithm: Vec<Instruction>,
    output_refs: Vec<Vec<usize>>,
    initialized: bool,
}

impl SxFunction {
    pub fn new(name: &str, inputs: Vec<SxMatrix>, outputs: Vec<SxMatrix>) -> Self {
        Self {
            name: name.to_string(),
            inputs,
            outputs,
            algorithm: Vec::new(),
            output_refs: Vec::new(),
            initialized: false,
        }
    }

    pub fn inputs(&self) -> &[SxMatrix] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SxMatrix] {
        &self.outputs
    }

    fn flat_inputs(&self) -> Vec<Sx> {
        self.inputs.iter().flat_map(|m| m.nonzeros().iter().cloned()).collect()
    }

    fn flat_outputs(&self) -> Vec<Sx> {
        self.outputs.iter().flat_map(|m| m.nonzeros().iter().cloned()).collect()
    }

    fn input_patterns(&self) -> Vec<Sparsity> {
        self.inputs.iter().map(|m| m.sparsity().clone()).collect()
    }

    fn output_patterns(&self) -> Vec<Sparsity> {
        self.outputs.iter().map(|m| m.sparsity().clone()).collect()
    }
}

impl FunctionNode for SxFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Sx
    }

    fn n_in(&self) -> usize {
        self.inputs.len()
    }

    fn n_out(&self) -> usize {
        self.outputs.len()
    }

    fn input_sparsity(&self, i: usize) -> &Sparsity {
        self.inputs[i].sparsity()
    }

    fn output_sparsity(&self, i: usize) -> &Sparsity {
        self.outputs[i].sparsity()
    }

    fn init(&mut self) -> Result<()> {
        let mut input_pos: HashMap<usize, (usize, usize)> = HashMap::new();
        for (slot, m) in self.inputs.iter().enumerate() {
            for (nz, s) in m.nonzeros().iter().enumerate() {
                if !s.is_symbolic() || input_pos.insert(s.id(), (slot, nz)).is_some() {
                    return Err(Error::NonSymbolicInput(slot));
                }
            }
        }

        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut algorithm = Vec::new();
        for node in sx::sort(&self.flat_outputs()) {
            let instr = match &*node.0 {
                SxNode::Constant(v) => Instruction::Constant(*v),
                SxNode::Symbol(name) => {
                    let &(slot, nz) = input_pos
                        .get(&node.id())
                        .ok_or_else(|| Error::FreeSymbol(name.clone()))?;
                    Instruction::Input { slot, nz }
                }
                SxNode::Unary(op, a) => Instruction::Unary(*op, position[&a.id()]),
                SxNode::Binary(op, a, b) => Instruction::Binary(*op, position[&a.id()], position[&b.id()]),
            };
            position.insert(node.id(), algorithm.len());
            algorithm.push(instr);
        }

        self.output_refs = self
            .outputs
            .iter()
            .map(|m| m.nonzeros().iter().map(|e| position[&e.id()]).collect())
            .collect();
        self.algorithm = algorithm;
        self.initialized = true;
        Ok(())
    }

    fn is_init(&self) -> bool {
        self.initialized
    }

    fn eval(&self, args: &[DMatrix]) -> Result<Vec<DMatrix>> {
        let mut w: Vec<Float> = Vec::with_capacity(self.algorithm.len());
        for instr in &self.algorithm {
            let v = match *instr {
                Instruction::Input { slot, nz } => args[slot].data()[nz],
                Instruction::Constant(v) => v,
                Instruction::Unary(op, a) => op.apply(w[a]),
                Instruction::Binary(op, a, b) => op.apply(w[a], w[b]),
            };
            w.push(v);
        }
        Ok(self
            .outputs
            .iter()
            .zip(&self.output_refs)
            .map(|(m, refs)| DMatrix::from_nonzeros(m.sparsity().clone(), refs.iter().map(|&k| w[k]).collect()))
            .collect())
    }

    fn eval_sx(&self, args: &[SxMatrix]) -> Result<Vec<SxMatrix>> {
        let mut w: Vec<Sx> = Vec::with_capacity(self.algorithm.len());
        for instr in &self.algorithm {
            let v = match *instr {
                Instruction::Input { slot, nz } => args[slot].at(nz).clone(),
                Instruction::Constant(v) => Sx::constant(v),
                Instruction::Unary(op, a) => Sx::unary(op, &w[a]),
                Instruction::Binary(op, a, b) => Sx::binary(op, &w[a], &w[b]),
            };
            w.push(v);
        }
        Ok(self
            .outputs
            .iter()
            .zip(&self.output_refs)
            .map(|(m, refs)| SxMatrix::from_nonzeros(m.sparsity().clone(), refs.iter().map(|&k| w[k].clone()).collect()))
            .collect())
    }

    fn sp_forward(&self, arg: &[Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()> {
        let mut w: Vec<Bvec> = Vec::with_capacity(self.algorithm.len());
        for instr in &self.algorithm {
            let v = match *instr {
                Instruction::Input { slot, nz } => arg[slot][nz],
                Instruction::Constant(_) => 0,
                Instruction::Unary(_, a) => w[a],
                Instruction::Binary(_, a, b) => w[a] | w[b],
            };
            w.push(v);
        }
        for (r, refs) in res.iter_mut().zip(&self.output_refs) {
            for (bits, &k) in r.iter_mut().zip(refs) {
                *bits = w[k];
            }
        }
        Ok(())
    }

    fn sp_reverse(&self, arg: &mut [Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()> {
        let mut w: Vec<Bvec> = vec![0; self.algorithm.len()];
        for (r, refs) in res.iter_mut().zip(&self.output_refs) {
            for (bits, &k) in r.iter_mut().zip(refs) {
                w[k] |= *bits;
                *bits = 0;
            }
        }
        for (i, instr) in self.algorithm.iter().enumerate().rev() {
            let seed = w[i];
            if seed == 0 {
                continue;
            }
            match *instr {
                Instruction::Input { slot, nz } => arg[slot][nz] |= seed,
                Instruction::Constant(_) => {}
                Instruction::Unary(_, a) => w[a] |= seed,
                Instruction::Binary(_, a, b) => {
                    w[a] |= seed;
                    w[b] |= seed;
                }
            }
        }
        Ok(())
    }

    fn derivative(&self, nfwd: usize, nadj: usize) -> Result<Function> {
        let in_sp = self.input_patterns();
        let out_sp = self.output_patterns();
        let x = self.flat_inputs();
        let y = self.flat_outputs();

        let mut inputs = self.inputs.clone();
        let mut outputs = self.outputs.clone();
        let mut fwd_sens = Vec::with_capacity(nfwd);
        for d in 0..nfwd {
            let seeds: Vec<SxMatrix> = in_sp
                .iter()
                .enumerate()
                .map(|(i, sp)| SxMatrix::sym(&format!("fwd{}_i{}", d, i), sp.clone()))
                .collect();
            let flat: Vec<Sx> = seeds.iter().flat_map(|m| m.nonzeros().iter().cloned()).collect();
            let sens = sx::forward(&y, &x, &flat);
            fwd_sens.extend(
                split_nonzeros(&sens, &out_sp)
                    .into_iter()
                    .zip(&out_sp)
                    .map(|(nz, sp)| SxMatrix::from_nonzeros(sp.clone(), nz)),
            );
            inputs.extend(seeds);
        }
        let mut adj_sens = Vec::with_capacity(nadj);
        for d in 0..nadj {
            let seeds: Vec<SxMatrix> = out_sp
                .iter()
                .enumerate()
                .map(|(o, sp)| SxMatrix::sym(&format!("adj{}_o{}", d, o), sp.clone()))
                .collect();
            let flat: Vec<Sx> = seeds.iter().flat_map(|m| m.nonzeros().iter().cloned()).collect();
            let sens = sx::reverse(&y, &x, &flat);
            adj_sens.extend(
                split_nonzeros(&sens, &in_sp)
                    .into_iter()
                    .zip(&in_sp)
                    .map(|(nz, sp)| SxMatrix::from_nonzeros(sp.clone(), nz)),
            );
            inputs.extend(seeds);
        }
        outputs.extend(fwd_sens);
        outputs.extend(adj_sens);

        let name = format!("{}_d{}_{}", self.name, nfwd, nadj);
        Ok(Function::new(SxFunction::new(&name, inputs, outputs)))
    }

    fn deep_copy(&self, _copies: &mut DeepCopyMap) -> Function {
        // Scalar graphs are immutable and safe to share between copies.
        Function::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled_decay() -> Function {
        // f(x, p) = [-p*x0, x0*x1], g = sin(p)
        let x = SxMatrix::sym_column("x", 2);
        let p = SxMatrix::sym_column("p", 1);
        let (x0, x1, p0) = (x.at(0).clone(), x.at(1).clone(), p.at(0).clone());
        let f = SxMatrix::column(vec![-(&p0 * &x0), &x0 * &x1]);
        let g = SxMatrix::column(vec![p0.sin()]);
        Function::new(SxFunction::new("scaled_decay", vec![x, p], vec![f, g]))
    }

    #[test]
    fn numeric_call() {
        let f = scaled_decay();
        let res = f.call(&[DMatrix::column(&[2.0, 3.0]), DMatrix::column(&[0.5])]).unwrap();
        assert_eq!(res[0].data(), &[-1.0, 6.0]);
        assert!((res[1].data()[0] - 0.5f64.sin()).abs() < 1e-15);
    }

    #[test]
    fn jacobian_sparsity_from_forward_propagation() {
        let f = scaled_decay();
        let j = f.jac_sparsity(0, 0).unwrap();
        assert_eq!(j.shape(), (2, 2));
        assert!(j.get_nz(0, 0).is_some());
        assert!(j.get_nz(0, 1).is_none());
        assert!(j.get_nz(1, 0).is_some());
        assert!(j.get_nz(1, 1).is_some());
        assert_eq!(f.jac_sparsity(0, 1).unwrap().nnz(), 0);
    }

    #[test]
    fn reverse_propagation_reaches_only_dependencies() {
        let f = scaled_decay();
        let mut arg = vec![vec![0; 2], vec![0; 1]];
        let mut res = vec![vec![0b01, 0], vec![0b10]];
        f.sp_reverse(&mut arg, &mut res).unwrap();
        assert_eq!(arg[0], vec![0b01, 0]);
        assert_eq!(arg[1], vec![0b11]);
        assert_eq!(res, vec![vec![0, 0], vec![0]]);
    }

    #[test]
    fn derivative_layout_and_values() {
        let f = scaled_decay();
        let d = f.derivative(1, 1).unwrap();
        // ins: x, p, fwd x, fwd p, adj f, adj g
        assert_eq!(d.n_in(), 6);
        // outs: f, g, fwd f, fwd g, adj x, adj p
        assert_eq!(d.n_out(), 6);
        let res = d
            .call(&[
                DMatrix::column(&[2.0, 3.0]),
                DMatrix::column(&[0.5]),
                DMatrix::column(&[1.0, 0.0]),
                DMatrix::column(&[0.0]),
                DMatrix::column(&[1.0, 1.0]),
                DMatrix::column(&[0.0]),
            ])
            .unwrap();
        // d f / d x0 = [-p, x1]
        assert_eq!(res[2].data(), &[-0.5, 3.0]);
        // [1, 1]^T J_x = [-p + x1, x0]
        assert_eq!(res[4].data(), &[2.5, 2.0]);
        // [1, 1]^T J_p = [-x0]
        assert_eq!(res[5].data(), &[-2.0]);
    }

    #[test]
    fn free_symbols_are_rejected() {
        let x = SxMatrix::sym_column("x", 1);
        let stray = Sx::sym("stray");
        let out = SxMatrix::column(vec![x.at(0) * &stray]);
        let f = Function::new(SxFunction::new("bad", vec![x], vec![out]));
        assert!(matches!(f.init(), Err(Error::FreeSymbol(_))));
    }
}
