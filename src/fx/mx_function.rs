//! Functions over vector expression graphs

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{
    error::{Error, Result},
    matrix::{Bvec, DMatrix},
    sparsity::Sparsity,
    sx::{Sx, SxMatrix},
};

use super::{
    DeepCopyMap, Function, FunctionKind, FunctionNode,
    mx::{CallNode, Mx, MxNode, MxOp, call_id},
};

/// One entry of the evaluation order: a vector node, or a function call
/// whose outputs are read by `Output` nodes after it.
#[derive(Clone)]
enum Step {
    Node(Mx),
    Call(Rc<CallNode>),
}

impl Step {
    fn id(&self) -> usize {
        match self {
            Step::Node(n) => n.id(),
            Step::Call(c) => call_id(c),
        }
    }

    fn deps(&self) -> Vec<Step> {
        match self {
            Step::Call(c) => c.args.iter().cloned().map(Step::Node).collect(),
            Step::Node(n) => match &n.0.op {
                MxOp::Symbol(_) | MxOp::Zeros => Vec::new(),
                MxOp::Remap { arg, .. } => vec![Step::Node(arg.clone())],
                MxOp::VertCat(parts) => parts.iter().cloned().map(Step::Node).collect(),
                MxOp::Add(a, b) => vec![Step::Node(a.clone()), Step::Node(b.clone())],
                MxOp::Output { call, .. } => vec![Step::Call(call.clone())],
            },
        }
    }
}

fn sort(outputs: &[Mx]) -> Vec<Step> {
    let mut order = Vec::new();
    let mut done: HashSet<usize> = HashSet::new();
    let mut stack: Vec<(Step, bool)> = outputs.iter().rev().map(|o| (Step::Node(o.clone()), false)).collect();
    while let Some((step, expanded)) = stack.pop() {
        if done.contains(&step.id()) {
            continue;
        }
        if expanded {
            done.insert(step.id());
            order.push(step);
        } else {
            let deps = step.deps();
            stack.push((step, true));
            for dep in deps.into_iter().rev() {
                if !done.contains(&dep.id()) {
                    stack.push((dep, false));
                }
            }
        }
    }
    order
}

/// Values a vector graph can be evaluated over.
trait Value: Clone {
    fn zeros(sp: &Sparsity) -> Self;
    fn remap(&self, src: &[Option<usize>], sp: &Sparsity) -> Self;
    fn vertcat(parts: &[&Self], sp: &Sparsity) -> Self;
    fn add(&self, other: &Self) -> Self;
    fn call(f: &Function, args: &[Self]) -> Result<Vec<Self>>;
}

impl Value for DMatrix {
    fn zeros(sp: &Sparsity) -> Self {
        DMatrix::zeros(sp.clone())
    }

    fn remap(&self, src: &[Option<usize>], sp: &Sparsity) -> Self {
        let data = src.iter().map(|k| k.map_or(0.0, |k| self.data()[k])).collect();
        DMatrix::from_nonzeros(sp.clone(), data)
    }

    fn vertcat(parts: &[&Self], sp: &Sparsity) -> Self {
        let data = parts.iter().flat_map(|p| p.data().iter().copied()).collect();
        DMatrix::from_nonzeros(sp.clone(), data)
    }

    fn add(&self, other: &Self) -> Self {
        let data = self.data().iter().zip(other.data()).map(|(a, b)| a + b).collect();
        DMatrix::from_nonzeros(self.sparsity().clone(), data)
    }

    fn call(f: &Function, args: &[Self]) -> Result<Vec<Self>> {
        f.call(args)
    }
}

impl Value for SxMatrix {
    fn zeros(sp: &Sparsity) -> Self {
        SxMatrix::zeros(sp.clone())
    }

    fn remap(&self, src: &[Option<usize>], sp: &Sparsity) -> Self {
        let nz = src.iter().map(|k| k.map_or_else(Sx::zero, |k| self.at(k).clone())).collect();
        SxMatrix::from_nonzeros(sp.clone(), nz)
    }

    fn vertcat(parts: &[&Self], sp: &Sparsity) -> Self {
        let nz = parts.iter().flat_map(|p| p.nonzeros().iter().cloned()).collect();
        SxMatrix::from_nonzeros(sp.clone(), nz)
    }

    fn add(&self, other: &Self) -> Self {
        let nz = self.nonzeros().iter().zip(other.nonzeros()).map(|(a, b)| a + b).collect();
        SxMatrix::from_nonzeros(self.sparsity().clone(), nz)
    }

    fn call(f: &Function, args: &[Self]) -> Result<Vec<Self>> {
        f.call_sx(args)
    }
}

impl Value for Vec<Bvec> {
    fn zeros(sp: &Sparsity) -> Self {
        vec![0; sp.nnz()]
    }

    fn remap(&self, src: &[Option<usize>], _sp: &Sparsity) -> Self {
        src.iter().map(|k| k.map_or(0, |k| self[k])).collect()
    }

    fn vertcat(parts: &[&Self], _sp: &Sparsity) -> Self {
        parts.iter().flat_map(|p| p.iter().copied()).collect()
    }

    fn add(&self, other: &Self) -> Self {
        self.iter().zip(other).map(|(a, b)| a | b).collect()
    }

    fn call(f: &Function, args: &[Self]) -> Result<Vec<Self>> {
        let mut res: Vec<Vec<Bvec>> = (0..f.n_out()).map(|o| vec![0; f.output_sparsity(o).nnz()]).collect();
        f.sp_forward(args, &mut res)?;
        Ok(res)
    }
}

/// Function whose body is a graph over vector blocks, possibly calling other
/// functions.
#[derive(Clone)]
pub struct MxFunction {
    name: String,
    inputs: Vec<Mx>,
    outputs: Vec<Mx>,
    tape: Vec<Step>,
    input_pos: HashMap<usize, usize>,
    initialized: bool,
}

impl MxFunction {
    pub fn new(name: &str, inputs: Vec<Mx>, outputs: Vec<Mx>) -> Self {
        Self {
            name: name.to_string(),
            inputs,
            outputs,
            tape: Vec::new(),
            input_pos: HashMap::new(),
            initialized: false,
        }
    }

    pub fn inputs(&self) -> &[Mx] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Mx] {
        &self.outputs
    }

    fn evaluate<V: Value>(&self, args: &[V]) -> Result<Vec<V>> {
        let mut work: HashMap<usize, V> = HashMap::with_capacity(self.tape.len());
        let mut calls: HashMap<usize, Vec<V>> = HashMap::new();
        for step in &self.tape {
            match step {
                Step::Call(c) => {
                    let a: Vec<V> = c.args.iter().map(|x| work[&x.id()].clone()).collect();
                    calls.insert(call_id(c), V::call(&c.f, &a)?);
                }
                Step::Node(n) => {
                    let sp = n.sparsity();
                    let v = match &n.0.op {
                        MxOp::Symbol(_) => args[self.input_pos[&n.id()]].clone(),
                        MxOp::Zeros => V::zeros(sp),
                        MxOp::Remap { arg, src } => work[&arg.id()].remap(src, sp),
                        MxOp::VertCat(parts) => {
                            let parts: Vec<&V> = parts.iter().map(|p| &work[&p.id()]).collect();
                            V::vertcat(&parts, sp)
                        }
                        MxOp::Add(a, b) => work[&a.id()].add(&work[&b.id()]),
                        MxOp::Output { call, index } => calls[&call_id(call)][*index].clone(),
                    };
                    work.insert(n.id(), v);
                }
            }
        }
        Ok(self.outputs.iter().map(|o| work[&o.id()].clone()).collect())
    }

    fn forward_tangents(&self, seeds: &[Vec<Mx>]) -> Result<HashMap<usize, Vec<Mx>>> {
        let nfwd = seeds.len();
        let mut tangent: HashMap<usize, Vec<Mx>> = HashMap::new();
        let mut call_tangent: HashMap<usize, Vec<Vec<Mx>>> = HashMap::new();
        for step in &self.tape {
            match step {
                Step::Call(c) => {
                    let d = c.f.derivative(nfwd, 0)?;
                    let mut args = c.args.clone();
                    for dir in 0..nfwd {
                        args.extend(c.args.iter().map(|a| tangent[&a.id()][dir].clone()));
                    }
                    let res = d.call_mx(&args)?;
                    let n_out = c.f.n_out();
                    let per_dir = (0..nfwd)
                        .map(|dir| res[n_out * (1 + dir)..n_out * (2 + dir)].to_vec())
                        .collect();
                    call_tangent.insert(call_id(c), per_dir);
                }
                Step::Node(n) => {
                    let sp = n.sparsity();
                    let t: Vec<Mx> = match &n.0.op {
                        MxOp::Symbol(_) => {
                            let i = self.input_pos[&n.id()];
                            seeds.iter().map(|s| s[i].clone()).collect()
                        }
                        MxOp::Zeros => (0..nfwd).map(|_| Mx::zeros(sp.clone())).collect(),
                        MxOp::Remap { arg, src } => tangent[&arg.id()]
                            .iter()
                            .map(|t| Mx::remap(t, src.clone(), sp.clone()))
                            .collect(),
                        MxOp::VertCat(parts) => (0..nfwd)
                            .map(|dir| {
                                let ts: Vec<Mx> = parts.iter().map(|p| tangent[&p.id()][dir].clone()).collect();
                                Mx::vertcat(&ts).project(sp)
                            })
                            .collect(),
                        MxOp::Add(a, b) => (0..nfwd)
                            .map(|dir| tangent[&a.id()][dir].add(&tangent[&b.id()][dir]).project(sp))
                            .collect(),
                        MxOp::Output { call, index } => call_tangent[&call_id(call)]
                            .iter()
                            .map(|r| r[*index].project(sp))
                            .collect(),
                    };
                    tangent.insert(n.id(), t);
                }
            }
        }
        Ok(tangent)
    }

    fn reverse_adjoints(&self, seeds: &[Vec<Mx>]) -> Result<Vec<Vec<Mx>>> {
        let nadj = seeds.len();
        let mut adjoint: HashMap<usize, Vec<Option<Mx>>> = HashMap::new();
        let mut call_adjoint: HashMap<usize, Vec<Vec<Option<Mx>>>> = HashMap::new();

        fn accumulate(slot: &mut Option<Mx>, v: Mx) {
            *slot = Some(match slot.take() {
                Some(acc) => acc.add(&v),
                None => v,
            });
        }

        for (dir, s) in seeds.iter().enumerate() {
            for (o, out) in self.outputs.iter().enumerate() {
                let entry = adjoint.entry(out.id()).or_insert_with(|| vec![None; nadj]);
                accumulate(&mut entry[dir], s[o].project(out.sparsity()));
            }
        }

        for step in self.tape.iter().rev() {
            match step {
                Step::Call(c) => {
                    let Some(out_bar) = call_adjoint.remove(&call_id(c)) else {
                        continue;
                    };
                    let d = c.f.derivative(0, nadj)?;
                    let n_in = c.f.n_in();
                    let n_out = c.f.n_out();
                    let mut args = c.args.clone();
                    for bar in &out_bar {
                        for (o, b) in bar.iter().enumerate() {
                            args.push(b.clone().unwrap_or_else(|| Mx::zeros(c.f.output_sparsity(o))));
                        }
                    }
                    let res = d.call_mx(&args)?;
                    for dir in 0..nadj {
                        for (i, a) in c.args.iter().enumerate() {
                            let sens = res[n_out + dir * n_in + i].project(a.sparsity());
                            let entry = adjoint.entry(a.id()).or_insert_with(|| vec![None; nadj]);
                            accumulate(&mut entry[dir], sens);
                        }
                    }
                }
                Step::Node(n) => {
                    if n.is_symbolic() {
                        continue;
                    }
                    let Some(bar) = adjoint.remove(&n.id()) else {
                        continue;
                    };
                    for (dir, b) in bar.into_iter().enumerate() {
                        let Some(b) = b else { continue };
                        propagate_adjoint(&n.0, b, dir, nadj, &mut adjoint, &mut call_adjoint);
                    }
                }
            }
        }

        Ok((0..nadj)
            .map(|dir| {
                self.inputs
                    .iter()
                    .map(|x| {
                        adjoint
                            .get(&x.id())
                            .and_then(|a| a[dir].clone())
                            .unwrap_or_else(|| Mx::zeros(x.sparsity().clone()))
                    })
                    .collect()
            })
            .collect())
    }
}

/// Push the adjoint `bar` of a non-symbol node onto its operands.
fn propagate_adjoint(
    node: &MxNode,
    bar: Mx,
    dir: usize,
    nadj: usize,
    adjoint: &mut HashMap<usize, Vec<Option<Mx>>>,
    call_adjoint: &mut HashMap<usize, Vec<Vec<Option<Mx>>>>,
) {
    let mut add_to = |x: &Mx, v: Mx| {
        let entry = adjoint.entry(x.id()).or_insert_with(|| vec![None; nadj]);
        entry[dir] = Some(match entry[dir].take() {
            Some(acc) => acc.add(&v),
            None => v,
        });
    };
    match &node.op {
        MxOp::Symbol(_) | MxOp::Zeros => {}
        MxOp::Remap { arg, src } => {
            let mut inv = vec![None; arg.nnz()];
            for (k, j) in src.iter().enumerate() {
                if let Some(j) = j {
                    inv[*j] = Some(k);
                }
            }
            add_to(arg, Mx::remap(&bar, inv, arg.sparsity().clone()));
        }
        MxOp::VertCat(parts) => {
            let mut offset = 0;
            for p in parts {
                let src = (offset..offset + p.nnz()).map(Some).collect();
                offset += p.nnz();
                add_to(p, Mx::remap(&bar, src, p.sparsity().clone()));
            }
        }
        MxOp::Add(a, b) => {
            add_to(a, bar.clone());
            add_to(b, bar);
        }
        MxOp::Output { call, index } => {
            let n_out = call.f.n_out();
            let entry = call_adjoint
                .entry(call_id(call))
                .or_insert_with(|| vec![vec![None; n_out]; nadj]);
            let slot = &mut entry[dir][*index];
            *slot = Some(match slot.take() {
                Some(acc) => acc.add(&bar),
                None => bar,
            });
        }
    }
}

impl FunctionNode for MxFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Mx
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
        let mut input_pos = HashMap::new();
        for (i, x) in self.inputs.iter().enumerate() {
            if !x.is_symbolic() || input_pos.insert(x.id(), i).is_some() {
                return Err(Error::NonSymbolicInput(i));
            }
        }
        let tape = sort(&self.outputs);
        for step in &tape {
            if let Step::Node(n) = step {
                if let MxOp::Symbol(name) = &n.0.op {
                    if !input_pos.contains_key(&n.id()) {
                        return Err(Error::FreeSymbol(name.clone()));
                    }
                }
            }
        }
        self.tape = tape;
        self.input_pos = input_pos;
        self.initialized = true;
        Ok(())
    }

    fn is_init(&self) -> bool {
        self.initialized
    }

    fn eval(&self, args: &[DMatrix]) -> Result<Vec<DMatrix>> {
        self.evaluate(args)
    }

    fn eval_sx(&self, args: &[SxMatrix]) -> Result<Vec<SxMatrix>> {
        self.evaluate(args)
    }

    fn sp_forward(&self, arg: &[Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()> {
        let out = self.evaluate(arg)?;
        for (r, o) in res.iter_mut().zip(out) {
            r.copy_from_slice(&o);
        }
        Ok(())
    }

    fn sp_reverse(&self, arg: &mut [Vec<Bvec>], res: &mut [Vec<Bvec>]) -> Result<()> {
        let mut work: HashMap<usize, Vec<Bvec>> = HashMap::new();
        let mut calls: HashMap<usize, Vec<Vec<Bvec>>> = HashMap::new();
        for (o, r) in self.outputs.iter().zip(res.iter_mut()) {
            let w = work.entry(o.id()).or_insert_with(|| vec![0; o.nnz()]);
            for (a, b) in w.iter_mut().zip(r.iter_mut()) {
                *a |= *b;
                *b = 0;
            }
        }
        fn or_into(work: &mut HashMap<usize, Vec<Bvec>>, x: &Mx, bits: impl Iterator<Item = (usize, Bvec)>) {
            let w = work.entry(x.id()).or_insert_with(|| vec![0; x.nnz()]);
            for (k, b) in bits {
                w[k] |= b;
            }
        }
        for step in self.tape.iter().rev() {
            match step {
                Step::Call(c) => {
                    let Some(mut out_bits) = calls.remove(&call_id(c)) else {
                        continue;
                    };
                    let mut arg_bits: Vec<Vec<Bvec>> = c.args.iter().map(|a| vec![0; a.nnz()]).collect();
                    c.f.sp_reverse(&mut arg_bits, &mut out_bits)?;
                    for (a, bits) in c.args.iter().zip(arg_bits) {
                        or_into(&mut work, a, bits.into_iter().enumerate());
                    }
                }
                Step::Node(n) => {
                    let Some(w) = work.remove(&n.id()) else {
                        continue;
                    };
                    match &n.0.op {
                        MxOp::Symbol(_) => {
                            let i = self.input_pos[&n.id()];
                            for (a, b) in arg[i].iter_mut().zip(&w) {
                                *a |= *b;
                            }
                        }
                        MxOp::Zeros => {}
                        MxOp::Remap { arg: x, src } => {
                            let bits = src.iter().zip(&w).filter_map(|(j, b)| j.map(|j| (j, *b)));
                            or_into(&mut work, x, bits);
                        }
                        MxOp::VertCat(parts) => {
                            let mut offset = 0;
                            for p in parts {
                                let bits = (0..p.nnz()).map(|k| (k, w[offset + k]));
                                or_into(&mut work, p, bits);
                                offset += p.nnz();
                            }
                        }
                        MxOp::Add(a, b) => {
                            or_into(&mut work, a, w.iter().copied().enumerate());
                            or_into(&mut work, b, w.iter().copied().enumerate());
                        }
                        MxOp::Output { call, index } => {
                            let f = &call.f;
                            let entry = calls.entry(call_id(call)).or_insert_with(|| {
                                (0..f.n_out()).map(|o| vec![0; f.output_sparsity(o).nnz()]).collect()
                            });
                            for (a, b) in entry[*index].iter_mut().zip(&w) {
                                *a |= *b;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn derivative(&self, nfwd: usize, nadj: usize) -> Result<Function> {
        let fwd_seeds: Vec<Vec<Mx>> = (0..nfwd)
            .map(|d| {
                self.inputs
                    .iter()
                    .enumerate()
                    .map(|(i, x)| Mx::sym(&format!("fwd{}_i{}", d, i), x.sparsity().clone()))
                    .collect()
            })
            .collect();
        let adj_seeds: Vec<Vec<Mx>> = (0..nadj)
            .map(|d| {
                self.outputs
                    .iter()
                    .enumerate()
                    .map(|(o, y)| Mx::sym(&format!("adj{}_o{}", d, o), y.sparsity().clone()))
                    .collect()
            })
            .collect();

        let mut inputs = self.inputs.clone();
        let mut outputs = self.outputs.clone();
        if nfwd > 0 {
            let tangent = self.forward_tangents(&fwd_seeds)?;
            for dir in 0..nfwd {
                outputs.extend(self.outputs.iter().map(|y| tangent[&y.id()][dir].project(y.sparsity())));
            }
        }
        if nadj > 0 {
            for sens in self.reverse_adjoints(&adj_seeds)? {
                outputs.extend(sens);
            }
        }
        inputs.extend(fwd_seeds.into_iter().flatten());
        inputs.extend(adj_seeds.into_iter().flatten());

        let name = format!("{}_d{}_{}", self.name, nfwd, nadj);
        Ok(Function::new(MxFunction::new(&name, inputs, outputs)))
    }

    fn deep_copy(&self, copies: &mut DeepCopyMap) -> Function {
        let mut nodes: HashMap<usize, Mx> = HashMap::new();
        let mut new_calls: HashMap<usize, Rc<CallNode>> = HashMap::new();
        for step in &sort(&self.outputs) {
            match step {
                Step::Call(c) => {
                    let call = CallNode {
                        f: c.f.deep_copy(copies),
                        args: c.args.iter().map(|a| nodes[&a.id()].clone()).collect(),
                    };
                    new_calls.insert(call_id(c), Rc::new(call));
                }
                Step::Node(n) => {
                    let sparsity = n.sparsity().clone();
                    let op = match &n.0.op {
                        MxOp::Symbol(_) | MxOp::Zeros => {
                            nodes.insert(n.id(), n.clone());
                            continue;
                        }
                        MxOp::Remap { arg, src } => MxOp::Remap {
                            arg: nodes[&arg.id()].clone(),
                            src: src.clone(),
                        },
                        MxOp::VertCat(parts) => MxOp::VertCat(parts.iter().map(|p| nodes[&p.id()].clone()).collect()),
                        MxOp::Add(a, b) => MxOp::Add(nodes[&a.id()].clone(), nodes[&b.id()].clone()),
                        MxOp::Output { call, index } => MxOp::Output {
                            call: new_calls[&call_id(call)].clone(),
                            index: *index,
                        },
                    };
                    nodes.insert(n.id(), Mx(Rc::new(MxNode { sparsity, op })));
                }
            }
        }
        let outputs = self.outputs.iter().map(|o| nodes[&o.id()].clone()).collect();
        Function::new(MxFunction::new(&self.name, self.inputs.clone(), outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::SxFunction;

    /// h(x, p) = [x0 * p, x1 + p]
    fn inner() -> Function {
        let x = SxMatrix::sym_column("x", 2);
        let p = SxMatrix::sym_column("p", 1);
        let out = SxMatrix::column(vec![x.at(0) * p.at(0), x.at(1) + p.at(0)]);
        Function::new(SxFunction::new("inner", vec![x, p], vec![out]))
    }

    /// F(a, b) = [h(a[0:2], b); a[2]] built as a vector graph
    fn outer() -> Function {
        let a = Mx::sym("a", Sparsity::column(3));
        let b = Mx::sym("b", Sparsity::column(1));
        let split = a.vertsplit(&[0, 2, 3]);
        let h = inner().call_mx(&[split[0].clone(), b.clone()]).unwrap();
        let out = Mx::vertcat(&[h[0].clone(), split[1].clone()]);
        Function::new(MxFunction::new("outer", vec![a, b], vec![out]))
    }

    #[test]
    fn numeric_call_through_graph() {
        let f = outer();
        let res = f.call(&[DMatrix::column(&[2.0, 3.0, 7.0]), DMatrix::column(&[4.0])]).unwrap();
        assert_eq!(res[0].data(), &[8.0, 7.0, 7.0]);
    }

    #[test]
    fn forward_and_adjoint_derivatives() {
        let f = outer();
        let d = f.derivative(1, 1).unwrap();
        assert_eq!(d.n_in(), 2 + 2 + 1);
        assert_eq!(d.n_out(), 1 + 1 + 2);
        let res = d
            .call(&[
                DMatrix::column(&[2.0, 3.0, 7.0]),
                DMatrix::column(&[4.0]),
                DMatrix::column(&[1.0, 0.0, 1.0]),
                DMatrix::column(&[1.0]),
                DMatrix::column(&[1.0, 1.0, 1.0]),
            ])
            .unwrap();
        // tangent: [p*da0 + a0*db, da1 + db, da2] = [4 + 2, 1, 1]
        assert_eq!(res[1].data(), &[6.0, 1.0, 1.0]);
        // adjoint wrt a: [p, 1, 1], wrt b: [a0 + 1]
        assert_eq!(res[2].data(), &[4.0, 1.0, 1.0]);
        assert_eq!(res[3].data(), &[3.0]);
    }

    #[test]
    fn expansion_preserves_values_and_structure() {
        let f = outer();
        let e = f.expand().unwrap();
        assert_eq!(e.kind(), FunctionKind::Sx);
        let args = [DMatrix::column(&[2.0, 3.0, 7.0]), DMatrix::column(&[4.0])];
        assert_eq!(e.call(&args).unwrap(), f.call(&args).unwrap());
        assert_eq!(e.jac_sparsity(0, 0).unwrap(), f.jac_sparsity(0, 0).unwrap());
    }

    #[test]
    fn reverse_propagation_through_call() {
        let f = outer();
        let mut arg = vec![vec![0; 3], vec![0; 1]];
        let mut res = vec![vec![0b001, 0b010, 0b100]];
        f.sp_reverse(&mut arg, &mut res).unwrap();
        assert_eq!(arg[0], vec![0b001, 0b010, 0b100]);
        assert_eq!(arg[1], vec![0b011]);
        assert_eq!(res[0], vec![0, 0, 0]);
    }

    #[test]
    fn deep_copy_copies_callees_once() {
        let f = outer();
        let mut copies = DeepCopyMap::new();
        let c1 = f.deep_copy(&mut copies);
        let c2 = f.deep_copy(&mut copies);
        assert!(c1.is_same(&c2));
        assert!(!c1.is_same(&f));
        let args = [DMatrix::column(&[1.0, 1.0, 1.0]), DMatrix::column(&[2.0])];
        assert_eq!(c1.call(&args).unwrap(), f.call(&args).unwrap());
    }
}
