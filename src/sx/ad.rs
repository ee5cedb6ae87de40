//! Symbolic forward and reverse differentiation of scalar graphs

use std::collections::{HashMap, HashSet};

use super::{BinaryOp, Sx, SxNode, UnaryOp};

/// Every node reachable from `outputs`, operands before the nodes using them.
pub fn sort(outputs: &[Sx]) -> Vec<Sx> {
    let mut order = Vec::new();
    let mut done: HashSet<usize> = HashSet::new();
    let mut stack: Vec<(Sx, bool)> = outputs.iter().rev().map(|o| (o.clone(), false)).collect();
    while let Some((node, expanded)) = stack.pop() {
        if done.contains(&node.id()) {
            continue;
        }
        if expanded {
            done.insert(node.id());
            order.push(node);
        } else {
            stack.push((node.clone(), true));
            for dep in node.deps().into_iter().rev() {
                if !done.contains(&dep.id()) {
                    stack.push((dep.clone(), false));
                }
            }
        }
    }
    order
}

/// Local partial derivatives of a node with respect to each of its operands.
fn partials(node: &Sx) -> Vec<Sx> {
    match &*node.0 {
        SxNode::Constant(_) | SxNode::Symbol(_) => Vec::new(),
        SxNode::Unary(op, a) => vec![match op {
            UnaryOp::Neg => Sx::constant(-1.0),
            UnaryOp::Sin => a.cos(),
            UnaryOp::Cos => -a.sin(),
            UnaryOp::Exp => node.clone(),
            UnaryOp::Log => 1.0 / a,
            UnaryOp::Sqrt => 0.5 / node,
            UnaryOp::Tanh => 1.0 - node.sq(),
            UnaryOp::Sq => 2.0 * a,
        }],
        SxNode::Binary(op, a, b) => match op {
            BinaryOp::Add => vec![Sx::one(), Sx::one()],
            BinaryOp::Sub => vec![Sx::one(), Sx::constant(-1.0)],
            BinaryOp::Mul => vec![b.clone(), a.clone()],
            BinaryOp::Div => vec![1.0 / b, -(node / b)],
        },
    }
}

/// Directional derivative of `outputs` along `seeds` (one seed per input
/// symbol). Nodes not depending on any seeded input get a zero tangent.
pub fn forward(outputs: &[Sx], inputs: &[Sx], seeds: &[Sx]) -> Vec<Sx> {
    assert_eq!(inputs.len(), seeds.len(), "one forward seed per input required");
    let mut tangent: HashMap<usize, Sx> = inputs
        .iter()
        .zip(seeds)
        .map(|(i, s)| (i.id(), s.clone()))
        .collect();
    for node in sort(outputs) {
        if tangent.contains_key(&node.id()) {
            continue;
        }
        let deps = node.deps();
        let t = if deps.is_empty() {
            Sx::zero()
        } else {
            deps.iter()
                .zip(partials(&node))
                .fold(Sx::zero(), |acc, (d, p)| {
                    let dt = tangent.get(&d.id()).cloned().unwrap_or_else(Sx::zero);
                    acc + p * dt
                })
        };
        tangent.insert(node.id(), t);
    }
    outputs
        .iter()
        .map(|o| tangent.get(&o.id()).cloned().unwrap_or_else(Sx::zero))
        .collect()
}

/// Adjoint of `outputs` weighted by `seeds` (one seed per output), returned
/// per input symbol.
pub fn reverse(outputs: &[Sx], inputs: &[Sx], seeds: &[Sx]) -> Vec<Sx> {
    assert_eq!(outputs.len(), seeds.len(), "one adjoint seed per output required");
    let mut adjoint: HashMap<usize, Sx> = HashMap::new();
    for (o, s) in outputs.iter().zip(seeds) {
        let acc = adjoint.remove(&o.id()).unwrap_or_else(Sx::zero);
        adjoint.insert(o.id(), acc + s);
    }
    let input_ids: HashSet<usize> = inputs.iter().map(Sx::id).collect();
    for node in sort(outputs).into_iter().rev() {
        // Inputs keep their accumulated adjoint and are never propagated through.
        if input_ids.contains(&node.id()) {
            continue;
        }
        let Some(bar) = adjoint.get(&node.id()).cloned() else {
            continue;
        };
        if bar.is_zero() {
            continue;
        }
        for (d, p) in node.deps().into_iter().zip(partials(&node)) {
            let acc = adjoint.remove(&d.id()).unwrap_or_else(Sx::zero);
            adjoint.insert(d.id(), acc + &bar * p);
        }
    }
    inputs
        .iter()
        .map(|i| adjoint.get(&i.id()).cloned().unwrap_or_else(Sx::zero))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(e: &Sx, vars: &[(&Sx, f64)]) -> f64 {
        match &*e.0 {
            SxNode::Constant(v) => *v,
            SxNode::Symbol(_) => vars.iter().find(|(s, _)| s.is_same(e)).map(|(_, v)| *v).unwrap(),
            SxNode::Unary(op, a) => op.apply(eval(a, vars)),
            SxNode::Binary(op, a, b) => op.apply(eval(a, vars), eval(b, vars)),
        }
    }

    #[test]
    fn forward_matches_analytic_derivative() {
        let x = Sx::sym("x");
        let p = Sx::sym("p");
        // f = -p*x + sin(x)
        let f = -(&p * &x) + x.sin();
        let dx = Sx::sym("dx");
        let dp = Sx::sym("dp");
        let df = forward(&[f], &[x.clone(), p.clone()], &[dx.clone(), dp.clone()]);
        let vars = [(&x, 0.3), (&p, 2.0), (&dx, 1.0), (&dp, 0.0)];
        assert!((eval(&df[0], &vars) - (-2.0 + 0.3f64.cos())).abs() < 1e-14);
        let vars = [(&x, 0.3), (&p, 2.0), (&dx, 0.0), (&dp, 1.0)];
        assert!((eval(&df[0], &vars) + 0.3).abs() < 1e-14);
    }

    #[test]
    fn reverse_is_transpose_of_forward() {
        let x = Sx::sym("x");
        let y = Sx::sym("y");
        let f1 = &x * &y;
        let f2 = x.exp() / &y;
        let l1 = Sx::sym("l1");
        let l2 = Sx::sym("l2");
        let adj = reverse(&[f1, f2], &[x.clone(), y.clone()], &[l1.clone(), l2.clone()]);
        let vars = [(&x, 0.5), (&y, 2.0), (&l1, 1.0), (&l2, 3.0)];
        let ex = 0.5f64.exp();
        assert!((eval(&adj[0], &vars) - (2.0 + 3.0 * ex / 2.0)).abs() < 1e-12);
        assert!((eval(&adj[1], &vars) - (0.5 - 3.0 * ex / 4.0)).abs() < 1e-12);
    }

    #[test]
    fn independent_outputs_get_structural_zero() {
        let x = Sx::sym("x");
        let p = Sx::sym("p");
        let f = p.sq();
        let df = forward(&[f], &[x.clone()], &[Sx::one()]);
        assert!(df[0].is_zero());
    }
}
