//! Construction of the augmented forward and backward problems

use tracing::debug;

use crate::{
    error::{Error, Result},
    fx::{Function, FunctionKind, Mx, MxFunction},
    scheme::{DaeIn, DaeOut, RdaeIn, RdaeOut},
    sparsity::Sparsity,
};

use super::offset::{AugOffset, Dims};

/// The two callbacks of an augmented system and the block layout of its
/// stacked states.
#[derive(Debug, Clone)]
pub struct AugmentedProblem {
    pub forward: Function,
    /// Absent when neither the given backward problem nor adjoint
    /// directions produce backward states.
    pub backward: Option<Function>,
    pub offset: AugOffset,
}

/// Sequential reader over the per-direction blocks of a stacked vector.
pub(crate) struct BlockCursor<T> {
    name: &'static str,
    blocks: Vec<T>,
    next: usize,
}

impl<T: Clone> BlockCursor<T> {
    pub(crate) fn new(name: &'static str, blocks: Vec<T>) -> Self {
        Self { name, blocks, next: 0 }
    }

    pub(crate) fn next(&mut self) -> Result<T> {
        let block = self
            .blocks
            .get(self.next)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("more {} blocks requested than stacked", self.name)))?;
        self.next += 1;
        Ok(block)
    }

    /// Start over from the first block.
    pub(crate) fn rewind(&mut self) {
        self.next = 0;
    }

    /// Every block must have been read exactly once since the last rewind.
    pub(crate) fn finish(&self) -> Result<()> {
        if self.next != self.blocks.len() {
            return Err(Error::Internal(format!(
                "{} of {} {} blocks consumed",
                self.next,
                self.blocks.len(),
                self.name
            )));
        }
        Ok(())
    }
}

fn stacked(name: &'static str, n: usize, offsets: &[usize]) -> (Mx, BlockCursor<Mx>) {
    let whole = Mx::sym(name, Sparsity::column(n));
    let blocks = whole.vertsplit(offsets);
    (whole, BlockCursor::new(name, blocks))
}

/// A stack holding only the nominal block, in the pattern of the port.
fn nominal(name: &'static str, sparsity: Sparsity) -> (Mx, BlockCursor<Mx>) {
    let whole = Mx::sym(name, sparsity);
    let blocks = if whole.sparsity().nrow() > 0 { vec![whole.clone()] } else { Vec::new() };
    (whole, BlockCursor::new(name, blocks))
}

fn total(offsets: &[usize]) -> usize {
    offsets.last().copied().unwrap_or(0)
}

/// Right-hand sides collected for one problem.
#[derive(Default)]
struct Rhs {
    ode: Vec<Mx>,
    alg: Vec<Mx>,
    quad: Vec<Mx>,
}

impl Rhs {
    fn outputs(&self) -> Vec<Mx> {
        [&self.ode, &self.alg, &self.quad]
            .into_iter()
            .map(|parts| Mx::vertcat(parts).densify())
            .collect()
    }
}

/// Build the forward and backward problems of the system augmented with
/// `nfwd` forward and `nadj` adjoint directions. `sizes` holds the row counts
/// of the ports; every stacked block is a dense column of that many rows.
pub(crate) fn build(
    f: &Function,
    g: Option<&Function>,
    sizes: &Dims,
    nfwd: usize,
    nadj: usize,
    expand: bool,
) -> Result<AugmentedProblem> {
    debug!(nfwd, nadj, "building augmented problem");
    let offset = AugOffset::new(nfwd, nadj, sizes);

    // Without forward directions or a given backward problem, f is the
    // forward problem and its ports keep their patterns.
    let reuse_f = g.is_none() && nfwd == 0;

    let aug_t = Mx::sym("aug_t", f.input_sparsity(DaeIn::T.index()));
    let ((aug_x, mut x_it), (aug_z, mut z_it), (aug_p, mut p_it)) = if reuse_f {
        (
            nominal("aug_x", f.input_sparsity(DaeIn::X.index())),
            nominal("aug_z", f.input_sparsity(DaeIn::Z.index())),
            nominal("aug_p", f.input_sparsity(DaeIn::P.index())),
        )
    } else {
        (
            stacked("aug_x", total(&offset.x), &offset.x),
            stacked("aug_z", total(&offset.z), &offset.z),
            stacked("aug_p", total(&offset.p), &offset.p),
        )
    };
    let (aug_rx, mut rx_it) = stacked("aug_rx", total(&offset.rx), &offset.rx);
    let (aug_rz, mut rz_it) = stacked("aug_rz", total(&offset.rz), &offset.rz);
    let (aug_rp, mut rp_it) = stacked("aug_rp", total(&offset.rp), &offset.rp);
    let zero_t = Mx::zeros(aug_t.sparsity().clone());

    let mut fwd = Rhs::default();
    let mut bwd = Rhs::default();

    // Nominal and forward directions of f
    let d = f.derivative(nfwd, 0)?;
    let mut f_arg = Vec::with_capacity(d.n_in());
    for dir in 0..=nfwd {
        let mut tmp = vec![Mx::empty(); DaeIn::COUNT];
        tmp[DaeIn::T.index()] = if dir == 0 { aug_t.clone() } else { zero_t.clone() };
        if sizes.nx > 0 {
            tmp[DaeIn::X.index()] = x_it.next()?;
        }
        if sizes.nz > 0 {
            tmp[DaeIn::Z.index()] = z_it.next()?;
        }
        if sizes.np > 0 {
            tmp[DaeIn::P.index()] = p_it.next()?;
        }
        f_arg.extend(tmp);
    }
    let res = d.call_mx(&f_arg)?;
    check_len(&res, (1 + nfwd) * DaeOut::COUNT, "forward derivative of the DAE")?;
    for tmp in res.chunks(DaeOut::COUNT) {
        if sizes.nx > 0 {
            fwd.ode.push(tmp[DaeOut::Ode.index()].clone());
        }
        if sizes.nz > 0 {
            fwd.alg.push(tmp[DaeOut::Alg.index()].clone());
        }
        if sizes.nq > 0 {
            fwd.quad.push(tmp[DaeOut::Quad.index()].clone());
        }
    }

    // Nominal and forward directions of g
    let mut g_arg = Vec::new();
    if let Some(g) = g {
        let d = g.derivative(nfwd, 0)?;
        x_it.rewind();
        z_it.rewind();
        p_it.rewind();
        g_arg.reserve(d.n_in());
        for dir in 0..=nfwd {
            let mut tmp = vec![Mx::empty(); RdaeIn::COUNT];
            tmp[RdaeIn::T.index()] = if dir == 0 { aug_t.clone() } else { zero_t.clone() };
            if sizes.nx > 0 {
                tmp[RdaeIn::X.index()] = x_it.next()?;
            }
            if sizes.nz > 0 {
                tmp[RdaeIn::Z.index()] = z_it.next()?;
            }
            if sizes.np > 0 {
                tmp[RdaeIn::P.index()] = p_it.next()?;
            }
            if sizes.nrx > 0 {
                tmp[RdaeIn::Rx.index()] = rx_it.next()?;
            }
            if sizes.nrz > 0 {
                tmp[RdaeIn::Rz.index()] = rz_it.next()?;
            }
            if sizes.nrp > 0 {
                tmp[RdaeIn::Rp.index()] = rp_it.next()?;
            }
            g_arg.extend(tmp);
        }
        let res = d.call_mx(&g_arg)?;
        check_len(&res, (1 + nfwd) * RdaeOut::COUNT, "forward derivative of the RDAE")?;
        for tmp in res.chunks(RdaeOut::COUNT) {
            if sizes.nrx > 0 {
                bwd.ode.push(tmp[RdaeOut::Ode.index()].clone());
            }
            if sizes.nrz > 0 {
                bwd.alg.push(tmp[RdaeOut::Alg.index()].clone());
            }
            if sizes.nrq > 0 {
                bwd.quad.push(tmp[RdaeOut::Quad.index()].clone());
            }
        }
    }

    if nadj > 0 {
        // Adjoint directions of f: seeds enter through the backward stacks and
        // the sensitivities become backward right-hand sides.
        let d = f.derivative(0, nadj)?;
        f_arg.truncate(DaeIn::COUNT);
        for _ in 0..nadj {
            let mut tmp = vec![Mx::empty(); DaeOut::COUNT];
            if sizes.nx > 0 {
                tmp[DaeOut::Ode.index()] = rx_it.next()?;
            }
            if sizes.nz > 0 {
                tmp[DaeOut::Alg.index()] = rz_it.next()?;
            }
            if sizes.nq > 0 {
                tmp[DaeOut::Quad.index()] = rp_it.next()?;
            }
            f_arg.extend(tmp);
        }
        let res = d.call_mx(&f_arg)?;
        check_len(&res, DaeOut::COUNT + nadj * DaeIn::COUNT, "adjoint derivative of the DAE")?;
        let (mut ode_ind, mut alg_ind, mut quad_ind) = (bwd.ode.len(), bwd.alg.len(), bwd.quad.len());
        for tmp in res[DaeOut::COUNT..].chunks(DaeIn::COUNT) {
            if sizes.nx > 0 {
                bwd.ode.push(tmp[DaeIn::X.index()].clone());
            }
            if sizes.nz > 0 {
                bwd.alg.push(tmp[DaeIn::Z.index()].clone());
            }
            if sizes.np > 0 {
                bwd.quad.push(tmp[DaeIn::P.index()].clone());
            }
        }

        if let Some(g) = g {
            // Adjoint directions of g: seeds enter through the forward stacks.
            let d = g.derivative(0, nadj)?;
            g_arg.truncate(RdaeIn::COUNT);
            for _ in 0..nadj {
                let mut tmp = vec![Mx::empty(); RdaeOut::COUNT];
                if sizes.nrx > 0 {
                    tmp[RdaeOut::Ode.index()] = x_it.next()?;
                }
                if sizes.nrz > 0 {
                    tmp[RdaeOut::Alg.index()] = z_it.next()?;
                }
                if sizes.nrq > 0 {
                    tmp[RdaeOut::Quad.index()] = p_it.next()?;
                }
                g_arg.extend(tmp);
            }
            let res = d.call_mx(&g_arg)?;
            check_len(&res, RdaeOut::COUNT + nadj * RdaeIn::COUNT, "adjoint derivative of the RDAE")?;
            for tmp in res[RdaeOut::COUNT..].chunks(RdaeIn::COUNT) {
                if sizes.nx > 0 {
                    bwd.ode[ode_ind] = bwd.ode[ode_ind].add(&tmp[RdaeIn::X.index()]);
                    ode_ind += 1;
                }
                if sizes.nz > 0 {
                    bwd.alg[alg_ind] = bwd.alg[alg_ind].add(&tmp[RdaeIn::Z.index()]);
                    alg_ind += 1;
                }
                if sizes.np > 0 {
                    bwd.quad[quad_ind] = bwd.quad[quad_ind].add(&tmp[RdaeIn::P.index()]);
                    quad_ind += 1;
                }
            }
            if ode_ind != bwd.ode.len() || alg_ind != bwd.alg.len() || quad_ind != bwd.quad.len() {
                return Err(Error::Internal("adjoint contributions of the RDAE misaligned".to_string()));
            }

            // The forward pass must not see the backward solution: repeat the
            // call with the nominal backward arguments set to zero.
            for (slot, n) in [(RdaeIn::Rx, sizes.nrx), (RdaeIn::Rz, sizes.nrz), (RdaeIn::Rp, sizes.nrp)] {
                if n > 0 {
                    let sp = g_arg[slot.index()].sparsity().clone();
                    g_arg[slot.index()] = Mx::zeros(sp);
                }
            }
            let res = d.call_mx(&g_arg)?;
            for tmp in res[RdaeOut::COUNT..].chunks(RdaeIn::COUNT) {
                if sizes.nrx > 0 {
                    fwd.ode.push(tmp[RdaeIn::Rx.index()].clone());
                }
                if sizes.nrz > 0 {
                    fwd.alg.push(tmp[RdaeIn::Rz.index()].clone());
                }
                if sizes.nrp > 0 {
                    fwd.quad.push(tmp[RdaeIn::Rp.index()].clone());
                }
            }
        }
    }

    let expand = expand && f.kind() == FunctionKind::Sx && g.map_or(true, |g| g.kind() == FunctionKind::Sx);

    let forward = if reuse_f {
        f.clone()
    } else {
        let inputs = vec![aug_t.clone(), aug_x.clone(), aug_z.clone(), aug_p.clone()];
        finalize(MxFunction::new("augmented_dae", inputs, fwd.outputs()), expand)?
    };

    let backward = if bwd.ode.is_empty() {
        None
    } else {
        let inputs = vec![aug_t, aug_x, aug_z, aug_p, aug_rx, aug_rz, aug_rp];
        Some(finalize(MxFunction::new("augmented_rdae", inputs, bwd.outputs()), expand)?)
    };

    for cursor in [&x_it, &z_it, &p_it, &rx_it, &rz_it, &rp_it] {
        cursor.finish()?;
    }

    Ok(AugmentedProblem {
        forward,
        backward,
        offset,
    })
}

fn finalize(f: MxFunction, expand: bool) -> Result<Function> {
    let f = Function::new(f);
    f.init()?;
    if expand {
        f.expand()
    } else {
        Ok(f)
    }
}

fn check_len(res: &[Mx], expected: usize, what: &str) -> Result<()> {
    if res.len() != expected {
        return Err(Error::Internal(format!(
            "{} returned {} results, expected {}",
            what,
            res.len(),
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_detects_over_and_under_consumption() {
        let mut c = BlockCursor::new("x", vec![1, 2]);
        assert_eq!(c.next().unwrap(), 1);
        assert!(c.finish().is_err());
        assert_eq!(c.next().unwrap(), 2);
        assert!(c.finish().is_ok());
        assert!(matches!(c.next(), Err(Error::Internal(_))));
        c.rewind();
        assert_eq!(c.next().unwrap(), 1);
    }
}
