//! Block boundaries of the stacked sensitivity directions

/// Problem dimensions, fixed at initialization. The integrator keeps one set
/// counting nonzeros (buffer lengths) and one counting rows (block sizes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dims {
    pub nx: usize,
    pub nz: usize,
    pub nq: usize,
    pub np: usize,
    pub nrx: usize,
    pub nrz: usize,
    pub nrq: usize,
    pub nrp: usize,
}

impl Dims {
    /// Whether a backward problem with states is present.
    pub fn has_backward(&self) -> bool {
        self.nrx > 0
    }
}

/// Cumulative offsets of the per-direction blocks in each augmented
/// category. Every sequence starts at 0; consecutive differences are the
/// block sizes, the last entry the stacked length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugOffset {
    pub x: Vec<usize>,
    pub z: Vec<usize>,
    pub q: Vec<usize>,
    pub p: Vec<usize>,
    pub rx: Vec<usize>,
    pub rz: Vec<usize>,
    pub rq: Vec<usize>,
    pub rp: Vec<usize>,
}

impl AugOffset {
    /// Offsets for the nominal problem, `nfwd` forward directions and
    /// `nadj` adjoint directions.
    ///
    /// `sizes` are the row counts of the ports. The nominal and forward
    /// directions contribute one block per nonzero size to their own category. An adjoint direction swaps roles:
    /// forward quantities become backward seeds (`nx` to `rx`, `nz` to `rz`,
    /// `np` to `rq`, `nq` to `rp`) and backward quantities become forward
    /// states (`nrx` to `x`, `nrz` to `z`, `nrp` to `q`, `nrq` to `p`).
    pub fn new(nfwd: usize, nadj: usize, sizes: &Dims) -> Self {
        let mut blocks: [Vec<usize>; 8] = Default::default();
        let [x, z, q, p, rx, rz, rq, rp] = &mut blocks;

        fn push(seq: &mut Vec<usize>, n: usize) {
            if n > 0 {
                seq.push(n);
            }
        }

        for _ in 0..1 + nfwd {
            push(x, sizes.nx);
            push(z, sizes.nz);
            push(q, sizes.nq);
            push(p, sizes.np);
            push(rx, sizes.nrx);
            push(rz, sizes.nrz);
            push(rq, sizes.nrq);
            push(rp, sizes.nrp);
        }
        for _ in 0..nadj {
            push(rx, sizes.nx);
            push(rz, sizes.nz);
            push(rq, sizes.np);
            push(rp, sizes.nq);
            push(x, sizes.nrx);
            push(z, sizes.nrz);
            push(q, sizes.nrp);
            push(p, sizes.nrq);
        }

        let [x, z, q, p, rx, rz, rq, rp] = blocks.map(cumulative);
        Self { x, z, q, p, rx, rz, rq, rp }
    }

    /// Dimensions of the augmented problem.
    pub fn dims(&self) -> Dims {
        Dims {
            nx: total(&self.x),
            nz: total(&self.z),
            nq: total(&self.q),
            np: total(&self.p),
            nrx: total(&self.rx),
            nrz: total(&self.rz),
            nrq: total(&self.rq),
            nrp: total(&self.rp),
        }
    }
}

/// Shorthand for [`AugOffset::new`].
pub fn offsets(nfwd: usize, nadj: usize, dims: &Dims) -> AugOffset {
    AugOffset::new(nfwd, nadj, dims)
}

fn cumulative(sizes: Vec<usize>) -> Vec<usize> {
    let mut acc = 0;
    std::iter::once(0)
        .chain(sizes.into_iter().map(|n| {
            acc += n;
            acc
        }))
        .collect()
}

fn total(seq: &[usize]) -> usize {
    seq.last().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dims {
        Dims {
            nx: 3,
            nz: 2,
            nq: 1,
            np: 4,
            nrx: 5,
            nrz: 0,
            nrq: 6,
            nrp: 7,
        }
    }

    fn all(o: &AugOffset) -> [&Vec<usize>; 8] {
        [&o.x, &o.z, &o.q, &o.p, &o.rx, &o.rz, &o.rq, &o.rp]
    }

    #[test]
    fn no_directions_gives_unaugmented_sizes() {
        let o = offsets(0, 0, &dims());
        assert_eq!(o.x, vec![0, 3]);
        assert_eq!(o.rz, vec![0]);
        assert_eq!(o.dims(), dims());
    }

    #[test]
    fn sequences_start_at_zero_and_never_decrease() {
        for (nfwd, nadj) in [(0, 0), (1, 0), (0, 2), (3, 2)] {
            let o = offsets(nfwd, nadj, &dims());
            for seq in all(&o) {
                assert_eq!(seq[0], 0);
                assert!(seq.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    #[test]
    fn adjoint_directions_cross_map_categories() {
        let d = dims();
        let o = offsets(2, 1, &d);
        // three nominal/forward blocks plus one adjoint block each
        assert_eq!(o.x.len(), 1 + 3 + 1);
        assert_eq!(o.dims().nx, 3 * d.nx + d.nrx);
        assert_eq!(o.dims().nrx, 3 * d.nrx + d.nx);
        assert_eq!(o.dims().nrq, 3 * d.nrq + d.np);
        assert_eq!(o.dims().nrp, 3 * d.nrp + d.nq);
        assert_eq!(o.dims().nq, 3 * d.nq + d.nrp);
        assert_eq!(o.dims().np, 3 * d.np + d.nrq);
        // nrz = 0, so z only receives the nz blocks
        assert_eq!(o.z, vec![0, 2, 4, 6]);
        assert_eq!(o.rz, vec![0, 2]);
    }

    #[test]
    fn forward_only_problem_has_no_backward_blocks() {
        let d = Dims {
            nx: 1,
            np: 1,
            ..Dims::default()
        };
        let o = offsets(1, 0, &d);
        assert_eq!(o.x, vec![0, 1, 2]);
        assert_eq!(o.p, vec![0, 1, 2]);
        assert_eq!(o.rx, vec![0]);
        assert!(!o.dims().has_backward());
    }
}
