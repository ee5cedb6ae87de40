//! Classic explicit Runge-Kutta 4 (RK4) step for states with quadratures.

use crate::{Float, error::Result};

/// Right-hand side with the algebraic states already eliminated.
pub(crate) trait Dynamics {
    /// Fill the state derivative `dy` and the quadrature integrand `dq` at
    /// `(t, y)`.
    fn rhs(&mut self, t: Float, y: &[Float], dy: &mut [Float], dq: &mut [Float]) -> Result<()>;
}

/// Stage workspace, reused across steps.
pub(crate) struct Rk4 {
    k2: Vec<Float>,
    k3: Vec<Float>,
    k4: Vec<Float>,
    q2: Vec<Float>,
    q3: Vec<Float>,
    q4: Vec<Float>,
    yt: Vec<Float>,
}

impl Rk4 {
    pub(crate) fn new(ny: usize, nq: usize) -> Self {
        Self {
            k2: vec![0.0; ny],
            k3: vec![0.0; ny],
            k4: vec![0.0; ny],
            q2: vec![0.0; nq],
            q3: vec![0.0; nq],
            q4: vec![0.0; nq],
            yt: vec![0.0; ny],
        }
    }

    /// Advance `y` and the quadratures `q` by one step of length `h > 0`.
    /// Time runs forward for `dir = 1` and backward for `dir = -1`; the
    /// states always follow `dy/ds = rhs` in the integration variable `s`.
    /// `k1`, `q1` are the right-hand side at the start of the step.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn step<D: Dynamics>(
        &mut self,
        d: &mut D,
        t: Float,
        h: Float,
        dir: Float,
        y: &mut [Float],
        q: &mut [Float],
        k1: &[Float],
        q1: &[Float],
    ) -> Result<()> {
        let n = y.len();

        // Stage computations
        for i in 0..n {
            self.yt[i] = y[i] + h * A21 * k1[i];
        }
        d.rhs(t + dir * C2 * h, &self.yt, &mut self.k2, &mut self.q2)?;

        for i in 0..n {
            self.yt[i] = y[i] + h * A32 * self.k2[i];
        }
        d.rhs(t + dir * C3 * h, &self.yt, &mut self.k3, &mut self.q3)?;

        for i in 0..n {
            self.yt[i] = y[i] + h * A43 * self.k3[i];
        }
        d.rhs(t + dir * C4 * h, &self.yt, &mut self.k4, &mut self.q4)?;

        // Update state and quadratures
        for i in 0..n {
            y[i] += h * (B1 * k1[i] + B2 * self.k2[i] + B3 * self.k3[i] + B4 * self.k4[i]);
        }
        for i in 0..q.len() {
            q[i] += h * (B1 * q1[i] + B2 * self.q2[i] + B3 * self.q3[i] + B4 * self.q4[i]);
        }
        Ok(())
    }
}

// Classical RK4 coefficients
const C2: Float = 0.5;
const C3: Float = 0.5;
const C4: Float = 1.0;
const A21: Float = 0.5;
const A32: Float = 0.5;
const A43: Float = 1.0;
const B1: Float = 1.0 / 6.0;
const B2: Float = 1.0 / 3.0;
const B3: Float = 1.0 / 3.0;
const B4: Float = 1.0 / 6.0;

#[cfg(test)]
mod tests {
    use super::*;

    /// y' = y, q' = t
    struct Growth;

    impl Dynamics for Growth {
        fn rhs(&mut self, t: Float, y: &[Float], dy: &mut [Float], dq: &mut [Float]) -> Result<()> {
            dy[0] = y[0];
            dq[0] = t;
            Ok(())
        }
    }

    #[test]
    fn fourth_order_accuracy_on_exponential() {
        let mut rk = Rk4::new(1, 1);
        let (mut y, mut q) = (vec![1.0], vec![0.0]);
        let n = 10;
        let h = 1.0 / n as Float;
        for k in 0..n {
            let t = k as Float * h;
            let k1 = [y[0]];
            rk.step(&mut Growth, t, h, 1.0, &mut y, &mut q, &k1, &[t]).unwrap();
        }
        assert!((y[0] - 1.0f64.exp()).abs() < 1e-5);
        // quadrature of t is integrated exactly
        assert!((q[0] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn backward_direction_evaluates_earlier_times() {
        let mut rk = Rk4::new(1, 1);
        let (mut y, mut q) = (vec![0.0], vec![0.0]);
        // zero state derivative, integrand t over s in [0, 1] with t = 1 - s
        struct Clock;
        impl Dynamics for Clock {
            fn rhs(&mut self, t: Float, _y: &[Float], dy: &mut [Float], dq: &mut [Float]) -> Result<()> {
                dy[0] = 0.0;
                dq[0] = t;
                Ok(())
            }
        }
        rk.step(&mut Clock, 1.0, 1.0, -1.0, &mut y, &mut q, &[0.0], &[1.0]).unwrap();
        assert!((q[0] - 0.5).abs() < 1e-14);
    }
}
