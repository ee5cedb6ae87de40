//! Stored forward trajectory with cubic Hermite dense output

use crate::Float;

/// Accepted point of the forward integration.
#[derive(Clone, Debug)]
pub(crate) struct GridPoint {
    pub t: Float,
    pub x: Vec<Float>,
    pub dx: Vec<Float>,
    pub z: Vec<Float>,
}

/// Forward solution on the step grid, in increasing time.
#[derive(Clone, Debug, Default)]
pub(crate) struct Trajectory {
    points: Vec<GridPoint>,
}

impl Trajectory {
    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn push(&mut self, point: GridPoint) {
        self.points.push(point);
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Latest grid time strictly before `t`.
    pub fn grid_time_before(&self, t: Float, eps: Float) -> Option<Float> {
        self.points.iter().rev().map(|p| p.t).find(|&s| s < t - eps)
    }

    /// Index of the segment `[points[k], points[k + 1]]` containing `t`,
    /// clamped to the first or last segment.
    fn segment(&self, t: Float) -> usize {
        let n = self.points.len();
        match self.points.iter().position(|p| p.t > t) {
            Some(0) => 0,
            Some(k) => k - 1,
            None => n.saturating_sub(2),
        }
    }

    /// Differential states at `t`.
    pub fn state_at(&self, t: Float, x: &mut [Float]) {
        match self.points.len() {
            0 => {}
            1 => x.copy_from_slice(&self.points[0].x),
            _ => {
                let k = self.segment(t);
                let (a, b) = (&self.points[k], &self.points[k + 1]);
                CubicHermite::new(a.t, b.t - a.t, &a.x, &b.x, &a.dx, &b.dx).interpolate(t, x);
            }
        }
    }

    /// Algebraic states of the grid point nearest to `t`, used as the
    /// starting guess for the Newton iteration.
    pub fn algebraic_guess(&self, t: Float) -> Option<&[Float]> {
        self.points
            .iter()
            .min_by(|a, b| (a.t - t).abs().total_cmp(&(b.t - t).abs()))
            .map(|p| p.z.as_slice())
    }
}

struct CubicHermite<'a> {
    x0: Float,
    h: Float,
    y0: &'a [Float],
    y1: &'a [Float],
    dy0: &'a [Float],
    dy1: &'a [Float],
}

impl<'a> CubicHermite<'a> {
    fn new(x0: Float, h: Float, y0: &'a [Float], y1: &'a [Float], dy0: &'a [Float], dy1: &'a [Float]) -> Self {
        Self { x0, h, y0, y1, dy0, dy1 }
    }

    fn interpolate(&self, xi: Float, yi: &mut [Float]) {
        let t = (xi - self.x0) / self.h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        for i in 0..self.y0.len() {
            yi[i] = h00 * self.y0[i] + h10 * self.h * self.dy0[i] + h01 * self.y1[i] + h11 * self.h * self.dy1[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(t: Float) -> (Float, Float) {
        (t * t * t - t, 3.0 * t * t - 1.0)
    }

    fn sampled(times: &[Float]) -> Trajectory {
        let mut traj = Trajectory::default();
        for &t in times {
            let (x, dx) = cubic(t);
            traj.push(GridPoint {
                t,
                x: vec![x],
                dx: vec![dx],
                z: vec![t],
            });
        }
        traj
    }

    #[test]
    fn hermite_reproduces_cubics() {
        let traj = sampled(&[0.0, 0.5, 1.0]);
        let mut x = [0.0];
        for t in [0.1, 0.25, 0.5, 0.8, 1.0] {
            traj.state_at(t, &mut x);
            assert!((x[0] - cubic(t).0).abs() < 1e-12, "t = {}", t);
        }
    }

    #[test]
    fn grid_queries() {
        let traj = sampled(&[0.0, 0.5, 1.0]);
        assert_eq!(traj.grid_time_before(1.0, 1e-12), Some(0.5));
        assert_eq!(traj.grid_time_before(0.5, 1e-12), Some(0.0));
        assert_eq!(traj.grid_time_before(0.0, 1e-12), None);
        assert_eq!(traj.algebraic_guess(0.7), Some(&[0.5][..]));
    }
}
