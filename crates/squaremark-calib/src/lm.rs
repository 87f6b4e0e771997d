//! Levenberg–Marquardt via the `levenberg_marquardt` crate.
//!
//! Problems are written against the workspace `nalgebra`. The solver crate
//! is built on an older nalgebra release, so parameters, residuals and
//! Jacobians cross the boundary as column-major slices.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use lm_nalgebra::storage::Owned;
use lm_nalgebra::Dyn;
use nalgebra::{DMatrix, DVector};

/// A sum-of-squares objective `|r(x)|²`.
pub(crate) trait LeastSquares {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        numeric_jacobian(self, x)
    }
}

/// Finite-difference step for parameter `v`.
pub(crate) fn diff_step(v: f64) -> f64 {
    1e-6 * v.abs().max(1.0)
}

pub(crate) fn numeric_jacobian<P: LeastSquares + ?Sized>(
    problem: &P,
    x: &DVector<f64>,
) -> DMatrix<f64> {
    let m = problem.residuals(x).len();
    let mut jac = DMatrix::zeros(m, x.len());
    let mut xp = x.clone();
    for i in 0..x.len() {
        let h = diff_step(x[i]);
        xp[i] = x[i] + h;
        let rp = problem.residuals(&xp);
        xp[i] = x[i] - h;
        let rm = problem.residuals(&xp);
        xp[i] = x[i];
        jac.set_column(i, &((rp - rm) / (2.0 * h)));
    }
    jac
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LmSettings {
    /// Patience: at most `max_iterations * (params + 1)` evaluations.
    pub max_iterations: usize,
    /// Used as ftol, xtol and gtol.
    pub epsilon: f64,
}

#[derive(Clone, Debug)]
pub(crate) struct LmReport {
    pub x: DVector<f64>,
    pub evaluations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
}

struct LmWrapper<'a, P: ?Sized> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: LeastSquares + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &lm_nalgebra::DVector<f64>) {
        self.params = DVector::from_column_slice(x.as_slice());
    }

    fn params(&self) -> lm_nalgebra::DVector<f64> {
        lm_nalgebra::DVector::from_column_slice(self.params.as_slice())
    }

    fn residuals(&self) -> Option<lm_nalgebra::DVector<f64>> {
        let r = self.problem.residuals(&self.params);
        Some(lm_nalgebra::DVector::from_column_slice(r.as_slice()))
    }

    fn jacobian(&self) -> Option<lm_nalgebra::DMatrix<f64>> {
        let j = self.problem.jacobian(&self.params);
        Some(lm_nalgebra::DMatrix::from_column_slice(
            j.nrows(),
            j.ncols(),
            j.as_slice(),
        ))
    }
}

/// Minimize `|r(x)|²` starting at `x0`.
pub(crate) fn solve_least_squares<P: LeastSquares + ?Sized>(
    problem: &P,
    x0: DVector<f64>,
    settings: LmSettings,
) -> LmReport {
    let initial_cost = problem.residuals(&x0).norm_squared();
    let tol = settings.epsilon.max(0.0);
    let lm = LevenbergMarquardt::new()
        .with_ftol(tol)
        .with_xtol(tol)
        .with_gtol(tol)
        .with_patience(settings.max_iterations.max(1));

    let (wrapper, report) = lm.minimize(LmWrapper {
        problem,
        params: x0,
    });
    let final_cost = problem.residuals(&wrapper.params).norm_squared();
    log::trace!(
        "lm: {:?} after {} evaluations, cost {:.6e} -> {:.6e}",
        report.termination,
        report.number_of_evaluations,
        initial_cost,
        final_cost
    );

    LmReport {
        x: wrapper.params,
        evaluations: report.number_of_evaluations,
        initial_cost,
        final_cost,
        converged: report.termination.was_successful(),
    }
}
