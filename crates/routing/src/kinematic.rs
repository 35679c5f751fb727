//! Kinematic-wave channel routing
//!
//! One routing substep of duration `dt` advances every reach by solving,
//! once its upstream inflow is final, the implicit scalar equation
//!
//! ```text
//! f(Q) = a * Q^beta + Q - C = 0
//! a    = alpha * L / dt
//! C    = a * Q_old^beta + q_lat * L + sum(Q_new of upstream reaches)
//! ```
//!
//! with Newton's method. Batches of the [`RoutingSchedule`] are swept in
//! increasing order; pixels of one batch are independent and solved in
//! parallel, and the write-back of a batch is the barrier before the next.

use crate::hydraulics::{storage_with, ReachParameters};
use crate::network::FlowNetwork;
use crate::order::{plan_routing_order, RoutingSchedule};
use rivroute_core::error::check_len;
use rivroute_core::{Error, Result, Stage};
use rivroute_parallel::{BatchExecutor, ParallelStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Floor that keeps every Newton iterate strictly positive
pub const MIN_DISCHARGE: f64 = 1e-12;

/// Solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Routing substep [s]. Default: 900
    pub dt: f64,
    /// Worker threads; 0 = all cores. Default: 0
    pub workers: usize,
    /// Newton iteration budget per pixel. Default: 30
    pub max_iterations: usize,
    /// Relative step size at which Newton stops. Default: 1e-12
    pub tolerance: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            dt: 900.0,
            workers: 0,
            max_iterations: 30,
            tolerance: 1e-12,
        }
    }
}

/// Which line of the channel a sweep advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    MainChannel,
    Floodplain,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SweepReport {
    /// Pixels routed
    pub pixels: usize,
    /// Pixels whose Newton solve ran out of iterations
    pub unconverged: usize,
    /// Largest `|f(Q)|` left at the end of a solve [m3/s]
    pub max_residual: f64,
}

impl SweepReport {
    /// Fold another sweep into this one
    pub fn merge(&mut self, other: &SweepReport) {
        self.pixels += other.pixels;
        self.unconverged += other.unconverged;
        self.max_residual = self.max_residual.max(other.max_residual);
    }
}

/// Per-line coefficients, fixed at construction
#[derive(Debug, Clone)]
struct LineCoefficients {
    alpha: Vec<f64>,
    /// alpha * L / dt
    a_dx_div_dt: Vec<f64>,
    /// beta * alpha * L / dt
    b_a_dx_div_dt: Vec<f64>,
}

impl LineCoefficients {
    fn new(alpha: Vec<f64>, beta: f64, length: &[f64], dt: f64) -> Self {
        let a_dx_div_dt: Vec<f64> = alpha
            .iter()
            .zip(length)
            .map(|(&a, &l)| a * l / dt)
            .collect();
        let b_a_dx_div_dt = a_dx_div_dt.iter().map(|&a| beta * a).collect();
        Self {
            alpha,
            a_dx_div_dt,
            b_a_dx_div_dt,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PixelSolve {
    discharge: f64,
    converged: bool,
    residual: f64,
}

/// Kinematic-wave solver over a fixed network.
///
/// Holds everything that is time-invariant: the network, its routing
/// schedule, reach coefficients for the main channel and optionally a
/// floodplain line, and the worker pool. Only discharge changes between
/// calls, and the caller owns it.
#[derive(Debug)]
pub struct KinematicWave {
    network: FlowNetwork,
    schedule: RoutingSchedule,
    reach: ReachParameters,
    main: LineCoefficients,
    floodplain: Option<LineCoefficients>,
    params: SolverParams,
    executor: BatchExecutor,
}

impl KinematicWave {
    /// Build a solver.
    ///
    /// Passing `alpha_floodplain` enables the floodplain line used by split
    /// routing. Everything is validated here so that [`route`](Self::route)
    /// can only fail on caller array lengths.
    pub fn new(
        network: FlowNetwork,
        reach: ReachParameters,
        alpha_floodplain: Option<Vec<f64>>,
        params: SolverParams,
    ) -> Result<Self> {
        let stage = Stage::SolverConstruction;
        check_len(stage, "alpha", network.len(), reach.len())?;
        if !(params.dt.is_finite() && params.dt > 0.0) {
            return Err(invalid_param("dt", params.dt.to_string()));
        }
        if params.max_iterations == 0 {
            return Err(invalid_param("max_iterations", "0".into()));
        }
        if !(params.tolerance.is_finite() && params.tolerance > 0.0) {
            return Err(invalid_param("tolerance", params.tolerance.to_string()));
        }

        let schedule = plan_routing_order(&network)?;
        let beta = reach.beta();
        let main = LineCoefficients::new(reach.alpha().to_vec(), beta, reach.reach_length(), params.dt);
        let floodplain = match alpha_floodplain {
            Some(alpha) => {
                check_len(stage, "floodplain alpha", network.len(), alpha.len())?;
                crate::hydraulics::require_positive("floodplain alpha", &alpha)?;
                Some(LineCoefficients::new(alpha, beta, reach.reach_length(), params.dt))
            }
            None => None,
        };

        let executor = BatchExecutor::with_workers(params.workers)
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        debug!(
            pixels = network.len(),
            batches = schedule.num_batches(),
            workers = executor.workers(),
            split = floodplain.is_some(),
            "kinematic wave solver ready"
        );

        Ok(Self {
            network,
            schedule,
            reach,
            main,
            floodplain,
            params,
            executor,
        })
    }

    /// Advance `discharge` by one substep in place.
    ///
    /// `sideflow` is lateral inflow per unit channel length [m3/s/m]. Both
    /// slices must hold one value per pixel.
    pub fn route(&self, discharge: &mut [f64], sideflow: &[f64], section: Section) -> Result<SweepReport> {
        let n = self.network.len();
        check_len(Stage::Routing, "discharge", n, discharge.len())?;
        check_len(Stage::Routing, "sideflow", n, sideflow.len())?;
        let line = self.line(section)?;

        let network = &self.network;
        let length = self.reach.reach_length();
        let beta = self.reach.beta();
        let max_iterations = self.params.max_iterations;
        let tolerance = self.params.tolerance;

        let mut report = SweepReport {
            pixels: n,
            ..SweepReport::default()
        };

        for batch in self.schedule.batches() {
            let current: &[f64] = discharge;
            let solved = self.executor.map_batch(batch, |&p| {
                let inflow: f64 = network.upstream(p).map(|u| current[u]).sum();
                let a = line.a_dx_div_dt[p];
                let constant = a * current[p].max(0.0).powf(beta) + sideflow[p] * length[p] + inflow;
                solve_pixel(
                    constant,
                    a,
                    line.b_a_dx_div_dt[p],
                    beta,
                    current[p],
                    max_iterations,
                    tolerance,
                )
            });

            for (&p, outcome) in batch.iter().zip(solved) {
                discharge[p] = outcome.discharge;
                if !outcome.converged {
                    report.unconverged += 1;
                }
                report.max_residual = report.max_residual.max(outcome.residual);
            }
        }

        if report.unconverged > 0 {
            warn!(
                ?section,
                unconverged = report.unconverged,
                max_residual = report.max_residual,
                "newton solve did not converge for some pixels"
            );
        }
        Ok(report)
    }

    /// Storage of every reach of `section` at `discharge`
    pub fn storage(&self, discharge: &[f64], section: Section) -> Result<Vec<f64>> {
        check_len(Stage::Routing, "discharge", self.network.len(), discharge.len())?;
        let line = self.line(section)?;
        Ok(storage_with(
            &line.alpha,
            self.reach.beta(),
            self.reach.reach_length(),
            discharge,
        ))
    }

    /// Like [`storage`](Self::storage), writing into an existing buffer
    pub fn storage_into(&self, discharge: &[f64], section: Section, out: &mut [f64]) -> Result<()> {
        let n = self.network.len();
        check_len(Stage::Routing, "discharge", n, discharge.len())?;
        check_len(Stage::Routing, "storage", n, out.len())?;
        let line = self.line(section)?;
        let beta = self.reach.beta();
        for (((s, &a), &l), &q) in out
            .iter_mut()
            .zip(&line.alpha)
            .zip(self.reach.reach_length())
            .zip(discharge)
        {
            *s = a * l * q.max(0.0).powf(beta);
        }
        Ok(())
    }

    /// Alpha of a section
    pub fn alpha(&self, section: Section) -> Result<&[f64]> {
        Ok(&self.line(section)?.alpha)
    }

    pub fn network(&self) -> &FlowNetwork {
        &self.network
    }

    pub fn schedule(&self) -> &RoutingSchedule {
        &self.schedule
    }

    pub fn reach(&self) -> &ReachParameters {
        &self.reach
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Routing substep [s]
    pub fn dt(&self) -> f64 {
        self.params.dt
    }

    /// Whether the solver carries a floodplain line
    pub fn has_floodplain(&self) -> bool {
        self.floodplain.is_some()
    }

    /// Number of pixels
    pub fn len(&self) -> usize {
        self.network.len()
    }

    pub fn is_empty(&self) -> bool {
        self.network.is_empty()
    }

    fn line(&self, section: Section) -> Result<&LineCoefficients> {
        match section {
            Section::MainChannel => Ok(&self.main),
            Section::Floodplain => self.floodplain.as_ref().ok_or(Error::MissingFloodplain {
                stage: Stage::Routing,
            }),
        }
    }
}

fn invalid_param(name: &'static str, value: String) -> Error {
    Error::InvalidParameter {
        stage: Stage::SolverConstruction,
        name,
        value,
        reason: "must be finite and strictly positive".into(),
    }
}

/// Newton solve of `a * Q^beta + Q - C = 0` for one pixel.
///
/// Warm-started from the current discharge. `f` is increasing and concave
/// in `Q`, so after at most one step the iterates approach the root from
/// below; an iterate that would leave the positive axis is clipped to
/// [`MIN_DISCHARGE`].
fn solve_pixel(
    constant: f64,
    a: f64,
    b_a: f64,
    beta: f64,
    warm: f64,
    max_iterations: usize,
    tolerance: f64,
) -> PixelSolve {
    if constant <= 0.0 {
        return PixelSolve {
            discharge: MIN_DISCHARGE,
            converged: true,
            residual: 0.0,
        };
    }

    let mut q = if warm > MIN_DISCHARGE {
        warm
    } else {
        (constant / (1.0 + a)).max(MIN_DISCHARGE)
    };

    let mut converged = false;
    for _ in 0..max_iterations {
        let q_beta = q.powf(beta);
        let f = a * q_beta + q - constant;
        let df = b_a * q_beta / q + 1.0;
        let mut next = q - f / df;
        if next <= 0.0 {
            next = MIN_DISCHARGE;
        }
        let step = (next - q).abs();
        q = next;
        if step <= tolerance * q {
            converged = true;
            break;
        }
    }

    PixelSolve {
        discharge: q,
        converged,
        residual: (a * q.powf(beta) + q - constant).abs(),
    }
}
