//! Split routing: a main channel plus a virtual floodplain line
//!
//! Above a per-pixel threshold discharge `QLimit`, excess water is routed
//! through a second kinematic-wave line with a rougher alpha. The floodplain
//! line always runs; below the threshold it is primed to carry exactly
//! `QLimit` so its Newton solves stay well posed, and that primed flow is
//! subtracted again on recombination:
//!
//! ```text
//! Q    = max(Q_main + Q_floodplain - QLimit, 0)
//! A_fp = (S_floodplain - Chan2M3Start) / L
//! ```
//!
//! Whether a pixel is over the threshold is recomputed from storage every
//! substep. No mode is stored.

use crate::hydraulics::{require_positive, ReachParameters};
use crate::kinematic::{KinematicWave, Section, SweepReport};
use crate::state::{ChannelLine, RoutingState};
use rivroute_core::error::check_len;
use rivroute_core::{Error, Result, Stage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sideflow magnitudes below this [m3/s/m] all go to the main channel
pub const DEFAULT_SIDEFLOW_NOISE: f64 = 1e-10;

/// Split-routing configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// `QLimit = average discharge * q_split_mult`. Default: 2.0
    pub q_split_mult: f64,
    /// Floodplain Manning's n relative to the channel. Default: 3.0
    pub floodplain_roughness_factor: f64,
    /// Default: 1e-10 m3/s/m
    pub sideflow_noise_threshold: f64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            q_split_mult: 2.0,
            floodplain_roughness_factor: 3.0,
            sideflow_noise_threshold: DEFAULT_SIDEFLOW_NOISE,
        }
    }
}

impl SplitParams {
    /// Floodplain alpha for a channel with the given reach parameters
    pub fn floodplain_alpha(&self, reach: &ReachParameters) -> Result<Vec<f64>> {
        reach.scaled_alpha(self.floodplain_roughness_factor)
    }
}

/// Per-pixel thresholds of split routing, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitThresholds {
    /// Discharge above which the floodplain takes part [m3/s]
    pub q_limit: Vec<f64>,
    /// Main-channel storage at `q_limit` [m3]
    pub m3_limit: Vec<f64>,
    /// Local priming inflow of the floodplain line [m3/s]
    pub chan2_q_start: Vec<f64>,
    /// Floodplain storage at `q_limit` [m3]
    pub chan2_m3_start: Vec<f64>,
}

impl SplitThresholds {
    /// Derive the thresholds from long-term average discharge.
    ///
    /// `QLimit` must come out strictly positive everywhere; a zero or
    /// negative value is reported with its pixel rather than guarded at
    /// run time.
    pub fn new(solver: &KinematicWave, avg_discharge: &[f64], q_split_mult: f64) -> Result<Self> {
        let stage = Stage::SolverConstruction;
        check_len(stage, "average discharge", solver.len(), avg_discharge.len())?;
        if !(q_split_mult.is_finite() && q_split_mult > 0.0) {
            return Err(Error::InvalidParameter {
                stage,
                name: "q_split_mult",
                value: q_split_mult.to_string(),
                reason: "must be finite and strictly positive".into(),
            });
        }
        if !solver.has_floodplain() {
            return Err(Error::MissingFloodplain { stage });
        }

        let q_limit: Vec<f64> = avg_discharge.iter().map(|&q| q * q_split_mult).collect();
        require_positive("QLimit", &q_limit)?;

        let m3_limit = solver.storage(&q_limit, Section::MainChannel)?;
        let chan2_m3_start = solver.storage(&q_limit, Section::Floodplain)?;
        let chan2_q_start = q_limit
            .iter()
            .zip(solver.network().sum_upstream(&q_limit))
            .map(|(&q, upstream)| q - upstream)
            .collect();

        Ok(Self {
            q_limit,
            m3_limit,
            chan2_q_start,
            chan2_m3_start,
        })
    }
}

/// Flow regime of one pixel at the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Main channel carries all flow; the floodplain line is primed but inert
    BelowThreshold,
    /// Sideflow is shared and both lines are active
    OverThreshold,
}

impl Regime {
    /// Over the threshold iff main-channel storage exceeds `M3Limit`
    fn of(main_storage: f64, m3_limit: f64) -> Self {
        if main_storage > m3_limit {
            Regime::OverThreshold
        } else {
            Regime::BelowThreshold
        }
    }
}

/// Coordinates the two lines of split routing around one solver.
#[derive(Debug, Clone)]
pub struct SplitRouting {
    thresholds: SplitThresholds,
    noise_threshold: f64,
}

impl SplitRouting {
    /// `solver` must have been built with floodplain coefficients.
    pub fn new(solver: &KinematicWave, avg_discharge: &[f64], params: &SplitParams) -> Result<Self> {
        let noise = params.sideflow_noise_threshold;
        if !(noise.is_finite() && noise >= 0.0) {
            return Err(Error::InvalidParameter {
                stage: Stage::SolverConstruction,
                name: "sideflow_noise_threshold",
                value: noise.to_string(),
                reason: "must be finite and non-negative".into(),
            });
        }
        let thresholds = SplitThresholds::new(solver, avg_discharge, params.q_split_mult)?;
        debug!(pixels = thresholds.q_limit.len(), "split routing thresholds ready");
        Ok(Self {
            thresholds,
            noise_threshold: noise,
        })
    }

    pub fn thresholds(&self) -> &SplitThresholds {
        &self.thresholds
    }

    /// Two-line state with the main channel at `discharge` and the
    /// floodplain line primed at `QLimit`.
    pub fn initial_state(&self, solver: &KinematicWave, discharge: Vec<f64>) -> Result<RoutingState> {
        let main = ChannelLine::new(solver, Section::MainChannel, discharge)?;
        let floodplain = ChannelLine {
            discharge: self.thresholds.q_limit.clone(),
            storage: self.thresholds.chan2_m3_start.clone(),
        };
        Ok(RoutingState {
            main,
            floodplain: Some(floodplain),
        })
    }

    /// Regime of every pixel: over the threshold iff main-channel storage
    /// exceeds `M3Limit`.
    pub fn regime(&self, state: &RoutingState) -> Vec<Regime> {
        state
            .main
            .storage
            .iter()
            .zip(&self.thresholds.m3_limit)
            .map(|(&s, &limit)| Regime::of(s, limit))
            .collect()
    }

    /// Split total sideflow [m3/s/m] into the two lines.
    ///
    /// Over the threshold the main line gets `S_main / (S_main + S_fp)` of
    /// it and the floodplain the rest; below it, or when the sideflow is
    /// negligible, the main line gets everything. The floodplain share
    /// always carries the priming inflow `Chan2QStart / L` on top.
    pub fn apportion(
        &self,
        solver: &KinematicWave,
        state: &RoutingState,
        sideflow: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let n = solver.len();
        check_len(Stage::Routing, "sideflow", n, sideflow.len())?;
        let floodplain = floodplain_line(state)?;
        let length = solver.reach().reach_length();
        let t = &self.thresholds;

        let mut main_share = Vec::with_capacity(n);
        let mut floodplain_share = Vec::with_capacity(n);
        for p in 0..n {
            let total = sideflow[p];
            let s_main = state.main.storage[p];
            let s_fp = floodplain.storage[p];
            let below = Regime::of(s_main, t.m3_limit[p]) == Regime::BelowThreshold;
            let main = if total.abs() < self.noise_threshold || below {
                total
            } else {
                total * s_main / (s_main + s_fp)
            };
            main_share.push(main);
            floodplain_share.push(total - main + t.chan2_q_start[p] / length[p]);
        }
        Ok((main_share, floodplain_share))
    }

    /// Advance both lines by one substep.
    pub fn route(
        &self,
        solver: &KinematicWave,
        state: &mut RoutingState,
        sideflow: &[f64],
    ) -> Result<SweepReport> {
        let (main_sideflow, floodplain_sideflow) = self.apportion(solver, state, sideflow)?;

        let mut report = state
            .main
            .advance(solver, Section::MainChannel, &main_sideflow)?;
        let floodplain = state.floodplain.as_mut().ok_or(Error::MissingFloodplain {
            stage: Stage::Routing,
        })?;
        let fp_report = floodplain.advance(solver, Section::Floodplain, &floodplain_sideflow)?;
        report.merge(&fp_report);
        Ok(report)
    }

    /// Physical discharge: `max(Q_main + Q_fp - QLimit, 0)`
    pub fn recombined_discharge(&self, state: &RoutingState) -> Result<Vec<f64>> {
        let floodplain = floodplain_line(state)?;
        Ok(state
            .main
            .discharge
            .iter()
            .zip(&floodplain.discharge)
            .zip(&self.thresholds.q_limit)
            .map(|((&qm, &qf), &limit)| (qm + qf - limit).max(0.0))
            .collect())
    }

    /// Floodplain cross-section area [m2], zero while below the priming
    /// storage
    pub fn floodplain_area(&self, solver: &KinematicWave, state: &RoutingState) -> Result<Vec<f64>> {
        let floodplain = floodplain_line(state)?;
        Ok(floodplain
            .storage
            .iter()
            .zip(&self.thresholds.chan2_m3_start)
            .zip(solver.reach().reach_length())
            .map(|((&s, &start), &l)| ((s - start) / l).max(0.0))
            .collect())
    }

    /// Physical water volume per pixel: `S_main + S_fp - Chan2M3Start`
    pub fn total_storage(&self, state: &RoutingState) -> Result<Vec<f64>> {
        let floodplain = floodplain_line(state)?;
        Ok(state
            .main
            .storage
            .iter()
            .zip(&floodplain.storage)
            .zip(&self.thresholds.chan2_m3_start)
            .map(|((&sm, &sf), &start)| sm + sf - start)
            .collect())
    }
}

fn floodplain_line(state: &RoutingState) -> Result<&ChannelLine> {
    state.floodplain.as_ref().ok_or(Error::MissingFloodplain {
        stage: Stage::Routing,
    })
}
