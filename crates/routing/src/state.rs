//! Mutable routing state
//!
//! Discharge is the prognostic variable; storage is always derived from it
//! through `alpha * L * Q^beta` after a sweep, never integrated separately.

use crate::kinematic::{KinematicWave, Section, SweepReport};
use rivroute_core::Result;

/// Discharge and storage of one line of the channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLine {
    /// [m3/s]
    pub discharge: Vec<f64>,
    /// [m3]
    pub storage: Vec<f64>,
}

impl ChannelLine {
    /// Start a line at `discharge`, deriving its storage.
    pub fn new(solver: &KinematicWave, section: Section, discharge: Vec<f64>) -> Result<Self> {
        let storage = solver.storage(&discharge, section)?;
        Ok(Self { discharge, storage })
    }

    /// One substep of this line, keeping storage consistent with the new
    /// discharge.
    pub fn advance(
        &mut self,
        solver: &KinematicWave,
        section: Section,
        sideflow: &[f64],
    ) -> Result<SweepReport> {
        let report = solver.route(&mut self.discharge, sideflow, section)?;
        solver.storage_into(&self.discharge, section, &mut self.storage)?;
        Ok(report)
    }

    /// Total water held by the line [m3]
    pub fn total_storage(&self) -> f64 {
        self.storage.iter().sum()
    }
}

/// State of the whole channel network.
///
/// `floodplain` is present only when split routing is active.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingState {
    pub main: ChannelLine,
    pub floodplain: Option<ChannelLine>,
}

impl RoutingState {
    /// Single-line state at the given main-channel discharge
    pub fn single(solver: &KinematicWave, discharge: Vec<f64>) -> Result<Self> {
        Ok(Self {
            main: ChannelLine::new(solver, Section::MainChannel, discharge)?,
            floodplain: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydraulics::ReachParameters;
    use crate::kinematic::SolverParams;
    use crate::network::{FlowNetwork, NO_PIXEL};
    use approx::assert_relative_eq;

    #[test]
    fn test_storage_follows_discharge() {
        let network = FlowNetwork::from_downstream(vec![1, NO_PIXEL]).unwrap();
        let reach = ReachParameters::new(vec![2.0; 2], 0.6, vec![1000.0; 2]).unwrap();
        let params = SolverParams {
            workers: 1,
            ..SolverParams::default()
        };
        let solver = KinematicWave::new(network, reach, None, params).unwrap();

        let mut state = RoutingState::single(&solver, vec![1.0, 1.0]).unwrap();
        assert_relative_eq!(state.main.total_storage(), 4000.0);

        state
            .main
            .advance(&solver, Section::MainChannel, &[0.002, 0.0])
            .unwrap();
        let expected = solver.reach().storage(&state.main.discharge);
        assert_eq!(state.main.storage, expected);
        assert!(state.floodplain.is_none());
    }
}
