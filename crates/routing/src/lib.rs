//! # rivroute routing
//!
//! Kinematic-wave routing of discharge through a channel network given as a
//! flow-direction raster.
//!
//! The pipeline:
//! - [`network`]: decode the drainage map into downstream/upstream lookups
//!   over compressed land points
//! - [`order`]: group pixels into topological batches, upstream first
//! - [`hydraulics`]: derive per-reach `alpha` from channel geometry
//! - [`kinematic`]: sweep the batches, solving the implicit kinematic-wave
//!   equation per pixel, in parallel within a batch
//! - [`split`]: optional floodplain line for over-bank flow
//! - [`driver`]: run the substeps of a model step and average them
//!
//! ```ignore
//! use rivroute_routing::prelude::*;
//!
//! let network = build_network(&ldd, &mask, &NetworkParams::default())?;
//! let reach = ReachParameters::from_geometry(&geometry, &HydraulicParams::default())?;
//! let solver = KinematicWave::new(network, reach, None, SolverParams::default())?;
//! let report = solver.route(&mut discharge, &sideflow, Section::MainChannel)?;
//! ```

pub mod driver;
pub mod hydraulics;
pub mod kinematic;
pub mod ldd;
pub(crate) mod maybe_rayon;
pub mod network;
pub mod order;
pub mod settings;
pub mod split;
pub mod state;

pub use driver::{RoutingDriver, SideflowBuilder, StepSummary};
pub use hydraulics::{stable_substeps, ChannelGeometry, HydraulicParams, ReachParameters};
pub use kinematic::{KinematicWave, Section, SolverParams, SweepReport, MIN_DISCHARGE};
pub use ldd::{Direction, DirectionEncoding};
pub use network::{build_network, FlowNetwork, FlowNetworkBuilder, NetworkParams, NO_PIXEL};
pub use order::{plan_routing_order, RoutingOrderPlanner, RoutingSchedule};
pub use settings::RoutingSettings;
pub use split::{Regime, SplitParams, SplitRouting, SplitThresholds};
pub use state::{ChannelLine, RoutingState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::driver::{RoutingDriver, SideflowBuilder, StepSummary};
    pub use crate::hydraulics::{ChannelGeometry, HydraulicParams, ReachParameters};
    pub use crate::kinematic::{KinematicWave, Section, SolverParams, SweepReport};
    pub use crate::network::{build_network, FlowNetwork, NetworkParams};
    pub use crate::order::{plan_routing_order, RoutingSchedule};
    pub use crate::split::{SplitParams, SplitRouting};
    pub use crate::state::RoutingState;
    pub use rivroute_core::prelude::*;
}
