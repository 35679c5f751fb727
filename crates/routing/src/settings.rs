//! Run configuration
//!
//! One immutable settings object, read once from JSON and handed by
//! reference to the constructors that need it. Every field has a default,
//! so a settings file only lists what it changes:
//!
//! ```json
//! {
//!   "model_dt": 86400,
//!   "routing_dt": 3600,
//!   "workers": 4,
//!   "split": { "q_split_mult": 2.5 }
//! }
//! ```

use crate::hydraulics::HydraulicParams;
use crate::kinematic::SolverParams;
use crate::ldd::DirectionEncoding;
use crate::network::NetworkParams;
use crate::split::SplitParams;
use rivroute_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scalar configuration of a routing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingSettings {
    /// Model time step [s]. Default: 86400
    pub model_dt: f64,
    /// Requested routing substep [s]; rounded so substeps tile the model
    /// step. Default: 3600
    pub routing_dt: f64,
    /// Model steps to run. Default: 1
    pub steps: usize,
    /// Flow-direction encoding. Default: ldd
    pub encoding: DirectionEncoding,
    /// Worker threads, 0 = all cores. Default: 0
    pub workers: usize,
    /// Newton iteration budget. Default: 30
    pub max_iterations: usize,
    /// Newton relative step tolerance. Default: 1e-12
    pub tolerance: f64,
    pub hydraulics: HydraulicParams,
    /// Enables split routing when present
    pub split: Option<SplitParams>,
    /// Initial discharge everywhere [m3/s]. Default: 0.1
    pub initial_discharge: f64,
    /// Constant lateral inflow [m3/s/m]. Default: 0
    pub sideflow: f64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            model_dt: 86_400.0,
            routing_dt: 3_600.0,
            steps: 1,
            encoding: DirectionEncoding::default(),
            workers: 0,
            max_iterations: 30,
            tolerance: 1e-12,
            hydraulics: HydraulicParams::default(),
            split: None,
            initial_discharge: 0.1,
            sideflow: 0.0,
        }
    }
}

impl RoutingSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| Error::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Settings(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Settings(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("model_dt", self.model_dt), ("routing_dt", self.routing_dt)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Settings(format!(
                    "{} must be strictly positive, got {}",
                    name, value
                )));
            }
        }
        if self.initial_discharge < 0.0 || !self.initial_discharge.is_finite() {
            return Err(Error::Settings(format!(
                "initial_discharge must be non-negative, got {}",
                self.initial_discharge
            )));
        }
        Ok(())
    }

    /// Routing substeps per model step (at least 1)
    pub fn substeps(&self) -> usize {
        (self.model_dt / self.routing_dt).round().max(1.0) as usize
    }

    pub fn network_params(&self) -> NetworkParams {
        NetworkParams {
            encoding: self.encoding,
        }
    }

    /// Solver parameters for `substeps` substeps per model step
    pub fn solver_params(&self, substeps: usize) -> SolverParams {
        SolverParams {
            dt: self.model_dt / substeps.max(1) as f64,
            workers: self.workers,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let settings = RoutingSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, RoutingSettings::default());
        assert_eq!(settings.substeps(), 24);
        assert!(settings.split.is_none());
    }

    #[test]
    fn test_partial_settings() {
        let json = r#"{
            "model_dt": 3600,
            "routing_dt": 1000,
            "encoding": "d8",
            "split": { "q_split_mult": 2.5 },
            "hydraulics": { "beta": 0.6, "min_gradient": 0.001 }
        }"#;
        let settings = RoutingSettings::from_json_str(json).unwrap();
        assert_eq!(settings.substeps(), 4);
        assert_eq!(settings.solver_params(4).dt, 900.0);
        assert_eq!(settings.network_params().encoding, DirectionEncoding::D8);

        let split = settings.split.unwrap();
        assert_eq!(split.q_split_mult, 2.5);
        assert_eq!(split.floodplain_roughness_factor, 3.0);
        assert_eq!(settings.hydraulics.roughness_calibration, 1.0);
    }

    #[test]
    fn test_split_written_out() {
        let settings = RoutingSettings {
            split: Some(SplitParams::default()),
            ..RoutingSettings::default()
        };
        let json = settings.to_json().unwrap();
        assert!(json.contains("\"q_split_mult\""), "got: {}", json);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            RoutingSettings::from_json_str(r#"{ "model_dt": 0 }"#),
            Err(Error::Settings(_))
        ));
        assert!(RoutingSettings::from_json_str(r#"{ "workerz": 2 }"#).is_err());
        assert!(RoutingSettings::from_json_str("not json").is_err());
    }
}
