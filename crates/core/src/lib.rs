//! # rivroute core
//!
//! Shared types for the rivroute channel-routing engine.
//!
//! This crate provides:
//! - `Raster<T>`: the 2D grid static maps are delivered as
//! - `LandMask`: the mapping between grid cells and compressed land points
//! - `Error` / `Result`: stage-tagged errors used by every crate
//! - `Algorithm`: the common shape of the engine's construction steps
//! - GeoTIFF I/O for maps and result fields

pub mod error;
pub mod io;
pub mod raster;

pub use error::{Error, Result, Stage};
pub use raster::{GeoTransform, LandMask, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result, Stage};
    pub use crate::raster::{GeoTransform, LandMask, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// A named, parameterised transformation of its input.
///
/// The static construction steps of the engine (building the flow network,
/// planning the routing order) implement this so callers can drive them
/// uniformly.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
