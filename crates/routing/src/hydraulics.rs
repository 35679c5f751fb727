//! Channel hydraulics: geometry maps to kinematic-wave coefficients
//!
//! The routing core only needs three things per reach: `alpha`, the network
//! constant `beta`, and the reach length. They relate wetted cross-section
//! and discharge through `A = alpha * Q^beta`, so reach storage is
//! `alpha * L * Q^beta`.
//!
//! `alpha` follows from Manning's equation for a trapezoidal channel with
//! the wetted perimeter frozen at bankfull:
//!
//! ```text
//! P     = W_b + 2 * h_bf * sqrt(1 + s^2)
//! alpha = (n / sqrt(S))^beta * P^(2 beta / 3)
//! ```

use rivroute_core::error::check_len;
use rivroute_core::{Error, Result, Stage};
use serde::{Deserialize, Serialize};

/// Manning exponent of the storage-discharge relation
pub const DEFAULT_BETA: f64 = 0.6;

/// Bed gradients below this are floored to keep alpha finite
pub const DEFAULT_MIN_GRADIENT: f64 = 1e-4;

/// Per-pixel channel geometry, in land-point order.
#[derive(Debug, Clone, Default)]
pub struct ChannelGeometry {
    /// Manning's roughness coefficient [s m^-1/3]
    pub mannings_n: Vec<f64>,
    /// Bed gradient [m/m]
    pub gradient: Vec<f64>,
    /// Bottom width [m]
    pub bottom_width: Vec<f64>,
    /// Side slope, horizontal per vertical [-]
    pub side_slope: Vec<f64>,
    /// Bankfull depth [m]
    pub bankfull_depth: Vec<f64>,
    /// Reach length [m]
    pub length: Vec<f64>,
}

impl ChannelGeometry {
    /// Number of pixels
    pub fn len(&self) -> usize {
        self.mannings_n.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mannings_n.is_empty()
    }

    /// Check every map has one finite value per pixel in its valid range.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        let stage = Stage::SolverConstruction;
        check_len(stage, "gradient", n, self.gradient.len())?;
        check_len(stage, "bottom width", n, self.bottom_width.len())?;
        check_len(stage, "side slope", n, self.side_slope.len())?;
        check_len(stage, "bankfull depth", n, self.bankfull_depth.len())?;
        check_len(stage, "reach length", n, self.length.len())?;

        require_positive("Manning's n", &self.mannings_n)?;
        require_non_negative("gradient", &self.gradient)?;
        require_non_negative("bottom width", &self.bottom_width)?;
        require_non_negative("side slope", &self.side_slope)?;
        require_positive("bankfull depth", &self.bankfull_depth)?;
        require_positive("reach length", &self.length)?;
        Ok(())
    }

    /// Wetted perimeter at bankfull [m]
    pub fn bankfull_perimeter(&self) -> Vec<f64> {
        self.bottom_width
            .iter()
            .zip(&self.bankfull_depth)
            .zip(&self.side_slope)
            .map(|((&w, &h), &s)| w + 2.0 * h * (1.0 + s * s).sqrt())
            .collect()
    }

    /// Cross-section area at bankfull [m2]
    pub fn bankfull_area(&self) -> Vec<f64> {
        self.bottom_width
            .iter()
            .zip(&self.bankfull_depth)
            .zip(&self.side_slope)
            .map(|((&w, &h), &s)| h * (w + s * h))
            .collect()
    }

    /// Channel volume at bankfull [m3]
    pub fn bankfull_storage(&self) -> Vec<f64> {
        self.bankfull_area()
            .iter()
            .zip(&self.length)
            .map(|(&a, &l)| a * l)
            .collect()
    }
}

/// Scalars used when deriving alpha from geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraulicParams {
    /// Network-wide exponent of `A = alpha * Q^beta`. Default: 0.6
    pub beta: f64,
    /// Floor applied to the bed gradient. Default: 1e-4
    pub min_gradient: f64,
    /// Multiplier on Manning's n (calibration). Default: 1.0
    pub roughness_calibration: f64,
}

impl Default for HydraulicParams {
    fn default() -> Self {
        Self {
            beta: DEFAULT_BETA,
            min_gradient: DEFAULT_MIN_GRADIENT,
            roughness_calibration: 1.0,
        }
    }
}

/// Time-invariant hydraulic parameters of every reach.
///
/// Immutable once built and shared read-only by every routing sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachParameters {
    alpha: Vec<f64>,
    beta: f64,
    reach_length: Vec<f64>,
}

impl ReachParameters {
    /// Wrap precomputed coefficients, rejecting non-positive or non-finite
    /// values with the offending pixel.
    pub fn new(alpha: Vec<f64>, beta: f64, reach_length: Vec<f64>) -> Result<Self> {
        check_beta(beta)?;
        check_len(
            Stage::SolverConstruction,
            "reach length",
            alpha.len(),
            reach_length.len(),
        )?;
        require_positive("alpha", &alpha)?;
        require_positive("reach length", &reach_length)?;
        Ok(Self {
            alpha,
            beta,
            reach_length,
        })
    }

    /// Derive alpha from channel geometry with Manning's equation.
    pub fn from_geometry(geometry: &ChannelGeometry, params: &HydraulicParams) -> Result<Self> {
        let alpha = manning_alpha(geometry, params, 1.0)?;
        Self::new(alpha, params.beta, geometry.length.clone())
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn reach_length(&self) -> &[f64] {
        &self.reach_length
    }

    /// Number of reaches
    pub fn len(&self) -> usize {
        self.alpha.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    /// Alpha of a line whose roughness is `factor` times this one.
    ///
    /// Alpha scales with `n^beta`, so this is `alpha * factor^beta`.
    pub fn scaled_alpha(&self, factor: f64) -> Result<Vec<f64>> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::InvalidParameter {
                stage: Stage::SolverConstruction,
                name: "roughness factor",
                value: factor.to_string(),
                reason: "must be finite and strictly positive".into(),
            });
        }
        let scale = factor.powf(self.beta);
        Ok(self.alpha.iter().map(|&a| a * scale).collect())
    }

    /// Storage [m3] of every reach at the given discharge
    pub fn storage(&self, discharge: &[f64]) -> Vec<f64> {
        storage_with(&self.alpha, self.beta, &self.reach_length, discharge)
    }

    /// Discharge [m3/s] that holds the given storage; the inverse of
    /// [`storage`](Self::storage). Non-positive storage maps to zero.
    pub fn discharge_from_storage(&self, storage: &[f64]) -> Vec<f64> {
        discharge_with(&self.alpha, self.beta, &self.reach_length, storage)
    }
}

/// `alpha * L * Q^beta` for every reach
pub fn storage_with(alpha: &[f64], beta: f64, length: &[f64], discharge: &[f64]) -> Vec<f64> {
    alpha
        .iter()
        .zip(length)
        .zip(discharge)
        .map(|((&a, &l), &q)| a * l * q.max(0.0).powf(beta))
        .collect()
}

/// `(S / (alpha * L))^(1/beta)` for every reach
pub fn discharge_with(alpha: &[f64], beta: f64, length: &[f64], storage: &[f64]) -> Vec<f64> {
    alpha
        .iter()
        .zip(length)
        .zip(storage)
        .map(|((&a, &l), &s)| {
            if s > 0.0 {
                (s / (a * l)).powf(1.0 / beta)
            } else {
                0.0
            }
        })
        .collect()
}

/// Manning alpha with roughness `n * calibration * factor`.
pub fn manning_alpha(
    geometry: &ChannelGeometry,
    params: &HydraulicParams,
    factor: f64,
) -> Result<Vec<f64>> {
    geometry.validate()?;
    check_beta(params.beta)?;
    let roughness = params.roughness_calibration * factor;
    if !(roughness.is_finite() && roughness > 0.0) {
        return Err(Error::InvalidParameter {
            stage: Stage::SolverConstruction,
            name: "roughness calibration",
            value: roughness.to_string(),
            reason: "must be finite and strictly positive".into(),
        });
    }

    let beta = params.beta;
    let perimeter = geometry.bankfull_perimeter();
    Ok(geometry
        .mannings_n
        .iter()
        .zip(&geometry.gradient)
        .zip(&perimeter)
        .map(|((&n, &s), &p)| {
            let slope = s.max(params.min_gradient);
            (n * roughness / slope.sqrt()).powf(beta) * p.powf(2.0 * beta / 3.0)
        })
        .collect())
}

/// Number of routing substeps per model step that keeps the kinematic wave
/// within one reach per substep.
///
/// The celerity at reference discharge `Q` is `c = Q^(1 - beta) / (alpha *
/// beta)`; the routing step must satisfy `c * dt_r <= L` on every reach.
/// Always at least 1.
pub fn stable_substeps(model_dt: f64, reach: &ReachParameters, typical_q: &[f64]) -> Result<usize> {
    if !(model_dt.is_finite() && model_dt > 0.0) {
        return Err(Error::InvalidParameter {
            stage: Stage::SolverConstruction,
            name: "model time step",
            value: model_dt.to_string(),
            reason: "must be finite and strictly positive".into(),
        });
    }
    check_len(
        Stage::SolverConstruction,
        "reference discharge",
        reach.len(),
        typical_q.len(),
    )?;

    let beta = reach.beta();
    let mut max_dt = f64::INFINITY;
    for ((&a, &l), &q) in reach.alpha().iter().zip(reach.reach_length()).zip(typical_q) {
        if q <= 0.0 {
            continue;
        }
        let celerity = q.powf(1.0 - beta) / (a * beta);
        max_dt = max_dt.min(l / celerity);
    }

    if !max_dt.is_finite() || max_dt >= model_dt {
        return Ok(1);
    }
    Ok((model_dt / max_dt).ceil().max(1.0) as usize)
}

fn check_beta(beta: f64) -> Result<()> {
    if !(beta.is_finite() && beta > 0.0) {
        return Err(Error::InvalidParameter {
            stage: Stage::SolverConstruction,
            name: "beta",
            value: beta.to_string(),
            reason: "must be finite and strictly positive".into(),
        });
    }
    Ok(())
}

pub(crate) fn require_positive(name: &'static str, values: &[f64]) -> Result<()> {
    match values.iter().position(|&v| !(v.is_finite() && v > 0.0)) {
        Some(pixel) => Err(Error::InvalidPixelValue {
            stage: Stage::SolverConstruction,
            name,
            pixel,
            value: values[pixel],
            reason: "must be finite and strictly positive",
        }),
        None => Ok(()),
    }
}

fn require_non_negative(name: &'static str, values: &[f64]) -> Result<()> {
    match values.iter().position(|&v| !(v.is_finite() && v >= 0.0)) {
        Some(pixel) => Err(Error::InvalidPixelValue {
            stage: Stage::SolverConstruction,
            name,
            pixel,
            value: values[pixel],
            reason: "must be finite and non-negative",
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rectangular(n: usize) -> ChannelGeometry {
        ChannelGeometry {
            mannings_n: vec![0.04; n],
            gradient: vec![0.001; n],
            bottom_width: vec![10.0; n],
            side_slope: vec![0.0; n],
            bankfull_depth: vec![2.0; n],
            length: vec![1000.0; n],
        }
    }

    #[test]
    fn test_rectangular_bankfull() {
        let geom = rectangular(1);
        assert_relative_eq!(geom.bankfull_perimeter()[0], 14.0);
        assert_relative_eq!(geom.bankfull_area()[0], 20.0);
        assert_relative_eq!(geom.bankfull_storage()[0], 20_000.0);
    }

    #[test]
    fn test_trapezoid_perimeter() {
        let mut geom = rectangular(1);
        geom.side_slope = vec![0.75];
        // Each bank is 2 * sqrt(1 + 0.5625) = 2.5 m long
        assert_relative_eq!(geom.bankfull_perimeter()[0], 15.0, epsilon = 1e-12);
        assert_relative_eq!(geom.bankfull_area()[0], 2.0 * (10.0 + 1.5));
    }

    #[test]
    fn test_manning_alpha() {
        let geom = rectangular(2);
        let reach = ReachParameters::from_geometry(&geom, &HydraulicParams::default()).unwrap();
        let expected = (0.04_f64 / 0.001_f64.sqrt()).powf(0.6) * 14.0_f64.powf(0.4);
        assert_relative_eq!(reach.alpha()[0], expected, epsilon = 1e-12);
        assert_eq!(reach.beta(), 0.6);
    }

    #[test]
    fn test_flat_gradient_is_floored() {
        let mut geom = rectangular(1);
        geom.gradient = vec![0.0];
        let alpha = manning_alpha(&geom, &HydraulicParams::default(), 1.0).unwrap();
        assert!(alpha[0].is_finite() && alpha[0] > 0.0, "alpha = {}", alpha[0]);
    }

    #[test]
    fn test_invalid_geometry_names_pixel() {
        let mut geom = rectangular(3);
        geom.bankfull_depth[2] = -1.0;
        let err = ReachParameters::from_geometry(&geom, &HydraulicParams::default()).unwrap_err();
        match err {
            Error::InvalidPixelValue { name, pixel, .. } => {
                assert_eq!(name, "bankfull depth");
                assert_eq!(pixel, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_reach_parameters_reject_zero_alpha() {
        assert!(ReachParameters::new(vec![1.0, 0.0], 0.6, vec![10.0, 10.0]).is_err());
        assert!(ReachParameters::new(vec![1.0], 0.6, vec![10.0, 10.0]).is_err());
        assert!(ReachParameters::new(vec![1.0], 0.0, vec![10.0]).is_err());
    }

    #[test]
    fn test_storage_inverse() {
        let reach = ReachParameters::new(vec![2.0, 3.5], 0.6, vec![1000.0, 250.0]).unwrap();
        let q = vec![4.2, 0.37];
        let s = reach.storage(&q);
        assert_relative_eq!(s[0], 2.0 * 1000.0 * 4.2_f64.powf(0.6), epsilon = 1e-9);

        let back = reach.discharge_from_storage(&s);
        assert_relative_eq!(back[0], q[0], epsilon = 1e-12);
        assert_relative_eq!(back[1], q[1], epsilon = 1e-12);
        assert_eq!(reach.discharge_from_storage(&[-1.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_scaled_alpha() {
        let reach = ReachParameters::new(vec![2.0], 0.6, vec![100.0]).unwrap();
        let scaled = reach.scaled_alpha(2.0).unwrap();
        assert_relative_eq!(scaled[0], 2.0 * 2.0_f64.powf(0.6));
        assert!(reach.scaled_alpha(0.0).is_err());
    }

    #[test]
    fn test_stable_substeps() {
        // c = 1^0.4 / (2 * 0.6) = 0.8333 m/s; 1000 m / c = 1200 s
        let reach = ReachParameters::new(vec![2.0], 0.6, vec![1000.0]).unwrap();
        assert_eq!(stable_substeps(86_000.0, &reach, &[1.0]).unwrap(), 72);
        assert_eq!(stable_substeps(900.0, &reach, &[1.0]).unwrap(), 1);
        assert_eq!(stable_substeps(86_400.0, &reach, &[0.0]).unwrap(), 1);
        assert!(stable_substeps(0.0, &reach, &[1.0]).is_err());
    }
}
