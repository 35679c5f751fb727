//! Flow network: downstream and upstream lookups over land points
//!
//! A drainage raster is decoded once into two lookups in the compressed
//! land-point numbering of a [`LandMask`]:
//!
//! - `downstream[p]` is the land point `p` drains into, or [`NO_PIXEL`]
//!   for outlets and pits;
//! - `upstream[p]` lists the (at most eight) land points draining into `p`,
//!   right-padded with [`NO_PIXEL`].
//!
//! The two are exact inverses: `u` appears in `upstream[d]` iff
//! `downstream[u] == d`.

use crate::ldd::{Direction, DirectionEncoding};
use crate::maybe_rayon::*;
use rivroute_core::raster::{LandMask, Raster, RasterElement};
use rivroute_core::{Algorithm, Error, Result, Stage};
use tracing::debug;

/// Sentinel for "no pixel" in both lookups
pub const NO_PIXEL: i64 = -1;

/// Maximum in-degree of a cell on an eight-neighbour grid
pub const MAX_UPSTREAM: usize = 8;

/// Directed forest of land points, each draining to at most one neighbour.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNetwork {
    downstream: Vec<i64>,
    upstream: Vec<[i64; MAX_UPSTREAM]>,
}

impl FlowNetwork {
    /// Build a network directly from a downstream lookup.
    ///
    /// Entries must be [`NO_PIXEL`] or the index of another pixel. The
    /// upstream lookup is derived from it.
    pub fn from_downstream(downstream: Vec<i64>) -> Result<Self> {
        let n = downstream.len();
        for (pixel, &d) in downstream.iter().enumerate() {
            if d == NO_PIXEL {
                continue;
            }
            if d < 0 || d as usize >= n || d as usize == pixel {
                return Err(Error::InvalidPixelValue {
                    stage: Stage::NetworkBuild,
                    name: "downstream lookup",
                    pixel,
                    value: d as f64,
                    reason: "must be -1 or the index of another pixel",
                });
            }
        }
        let upstream = upstream_lookup(&downstream)?;
        Ok(Self {
            downstream,
            upstream,
        })
    }

    /// Number of pixels
    pub fn len(&self) -> usize {
        self.downstream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downstream.is_empty()
    }

    /// Raw downstream lookup (`-1` = outlet)
    pub fn downstream_lookup(&self) -> &[i64] {
        &self.downstream
    }

    /// Raw upstream lookup, each row padded with `-1`
    pub fn upstream_lookup(&self) -> &[[i64; MAX_UPSTREAM]] {
        &self.upstream
    }

    /// Pixel `pixel` drains into, `None` for outlets
    #[inline]
    pub fn downstream(&self, pixel: usize) -> Option<usize> {
        let d = self.downstream[pixel];
        (d != NO_PIXEL).then_some(d as usize)
    }

    /// Pixels draining directly into `pixel`
    #[inline]
    pub fn upstream(&self, pixel: usize) -> impl Iterator<Item = usize> + '_ {
        self.upstream[pixel]
            .iter()
            .take_while(|&&u| u != NO_PIXEL)
            .map(|&u| u as usize)
    }

    /// Pixels with no downstream neighbour
    pub fn outlets(&self) -> impl Iterator<Item = usize> + '_ {
        self.downstream
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == NO_PIXEL)
            .map(|(p, _)| p)
    }

    /// Whether `pixel` has no upstream contributors
    pub fn is_headwater(&self, pixel: usize) -> bool {
        self.upstream[pixel][0] == NO_PIXEL
    }

    /// Sum of `values` over the direct upstream contributors of every pixel
    pub fn sum_upstream(&self, values: &[f64]) -> Vec<f64> {
        (0..self.len())
            .map(|p| self.upstream(p).map(|u| values[u]).sum())
            .collect()
    }
}

fn upstream_lookup(downstream: &[i64]) -> Result<Vec<[i64; MAX_UPSTREAM]>> {
    let mut upstream = vec![[NO_PIXEL; MAX_UPSTREAM]; downstream.len()];
    let mut filled = vec![0usize; downstream.len()];

    for (pixel, &d) in downstream.iter().enumerate() {
        if d == NO_PIXEL {
            continue;
        }
        let d = d as usize;
        if filled[d] == MAX_UPSTREAM {
            return Err(Error::TooManyUpstream {
                stage: Stage::NetworkBuild,
                pixel: d,
                limit: MAX_UPSTREAM,
            });
        }
        upstream[d][filled[d]] = pixel as i64;
        filled[d] += 1;
    }
    Ok(upstream)
}

/// Parameters for network construction
#[derive(Debug, Clone, Default)]
pub struct NetworkParams {
    /// Encoding of the flow-direction raster. Default: keypad LDD
    pub encoding: DirectionEncoding,
}

/// Decode a flow-direction raster into a [`FlowNetwork`].
///
/// For every land point the direction code is decoded and the neighbour it
/// points to is looked up:
/// - a pit code makes the land point an outlet;
/// - a neighbour outside the grid fails with [`Error::DownstreamOutOfBounds`];
/// - a neighbour outside the mask fails with [`Error::DownstreamOutsideMask`];
/// - a code outside the encoding fails with [`Error::InvalidDirectionCode`].
///
/// Outlets are only ever explicit pits, so an LDD clipped to a catchment
/// must carry a pit code at its outlet cell.
///
/// Cells outside the mask are never decoded.
pub fn build_network<T: RasterElement>(
    flow_dir: &Raster<T>,
    mask: &LandMask,
    params: &NetworkParams,
) -> Result<FlowNetwork> {
    let (rows, cols) = flow_dir.shape();
    let (mr, mc) = mask.shape();
    if (rows, cols) != (mr, mc) {
        return Err(Error::SizeMismatch {
            er: mr,
            ec: mc,
            ar: rows,
            ac: cols,
        });
    }

    let data = flow_dir.data();
    let encoding = params.encoding;

    let downstream = (0..mask.len())
        .into_par_iter()
        .map(|point| -> Result<i64> {
            let (row, col) = mask.cell_of(point);
            let raw = data[(row, col)];
            let code = if flow_dir.is_nodata(raw) {
                f64::NAN
            } else {
                raw.to_f64().unwrap_or(f64::NAN)
            };

            let (dr, dc) = match encoding.decode(code) {
                Some(Direction::Pit) => return Ok(NO_PIXEL),
                Some(Direction::Flow { dr, dc }) => (dr, dc),
                None => {
                    return Err(Error::InvalidDirectionCode {
                        stage: Stage::NetworkBuild,
                        row,
                        col,
                        code,
                    })
                }
            };

            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                return Err(Error::DownstreamOutOfBounds {
                    stage: Stage::NetworkBuild,
                    row,
                    col,
                    target_row: nr,
                    target_col: nc,
                });
            }

            let (nr, nc) = (nr as usize, nc as usize);
            match mask.point_index(nr, nc) {
                Some(target) => Ok(target as i64),
                None => Err(Error::DownstreamOutsideMask {
                    stage: Stage::NetworkBuild,
                    row,
                    col,
                    target_row: nr,
                    target_col: nc,
                }),
            }
        })
        .collect::<Result<Vec<i64>>>()?;

    let network = FlowNetwork::from_downstream(downstream)?;
    debug!(
        pixels = network.len(),
        outlets = network.outlets().count(),
        "flow network built"
    );
    Ok(network)
}

/// Flow network construction as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct FlowNetworkBuilder;

impl Algorithm for FlowNetworkBuilder {
    type Input = (Raster<i32>, LandMask);
    type Output = FlowNetwork;
    type Params = NetworkParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Network"
    }

    fn description(&self) -> &'static str {
        "Decode a flow-direction raster into downstream/upstream lookups over land points"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (flow_dir, mask) = input;
        build_network(&flow_dir, &mask, &params)
    }
}
