//! Routing order: topological batches over the flow network
//!
//! Every pixel gets a topological distance from its outlet (outlets are 1,
//! their direct contributors 2, and so on), found by a breadth-first walk
//! against the flow direction. The execution order of a pixel is
//! `max_distance - distance`, so headwaters of the longest flow paths get
//! order 0 and outlets the highest order.
//!
//! Pixels are grouped into contiguous batches of equal order and batches are
//! processed in increasing order. A direct upstream contributor of a pixel
//! is always exactly one step further from the outlet, so it lands in a
//! strictly earlier batch: by the time a pixel is routed, everything that
//! drains into it has been routed in the same sweep. Pixels inside one batch
//! never depend on each other.

use crate::network::FlowNetwork;
use rivroute_core::{Algorithm, Error, Result, Stage};
use std::ops::Range;
use tracing::debug;

/// Execution schedule of a sweep over the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSchedule {
    /// Execution order of every pixel
    order: Vec<u32>,
    /// Pixel indices sorted by order, batches contiguous
    pixels_ordered: Vec<usize>,
    /// `[start, stop)` of every batch within `pixels_ordered`
    order_start_stop: Vec<(usize, usize)>,
}

impl RoutingSchedule {
    /// Execution order of every pixel
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    /// Pixel indices grouped contiguously by batch
    pub fn pixels_ordered(&self) -> &[usize] {
        &self.pixels_ordered
    }

    /// `(start, stop)` of each batch within [`pixels_ordered`](Self::pixels_ordered)
    pub fn order_start_stop(&self) -> &[(usize, usize)] {
        &self.order_start_stop
    }

    /// Number of batches
    pub fn num_batches(&self) -> usize {
        self.order_start_stop.len()
    }

    /// Pixels of batch `k`
    pub fn batch(&self, k: usize) -> &[usize] {
        let (start, stop) = self.order_start_stop[k];
        &self.pixels_ordered[start..stop]
    }

    /// Batches in execution order
    pub fn batches(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.order_start_stop
            .iter()
            .map(move |&(start, stop)| &self.pixels_ordered[start..stop])
    }

    /// Size of the widest batch, the upper bound on useful parallelism
    pub fn max_batch_width(&self) -> usize {
        self.order_start_stop
            .iter()
            .map(|&(start, stop)| stop - start)
            .max()
            .unwrap_or(0)
    }

    /// Number of pixels scheduled
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Range of batch `k` within [`pixels_ordered`](Self::pixels_ordered)
    pub fn batch_range(&self, k: usize) -> Range<usize> {
        let (start, stop) = self.order_start_stop[k];
        start..stop
    }
}

/// Plan the execution schedule of a network.
///
/// Deterministic: within a batch pixels are listed in ascending index.
///
/// # Errors
/// [`Error::CycleDetected`] when some pixels never reach an outlet, which
/// only happens for a corrupt drainage map with a loop in it.
pub fn plan_routing_order(network: &FlowNetwork) -> Result<RoutingSchedule> {
    let n = network.len();
    let mut distance = vec![0u32; n];

    let mut frontier: Vec<usize> = network.outlets().collect();
    for &p in &frontier {
        distance[p] = 1;
    }

    let mut assigned = frontier.len();
    let mut d = 1u32;
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &p in &frontier {
            for u in network.upstream(p) {
                if distance[u] == 0 {
                    distance[u] = d + 1;
                    next.push(u);
                }
            }
        }
        assigned += next.len();
        frontier = next;
        d += 1;
    }

    if assigned != n {
        let pixel = distance.iter().position(|&x| x == 0).unwrap_or(0);
        return Err(Error::CycleDetected {
            stage: Stage::OrderPlanning,
            unresolved: n - assigned,
            pixel,
        });
    }

    let max_distance = distance.iter().copied().max().unwrap_or(0);
    let order: Vec<u32> = distance.iter().map(|&dist| max_distance - dist).collect();

    // Counting sort by order; stable, so ascending pixel index within a batch
    let num_batches = max_distance as usize;
    let mut counts = vec![0usize; num_batches];
    for &o in &order {
        counts[o as usize] += 1;
    }
    let mut order_start_stop = Vec::with_capacity(num_batches);
    let mut start = 0;
    for &count in &counts {
        order_start_stop.push((start, start + count));
        start += count;
    }
    let mut cursor: Vec<usize> = order_start_stop.iter().map(|&(s, _)| s).collect();
    let mut pixels_ordered = vec![0usize; n];
    for (pixel, &o) in order.iter().enumerate() {
        pixels_ordered[cursor[o as usize]] = pixel;
        cursor[o as usize] += 1;
    }

    let schedule = RoutingSchedule {
        order,
        pixels_ordered,
        order_start_stop,
    };
    debug!(
        pixels = n,
        batches = schedule.num_batches(),
        widest = schedule.max_batch_width(),
        "routing order planned"
    );
    Ok(schedule)
}

/// Routing-order planning as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct RoutingOrderPlanner;

impl Algorithm for RoutingOrderPlanner {
    type Input = FlowNetwork;
    type Output = RoutingSchedule;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Routing Order"
    }

    fn description(&self) -> &'static str {
        "Group network pixels into batches that can be routed in parallel, upstream first"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        plan_routing_order(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NO_PIXEL;

    #[test]
    fn test_chain_order() {
        // 0 -> 1 -> 2 -> 3 (outlet)
        let net = FlowNetwork::from_downstream(vec![1, 2, 3, NO_PIXEL]).unwrap();
        let schedule = plan_routing_order(&net).unwrap();

        assert_eq!(schedule.order(), &[0, 1, 2, 3]);
        assert_eq!(schedule.num_batches(), 4);
        assert_eq!(schedule.pixels_ordered(), &[0, 1, 2, 3]);
        assert_eq!(schedule.batch(3), &[3]);
    }

    #[test]
    fn test_uneven_confluence() {
        // Long branch 0 -> 1 -> 2 -> 4, short branch 3 -> 4, outlet 4
        let net = FlowNetwork::from_downstream(vec![1, 2, 4, 4, NO_PIXEL]).unwrap();
        let schedule = plan_routing_order(&net).unwrap();

        // Distances: 4:1, 2:2, 3:2, 1:3, 0:4 -> order = 4 - distance
        assert_eq!(schedule.order(), &[0, 1, 2, 2, 3]);
        assert_eq!(schedule.batch(2), &[2, 3]);
        assert_eq!(schedule.max_batch_width(), 2);
    }

    #[test]
    fn test_multiple_outlets_share_last_batch() {
        // Two independent chains of length 2 and one isolated outlet
        let net = FlowNetwork::from_downstream(vec![1, NO_PIXEL, 3, NO_PIXEL, NO_PIXEL]).unwrap();
        let schedule = plan_routing_order(&net).unwrap();

        assert_eq!(schedule.num_batches(), 2);
        assert_eq!(schedule.batch(0), &[0, 2]);
        assert_eq!(schedule.batch(1), &[1, 3, 4]);
    }

    #[test]
    fn test_cycle_detected() {
        // 0 -> 1 -> 0 loop, 2 drains into it, 3 is a valid outlet
        let net = FlowNetwork::from_downstream(vec![1, 0, 0, NO_PIXEL]).unwrap();
        let err = plan_routing_order(&net).unwrap_err();
        match err {
            Error::CycleDetected {
                unresolved, pixel, ..
            } => {
                assert_eq!(unresolved, 3);
                assert_eq!(pixel, 0);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_network() {
        let net = FlowNetwork::from_downstream(Vec::new()).unwrap();
        let schedule = plan_routing_order(&net).unwrap();
        assert!(schedule.is_empty());
        assert_eq!(schedule.num_batches(), 0);
    }

    #[test]
    fn test_upstream_strictly_earlier() {
        // Binary confluences: 0,1 -> 4; 2,3 -> 5; 4,5 -> 6
        let net = FlowNetwork::from_downstream(vec![4, 4, 5, 5, 6, 6, NO_PIXEL]).unwrap();
        let schedule = plan_routing_order(&net).unwrap();
        for p in 0..net.len() {
            for u in net.upstream(p) {
                assert!(
                    schedule.order()[u] < schedule.order()[p],
                    "pixel {} (order {}) has upstream {} (order {})",
                    p,
                    schedule.order()[p],
                    u,
                    schedule.order()[u]
                );
            }
        }
    }
}
