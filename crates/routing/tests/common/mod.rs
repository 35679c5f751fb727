//! Synthetic networks shared by the integration tests

#![allow(dead_code)]

use rivroute_routing::{
    FlowNetwork, KinematicWave, ReachParameters, SolverParams, NO_PIXEL,
};

/// `0 -> 1 -> ... -> n-1`, outlet last
pub fn chain(n: usize) -> FlowNetwork {
    let downstream = (0..n)
        .map(|p| if p + 1 < n { p as i64 + 1 } else { NO_PIXEL })
        .collect();
    FlowNetwork::from_downstream(downstream).unwrap()
}

/// Complete binary tree in heap order; pixel 0 is the outlet and every
/// other pixel drains to its parent
pub fn binary_tree(depth: u32) -> FlowNetwork {
    let n = (1usize << depth) - 1;
    let downstream = (0..n)
        .map(|p| if p == 0 { NO_PIXEL } else { ((p - 1) / 2) as i64 })
        .collect();
    FlowNetwork::from_downstream(downstream).unwrap()
}

/// `arms` headwaters draining straight into one outlet (pixel 0)
pub fn star(arms: usize) -> FlowNetwork {
    assert!(arms <= 8);
    let mut downstream = vec![NO_PIXEL];
    downstream.extend((0..arms).map(|_| 0));
    FlowNetwork::from_downstream(downstream).unwrap()
}

/// Many parallel chains of length `len`, each with its own outlet, so every
/// batch is `chains` wide
pub fn comb(chains: usize, len: usize) -> FlowNetwork {
    let mut downstream = Vec::with_capacity(chains * len);
    for c in 0..chains {
        let base = c * len;
        for k in 0..len {
            downstream.push(if k + 1 < len { (base + k + 1) as i64 } else { NO_PIXEL });
        }
    }
    FlowNetwork::from_downstream(downstream).unwrap()
}

pub fn uniform_reach(n: usize, alpha: f64, length: f64) -> ReachParameters {
    ReachParameters::new(vec![alpha; n], 0.6, vec![length; n]).unwrap()
}

pub fn solver(network: FlowNetwork, alpha: f64, dt: f64, workers: usize) -> KinematicWave {
    let n = network.len();
    let params = SolverParams {
        dt,
        workers,
        ..SolverParams::default()
    };
    KinematicWave::new(network, uniform_reach(n, alpha, 1000.0), None, params).unwrap()
}
