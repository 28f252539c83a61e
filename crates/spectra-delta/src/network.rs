//! Network interface rate derivation (§4.2).

use crate::elapsed_is_usable;
use spectra_types::{NetIfRaw, NetworkMetric};
use std::collections::HashMap;

/// Per-interface baseline, keyed by `ifindex` rather than name: interface
/// names can be reused after a hot-unplug/replug, but the kernel ifindex
/// is not reassigned while the old one is still referenced anywhere.
#[derive(Debug, Clone, Default)]
pub struct NetworkDeltaState {
    previous: HashMap<u32, NetIfRaw>,
}

impl NetworkDeltaState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn step_network(
    state: &mut NetworkDeltaState,
    current: Vec<NetIfRaw>,
    elapsed_seconds: f64,
) -> Vec<NetworkMetric> {
    let mut next_state = HashMap::with_capacity(current.len());
    let mut out = Vec::new();

    for curr in current {
        let prev = state.previous.get(&curr.ifindex);

        if elapsed_is_usable(elapsed_seconds)
            && let Some(prev) = prev
            && is_monotonic(prev, &curr)
        {
            out.push(NetworkMetric {
                name: curr.name.clone(),
                mac_address: curr.mac_address.clone(),
                mtu: curr.mtu,
                link_speed_bps: curr.link_speed_bps,
                rx_bytes_per_sec: rate(curr.rx_bytes - prev.rx_bytes, elapsed_seconds),
                rx_packets_per_sec: rate(curr.rx_packets - prev.rx_packets, elapsed_seconds),
                rx_errors_per_sec: rate(curr.rx_errors - prev.rx_errors, elapsed_seconds),
                rx_drops_per_sec: rate(curr.rx_drops - prev.rx_drops, elapsed_seconds),
                tx_bytes_per_sec: rate(curr.tx_bytes - prev.tx_bytes, elapsed_seconds),
                tx_packets_per_sec: rate(curr.tx_packets - prev.tx_packets, elapsed_seconds),
                tx_errors_per_sec: rate(curr.tx_errors - prev.tx_errors, elapsed_seconds),
                tx_drops_per_sec: rate(curr.tx_drops - prev.tx_drops, elapsed_seconds),
            });
        }

        next_state.insert(curr.ifindex, curr);
    }

    state.previous = next_state;
    out
}

fn is_monotonic(prev: &NetIfRaw, curr: &NetIfRaw) -> bool {
    curr.rx_bytes >= prev.rx_bytes
        && curr.rx_packets >= prev.rx_packets
        && curr.rx_errors >= prev.rx_errors
        && curr.rx_drops >= prev.rx_drops
        && curr.tx_bytes >= prev.tx_bytes
        && curr.tx_packets >= prev.tx_packets
        && curr.tx_errors >= prev.tx_errors
        && curr.tx_drops >= prev.tx_drops
}

fn rate(delta: u64, elapsed_seconds: f64) -> f64 {
    delta as f64 / elapsed_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ifindex: u32, rx_bytes: u64, tx_bytes: u64) -> NetIfRaw {
        NetIfRaw {
            ifindex,
            name: "eth0".into(),
            mac_address: "aa:bb:cc:dd:ee:ff".into(),
            mtu: 1500,
            link_speed_bps: 1_000_000_000,
            rx_bytes,
            rx_packets: rx_bytes / 100,
            rx_errors: 0,
            rx_drops: 0,
            tx_bytes,
            tx_packets: tx_bytes / 100,
            tx_errors: 0,
            tx_drops: 0,
        }
    }

    #[test]
    fn first_sample_is_baseline_only() {
        let mut state = NetworkDeltaState::new();
        let out = step_network(&mut state, vec![sample(2, 1000, 500)], 1.0);
        assert!(out.is_empty());
    }

    #[test]
    fn second_sample_emits_rate() {
        let mut state = NetworkDeltaState::new();
        step_network(&mut state, vec![sample(2, 1000, 500)], 1.0);

        let out = step_network(&mut state, vec![sample(2, 3000, 1500)], 2.0);
        assert_eq!(out.len(), 1);
        assert!((out[0].rx_bytes_per_sec - 1000.0).abs() < 0.01);
        assert!((out[0].tx_bytes_per_sec - 500.0).abs() < 0.01);
    }

    #[test]
    fn reused_name_different_ifindex_does_not_cross_contaminate() {
        let mut state = NetworkDeltaState::new();
        step_network(&mut state, vec![sample(2, 1000, 500)], 1.0);
        // Same name, new ifindex: must be treated as a fresh baseline.
        let out = step_network(&mut state, vec![sample(7, 10, 5)], 1.0);
        assert!(out.is_empty());
    }

    #[test]
    fn counter_reset_drops_this_tick() {
        let mut state = NetworkDeltaState::new();
        step_network(&mut state, vec![sample(2, 100_000, 100_000)], 1.0);
        let out = step_network(&mut state, vec![sample(2, 10, 10)], 1.0);
        assert!(out.is_empty());
    }
}
