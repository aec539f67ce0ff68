//! Stability Detector
//!
//! Decides when the backend's port set has stopped churning after a restart.
//! The state is seeded with the sample that triggered stabilization; each
//! later sample is compared with the one immediately before it, never with
//! the long-term last-known-good set.

use crate::config::TimingConfig;
use crate::core::error::Result;
use crate::core::types::{format_ports, PortSet};
use crate::probe::EnvironmentProbe;
use crate::shutdown::ShutdownSignal;

/// Verdict for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityResult {
    Settling,
    Stable,
}

/// Run-length tracker over consecutive port-set samples
#[derive(Debug, Clone)]
pub struct StabilityState {
    last_ports: PortSet,
    consecutive_stable_count: u32,
    required_stable_count: u32,
    min_plausible_ports: usize,
}

impl StabilityState {
    pub fn new(seed: PortSet, required_stable_count: u32, min_plausible_ports: usize) -> Self {
        Self {
            last_ports: seed,
            consecutive_stable_count: 0,
            required_stable_count,
            min_plausible_ports,
        }
    }

    /// Build with the thresholds from `timing`
    pub fn from_timing(seed: PortSet, timing: &TimingConfig) -> Self {
        Self::new(seed, timing.stable_required, timing.min_plausible_ports)
    }

    /// Feed the next sample
    pub fn observe(&mut self, current: &PortSet) -> StabilityResult {
        if *current != self.last_ports {
            self.consecutive_stable_count = 0;
            self.last_ports = current.clone();
            return StabilityResult::Settling;
        }

        if current.len() < self.min_plausible_ports {
            // Too few ports to be a running backend
            self.consecutive_stable_count = 0;
            return StabilityResult::Settling;
        }

        self.consecutive_stable_count = self.consecutive_stable_count.saturating_add(1);
        if self.is_stable() {
            StabilityResult::Stable
        } else {
            StabilityResult::Settling
        }
    }

    pub fn is_stable(&self) -> bool {
        self.consecutive_stable_count >= self.required_stable_count
            && self.last_ports.len() >= self.min_plausible_ports
    }

    pub fn last_ports(&self) -> &PortSet {
        &self.last_ports
    }

    pub fn consecutive_stable_count(&self) -> u32 {
        self.consecutive_stable_count
    }

    pub fn required_stable_count(&self) -> u32 {
        self.required_stable_count
    }
}

/// Result of a bounded stabilization wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilizationOutcome {
    /// Stable set, or the last observed set when `stable` is false
    pub ports: PortSet,
    pub stable: bool,
    pub rounds: u32,
}

/// Sample ports until they settle or the round cap is hit.
///
/// Gives up after `timing.stabilize_max_rounds` and returns the last observed
/// set with `stable == false`; a premature restart beats hanging forever.
/// Failed probes are skipped rather than counted as an empty set.
pub async fn wait_for_stable_ports(
    probe: &dyn EnvironmentProbe,
    seed: PortSet,
    timing: &TimingConfig,
    shutdown: &ShutdownSignal,
) -> Result<StabilizationOutcome> {
    tracing::info!(ports = %format_ports(&seed), "Waiting for ports to stabilize");
    let mut state = StabilityState::from_timing(seed, timing);
    let max_rounds = timing.stabilize_max_rounds;

    for round in 1..=max_rounds {
        shutdown.sleep(timing.stabilize_interval()).await?;

        let current = match probe.probe_ports().await {
            Ok(ports) => ports,
            Err(e) => {
                tracing::warn!(round, "Port probe failed during stabilization: {}", e);
                continue;
            }
        };

        let previous_count = state.consecutive_stable_count();
        match state.observe(&current) {
            StabilityResult::Stable => {
                tracing::info!(ports = %format_ports(&current), round, "Ports stable");
                return Ok(StabilizationOutcome {
                    ports: current,
                    stable: true,
                    rounds: round,
                });
            }
            StabilityResult::Settling if state.consecutive_stable_count() > previous_count => {
                tracing::info!(
                    "Stable {}/{} - {} ports",
                    state.consecutive_stable_count(),
                    state.required_stable_count(),
                    current.len()
                );
            }
            StabilityResult::Settling => {
                tracing::info!(ports = %format_ports(&current), "Ports changing: {} ports", current.len());
            }
        }
    }

    tracing::warn!(
        rounds = max_rounds,
        ports = %format_ports(state.last_ports()),
        "Ports did not stabilize; proceeding with last observed set"
    );
    Ok(StabilizationOutcome {
        ports: state.last_ports().clone(),
        stable: false,
        rounds: max_rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::WatchdogError;
    use crate::probe::fake::FakeProbe;
    use proptest::prelude::*;
    use std::time::Duration;

    fn set(ports: &[u16]) -> PortSet {
        ports.iter().copied().collect()
    }

    #[test]
    fn three_equal_samples_after_seed_are_stable() {
        let mut state = StabilityState::new(set(&[100, 101]), 3, 2);
        assert_eq!(state.observe(&set(&[100, 101])), StabilityResult::Settling);
        assert_eq!(state.observe(&set(&[100, 101])), StabilityResult::Settling);
        assert_eq!(state.observe(&set(&[100, 101])), StabilityResult::Stable);
    }

    #[test]
    fn change_resets_count() {
        let mut state = StabilityState::new(set(&[100, 101]), 3, 2);
        state.observe(&set(&[100, 101]));
        state.observe(&set(&[100, 101]));
        assert_eq!(state.observe(&set(&[100, 102])), StabilityResult::Settling);
        assert_eq!(state.consecutive_stable_count(), 0);
        assert_eq!(state.last_ports(), &set(&[100, 102]));
    }

    #[test]
    fn single_port_never_stabilizes() {
        let mut state = StabilityState::new(set(&[100]), 3, 2);
        for _ in 0..10 {
            assert_eq!(state.observe(&set(&[100])), StabilityResult::Settling);
        }
        assert_eq!(state.consecutive_stable_count(), 0);
    }

    #[test]
    fn stays_stable_without_change() {
        let mut state = StabilityState::new(set(&[1, 2, 3]), 3, 2);
        for _ in 0..3 {
            state.observe(&set(&[1, 2, 3]));
        }
        for _ in 0..20 {
            assert_eq!(state.observe(&set(&[1, 2, 3])), StabilityResult::Stable);
        }
    }

    fn sample_strategy() -> impl Strategy<Value = Vec<PortSet>> {
        // A small alphabet so equal neighbours actually occur
        let one = prop_oneof![
            Just(set(&[100, 101])),
            Just(set(&[100, 102])),
            Just(set(&[100])),
            Just(set(&[])),
            Just(set(&[100, 101, 102])),
        ];
        prop::collection::vec(one, 1..40)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Stable iff each of the last `required` samples equals its predecessor
        /// (the seed precedes the first sample) and has at least two ports.
        #[test]
        fn stable_iff_last_required_transitions_equal(
            seed_idx in 0usize..5,
            samples in sample_strategy(),
            required in 1u32..5,
        ) {
            let seeds = [set(&[100, 101]), set(&[100, 102]), set(&[100]), set(&[]), set(&[100, 101, 102])];
            let seed = seeds[seed_idx].clone();
            let mut state = StabilityState::new(seed.clone(), required, 2);

            let mut history = vec![seed];
            for sample in &samples {
                let result = state.observe(sample);
                history.push(sample.clone());

                let n = required as usize;
                let expected = history.len() > n
                    && history[history.len() - n - 1..]
                        .windows(2)
                        .all(|w| w[0] == w[1] && w[1].len() >= 2);

                prop_assert_eq!(result == StabilityResult::Stable, expected);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_stable_at_five_second_spacing() {
        let probe = FakeProbe::new().with_ports(vec![Some(vec![100, 101])]);
        let timing = TimingConfig::default();
        let shutdown = ShutdownSignal::new();

        let start = tokio::time::Instant::now();
        let outcome = wait_for_stable_ports(&probe, set(&[100, 101]), &timing, &shutdown)
            .await
            .unwrap();

        assert!(outcome.stable);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.ports, set(&[100, 101]));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn churn_then_settle() {
        let probe = FakeProbe::new().with_ports(vec![
            Some(vec![100, 101]),
            Some(vec![200, 201]),
            None,
            Some(vec![200, 201]),
            Some(vec![200, 201]),
            Some(vec![200, 201]),
        ]);
        let timing = TimingConfig::default();

        let outcome = wait_for_stable_ports(&probe, set(&[100]), &timing, &ShutdownSignal::new())
            .await
            .unwrap();

        assert!(outcome.stable);
        assert_eq!(outcome.ports, set(&[200, 201]));
        assert_eq!(outcome.rounds, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_round_cap_with_last_set() {
        let probe = FakeProbe::new().with_ports(vec![Some(vec![100])]);
        let mut timing = TimingConfig::default();
        timing.stabilize_max_rounds = 4;

        let outcome = wait_for_stable_ports(&probe, set(&[]), &timing, &ShutdownSignal::new())
            .await
            .unwrap();

        assert!(!outcome.stable);
        assert_eq!(outcome.rounds, 4);
        assert_eq!(outcome.ports, set(&[100]));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_stabilization() {
        let probe = FakeProbe::new().with_ports(vec![Some(vec![100])]);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result =
            wait_for_stable_ports(&probe, set(&[]), &TimingConfig::default(), &shutdown).await;
        assert!(matches!(result, Err(WatchdogError::ShutdownRequested)));
    }
}
