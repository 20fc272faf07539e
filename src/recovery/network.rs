//! Bounded wait for network reachability.
use std::time::Duration;

/// Something that can tell whether the network is up.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkProbe {
    /// One reachability check.
    fn reachable(&self) -> bool;

    /// Block for `duration` between checks.
    fn pause(&self, duration: Duration);
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A probe succeeded after `waited`.
    Reachable {
        /// Time spent waiting before the successful probe.
        waited: Duration,
    },
    /// The ceiling was hit without a successful probe.
    TimedOut {
        /// Total time waited.
        waited: Duration,
    },
}

impl WaitOutcome {
    /// Whether the network came up.
    #[must_use]
    pub const fn is_reachable(self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

/// Probe every `interval` until reachable or `ceiling` has elapsed.
///
/// The caller proceeds either way; a timeout only means downloads are
/// likely to fail.
pub fn wait_for_network<P: NetworkProbe + ?Sized>(
    probe: &P,
    interval: Duration,
    ceiling: Duration,
) -> WaitOutcome {
    let interval = if interval.is_zero() {
        Duration::from_secs(1)
    } else {
        interval
    };
    let mut waited = Duration::ZERO;
    loop {
        if probe.reachable() {
            return WaitOutcome::Reachable { waited };
        }
        if waited >= ceiling {
            tracing::warn!(
                "network unreachable after {}s, continuing anyway",
                waited.as_secs()
            );
            return WaitOutcome::TimedOut { waited };
        }
        let step = interval.min(ceiling.saturating_sub(waited));
        tracing::debug!("network unreachable, retrying in {}s", step.as_secs());
        probe.pause(step);
        waited += step;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn returns_immediately_when_up() {
        let mut probe = MockNetworkProbe::new();
        probe.expect_reachable().times(1).return_const(true);
        probe.expect_pause().never();
        let outcome = wait_for_network(&probe, Duration::from_secs(10), Duration::from_secs(300));
        assert_eq!(outcome, WaitOutcome::Reachable { waited: Duration::ZERO });
    }

    #[test]
    fn polls_until_reachable() {
        let mut probe = MockNetworkProbe::new();
        let mut seq = Sequence::new();
        for up in [false, false, true] {
            probe
                .expect_reachable()
                .times(1)
                .in_sequence(&mut seq)
                .return_const(up);
            if !up {
                probe
                    .expect_pause()
                    .withf(|d| *d == Duration::from_secs(10))
                    .times(1)
                    .in_sequence(&mut seq)
                    .return_const(());
            }
        }
        let outcome = wait_for_network(&probe, Duration::from_secs(10), Duration::from_secs(300));
        assert_eq!(outcome, WaitOutcome::Reachable { waited: Duration::from_secs(20) });
    }

    #[test]
    fn gives_up_at_ceiling() {
        let mut probe = MockNetworkProbe::new();
        probe.expect_reachable().times(4).return_const(false);
        probe.expect_pause().times(3).return_const(());
        let outcome = wait_for_network(&probe, Duration::from_secs(10), Duration::from_secs(25));
        assert_eq!(outcome, WaitOutcome::TimedOut { waited: Duration::from_secs(25) });
        assert!(!outcome.is_reachable());
    }
}
