//! Host health transitions.
//!
//! # States
//! - Up: host receives traffic
//! - Down (failed): excluded until `failed_timeout` has elapsed since `lastfail`
//! - Down (manual): `lastfail == 0`, excluded until an operator brings it up
//!
//! # State Transitions
//! ```text
//! Up → Down:   committed failcount >= pool.max_fails
//! Down → Up:   now >= lastfail + pool.failed_timeout (reconciler only)
//! ```

use crate::load_balancer::Host;

/// Apply one committed failure at `now`. Returns `true` if this flipped the host down.
///
/// A manually downed host keeps `lastfail == 0` so a late commit cannot put it
/// back on the reconciler's revival schedule.
pub fn record_failure(host: &mut Host, max_fails: u32, now: u64) -> bool {
    host.failcount = host.failcount.saturating_add(1);
    if host.is_manually_down() {
        return false;
    }
    host.lastfail = now;
    if host.up && host.failcount >= max_fails {
        host.up = false;
        return true;
    }
    false
}

/// Whether a failed host has served its down time.
pub fn revival_due(host: &Host, failed_timeout: u64, now: u64) -> bool {
    !host.up && host.lastfail != 0 && now >= host.lastfail.saturating_add(failed_timeout)
}

/// Bring a failed host back up once its down time has elapsed.
/// Returns `true` if the host changed.
pub fn revive_if_due(host: &mut Host, failed_timeout: u64, now: u64) -> bool {
    if !revival_due(host, failed_timeout, now) {
        return false;
    }
    host.up = true;
    host.failcount = 0;
    host.lastfail = 0;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_crossing() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        host.failcount = 2;
        host.lastfail = 900;

        assert!(record_failure(&mut host, 3, 1000));
        assert!(!host.up);
        assert_eq!(host.failcount, 3);
        assert_eq!(host.lastfail, 1000);
    }

    #[test]
    fn test_failures_below_threshold_keep_host_up() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        assert!(!record_failure(&mut host, 3, 10));
        assert!(!record_failure(&mut host, 3, 11));
        assert!(host.up);
        assert_eq!(host.failcount, 2);
    }

    #[test]
    fn test_failure_on_down_host_does_not_reflip() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        assert!(record_failure(&mut host, 1, 10));
        assert!(!record_failure(&mut host, 1, 20));
        assert_eq!(host.failcount, 2);
        assert_eq!(host.lastfail, 20);
    }

    #[test]
    fn test_revive_after_timeout() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        record_failure(&mut host, 1, 1000);

        assert!(!revive_if_due(&mut host, 60, 1059));
        assert!(!host.up);

        assert!(revive_if_due(&mut host, 60, 1060));
        assert!(host.up);
        assert_eq!(host.failcount, 0);
        assert_eq!(host.lastfail, 0);
    }

    #[test]
    fn test_manual_down_is_never_revived() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        host.up = false;
        assert!(!revive_if_due(&mut host, 0, u64::MAX));
        assert!(!host.up);
    }

    #[test]
    fn test_up_host_untouched() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        host.failcount = 1;
        host.lastfail = 5;
        assert!(!revive_if_due(&mut host, 1, 100));
        assert_eq!(host.failcount, 1);
    }

    #[test]
    fn test_late_failure_keeps_manual_down() {
        let mut host = Host::new("web1", "10.0.0.1", 80, 1);
        host.up = false;
        host.lastfail = 0;

        assert!(!record_failure(&mut host, 3, 500));
        assert_eq!(host.lastfail, 0);
        assert_eq!(host.failcount, 1);
        assert!(!revive_if_due(&mut host, 60, 10_000));
        assert!(!host.up);
    }
}
