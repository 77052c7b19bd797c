//! Per-domain request spacing.
//!
//! The limiter never sleeps. [`DomainRateLimiter::try_acquire`] either
//! records a request and returns `true`, or returns `false` and leaves the
//! caller to defer the item to a later cycle. Deferral keeps one slow domain
//! from stalling every other domain in the same cycle.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct DomainRateState {
    last_request: Instant,
}

#[derive(Debug)]
pub struct DomainRateLimiter {
    default_interval: Duration,
    overrides: HashMap<String, Duration>,
    states: HashMap<String, DomainRateState>,
}

impl DomainRateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            overrides: HashMap::new(),
            states: HashMap::new(),
        }
    }

    /// Build from `rate_limit.default_interval_secs` and `rate_limit.domains`.
    pub fn from_config(default_secs: u64, domains: &BTreeMap<String, u64>) -> Self {
        let mut limiter = Self::new(Duration::from_secs(default_secs));
        for (domain, secs) in domains {
            limiter.set_interval(domain, Duration::from_secs(*secs));
        }
        limiter
    }

    pub fn set_interval(&mut self, domain: &str, interval: Duration) {
        self.overrides.insert(domain.to_ascii_lowercase(), interval);
    }

    /// Minimum spacing for `domain`. A configured parent domain applies to
    /// its subdomains (`reuters.com` covers `uk.reuters.com`).
    pub fn interval_for(&self, domain: &str) -> Duration {
        let domain = domain.to_ascii_lowercase();
        let mut candidate = domain.as_str();
        loop {
            if let Some(interval) = self.overrides.get(candidate) {
                return *interval;
            }
            match candidate.split_once('.') {
                Some((_, rest)) if rest.contains('.') => candidate = rest,
                _ => return self.default_interval,
            }
        }
    }

    /// Time left before `domain` may be requested again, zero if ready.
    pub fn ready_in(&self, domain: &str, now: Instant) -> Duration {
        match self.states.get(&domain.to_ascii_lowercase()) {
            Some(state) => {
                let elapsed = now.saturating_duration_since(state.last_request);
                self.interval_for(domain).saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    /// Record a request to `domain` at `now` if its interval has passed.
    pub fn try_acquire(&mut self, domain: &str, now: Instant) -> bool {
        if !self.ready_in(domain, now).is_zero() {
            return false;
        }
        self.states.insert(
            domain.to_ascii_lowercase(),
            DomainRateState { last_request: now },
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_request_within_interval_is_refused() {
        let mut limiter = DomainRateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(limiter.try_acquire("reuters.com", t0));
        assert!(!limiter.try_acquire("reuters.com", t0 + Duration::from_secs(2)));
        assert_eq!(
            limiter.ready_in("reuters.com", t0 + Duration::from_secs(2)),
            Duration::from_secs(3)
        );
        assert!(limiter.try_acquire("reuters.com", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_domains_are_independent() {
        let mut limiter = DomainRateLimiter::new(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.try_acquire("a.com", t0));
        assert!(limiter.try_acquire("b.com", t0));
        assert!(!limiter.try_acquire("a.com", t0));
    }

    #[test]
    fn test_override_applies_to_subdomains() {
        let mut domains = BTreeMap::new();
        domains.insert("reuters.com".to_string(), 30);
        let limiter = DomainRateLimiter::from_config(5, &domains);
        assert_eq!(limiter.interval_for("uk.reuters.com"), Duration::from_secs(30));
        assert_eq!(limiter.interval_for("Reuters.com"), Duration::from_secs(30));
        assert_eq!(limiter.interval_for("bloomberg.com"), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_interval_never_refuses() {
        let mut limiter = DomainRateLimiter::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(limiter.try_acquire("x.com", t0));
        assert!(limiter.try_acquire("x.com", t0));
    }
}
