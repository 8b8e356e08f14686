//! Fixed escalation ladder for fetch attempts.

use std::time::Duration;

use crate::scrapers::config::{RequestPolicy, UserAgentFamily};

/// Parameters for one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptDescriptor {
    pub timeout: Duration,
    /// Pause before the attempt; not applied to the first attempt made.
    pub delay: Duration,
    pub user_agent: UserAgentFamily,
    pub use_proxy: bool,
}

const fn step(timeout: u64, delay: u64, user_agent: UserAgentFamily, use_proxy: bool) -> AttemptDescriptor {
    AttemptDescriptor {
        timeout: Duration::from_secs(timeout),
        delay: Duration::from_secs(delay),
        user_agent,
        use_proxy,
    }
}

/// Attempts in escalation order: longer timeouts, longer pauses, different
/// browser families, then proxies.
pub const ESCALATION_LADDER: &[AttemptDescriptor] = &[
    step(15, 1, UserAgentFamily::Chrome, false),
    step(25, 3, UserAgentFamily::Firefox, false),
    step(30, 5, UserAgentFamily::Safari, false),
    step(35, 7, UserAgentFamily::ChromeModified, true),
    step(40, 10, UserAgentFamily::Firefox, true),
];

/// The attempts a profile's policy allows, in order.
pub fn ladder_for(policy: &RequestPolicy) -> Vec<AttemptDescriptor> {
    let proxies_allowed = policy.use_proxy && policy.has_proxy();
    let floor = policy.timeout_secs.map(Duration::from_secs);

    let mut attempts: Vec<AttemptDescriptor> = ESCALATION_LADDER
        .iter()
        .filter(|a| !a.use_proxy || proxies_allowed)
        .map(|a| AttemptDescriptor {
            timeout: floor.map_or(a.timeout, |f| a.timeout.max(f)),
            ..*a
        })
        .collect();

    if let Some(max) = policy.max_attempts {
        attempts.truncate(max.max(1));
    }
    attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_steps_need_proxies() {
        let mut policy = RequestPolicy::default();
        assert_eq!(ladder_for(&policy).len(), 3);

        policy.use_proxy = true;
        assert_eq!(ladder_for(&policy).len(), 3);

        policy.proxies = vec!["http://127.0.0.1:8080".to_string()];
        let ladder = ladder_for(&policy);
        assert_eq!(ladder.len(), 5);
        assert!(ladder[3].use_proxy);
        assert_eq!(ladder[3].user_agent, UserAgentFamily::ChromeModified);
    }

    #[test]
    fn test_timeout_floor_and_truncation() {
        let mut policy = RequestPolicy::default();
        policy.timeout_secs = Some(28);
        policy.max_attempts = Some(2);

        let ladder = ladder_for(&policy);
        assert_eq!(ladder.len(), 2);
        assert_eq!(ladder[0].timeout, Duration::from_secs(28));
        assert_eq!(ladder[1].timeout, Duration::from_secs(28));

        policy.max_attempts = None;
        assert_eq!(ladder_for(&policy)[2].timeout, Duration::from_secs(30));
    }
}
