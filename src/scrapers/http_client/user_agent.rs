//! Browser user agents, grouped by the family a request impersonates.

use crate::scrapers::config::{RequestPolicy, UserAgentFamily};

const CHROME_USER_AGENTS: &[&str] = &[
    // Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
];

const FIREFOX_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

const SAFARI_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
];

fn pick(agents: &[&'static str]) -> &'static str {
    agents[fastrand::usize(..agents.len())]
}

/// A random user agent string for `family`.
pub fn user_agent_for(family: UserAgentFamily) -> String {
    match family {
        UserAgentFamily::Chrome => pick(CHROME_USER_AGENTS).to_string(),
        UserAgentFamily::Firefox => pick(FIREFOX_USER_AGENTS).to_string(),
        UserAgentFamily::Safari => pick(SAFARI_USER_AGENTS).to_string(),
        UserAgentFamily::ChromeModified => pick(CHROME_USER_AGENTS).replace("Chrome", "Version"),
    }
}

/// Resolve the user agent for one attempt.
///
/// A profile that pinned a working `user_agent_string` keeps it for attempts
/// of its configured family; other attempts rotate through the family list.
pub fn resolve_user_agent(family: UserAgentFamily, policy: &RequestPolicy) -> String {
    match policy.working_details.user_agent_string.as_deref() {
        Some(pinned) if family == policy.user_agent_type => pinned.to_string(),
        _ => user_agent_for(family),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families() {
        assert!(user_agent_for(UserAgentFamily::Chrome).contains("Chrome/"));
        assert!(user_agent_for(UserAgentFamily::Firefox).contains("Firefox/"));
        assert!(user_agent_for(UserAgentFamily::Safari).contains("Version/"));
    }

    #[test]
    fn test_chrome_modified_rewrites_token() {
        let ua = user_agent_for(UserAgentFamily::ChromeModified);
        assert!(!ua.contains("Chrome"));
        assert!(ua.contains("Version/13"));
    }

    #[test]
    fn test_pinned_user_agent_applies_to_matching_family() {
        let mut policy = RequestPolicy::default();
        policy.user_agent_type = UserAgentFamily::Safari;
        policy.working_details.user_agent_string = Some("PinnedAgent/1.0".to_string());

        assert_eq!(
            resolve_user_agent(UserAgentFamily::Safari, &policy),
            "PinnedAgent/1.0"
        );
        assert_ne!(
            resolve_user_agent(UserAgentFamily::Firefox, &policy),
            "PinnedAgent/1.0"
        );
    }
}
