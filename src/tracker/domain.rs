use std::sync::Arc;

use url::{Host, Url};

/// Hosts that are never tracked: browser-internal pseudo hosts.
pub const DEFAULT_BLOCKLIST: [&str; 2] = ["extensions", "newtab"];

/// Maps a page URL to the domain its time is booked under.
#[derive(Debug, Clone)]
pub struct DomainResolver {
    blocklist: Vec<String>,
}

impl Default for DomainResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKLIST.iter().map(|v| v.to_string()))
    }
}

impl DomainResolver {
    pub fn new(blocklist: impl IntoIterator<Item = String>) -> Self {
        Self {
            blocklist: blocklist
                .into_iter()
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    /// Returns the hostname of an http(s) URL with a leading `www.` dropped. `None` means "not
    /// trackable": unparseable input, internal browser pages, or a blocklisted host or any of its
    /// subdomains.
    pub fn resolve(&self, url: &str) -> Option<Arc<str>> {
        let url = Url::parse(url).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = match url.host()? {
            Host::Domain(domain) => domain.trim_end_matches('.').to_ascii_lowercase(),
            Host::Ipv4(address) => address.to_string(),
            Host::Ipv6(address) => address.to_string(),
        };
        let host = host.strip_prefix("www.").unwrap_or(host.as_str());
        if host.is_empty() || self.is_blocked(host) {
            return None;
        }
        Some(host.into())
    }

    fn is_blocked(&self, host: &str) -> bool {
        self.blocklist.iter().any(|blocked| {
            host == blocked
                || host
                    .strip_suffix(blocked.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
