use std::collections::HashSet;

use url::Url;

/// Normalize a domain or URL to a bare lowercase hostname.
///
/// Scheme, userinfo, port, path, trailing dot and any leading `www.` labels are
/// removed. Input without a scheme is treated the same as input with one, and
/// the result is a fixed point: normalizing it again returns it unchanged.
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // `https:/x.com` and friends parse with a host; `x.com:8080` parses as
    // scheme `x.com` with none and goes through the prefixed form instead.
    let host = parsed_host(trimmed)
        .or_else(|| parsed_host(&format!("http://{}", trimmed.trim_start_matches('/'))))
        .unwrap_or_else(|| fallback_host(trimmed));

    let mut host = host.trim_end_matches('.').to_ascii_lowercase();
    while let Some(rest) = host.strip_prefix("www.") {
        host = rest.to_string();
    }
    host
}

fn parsed_host(candidate: &str) -> Option<String> {
    Url::parse(candidate)
        .ok()
        .and_then(|u| u.host_str().filter(|h| !h.is_empty()).map(str::to_string))
}

/// Best-effort host extraction for strings the URL parser rejects
fn fallback_host(raw: &str) -> String {
    let without_scheme = match raw.find("://") {
        Some(idx) => &raw[idx + 3..],
        None => raw,
    };
    let authority = without_scheme
        .trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default().trim().to_string()
}

/// Set of normalized domains matched by exact name or dot-suffix.
#[derive(Debug, Clone, Default)]
pub struct DomainSet {
    entries: HashSet<String>,
}

impl DomainSet {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|e| normalize_domain(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        Self { entries }
    }

    /// True when `domain` (already normalized) equals an entry or is a
    /// subdomain of one.
    pub fn matches(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        let mut rest = domain;
        loop {
            if self.entries.contains(rest) {
                return true;
            }
            match rest.find('.') {
                Some(idx) => rest = &rest[idx + 1..],
                None => return false,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
