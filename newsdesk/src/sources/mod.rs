use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use common::SourcesConfig;

use crate::error::ContractError;

pub mod citations;
pub mod domain;
pub mod upstream;

pub use citations::{renumber_citations, CitationReport, CitationStats};
pub use domain::{normalize_domain, DomainSet};

/// Credibility classification derived from the configured domain lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredibilityTier {
    Credible,
    #[default]
    Neutral,
    Blacklisted,
}

impl fmt::Display for CredibilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredibilityTier::Credible => "credible",
            CredibilityTier::Neutral => "neutral",
            CredibilityTier::Blacklisted => "blacklisted",
        })
    }
}

/// One citation candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub credibility_tier: CredibilityTier,
    pub raw_score: f64,
    /// 1-based position in a filtered list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_index: Option<usize>,
}

impl Source {
    pub fn new(domain: impl Into<String>, raw_score: f64) -> Self {
        Self {
            domain: domain.into(),
            url: None,
            title: None,
            credibility_tier: CredibilityTier::default(),
            raw_score,
            display_index: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Inbound candidate as supplied by an upstream provider or API client.
/// Either `domain` or `url` must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceCandidate {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "raw_score")]
    pub score: Option<f64>,
}

impl TryFrom<SourceCandidate> for Source {
    type Error = ContractError;

    fn try_from(candidate: SourceCandidate) -> Result<Self, Self::Error> {
        let url = candidate.url.filter(|u| !u.trim().is_empty());
        let domain = candidate
            .domain
            .filter(|d| !d.trim().is_empty())
            .or_else(|| url.clone())
            .ok_or(ContractError::MissingDomain)?;

        let raw_score = candidate.score.unwrap_or(0.0);
        if !raw_score.is_finite() {
            return Err(ContractError::InvalidScore { domain });
        }

        Ok(Source {
            domain,
            url,
            title: candidate.title.filter(|t| !t.trim().is_empty()),
            credibility_tier: CredibilityTier::default(),
            raw_score,
            display_index: None,
        })
    }
}

/// Convert a batch of candidates, failing on the first invalid one
pub fn validate_candidates(candidates: Vec<SourceCandidate>) -> Result<Vec<Source>, ContractError> {
    candidates.into_iter().map(Source::try_from).collect()
}

/// Blacklist + credible-list lookup and the filtering pipeline built on it.
///
/// Holds only immutable lookup tables, so one filter can be shared freely
/// between threads.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    credible: DomainSet,
    blacklist: DomainSet,
}

impl SourceFilter {
    pub fn new<C, B, S, T>(credible: C, blacklist: B) -> Self
    where
        C: IntoIterator<Item = S>,
        B: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            credible: DomainSet::new(credible),
            blacklist: DomainSet::new(blacklist),
        }
    }

    pub fn from_config(config: &SourcesConfig) -> Self {
        Self::new(&config.credible, &config.blacklist)
    }

    /// Tier for a raw or normalized domain. The blacklist wins over the credible list.
    pub fn classify(&self, domain: &str) -> CredibilityTier {
        let domain = normalize_domain(domain);
        if self.blacklist.matches(&domain) {
            CredibilityTier::Blacklisted
        } else if self.credible.matches(&domain) {
            CredibilityTier::Credible
        } else {
            CredibilityTier::Neutral
        }
    }

    pub fn is_blacklisted(&self, domain: &str) -> bool {
        self.classify(domain) == CredibilityTier::Blacklisted
    }

    /// Normalize, classify, drop blacklisted, dedupe by domain (first wins)
    /// and number the survivors 1..N in input order.
    ///
    /// A source whose domain normalizes to nothing falls back to its url; if
    /// that is empty too the source cannot be cited and is dropped.
    pub fn filter_and_renumber<I>(&self, sources: I) -> Vec<Source>
    where
        I: IntoIterator<Item = Source>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let (mut blacklisted, mut duplicates, mut empty) = (0usize, 0usize, 0usize);

        for mut source in sources {
            let mut domain = normalize_domain(&source.domain);
            if domain.is_empty() {
                domain = source.url.as_deref().map(normalize_domain).unwrap_or_default();
            }
            if domain.is_empty() {
                empty += 1;
                continue;
            }

            let tier = self.classify(&domain);
            if tier == CredibilityTier::Blacklisted {
                blacklisted += 1;
                continue;
            }
            if !seen.insert(domain.clone()) {
                duplicates += 1;
                continue;
            }

            source.domain = domain;
            source.credibility_tier = tier;
            source.display_index = Some(out.len() + 1);
            out.push(source);
        }

        debug!(
            kept = out.len(),
            blacklisted, duplicates, empty, "filtered source candidates"
        );
        out
    }

    /// Split sources into (credible, neutral) groups, keeping order.
    /// Blacklisted entries are discarded.
    pub fn partition(&self, sources: &[Source]) -> (Vec<Source>, Vec<Source>) {
        let mut credible = Vec::new();
        let mut neutral = Vec::new();
        for source in sources {
            match self.classify(&source.domain) {
                CredibilityTier::Credible => credible.push(source.clone()),
                CredibilityTier::Neutral => neutral.push(source.clone()),
                CredibilityTier::Blacklisted => {}
            }
        }
        (credible, neutral)
    }
}
