use std::collections::HashSet;

use newsdesk::sources::{normalize_domain, CredibilityTier, Source, SourceFilter};

fn filter() -> SourceFilter {
    SourceFilter::new(
        ["reuters.com", "apnews.com", "bbc.co.uk", "edu"],
        ["blacklisted.com", "contentfarm.net"],
    )
}

/// A mix of duplicates, casing, schemes, subdomains and blacklisted entries
fn noisy_inputs() -> Vec<Vec<Source>> {
    vec![
        vec![],
        vec![
            Source::new("www.Example.com", 5.0),
            Source::new("example.com", 3.0),
            Source::new("blacklisted.com", 9.0),
        ],
        vec![
            Source::new("https://www.reuters.com/world/1", 9.0),
            Source::new("REUTERS.com", 8.0),
            Source::new("http://news.bbc.co.uk/x", 7.0),
            Source::new("bbc.co.uk", 6.0),
            Source::new("cs.stanford.edu", 5.0),
            Source::new("https://a.contentfarm.net/p", 4.0),
            Source::new("example.org:8080", 3.0),
        ],
        vec![Source::new("blacklisted.com", 1.0), Source::new("contentfarm.net", 1.0)],
        vec![Source::new("", 1.0), Source::new("www.", 2.0), Source::new("www.", 3.0)],
    ]
}

#[test]
fn www_variants_collapse_to_first_occurrence() {
    let f = SourceFilter::new(Vec::<String>::new(), ["blacklisted.com"]);
    let out = f.filter_and_renumber(vec![
        Source::new("www.Example.com", 5.0),
        Source::new("example.com", 3.0),
        Source::new("blacklisted.com", 9.0),
    ]);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].domain, "example.com");
    assert_eq!(out[0].raw_score, 5.0);
    assert_eq!(out[0].display_index, Some(1));
}

#[test]
fn output_has_no_duplicates_and_no_blacklisted() {
    let f = filter();
    for input in noisy_inputs() {
        let out = f.filter_and_renumber(input);
        let mut seen = HashSet::new();
        for source in &out {
            assert!(seen.insert(source.domain.clone()), "duplicate {}", source.domain);
            assert_ne!(source.credibility_tier, CredibilityTier::Blacklisted);
            assert!(!f.is_blacklisted(&source.domain));
        }
    }
}

#[test]
fn indices_are_sequential_from_one() {
    let f = filter();
    for input in noisy_inputs() {
        let out = f.filter_and_renumber(input);
        let indices: Vec<_> = out.iter().map(|s| s.display_index).collect();
        let expected: Vec<_> = (1..=out.len()).map(Some).collect();
        assert_eq!(indices, expected);
    }
}

#[test]
fn filtering_is_idempotent() {
    let f = filter();
    for input in noisy_inputs() {
        let once = f.filter_and_renumber(input);
        let twice = f.filter_and_renumber(once.clone());
        assert_eq!(twice, once);
    }
}

#[test]
fn survivors_keep_relevance_order_and_tiers() {
    let out = filter().filter_and_renumber(noisy_inputs().remove(2));
    let domains: Vec<_> = out.iter().map(|s| s.domain.as_str()).collect();
    assert_eq!(
        domains,
        vec!["reuters.com", "news.bbc.co.uk", "bbc.co.uk", "cs.stanford.edu", "example.org"]
    );
    let tiers: Vec<_> = out.iter().map(|s| s.credibility_tier).collect();
    assert_eq!(
        tiers,
        vec![
            CredibilityTier::Credible,
            CredibilityTier::Credible,
            CredibilityTier::Credible,
            CredibilityTier::Credible,
            CredibilityTier::Neutral,
        ]
    );
    assert_eq!(out[0].raw_score, 9.0);
}

#[test]
fn scheme_less_domains_match_full_urls() {
    assert_eq!(normalize_domain("www.Example.com"), normalize_domain("https://www.example.com/a"));
    assert_eq!(normalize_domain("example.com/path"), "example.com");
}

#[test]
fn upstream_tier_is_rederived() {
    let mut stale = Source::new("contentfarm.net", 1.0);
    stale.credibility_tier = CredibilityTier::Credible;
    let mut wrongly_flagged = Source::new("apnews.com", 1.0);
    wrongly_flagged.credibility_tier = CredibilityTier::Blacklisted;

    let out = filter().filter_and_renumber(vec![stale, wrongly_flagged]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].domain, "apnews.com");
    assert_eq!(out[0].credibility_tier, CredibilityTier::Credible);
}

#[test]
fn filtered_sources_round_trip_as_json() {
    let out = filter().filter_and_renumber(vec![Source::new("reuters.com", 2.0).with_title("R")]);
    let json = serde_json::to_value(&out).expect("serialize");
    assert_eq!(json[0]["credibility_tier"], "credible");
    assert_eq!(json[0]["display_index"], 1);
    let back: Vec<Source> = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, out);
}

#[test]
fn malformed_scheme_urls_are_classified_by_their_host() {
    let f = SourceFilter::new(Vec::<String>::new(), ["bad.com"]);
    let out = f.filter_and_renumber(vec![
        Source::new("", 3.0).with_url("https:/bad.com/x"),
        Source::new("https:/good.org/y", 2.0),
        Source::new("http:/other.net/z", 1.0),
    ]);

    let domains: Vec<_> = out.iter().map(|s| s.domain.as_str()).collect();
    assert_eq!(domains, vec!["good.org", "other.net"]);
    assert!(out.iter().all(|s| s.credibility_tier == CredibilityTier::Neutral));
    assert_eq!(out[1].display_index, Some(2));
}
