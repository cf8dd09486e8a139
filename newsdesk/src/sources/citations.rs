use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{info, warn};

use super::Source;

/// What happened to the citations of one article
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CitationStats {
    /// Valid source numbers in order of first citation
    pub cited_numbers_original: Vec<usize>,
    /// Original number -> new number
    pub citation_mapping: BTreeMap<usize, usize>,
    pub total_sources_provided: usize,
    pub total_sources_returned: usize,
    pub extra_sources_added: bool,
    pub extra_sources_count: usize,
    pub sources_filtered: usize,
    pub sources_removed: usize,
    /// Returned source numbers that were never cited
    pub unused_numbers: Vec<usize>,
    /// Markers pointing at no returned source, removed from the text
    pub dangling_markers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationReport {
    pub text: String,
    pub sources: Vec<Source>,
    pub stats: CitationStats,
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // An optional single leading space is captured so a dropped marker takes it along.
    RE.get_or_init(|| Regex::new(r"( ?)\[(\d+)\]").expect("valid citation regex"))
}

/// Keep only the sources the article cites and renumber its `[n]` markers.
///
/// `sources` are numbered 1..N in the order the provider returned them.
/// Cited sources are reordered by first citation and renumbered from 1, so the
/// text reads `[1]`, `[2]`, ... in order. `sources_provided` is how many
/// sources were handed to the provider; a larger returned list means the
/// provider added its own.
pub fn renumber_citations(
    article_text: &str,
    sources: &[Source],
    sources_provided: usize,
) -> CitationReport {
    let re = citation_re();
    let returned = sources.len();

    let mut cited = Vec::new();
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    for caps in re.captures_iter(article_text) {
        let Ok(number) = caps[2].parse::<usize>() else {
            continue;
        };
        if (1..=returned).contains(&number) && !mapping.contains_key(&number) {
            cited.push(number);
            mapping.insert(number, cited.len());
        }
    }

    let mut dangling = 0usize;
    let text = re
        .replace_all(article_text, |caps: &Captures| {
            let new_number = caps[2]
                .parse::<usize>()
                .ok()
                .and_then(|n| mapping.get(&n).copied());
            match new_number {
                Some(n) => format!("{}[{}]", &caps[1], n),
                None => {
                    dangling += 1;
                    String::new()
                }
            }
        })
        .into_owned();

    let kept: Vec<Source> = cited
        .iter()
        .enumerate()
        .map(|(idx, &old)| {
            let mut source = sources[old - 1].clone();
            source.display_index = Some(idx + 1);
            source
        })
        .collect();

    let unused_numbers: Vec<usize> = (1..=returned).filter(|n| !mapping.contains_key(n)).collect();
    let extra_sources_count = returned.saturating_sub(sources_provided);

    let stats = CitationStats {
        cited_numbers_original: cited.clone(),
        citation_mapping: mapping.into_iter().collect(),
        total_sources_provided: sources_provided,
        total_sources_returned: returned,
        extra_sources_added: extra_sources_count > 0,
        extra_sources_count,
        sources_filtered: kept.len(),
        sources_removed: returned - kept.len(),
        unused_numbers,
        dangling_markers: dangling,
    };

    info!(
        cited = ?stats.cited_numbers_original,
        kept = stats.sources_filtered,
        returned = stats.total_sources_returned,
        removed = stats.sources_removed,
        "renumbered citations"
    );
    if stats.extra_sources_added {
        warn!(
            provided = sources_provided,
            returned,
            extra = extra_sources_count,
            "provider added sources that were not supplied"
        );
    }
    if dangling > 0 {
        warn!(dangling, "removed citation markers with no matching source");
    }

    CitationReport {
        text,
        sources: kept,
        stats,
    }
}
