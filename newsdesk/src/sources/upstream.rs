//! Turning upstream search responses into source candidates, the discover
//! step that asks the search model for articles on a topic, and the summarize
//! step that writes an article from trusted and uncertain sources.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    renumber_citations, validate_candidates, CitationStats, Source, SourceCandidate, SourceFilter,
};
use crate::llm::{ChatRequest, ChatTurn, LlmProvider, LlmRequest, Role, SearchHit};

/// Rank-based score: the first of `total` results scores `total`, the last scores 1.
fn rank_score(rank: usize, total: usize) -> f64 {
    (total - rank) as f64
}

/// Candidates from structured search hits, keeping provider order
pub fn candidates_from_hits(hits: &[SearchHit], limit: usize) -> Vec<SourceCandidate> {
    let hits: Vec<&SearchHit> = hits
        .iter()
        .filter(|h| !h.url.trim().is_empty())
        .take(limit)
        .collect();
    let total = hits.len();
    hits.into_iter()
        .enumerate()
        .map(|(rank, hit)| SourceCandidate {
            domain: None,
            url: Some(hit.url.trim().to_string()),
            title: hit.title.clone(),
            score: Some(rank_score(rank, total)),
        })
        .collect()
}

/// Candidates from free text listing URLs separated by commas or whitespace.
/// Used when a provider answers in prose instead of returning search results.
pub fn candidates_from_content(content: &str, limit: usize) -> Vec<SourceCandidate> {
    let urls: Vec<&str> = content
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim_matches(|c: char| matches!(c, '<' | '>' | '(' | ')' | '"' | '\'')))
        .filter(|s| s.starts_with("http"))
        .take(limit)
        .collect();
    let total = urls.len();
    urls.into_iter()
        .enumerate()
        .map(|(rank, url)| SourceCandidate {
            domain: None,
            url: Some(url.to_string()),
            title: None,
            score: Some(rank_score(rank, total)),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search_results: Option<Vec<SearchHit>>,
    #[serde(default)]
    citations: Option<Vec<String>>,
    #[serde(default)]
    choices: Option<Vec<SearchChoice>>,
}

#[derive(Debug, Deserialize)]
struct SearchChoice {
    message: SearchMessage,
}

#[derive(Debug, Deserialize)]
struct SearchMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a raw chat-completions style search response.
///
/// Looks at `search_results` first, then the bare `citations` url list, then
/// urls listed in the first choice's content.
pub fn parse_search_results(body: &str, limit: usize) -> Result<Vec<SourceCandidate>> {
    let resp: SearchResponse =
        serde_json::from_str(body).context("Failed to parse search response JSON")?;

    let search_results = resp.search_results.unwrap_or_default();
    if !search_results.is_empty() {
        return Ok(candidates_from_hits(&search_results, limit));
    }
    let citations = resp.citations.unwrap_or_default();
    if !citations.is_empty() {
        let hits: Vec<SearchHit> = citations
            .into_iter()
            .map(|url| SearchHit { url, title: None })
            .collect();
        return Ok(candidates_from_hits(&hits, limit));
    }
    let choices = resp.choices.unwrap_or_default();
    let content = choices
        .first()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or_default();
    debug!("search response had no structured results, parsing content");
    Ok(candidates_from_content(content, limit))
}

fn discovery_prompt(topic: &str, count: usize) -> String {
    format!(
        r#"Find recent news articles about: {topic}

RULES:
- Articles must be from the last 3 months
- Prefer established, credible publications
- Return at most {count} articles
- Output only article URLs separated by commas, no descriptions

Example:
https://example.com/article1, https://example.com/article2"#
    )
}

/// Ask the search model for articles on `topic` and return them filtered and
/// numbered.
pub async fn discover_sources<P: LlmProvider + ?Sized>(
    provider: &P,
    filter: &SourceFilter,
    topic: &str,
    count: usize,
) -> Result<Vec<Source>> {
    let response = provider
        .generate(LlmRequest {
            prompt: discovery_prompt(topic, count),
            max_tokens: None,
            temperature: Some(0.2),
            timeout_seconds: Some(60),
        })
        .await
        .context("Source discovery request failed")?;

    let candidates = if response.search_hits.is_empty() {
        candidates_from_content(&response.content, count)
    } else {
        candidates_from_hits(&response.search_hits, count)
    };
    let requested = candidates.len();

    let sources = validate_candidates(candidates).context("Upstream returned an invalid source")?;
    let filtered = filter.filter_and_renumber(sources);
    info!(topic, requested, kept = filtered.len(), "discovered sources");
    Ok(filtered)
}

const WRITER_SYSTEM_PROMPT: &str = "You are a professional research journalist writing \
comprehensive articles. Write directly without explaining your process.";

/// Article written from a set of sources, with citations renumbered to the
/// sources it actually cites
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub topic: String,
    pub title: String,
    pub text: String,
    pub tags: Vec<String>,
    pub sources: Vec<Source>,
    pub stats: CitationStats,
}

fn push_source_lines(prompt: &mut String, sources: &[Source], first_number: usize) {
    for (offset, source) in sources.iter().enumerate() {
        let label = source.title.as_deref().unwrap_or(&source.domain);
        let link = source.url.as_deref().unwrap_or(&source.domain);
        prompt.push_str(&format!("[{}] {}: {}\n", first_number + offset, label, link));
    }
}

/// Writer prompt listing trusted sources first, then uncertain ones, numbered
/// continuously so `[n]` in the reply points into `credible ++ neutral`.
pub fn summary_prompt(topic: &str, credible: &[Source], neutral: &[Source]) -> String {
    let mut sources_text = String::new();
    if !credible.is_empty() {
        sources_text.push_str("TRUSTED SOURCES (prioritize these):\n");
        push_source_lines(&mut sources_text, credible, 1);
    }
    if !neutral.is_empty() {
        if !sources_text.is_empty() {
            sources_text.push('\n');
        }
        sources_text.push_str("UNCERTAIN SOURCES (use for additional context):\n");
        push_source_lines(&mut sources_text, neutral, credible.len() + 1);
    }

    format!(
        r#"Write an article summarizing and explaining {topic}

Use information from these sources:

{sources_text}
RULES:
- Synthesize information from the sources above
- Prioritize TRUSTED sources; use UNCERTAIN sources only for additional context
- When information conflicts, prefer TRUSTED sources
- Include specific details, quotes and statistics
- Stay neutral and write for a general reader
- Cite with the source number in brackets, e.g. [3]

STRUCTURE:
- 800-1200 words
- Start with a compelling title without citations
- Use 2-4 section headers wrapped in double asterisks
- End with 5-10 comma-separated tags

FORMAT:
[Title]

[Article]

TAGS: tag1, tag2, tag3"#
    )
}

/// Split a writer reply into (title, body, tags)
fn parse_summary(content: &str, topic: &str) -> (String, String, Vec<String>) {
    let (main, tags) = match content.split_once("TAGS:") {
        Some((main, tags_part)) => {
            let tags = tags_part
                .split(',')
                .map(|t| t.trim().trim_matches(|c: char| matches!(c, '[' | ']' | '#')).trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            (main, tags)
        }
        None => (content, Vec::new()),
    };

    let mut lines = main.lines().skip_while(|l| l.trim().is_empty());
    let title = lines
        .next()
        .map(|l| l.trim().trim_start_matches('#').trim().trim_matches('*').trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Article about {topic}"));
    let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    (title, body, tags)
}

/// Write an article on `topic` from `sources`.
///
/// Blacklisted sources are dropped, credible ones are presented as trusted and
/// the rest as uncertain. The reply's citations are renumbered against that
/// combined list so only cited sources are returned.
pub async fn summarize_sources<P: LlmProvider + ?Sized>(
    provider: &P,
    filter: &SourceFilter,
    topic: &str,
    sources: &[Source],
) -> Result<SourceSummary> {
    let (credible, neutral) = filter.partition(sources);
    if credible.is_empty() && neutral.is_empty() {
        anyhow::bail!("No usable sources to summarize '{}'", topic);
    }
    info!(
        topic,
        trusted = credible.len(),
        uncertain = neutral.len(),
        "summarizing sources"
    );

    let response = provider
        .chat(ChatRequest {
            messages: vec![
                ChatTurn::new(Role::System, WRITER_SYSTEM_PROMPT),
                ChatTurn::new(Role::User, summary_prompt(topic, &credible, &neutral)),
            ],
            max_tokens: Some(2000),
            temperature: Some(0.1),
            timeout_seconds: Some(90),
        })
        .await
        .context("Summary request failed")?;

    let provided: Vec<Source> = credible.into_iter().chain(neutral).collect();
    let (title, body, tags) = parse_summary(&response.content, topic);
    if tags.is_empty() {
        warn!(topic, "summary reply had no tags");
    }
    let report = renumber_citations(&body, &provided, provided.len());

    Ok(SourceSummary {
        topic: topic.to_string(),
        title,
        text: report.text,
        tags,
        sources: report.sources,
        stats: report.stats,
    })
}
