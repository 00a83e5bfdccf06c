//! Context assembly: relevance filtering and the text block handed to the
//! model, plus query prompt rendering.

use crate::models::SearchResult;

/// Context used when nothing passes the relevance threshold.
pub const NO_CONTEXT: &str = "No relevant documentation found.";

/// Results with `relevance >= min_relevance`, order preserved.
pub fn filter_by_relevance(results: &[SearchResult], min_relevance: f64) -> Vec<SearchResult> {
    results
        .iter()
        .filter(|r| r.relevance >= min_relevance)
        .cloned()
        .collect()
}

/// Filter `results` and join the survivors into one context block, or
/// return [`NO_CONTEXT`] when none survive.
pub fn assemble(results: &[SearchResult], min_relevance: f64, annotate: bool) -> String {
    render_blocks(&filter_by_relevance(results, min_relevance), annotate)
}

/// Join already filtered results. Each block reads
/// `From {url}[ (chunk i/n, relevance: p%)]:\n{text}`.
pub fn render_blocks(results: &[SearchResult], annotate: bool) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }

    results
        .iter()
        .map(|r| {
            let mut header = format!("From {}", r.chunk.source_url);
            if annotate {
                header.push_str(&annotation(r));
            }
            format!("{}:\n{}", header, r.chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn annotation(r: &SearchResult) -> String {
    format!(
        " (chunk {}/{}, relevance: {:.2}%)",
        r.chunk.index + 1,
        r.chunk.total_chunks,
        r.relevance * 100.0
    )
}

/// Substitute `{context}` and `{query}` in a prompt template in a single
/// pass, so placeholder-like text inside the values is left alone.
pub fn render_prompt(template: &str, context: &str, query: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + query.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{query}") {
            out.push_str(query);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Distinct source URLs in first-seen order.
pub fn distinct_sources(results: &[SearchResult]) -> Vec<String> {
    let mut seen = Vec::new();
    for r in results {
        if !seen.contains(&r.chunk.source_url) {
            seen.push(r.chunk.source_url.clone());
        }
    }
    seen
}
