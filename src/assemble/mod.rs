//! Result assembly for caller-facing search output.
//!
//! Converts the engine's ranked candidates into display objects: formatted
//! timestamps, timestamped watch links, and a short relevance explanation.
//! Presentation only; the engine's ordering is preserved untouched.

use crate::engine::RankedMatch;
use serde::{Deserialize, Serialize};
use url::Url;

const WATCH_BASE: &str = "https://www.youtube.com/watch";

/// Query outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Ok,
    NoResults,
}

/// One caller-facing search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub video_id: String,
    pub title: String,
    /// Display timestamp of the matched segment (e.g. "05:30").
    pub start_time: String,
    pub start_seconds: f64,
    pub text: String,
    pub score: f64,
    /// Watch link that lands on the matched segment.
    pub youtube_url: String,
    /// Why this matched; advisory text only.
    pub explanation: String,
}

/// A complete, ordered response for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: SearchStatus,
    pub results: Vec<SearchHit>,
}

/// Build the response for a ranked candidate list.
pub fn assemble(ranked: Vec<RankedMatch>) -> SearchResponse {
    let status = if ranked.is_empty() {
        SearchStatus::NoResults
    } else {
        SearchStatus::Ok
    };

    let results = ranked
        .into_iter()
        .map(|r| SearchHit {
            video_id: r.hit.segment.video_id.clone(),
            title: r.hit.video_title.clone(),
            start_time: r.hit.segment.format_timestamp(),
            start_seconds: r.hit.segment.start_seconds,
            youtube_url: watch_url(&r.hit.segment.video_id, r.hit.segment.start_seconds),
            explanation: explanation(&r),
            text: r.hit.segment.text,
            score: r.score,
        })
        .collect();

    SearchResponse { status, results }
}

/// Deep link to the matched moment: the watch URL with the floor of the
/// segment start appended as `t=<seconds>s`.
fn watch_url(video_id: &str, start_seconds: f64) -> String {
    let mut url = Url::parse(WATCH_BASE).expect("watch base URL is valid");
    url.query_pairs_mut()
        .append_pair("v", video_id)
        .append_pair("t", &format!("{}s", start_seconds as u64));
    url.to_string()
}

fn explanation(r: &RankedMatch) -> String {
    let mut text = format!("Matched {} \"{}\"", r.variant_kind.label(), r.variant_text);
    if !r.cooccurring.is_empty() {
        let nearby: Vec<String> = r
            .cooccurring
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect();
        text.push_str(&format!("; also mentions {}", nearby.join(", ")));
    }
    text
}
