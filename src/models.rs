use serde::{Deserialize, Serialize};

// ── Engine wire format ────────────────────────────────────────────────────────

/// Which response framing the engine binary emits.
///
/// The two shapes are not interchangeable: decoding one with the other's
/// reader desynchronises the pipe on the first result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// One record per subtitle line: similarity, episode, metadata, separator.
    #[default]
    Flat,
    /// One record per episode: `count, name` header followed by its subtitles.
    Grouped,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WireFormat::Flat => "flat",
            WireFormat::Grouped => "grouped",
        };
        write!(f, "{s}")
    }
}

// ── Search results ────────────────────────────────────────────────────────────

/// One subtitle line inside a grouped result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleMatch {
    pub time_begin: i64,
    pub time_end: i64,
    pub text: String,
}

/// Flat result: a single matching subtitle with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatMatch {
    pub similarity: f64,
    #[serde(rename = "episodeName")]
    pub episode_name: String,
    pub time_begin: i64,
    pub time_end: i64,
    pub text: String,
}

/// Grouped result: every matching subtitle of one episode, in engine order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedMatch {
    #[serde(rename = "episodeName")]
    pub episode_name: String,
    pub subtitles: Vec<SubtitleMatch>,
}

/// A decoded search result. Serialises as the bare inner object so clients
/// see exactly the JSON shape of the configured wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpisodeResult {
    Flat(FlatMatch),
    Grouped(GroupedMatch),
}

// ── Request DTOs ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Raw `/image` and `/video` parameters; validated by `media::validate`.
#[derive(Debug, Deserialize)]
pub struct MediaParams {
    #[serde(rename = "episodeName", default)]
    pub episode_name: String,
    #[serde(default)]
    pub timestamp: String,
}

// ── Status ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub engine: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub protocol: WireFormat,
}
