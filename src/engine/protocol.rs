//! Line framing for the search engine's stdin/stdout protocol.
//!
//! A request is one query line. A response starts with a decimal record count
//! and then exactly that many records, each a fixed number of lines. There is
//! no request id, so the only way to stay aligned is to consume precisely the
//! lines the counts promise. Anything else is reported as
//! [`EngineError::ProtocolDesync`] and the caller must stop using the stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::EngineError;
use crate::models::{EpisodeResult, FlatMatch, GroupedMatch, SubtitleMatch, WireFormat};

// Don't trust a declared count for preallocation.
const MAX_PREALLOC: usize = 1024;

/// Buffered line reader over the engine's stdout.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::with_capacity(256),
        }
    }

    /// Read one newline-terminated line, without its terminator.
    ///
    /// EOF, or a final line with no `\n`, is a short read.
    async fn next_line(&mut self, expecting: &str) -> Result<&str, EngineError> {
        self.line.clear();
        let n = self.inner.read_line(&mut self.line).await?;
        if n == 0 || !self.line.ends_with('\n') {
            return Err(EngineError::ProtocolDesync(format!(
                "engine output ended while expecting {expecting}"
            )));
        }
        let line = self.line.trim_end_matches('\n').trim_end_matches('\r');
        Ok(line)
    }
}

/// Send one query line and flush it straight away.
pub async fn write_query<W: AsyncWrite + Unpin>(
    writer: &mut W,
    query: &str,
) -> Result<(), EngineError> {
    writer.write_all(query.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one complete framed response in the given wire format.
pub async fn read_response<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    format: WireFormat,
) -> Result<Vec<EpisodeResult>, EngineError> {
    match format {
        WireFormat::Flat => read_flat(reader).await,
        WireFormat::Grouped => read_grouped(reader).await,
    }
}

// ── Flat ──────────────────────────────────────────────────────────────────────
//
//   <N>
//   N × { <similarity> / <episode name> / <begin>, <end>, <text> / <blank> }

async fn read_flat<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
) -> Result<Vec<EpisodeResult>, EngineError> {
    let count = parse_count(reader.next_line("result count").await?, "result count")?;
    let mut results = Vec::with_capacity(count.min(MAX_PREALLOC));

    for _ in 0..count {
        let similarity = parse_similarity(reader.next_line("similarity").await?)?;
        let episode_name = reader.next_line("episode name").await?.trim().to_string();
        let subtitle = parse_subtitle(reader.next_line("subtitle line").await?)?;
        expect_separator(reader.next_line("record separator").await?)?;

        results.push(EpisodeResult::Flat(FlatMatch {
            similarity,
            episode_name,
            time_begin: subtitle.time_begin,
            time_end: subtitle.time_end,
            text: subtitle.text,
        }));
    }

    Ok(results)
}

// ── Grouped ───────────────────────────────────────────────────────────────────
//
//   <N>
//   N × { <M>, <episode name> / M × { <begin>, <end>, <text> } / <blank> }

async fn read_grouped<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
) -> Result<Vec<EpisodeResult>, EngineError> {
    let count = parse_count(reader.next_line("episode count").await?, "episode count")?;
    let mut results = Vec::with_capacity(count.min(MAX_PREALLOC));

    for _ in 0..count {
        let header = reader.next_line("episode header").await?;
        let (subtitle_count, episode_name) = header.split_once(", ").ok_or_else(|| {
            EngineError::ProtocolDesync(format!(
                "expected `<count>, <episode>` header, got {header:?}"
            ))
        })?;
        let subtitle_count = parse_count(subtitle_count, "subtitle count")?;
        let episode_name = episode_name.trim().to_string();

        let mut subtitles = Vec::with_capacity(subtitle_count.min(MAX_PREALLOC));
        for _ in 0..subtitle_count {
            subtitles.push(parse_subtitle(reader.next_line("subtitle line").await?)?);
        }
        expect_separator(reader.next_line("episode separator").await?)?;

        results.push(EpisodeResult::Grouped(GroupedMatch {
            episode_name,
            subtitles,
        }));
    }

    Ok(results)
}

// ── Field parsers ─────────────────────────────────────────────────────────────

fn parse_count(field: &str, what: &str) -> Result<usize, EngineError> {
    field.trim().parse().map_err(|_| {
        EngineError::ProtocolDesync(format!("expected {what} (integer), got {field:?}"))
    })
}

fn parse_similarity(field: &str) -> Result<f64, EngineError> {
    match field.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(EngineError::ProtocolDesync(format!(
            "expected similarity (float), got {field:?}"
        ))),
    }
}

/// `<begin>, <end>, <text>`: split on the first two `", "` only, so the text
/// keeps any commas of its own.
fn parse_subtitle(line: &str) -> Result<SubtitleMatch, EngineError> {
    let desync = || {
        EngineError::ProtocolDesync(format!("expected `<begin>, <end>, <text>`, got {line:?}"))
    };

    let mut parts = line.splitn(3, ", ");
    let (Some(begin), Some(end), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(desync());
    };

    Ok(SubtitleMatch {
        time_begin: begin.trim().parse().map_err(|_| desync())?,
        time_end: end.trim().parse().map_err(|_| desync())?,
        text: text.to_string(),
    })
}

fn expect_separator(line: &str) -> Result<(), EngineError> {
    if line.trim().is_empty() {
        Ok(())
    } else {
        Err(EngineError::ProtocolDesync(format!(
            "expected blank separator line, got {line:?}"
        )))
    }
}
