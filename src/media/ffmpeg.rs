//! Wrapper around the `ffmpeg` CLI.
//!
//! Arguments are always passed as a vector, never through a shell. Each run
//! is bounded by a timeout, and the child is killed if it overruns or the
//! caller goes away.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, warn};

use super::MediaError;
use crate::timecode;

/// Fixed clip length.
pub const CLIP_DURATION_MS: u64 = 10_000;

// Fast single-pass VP9/Vorbis, tuned for latency over size.
const CLIP_PROFILE: &[&str] = &[
    "-vcodec",
    "libvpx-vp9",
    "-acodec",
    "libvorbis",
    "-cpu-used",
    "-5",
    "-deadline",
    "realtime",
];

// Lines of stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 5;

/// Runs the transcoding tool with the given arguments and returns its stdout.
pub trait Transcoder: Send + Sync + 'static {
    fn run(&self, args: Vec<OsString>) -> BoxFuture<'_, Result<Vec<u8>, MediaError>>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn run(&self, args: Vec<OsString>) -> BoxFuture<'_, Result<Vec<u8>, MediaError>> {
        Box::pin(async move {
            debug!(
                "[ffmpeg] {} {}",
                self.program.display(),
                args.iter()
                    .map(|a| a.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ")
            );

            let child = Command::new(&self.program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    MediaError::ExternalTool(format!("spawn {}: {e}", self.program.display()))
                })?;

            // On timeout the wait future is dropped, taking the child with it.
            let output = tokio::time::timeout(self.timeout, child.wait_with_output())
                .await
                .map_err(|_| MediaError::Timeout(self.timeout))??;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let tail = stderr_tail(&stderr);
                let code = output.status.code().unwrap_or(-1);
                warn!("[ffmpeg] exited with status {code}: {tail}");
                return Err(MediaError::ExternalTool(format!(
                    "ffmpeg exited with status {code}: {tail}"
                )));
            }

            Ok(output.stdout)
        })
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn seek_args(source: &Path, timestamp_ms: u64) -> Vec<OsString> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        timecode::format(timestamp_ms).into(),
        "-i".into(),
        source.as_os_str().to_owned(),
    ]
}

/// One JPEG frame at `timestamp_ms`, written to stdout.
pub fn frame_args(source: &Path, timestamp_ms: u64) -> Vec<OsString> {
    let mut args = seek_args(source, timestamp_ms);
    args.extend(
        ["-vframes", "1", "-vcodec", "mjpeg", "-f", "image2", "-"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

/// A `CLIP_DURATION_MS` WebM clip starting at `timestamp_ms`, written to
/// `output`. The output is overwritten; callers decide beforehand whether a
/// run is needed at all.
pub fn clip_args(source: &Path, timestamp_ms: u64, output: &Path) -> Vec<OsString> {
    let mut args = seek_args(source, timestamp_ms);
    args.push("-t".into());
    args.push(timecode::format(CLIP_DURATION_MS).into());
    args.extend(CLIP_PROFILE.iter().map(OsString::from));
    args.extend(["-f", "webm", "-y"].into_iter().map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

/// Last argument of an invocation: the output target.
#[cfg(test)]
pub fn output_target(args: &[OsString]) -> Option<&std::ffi::OsStr> {
    args.last().map(|a| a.as_os_str())
}
