//! Container log capture and archiving.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use imgprobe_common::error::{ProbeError, Result};

/// Joins two output streams, stdout first, terminating each non-empty
/// stream with a newline.
#[must_use]
pub fn join_streams(stdout: &str, stderr: &str) -> String {
    let mut out = String::with_capacity(stdout.len() + stderr.len() + 2);
    for stream in [stdout, stderr] {
        if stream.is_empty() {
            continue;
        }
        out.push_str(stream);
        if !stream.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Interleaves the two streams of `logs --timestamps` output into the
/// order the container wrote them, and strips the timestamps.
///
/// A line without a leading RFC 3339 timestamp keeps the timestamp of the
/// line before it in the same stream. On equal timestamps stdout goes first.
#[must_use]
pub fn merge_timestamped(stdout: &str, stderr: &str) -> String {
    let out = stamped(stdout);
    let err = stamped(stderr);
    let mut merged = String::with_capacity(stdout.len() + stderr.len());
    let (mut i, mut j) = (0, 0);
    while i < out.len() || j < err.len() {
        let from_stdout = match (out.get(i), err.get(j)) {
            (Some((a, _)), Some((b, _))) => a <= b,
            (Some(_), None) => true,
            (None, _) => false,
        };
        let (_, text) = if from_stdout {
            i += 1;
            out[i - 1]
        } else {
            j += 1;
            err[j - 1]
        };
        merged.push_str(text);
        merged.push('\n');
    }
    merged
}

fn stamped(stream: &str) -> Vec<(Option<DateTime<Utc>>, &str)> {
    let mut last = None;
    stream
        .lines()
        .map(|line| {
            let (stamp, text) = line.split_once(' ').unwrap_or((line, ""));
            match DateTime::parse_from_rfc3339(stamp) {
                Ok(at) => {
                    last = Some(at.with_timezone(&Utc));
                    (last, text)
                }
                Err(_) => (last, line),
            }
        })
        .collect()
}

/// Returns the archive path for a container's logs.
#[must_use]
pub fn archive_path(dir: &Path, image_slug: &str, container_name: &str) -> PathBuf {
    dir.join(format!("{image_slug}-{container_name}.log"))
}

/// Writes captured logs to `dir`, creating the directory if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn archive_logs(
    dir: &Path,
    image_slug: &str,
    container_name: &str,
    logs: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| ProbeError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let path = archive_path(dir, image_slug, container_name);
    std::fs::write(&path, logs).map_err(|e| ProbeError::Io {
        path: path.clone(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), bytes = logs.len(), "archived container logs");
    Ok(path)
}

/// Reads archived logs back from disk.
///
/// Returns an empty string if nothing was archived at `path`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_archived(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).map_err(|e| ProbeError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
