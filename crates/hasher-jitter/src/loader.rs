//! Training-frame ingestion from JSON files

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{JitterError, Result};
use crate::flash_search::FlashSearcher;
use crate::types::TrainingFrame;

/// Parse a frame file: either a bare array or `{"frames": [...]}`.
///
/// Invalid UTF-8 is a parse error like any other malformed JSON.
pub fn parse_frames(content: &[u8]) -> Result<Vec<TrainingFrame>> {
    let value: Value = serde_json::from_slice(content)?;
    let frames = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove("frames")
            .ok_or_else(|| JitterError::Parse("object without a \"frames\" array".into()))?,
        other => {
            return Err(JitterError::Parse(format!(
                "expected an array of frames, found {}",
                json_kind(&other)
            )))
        }
    };
    Ok(serde_json::from_value(frames)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Load one JSON file and merge its frames into `searcher`.
///
/// The knowledge base is touched only after the whole file parsed. Returns
/// the number of frames read from the file.
pub fn load_from_json_file(searcher: &FlashSearcher, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let content = fs::read(path)?;
    let frames = parse_frames(&content)?;
    let count = frames.len();
    if count > 0 {
        searcher.merge_frames(frames);
    }
    tracing::info!(path = %path.display(), frames = count, "Loaded training frames");
    Ok(count)
}

/// True for file names the data pipeline writes frames to
pub fn is_frame_file(name: &str) -> bool {
    name.ends_with("_with_seeds.json")
        || name == "training_frames.json"
        || (name.starts_with("training_") && name.ends_with(".json"))
}

/// Load every frame file in `dir` (non-recursive, sorted by name).
///
/// Unreadable or malformed files are logged and skipped. All frames are
/// merged in one rebuild. An empty path loads nothing.
pub fn load_from_directory(searcher: &FlashSearcher, dir: impl AsRef<Path>) -> Result<usize> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() {
        return Ok(0);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_frame_file)
        })
        .collect();
    files.sort();

    let mut loaded = Vec::new();
    for path in &files {
        match fs::read(path)
            .map_err(JitterError::from)
            .and_then(|content| parse_frames(&content))
        {
            Ok(frames) => {
                tracing::info!(path = %path.display(), frames = frames.len(), "Read frame file");
                loaded.extend(frames);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping frame file");
            }
        }
    }

    let count = loaded.len();
    if count > 0 {
        searcher.merge_frames(loaded);
    }
    Ok(count)
}
