//! Landmark section of the key/value state file.
//!
//! Every scalar is stored on its own line as `key\tvalue`:
//!
//! ```text
//! LMS-nLM	2
//! LMS-x1[0]	10
//! LMS-y1[0]	10
//! LMS-x2[0]	12
//! LMS-y2[0]	11
//! LMS-x1[1]	50
//! ...
//! ```
//!
//! Keys not starting with `LMS-` belong to other sections of the state file
//! and are ignored by the reader. Solved coefficients are never stored: they
//! are recomputed from the landmarks.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::{LandmarkError, LandmarkStore};

const KEY_PREFIX: &str = "LMS-";
const KEY_COUNT: &str = "LMS-nLM";

/// Error types for the state file module.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Error reading or writing file
    #[error("error reading or writing state file")]
    IoError(#[from] std::io::Error),

    /// A value could not be parsed
    #[error("Parse error {0}")]
    ParseError(String),

    /// A key required to rebuild the landmark set is missing
    #[error("Missing key {0}")]
    MissingKey(String),

    /// Replaying a push failed
    #[error("failed to restore landmark")]
    Landmark(#[from] LandmarkError),
}

/// Write the landmarks of `store` in push order.
pub fn write_landmarks<W: Write>(store: &LandmarkStore, mut writer: W) -> Result<(), StateError> {
    writeln!(writer, "{KEY_COUNT}\t{}", store.len())?;
    for (i, pair) in store.iter().enumerate() {
        writeln!(writer, "{KEY_PREFIX}x1[{i}]\t{}", pair.x1)?;
        writeln!(writer, "{KEY_PREFIX}y1[{i}]\t{}", pair.y1)?;
        writeln!(writer, "{KEY_PREFIX}x2[{i}]\t{}", pair.x2)?;
        writeln!(writer, "{KEY_PREFIX}y2[{i}]\t{}", pair.y2)?;
    }
    writer.flush()?;
    Ok(())
}

/// Rebuild a landmark store by replaying the stored pushes in order.
///
/// # Arguments
///
/// * `reader` - The state file contents.
/// * `max_landmarks` - Capacity of the returned store.
///
/// # Returns
///
/// The restored store. A file without a `LMS-nLM` key yields an empty store.
pub fn read_landmarks<R: BufRead>(
    reader: R,
    max_landmarks: usize,
) -> Result<LandmarkStore, StateError> {
    let mut values = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once('\t') else {
            continue;
        };
        if key.starts_with(KEY_PREFIX) {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    let mut store = LandmarkStore::new(max_landmarks);
    let Some(count) = values.get(KEY_COUNT) else {
        return Ok(store);
    };
    let count = count
        .parse::<usize>()
        .map_err(|e| StateError::ParseError(format!("{KEY_COUNT}: {e}")))?;

    for i in 0..count {
        let x1 = coordinate(&values, "x1", i)?;
        let y1 = coordinate(&values, "y1", i)?;
        let x2 = coordinate(&values, "x2", i)?;
        let y2 = coordinate(&values, "y2", i)?;
        store.push(x1, y1, x2, y2)?;
    }

    log::debug!("restored {} landmarks", store.len());

    Ok(store)
}

/// Write the landmarks of `store` to the file at `path`.
pub fn save_landmarks(path: impl AsRef<Path>, store: &LandmarkStore) -> Result<(), StateError> {
    let file = File::create(path)?;
    write_landmarks(store, BufWriter::new(file))
}

/// Read the landmarks from the state file at `path`.
pub fn load_landmarks(
    path: impl AsRef<Path>,
    max_landmarks: usize,
) -> Result<LandmarkStore, StateError> {
    let file = File::open(path)?;
    read_landmarks(BufReader::new(file), max_landmarks)
}

fn coordinate(
    values: &HashMap<String, String>,
    field: &str,
    index: usize,
) -> Result<i32, StateError> {
    let key = format!("{KEY_PREFIX}{field}[{index}]");
    let value = values
        .get(&key)
        .ok_or_else(|| StateError::MissingKey(key.clone()))?;

    if let Ok(v) = value.parse::<i32>() {
        return Ok(v);
    }

    // older files may store coordinates as floats
    let v = value
        .parse::<f64>()
        .map_err(|e| StateError::ParseError(format!("{key}: {e}")))?
        .round();
    if !v.is_finite() || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return Err(StateError::ParseError(format!(
            "{key}: {value} is not a valid coordinate"
        )));
    }
    Ok(v as i32)
}
