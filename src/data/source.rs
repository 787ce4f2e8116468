use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Public mirror of the UCI synthetic control chart dataset
pub const FALLBACK_DATASET_URL: &str =
    "https://archive.ics.uci.edu/ml/machine-learning-databases/synthetic_control-mld/synthetic_control.data";

/// Where the raw rows come from
#[derive(Clone, Debug, PartialEq)]
pub enum DataSource {
    File(PathBuf),
    Url(String),
}

impl DataSource {
    pub fn fallback() -> Self {
        DataSource::Url(FALLBACK_DATASET_URL.to_string())
    }

    pub fn describe(&self) -> String {
        match self {
            DataSource::File(path) => path.display().to_string(),
            DataSource::Url(url) => url.clone(),
        }
    }
}

/// Read every row of `source` in order, using the fallback URL when no source is given.
///
/// Trailing blank lines are dropped; any other line is returned verbatim. An empty
/// result is an error so callers can never train on zero examples.
pub fn read_lines(source: Option<&DataSource>) -> Result<Vec<String>> {
    let fallback;
    let source = match source {
        Some(source) => source,
        None => {
            fallback = DataSource::fallback();
            log::info!("no dataset source supplied, falling back to {}", FALLBACK_DATASET_URL);
            &fallback
        }
    };

    let name = source.describe();
    let lines = match source {
        DataSource::File(path) => {
            let file = File::open(path).map_err(|e| Error::retrieval(&name, e))?;
            collect_lines(file, &name)?
        }
        DataSource::Url(url) => {
            let response = reqwest::blocking::get(url).map_err(|e| Error::retrieval(&name, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::retrieval(&name, format!("HTTP status {}", status)));
            }
            collect_lines(response, &name)?
        }
    };

    if lines.is_empty() {
        return Err(Error::retrieval(&name, "source contains no rows"));
    }
    log::info!("read {} rows from {}", lines.len(), name);
    Ok(lines)
}

/// Collect lines from any reader; the reader is dropped before returning.
pub fn collect_lines<R: Read>(reader: R, name: &str) -> Result<Vec<String>> {
    let mut lines = BufReader::new(reader)
        .lines()
        .collect::<std::io::Result<Vec<String>>>()
        .map_err(|e| Error::retrieval(name, e))?;

    while lines.last().map_or(false, |line| line.trim().is_empty()) {
        lines.pop();
    }
    Ok(lines)
}
