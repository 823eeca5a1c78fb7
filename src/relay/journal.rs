//! Append-only JSON-lines record of relay outcomes

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};

use super::engine::SubmissionOutcome;

#[derive(Debug, Serialize)]
struct JournalEntry<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    outcome: &'a SubmissionOutcome,
}

/// Writes one line per outcome to a file
#[derive(Debug, Clone)]
pub struct SubmissionJournal {
    path: PathBuf,
}

impl SubmissionJournal {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, outcome: &SubmissionOutcome) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("creating {}", parent.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .wrap_err_with(|| format!("opening journal {}", self.path.display()))?;

        let entry = JournalEntry { timestamp: Utc::now(), outcome };
        let json = serde_json::to_string(&entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}
