use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::classify::Classification;

const TICKETS_FILE: &str = "tickets.jsonl";

/// One processed ticket as appended to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: u64,
    pub text: String,
    pub classification: Classification,
    pub response: String,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only JSONL log of processed tickets, co-located with the corpus
/// artifacts.
pub struct TicketLog {
    path: PathBuf,
}

impl TicketLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            path: dir.as_ref().join(TICKETS_FILE),
        }
    }

    /// Record a processed ticket, assigning the next sequential id.
    pub fn append(
        &self,
        text: &str,
        classification: Classification,
        response: String,
        sources: Vec<String>,
    ) -> Result<TicketRecord> {
        let record = TicketRecord {
            id: self.load_all()?.len() as u64 + 1,
            text: text.to_string(),
            classification,
            response,
            sources,
            created_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open ticket log '{}'", self.path.display()))?;
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{line}").context("failed to write to the ticket log")?;
        Ok(record)
    }

    /// Every record in the log, oldest first. Unparseable lines are skipped
    /// with a warning so one bad write cannot take the log down.
    pub fn load_all(&self) -> Result<Vec<TicketRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open ticket log '{}'", self.path.display()))?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(error = %err, "skipping unparseable ticket record"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = TicketLog::new(dir.path());
        assert!(log.load_all().unwrap().is_empty());
    }

    #[test]
    fn appends_assign_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let log = TicketLog::new(dir.path());

        let first = log
            .append(
                "How do I configure SSO?",
                classify("How do I configure SSO?"),
                "See the security settings page.".to_string(),
                vec!["https://docs.example/sso".to_string()],
            )
            .unwrap();
        let second = log
            .append(
                "Which API endpoint lists assets?",
                classify("Which API endpoint lists assets?"),
                "Use the assets endpoint.".to_string(),
                Vec::new(),
            )
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let records = log.load_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "How do I configure SSO?");
        assert_eq!(records[1].classification.topic, "API/SDK");
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = TicketLog::new(dir.path());
        log.append(
            "A valid ticket?",
            classify("A valid ticket?"),
            "ok".to_string(),
            Vec::new(),
        )
        .unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(TICKETS_FILE))
            .unwrap();
        writeln!(file, "this is not json").unwrap();

        assert_eq!(log.load_all().unwrap().len(), 1);
    }
}
