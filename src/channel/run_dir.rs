//! Ephemeral per-run directory
//!
//! Created at run start and removed when dropped, so every exit path
//! (success, error, unwinding) cleans it up.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use super::ChannelEvent;

const JOURNAL_FILE: &str = "events.jsonl";

pub struct RunDirectory {
    dir: TempDir,
}

impl RunDirectory {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("svcprobe-run-").tempdir()?;
        debug!("Created run directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.path().join(JOURNAL_FILE)
    }

    /// Open the event journal for the reader loop
    pub fn open_journal(&self) -> io::Result<EventJournal> {
        let file = File::create(self.journal_path())?;
        Ok(EventJournal {
            writer: BufWriter::new(file),
            entries: 0,
        })
    }

    /// Remove the directory, reporting failures instead of ignoring them
    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed run directory {}", path.display());
        Ok(())
    }
}

/// Append-only JSON-lines record of every channel event
pub struct EventJournal {
    writer: BufWriter<File>,
    entries: u64,
}

impl EventJournal {
    pub fn record(&mut self, event: &ChannelEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.entries += 1;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<u64> {
        self.writer.flush()?;
        Ok(self.entries)
    }
}
