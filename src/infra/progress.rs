// ============================================================
// Layer 6 — Progress Log
// ============================================================
// Tab-separated record of every validation point of a run:
//
//   epoch \t batch \t dev_loss
//
// The file is opened once per run and each line is flushed as
// soon as it is written, so the log is complete up to the last
// evaluation even if the run stops early or fails. Dropping the
// writer closes the file on every exit path.
//
// Output file: {output_dir}/progress_{prefix}

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::domain::error::TrainingResult;

/// Appends one line per validation point and flushes immediately.
pub struct ProgressLog<W: Write> {
    out:     W,
    records: usize,
}

impl ProgressLog<BufWriter<File>> {
    /// Create (truncate) the progress file at `path`.
    pub fn create(path: &Path) -> TrainingResult<Self> {
        let file = File::create(path)?;
        tracing::debug!("Writing progress to '{}'", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ProgressLog<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    pub fn record(&mut self, epoch: usize, batch: usize, loss: f64) -> TrainingResult<()> {
        writeln!(self.out, "{epoch}\t{batch}\t{loss}")?;
        self.out.flush()?;
        self.records += 1;
        Ok(())
    }

    /// Number of lines written so far
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_tab_separated() {
        let mut log = ProgressLog::new(Vec::new());
        log.record(0, 0, 2.5).unwrap();
        log.record(1, 1000, 1.25).unwrap();
        assert_eq!(log.records(), 2);

        let text = String::from_utf8(log.into_inner()).unwrap();
        assert_eq!(text, "0\t0\t2.5\n1\t1000\t1.25\n");
    }

    #[test]
    fn test_file_is_complete_without_explicit_close() {
        let dir = std::env::temp_dir().join("tpdn_progress_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("progress_digits");

        let mut log = ProgressLog::create(&path).unwrap();
        log.record(3, 7, 0.5).unwrap();
        // Still open; the line is already on disk
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "3\t7\t0.5\n");
        drop(log);

        std::fs::remove_dir_all(&dir).ok();
    }
}
