use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::record::{Record, COLUMNS};

/// Append-only CSV destination for accepted records.
///
/// The file is not touched until the first append: a run that never starts
/// logging (or that aborts during port selection) leaves nothing on disk.
/// On first append the parent directory is created if needed, the file is
/// opened in append mode, and the header row is written iff the file is
/// empty - so appending to the output of an earlier run does not duplicate
/// the header.
pub struct CsvSink {
    path: PathBuf,
    file: Option<File>,
}

impl CsvSink {
    pub fn create(path: PathBuf) -> CsvSink {
        CsvSink { path, file: None }
    }

    /// Append one record as a CSV row. Rows land in call order - callers
    /// that need admission order preserved must serialise their calls (the
    /// session thread does, by being the only caller).
    pub fn append(&mut self, record: &Record) -> std::io::Result<()> {
        if self.file.is_none() {
            self.file = Some(self.open()?);
        }
        let file = self.file.as_mut().unwrap();
        writeln!(file, "{}", record.to_row())
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", COLUMNS.join(","))?;
        }
        Ok(file)
    }
}
