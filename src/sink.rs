//! Durable record output
//!
//! `CsvSink` appends `COIN,WALLET_ADDRESS` rows to a CSV file, flushing after
//! every record so a run terminated at any point keeps everything emitted so
//! far. The header is written only when the file is new or empty, so an
//! interrupted run can be appended to.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const CSV_HEADER: &str = "COIN,WALLET_ADDRESS";

/// The unit of output: one row per unique address per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraderRecord {
    pub coin: String,
    pub address: String,
}

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "Sink IO error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

/// Durable append of trader records
#[async_trait]
pub trait RecordSink: Send {
    /// Append a single record; must be durable once this returns
    async fn append(&mut self, record: &TraderRecord) -> Result<(), SinkError>;

    /// Flush pending writes to storage
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Get sink type for logging
    fn sink_type(&self) -> &'static str;
}

pub struct CsvSink {
    file: BufWriter<File>,
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut sink = Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
        };

        if is_empty {
            writeln!(sink.file, "{}", CSV_HEADER)?;
            sink.file.flush()?;
        }

        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the address column of an existing output file, for seeding
    /// the dedupe store when resuming. A missing file is an empty list.
    pub fn existing_addresses(path: impl AsRef<Path>) -> Result<Vec<String>, SinkError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut addresses = Vec::new();

        for line in reader.lines().skip(1) {
            let line = line?;
            // Addresses are never quoted; the coin field may be
            if let Some(address) = line.rsplit(',').next() {
                let address = address.trim();
                if !address.is_empty() {
                    addresses.push(address.to_string());
                }
            }
        }

        Ok(addresses)
    }

    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
        {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn append(&mut self, record: &TraderRecord) -> Result<(), SinkError> {
        writeln!(
            self.file,
            "{},{}",
            Self::escape_field(&record.coin),
            Self::escape_field(&record.address)
        )?;
        self.file.flush()?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.file.flush()?;
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "CSV"
    }
}
