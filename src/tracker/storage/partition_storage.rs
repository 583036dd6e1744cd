use std::{
    future::Future,
    io::{ErrorKind, SeekFrom},
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};

use crate::utils::time::date_to_partition_name;

use super::entities::{LogEntry, PARTITION_HEADER};

/// Spreadsheet tools need the byte order mark to open UTF-8 text as UTF-8.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Interface for abstracting storage of activity partitions.
pub trait LogStorage {
    type Partition: PartitionHandle + Send;

    /// Makes sure the partition of `date` exists and carries its header, creating it if needed.
    /// Calling it again for the same date changes nothing.
    fn ensure_partition_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::Partition>> + Send;

    /// Reads every well formed row of the partition for `date`. Returns `None` when the partition
    /// doesn't exist.
    fn read_partition(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<PartitionContents>>> + Send;
}

impl<T: Deref + Sync> LogStorage for T
where
    T::Target: LogStorage,
{
    type Partition = <T::Target as LogStorage>::Partition;

    fn ensure_partition_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Self::Partition>> + Send {
        self.deref().ensure_partition_for(date)
    }

    fn read_partition(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<PartitionContents>>> + Send {
        self.deref().read_partition(date)
    }
}

pub trait PartitionHandle {
    fn append(&mut self, entry: &LogEntry) -> impl Future<Output = Result<()>> + Send;
    fn date(&self) -> NaiveDate;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PartitionContents {
    pub entries: Vec<LogEntry>,
    /// Rows that couldn't be parsed, usually a line cut off by a crash.
    pub skipped_rows: usize,
}

/// The main realization of [LogStorage]: one CSV file per local calendar day.
pub struct CsvLogStorage {
    partition_dir: PathBuf,
}

impl CsvLogStorage {
    pub fn new(partition_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&partition_dir)?;

        Ok(Self { partition_dir })
    }

    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.partition_dir.join(date_to_partition_name(date))
    }
}

impl LogStorage for CsvLogStorage {
    type Partition = CsvPartition;

    async fn ensure_partition_for(&self, date: NaiveDate) -> Result<Self::Partition> {
        let path = self.partition_path(date);
        let file = open_initialized(&path).await?;
        file.unlock_async().await?;
        Ok(CsvPartition { path, date })
    }

    async fn read_partition(&self, date: NaiveDate) -> Result<Option<PartitionContents>> {
        let path = self.partition_path(date);
        match read_bytes(&path).await {
            Ok(bytes) => Ok(Some(parse_partition(&path, &bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)?,
        }
    }
}

pub struct CsvPartition {
    path: PathBuf,
    date: NaiveDate,
}

impl PartitionHandle for CsvPartition {
    async fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let row = encode_row(entry)?;
        let mut file = open_initialized(&self.path).await?;
        let result = write_all(&mut file, &row).await;
        file.unlock_async().await?;
        result
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Opens a partition for appending while holding an exclusive lock on it. The cursor is left at
/// the end of the last complete row: a missing or empty file gets its header first and a row cut
/// off by a crash is dropped, so new rows never continue a torn one.
async fn open_initialized(path: &Path) -> Result<File> {
    let mut file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .await?;
    file.lock_exclusive()?;

    if let Err(e) = prepare_for_append(path, &mut file).await {
        file.unlock_async().await?;
        return Err(e);
    }
    Ok(file)
}

async fn prepare_for_append(path: &Path, file: &mut File) -> Result<()> {
    let len = file.metadata().await?.len();
    let mut complete = len;

    if len > 0 {
        file.seek(SeekFrom::End(-1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;

        if last[0] != b'\n' {
            let mut bytes = Vec::with_capacity(len as usize);
            file.seek(SeekFrom::Start(0)).await?;
            file.read_to_end(&mut bytes).await?;
            complete = complete_rows_len(&bytes);
            warn!(
                "Dropping {} bytes of a torn row at the end of {path:?}",
                len - complete
            );
        }
    }

    // Nothing but a byte order mark is as good as an empty file.
    if complete <= UTF8_BOM.len() as u64 {
        info!("Creating partition {path:?}");
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        let mut header = UTF8_BOM.to_vec();
        header.extend(encode_header()?);
        return write_all(file, &header).await;
    }

    if complete < len {
        file.set_len(complete).await?;
    }
    file.seek(SeekFrom::End(0)).await?;
    Ok(())
}

/// Length of the prefix of a partition made of whole rows. Must only be called when the last row
/// lacks its terminator: that row is the torn one and everything before it is kept.
fn complete_rows_len(bytes: &[u8]) -> u64 {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let offset = (bytes.len() - body.len()) as u64;

    // Quotes are honored, a torn row may have started inside a quoted title spanning lines.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body);
    let mut record = csv::ByteRecord::new();
    let mut last_start = 0;
    loop {
        let start = reader.position().byte();
        match reader.read_byte_record(&mut record) {
            Ok(true) => last_start = start,
            Ok(false) | Err(_) => break,
        }
    }
    offset + last_start
}

async fn write_all(file: &mut File, bytes: &[u8]) -> Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

async fn read_bytes(path: &Path) -> std::result::Result<Vec<u8>, std::io::Error> {
    debug!("Reading {path:?}");
    let mut file = File::open(path).await?;
    file.lock_shared()?;
    let mut bytes = vec![];
    let result = file.read_to_end(&mut bytes).await;
    file.unlock_async().await?;
    result.map(|_| bytes)
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![])
}

fn encode_header() -> Result<Vec<u8>> {
    let mut writer = csv_writer();
    writer.write_record(PARTITION_HEADER)?;
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

fn encode_row(entry: &LogEntry) -> Result<Vec<u8>> {
    let mut writer = csv_writer();
    writer.serialize(entry)?;
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

fn parse_partition(path: &Path, bytes: &[u8]) -> PartitionContents {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let mut contents = PartitionContents::default();
    for row in reader.deserialize::<LogEntry>() {
        match row {
            Ok(entry) => contents.entries.push(entry),
            Err(e) => {
                // ignore illegal rows. Might happen after shutdowns or while a row is being written
                warn!("During parsing in path {path:?} found illegal row: {e}");
                contents.skipped_rows += 1;
            }
        }
    }
    contents
}
