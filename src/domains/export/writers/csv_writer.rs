use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::errors::{DomainError, DomainResult};
use crate::domains::export::types::ExportStats;

#[derive(Debug, Clone)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote_char: u8,
    /// Rows between result-table existence checks
    pub batch_size: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
            batch_size: 1000,
        }
    }
}

/// Spreadsheets read a leading `ID` cell as a special file type.
fn escape_header(index: usize, name: &str) -> String {
    if index == 0 && name == "ID" {
        "`ID".to_string()
    } else {
        name.to_string()
    }
}

/// Writes CSV records one at a time to an async sink.
pub struct StreamingCsvWriter<W: AsyncWrite + Unpin + Send> {
    inner: W,
    config: CsvConfig,
    header_written: bool,
    stats: ExportStats,
    start_time: Instant,
    buffer: Vec<u8>,
}

impl<W: AsyncWrite + Unpin + Send> StreamingCsvWriter<W> {
    pub fn new(writer: W, config: CsvConfig) -> Self {
        Self {
            inner: writer,
            config,
            header_written: false,
            stats: ExportStats::default(),
            start_time: Instant::now(),
            buffer: Vec::with_capacity(1024),
        }
    }

    pub async fn write_header<S: AsRef<str>>(&mut self, columns: &[S]) -> DomainResult<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;

        let headers: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| escape_header(i, name.as_ref()))
            .collect();
        self.write_record(&headers).await
    }

    pub async fn write_row<S: AsRef<[u8]>>(&mut self, values: &[S]) -> DomainResult<()> {
        self.write_record(values).await?;
        self.stats.rows_written += 1;
        Ok(())
    }

    async fn write_record<S: AsRef<[u8]>>(&mut self, record: &[S]) -> DomainResult<()> {
        self.buffer.clear();
        {
            let mut wtr = csv::WriterBuilder::new()
                .delimiter(self.config.delimiter)
                .quote(self.config.quote_char)
                .from_writer(&mut self.buffer);

            wtr.write_record(record)
                .map_err(|e| DomainError::Internal(format!("CSV serialization failed: {}", e)))?;
            wtr.flush()?;
        }

        self.inner.write_all(&self.buffer).await?;
        self.stats.bytes_written += self.buffer.len() as u64;
        Ok(())
    }

    /// Flush the sink and return the final statistics.
    pub async fn finish(mut self) -> DomainResult<ExportStats> {
        self.inner.flush().await?;
        self.stats.duration_ms = self.start_time.elapsed().as_millis() as u64;
        Ok(self.stats)
    }
}
