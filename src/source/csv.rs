//! Streaming CSV reader producing bounded [`RawBatch`]es.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use csv::ByteRecord;
use flate2::read::MultiGzDecoder;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{RawBatch, RawRow, RawValue};

use super::unified::{BatchSource, Encoding, ReaderOptions};

/// Reads a delimited text file batch by batch.
///
/// Rules:
///
/// - The file must have a header row.
/// - Every required column must appear in the header (order can differ). With
///   `strict_columns`, the header must hold exactly the required columns.
/// - Batches hold only the required columns, in the order requested.
/// - Values are emitted as [`RawValue::Text`]; a record with the wrong field count is a read error.
pub struct CsvBatchReader {
    locator: String,
    reader: csv::Reader<Box<dyn Read>>,
    columns: Arc<[String]>,
    positions: Vec<usize>,
    encoding: Encoding,
    batch_size: usize,
    record: ByteRecord,
    next_position: u64,
    done: bool,
}

impl CsvBatchReader {
    /// Open a file, transparently decompressing gzip (by extension or magic bytes).
    pub fn open(
        path: &Path,
        locator: &str,
        required: &[String],
        options: &ReaderOptions,
    ) -> PipelineResult<Self> {
        let file = File::open(path).map_err(|e| PipelineError::source_read(locator, e))?;
        let mut buffered = BufReader::new(file);
        let magic = buffered
            .fill_buf()
            .map_err(|e| PipelineError::source_read(locator, e))?;
        let gzipped = magic.starts_with(&[0x1f, 0x8b])
            || path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

        let input: Box<dyn Read> = if gzipped {
            Box::new(MultiGzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };
        Self::from_reader(input, locator, required, options)
    }

    /// Wrap any byte stream.
    pub fn from_reader(
        input: Box<dyn Read>,
        locator: &str,
        required: &[String],
        options: &ReaderOptions,
    ) -> PipelineResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(options.delimiter.unwrap_or(b','))
            .from_reader(input);

        let header_record = reader
            .byte_headers()
            .map_err(|e| PipelineError::source_read(locator, format!("cannot read header: {e}")))?
            .clone();
        let headers = header_record
            .iter()
            .enumerate()
            .map(|(i, h)| {
                options
                    .encoding
                    .decode(h)
                    .map_err(|m| PipelineError::source_read(locator, format!("header column {i}: {m}")))
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        let positions = header_positions(&headers, required, options.strict_columns)
            .map_err(|m| PipelineError::source_read(locator, m))?;

        Ok(Self {
            locator: locator.to_owned(),
            reader,
            columns: required.iter().cloned().collect(),
            positions,
            encoding: options.encoding,
            batch_size: options.batch_size,
            record: ByteRecord::new(),
            next_position: 0,
            done: false,
        })
    }

    fn decode_record(&self) -> Result<Vec<RawValue>, String> {
        self.positions
            .iter()
            .zip(self.columns.iter())
            .map(|(&idx, name)| {
                let bytes = self.record.get(idx).unwrap_or_default();
                self.encoding
                    .decode(bytes)
                    .map(RawValue::Text)
                    .map_err(|m| format!("column '{name}': {m}"))
            })
            .collect()
    }
}

impl Iterator for CsvBatchReader {
    type Item = PipelineResult<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut rows = Vec::with_capacity(self.batch_size.min(65_536));
        while rows.len() < self.batch_size {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {
                    let position = self.next_position;
                    let values = match self.decode_record() {
                        Ok(v) => v,
                        Err(m) => {
                            self.done = true;
                            return Some(Err(PipelineError::source_read(
                                &self.locator,
                                format!("row {position}: {m}"),
                            )));
                        }
                    };
                    rows.push(RawRow { position, values });
                    self.next_position += 1;
                }
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(PipelineError::source_read(
                        &self.locator,
                        format!("row {}: {e}", self.next_position),
                    )));
                }
            }
        }
        if rows.is_empty() {
            return None;
        }
        Some(Ok(RawBatch {
            columns: Arc::clone(&self.columns),
            rows,
        }))
    }
}

impl BatchSource for CsvBatchReader {
    fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Map required columns to header indexes (allows re-ordered columns).
pub(crate) fn header_positions(
    headers: &[String],
    required: &[String],
    strict: bool,
) -> Result<Vec<usize>, String> {
    let mut positions = Vec::with_capacity(required.len());
    for name in required {
        match headers.iter().position(|h| h == name) {
            Some(idx) => positions.push(idx),
            None => {
                return Err(format!("missing required column '{name}'. headers={headers:?}"));
            }
        }
    }
    if strict {
        let extra: Vec<&String> = headers.iter().filter(|h| !required.contains(h)).collect();
        if !extra.is_empty() || headers.len() != required.len() {
            return Err(format!(
                "header does not match the declared columns: unexpected {extra:?}, expected {} column(s), found {}",
                required.len(),
                headers.len()
            ));
        }
    }
    Ok(positions)
}
