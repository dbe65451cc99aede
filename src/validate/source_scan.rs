use crate::error::PipelineResult;
use crate::execution::JobSpec;
use crate::processing::RowFilter;
use crate::source::{BatchSource, SourceHandle};
use crate::types::RawRow;

/// A fresh pass over the source yielding the rows that pass the job's filter, each with its
/// 0-based ordinal among qualifying rows.
pub(crate) struct QualifyingRows {
    reader: Box<dyn BatchSource>,
    columns: Vec<String>,
    filter: Option<RowFilter>,
    pending: std::vec::IntoIter<RawRow>,
    ordinal: u64,
}

impl QualifyingRows {
    pub(crate) fn open(job: &JobSpec, source: &SourceHandle, batch_size: usize) -> PipelineResult<Self> {
        let reader = source.open_with_batch_size(&job.required_source_columns(), batch_size)?;
        let columns = reader.columns().to_vec();
        let filter = job
            .filter
            .clone()
            .map(|p| RowFilter::new(p, &columns, &job.schema))
            .transpose()?;
        Ok(Self {
            reader,
            columns,
            filter,
            pending: Vec::new().into_iter(),
            ordinal: 0,
        })
    }

    /// Column layout of every yielded row.
    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for QualifyingRows {
    type Item = PipelineResult<(u64, RawRow)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                let ordinal = self.ordinal;
                self.ordinal += 1;
                return Some(Ok((ordinal, row)));
            }
            let batch = match self.reader.next()? {
                Ok(b) => b,
                Err(e) => return Some(Err(e)),
            };
            let batch = match &self.filter {
                Some(f) => f.apply(batch),
                None => batch,
            };
            self.pending = batch.rows.into_iter();
        }
    }
}
