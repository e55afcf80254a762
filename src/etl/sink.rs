use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::core::{Error, Result};

pub trait RowSink {
    fn write_batch(&mut self, batch: RecordBatch) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct ParquetSink<W: Write + Seek + Send> {
    writer: Option<ArrowWriter<W>>,
}

impl ParquetSink<File> {
    pub fn try_new(path: impl AsRef<Path>, schema: SchemaRef) -> Result<Self> {
        let file = File::create(path)?;
        Self::from_writer(file, schema, None)
    }
}

impl<W: Write + Seek + Send> ParquetSink<W> {
    pub fn from_writer(
        writer: W,
        schema: SchemaRef,
        props: Option<WriterProperties>,
    ) -> Result<Self> {
        let writer = ArrowWriter::try_new(writer, Arc::clone(&schema), props)?;
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl<W: Write + Seek + Send> RowSink for ParquetSink<W> {
    fn write_batch(&mut self, batch: RecordBatch) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::InvalidValue("parquet sink is closed".to_string()));
        };
        writer.write(&batch)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}

/// Writes batches as CSV rows. NaN floats become empty cells.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    wrote_header: bool,
}

impl CsvSink<File> {
    pub fn try_new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_writer(File::create(path)?))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            wrote_header: false,
        }
    }

    /// Finish and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|err| Error::Io(err.into_error()))
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn write_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if !self.wrote_header {
            let schema = batch.schema();
            self.writer
                .write_record(schema.fields().iter().map(|field| field.name().as_str()))?;
            self.wrote_header = true;
        }
        let mut row = Vec::with_capacity(batch.num_columns());
        for index in 0..batch.num_rows() {
            row.clear();
            for column in batch.columns() {
                row.push(cell(column, index)?);
            }
            self.writer.write_record(&row)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn cell(column: &ArrayRef, index: usize) -> Result<String> {
    if let Some(values) = column.as_any().downcast_ref::<Float64Array>() {
        let value = values.value(index);
        return Ok(if value.is_nan() {
            String::new()
        } else {
            value.to_string()
        });
    }
    if let Some(values) = column.as_any().downcast_ref::<Int64Array>() {
        return Ok(values.value(index).to_string());
    }
    Err(Error::InvalidValue(format!(
        "cannot write {} column as csv",
        column.data_type()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("when", DataType::Int64, false),
            Field::new("power", DataType::Float64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![0, 60])),
                Arc::new(Float64Array::from(vec![1.5, f64::NAN])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn csv_sink_writes_header_once() {
        let mut sink = CsvSink::from_writer(Vec::new());
        sink.write_batch(sample_batch()).unwrap();
        sink.write_batch(sample_batch()).unwrap();
        sink.finish().unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "when,power\n0,1.5\n60,\n0,1.5\n60,\n");
    }

    #[test]
    fn parquet_sink_rejects_writes_after_finish() {
        let dir = tempfile::tempdir().unwrap();
        let batch = sample_batch();
        let mut sink = ParquetSink::try_new(dir.path().join("out.parquet"), batch.schema()).unwrap();
        sink.write_batch(batch.clone()).unwrap();
        sink.finish().unwrap();
        assert!(sink.write_batch(batch).is_err());
    }
}
