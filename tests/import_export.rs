#![cfg(feature = "etl")]

use std::fs::File;

use arrow::array::Float64Array;
use csts::core::{Datum, Error};
use csts::etl::frame::TIME_COLUMN;
use csts::etl::{import_csv, CsvImportOptions, CsvSink, ParquetSink, RowSink, TimeConversion};
use csts::table::{DataDirOptions, TimeSeriesDataDir};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::tempdir;

// 2024-03-01T00:00:00Z
const MARCH_2024: f64 = 1_709_251_200.0;

const SECONDS_CSV: &str = "\
when,temp,humidity
1709251200,21.5,40
1709251260,,41
1709251320,22,
";

fn open(dir: &std::path::Path) -> TimeSeriesDataDir {
    TimeSeriesDataDir::open(dir, DataDirOptions::new().epoch((0, 60)).policy("daily"))
        .expect("open datadir")
}

#[test]
fn seconds_columns_become_keys() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = open(dir.path());
    let stats = import_csv(&mut datadir, SECONDS_CSV.as_bytes(), &CsvImportOptions::default())
        .expect("import");
    assert_eq!(stats.rows, 3);
    assert_eq!(stats.values, 4);
    assert_eq!(stats.empty_cells, 2);
    assert_eq!(stats.keys, ["temp", "humidity"]);

    assert_eq!(datadir.get_at("temp", MARCH_2024).expect("temp"), Datum::Float(21.5));
    assert!(datadir.get_at("temp", MARCH_2024 + 60.0).expect("gap").is_nan());
    assert_eq!(datadir.get_at("temp", MARCH_2024 + 120.0).expect("temp").as_f64(), 22.0);
    assert_eq!(datadir.get_at("humidity", MARCH_2024 + 60.0).expect("hum").as_f64(), 41.0);
    assert!(dir.path().join("temp").join("2024-03-01.csts").is_file());
}

#[test]
fn iso_timestamps_and_custom_time_column() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = open(dir.path());
    let csv = "\
time;load
2024-03-01T10:02:00+10:00;1.25
2024-03-01T00:00:00Z;0.5
";
    let options = CsvImportOptions {
        time_column: "time".to_string(),
        conversion: TimeConversion::Iso8601,
        delimiter: b';',
    };
    let stats = import_csv(&mut datadir, csv.as_bytes(), &options).expect("import");
    assert_eq!(stats.values, 2);
    let values = datadir
        .get("load")
        .expect("load")
        .get_range(MARCH_2024, MARCH_2024 + 180.0)
        .expect("range");
    assert_eq!(values[0].as_f64(), 0.5);
    assert!(values[1].is_nan());
    assert_eq!(values[2].as_f64(), 1.25);
}

#[test]
fn bad_input_is_reported() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = open(dir.path());
    let defaults = CsvImportOptions::default();

    let err = import_csv(&mut datadir, "ts,a\n1,2\n".as_bytes(), &defaults)
        .expect_err("missing time column");
    assert!(matches!(err, Error::InvalidValue(_)));

    let err = import_csv(&mut datadir, "when,bad-name\n1,2\n".as_bytes(), &defaults)
        .expect_err("bad key");
    assert!(matches!(err, Error::InvalidKey(_)));

    let err = import_csv(&mut datadir, "when,a\n60,2\nlater,3\n".as_bytes(), &defaults)
        .expect_err("bad time");
    match err {
        Error::Parse(message) => assert!(message.contains("line 3"), "{message}"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn export_to_csv_leaves_gaps_empty() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = open(dir.path());
    import_csv(&mut datadir, SECONDS_CSV.as_bytes(), &CsvImportOptions::default())
        .expect("import");

    let batch = datadir
        .to_record_batch(MARCH_2024, MARCH_2024 + 180.0, None, None)
        .expect("batch");
    let mut sink = CsvSink::from_writer(Vec::new());
    sink.write_batch(batch).expect("write");
    sink.finish().expect("finish");
    let text = String::from_utf8(sink.into_inner().expect("into inner")).expect("utf8");
    assert_eq!(
        text,
        "when,humidity,temp\n\
         1709251200,40,21.5\n\
         1709251260,41,\n\
         1709251320,,22\n"
    );
}

#[test]
fn export_to_parquet_reads_back() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = open(dir.path().join("data").as_path());
    import_csv(&mut datadir, SECONDS_CSV.as_bytes(), &CsvImportOptions::default())
        .expect("import");

    let batch = datadir
        .to_record_batch(MARCH_2024, MARCH_2024 + 180.0, Some(&["temp"][..]), None)
        .expect("batch");
    let path = dir.path().join("export.parquet");
    let mut sink = ParquetSink::try_new(&path, batch.schema()).expect("sink");
    sink.write_batch(batch).expect("write");
    sink.finish().expect("finish");
    let late = datadir
        .to_record_batch(MARCH_2024, MARCH_2024 + 60.0, Some(&["temp"][..]), None)
        .expect("batch");
    assert!(sink.write_batch(late).is_err());

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).expect("open"))
        .expect("builder")
        .build()
        .expect("reader");
    let batches: Vec<_> = reader.collect::<Result<_, _>>().expect("read batches");
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 3);
    let first = &batches[0];
    assert_eq!(first.schema().field(0).name(), TIME_COLUMN);
    let temp = first
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("temp column");
    assert_eq!(temp.value(0), 21.5);
    assert!(temp.value(1).is_nan());
}
