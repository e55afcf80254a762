use csts::core::{Datum, Epoch, Error, TimeSeriesFile, TypeCode, HEADER_LENGTH};
use tempfile::tempdir;

fn datum_eq(a: Datum, b: Datum) -> bool {
    a.same(b)
}

#[test]
fn values_and_header_survive_reopen() {
    let dir = tempdir().expect("tempdir");
    let cases = [
        (TypeCode::Float64, Epoch::new(0, 60).expect("epoch")),
        (TypeCode::Int64, Epoch::new(1_700_000_000, 300).expect("epoch")),
        (TypeCode::Float64, Epoch::new(12.5, 0.25).expect("epoch")),
    ];
    for (n, (typecode, epoch)) in cases.into_iter().enumerate() {
        let path = dir.path().join(format!("series{n}.csts"));
        let writes: Vec<(f64, Datum)> = (0..20)
            .map(|i| {
                let when = epoch.when(i * 3 + 1);
                let value = match typecode {
                    TypeCode::Float64 => Datum::Float(i as f64 * 1.5 - 7.0),
                    TypeCode::Int64 => Datum::Int(i * 1_000_003 - 50),
                };
                (when, value)
            })
            .collect();

        let mut ts = TimeSeriesFile::open(&path, Some(typecode), Some(epoch)).expect("create");
        for (when, value) in &writes {
            ts.set(*when, *value).expect("set");
        }
        ts.close().expect("close");

        let mut ts = TimeSeriesFile::open(&path, None, None).expect("reopen");
        assert_eq!(ts.typecode(), typecode);
        assert_eq!(ts.epoch(), epoch);
        for (when, value) in &writes {
            let got = ts.get(*when).expect("get");
            assert!(datum_eq(got, *value), "{when}: {got} != {value}");
        }
    }
}

#[test]
fn unwritten_slots_read_as_fill() {
    let dir = tempdir().expect("tempdir");
    let epoch = Epoch::new(0, 1).expect("epoch");

    let mut floats =
        TimeSeriesFile::open(dir.path().join("d.csts"), Some(TypeCode::Float64), Some(epoch))
            .expect("open d");
    assert!(floats.get(1000.0).expect("get").is_nan());

    let mut ints =
        TimeSeriesFile::open(dir.path().join("q.csts"), Some(TypeCode::Int64), Some(epoch))
            .expect("open q");
    assert_eq!(ints.get(1000.0).expect("get"), Datum::Int(0));

    let mut custom = TimeSeriesFile::open_with_fill(
        dir.path().join("c.csts"),
        Some(TypeCode::Int64),
        Some(epoch),
        Some(Datum::Int(-1)),
    )
    .expect("open custom");
    assert_eq!(custom.get(7.0).expect("get"), Datum::Int(-1));
}

#[test]
fn setting_past_the_end_pads_with_fill() {
    let dir = tempdir().expect("tempdir");
    let mut ts = TimeSeriesFile::open(
        dir.path().join("pad.csts"),
        Some(TypeCode::Float64),
        Some(Epoch::new(0, 1).expect("epoch")),
    )
    .expect("open");
    ts.set(500.0, 3.0).expect("set");
    assert_eq!(ts.len().expect("len"), 501);
    let head = ts.array().expect("array").values(0, 500);
    assert!(head.iter().all(|v| v.is_nan()));
    assert_eq!(ts.get(500.0).expect("get").as_f64(), 3.0);
}

#[test]
fn strict_bounds_and_lenient_ranges() {
    let dir = tempdir().expect("tempdir");
    let mut ts = TimeSeriesFile::open(
        dir.path().join("bounds.csts"),
        Some(TypeCode::Float64),
        Some(Epoch::new(100, 10).expect("epoch")),
    )
    .expect("open");
    ts.set(100.0, 1.0).expect("set");

    assert!(matches!(ts.array_index_bounds(90.0, 120.0), Err(Error::Index(_))));
    assert!(matches!(ts.slice(50.0, 120.0), Err(Error::Index(_))));
    assert!(matches!(ts.get(90.0), Err(Error::InvalidValue(_))));

    let values = ts.get_range(100.0, 150.0).expect("range past the end");
    assert_eq!(values.len(), 5);
    assert_eq!(values[0].as_f64(), 1.0);
    assert!(values[1..].iter().all(|v| v.is_nan()));

    // slice never pads
    assert_eq!(ts.slice(100.0, 150.0).expect("slice").len(), 1);

    let prepadded = ts.slice_padded(80.0, 110.0, true).expect("prepad");
    assert_eq!(prepadded.len(), 3);
    assert!(prepadded[0].is_nan() && prepadded[1].is_nan());
    assert_eq!(prepadded[2].as_f64(), 1.0);
}

#[test]
fn poke_and_peek_bypass_the_array() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("poke.csts");
    let epoch = Epoch::new(0, 60).expect("epoch");
    let mut ts = TimeSeriesFile::open(&path, Some(TypeCode::Int64), Some(epoch)).expect("open");

    ts.poke(180.0, 9).expect("poke creates the file");
    assert!(!ts.is_loaded());
    let len = std::fs::metadata(&path).expect("metadata").len() as usize;
    assert_eq!(len, HEADER_LENGTH + 4 * 8);
    assert_eq!(ts.peek(180.0).expect("peek"), Datum::Int(9));
    assert_eq!(ts.peek(60.0).expect("peek gap"), Datum::Int(0));
    assert_eq!(ts.peek(6000.0).expect("peek past end"), Datum::Int(0));

    ts.set(0.0, 1).expect("set loads the array");
    ts.poke(60.0, 2).expect("poke with loaded array");
    ts.close().expect("close");

    let mut ts = TimeSeriesFile::open(&path, None, None).expect("reopen");
    let values: Vec<Datum> = ts.items().expect("items").map(|(_, v)| v).collect();
    assert_eq!(values, vec![Datum::Int(1), Datum::Int(2), Datum::Int(0), Datum::Int(9)]);
}

#[test]
fn reopening_with_other_settings_conflicts() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("conflict.csts");
    let epoch = Epoch::new(0, 60).expect("epoch");
    let mut ts = TimeSeriesFile::open(&path, Some(TypeCode::Float64), Some(epoch)).expect("open");
    ts.set(0.0, 1.0).expect("set");
    ts.close().expect("close");

    let err = TimeSeriesFile::open(&path, Some(TypeCode::Int64), Some(epoch)).expect_err("typecode");
    assert!(matches!(err, Error::Conflict(_)));
    let other_step = Epoch::new(0, 30).expect("epoch");
    let err =
        TimeSeriesFile::open(&path, Some(TypeCode::Float64), Some(other_step)).expect_err("step");
    assert!(matches!(err, Error::Conflict(_)));

    let missing = dir.path().join("missing.csts");
    let err = TimeSeriesFile::open(&missing, None, Some(epoch)).expect_err("no typecode");
    assert!(matches!(err, Error::InvalidValue(_)));
}

#[test]
fn malformed_files_are_format_errors() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.csts");

    std::fs::write(&path, b"nope").expect("write short");
    assert!(matches!(
        TimeSeriesFile::open(&path, None, None),
        Err(Error::Format(_))
    ));

    let epoch = Epoch::new(0, 1).expect("epoch");
    let mut ts = TimeSeriesFile::open(&path, Some(TypeCode::Float64), Some(epoch));
    assert!(ts.is_err());

    std::fs::remove_file(&path).expect("remove");
    ts = TimeSeriesFile::open(&path, Some(TypeCode::Float64), Some(epoch));
    let mut ts = ts.expect("fresh open");
    ts.set(2.0, 1.0).expect("set");
    ts.close().expect("close");

    let mut bytes = std::fs::read(&path).expect("read");
    bytes.extend_from_slice(&[0, 1, 2]);
    std::fs::write(&path, &bytes).expect("write partial sample");
    let mut ts = TimeSeriesFile::open(&path, None, None).expect("header is still fine");
    assert!(matches!(ts.get(0.0), Err(Error::Format(_))));

    bytes[0] = b'x';
    std::fs::write(&path, &bytes).expect("write bad magic");
    assert!(matches!(
        TimeSeriesFile::open(&path, None, None),
        Err(Error::Format(_))
    ));
}
