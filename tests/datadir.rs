use arrow::array::{Array, Float64Array, Int64Array};
use csts::core::{CancelToken, Datum, Epoch, Error, TypeCode};
use csts::table::{
    CalendarPolicy, CalendarUnit, DataDirConfig, DataDirOptions, FsTags, TimeSeriesDataDir,
    Timezone, CONFIG_FILE,
};
use tempfile::tempdir;

// 2024-03-01T00:00:00Z
const MARCH_2024: f64 = 1_709_251_200.0;

fn options() -> DataDirOptions {
    DataDirOptions::new().epoch((0, 300)).policy("monthly")
}

#[test]
fn new_keys_are_created_on_first_use() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = TimeSeriesDataDir::open(dir.path(), options()).expect("open");
    assert!(!datadir.contains_key("new_field"));

    let series = datadir.ts("new_field").expect("auto-create");
    assert_eq!(series.epoch(), Epoch::new(0, 300).expect("epoch"));
    assert_eq!(series.policy().name(), "monthly");
    series.set(MARCH_2024 + 600.0, 4.0).expect("set");
    datadir.close().expect("close");

    let subdir = dir.path().join("new_field");
    assert!(subdir.join("2024-03.csts").is_file());
    let tags = FsTags::load(&subdir).expect("tags");
    assert_eq!(tags.get_str(".", "key"), Some("new_field"));
    assert_eq!(tags.get_str(".", "typecode"), Some("d"));
    assert_eq!(
        tags.get("2024-03.csts", "start").and_then(|v| v.as_f64()),
        Some(MARCH_2024)
    );
}

#[test]
fn config_records_grid_and_policy() {
    let dir = tempdir().expect("tempdir");
    TimeSeriesDataDir::open(dir.path(), options().timezone("Australia/Brisbane"))
        .expect("open");
    let text = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).expect("config");
    assert!(text.contains("[tsdatadir]"));

    let config = DataDirConfig::load(dir.path()).expect("load");
    let section = config.tsdatadir;
    assert_eq!(section.step.map(|s| s.as_f64()), Some(300.0));
    assert_eq!(section.start.map(|s| s.as_f64()), Some(0.0));
    assert_eq!(section.policy_name.as_deref(), Some("monthly"));
    assert_eq!(section.policy_tzinfo.as_deref(), Some("Australia/Brisbane"));

    let err = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new().timezone("UTC"))
        .expect_err("timezone conflict");
    assert!(matches!(err, Error::Conflict(_)));
    let err = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new().epoch((60, 300)))
        .expect_err("start conflict");
    assert!(matches!(err, Error::Conflict(_)));
    TimeSeriesDataDir::open(dir.path(), DataDirOptions::new().epoch(300))
        .expect("matching step");
}

#[test]
fn unknown_keys_are_not_created_by_get() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = TimeSeriesDataDir::open(dir.path(), options()).expect("open");
    assert!(matches!(datadir.get("missing"), Err(Error::KeyNotFound(_))));
    assert!(matches!(datadir.get_at("missing", 0.0), Err(Error::KeyNotFound(_))));
    assert!(!dir.path().join("missing").exists());
    assert!(matches!(datadir.ts("2fast"), Err(Error::InvalidKey(_))));
}

#[test]
fn export_gathers_keys_on_the_shared_grid() {
    let dir = tempdir().expect("tempdir");
    let mut datadir =
        TimeSeriesDataDir::open(dir.path(), options().typecode(TypeCode::Int64)).expect("open");
    datadir.set_at("import", MARCH_2024, 5).expect("set");
    datadir.set_at("export", MARCH_2024 + 300.0, 7).expect("set");
    datadir.ts("export").expect("ts").set(MARCH_2024 + 600.0, 8).expect("set");

    let batch = datadir
        .to_record_batch(MARCH_2024, MARCH_2024 + 900.0, None, None)
        .expect("batch");
    assert_eq!(batch.num_rows(), 3);
    let schema = batch.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, ["when", "export", "import"]);
    let when = batch.column(0).as_any().downcast_ref::<Int64Array>().expect("when");
    assert_eq!(when.value(1), MARCH_2024 as i64 + 300);
    let export = batch.column(1).as_any().downcast_ref::<Int64Array>().expect("export");
    assert_eq!(export.values().to_vec(), vec![0, 7, 8]);

    let only = datadir
        .to_record_batch(MARCH_2024, MARCH_2024 + 300.0, Some(&["import"][..]), None)
        .expect("one key");
    assert_eq!(only.num_columns(), 2);
}

#[test]
fn cancelled_export_stops_without_damage() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = TimeSeriesDataDir::open(dir.path(), options()).expect("open");
    datadir.set_at("a", MARCH_2024, 1.0).expect("set a");
    datadir.set_at("b", MARCH_2024, 2.0).expect("set b");
    datadir.flush().expect("flush");

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = datadir
        .to_record_batch(MARCH_2024, MARCH_2024 + 300.0, None, Some(&cancel))
        .expect_err("cancelled");
    assert!(matches!(err, Error::Cancelled));
    datadir.close().expect("close");

    let mut datadir = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new()).expect("reopen");
    assert_eq!(datadir.get_at("b", MARCH_2024).expect("b"), Datum::Float(2.0));
    let batch = datadir
        .to_record_batch(MARCH_2024, MARCH_2024 + 300.0, None, Some(&CancelToken::new()))
        .expect("uncancelled");
    let a = batch.column(1).as_any().downcast_ref::<Float64Array>().expect("a");
    assert_eq!(a.value(0), 1.0);
    assert_eq!(a.len(), 1);
}

#[test]
fn keys_match_any_glob() {
    let dir = tempdir().expect("tempdir");
    let mut datadir = TimeSeriesDataDir::open(dir.path(), options()).expect("open");
    for key in ["temp_inside", "temp_outside", "humidity", "pressure"] {
        datadir.ts(key).expect("create key");
    }
    datadir.close().expect("close");

    let datadir = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new()).expect("reopen");
    assert_eq!(datadir.keys(&[]).expect("all").len(), 4);
    assert_eq!(
        datadir.keys(&["temp_*", "hum*"]).expect("globs"),
        ["humidity", "temp_inside", "temp_outside"]
    );
    assert!(datadir.keys(&["wind*"]).expect("none").is_empty());
}

#[test]
fn policy_instance_must_agree_with_grid_and_timezone() {
    let dir = tempdir().expect("tempdir");
    let tokyo = |start: i64| {
        let epoch = Epoch::new(start, 60).expect("epoch");
        CalendarPolicy::new(CalendarUnit::Daily, epoch, Timezone::AsiaTokyo)
    };

    let shifted = DataDirOptions::new().epoch((0, 60)).policy(tokyo(30));
    let err = TimeSeriesDataDir::open(dir.path(), shifted).expect_err("shifted grid");
    assert!(matches!(err, Error::Conflict(_)));
    let err = TimeSeriesDataDir::open(
        dir.path(),
        DataDirOptions::new().epoch((0, 60)).policy(tokyo(0)).timezone("UTC"),
    )
    .expect_err("timezone disagrees with policy");
    assert!(matches!(err, Error::Conflict(_)));
    assert!(!dir.path().join(CONFIG_FILE).exists());

    let datadir = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new().policy(tokyo(0)))
        .expect("grid from policy");
    assert_eq!(datadir.epoch(), Epoch::new(0, 60).expect("epoch"));
    drop(datadir);
    let section = DataDirConfig::load(dir.path()).expect("load").tsdatadir;
    assert_eq!(section.policy_tzinfo.as_deref(), Some("Asia/Tokyo"));
    assert_eq!(section.policy_name.as_deref(), Some("daily"));
    assert_eq!(section.step.map(|s| s.as_f64()), Some(60.0));

    let datadir = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new()).expect("reopen");
    assert_eq!(datadir.policy().timezone(), Timezone::AsiaTokyo);
    assert_eq!(datadir.policy().name(), "daily");
    let err = TimeSeriesDataDir::open(
        dir.path(),
        DataDirOptions::new().policy(CalendarPolicy::daily(Epoch::new(0, 60).expect("epoch"))),
    )
    .expect_err("UTC policy over Tokyo config");
    assert!(matches!(err, Error::Conflict(_)));
}
