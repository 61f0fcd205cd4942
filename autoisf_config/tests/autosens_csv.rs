use std::fs::File;
use std::io::Write;

use autoisf_config::load_autosens_csv;
use rstest::rstest;
use tempfile::tempdir;

fn write_csv(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("history.csv");
    let mut f = File::create(&path).expect("create");
    f.write_all(body.as_bytes()).expect("write");
    (dir, path)
}

#[rstest]
fn loads_rows_with_empty_cells_as_missing() {
    let (_dir, path) = write_csv(
        "ts_s,glucose,delta5,expected_delta5,profile_sens\n\
         1000,6.5,0.2,0.1,2.5\n\
         1300,6.7,,0.1,\n",
    );
    let rows = load_autosens_csv(&path).expect("load");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].ts_s, 1000);
    assert_eq!(rows[0].delta5, Some(0.2));
    assert_eq!(rows[1].delta5, None);
    assert_eq!(rows[1].profile_sens, None);
}

#[rstest]
fn rejects_wrong_headers() {
    let (_dir, path) = write_csv("time,bg\n1,2\n");
    let err = load_autosens_csv(&path).expect_err("bad headers");
    assert!(format!("{err}").contains("must have headers"));
}

#[rstest]
fn reports_bad_row_with_file_line_number() {
    let (_dir, path) = write_csv(
        "ts_s,glucose,delta5,expected_delta5,profile_sens\n\
         1000,6.5,0.2,0.1,2.5\n\
         abc,6.5,0.2,0.1,2.5\n",
    );
    let err = load_autosens_csv(&path).expect_err("bad row");
    assert!(format!("{err}").contains("invalid CSV row 3"));
}

#[rstest]
fn missing_file_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let err = load_autosens_csv(&dir.path().join("nope.csv")).expect_err("missing");
    assert!(format!("{err}").contains("open autosens CSV"));
}
