//! End-to-end runs of the binary on a generated trace.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scatrace-cli"))
        .current_dir(dir)
        .env("SCATRACE_PROGRESS", "0")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .unwrap()
}

fn simulate(dir: &Path) {
    let out = run(
        dir,
        &["simulate", "--rows", "60", "--data-len", "2", "--samples-len", "4", "--gap-every", "10", "--out", "t.json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

fn json(dir: &Path, name: &str) -> Value {
    serde_json::from_str(&std::fs::read_to_string(dir.join(name)).unwrap()).unwrap()
}

#[test]
fn aggregate_without_params_fails_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    // The input does not even exist: the params lookup must fail first.
    let out = run(dir.path(), &["aggregate", "--input", "missing.json"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no analysis parameters"));
}

#[test]
fn local_and_distributed_aggregation_agree() {
    let dir = tempfile::tempdir().unwrap();
    simulate(dir.path());
    std::fs::write(
        dir.path().join("t.params.toml"),
        "kernel = \"cond-avg\"\nbatch = 25\nsample_window = [0, 2]\n",
    )
    .unwrap();

    for (workers, name) in [("1", "one.json"), ("3", "three.json")] {
        let out = run(
            dir.path(),
            &["aggregate", "--input", "t.json", "--workers", workers, "--out", name],
        );
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    }
    let (one, three) = (json(dir.path(), "one.json"), json(dir.path(), "three.json"));
    assert_eq!(one["traces"], 54);
    assert_eq!(one["batches"], 3);
    assert_eq!(three["workers"], 3);
    assert_eq!(one["statistic"], three["statistic"]);
    assert_eq!(one["statistic"]["kernel"], "cond-avg");
}

#[test]
fn materialize_and_first_valid() {
    let dir = tempfile::tempdir().unwrap();
    simulate(dir.path());

    let out = run(
        dir.path(),
        &["materialize", "--input", "t.json", "--lo", "5", "--hi", "20", "--out", "m.json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let m = json(dir.path(), "m.json");
    assert_eq!(m["range"], serde_json::json!([5, 20]));
    assert_eq!(m["eof"], false);

    let out = run(dir.path(), &["first-valid", "--input", "t.json", "--validity", "samples"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "0");
}

#[test]
fn kernel_flag_overrides_the_params_file() {
    let dir = tempfile::tempdir().unwrap();
    simulate(dir.path());
    std::fs::write(dir.path().join("t.params.toml"), "kernel = \"cond-avg\"\n").unwrap();

    let out = run(
        dir.path(),
        &["aggregate", "--input", "t.json", "--kernel", "mean-var", "--out", "mv.json"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let mv = json(dir.path(), "mv.json");
    assert_eq!(mv["statistic"]["kernel"], "mean-var");
    assert_eq!(mv["statistic"]["count"], 54);

    let bad = run(dir.path(), &["aggregate", "--input", "t.json", "--kernel", "median"]);
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("unknown kernel"));
}
