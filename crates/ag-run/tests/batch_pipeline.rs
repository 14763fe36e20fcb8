//! Pipeline stages driven with stub executables.

#![cfg(unix)]

use ag_run::supervisor::{execute_stage, post_process, RunOptions};
use ag_run::{Compression, ModelBinary};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn stub_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn stalled_unit_is_retried_five_times_then_abandoned() {
    let dir = tempfile::tempdir().unwrap();
    let invocations = dir.path().join("invocations.log");
    let run_exe = stub_script(
        dir.path(),
        "engine.sh",
        &format!(
            "echo run >> {}\necho 'Paddock 40% complete' 1>&2",
            invocations.display()
        ),
    );
    let unit = dir.path().join("p1.sim");
    fs::write(&unit, "").unwrap();

    let binary = ModelBinary::new(PathBuf::from("/bin/false"), run_exe);
    let report = execute_stage(&[unit.clone()], &binary, 1);

    assert_eq!(report.abandoned, vec![unit.clone()]);
    assert!(unit.exists(), "abandoned unit keeps its file");
    let attempts = fs::read_to_string(&invocations).unwrap().lines().count();
    assert_eq!(attempts, 5);
}

#[test]
fn completed_unit_removes_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let run_exe = stub_script(
        dir.path(),
        "engine.sh",
        "echo 'summary report'\necho 'Simulation 100% complete' 1>&2",
    );
    let unit = dir.path().join("p1.sim");
    fs::write(&unit, "").unwrap();

    let binary = ModelBinary::new(PathBuf::from("/bin/false"), run_exe);
    let report = execute_stage(&[unit.clone()], &binary, 1);

    assert!(report.abandoned.is_empty());
    assert!(!unit.exists(), "completed unit is removed");
    let summary = fs::read_to_string(dir.path().join("p1.sum")).unwrap();
    assert!(summary.contains("summary report"));
}

#[test]
fn translation_captures_diagnostics_in_tmp_log() {
    let dir = tempfile::tempdir().unwrap();
    let convert_exe = stub_script(dir.path(), "translate.sh", "echo \"translating $1\"");
    let definition = dir.path().join("p1.apsim");
    fs::write(&definition, "<simulation/>").unwrap();

    let binary = ModelBinary::new(convert_exe, PathBuf::from("/bin/false"));
    let log = binary.convert(&definition).unwrap();

    assert_eq!(log, dir.path().join("p1.tmp"));
    assert!(fs::read_to_string(&log).unwrap().contains("translating"));
}

#[test]
fn hanging_child_is_killed_at_the_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let run_exe = stub_script(dir.path(), "engine.sh", "sleep 30");
    let unit = dir.path().join("p1.sim");
    fs::write(&unit, "").unwrap();

    let mut binary = ModelBinary::new(PathBuf::from("/bin/false"), run_exe);
    binary.timeout = Some(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let tail = binary.execute(&unit).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(tail, "");
}

#[test]
fn post_process_saves_archives_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("p42.out"),
        "ApsimVersion = 7.4\n\
         Title = met_maize_00042\n\
         Date yield\n\
         (dd/mm/yyyy) (kg/ha)\n\
         01/01/2000 0\n\
         02/01/2000 150.5\n",
    )
    .unwrap();
    fs::write(dir.path().join("p42.sum"), "summary").unwrap();
    fs::write(dir.path().join("p42.tmp"), "diagnostics").unwrap();

    let options = RunOptions {
        compression: Compression::None,
        ..RunOptions::default()
    };
    let report = post_process(dir.path(), &options).unwrap();

    assert_eq!(report.database_rows, Some(2));
    assert!(dir.path().join("apsimData.sqlite").exists());
    assert_eq!(report.archive, Some(dir.path().join("apsimData.tar")));
    assert!(dir.path().join("apsimData.tar").exists());
    for leftover in ["p42.out", "p42.sum", "p42.tmp"] {
        assert!(!dir.path().join(leftover).exists(), "{} not removed", leftover);
    }
}

#[test]
fn post_process_without_output_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let report = post_process(dir.path(), &RunOptions::default()).unwrap();
    assert_eq!(report.database_rows, None);
    assert_eq!(report.archive, None);
    assert!(!dir.path().join("apsimData.sqlite").exists());
}
