// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end sweep tests.
//!
//! Endpoints are small shell commands that write metric files, so these
//! tests exercise catalogue loading, lifecycle and coordination without any
//! real transport.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use ipcbench_core::{
    ConfigLoader, MetricSample, Role, RoleKey, RunCoordinator, RunMetadata, SweepConfig,
};
use tempfile::TempDir;

const SENDER_CSV: &str =
    r#"printf "active_time_sec,wall_time_sec,bytes_sent,rss_mb\n0.5,0.6,4096,3.00\n" > sender_metrics.csv"#;
const RECEIVER_CSV: &str = r#"printf "active_time_sec,wall_time_sec,bytes_received,rss_mb\n0.5,0.7,4096,4.00\n" > receiver_metrics.csv"#;

fn load(root: &Path, methods: &str, timeout_secs: u64) -> SweepConfig {
    let yaml = format!(
        "sweep:\n  results_dir: results\n  start_delay_ms: 20\n  completion_timeout_secs: {}\nmethods:\n{}",
        timeout_secs, methods
    );
    ConfigLoader::load_string_at(&yaml, root).expect("catalogue should validate")
}

fn yaml_quote(command: &str) -> String {
    format!("'{}'", command.replace('\'', "''"))
}

#[tokio::test]
async fn test_sweep_collects_metrics_per_combination() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sockets")).unwrap();

    // Only python roles plus a C++ receiver: py->py and py->c++ are viable.
    let methods = format!(
        r#"
  - name: sockets
    transport: sockets
    roles:
      py_sender: {sender}
      py_receiver: {receiver}
      cpp_receiver: {receiver}
    sender_metric: sender_metrics.csv
    receiver_metric: receiver_metrics.csv
"#,
        sender = yaml_quote(SENDER_CSV),
        receiver = yaml_quote(RECEIVER_CSV),
    );
    let config = load(temp.path(), &methods, 10);

    let outcome = RunCoordinator::new(&config).run_sweep().await.unwrap();
    assert_eq!(outcome.runs.len(), 2);

    let tags: Vec<_> = outcome
        .runs
        .iter()
        .map(|r| r.metadata.tag.as_str().to_string())
        .collect();
    assert_eq!(
        tags,
        vec![
            "sockets_py_sender_py_receiver",
            "sockets_py_sender_cpp_receiver"
        ]
    );

    let run_dir = outcome.dir.join("sockets_py_sender_py_receiver");
    let sent = MetricSample::read_csv(&run_dir.join("sender_metrics.csv"), Role::Sender).unwrap();
    let received =
        MetricSample::read_csv(&run_dir.join("receiver_metrics.csv"), Role::Receiver).unwrap();
    assert_eq!(sent.bytes, received.bytes);

    let metadata = RunMetadata::read(&run_dir).unwrap();
    assert_eq!(metadata.sender_role, RoleKey::PySender);
    assert!(!metadata.timed_out);
    assert_eq!(metadata.copied_files.len(), 2);

    // Skipped combinations leave no directory behind.
    assert!(!outcome.dir.join("sockets_cpp_sender_py_receiver").exists());
    assert!(!outcome.dir.join("sockets_cpp_sender_cpp_receiver").exists());
}

#[tokio::test]
async fn test_stalled_receiver_does_not_abort_sweep() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("stuck")).unwrap();
    fs::create_dir(temp.path().join("quick")).unwrap();

    let methods = format!(
        r#"
  - name: stuck
    transport: shared_memory
    roles:
      sender: {sender}
      receiver: "sleep 30"
    sender_metric: sender_metrics.csv
    receiver_metric: receiver_metrics.csv
  - name: quick
    transport: native
    roles:
      sender: {sender}
      receiver: {receiver}
    sender_metric: sender_metrics.csv
    receiver_metric: receiver_metrics.csv
"#,
        sender = yaml_quote(SENDER_CSV),
        receiver = yaml_quote(RECEIVER_CSV),
    );
    let config = load(temp.path(), &methods, 1);

    let started = Instant::now();
    let outcome = RunCoordinator::new(&config).run_sweep().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(15));

    assert_eq!(outcome.runs.len(), 2);
    let stuck = &outcome.runs[0].metadata;
    assert_eq!(stuck.tag.as_str(), "stuck_sender_receiver");
    assert!(stuck.timed_out);
    assert!(stuck.receiver.killed);
    assert_eq!(stuck.copied_files, vec!["sender_metrics.csv".to_string()]);

    let quick = &outcome.runs[1].metadata;
    assert!(!quick.timed_out);
    assert_eq!(quick.copied_files.len(), 2);
}

#[tokio::test]
async fn test_stale_metric_file_is_not_collected() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("sockets");
    fs::create_dir(&work).unwrap();
    fs::write(work.join("receiver_metrics.csv"), "left over from last week").unwrap();

    let methods = format!(
        r#"
  - name: sockets
    transport: sockets
    roles:
      py_sender: {sender}
      py_receiver: "true"
    sender_metric: sender_metrics.csv
    receiver_metric: receiver_metrics.csv
"#,
        sender = yaml_quote(SENDER_CSV),
    );
    let config = load(temp.path(), &methods, 10);

    let outcome = RunCoordinator::new(&config).run_sweep().await.unwrap();
    let run_dir = &outcome.runs[0].dir;
    assert!(run_dir.join("sender_metrics.csv").exists());
    assert!(!run_dir.join("receiver_metrics.csv").exists());
}

#[tokio::test]
async fn test_method_filter_limits_sweep() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("a")).unwrap();
    fs::create_dir(temp.path().join("b")).unwrap();

    let methods = r#"
  - name: a
    transport: sockets
    roles:
      sender: "true"
      receiver: "true"
    sender_metric: s.csv
    receiver_metric: r.csv
  - name: b
    transport: sockets
    roles:
      sender: "true"
      receiver: "true"
    sender_metric: s.csv
    receiver_metric: r.csv
"#;
    let config = load(temp.path(), methods, 10);

    let outcome = RunCoordinator::new(&config)
        .with_method_filter(vec!["b".to_string()])
        .run_sweep()
        .await
        .unwrap();
    assert_eq!(outcome.runs.len(), 1);
    assert_eq!(outcome.runs[0].metadata.tag.as_str(), "b_sender_receiver");
    assert!(!outcome.dir.join("a_sender_receiver").exists());
}
