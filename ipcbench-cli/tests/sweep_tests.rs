// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sweeps that launch the `ipcbench endpoint` subcommands as real processes.
//!
//! Every transport runs sender and receiver in separate process groups, so
//! named semaphores, segments and sockets are shared across processes the
//! way the catalogue's own endpoints share them.

use std::fs;
use std::path::Path;

use ipcbench_core::{ConfigLoader, MetricSample, Role, RunCoordinator, RunMetadata};
use ipcbench_report::Aggregator;
use tempfile::TempDir;

const TOTAL_BYTES: u64 = 8 << 20;
const CHUNK_BYTES: usize = 1 << 20;

const SOCKET_PORT: u16 = 47951;
const PUSH_PULL_PORT: u16 = 47952;

fn endpoint(args: &str, metrics_file: &str) -> String {
    let command = format!(
        "{} endpoint {} --total-bytes {} --chunk-bytes {} --metrics-file {}",
        env!("CARGO_BIN_EXE_ipcbench"),
        args,
        TOTAL_BYTES,
        CHUNK_BYTES,
        metrics_file
    );
    format!("'{}'", command.replace('\'', "''"))
}

fn catalogue(root: &Path) -> String {
    let pid = std::process::id();
    let shm = format!(
        "--segment ipcbench_sweep_{pid}_shm --empty-sem ipcbench_sweep_{pid}_empty --full-sem ipcbench_sweep_{pid}_full"
    );
    let native = format!("--segment ipcbench_sweep_{pid}_native");

    for dir in ["posix_shared_memory", "boost_int", "zmq", "sockets"] {
        fs::create_dir(root.join(dir)).unwrap();
    }

    format!(
        r#"
sweep:
  results_dir: results
  start_delay_ms: 200
  completion_timeout_secs: 60
methods:
  - name: posix_shared_memory
    transport: shared_memory
    roles:
      py_sender: {shm_sender}
      py_receiver: {shm_receiver}
    sender_metric: shm_sender_metrics.csv
    receiver_metric: shm_receiver_metrics.csv
  - name: boost_int
    transport: native
    roles:
      sender: {native_sender}
      receiver: {native_receiver}
    sender_metric: boost_sender_metrics.csv
    receiver_metric: boost_receiver_metrics.csv
  - name: zmq
    transport: push_pull
    roles:
      py_sender: {push_sender}
      py_receiver: {pull_receiver}
    sender_metric: zmq_sender_metrics.csv
    receiver_metric: zmq_receiver_metrics.csv
  - name: sockets
    transport: sockets
    roles:
      py_sender: {socket_sender}
      py_receiver: {socket_receiver}
    sender_metric: socket_sender_metrics.csv
    receiver_metric: socket_receiver_metrics.csv
"#,
        shm_sender = endpoint(
            &format!("shm-sender --reclaim-stale {}", shm),
            "shm_sender_metrics.csv"
        ),
        shm_receiver = endpoint(&format!("shm-receiver {}", shm), "shm_receiver_metrics.csv"),
        native_sender = endpoint(
            &format!("native-sender {}", native),
            "boost_sender_metrics.csv"
        ),
        native_receiver = endpoint(
            &format!("native-receiver {}", native),
            "boost_receiver_metrics.csv"
        ),
        push_sender = endpoint(
            &format!("push-sender --port {}", PUSH_PULL_PORT),
            "zmq_sender_metrics.csv"
        ),
        pull_receiver = endpoint(
            &format!("pull-receiver --port {}", PUSH_PULL_PORT),
            "zmq_receiver_metrics.csv"
        ),
        socket_sender = endpoint(
            &format!("socket-sender --port {}", SOCKET_PORT),
            "socket_sender_metrics.csv"
        ),
        socket_receiver = endpoint(
            &format!("socket-receiver --port {}", SOCKET_PORT),
            "socket_receiver_metrics.csv"
        ),
    )
}

#[tokio::test]
async fn test_endpoints_move_every_byte_across_processes() {
    let temp = TempDir::new().unwrap();
    let yaml = catalogue(temp.path());
    let config = ConfigLoader::load_string_at(&yaml, temp.path()).unwrap();

    let outcome = RunCoordinator::new(&config).run_sweep().await.unwrap();
    let tags: Vec<_> = outcome
        .runs
        .iter()
        .map(|r| r.metadata.tag.as_str().to_string())
        .collect();
    assert_eq!(
        tags,
        vec![
            "posix_shared_memory_py_sender_py_receiver",
            "boost_int_sender_receiver",
            "zmq_py_sender_py_receiver",
            "sockets_py_sender_py_receiver",
        ]
    );

    for run in &outcome.runs {
        let metadata = RunMetadata::read(&run.dir).unwrap();
        let tag = metadata.tag.as_str();
        assert!(!metadata.timed_out, "{} timed out", tag);
        assert!(metadata.sender.succeeded(), "{} sender failed", tag);
        assert!(metadata.receiver.succeeded(), "{} receiver failed", tag);
        assert_eq!(metadata.copied_files.len(), 2, "{} lost a metrics file", tag);

        let sent =
            MetricSample::read_csv(&run.dir.join(&metadata.sender_metric), Role::Sender).unwrap();
        let received =
            MetricSample::read_csv(&run.dir.join(&metadata.receiver_metric), Role::Receiver)
                .unwrap();
        assert_eq!(sent.bytes, TOTAL_BYTES, "{} sender byte count", tag);
        assert_eq!(received.bytes, TOTAL_BYTES, "{} receiver byte count", tag);
    }

    let summary = Aggregator::new()
        .with_catalogue(&config)
        .aggregate(&outcome.dir)
        .unwrap();
    assert_eq!(summary.runs, 4);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.by_method.len(), 3);
    assert!(summary.throughput.iter().all(|s| s.bytes == TOTAL_BYTES));
}
