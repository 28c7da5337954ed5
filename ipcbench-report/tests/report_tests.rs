// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Aggregation over sweep trees produced by the coordinator.

use std::fs;

use ipcbench_core::{ConfigLoader, Role, RunCoordinator};
use ipcbench_report::{render_table, Aggregator, SummaryReporter, SUMMARY_FILE};
use tempfile::TempDir;

fn csv_command(file: &str, column: &str, bytes: u64, active: &str) -> String {
    let command = format!(
        r#"printf "active_time_sec,wall_time_sec,{},rss_mb\n{},1.0,{},8.00\n" > {}"#,
        column, active, bytes, file
    );
    format!("'{}'", command.replace('\'', "''"))
}

#[tokio::test]
async fn test_sweep_to_summary() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sockets")).unwrap();
    fs::create_dir(temp.path().join("boost_int")).unwrap();

    let yaml = format!(
        r#"
sweep:
  results_dir: results
  start_delay_ms: 20
  completion_timeout_secs: 10
methods:
  - name: sockets
    transport: sockets
    roles:
      py_sender: {sender}
      py_receiver: {receiver}
    sender_metric: socket_sender_metrics.csv
    receiver_metric: socket_receiver_metrics.csv
  - name: boost_int
    transport: native
    roles:
      sender: {sender_fixed}
      receiver: {receiver_fixed}
    sender_metric: boost_sender_metrics.csv
    receiver_metric: boost_reciever_metrics.csv
"#,
        sender = csv_command("socket_sender_metrics.csv", "bytes_sent", 4 << 20, "2.0"),
        receiver = csv_command("socket_receiver_metrics.csv", "bytes_received", 4 << 20, "2.0"),
        sender_fixed = csv_command("boost_sender_metrics.csv", "bytes_sent", 1 << 20, "1.0"),
        receiver_fixed = csv_command("boost_reciever_metrics.csv", "bytes_received", 1 << 20, "0"),
    );
    let config = ConfigLoader::load_string_at(&yaml, temp.path()).unwrap();
    let outcome = RunCoordinator::new(&config).run_sweep().await.unwrap();
    assert_eq!(outcome.runs.len(), 2);

    let summary = Aggregator::new()
        .with_catalogue(&config)
        .aggregate(&outcome.dir)
        .unwrap();

    assert_eq!(summary.runs, 2);
    // The fixed receiver reported no active time.
    assert_eq!(summary.throughput.len(), 3);
    assert_eq!(summary.memory.len(), 4);
    assert!(summary.skipped.is_empty());

    let socket: Vec<_> = summary
        .throughput
        .iter()
        .filter(|s| s.run_tag == "sockets_py_sender_py_receiver")
        .collect();
    assert_eq!(socket.len(), 2);
    assert!(socket.iter().all(|s| s.mb_per_sec == 2.0));
    assert!(socket.iter().all(|s| s.label == "sock_py->py"));

    assert_eq!(summary.throughput_for(Role::Receiver).count(), 1);

    // Fixed pairs are not grouped per method.
    assert_eq!(summary.by_method.len(), 1);
    assert_eq!(summary.by_method[0].method, "sockets");
    assert_eq!(summary.by_method[0].throughput.len(), 2);

    let path = SummaryReporter::save(&summary).unwrap();
    assert_eq!(path, outcome.dir.join(SUMMARY_FILE));
    let reloaded = SummaryReporter::load(&path).unwrap();
    assert_eq!(reloaded.throughput, summary.throughput);

    // Re-aggregating ignores the summary file itself.
    let again = Aggregator::new().aggregate(&outcome.dir).unwrap();
    assert_eq!(again.runs, 2);

    let table = render_table(&summary);
    assert!(table.contains("sock_py->py"));
    assert!(table.contains("boost"));
}

#[test]
fn test_tree_without_metadata_falls_back_to_names() {
    let temp = TempDir::new().unwrap();
    let run = temp.path().join("zmq_py_sender_cpp_receiver");
    fs::create_dir(&run).unwrap();
    fs::write(
        run.join("zmq_receiver_metrics.csv"),
        "active_time_sec,wall_time_sec,bytes_received\n1.0,1.1,1048576\n",
    )
    .unwrap();

    let summary = Aggregator::new().aggregate(temp.path()).unwrap();
    assert_eq!(summary.throughput.len(), 1);
    assert_eq!(summary.throughput[0].label, "zmq_py->c++");
    assert!(summary.memory.is_empty());
    assert_eq!(summary.by_method.len(), 1);
}
