// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! ipcbench Core Library
//!
//! Benchmark harness for interprocess transports. Provides the method
//! catalogue, the transfer protocols and their endpoints, the per-endpoint
//! metrics model, process lifecycle management and sweep coordination.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod process;
pub mod shm;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigLoader, MethodDescriptor, RoleSet, SweepConfig, SweepSettings};
pub use coordinator::{RunCoordinator, RunMetadata, RunRecord, SweepOutcome};
pub use error::{BenchError, BenchResult, HardValidationError};
pub use lifecycle::{LifecycleManager, PairOutcome};
pub use metrics::MetricSample;
pub use transport::EndpointConfig;
pub use types::{
    Language, MethodName, Port, Role, RoleKey, RunTag, StartOrder, TransferPlan, TransportKind,
};
