// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for ipcbench.
//!
//! Every concern gets an explicit enum. Library code never returns
//! `Box<dyn Error>` or `anyhow::Result`; the binary edge may.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the harness and its endpoints.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Catalogue
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // =========================================================================
    // Harness Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Sweep error: {0}")]
    Sweep(#[from] SweepError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors reject a catalogue before any process is launched.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },

    #[error("Duplicate method name: {name}")]
    DuplicateMethodName { name: String },

    #[error("Method {method} mixes language-qualified roles with a fixed sender/receiver pair")]
    MixedRoleSet { method: String },

    #[error("Unknown role key '{key}' in method {method}")]
    UnknownRoleKey { method: String, key: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// Shared memory and semaphore errors. A collision with a leftover
/// primitive is fatal to the run that hits it.
#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("Failed to create shared memory region: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Shared memory object already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Shared memory object not found: {name}")]
    NotFound { name: String },

    #[error("Failed to open shared memory region: {name} - {reason}")]
    OpenFailed { name: String, reason: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Semaphore {name} failed: {reason}")]
    Semaphore { name: String, reason: String },

    #[error("Invalid region header in {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Payload size exceeds region capacity: {size} > {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Socket and push/pull transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr} after {attempts} attempts")]
    BindExhausted { addr: SocketAddr, attempts: u32 },

    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr} after {attempts} attempts: {reason}")]
    ConnectFailed {
        addr: SocketAddr,
        attempts: u32,
        reason: String,
    },

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Transfer IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Metrics file parse/write errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Metrics file {path} is missing column {column}")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Metrics file {path} has invalid value for {column}: {value}")]
    InvalidValue {
        path: PathBuf,
        column: String,
        value: String,
    },

    #[error("Metrics file {path} has no data row")]
    NoDataRow { path: PathBuf },

    #[error("Metrics IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Process lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Failed to wait for process {pid}: {reason}")]
    WaitFailed { pid: u32, reason: String },

    #[error("Failed to signal process group {pgid}: {reason}")]
    SignalFailed { pgid: i32, reason: String },
}

/// Sweep coordination errors. Only failures that make the whole sweep
/// impossible surface here; per-run failures are logged and recorded.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Sweep directory already exists: {path}")]
    SweepDirExists { path: PathBuf },

    #[error("Run directory already exists: {path}")]
    RunDirExists { path: PathBuf },

    #[error("Failed to write run metadata {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;
