// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers and small enums for validated inputs.
//!
//! Types validate their invariants at construction so the rest of the
//! harness can rely on them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Default total payload per run: 10 GiB.
pub const DEFAULT_TOTAL_BYTES: u64 = 10 * 1024 * 1024 * 1024;
/// Default chunk size per transfer call: 16 MiB.
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024 * 1024;
/// Largest chunk a single transfer call may move: 1 GiB.
pub const MAX_CHUNK_BYTES: usize = 1024 * 1024 * 1024;

/// Validated method name from the catalogue.
/// Must be non-empty, alphanumeric with hyphens/underscores, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodName(String);

impl MethodName {
    /// Create a new MethodName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: name,
                reason: "Method name cannot be empty".to_string(),
            });
        }

        if name.len() > 64 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: name.clone(),
                reason: format!("Method name too long: {} chars (max 64)", name.len()),
            });
        }

        // Names become directory names, so keep them path-safe.
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: name,
                reason: "Method name must contain only ASCII alphanumerics, hyphens, and underscores"
                    .to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MethodName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MethodName> for String {
    fn from(name: MethodName) -> Self {
        name.0
    }
}

/// Validated network port.
/// Must be in range 1-65535 (0 is reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Create a new Port with validation.
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidPort {
                port,
                reason: "Port 0 is reserved and cannot be used".to_string(),
            });
        }
        Ok(Self(port))
    }

    /// Get the inner port value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = HardValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// How much data one run moves and in what unit.
///
/// Both endpoints of a pair must agree on the plan. The iteration count is
/// `ceil(total / chunk)`, so the bytes actually moved are always a whole
/// number of chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    total_bytes: u64,
    chunk_bytes: usize,
}

impl TransferPlan {
    /// Create a validated plan.
    pub fn new(total_bytes: u64, chunk_bytes: usize) -> Result<Self, HardValidationError> {
        if chunk_bytes == 0 || chunk_bytes > MAX_CHUNK_BYTES {
            return Err(HardValidationError::InvalidFieldValue {
                field: "chunk_bytes",
                value: chunk_bytes.to_string(),
                reason: format!("Must be between 1 and {} bytes", MAX_CHUNK_BYTES),
            });
        }
        if total_bytes == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "total_bytes",
                value: "0".to_string(),
                reason: "Total payload must be greater than 0".to_string(),
            });
        }
        Ok(Self {
            total_bytes,
            chunk_bytes,
        })
    }

    /// Rebuild a plan from a chunk size and an iteration count.
    pub fn from_iterations(chunk_bytes: usize, iterations: u64) -> Result<Self, HardValidationError> {
        Self::new(iterations.saturating_mul(chunk_bytes as u64), chunk_bytes)
    }

    /// Configured total payload in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Size of one chunk in bytes.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Number of chunk transfers needed to reach the total.
    pub fn iterations(&self) -> u64 {
        self.total_bytes.div_ceil(self.chunk_bytes as u64)
    }

    /// Bytes moved once every iteration completes.
    pub fn transferred_bytes(&self) -> u64 {
        self.iterations() * self.chunk_bytes as u64
    }
}

impl Default for TransferPlan {
    fn default() -> Self {
        Self {
            total_bytes: DEFAULT_TOTAL_BYTES,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

impl fmt::Display for TransferPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {} x {} byte chunks",
            self.total_bytes,
            self.iterations(),
            self.chunk_bytes
        )
    }
}

/// Endpoint role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    /// Column name of the role's byte counter in a metrics file.
    pub fn byte_column(&self) -> &'static str {
        match self {
            Role::Sender => "bytes_sent",
            Role::Receiver => "bytes_received",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => write!(f, "sender"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Implementation language of a language-qualified role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Py,
    Cpp,
}

impl Language {
    /// Short display name used in report labels.
    pub fn label(&self) -> &'static str {
        match self {
            Language::Py => "py",
            Language::Cpp => "c++",
        }
    }
}

/// Key naming one role slot of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKey {
    PySender,
    CppSender,
    PyReceiver,
    CppReceiver,
    Sender,
    Receiver,
}

impl RoleKey {
    /// Every key a catalogue may use.
    pub const ALL: [RoleKey; 6] = [
        RoleKey::PySender,
        RoleKey::CppSender,
        RoleKey::PyReceiver,
        RoleKey::CppReceiver,
        RoleKey::Sender,
        RoleKey::Receiver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKey::PySender => "py_sender",
            RoleKey::CppSender => "cpp_sender",
            RoleKey::PyReceiver => "py_receiver",
            RoleKey::CppReceiver => "cpp_receiver",
            RoleKey::Sender => "sender",
            RoleKey::Receiver => "receiver",
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RoleKey::PySender | RoleKey::CppSender | RoleKey::Sender => Role::Sender,
            RoleKey::PyReceiver | RoleKey::CppReceiver | RoleKey::Receiver => Role::Receiver,
        }
    }

    /// Language qualifier, `None` for the fixed pair keys.
    pub fn language(&self) -> Option<Language> {
        match self {
            RoleKey::PySender | RoleKey::PyReceiver => Some(Language::Py),
            RoleKey::CppSender | RoleKey::CppReceiver => Some(Language::Cpp),
            RoleKey::Sender | RoleKey::Receiver => None,
        }
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown role key '{}'", s))
    }
}

/// Transport mechanism under benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    SharedMemory,
    Sockets,
    PushPull,
    Native,
}

/// Which endpoint the lifecycle manager launches first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOrder {
    /// The sender creates the IPC resource; the receiver attaches later.
    SenderFirst,
    /// The receiver binds; the sender connects later and runs to completion.
    ReceiverFirst,
}

impl TransportKind {
    pub fn start_order(&self) -> StartOrder {
        match self {
            TransportKind::SharedMemory | TransportKind::Native => StartOrder::SenderFirst,
            TransportKind::Sockets | TransportKind::PushPull => StartOrder::ReceiverFirst,
        }
    }

    /// Short prefix used in report labels.
    pub fn short_label(&self) -> &'static str {
        match self {
            TransportKind::SharedMemory => "shm",
            TransportKind::Sockets => "sock",
            TransportKind::PushPull => "zmq",
            TransportKind::Native => "boost",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::SharedMemory => write!(f, "shared_memory"),
            TransportKind::Sockets => write!(f, "sockets"),
            TransportKind::PushPull => write!(f, "push_pull"),
            TransportKind::Native => write!(f, "native"),
        }
    }
}

/// Unique name of one run inside a sweep.
///
/// Always `<method>_<sender_key>_<receiver_key>`, a pure function of the
/// triple, so two runs of one sweep never share a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunTag(String);

impl RunTag {
    pub fn derive(method: &MethodName, sender: RoleKey, receiver: RoleKey) -> Self {
        Self(format!("{}_{}_{}", method, sender, receiver))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_name_valid() {
        assert!(MethodName::new("posix_shared_memory").is_ok());
        assert!(MethodName::new("boost-int").is_ok());
        assert!(MethodName::new("zmq").is_ok());
    }

    #[test]
    fn test_method_name_invalid() {
        assert!(MethodName::new("").is_err());
        assert!(MethodName::new("a".repeat(65)).is_err());
        assert!(MethodName::new("../escape").is_err());
        assert!(MethodName::new("two words").is_err());
    }

    #[test]
    fn test_port_invalid() {
        assert!(Port::new(0).is_err());
        assert_eq!(Port::new(5000).unwrap().value(), 5000);
    }

    #[test]
    fn test_transfer_plan_iterations() {
        let plan = TransferPlan::new(64 * 1024, 16 * 1024).unwrap();
        assert_eq!(plan.iterations(), 4);
        assert_eq!(plan.transferred_bytes(), 64 * 1024);

        // A partial last chunk still moves a whole chunk.
        let plan = TransferPlan::new(10, 4).unwrap();
        assert_eq!(plan.iterations(), 3);
        assert_eq!(plan.transferred_bytes(), 12);
    }

    #[test]
    fn test_transfer_plan_defaults() {
        let plan = TransferPlan::default();
        assert_eq!(plan.iterations(), 640);
    }

    #[test]
    fn test_transfer_plan_invalid() {
        assert!(TransferPlan::new(0, 1024).is_err());
        assert!(TransferPlan::new(1024, 0).is_err());
        assert!(TransferPlan::new(1024, MAX_CHUNK_BYTES + 1).is_err());
    }

    #[test]
    fn test_role_key_round_trip_and_roles() {
        for key in RoleKey::ALL {
            assert_eq!(key.as_str().parse::<RoleKey>().unwrap(), key);
        }
        assert_eq!(RoleKey::CppReceiver.role(), Role::Receiver);
        assert_eq!(RoleKey::PySender.language(), Some(Language::Py));
        assert_eq!(RoleKey::Sender.language(), None);
        assert!("rust_sender".parse::<RoleKey>().is_err());
    }

    #[test]
    fn test_start_order() {
        assert_eq!(
            TransportKind::SharedMemory.start_order(),
            StartOrder::SenderFirst
        );
        assert_eq!(TransportKind::Native.start_order(), StartOrder::SenderFirst);
        assert_eq!(
            TransportKind::Sockets.start_order(),
            StartOrder::ReceiverFirst
        );
        assert_eq!(
            TransportKind::PushPull.start_order(),
            StartOrder::ReceiverFirst
        );
    }

    #[test]
    fn test_run_tag_is_pure_function_of_triple() {
        let method = MethodName::new("sockets").unwrap();
        let a = RunTag::derive(&method, RoleKey::PySender, RoleKey::PyReceiver);
        let b = RunTag::derive(&method, RoleKey::PySender, RoleKey::PyReceiver);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "sockets_py_sender_py_receiver");

        let c = RunTag::derive(&method, RoleKey::PySender, RoleKey::CppReceiver);
        assert_ne!(a, c);
    }
}
