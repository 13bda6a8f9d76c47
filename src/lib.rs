pub mod api;
pub mod baseline;
pub mod canonical;
pub mod chain;
pub mod classify;
pub mod config;
pub mod diff;
pub mod digest;
pub mod drift;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod matcher;
pub mod observer;
pub mod signer;
pub mod transition;
pub mod tree;

pub use baseline::{Baseline, BaselineSet, StructuralRef};
pub use chain::{ImmutableLog, LogEntry, LogPayload, MemStore, ObservationRecord, SledStore};
pub use diff::{Change, ChangeKind};
pub use digest::Digest;
pub use drift::{DriftEvent, DriftKind, Severity};
pub use error::DriftError;
pub use fingerprint::Fingerprint;
pub use matcher::MatchResult;
pub use observer::{Observation, Observer};
pub use signer::ReceiptSigner;
pub use transition::{TransitionChecker, TransitionReport};
pub use tree::{Capture, Node, RoleTag, Tree};
