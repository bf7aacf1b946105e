//! Process driver for the `7z` executable: argument assembly, retry /
//! priority / affinity discipline, and archive verification.
//!
//! This crate knows nothing about PoSh-Backup's configuration model; it
//! takes pre-normalized switch tokens and a small set of primitives
//! (priority enum, affinity string, retry knobs) and drives the child
//! process. Config resolution lives in the `poshbackupd` binary crate.

pub mod affinity;
pub mod argbuilder;
pub mod error;
pub mod invoker;
mod platform;
pub mod tester;
pub mod types;

pub use argbuilder::{build_args, ArchiveBuildOptions};
pub use error::{BuildError, SevenZipError, TestError};
pub use invoker::{ChildProcessRunner, InvokerConfig, ProcessRunner, SevenZipInvoker};
pub use tester::{test_archive, TestOutcome};
pub use types::{
    InvocationResult, ProcessPriority, SfxModule, SENTINEL_CONFIRM_DECLINED, SENTINEL_LAUNCH_FAILED,
    SENTINEL_UNINITIALIZED,
};
