//! Core library for `junction_mover`.
//!
//! Moves a directory to another volume and leaves a directory junction (a
//! symbolic link on Unix) at the original path, or reverses that. The
//! privileged filesystem work runs as one script through an [`bridge::Elevator`];
//! the [`engine::RelocationEngine`] validates, runs the safety checks, and
//! tracks step and progress from the script's transfer log.

pub mod advisory;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod inspect;
pub mod model;
pub mod output;
pub mod platform;
pub mod safety;
pub mod script;
pub mod shutdown;
pub mod telemetry;
pub mod utils;

pub use bridge::{Elevator, ExecOutput, InProcessElevator, PowerShellElevator, ShellElevator, SimulatedElevator};
pub use config::{
    Config, ExecutionMode, LoadResult, LogLevel, default_config_path, default_log_path,
    load_config_from_xml_path, path_has_symlink_ancestor,
};
pub use discovery::{DEFAULT_SCAN_LIMIT, discover};
pub use engine::{JobObserver, NullObserver, RelocationEngine};
pub use errors::RelocateError;
pub use inspect::{LinkInfo, NativeInspector, ReparseInspector};
pub use model::{
    Direction, FolderDescriptor, MoveStep, Progress, RelocateOptions, RelocationJob,
    RelocationResult, Severity,
};
pub use safety::{FixedVolume, NativeVolume, SafetyChecker, VolumeProbe};
pub use script::Script;
