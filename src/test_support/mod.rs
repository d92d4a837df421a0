//! Test utilities shared across crate-level unit tests.

pub mod collaborators;

pub use collaborators::{
    manual_script_loader, sample_ambient, FailingTracker, FixedLocation, ManualScriptLoader,
    RecordingTracker,
};
