#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`JanitorError`)
//! - [`config`]: Removal policy (`RemovalPolicy`, builder)
//! - [`runtime`]: Container runtime abstraction (`ContainerRuntime` trait, `BollardRuntime`)
//! - [`policy`]: Eligibility rules (`is_container_removable`, `is_image_expired`, ...)
//! - [`filter`]: Label filter (`filter_ignored`)
//! - [`remover`]: Bounded batch removal (`BatchRemover`, `RemovalReport`)
//! - [`sweep`]: List-then-remove passes (`Sweeper`)
//! - [`watcher`]: Lifecycle orchestrator (`Watcher`, `run_cleanup`)

pub mod config;
pub mod error;
pub mod filter;
pub mod policy;
pub mod remover;
pub mod runtime;
pub mod sweep;
pub mod watcher;

// --- Public API Re-exports ---

// Watcher (main orchestrator)
pub use watcher::{TerminationReason, Watcher, WatcherState, run_cleanup};

// Configuration
pub use config::{RemovalPolicy, RemovalPolicyBuilder};

// Error
pub use error::JanitorError;

// Runtime API
pub use runtime::{
    BollardRuntime, ContainerInspection, ContainerRuntime, EventStream, ImageInspection,
    RemoveContainerOptions,
};

// Policy
pub use policy::{
    CREATED_TIMEOUT, is_container_removable, is_creation_stuck, is_image_dangling,
    is_image_expired, restart_policy_allows_removal,
};

// Filter
pub use filter::{filter_ignored, is_ignored};

// Removal
pub use remover::{BatchRemover, RemovalOutcome, RemovalReport};

// Sweep
pub use sweep::Sweeper;
