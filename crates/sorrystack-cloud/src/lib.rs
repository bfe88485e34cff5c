//! sorrystack cloud abstraction
//!
//! This crate provides the provider abstraction for sorrystack: a provider
//! synthesizes a stack declaration into a template, plans are computed by
//! diffing the synthesis against a recorded baseline, and the baseline is kept
//! in `.sorrystack/state.json`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 sorrystack CLI                   │
//! │            (synth / diff / snapshot)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               sorrystack-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider { synthesize, plan } │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Synthesis   │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │  aws provider │
//! └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod provider;
pub mod state;
pub mod synthesis;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary};
pub use error::{CloudError, Result};
pub use provider::{CloudProvider, ResourceConfig, ResourceSet};
pub use state::{GlobalState, StackSnapshot, StateLock, StateManager};
pub use synthesis::{Artifact, Packaging, Synthesis, WrittenOutput};
