//! # txdbg-evm-traces
//!
//! The trace annotator itself (spec.md §4): turns the raw per-instruction
//! callbacks a host's VM collaborator produces into an annotated
//! [`txdbg_evm_core::types::Trace`] with a reconstructed logical call stack,
//! resolved source locations and decoded events.
//!
//! The pipeline, in the order data flows through it:
//!
//! 1. [`sourcemap`] (C2) parses a compiler source map into a PC-indexed table.
//! 2. [`code_id`] (C4) hashes deployed/creation code and strips CBOR trailers.
//! 3. [`normalizer`] (C3) turns [`RawStep`]s into [`StepVMState`]s.
//! 4. [`frame`] (C5) builds [`Frame`]s for CALL/CREATE lifecycle events.
//! 5. [`reconciler`] (C6) is the state machine that maintains the logical
//!    call stack across steps — the heart of the system.
//! 6. [`events`] (C7) extracts and decodes `LOG0..LOG4` into [`EventDesc`]s.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod code_id;
pub mod events;
pub mod frame;
pub mod normalizer;
pub mod reconciler;
pub mod sourcemap;

pub use reconciler::Reconciler;
pub use sourcemap::parse_source_map;

/// Re-exported so downstream crates can match on core types without a direct
/// `txdbg-evm-core` dependency for the common ones.
pub use txdbg_evm_core::interfaces::RawStep;
pub use txdbg_evm_core::types::{EventDesc, StepVMState};
