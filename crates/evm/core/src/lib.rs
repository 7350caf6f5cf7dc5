//! # txdbg-evm-core
//!
//! Data model (spec §3) and collaborator interfaces (spec §6) for the trace
//! annotator. This crate defines *what* a step, a frame, and a source
//! location look like, and the traits the host embeds to supply a VM, a
//! state manager, an artifact manager and an ABI decoder. The actual
//! annotation logic lives in `txdbg-evm-traces`.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod error;
pub mod interfaces;
pub mod opcode;
pub mod types;

pub use error::AnnotatorError;
pub use opcode::{classify, OpCodeInfo};
pub use types::*;
