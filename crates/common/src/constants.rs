//! Constants fixed by the specification (spec.md §6).

use alloy_primitives::Address;

/// The zero address: 20 zero bytes, used as the receiver of a `Creation`
/// frame until the contract has actually been deployed.
pub const ZERO_ADDRESS: Address = Address::ZERO;

/// The VM reports depth starting at 0 for the outermost call; the trace
/// annotator's convention is that depth 1 corresponds to one external frame,
/// so every VM-reported depth is offset by this amount before being compared
/// against the frame stack's external-frame count.
pub const DEPTH_OFFSET: u64 = 1;
