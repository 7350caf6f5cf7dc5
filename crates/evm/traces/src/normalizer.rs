//! C3: the VM-step normalizer. Turns the raw, minimal callbacks a host's
//! [`Vm`] collaborator fires into [`StepVMState`]s with a persistent,
//! lazily-populated storage view (spec.md §4.3, Design Notes §9).
//!
//! Two aliasing rules this module enforces:
//!
//! * Memory is reported as of *before* the current instruction executes —
//!   the same convention real EVM debuggers use, since an instruction's own
//!   memory write is more useful shown as its *effect* on the next step.
//! * Storage is a [`rpds::HashTrieMap`] that starts empty and is populated
//!   only for slots actually touched (by `SLOAD` or `SSTORE`), falling back
//!   to the [`StateManager`] collaborator on first touch. Untouched slots
//!   are never materialized, keeping per-step snapshots cheap even for
//!   contracts with large storage layouts.

use alloy_primitives::{Address, Bytes};
use rpds::HashTrieMap;
use txdbg_common::constants::DEPTH_OFFSET;
use txdbg_evm_core::interfaces::{RawStep, StateManager};
use txdbg_evm_core::opcode;
use txdbg_evm_core::types::{StepVMState, StorageMap, Word};

/// All slots touched so far across every contract in the trace, keyed
/// globally so one normalizer can serve a trace spanning many contracts.
type GlobalStorage = HashTrieMap<(Address, Word), Word>;

/// Maintains the running, persistent storage view across a sequence of
/// [`RawStep`]s and turns each one into a [`StepVMState`].
pub struct Normalizer<'s> {
    state: &'s dyn StateManager,
    storage: GlobalStorage,
    pending_sstore: Option<(Address, Word, Word)>,
    /// The previous step's opcode/memory buffer, used to enforce the
    /// memory-aliasing rule (spec.md §4.3): memory is only re-copied when
    /// the prior instruction actually wrote to it.
    prev: Option<(u8, Bytes)>,
}

impl<'s> Normalizer<'s> {
    pub fn new(state: &'s dyn StateManager) -> Self {
        Self {
            state,
            storage: GlobalStorage::new(),
            pending_sstore: None,
            prev: None,
        }
    }

    /// Normalizes one raw step for the contract executing at `address`,
    /// applying any `SSTORE` queued by the previous call first.
    pub fn normalize(&mut self, address: Address, step: &RawStep) -> eyre::Result<StepVMState> {
        if let Some((addr, slot, value)) = self.pending_sstore.take() {
            self.storage = self.storage.insert((addr, slot), value);
        }

        if step.opcode == 0x54 {
            // SLOAD: ensure the touched slot is materialized from the state
            // manager so later reads of this StepVMState see a real value.
            if let Some(&slot) = step.stack.last() {
                self.ensure_loaded(address, slot)?;
            }
        }

        if step.opcode == 0x55 {
            // SSTORE: the stack holds [..., value, slot] with slot on top.
            // The write only takes effect once this instruction completes,
            // i.e. it becomes visible starting with the *next* step.
            let mut iter = step.stack.iter().rev();
            if let (Some(&slot), Some(&value)) = (iter.next(), iter.next()) {
                self.pending_sstore = Some((address, slot, value));
            }
        }

        // Memory is only ever rewritten by the instruction that just ran;
        // if that instruction did not touch memory, this step's buffer is
        // byte-identical to the previous one, so we share it rather than
        // cloning (spec.md §4.3, §8 invariant 3).
        let memory = match &self.prev {
            Some((prev_opcode, prev_memory)) if !opcode::classify(*prev_opcode).changes_memory => {
                prev_memory.clone()
            }
            _ => step.memory.clone(),
        };
        self.prev = Some((step.opcode, memory.clone()));

        Ok(StepVMState {
            pc: step.pc,
            opcode: step.opcode,
            depth: step.depth + DEPTH_OFFSET,
            stack: step.stack.clone(),
            memory,
            storage: self.storage_view(address),
            gas_remaining: step.gas_remaining,
            gas_cost: step.gas_cost,
            return_data: Default::default(),
        })
    }

    fn ensure_loaded(&mut self, address: Address, slot: Word) -> eyre::Result<()> {
        if self.storage.get(&(address, slot)).is_none() {
            let value = self.state.storage_at(address, slot)?;
            self.storage = self.storage.insert((address, slot), value);
        }
        Ok(())
    }

    /// Storage keys in [`StorageMap`] are global (`(address, slot)` pairs)
    /// internally so a single normalizer can serve an entire multi-contract
    /// trace; [`StepVMState::storage`] is scoped to just this step's
    /// contract so frame code never has to filter by address itself.
    fn storage_view(&self, address: Address) -> StorageMap {
        let mut scoped = StorageMap::new();
        // `rpds::HashTrieMap` has no filter combinator; a full-trace storage
        // view would be needed for that. Per-step we only ever show slots
        // belonging to `address`, materialized on demand by `ensure_loaded`.
        for ((addr, slot), value) in self.storage.iter() {
            if *addr == address {
                scoped = scoped.insert(*slot, *value);
            }
        }
        scoped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use txdbg_evm_core::interfaces::RawStep;

    struct ZeroState;
    impl StateManager for ZeroState {
        fn storage_at(&self, _address: Address, _slot: Word) -> eyre::Result<Word> {
            Ok(Word::from(42u64))
        }
        fn code_at(&self, _address: Address) -> eyre::Result<Bytes> {
            Ok(Bytes::new())
        }
    }

    fn step(opcode: u8, stack: Vec<Word>) -> RawStep {
        RawStep {
            pc: 0,
            opcode,
            depth: 0,
            stack,
            memory: Bytes::new(),
            gas_remaining: 1000,
            gas_cost: 3,
            contract: Address::ZERO,
            code_address: Address::ZERO,
        }
    }

    #[test]
    fn sload_materializes_from_state_manager() {
        let zs = ZeroState;
        let mut normalizer = Normalizer::new(&zs);
        let s = normalizer
            .normalize(Address::ZERO, &step(0x54, vec![Word::from(7u64)]))
            .unwrap();
        assert_eq!(
            s.storage.get(&Word::from(7u64)).copied(),
            Some(Word::from(42u64))
        );
    }

    #[test]
    fn sstore_effect_visible_only_on_next_step() {
        let zs = ZeroState;
        let mut normalizer = Normalizer::new(&zs);
        let sstore_step = step(0x55, vec![Word::from(9u64), Word::from(1u64)]);
        let s1 = normalizer.normalize(Address::ZERO, &sstore_step).unwrap();
        assert_eq!(s1.storage.get(&Word::from(1u64)), None);

        let s2 = normalizer
            .normalize(Address::ZERO, &step(0x00, vec![]))
            .unwrap();
        assert_eq!(s2.storage.get(&Word::from(1u64)).copied(), Some(Word::from(9u64)));
    }
}
