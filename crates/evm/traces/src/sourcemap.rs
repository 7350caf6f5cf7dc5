//! C2: parses a solc-style compressed source map (`start:length:sourceIndex:
//! jump` triples, comma-separated, each field inheriting the previous
//! entry's value when omitted) and builds the PC -> instruction-index table
//! a running trace needs to resolve "where in the source is PC `p`"
//! (spec.md §4.2).

use rpds::HashTrieMap;
use txdbg_evm_core::opcode;
use txdbg_evm_core::types::{JumpKind, SourceMap, SourceTriple};

/// Parses `text` (the raw compressed source map) into a [`SourceMap`] that
/// can resolve runtime PCs once combined with the contract's deployed
/// bytecode via [`index_by_pc`].
///
/// Per solc's compression rule, any of the four fields may be empty in an
/// entry after the first, meaning "same as the previous entry's value."
pub fn parse_source_map(text: &str) -> Vec<SourceTriple> {
    let mut triples = Vec::new();
    let mut prev = SourceTriple {
        start: 0,
        length: 0,
        source_index: -1,
        jump: JumpKind::Regular,
    };

    for entry in text.split(';') {
        if entry.is_empty() {
            triples.push(prev);
            continue;
        }
        let mut fields = entry.split(':');
        let start = fields
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .unwrap_or(prev.start);
        let length = fields
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .unwrap_or(prev.length);
        let source_index = fields
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
            .unwrap_or(prev.source_index);
        let jump = fields
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "i" => JumpKind::In,
                "o" => JumpKind::Out,
                _ => JumpKind::Regular,
            })
            .unwrap_or(prev.jump);

        let triple = SourceTriple {
            start,
            length,
            source_index,
            jump,
        };
        triples.push(triple);
        prev = triple;
    }

    triples
}

/// Builds the PC -> instruction-index table by walking `bytecode` in order
/// and accounting for PUSH-N immediate widths, so the table only contains
/// entries at byte offsets that actually begin an instruction
/// (spec.md §4.2 edge case: a PC that lands mid-immediate resolves to
/// `None`).
pub fn index_by_pc(bytecode: &[u8]) -> HashTrieMap<u64, usize> {
    let mut map = HashTrieMap::new();
    let mut pc: u64 = 0;
    let mut index = 0usize;

    while (pc as usize) < bytecode.len() {
        map = map.insert(pc, index);
        let width = opcode::instruction_width(bytecode[pc as usize]);
        pc += width;
        index += 1;
    }

    map
}

/// Convenience combinator: parses the source map text and indexes it
/// against the contract's bytecode in one step.
pub fn build_source_map(text: &str, bytecode: &[u8]) -> SourceMap {
    SourceMap {
        triples: parse_source_map(text),
        pc_to_index: index_by_pc(bytecode),
    }
}
