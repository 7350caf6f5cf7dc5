//! C1: the opcode table.
//!
//! A static classification keyed by opcode byte (mnemonics are attached for
//! logging and for the LOG-N / PUSH-N pattern matches the rest of the core
//! needs). This is the ground truth the stack reconciler (`txdbg-evm-traces`)
//! consults for "did this instruction increase call depth", "did it write to
//! memory", and "is it a LOG".

/// A classified instruction. Mirrors the properties spec.md §4.1 asks for;
/// `base_gas` is the *static* portion only — dynamic gas is supplied
/// per-step by the VM callback, not derivable from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCodeInfo {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub base_gas: u64,
    /// CALL, CALLCODE, DELEGATECALL, STATICCALL, CREATE, CREATE2.
    pub increases_depth: bool,
    /// CREATE, CREATE2.
    pub creates_contract: bool,
    /// Instructions that write to linear memory.
    pub changes_memory: bool,
    /// `Some(n)` for LOG0..LOG4, carrying the topic count `n`.
    pub log_n: Option<u8>,
}

impl OpCodeInfo {
    const fn new(opcode: u8, mnemonic: &'static str, base_gas: u64) -> Self {
        Self {
            opcode,
            mnemonic,
            base_gas,
            increases_depth: false,
            creates_contract: false,
            changes_memory: false,
            log_n: None,
        }
    }

    const fn depth_increasing(mut self) -> Self {
        self.increases_depth = true;
        self
    }

    const fn contract_creating(mut self) -> Self {
        self.creates_contract = true;
        self.increases_depth = true;
        self
    }

    const fn memory_changing(mut self) -> Self {
        self.changes_memory = true;
        self
    }
}

/// Is `opcode` a JUMP (0x56)?
pub const JUMP: u8 = 0x56;
/// Is `opcode` a JUMPDEST (0x5b)?
pub const JUMPDEST: u8 = 0x5b;

/// The six depth-increasing opcodes Rule A (spec.md §4.6) distinguishes by
/// byte value, plus CREATE/CREATE2 for symmetry with `creates_contract`.
pub const CREATE: u8 = 0xf0;
pub const CALL: u8 = 0xf1;
pub const CALLCODE: u8 = 0xf2;
pub const DELEGATECALL: u8 = 0xf4;
pub const CREATE2: u8 = 0xf5;
pub const STATICCALL: u8 = 0xfa;

/// Classifies a raw opcode byte. Unrecognised bytes (there are gaps in the
/// EVM's opcode space) classify as `INVALID` with zero gas and no special
/// properties, mirroring how real VMs treat undefined opcodes.
pub fn classify(opcode: u8) -> OpCodeInfo {
    use OpCodeInfo as Op;

    match opcode {
        0x00 => Op::new(0x00, "STOP", 0),
        0x01 => Op::new(0x01, "ADD", 3),
        0x02 => Op::new(0x02, "MUL", 5),
        0x03 => Op::new(0x03, "SUB", 3),
        0x04 => Op::new(0x04, "DIV", 5),
        0x05 => Op::new(0x05, "SDIV", 5),
        0x06 => Op::new(0x06, "MOD", 5),
        0x07 => Op::new(0x07, "SMOD", 5),
        0x08 => Op::new(0x08, "ADDMOD", 8),
        0x09 => Op::new(0x09, "MULMOD", 8),
        0x0a => Op::new(0x0a, "EXP", 10),
        0x0b => Op::new(0x0b, "SIGNEXTEND", 5),
        0x10 => Op::new(0x10, "LT", 3),
        0x11 => Op::new(0x11, "GT", 3),
        0x12 => Op::new(0x12, "SLT", 3),
        0x13 => Op::new(0x13, "SGT", 3),
        0x14 => Op::new(0x14, "EQ", 3),
        0x15 => Op::new(0x15, "ISZERO", 3),
        0x16 => Op::new(0x16, "AND", 3),
        0x17 => Op::new(0x17, "OR", 3),
        0x18 => Op::new(0x18, "XOR", 3),
        0x19 => Op::new(0x19, "NOT", 3),
        0x1a => Op::new(0x1a, "BYTE", 3),
        0x1b => Op::new(0x1b, "SHL", 3),
        0x1c => Op::new(0x1c, "SHR", 3),
        0x1d => Op::new(0x1d, "SAR", 3),
        0x20 => Op::new(0x20, "KECCAK256", 30),
        0x30 => Op::new(0x30, "ADDRESS", 2),
        0x31 => Op::new(0x31, "BALANCE", 100),
        0x32 => Op::new(0x32, "ORIGIN", 2),
        0x33 => Op::new(0x33, "CALLER", 2),
        0x34 => Op::new(0x34, "CALLVALUE", 2),
        0x35 => Op::new(0x35, "CALLDATALOAD", 3),
        0x36 => Op::new(0x36, "CALLDATASIZE", 2),
        0x37 => Op::new(0x37, "CALLDATACOPY", 3).memory_changing(),
        0x38 => Op::new(0x38, "CODESIZE", 2),
        0x39 => Op::new(0x39, "CODECOPY", 3).memory_changing(),
        0x3a => Op::new(0x3a, "GASPRICE", 2),
        0x3b => Op::new(0x3b, "EXTCODESIZE", 100),
        0x3c => Op::new(0x3c, "EXTCODECOPY", 100).memory_changing(),
        0x3d => Op::new(0x3d, "RETURNDATASIZE", 2),
        0x3e => Op::new(0x3e, "RETURNDATACOPY", 3).memory_changing(),
        0x3f => Op::new(0x3f, "EXTCODEHASH", 100),
        0x40 => Op::new(0x40, "BLOCKHASH", 20),
        0x41 => Op::new(0x41, "COINBASE", 2),
        0x42 => Op::new(0x42, "TIMESTAMP", 2),
        0x43 => Op::new(0x43, "NUMBER", 2),
        0x44 => Op::new(0x44, "PREVRANDAO", 2),
        0x45 => Op::new(0x45, "GASLIMIT", 2),
        0x46 => Op::new(0x46, "CHAINID", 2),
        0x47 => Op::new(0x47, "SELFBALANCE", 5),
        0x48 => Op::new(0x48, "BASEFEE", 2),
        0x50 => Op::new(0x50, "POP", 2),
        0x51 => Op::new(0x51, "MLOAD", 3),
        0x52 => Op::new(0x52, "MSTORE", 3).memory_changing(),
        0x53 => Op::new(0x53, "MSTORE8", 3).memory_changing(),
        0x54 => Op::new(0x54, "SLOAD", 100),
        0x55 => Op::new(0x55, "SSTORE", 100),
        0x56 => Op::new(0x56, "JUMP", 8),
        0x57 => Op::new(0x57, "JUMPI", 10),
        0x58 => Op::new(0x58, "PC", 2),
        0x59 => Op::new(0x59, "MSIZE", 2),
        0x5a => Op::new(0x5a, "GAS", 2),
        0x5b => Op::new(0x5b, "JUMPDEST", 1),
        0x5f => Op::new(0x5f, "PUSH0", 2),
        n @ 0x60..=0x7f => {
            push_opcode(n)
        }
        n @ 0x80..=0x8f => Op::new(n, dup_mnemonic(n), 3),
        n @ 0x90..=0x9f => Op::new(n, swap_mnemonic(n), 3),
        n @ 0xa0..=0xa4 => {
            let topics = n - 0xa0;
            let mut op = Op::new(n, log_mnemonic(topics), 375);
            op.log_n = Some(topics);
            op
        }
        0xf0 => Op::new(0xf0, "CREATE", 32000).contract_creating(),
        0xf1 => Op::new(0xf1, "CALL", 100).depth_increasing(),
        0xf2 => Op::new(0xf2, "CALLCODE", 100).depth_increasing(),
        0xf3 => Op::new(0xf3, "RETURN", 0),
        0xf4 => Op::new(0xf4, "DELEGATECALL", 100).depth_increasing(),
        0xf5 => Op::new(0xf5, "CREATE2", 32000).contract_creating(),
        0xfa => Op::new(0xfa, "STATICCALL", 100).depth_increasing(),
        0xfd => Op::new(0xfd, "REVERT", 0),
        0xfe => Op::new(0xfe, "INVALID", 0),
        0xff => Op::new(0xff, "SELFDESTRUCT", 5000),
        other => Op::new(other, "INVALID", 0),
    }
}

/// Number of bytes a PUSH-N instruction spans, including its own opcode
/// byte: `1 + N` (spec.md §4.2). Returns 1 for non-PUSH opcodes.
pub fn instruction_width(opcode: u8) -> u64 {
    match opcode {
        0x5f => 1,                        // PUSH0 pushes no immediate bytes
        n @ 0x60..=0x7f => 1 + (n - 0x5f) as u64,
        _ => 1,
    }
}

fn push_opcode(n: u8) -> OpCodeInfo {
    static NAMES: [&str; 32] = [
        "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9", "PUSH10",
        "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17", "PUSH18", "PUSH19",
        "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25", "PUSH26", "PUSH27", "PUSH28",
        "PUSH29", "PUSH30", "PUSH31", "PUSH32",
    ];
    OpCodeInfo::new(n, NAMES[(n - 0x60) as usize], 3)
}

fn dup_mnemonic(n: u8) -> &'static str {
    static NAMES: [&str; 16] = [
        "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10", "DUP11",
        "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
    ];
    NAMES[(n - 0x80) as usize]
}

fn swap_mnemonic(n: u8) -> &'static str {
    static NAMES: [&str; 16] = [
        "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9", "SWAP10",
        "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
    ];
    NAMES[(n - 0x90) as usize]
}

fn log_mnemonic(topics: u8) -> &'static str {
    match topics {
        0 => "LOG0",
        1 => "LOG1",
        2 => "LOG2",
        3 => "LOG3",
        _ => "LOG4",
    }
}
