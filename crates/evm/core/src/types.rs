//! The data model (spec.md §3): everything the trace annotator reads,
//! builds and hands back to the host. Nothing in this module *computes*
//! anything; the behaviour lives in `txdbg-evm-traces`.

use alloy_primitives::{Address, Bytes, B256, U256};
use rpds::{HashTrieMap, Vector};

/// A single word on the VM's operand stack or in storage.
pub type Word = U256;

/// solc's three jump-kind annotations on a source-map triple (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum JumpKind {
    /// `i`: a call into a function.
    In,
    /// `o`: a return out of a function.
    Out,
    /// `-`: an ordinary intra-function jump (loops, branches).
    Regular,
}

/// A resolved `start:length:sourceIndex:jump` source-map entry (spec.md §4.2,
/// §3 `SourceTriple`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceTriple {
    pub start: u32,
    pub length: u32,
    pub source_index: i32,
    pub jump: JumpKind,
}

/// The compiler's calldata ABI-encoding convention, needed by `decodeFunArgs`
/// to know whether a dynamic type occupies one stack slot (a pointer, under
/// the newer encoder) or two (offset + length, under the older one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiEncoderVersion {
    V1,
    V2,
}

/// Where a decoded function argument or state variable physically lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLocation {
    Stack { offset_from_top: usize },
    Memory { offset: Word },
    Storage { slot: Word, byte_offset: u8 },
    Calldata { offset: Word },
}

/// A resolved value together with the type the artifact manager says it has.
/// `raw` is the verbatim word(s); decoding them into an ABI-dynamic value is
/// the `AbiDecoder` collaborator's job (spec.md §6.4), not the core's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataView {
    pub name: String,
    pub type_info: TypeInfo,
    pub location: DataLocation,
    pub raw: Vec<Word>,
}

/// The minimal type description the annotator needs to know a type's
/// encoded width and dynamicness; full ABI typing is the artifact manager's
/// domain (spec.md §6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// The Solidity type string, e.g. `uint256`, `bytes`, `MyStruct`.
    pub display: String,
    pub is_dynamic: bool,
}

/// One parameter of a function, constructor or event (spec.md §3 `Param`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub type_info: TypeInfo,
    pub indexed: bool,
}

/// A function definition as reported by the artifact manager (spec.md §6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub selector: [u8; 4],
    pub params: Vec<Param>,
    pub ast_node_id: Option<u64>,
}

/// A public or internal state variable (spec.md §3 `StateVariableDef`).
///
/// `selector`/`getter_arity` only matter for *public* variables: solc
/// synthesizes an external getter for them whose selector is the keccak hash
/// of a canonical `name(keyType1,keyType2,...)` signature and whose formal
/// parameters are the variable's mapping/array index keys (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariableDef {
    pub name: String,
    pub type_info: TypeInfo,
    pub slot: Word,
    pub byte_offset: u8,
    /// The synthesized getter's 4-byte selector.
    pub selector: [u8; 4],
    /// Number of index arguments the synthesized getter takes (0 for a plain
    /// scalar, 1 for `mapping(K => V)` or a dynamic array, more for nested
    /// mappings).
    pub getter_arity: usize,
}

impl StateVariableDef {
    /// Synthesizes the getter's formal parameter list: `decodeFunArgs` has no
    /// `Param` metadata to draw on for a compiler-generated getter, so it
    /// names each one `ARG_i` (spec.md §4.6 `decodeFunArgs`). The key type is
    /// not modeled here, so every synthesized parameter reports as
    /// `uint256`-shaped; real index types would need `ContractInfo` to carry
    /// them.
    pub fn getter_params(&self) -> Vec<Param> {
        (0..self.getter_arity)
            .map(|i| Param {
                name: format!("ARG_{i}"),
                type_info: TypeInfo {
                    display: "uint256".into(),
                    is_dynamic: false,
                },
                indexed: false,
            })
            .collect()
    }
}

/// A contract's constructor, if it declares one explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorDef {
    pub params: Vec<Param>,
}

/// An event definition, used by the event extractor (C7) to pair a LOG's
/// topic0 with its decoded fields (spec.md §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDef {
    pub name: String,
    pub signature_hash: B256,
    pub params: Vec<Param>,
}

/// What kind of source entity a JUMP(In) is jumping into: resolved from the
/// AST node the jump destination's source triple points at (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Function(FunctionDef),
    Modifier { name: String },
    /// A public state variable resolved by matching a synthesized getter
    /// selector (spec.md §4.5).
    StateVariable(StateVariableDef),
    Unknown,
}

/// An opaque AST node handle. The annotator never interprets AST internals
/// beyond asking the artifact manager to resolve one into a [`Callee`] or a
/// human string (spec.md §6.3 treats the AST as external).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AstNodeId(pub u64);

/// Everything the artifact manager knows about one compiled contract
/// (spec.md §3 `ContractInfo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub name: String,
    pub functions: Vec<FunctionDef>,
    pub state_variables: Vec<StateVariableDef>,
    pub constructor: Option<ConstructorDef>,
    pub events: Vec<EventDef>,
    pub abi_encoder_version: AbiEncoderVersion,
}

/// A resolved PC -> instruction-index table plus the raw triples, built once
/// per contract by C2 (spec.md §4.2). `pc_to_index` has one entry per byte
/// offset that begins an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMap {
    pub triples: Vec<SourceTriple>,
    pub pc_to_index: HashTrieMap<u64, usize>,
}

impl SourceMap {
    /// Looks up the source triple active at a given program counter, or
    /// `None` if `pc` does not begin an instruction (mid-PUSH-immediate) or
    /// falls outside the map (spec.md §4.2 edge case).
    pub fn triple_at_pc(&self, pc: u64) -> Option<&SourceTriple> {
        let index = self.pc_to_index.get(&pc)?;
        self.triples.get(*index)
    }
}

/// A code identifier: the hash used to recognise "the same contract code"
/// across frames without relying on address identity (spec.md §4.4), plus
/// whatever metadata the CBOR trailer yielded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeId {
    pub code_hash: B256,
    pub has_metadata: bool,
}

/// Runtime vs. creation bytecode, the two code identifiers the annotator
/// tracks per contract (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeIds {
    pub runtime: CodeId,
    pub creation: CodeId,
}

/// Which of the four external call opcodes produced an [`ExternalCallFrame`]
/// (spec.md §3 `CallType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

/// Which of the two creation opcodes produced a [`CreationFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateType {
    Create,
    Create2,
}

/// What source-level construct an internal-call frame represents
/// (spec.md §3 `InternalCallKind`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalCallKind {
    Function(FunctionDef),
    Modifier { name: String },
    /// An internally-jumped-to public state-variable getter (spec.md §4.6).
    StateVariable(StateVariableDef),
    Unresolved,
}

/// An external message call or delegatecall frame (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCallFrame {
    pub call_type: CallType,
    pub caller: Address,
    pub callee: Address,
    /// The address whose code is executing — differs from `callee` under
    /// DELEGATECALL/CALLCODE, where code runs in the caller's context.
    pub code_address: Address,
    pub value: Word,
    pub input: Bytes,
    pub depth: u64,
    pub contract: Option<ContractInfo>,
    /// The function or public state-variable getter `input`'s selector
    /// matched, if any (spec.md §4.5).
    pub entry_callee: Option<Callee>,
    /// Decoded call arguments, one entry per formal parameter, in
    /// declaration order (spec.md §3 `Frame`).
    pub arguments: Vec<(String, Option<DataView>)>,
}

/// A contract-creation frame (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationFrame {
    pub create_type: CreateType,
    pub creator: Address,
    /// The zero address: nothing in the single-callback step stream ever
    /// reports the deployed address back to the frame stack, so this field
    /// stays at its initial value for the frame's entire lifetime
    /// (spec.md §4.6, DESIGN.md Open Question).
    pub pending_address: Address,
    pub init_code: Bytes,
    pub value: Word,
    pub depth: u64,
    pub contract: Option<ContractInfo>,
}

/// A same-contract function-call frame inferred from JUMP/JUMPDEST pairs
/// (spec.md §3, §4.5). `parent_external` is a non-owning index into the
/// [`FrameStack`] pointing at the nearest enclosing external or creation
/// frame — never an owning reference, to avoid reference cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCallFrame {
    pub kind: InternalCallKind,
    pub entry_pc: u64,
    pub return_pc: u64,
    pub parent_external: usize,
    /// Decoded call arguments reconstructed from the operand stack at the
    /// JUMP that entered this frame (spec.md §4.6 `decodeFunArgs`).
    pub arguments: Vec<(String, Option<DataView>)>,
}

/// One entry of the logical call stack the reconciler (C6) maintains
/// (spec.md §3 `Frame`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    External(ExternalCallFrame),
    Creation(CreationFrame),
    Internal(InternalCallFrame),
}

impl Frame {
    pub fn is_external(&self) -> bool {
        matches!(self, Frame::External(_) | Frame::Creation(_))
    }

    /// The VM call depth of this frame. Internal frames have no depth of
    /// their own — they inherit the enclosing external frame's, resolved by
    /// following `parent_external` into the stack that holds this frame.
    pub fn own_depth(&self) -> Option<u64> {
        match self {
            Frame::External(f) => Some(f.depth),
            Frame::Creation(f) => Some(f.depth),
            Frame::Internal(_) => None,
        }
    }
}

/// The logical call stack: an immutable, structurally-shared vector so that
/// snapshotting it at every step (for the driver's "time travel" needs) is
/// `O(log n)` instead of a full copy (spec.md Design Notes §9, Open Question
/// resolved in DESIGN.md).
pub type FrameStack = Vector<Frame>;

/// Persistent storage snapshot: slot -> word, shared structurally across
/// steps (spec.md §3 `StepVMState`, Design Notes §9).
pub type StorageMap = HashTrieMap<Word, Word>;

/// The raw-ish, but already normalized, VM state at one step (spec.md §3
/// `StepVMState`, built by C3 the normalizer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepVMState {
    pub pc: u64,
    pub opcode: u8,
    pub depth: u64,
    pub stack: Vec<Word>,
    pub memory: Bytes,
    pub storage: StorageMap,
    pub gas_remaining: u64,
    pub gas_cost: u64,
    pub return_data: Bytes,
}

/// One decoded `LOG0..LOG4` event (spec.md §3 `EventDesc`, built by C7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDesc {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub decoded: Option<DecodedEvent>,
}

/// The resolved event name/fields, when the artifact manager recognised
/// `topics[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub name: String,
    pub fields: Vec<DataView>,
}

/// One fully annotated step: the normalized VM state, the call stack as of
/// this step, and the source location/callee resolved for the active frame
/// (spec.md §3 `StepState`, the unit the driver (C8) emits per step).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepState {
    pub vm_state: StepVMState,
    pub frames: FrameStack,
    pub source_location: Option<SourceTriple>,
    pub callee: Option<Callee>,
    pub event: Option<EventDesc>,
}

/// The full annotated trace of a transaction: one [`StepState`] per VM step
/// plus the terminal result (spec.md §3 `Trace`/`RunTxResult`).
pub type Trace = Vec<StepState>;

/// How a transaction, overall, finished (spec.md §3 `RunTxResult`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTxResult {
    pub trace: Trace,
    pub success: bool,
    pub gas_used: u64,
    pub return_data: Bytes,
    pub events: Vec<EventDesc>,
}
