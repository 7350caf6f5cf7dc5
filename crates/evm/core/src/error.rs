//! Typed errors the annotator can raise (spec.md §7), in the teacher's
//! `thiserror` style (cf. `BackendError`).

/// Errors the trace annotator itself can raise. Two of spec.md §7's four
/// error kinds — missing debug info and decode failures — are deliberately
/// *not* variants here: they are logged and folded into `None` fields
/// instead of propagated (see `SPEC_FULL.md` §7).
#[derive(Debug, thiserror::Error)]
pub enum AnnotatorError {
    /// The reconciler observed a state transition the state machine design
    /// says cannot happen (spec.md §4.6/§7 `InvariantViolation`), e.g. a
    /// RETURN opcode while the frame stack holds no internal frame.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The embedding VM collaborator itself reported a failure distinct from
    /// a reverted transaction (spec.md §7 `VMError`).
    #[error("VM collaborator error: {0}")]
    Vm(#[from] eyre::Error),

    /// An internal-call frame was asked to resolve against an external frame
    /// index that no longer exists on the stack.
    #[error("internal frame at pc={pc:#x} has no enclosing external frame (stack depth {stack_len})")]
    DanglingInternalFrame { pc: u64, stack_len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violation_message_round_trips() {
        let err = AnnotatorError::InvariantViolation("stack underflow".into());
        assert_eq!(err.to_string(), "invariant violation: stack underflow");
    }
}
