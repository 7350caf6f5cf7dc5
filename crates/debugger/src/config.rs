//! Host-supplied knobs for a [`crate::Debugger`] (`SPEC_FULL.md` §2.1).

/// Configuration for one [`crate::Debugger`] instance. A plain struct, not a
/// config file or CLI surface — the annotator is a library, not an
/// application (spec.md Non-goals).
#[derive(Debug, Clone)]
pub struct DebuggerConfig {
    /// `tracing` verbosity the host expects the annotator to emit at;
    /// purely informational, since `tracing` itself is filtered by the
    /// host's subscriber, not by this field.
    pub verbosity: u8,
    /// Circuit breaker: `debug_tx` stops collecting further steps once this
    /// many have been observed, rather than growing the trace unboundedly
    /// on a pathological or adversarial transaction (spec.md §5). This is a
    /// safety valve, not a substitute for host-level cancellation.
    pub max_steps: u64,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            max_steps: 10_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_steps_is_generous_but_bounded() {
        let config = DebuggerConfig::default();
        assert!(config.max_steps > 0);
    }
}
