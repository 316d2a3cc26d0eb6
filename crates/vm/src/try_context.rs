//! Structured exception-handling contexts.

/// Phase of a `TRY` region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryState {
    /// Executing the protected body.
    Try,
    /// Executing the catch block.
    Catch,
    /// Executing the finally block.
    Finally,
}

/// One entry of a context's try stack, pushed by `TRY` and popped when its
/// region completes.
#[derive(Debug, Clone)]
pub struct TryContext {
    /// Absolute position of the catch block, if declared.
    pub catch_pointer: Option<usize>,
    /// Absolute position of the finally block, if declared.
    pub finally_pointer: Option<usize>,
    /// Where `ENDTRY`/`ENDFINALLY` resumes; set by `ENDTRY`.
    pub end_pointer: usize,
    /// Current phase.
    pub state: TryState,
}

impl TryContext {
    /// Creates a context for a freshly-entered `TRY`.
    pub fn new(catch_pointer: Option<usize>, finally_pointer: Option<usize>) -> Self {
        Self {
            catch_pointer,
            finally_pointer,
            end_pointer: 0,
            state: TryState::Try,
        }
    }

    /// Whether a throw can be routed to this context in its current state.
    ///
    /// A catch block handles throws from the try body; a throw inside the
    /// catch or finally block escapes to the next outer context.
    pub fn can_catch(&self) -> bool {
        self.state == TryState::Try && self.catch_pointer.is_some()
    }
}
