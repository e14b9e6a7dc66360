use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the three failure classes of the decompiler core: malformed input
/// (precondition violations that must not be silently recovered from), internal limits
/// (an iteration cap was hit, which points at a rule-interaction bug), and the per-function
/// wrapper that is attached at the function-processing boundary.
///
/// Unresolvable control flow is *not* an error; the structurer reports it as a warning
/// alongside a degraded result.
///
/// # Error Categories
///
/// ## Malformed Input
/// - [`Error::Malformed`] - Generic precondition violation, tagged with the source location
/// - [`Error::GraphError`] - A graph invariant was violated
/// - [`Error::MissingBlock`] - A referenced block does not exist in the function
/// - [`Error::OperandWidth`] - Literal operands of mismatched widths
/// - [`Error::Unreachable`] - Dominance query on a node outside the dominator tree
/// - [`Error::DefUse`] - The def/use graph is inconsistent
///
/// ## Internal Limits
/// - [`Error::NonConvergence`] - A fixpoint loop exceeded its iteration cap
///
/// ## Boundary
/// - [`Error::Function`] - Wraps any of the above with the failing function's address
///
/// # Examples
///
/// ```rust,ignore
/// use decompcore::{Decompiler, EngineConfig, Error, NullResolver};
///
/// let decompiler = Decompiler::new(EngineConfig::default(), NullResolver);
/// match decompiler.decompile(&mut function) {
///     Ok(output) => println!("{} warnings", output.warnings.len()),
///     Err(Error::Function { address, source }) => {
///         eprintln!("failed at {:#x}: {}", address, source);
///     }
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be processed.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A graph invariant was violated.
    ///
    /// Raised when an edge references a key that is not part of the graph,
    /// when a key is inserted twice, or when the root is set to an absent key.
    #[error("{0}")]
    GraphError(String),

    /// A block referenced by the function (entry or jump target) does not exist.
    #[error("function {function:#x} has no block at {target:#x}")]
    MissingBlock {
        /// Address of the function being processed
        function: u64,
        /// The address that was looked up
        target: u64,
    },

    /// A binary operator was applied to literal operands of different widths.
    ///
    /// Widths of `0` are treated as unknown and never trigger this error.
    #[error("operand width mismatch: {left} bits vs {right} bits")]
    OperandWidth {
        /// Width of the left operand in bits
        left: u32,
        /// Width of the right operand in bits
        right: u32,
    },

    /// A dominance query was issued for a node that the DFS never reached.
    ///
    /// The associated value names the node (typically its block address).
    #[error("node {0} is not reachable from the root")]
    Unreachable(String),

    /// A fixpoint loop exceeded its iteration cap.
    ///
    /// This indicates a rule-interaction bug rather than a data problem.
    #[error("{stage} did not converge within {limit} iterations")]
    NonConvergence {
        /// The loop that failed to converge (e.g. `optimizer`, `simplifier`)
        stage: &'static str,
        /// The iteration cap that was reached
        limit: usize,
    },

    /// The def/use graph is inconsistent.
    #[error("def/use inconsistency: {0}")]
    DefUse(String),

    /// Decompilation of a single function failed.
    ///
    /// Attached at the function-processing boundary so that callers can report
    /// the failing function and continue with the next one.
    #[error("decompilation failed for function at {address:#x}: {source}")]
    Function {
        /// Address of the function that failed
        address: u64,
        /// The underlying failure
        source: Box<Error>,
    },
}

impl Error {
    /// Returns `true` if this error (or the error it wraps) is an internal-limit error.
    #[must_use]
    pub fn is_non_convergence(&self) -> bool {
        match self {
            Error::NonConvergence { .. } => true,
            Error::Function { source, .. } => source.is_non_convergence(),
            _ => false,
        }
    }

    /// Wraps this error with the address of the function that was being processed.
    ///
    /// Already-wrapped errors are returned unchanged.
    #[must_use]
    pub fn in_function(self, address: u64) -> Error {
        match self {
            Error::Function { .. } => self,
            other => Error::Function {
                address,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_macro_captures_location() {
        let err = malformed_error!("bad {}", 42);
        match err {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "bad 42");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn test_function_wrapper_message() {
        let err = Error::NonConvergence {
            stage: "optimizer",
            limit: 3,
        }
        .in_function(0x401000);

        assert!(err.is_non_convergence());
        assert_eq!(
            err.to_string(),
            "decompilation failed for function at 0x401000: optimizer did not converge within 3 iterations"
        );
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let err = Error::Unreachable("n4".to_string())
            .in_function(1)
            .in_function(2);
        match err {
            Error::Function { address, .. } => assert_eq!(address, 1),
            _ => panic!("expected Function"),
        }
    }
}
