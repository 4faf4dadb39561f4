//! Exit code constants for the `dbanalyst` binary.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `DATABASE_UNAVAILABLE` | Target database missing or unreadable |
//! | 4 | `SESSION_FAILED` | The session ended with `session_failed` |
//! | 70 | `LLM_FAILURE` | LLM backend could not be constructed or reached |
//! | 130 | `INTERRUPTED` | The session was cancelled with Ctrl-C |

/// Exit codes matching the documented exit code table.
///
/// The numeric values are part of the public CLI contract.
///
/// ```rust
/// use dbanalyst_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SESSION_FAILED.as_i32(), 4);
/// assert_eq!(ExitCode::SUCCESS, ExitCode::from_i32(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Database unavailable - missing file, bad format, introspection failure
    pub const DATABASE_UNAVAILABLE: ExitCode = ExitCode(3);

    /// Session failed - planning, exhausted sub-goal or synthesis failure
    pub const SESSION_FAILED: ExitCode = ExitCode(4);

    /// LLM failure - backend misconfigured or unreachable outside a session
    pub const LLM_FAILURE: ExitCode = ExitCode(70);

    /// Interrupted - the user cancelled a running session
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values_are_stable() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert_eq!(ExitCode::DATABASE_UNAVAILABLE.as_i32(), 3);
        assert_eq!(ExitCode::SESSION_FAILED.as_i32(), 4);
        assert_eq!(ExitCode::LLM_FAILURE.as_i32(), 70);
        assert_eq!(ExitCode::INTERRUPTED.as_i32(), 130);
        assert_eq!(i32::from(ExitCode::LLM_FAILURE), 70);
    }
}
