// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Domain error taxonomy shared by month arithmetic, issue search, and document upload
// role: errors/taxonomy
// outputs: ReportError enum (thiserror) converted into anyhow at the orchestration layer
// invariants:
// - RemoteQueryFailure is the only variant recovered locally (null cell); every other variant is fatal
// - Display strings never include credentials
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
  #[error("invalid month name: {0:?}")]
  InvalidMonthName(String),

  #[error("year {0} is outside the supported calendar range")]
  InvalidYear(i32),

  /// Non-success status from the issue search endpoint for a single cell.
  #[error("issue search returned status {status}: {body}")]
  RemoteQueryFailure { status: u16, body: String },

  #[error("issue search transport error: {0}")]
  SearchTransport(String),

  #[error("document store authentication failed: {0}")]
  AuthenticationFailure(String),

  #[error("upload of {filename} failed: {reason}")]
  UploadFailure { filename: String, reason: String },
}

impl ReportError {
  /// Per-cell failures degrade to an unknown count instead of aborting the run.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, ReportError::RemoteQueryFailure { .. })
  }
}
