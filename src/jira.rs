// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Count Jira issues for a JQL query restricted to one month (count-only search)
// role: remote/jira-search
// inputs: Jira base URL, bearer token, JQL text, MonthInterval
// outputs: Some(total) per cell, or None when the server answered with a non-success status
// side_effects: One blocking GET {jira}/rest/api/2/search?jql=..&maxResults=0 per call
// invariants:
// - Non-success status never aborts the run; it is logged with status + body and yields None
// - A 2xx body without `total` counts as 0
// - No retries, no backoff, no timeout override
// errors: SearchTransport (unreachable host, undecodable body) propagates as fatal
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use crate::error::ReportError;
use crate::ext::serde_json::JsonFetch;
use crate::months::MonthInterval;

// --- Trait seam for the search API ---
pub trait IssueSearch {
  /// Total number of issues matching `jql`.
  fn total(&self, jql: &str) -> Result<u64, ReportError>;
}

pub struct JiraHttpSearch {
  search_url: String,
  token: String,
  agent: ureq::Agent,
}

impl JiraHttpSearch {
  pub fn new(jira_url: &str, token: String) -> Self {
    // Status codes are inspected by hand so error bodies can be logged.
    let agent: ureq::Agent = ureq::Agent::config_builder()
      .http_status_as_error(false)
      .build()
      .into();

    Self {
      search_url: format!("{}/rest/api/2/search", jira_url.trim_end_matches('/')),
      token,
      agent,
    }
  }
}

impl IssueSearch for JiraHttpSearch {
  fn total(&self, jql: &str) -> Result<u64, ReportError> {
    tracing::debug!(jql, "jira search");

    let resp = self
      .agent
      .get(&self.search_url)
      .query("jql", jql)
      .query("maxResults", "0")
      .header("Accept", "application/json")
      .header("User-Agent", "jql-monthly-report")
      .header("Authorization", &format!("Bearer {}", self.token))
      .call();

    let mut resp = resp.map_err(|e| ReportError::SearchTransport(e.to_string()))?;
    let status = resp.status();

    if !status.is_success() {
      let body = resp.body_mut().read_to_string().unwrap_or_default();
      return Err(ReportError::RemoteQueryFailure {
        status: status.as_u16(),
        body,
      });
    }

    let v = resp
      .body_mut()
      .read_json::<serde_json::Value>()
      .map_err(|e| ReportError::SearchTransport(format!("decoding search response: {}", e)))?;

    let total = v.fetch("total");
    if !total.exists() {
      tracing::debug!(jql, "search response has no total; counting 0");
    } else if total.to::<u64>().is_none() {
      tracing::warn!(jql, total = %v["total"], "search response has a non-numeric total; counting 0");
    }
    Ok(total.to_or_default::<u64>())
  }
}

/// Conjoin the caller's JQL with the month's created-date filter.
pub fn build_jql(query: &str, interval: &MonthInterval) -> String {
  format!("({}) AND {}", query.trim(), interval.jql_clause())
}

/// Count one (query, month) cell. A recoverable search failure becomes `None`.
pub fn count_issues(
  search: &dyn IssueSearch,
  query: &str,
  interval: &MonthInterval,
) -> Result<Option<u64>, ReportError> {
  let jql = build_jql(query, interval);

  match search.total(&jql) {
    Ok(n) => Ok(Some(n)),
    Err(e) if e.is_recoverable() => {
      tracing::warn!(jql = %jql, error = %e, "issue count unavailable; cell left empty");
      Ok(None)
    }
    Err(e) => Err(e),
  }
}
