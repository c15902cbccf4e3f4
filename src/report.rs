// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Build the query-by-month count table for one calendar year
// role: report/aggregation
// inputs: ordered JQL queries, year, an IssueSearch implementation
// outputs: ReportTable (rows in configuration order, months in calendar order)
// side_effects: |queries| x 12 search calls through the IssueSearch seam
// invariants:
// - every row has the query column plus exactly twelve month columns
// - unknown counts stay None and serialize as null / empty cells
// errors: fatal search errors (transport, invalid year) propagate; per-cell status failures do not
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::ReportError;
use crate::jira::{count_issues, IssueSearch};
use crate::months::{month_range, Month};

pub const QUERY_COLUMN: &str = "JQL Query";

/// Header row: the query column followed by January..December.
pub fn column_names() -> Vec<&'static str> {
  std::iter::once(QUERY_COLUMN)
    .chain(Month::ALL.iter().map(|m| m.name()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
  pub query: String,
  counts: [Option<u64>; 12],
}

impl ReportRow {
  pub fn new(query: impl Into<String>, counts: [Option<u64>; 12]) -> Self {
    Self {
      query: query.into(),
      counts,
    }
  }

  pub fn get(&self, month: Month) -> Option<u64> {
    self.counts[month.index()]
  }

  /// Counts in calendar order.
  pub fn counts(&self) -> &[Option<u64>; 12] {
    &self.counts
  }

  pub fn unknown_cells(&self) -> usize {
    self.counts.iter().filter(|c| c.is_none()).count()
  }
}

// Serializes as {"JQL Query": .., "January": .., ..., "December": ..} in column order.
impl Serialize for ReportRow {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(13))?;
    map.serialize_entry(QUERY_COLUMN, &self.query)?;
    for month in Month::ALL {
      map.serialize_entry(month.name(), &self.get(month))?;
    }
    map.end()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
#[serde(transparent)]
pub struct ReportTable {
  pub rows: Vec<ReportRow>,
}

impl ReportTable {
  pub fn unknown_cells(&self) -> usize {
    self.rows.iter().map(ReportRow::unknown_cells).sum()
  }
}

/// Count every (query, month) cell of `year`.
pub fn build_report(
  search: &dyn IssueSearch,
  queries: &[String],
  year: i32,
) -> Result<ReportTable, ReportError> {
  let mut rows = Vec::with_capacity(queries.len());

  for query in queries {
    tracing::info!(query = %query, year, "counting issues");
    let mut counts = [None; 12];

    for month in Month::ALL {
      let interval = month_range(year, month.name())?;
      tracing::trace!(month = %month, start = %interval.start, days = interval.days(), "month window");
      counts[month.index()] = count_issues(search, query, &interval)?;
    }

    rows.push(ReportRow::new(query.clone(), counts));
  }

  Ok(ReportTable { rows })
}
