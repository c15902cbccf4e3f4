// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Orchestrate one run: open the document store, count every cell, write the workbook, publish it
// role: processing/orchestrator
// inputs: EffectiveConfig, optional now override
// outputs: RunSummary (printed as JSON by main); the workbook in the document store
// side_effects: Network calls to Jira and SharePoint; files on disk for --out, --no-upload and the upload fallback
// invariants:
// - the document store is opened (signed in) before any issue search runs
// - the workbook is generated once and the same bytes go to every destination
// - a failed upload leaves a copy in fallback_dir before the run fails
// errors: Propagates fatal ReportError variants with context; per-cell failures only show up as unknown_cells
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::cli::EffectiveConfig;
use crate::error::ReportError;
use crate::jira::{IssueSearch, JiraHttpSearch};
use crate::months;
use crate::report::build_report;
use crate::sharepoint::SharePointStore;
use crate::upload::{self, DocumentStore, LocalDirStore};
use crate::util;
use crate::xlsx;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  pub file: String,
  pub location: String,
  pub year: i32,
  pub rows: usize,
  pub unknown_cells: usize,
  pub local_copy: Option<String>,
}

/// The primary destination: SharePoint when a target is configured, else the `--out` directory.
pub fn open_store(cfg: &EffectiveConfig) -> Result<Box<dyn DocumentStore>> {
  match &cfg.target {
    Some(t) => {
      let store = SharePointStore::sign_in(&t.site_url, &t.site_credential, &t.sts_url)
        .with_context(|| format!("signing in to {}", t.site_url))?;
      Ok(Box::new(store))
    }
    None => {
      let dir = cfg.out.clone().unwrap_or_else(|| ".".to_string());
      Ok(Box::new(LocalDirStore::new(dir)))
    }
  }
}

pub fn execute(cfg: &EffectiveConfig, now_opt: Option<DateTime<Local>>) -> Result<RunSummary> {
  // Bad SharePoint credentials should fail before the slow counting phase.
  let store = open_store(cfg)?;
  let search = JiraHttpSearch::new(&cfg.search_endpoint, cfg.credential.expose().to_string());

  publish_report(cfg, &search, store.as_ref(), now_opt)
}

/// Write `bytes` as `dir/filename`; failures name the file being saved.
fn save_local(dir: &str, filename: &str, bytes: &[u8]) -> Result<String, ReportError> {
  let store = LocalDirStore::new(dir);
  upload::upload(&store, bytes, "", filename).map_err(|e| match e {
    ReportError::UploadFailure { reason, .. } => ReportError::UploadFailure {
      filename: filename.to_string(),
      reason,
    },
    other => other,
  })
}

/// `now_opt` pins the clock for tests; without it the year comes from the start
/// of the run and the filename stamp from the moment the workbook is finished.
pub fn publish_report(
  cfg: &EffectiveConfig,
  search: &dyn IssueSearch,
  store: &dyn DocumentStore,
  now_opt: Option<DateTime<Local>>,
) -> Result<RunSummary> {
  let started = util::effective_now(now_opt);
  let year = cfg.year.unwrap_or_else(|| months::current_year(started, cfg.tz));
  let table = build_report(search, &cfg.queries, year).with_context(|| format!("counting issues for {}", year))?;

  let unknown_cells = table.unknown_cells();
  if unknown_cells > 0 {
    tracing::warn!(unknown_cells, "some counts are unknown and left empty in the workbook");
  }

  let bytes = xlsx::write_table(&table)?;
  let filename = upload::report_filename(util::effective_now(now_opt), cfg.tz);

  let folder = cfg.target.as_ref().map(|t| t.folder.as_str()).unwrap_or("");
  let uploaded = upload::upload(store, &bytes, folder, &filename);

  // With an upload target, --out is a best-effort extra copy; without one it is the destination itself.
  let local_copy = match (&cfg.target, &cfg.out) {
    (Some(_), Some(dir)) => match save_local(dir, &filename, &bytes) {
      Ok(path) => Some(path),
      Err(e) => {
        tracing::warn!(dir = %dir, error = %e, "local copy not written");
        None
      }
    },
    _ => None,
  };

  let location = match uploaded {
    Ok(loc) => loc,
    Err(e) => {
      match save_local(&cfg.fallback_dir, &filename, &bytes) {
        Ok(path) => tracing::warn!(path = %path, "upload failed; workbook kept locally"),
        Err(fe) => tracing::error!(error = %fe, "upload failed and the local fallback could not be written"),
      }
      return Err(anyhow::Error::new(e).context(format!("publishing {} to {}", filename, store.describe())));
    }
  };

  tracing::info!(location = %location, rows = table.rows.len(), "report published");

  Ok(RunSummary {
    file: filename,
    location,
    year,
    rows: table.rows.len(),
    unknown_cells,
    local_copy,
  })
}
