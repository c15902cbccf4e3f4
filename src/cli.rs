use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::months::Tz;
use crate::sharepoint::{SiteCredential, DEFAULT_STS_URL};
use crate::util;

#[derive(Parser, Debug)]
#[command(
    name = "jql-monthly-report",
    version,
    about = "Count Jira issues per JQL query for each month of the year and publish the table to SharePoint as xlsx",
    long_about = None
)]
pub struct Cli {
  /// Jira base URL, e.g. https://jira.example.com
  #[arg(long, env = "JIRA_URL")]
  pub jira_url: Option<String>,

  /// Jira personal access token (sent as a Bearer token)
  #[arg(long, env = "jiratoken", hide_env_values = true)]
  pub jira_token: Option<String>,

  /// JQL query to count per month; repeat for more rows (rows keep this order)
  #[arg(long = "query", value_name = "JQL")]
  pub queries: Vec<String>,

  /// JSON config file with "queries" and non-secret connection settings
  #[arg(long)]
  pub config: Option<PathBuf>,

  /// Calendar year to report (default: the current year)
  #[arg(long)]
  pub year: Option<i32>,

  /// SharePoint site URL, e.g. https://contoso.sharepoint.com/sites/team
  #[arg(long, env = "SHAREPOINT_SITE_URL")]
  pub site_url: Option<String>,

  /// Folder inside the site (default: "Shared Documents")
  #[arg(long, env = "SHAREPOINT_FOLDER")]
  pub folder: Option<String>,

  /// SharePoint account name
  #[arg(long, env = "SHAREPOINT_USERNAME")]
  pub username: Option<String>,

  /// SharePoint account password
  #[arg(long, env = "SHAREPOINT_PASSWORD", hide_env_values = true)]
  pub password: Option<String>,

  /// Skip SharePoint; write the workbook into --out (default: current dir)
  #[arg(long)]
  pub no_upload: bool,

  /// Directory for a local copy of the workbook (the only destination with --no-upload)
  #[arg(long)]
  pub out: Option<PathBuf>,

  /// Where the workbook is saved when the upload fails (default: system temp dir)
  #[arg(long)]
  pub fallback_dir: Option<PathBuf>,

  /// Timezone for "current year" and the filename timestamp
  #[arg(long, value_enum, default_value_t = Tz::Local)]
  pub tz: Tz,

  /// Emit a troff man page to stdout (internal; for packaging)
  #[arg(long, hide = true)]
  pub gen_man: bool,

  /// Override the "now" instant (hidden; tests only)
  #[arg(long = "now-override", hide = true)]
  pub now_override: Option<String>,

  /// Security token service endpoint for SharePoint Online sign-in (hidden; tests only)
  #[arg(long = "sts-url", hide = true, default_value = DEFAULT_STS_URL)]
  pub sts_url: String,
}

/// Settings read from `--config`. Secrets are only accepted from flags or the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
  #[serde(default)]
  pub queries: Vec<String>,
  pub jira_url: Option<String>,
  pub year: Option<i32>,
  pub site_url: Option<String>,
  pub folder: Option<String>,
  pub username: Option<String>,
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
  let raw = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// A credential that never shows up in Debug output or serialized config.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
  pub fn new(s: impl Into<String>) -> Self {
    Self(s.into())
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Debug for Secret {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("Secret(<redacted>)")
  }
}

#[derive(Debug, Serialize)]
pub struct UploadTarget {
  pub site_url: String,
  pub folder: String,
  #[serde(skip)]
  pub site_credential: SiteCredential,
  pub sts_url: String,
}

#[derive(Debug, Serialize)]
pub struct EffectiveConfig {
  pub search_endpoint: String,
  #[serde(skip)]
  pub credential: Secret,
  pub queries: Vec<String>,
  pub year: Option<i32>,
  /// None when uploads are disabled.
  pub target: Option<UploadTarget>,
  pub out: Option<String>,
  pub fallback_dir: String,
  pub tz: Tz,
  pub now_override: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
  v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn normalize(cli: Cli) -> Result<EffectiveConfig> {
  let file = match &cli.config {
    Some(p) => load_file_config(p)?,
    None => FileConfig::default(),
  };

  let Some(search_endpoint) = non_empty(cli.jira_url).or(non_empty(file.jira_url)) else {
    bail!("Provide the Jira URL with --jira-url or JIRA_URL");
  };
  if !search_endpoint.starts_with("http://") && !search_endpoint.starts_with("https://") {
    bail!("Jira URL must start with http:// or https://");
  }
  let Some(token) = non_empty(cli.jira_token) else {
    bail!("Provide the Jira token with --jira-token or jiratoken");
  };

  // Flags replace the file's list rather than extending it.
  let source = if cli.queries.is_empty() { file.queries } else { cli.queries };
  let queries: Vec<String> = source
    .into_iter()
    .map(|q| q.trim().to_string())
    .filter(|q| !q.is_empty())
    .collect();
  if queries.is_empty() {
    bail!("Provide at least one --query or a --config file with \"queries\"");
  }

  let target = if cli.no_upload {
    None
  } else {
    let site_url = non_empty(cli.site_url).or(non_empty(file.site_url));
    let username = non_empty(cli.username).or(non_empty(file.username));
    let password = cli.password.filter(|p| !p.is_empty());

    match (site_url, username, password) {
      (Some(site_url), Some(username), Some(password)) => Some(UploadTarget {
        site_url,
        folder: non_empty(cli.folder)
          .or(non_empty(file.folder))
          .unwrap_or_else(|| "Shared Documents".to_string()),
        site_credential: SiteCredential { username, password },
        sts_url: cli.sts_url,
      }),
      _ => bail!(
        "Uploading needs --site-url, --username and --password (or SHAREPOINT_SITE_URL, SHAREPOINT_USERNAME, SHAREPOINT_PASSWORD); pass --no-upload to keep the workbook local"
      ),
    }
  };

  let out = match (&cli.out, cli.no_upload) {
    (Some(dir), _) => Some(util::canonicalize_lossy(dir)),
    (None, true) => Some(util::canonicalize_lossy(".")),
    (None, false) => None,
  };
  let fallback_dir = match &cli.fallback_dir {
    Some(dir) => util::canonicalize_lossy(dir),
    None => std::env::temp_dir().to_string_lossy().to_string(),
  };

  Ok(EffectiveConfig {
    search_endpoint,
    credential: Secret::new(token),
    queries,
    year: cli.year.or(file.year),
    target,
    out,
    fallback_dir,
    tz: cli.tz,
    now_override: cli.now_override,
  })
}
