// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: SharePoint Online session (claims sign-in with username/password) and REST folder upload
// role: remote/sharepoint
// inputs: site URL, folder path, username/password, security token service URL
// outputs: SharePointStore implementing DocumentStore
// side_effects: Network calls to the token service, the site's sign-in form, and the site's REST API
// invariants:
// - sign-in never follows redirects; FedAuth/rtFa cookies are read from the first response
// - every write carries a fresh X-RequestDigest from /_api/contextinfo
// - passwords are never logged or embedded in error messages
// errors: AuthenticationFailure during sign-in; UploadFailure for folder lookup/creation and file upload
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use url::Url;

use crate::error::ReportError;
use crate::ext::serde_json::JsonFetch;
use crate::upload::{DocumentStore, FolderHandle};

pub const DEFAULT_STS_URL: &str = "https://login.microsoftonline.com/extSTS.srf";

const ODATA_VERBOSE: &str = "application/json;odata=verbose";

#[derive(Clone)]
pub struct SiteCredential {
  pub username: String,
  pub password: String,
}

impl std::fmt::Debug for SiteCredential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SiteCredential")
      .field("username", &self.username)
      .field("password", &"<redacted>")
      .finish()
  }
}

pub struct SharePointStore {
  site: Url,
  cookies: String,
  agent: ureq::Agent,
}

fn xml_escape(s: &str) -> String {
  escape(s).into_owned()
}

/// OData string literal escaping: single quotes are doubled.
fn odata_quote(s: &str) -> String {
  s.replace('\'', "''")
}

/// WS-Trust issue request for a SAML token scoped to `endpoint`.
fn token_request(username: &str, password: &str, sts_url: &str, endpoint: &str) -> String {
  format!(
    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing" xmlns:u="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/02/trust/RST/Issue</a:Action>
    <a:ReplyTo><a:Address>http://www.w3.org/2005/08/addressing/anonymous</a:Address></a:ReplyTo>
    <a:To s:mustUnderstand="1">{sts}</a:To>
    <o:Security s:mustUnderstand="1" xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
      <o:UsernameToken>
        <o:Username>{username}</o:Username>
        <o:Password>{password}</o:Password>
      </o:UsernameToken>
    </o:Security>
  </s:Header>
  <s:Body>
    <t:RequestSecurityToken xmlns:t="http://schemas.xmlsoap.org/ws/2005/02/trust">
      <wsp:AppliesTo xmlns:wsp="http://schemas.xmlsoap.org/ws/2004/09/policy">
        <a:EndpointReference><a:Address>{endpoint}</a:Address></a:EndpointReference>
      </wsp:AppliesTo>
      <t:KeyType>http://schemas.xmlsoap.org/ws/2005/05/identity/NoProofKey</t:KeyType>
      <t:RequestType>http://schemas.xmlsoap.org/ws/2005/02/trust/Issue</t:RequestType>
      <t:TokenType>urn:oasis:names:tc:SAML:1.0:assertion</t:TokenType>
    </t:RequestSecurityToken>
  </s:Body>
</s:Envelope>"#,
    sts = xml_escape(sts_url),
    username = xml_escape(username),
    password = xml_escape(password),
    endpoint = xml_escape(endpoint),
  )
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum ReplyField {
  Token,
  FaultText,
}

/// Pull the BinarySecurityToken out of a token service reply, or the first fault text.
fn parse_token_response(body: &str) -> Result<String, String> {
  let malformed = |e: quick_xml::Error| format!("malformed token service reply: {}", e);
  let mut reader = Reader::from_str(body);
  let mut inside: Option<ReplyField> = None;
  let mut token = String::new();
  let mut fault = String::new();
  let mut fault_done = false;

  loop {
    match reader.read_event() {
      Ok(Event::Start(ref e)) => {
        let local = e.local_name();
        inside = if local.as_ref() == b"BinarySecurityToken" {
          Some(ReplyField::Token)
        } else if local.as_ref().eq_ignore_ascii_case(b"Text") && !fault_done {
          Some(ReplyField::FaultText)
        } else {
          None
        };
      }
      Ok(Event::End(_)) => {
        if inside == Some(ReplyField::FaultText) && !fault.trim().is_empty() {
          fault_done = true;
        }
        inside = None;
      }
      Ok(Event::Text(t)) => {
        let text = t.unescape().map_err(malformed)?;
        match inside {
          Some(ReplyField::Token) => token.push_str(&text),
          Some(ReplyField::FaultText) => fault.push_str(&text),
          None => {}
        }
      }
      Ok(Event::CData(c)) => {
        let raw = c.into_inner();
        let text = String::from_utf8_lossy(&raw);
        match inside {
          Some(ReplyField::Token) => token.push_str(&text),
          Some(ReplyField::FaultText) => fault.push_str(&text),
          None => {}
        }
      }
      Ok(Event::Eof) => break,
      Err(e) => return Err(malformed(e)),
      _ => {}
    }
  }

  let token = token.trim();
  if !token.is_empty() {
    return Ok(token.to_string());
  }

  let fault = fault.trim();
  if fault.is_empty() {
    Err("token service reply carried no security token".to_string())
  } else {
    Err(fault.to_string())
  }
}

/// Keep only the sign-in cookies from a list of Set-Cookie header values.
fn session_cookies<'a, I>(set_cookie: I) -> Option<String>
where
  I: IntoIterator<Item = &'a str>,
{
  let pairs: Vec<String> = set_cookie
    .into_iter()
    .filter_map(|raw| raw.split(';').next())
    .map(str::trim)
    .filter(|kv| kv.starts_with("FedAuth=") || kv.starts_with("rtFa="))
    .map(str::to_string)
    .collect();

  if pairs.is_empty() {
    None
  } else {
    Some(pairs.join("; "))
  }
}

/// `/sites/team` + `Shared Documents/x` → `/sites/team/Shared Documents/x`.
fn server_relative(site_path: &str, folder_path: &str) -> String {
  let base = site_path.trim_end_matches('/');
  let rel = folder_path.trim_matches('/');
  if rel.is_empty() {
    format!("{}/", base)
  } else {
    format!("{}/{}", base, rel)
  }
}

impl SharePointStore {
  /// Authenticate against SharePoint Online and keep the session cookies.
  pub fn sign_in(site_url: &str, credential: &SiteCredential, sts_url: &str) -> Result<Self, ReportError> {
    let site = Url::parse(site_url)
      .map_err(|e| ReportError::AuthenticationFailure(format!("invalid site url {:?}: {}", site_url, e)))?;
    let origin = site.origin().ascii_serialization();

    let agent: ureq::Agent = ureq::Agent::config_builder()
      .http_status_as_error(false)
      .max_redirects(0)
      .max_redirects_will_error(false)
      .build()
      .into();

    tracing::info!(site = %site, user = %credential.username, "signing in to SharePoint");

    // 1. security token
    let envelope = token_request(&credential.username, &credential.password, sts_url, &origin);
    let mut resp = agent
      .post(sts_url)
      .header("Content-Type", "application/soap+xml; charset=utf-8")
      .send(envelope.as_str())
      .map_err(|e| ReportError::AuthenticationFailure(format!("token service unreachable: {}", e)))?;
    let body = resp.body_mut().read_to_string().unwrap_or_default();
    let token = parse_token_response(&body).map_err(ReportError::AuthenticationFailure)?;

    // 2. exchange the token for FedAuth/rtFa cookies
    let signin_url = format!("{}/_forms/default.aspx?wa=wsignin1.0", origin);
    let resp = agent
      .post(&signin_url)
      .header("Content-Type", "application/x-www-form-urlencoded")
      .header("User-Agent", "jql-monthly-report")
      .send(token.as_str())
      .map_err(|e| ReportError::AuthenticationFailure(format!("sign-in form unreachable: {}", e)))?;

    let cookies = session_cookies(resp.headers().get_all("set-cookie").iter().filter_map(|v| v.to_str().ok()))
      .ok_or_else(|| {
        ReportError::AuthenticationFailure(format!(
          "sign-in returned status {} without FedAuth/rtFa cookies",
          resp.status().as_u16()
        ))
      })?;

    Ok(Self { site, cookies, agent })
  }

  /// `{site}/{rel}` with the path percent-encoded.
  fn api_url(&self, rel: &str) -> String {
    let mut u = self.site.clone();
    let base = u.path().trim_end_matches('/').to_string();
    u.set_path(&format!("{}/{}", base, rel));
    u.set_query(None);
    u.to_string()
  }

  fn form_digest(&self, subject: &str) -> Result<String, ReportError> {
    let fail = |reason: String| ReportError::UploadFailure {
      filename: subject.to_string(),
      reason,
    };

    let mut resp = self
      .agent
      .post(&self.api_url("_api/contextinfo"))
      .header("Accept", ODATA_VERBOSE)
      .header("Cookie", &self.cookies)
      .send_empty()
      .map_err(|e| fail(format!("contextinfo request failed: {}", e)))?;

    let status = resp.status();
    let body = resp.body_mut().read_to_string().unwrap_or_default();
    if !status.is_success() {
      return Err(fail(format!("contextinfo returned status {}: {}", status.as_u16(), body)));
    }

    let v: serde_json::Value =
      serde_json::from_str(&body).map_err(|e| fail(format!("contextinfo body: {}", e)))?;
    v.fetch("d.GetContextWebInformation.FormDigestValue")
      .to::<String>()
      .ok_or_else(|| fail("contextinfo reply had no FormDigestValue".to_string()))
  }

  fn create_folder(&self, folder_path: &str, server_relative_url: &str) -> Result<(), ReportError> {
    let fail = |reason: String| ReportError::UploadFailure {
      filename: folder_path.to_string(),
      reason,
    };
    let digest = self.form_digest(folder_path)?;
    let payload = serde_json::json!({
      "__metadata": { "type": "SP.Folder" },
      "ServerRelativeUrl": server_relative_url,
    });

    tracing::info!(folder = %server_relative_url, "creating SharePoint folder");

    let mut resp = self
      .agent
      .post(&self.api_url("_api/web/folders"))
      .header("Accept", ODATA_VERBOSE)
      .header("Content-Type", ODATA_VERBOSE)
      .header("Cookie", &self.cookies)
      .header("X-RequestDigest", &digest)
      .send(payload.to_string().as_str())
      .map_err(|e| fail(format!("folder creation request failed: {}", e)))?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.body_mut().read_to_string().unwrap_or_default();
      return Err(fail(format!("folder creation returned status {}: {}", status.as_u16(), body)));
    }
    Ok(())
  }
}

impl DocumentStore for SharePointStore {
  fn describe(&self) -> String {
    self.site.to_string()
  }

  fn resolve_folder(&self, folder_path: &str) -> Result<FolderHandle, ReportError> {
    let fail = |reason: String| ReportError::UploadFailure {
      filename: folder_path.to_string(),
      reason,
    };
    let wanted = server_relative(self.site.path(), folder_path);
    let url = self.api_url(&format!("_api/web/GetFolderByServerRelativeUrl('{}')", odata_quote(&wanted)));

    let mut resp = self
      .agent
      .get(&url)
      .header("Accept", ODATA_VERBOSE)
      .header("Cookie", &self.cookies)
      .call()
      .map_err(|e| fail(format!("folder lookup failed: {}", e)))?;

    let status = resp.status();
    let body = resp.body_mut().read_to_string().unwrap_or_default();

    if status.as_u16() == 404 {
      self.create_folder(folder_path, &wanted)?;
      return Ok(FolderHandle { location: wanted });
    }
    if !status.is_success() {
      return Err(fail(format!("folder lookup returned status {}: {}", status.as_u16(), body)));
    }

    let location = serde_json::from_str::<serde_json::Value>(&body)
      .ok()
      .and_then(|v| v.fetch("d.ServerRelativeUrl").to::<String>())
      .unwrap_or(wanted);

    Ok(FolderHandle { location })
  }

  fn put_file(&self, folder: &FolderHandle, filename: &str, bytes: &[u8]) -> Result<String, ReportError> {
    let fail = |reason: String| ReportError::UploadFailure {
      filename: filename.to_string(),
      reason,
    };
    let digest = self.form_digest(filename)?;
    let url = self.api_url(&format!(
      "_api/web/GetFolderByServerRelativeUrl('{}')/Files/add(url='{}',overwrite=true)",
      odata_quote(&folder.location),
      odata_quote(filename)
    ));

    let mut resp = self
      .agent
      .post(&url)
      .header("Accept", ODATA_VERBOSE)
      .header("Content-Type", "application/octet-stream")
      .header("Cookie", &self.cookies)
      .header("X-RequestDigest", &digest)
      .send(bytes)
      .map_err(|e| fail(format!("upload request failed: {}", e)))?;

    let status = resp.status();
    let body = resp.body_mut().read_to_string().unwrap_or_default();
    if !status.is_success() {
      return Err(fail(format!("upload returned status {}: {}", status.as_u16(), body)));
    }

    let location = serde_json::from_str::<serde_json::Value>(&body)
      .ok()
      .and_then(|v| v.fetch("d.ServerRelativeUrl").to::<String>())
      .unwrap_or_else(|| format!("{}/{}", folder.location.trim_end_matches('/'), filename));

    Ok(location)
  }
}
