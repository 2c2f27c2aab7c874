// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Publish report tables to a Google spreadsheet (new or existing) over the Sheets v4 REST API
// role: sinks/sheets
// inputs: table::Tables, --sheets target, OAuth client credentials file, saved token file
// outputs: Spreadsheet URL
// side_effects: Network calls to Google OAuth and Sheets; reads stdin for an auth code; writes the token file (0600)
// invariants:
// - one sheet per non-empty table, titled with the table name, first row frozen
// - every sheet's columns are auto-resized after data is written
// - no request is made when every table is empty
// errors: Invalid spreadsheet URLs, OAuth failures and API errors propagate
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::io::BufRead;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::ext::serde_json::JsonFetch;
use crate::http::HttpClient;
use crate::table::{Row, Tables};

pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const OOB_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

static RE_SPREADSHEET_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap());

/// Where `--sheets` sends the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetsTarget {
  Disabled,
  New,
  Existing(String),
}

impl SheetsTarget {
  /// `""` disables, `"new"` creates a spreadsheet, anything else must be a spreadsheet URL.
  pub fn parse(flag: &str) -> Result<Self> {
    match flag.trim() {
      "" => Ok(SheetsTarget::Disabled),
      "new" => Ok(SheetsTarget::New),
      url => spreadsheet_id(url)
        .map(SheetsTarget::Existing)
        .ok_or_else(|| anyhow!("{:?} is not a Google Sheets spreadsheet URL", url)),
    }
  }

  pub fn is_enabled(&self) -> bool {
    !matches!(self, SheetsTarget::Disabled)
  }
}

pub fn spreadsheet_id(url: &str) -> Option<String> {
  RE_SPREADSHEET_ID.captures(url).map(|c| c[1].to_string())
}

// --- OAuth ---

/// The `installed` (or `web`) block of a Google client credentials file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
  pub client_id: String,
  pub client_secret: String,
  pub auth_uri: String,
  pub token_uri: String,
  #[serde(default)]
  pub redirect_uris: Vec<String>,
}

impl ClientSecret {
  pub fn load(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading credentials {}", path.display()))?;
    let v: Value = serde_json::from_str(&text).with_context(|| format!("parsing credentials {}", path.display()))?;

    let block = v
      .get("installed")
      .or_else(|| v.get("web"))
      .ok_or_else(|| anyhow!("{}: expected an \"installed\" or \"web\" client", path.display()))?;

    Ok(serde_json::from_value(block.clone())?)
  }

  fn redirect_uri(&self) -> &str {
    self.redirect_uris.first().map(String::as_str).unwrap_or(OOB_REDIRECT)
  }

  pub fn auth_url(&self) -> String {
    format!(
      "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&state=state-token",
      self.auth_uri,
      urlencoding::encode(&self.client_id),
      urlencoding::encode(self.redirect_uri()),
      urlencoding::encode(SCOPE)
    )
  }
}

/// Saved OAuth token, compatible with the JSON layout of Go's `oauth2.Token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
  pub access_token: String,
  #[serde(default = "default_token_type")]
  pub token_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub refresh_token: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
  "Bearer".to_string()
}

impl Token {
  /// Expired, or expiring within a minute.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expiry.map(|e| e <= now + Duration::seconds(60)).unwrap_or(false)
  }

  fn from_response(v: &Value, now: DateTime<Utc>, previous_refresh: Option<String>) -> Result<Self> {
    let access_token = v
      .fetch("access_token")
      .to::<String>()
      .ok_or_else(|| anyhow!("token response has no access_token: {}", v))?;

    Ok(Token {
      access_token,
      token_type: v.fetch("token_type").to::<String>().unwrap_or_else(default_token_type),
      refresh_token: v.fetch("refresh_token").to::<String>().or(previous_refresh),
      expiry: v.fetch("expires_in").to::<i64>().map(|s| now + Duration::seconds(s)),
    })
  }

  pub fn load(path: &Path) -> Result<Option<Self>> {
    match std::fs::read_to_string(path) {
      Ok(text) => Ok(Some(
        serde_json::from_str(&text).with_context(|| format!("parsing token {}", path.display()))?,
      )),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e).with_context(|| format!("reading token {}", path.display())),
    }
  }

  /// Write the token readable only by the owner.
  pub fn save(&self, path: &Path) -> Result<()> {
    use std::io::Write;

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
      use std::os::unix::fs::OpenOptionsExt;
      opts.mode(0o600);
    }

    let mut f = opts.open(path).with_context(|| format!("writing token {}", path.display()))?;
    // An existing file keeps its mode on open.
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      f.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    f.write_all(serde_json::to_string(self)?.as_bytes())?;

    Ok(())
  }
}

/// A usable access token: the saved one, a refreshed one, or a fresh one from
/// the interactive code flow (code read from `input`).
pub fn obtain_token<R: BufRead>(
  http: &HttpClient,
  secret: &ClientSecret,
  token_path: &Path,
  now: DateTime<Utc>,
  input: &mut R,
) -> Result<Token> {
  if let Some(tok) = Token::load(token_path)? {
    if !tok.is_expired(now) {
      return Ok(tok);
    }
    if let Some(refresh) = tok.refresh_token.clone() {
      let v = http.post_form(
        &secret.token_uri,
        &[
          ("client_id", secret.client_id.as_str()),
          ("client_secret", secret.client_secret.as_str()),
          ("refresh_token", refresh.as_str()),
          ("grant_type", "refresh_token"),
        ],
      )?;
      let fresh = Token::from_response(&v, now, Some(refresh))?;
      fresh.save(token_path)?;
      return Ok(fresh);
    }
  }

  eprintln!(
    "Go to the following link in your browser then type the authorization code:\n{}",
    secret.auth_url()
  );
  let mut code = String::new();
  input.read_line(&mut code).context("reading authorization code")?;
  let code = code.trim();
  if code.is_empty() {
    bail!("no authorization code entered");
  }

  let v = http.post_form(
    &secret.token_uri,
    &[
      ("client_id", secret.client_id.as_str()),
      ("client_secret", secret.client_secret.as_str()),
      ("code", code),
      ("redirect_uri", secret.redirect_uri()),
      ("grant_type", "authorization_code"),
    ],
  )?;
  let tok = Token::from_response(&v, now, None)?;
  info!(path = %token_path.display(), "saving credential file");
  tok.save(token_path)?;

  Ok(tok)
}

// --- Sheets ---

fn channel(c: u8) -> f64 {
  f64::from(c) / 255.0
}

/// One spreadsheet `CellData` per cell; row styling is repeated on every cell.
pub fn row_data(row: &Row) -> Value {
  let values: Vec<Value> = row
    .cells
    .iter()
    .map(|cell| {
      let mut text_format = json!({ "bold": row.bold });
      if let Some(link) = &cell.hyperlink {
        let uri = if link.starts_with("http://") || link.starts_with("https://") {
          link.clone()
        } else {
          format!("https://{}", link)
        };
        text_format["link"] = json!({ "uri": uri });
      }

      let mut format = json!({ "textFormat": text_format });
      if let Some(color) = row.color {
        format["backgroundColor"] = json!({
          "red": channel(color.0),
          "green": channel(color.1),
          "blue": channel(color.2),
        });
      }

      json!({
        "userEnteredValue": { "stringValue": cell.text },
        "userEnteredFormat": format,
      })
    })
    .collect();

  json!({ "values": values })
}

fn sheet_properties(title: &str) -> Value {
  json!({ "title": title, "gridProperties": { "frozenRowCount": 1 } })
}

pub struct SheetsClient {
  http: HttpClient,
  base: String,
  auth: String,
}

impl SheetsClient {
  pub fn new(http: HttpClient, base: &str, token: &Token) -> Self {
    Self {
      http,
      base: base.trim_end_matches('/').to_string(),
      auth: format!("{} {}", token.token_type, token.access_token),
    }
  }

  fn batch_update(&self, id: &str, requests: Vec<Value>) -> Result<Value> {
    let url = format!("{}/{}:batchUpdate", self.base, id);
    let body = json!({ "includeSpreadsheetInResponse": true, "requests": requests });
    let resp = self.http.post_json(&url, &[("Authorization", self.auth.as_str())], &body)?;

    Ok(resp.fetch("updatedSpreadsheet").to::<Value>().unwrap_or(Value::Null))
  }

  /// New spreadsheet with one sheet per table.
  pub fn create(&self, title: &str, tables: &Tables) -> Result<Value> {
    let sheets: Vec<Value> = non_empty(tables)
      .map(|(name, rows)| {
        json!({
          "properties": sheet_properties(name),
          "data": [{ "rowData": rows.iter().map(row_data).collect::<Vec<_>>() }],
        })
      })
      .collect();
    let body = json!({ "properties": { "title": title }, "sheets": sheets });

    self.http.post_json(&self.base, &[("Authorization", self.auth.as_str())], &body)
  }

  /// Add one sheet per table to an existing spreadsheet, then append the rows.
  pub fn append(&self, id: &str, tables: &Tables) -> Result<Value> {
    let add: Vec<Value> = non_empty(tables)
      .map(|(name, _)| json!({ "addSheet": { "properties": sheet_properties(name) } }))
      .collect();
    let spreadsheet = self.batch_update(id, add)?;

    let mut data = Vec::new();
    for sheet in spreadsheet.fetch("sheets").items() {
      let title = sheet.fetch("properties.title").str().unwrap_or_default();
      let Some(rows) = tables.get(title).filter(|r| !r.is_empty()) else {
        continue;
      };
      data.push(json!({
        "appendCells": {
          "sheetId": sheet.fetch("properties.sheetId").to::<i64>().unwrap_or(0),
          "rows": rows.iter().map(row_data).collect::<Vec<_>>(),
          "fields": "*",
        }
      }));
    }

    self.batch_update(id, data)
  }

  pub fn auto_resize(&self, spreadsheet: &Value) -> Result<()> {
    let id = spreadsheet
      .fetch("spreadsheetId")
      .str()
      .ok_or_else(|| anyhow!("spreadsheet response has no spreadsheetId"))?;
    let requests: Vec<Value> = spreadsheet
      .fetch("sheets")
      .items()
      .iter()
      .map(|s| {
        json!({
          "autoResizeDimensions": {
            "dimensions": {
              "sheetId": s.fetch("properties.sheetId").to::<i64>().unwrap_or(0),
              "dimension": "COLUMNS",
            }
          }
        })
      })
      .collect();

    self.batch_update(id, requests)?;
    Ok(())
  }
}

fn non_empty(tables: &Tables) -> impl Iterator<Item = (&String, &Vec<Row>)> {
  tables.iter().filter(|(_, rows)| !rows.is_empty())
}

/// Write `tables` to the target and return the spreadsheet URL.
/// Nothing is sent when every table is empty.
pub fn publish(client: &SheetsClient, target: &SheetsTarget, title: &str, tables: &Tables) -> Result<Option<String>> {
  if target.is_enabled() && non_empty(tables).next().is_none() {
    info!("no rows to publish; leaving Google Sheets untouched");
    return Ok(None);
  }

  let spreadsheet = match target {
    SheetsTarget::Disabled => return Ok(None),
    SheetsTarget::New => client.create(title, tables)?,
    SheetsTarget::Existing(id) => client.append(id, tables)?,
  };

  client.auto_resize(&spreadsheet)?;
  let url = spreadsheet.fetch("spreadsheetUrl").to::<String>().unwrap_or_default();
  info!(url = %url, "wrote data to Google Sheet");

  Ok(Some(url))
}
