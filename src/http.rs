// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Thin blocking HTTP layer over ureq shared by the GitHub, Gerrit and Sheets backends
// role: transport/http
// inputs: URLs, headers, JSON/form bodies; optional Corpus for GET caching
// outputs: Response bodies (text or JSON) and raw status codes
// side_effects: Network calls; corpus writes for successful GETs
// invariants:
// - non-2xx responses become errors carrying status and a body excerpt, except in get_status
// - only successful GET bodies are cached
// errors: anyhow with the request URL as context
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::corpus::Corpus;

pub const USER_AGENT: &str = "work-stats";

#[derive(Clone)]
pub struct HttpClient {
  agent: ureq::Agent,
  corpus: Option<Corpus>,
}

impl HttpClient {
  pub fn new(corpus: Option<Corpus>) -> Self {
    let agent = ureq::AgentBuilder::new()
      .timeout(Duration::from_secs(60))
      .user_agent(USER_AGENT)
      .build();
    Self { agent, corpus }
  }

  pub fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String> {
    if let Some(body) = self.corpus.as_ref().and_then(|c| c.load(url)) {
      return Ok(body);
    }

    debug!(url, "GET");
    let mut req = self.agent.get(url);
    for (k, v) in headers {
      req = req.set(k, v);
    }
    let body = read_body(url, req.call())?;

    if let Some(corpus) = &self.corpus {
      corpus.store(url, &body)?;
    }
    Ok(body)
  }

  pub fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value> {
    let body = self.get_text(url, headers)?;
    serde_json::from_str(&body).with_context(|| format!("parsing JSON from {}", url))
  }

  /// Status code of a GET; 4xx/5xx are returned rather than treated as errors.
  pub fn get_status(&self, url: &str, headers: &[(&str, &str)]) -> Result<u16> {
    debug!(url, "GET (status)");
    let mut req = self.agent.get(url);
    for (k, v) in headers {
      req = req.set(k, v);
    }
    match req.call() {
      Ok(resp) => Ok(resp.status()),
      Err(ureq::Error::Status(code, _)) => Ok(code),
      Err(e) => Err(anyhow!(e)).with_context(|| format!("GET {}", url)),
    }
  }

  pub fn post_json(&self, url: &str, headers: &[(&str, &str)], body: &Value) -> Result<Value> {
    debug!(url, "POST");
    let mut req = self.agent.post(url);
    for (k, v) in headers {
      req = req.set(k, v);
    }
    let text = read_body(url, req.send_json(body))?;
    serde_json::from_str(&text).with_context(|| format!("parsing JSON from {}", url))
  }

  pub fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value> {
    debug!(url, "POST (form)");
    let text = read_body(url, self.agent.post(url).send_form(form))?;
    serde_json::from_str(&text).with_context(|| format!("parsing JSON from {}", url))
  }
}

fn read_body(url: &str, resp: std::result::Result<ureq::Response, ureq::Error>) -> Result<String> {
  match resp {
    Ok(r) => r.into_string().with_context(|| format!("reading body of {}", url)),
    Err(ureq::Error::Status(code, r)) => {
      let body = r.into_string().unwrap_or_default();
      let excerpt: String = body.chars().take(300).collect();
      Err(anyhow!("{} returned HTTP {}: {}", url, code, excerpt))
    }
    Err(e) => Err(anyhow!(e)).with_context(|| format!("requesting {}", url)),
  }
}
