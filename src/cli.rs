use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::sinks::sheets::SheetsTarget;
use crate::sources::gerrit::DEFAULT_GERRIT_URL;
use crate::sources::tracker::DEFAULT_TRACKER_REPO;
use crate::util;
use crate::window::WindowSpec;

#[derive(Parser, Debug)]
#[command(
    name = "work-stats",
    version,
    about = "Summarize open-source contributions from GitHub and Gerrit",
    long_about = None,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
  #[command(subcommand)]
  pub command: Option<Command>,

  /// Without a subcommand the arguments of `report` apply
  #[command(flatten)]
  pub report: ReportArgs,

  /// Log at debug level (RUST_LOG takes precedence)
  #[arg(long, global = true)]
  pub verbose: bool,

  /// Emit a troff man page to stdout (internal; for packaging)
  #[arg(long, hide = true)]
  pub gen_man: bool,

  /// Override the "now" instant for window resolution (hidden; tests only)
  #[arg(long = "now-override", hide = true, global = true)]
  pub now_override: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Issue, PR and CL tables written as CSV and optionally to Google Sheets
  Report(ReportArgs),
  /// Weekly markdown summary on stdout
  Snippets(SnippetsArgs),
  /// Issues open per day in one repository, written as CSV
  Trends(TrendsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
  /// Calendar month, e.g. 2025-08
  #[arg(long)]
  pub month: Option<String>,

  /// Natural language window, e.g. "last week" or "last month"
  #[arg(long = "for")]
  pub for_str: Option<String>,

  /// Start date (YYYY-MM-DD or RFC3339); alone it runs until now
  #[arg(long, alias = "start")]
  pub since: Option<String>,

  /// End date (exclusive); requires --since
  #[arg(long, alias = "end")]
  pub until: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CorpusArgs {
  /// Cache API responses in this directory and reuse them on later runs
  #[arg(long, env = "WORK_STATS_CORPUS")]
  pub corpus_dir: Option<String>,

  /// Cache API responses in the default corpus directory (user cache dir)
  #[arg(long)]
  pub corpus: bool,

  /// Ignore cached responses but still rewrite them
  #[arg(long)]
  pub refresh_corpus: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
  /// GitHub username
  #[arg(long)]
  pub username: Option<String>,

  /// Gerrit email addresses, comma-separated
  #[arg(long, value_delimiter = ',')]
  pub email: Vec<String>,

  /// Skip the Gerrit source
  #[arg(long)]
  pub no_gerrit: bool,

  /// Skip the GitHub source
  #[arg(long)]
  pub no_github: bool,

  /// Gerrit server
  #[arg(long, default_value = DEFAULT_GERRIT_URL)]
  pub gerrit_url: String,

  /// GitHub repository holding the Gerrit project's issues
  #[arg(long, default_value = DEFAULT_TRACKER_REPO)]
  pub tracker_repo: String,

  /// GitHub organisation mirrored from Gerrit; its repositories are left to the Gerrit source
  #[arg(long, default_value = "golang")]
  pub mirrored_org: String,

  /// Repositories under --mirrored-org that are still reported from GitHub
  #[arg(long, value_delimiter = ',', default_value = "golang/vscode-go")]
  pub github_repo: Vec<String>,

  #[command(flatten)]
  pub corpus: CorpusArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReportArgs {
  #[command(flatten)]
  pub sources: SourceArgs,

  #[command(flatten)]
  pub window: WindowArgs,

  /// Directory for CSV files (default: auto-named temp dir)
  #[arg(long)]
  pub out: Option<String>,

  /// Google Sheets output: empty (off), "new", or an existing spreadsheet URL
  #[arg(long, default_value = "")]
  pub sheets: String,

  /// OAuth client credentials file (required with --sheets)
  #[arg(long)]
  pub credentials: Option<String>,

  /// OAuth token file, created if missing (required with --sheets)
  #[arg(long)]
  pub token: Option<String>,

  /// Table name prefix for the Gerrit source
  #[arg(long, default_value = "golang")]
  pub gerrit_prefix: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SnippetsArgs {
  #[command(flatten)]
  pub sources: SourceArgs,

  /// Report the week containing this date (YYYY-MM-DD)
  #[arg(long)]
  pub week_of: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TrendsArgs {
  /// Repository, as owner/name
  #[arg(long)]
  pub repo: String,

  /// Only count issues with this label
  #[arg(long)]
  pub label: Option<String>,

  /// Label that marks feature requests
  #[arg(long, default_value = "FeatureRequest")]
  pub feature_label: String,

  #[command(flatten)]
  pub window: WindowArgs,

  /// Directory for the CSV file (default: auto-named temp dir)
  #[arg(long)]
  pub out: Option<String>,

  #[command(flatten)]
  pub corpus: CorpusArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusConfig {
  pub dir: Option<String>,
  pub refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcesConfig {
  /// Present whenever GitHub is enabled; also drives tracker issues for Gerrit.
  pub username: Option<String>,
  pub emails: Vec<String>,
  pub gerrit: bool,
  pub github: bool,
  pub gerrit_url: String,
  pub tracker_repo: String,
  pub mirrored_org: String,
  pub github_repos: Vec<String>,
  pub corpus: CorpusConfig,
}

#[derive(Debug)]
pub struct ReportConfig {
  pub sources: SourcesConfig,
  pub window: WindowSpec,
  pub out: Option<String>,
  pub sheets: SheetsTarget,
  pub credentials: Option<String>,
  pub token: Option<String>,
  pub gerrit_prefix: String,
}

#[derive(Debug)]
pub struct SnippetsConfig {
  pub sources: SourcesConfig,
  pub week_of: Option<NaiveDate>,
}

#[derive(Debug)]
pub struct TrendsConfig {
  pub repo: String,
  pub label: Option<String>,
  pub feature_label: String,
  pub window: WindowSpec,
  pub out: Option<String>,
  pub corpus: CorpusConfig,
}

#[derive(Debug)]
pub enum CommandConfig {
  Report(ReportConfig),
  Snippets(SnippetsConfig),
  Trends(TrendsConfig),
}

#[derive(Debug)]
pub struct EffectiveConfig {
  pub command: CommandConfig,
  pub now_override: Option<String>,
}

pub fn normalize(cli: Cli) -> Result<EffectiveConfig> {
  let command = match cli.command {
    Some(Command::Report(args)) => CommandConfig::Report(normalize_report(args)?),
    Some(Command::Snippets(args)) => CommandConfig::Snippets(normalize_snippets(args)?),
    Some(Command::Trends(args)) => CommandConfig::Trends(normalize_trends(args)?),
    None => CommandConfig::Report(normalize_report(cli.report)?),
  };

  Ok(EffectiveConfig {
    command,
    now_override: cli.now_override,
  })
}

/// `required` rejects the implicit all-history window.
fn window_spec(w: &WindowArgs, required: bool) -> Result<WindowSpec> {
  let spec = match (&w.month, &w.for_str, &w.since, &w.until) {
    (Some(ym), None, None, None) => WindowSpec::Month { ym: ym.clone() },
    (None, Some(p), None, None) => WindowSpec::ForPhrase { phrase: p.clone() },
    (None, None, Some(s), Some(u)) => WindowSpec::SinceUntil {
      since: s.clone(),
      until: u.clone(),
    },
    (None, None, Some(s), None) => WindowSpec::Since { since: s.clone() },
    (None, None, None, Some(_)) => bail!("--until requires --since"),
    (None, None, None, None) => {
      if required {
        bail!("Provide one of --month, --for, or --since [--until]");
      }
      WindowSpec::All
    }
    _ => bail!("Ambiguous time selection: choose only one of --month | --for | --since/--until"),
  };

  Ok(spec)
}

fn normalize_corpus(c: &CorpusArgs) -> CorpusConfig {
  let dir = match (&c.corpus_dir, c.corpus || c.refresh_corpus) {
    (Some(d), _) => Some(util::canonicalize_lossy(d)),
    (None, true) => crate::corpus::Corpus::default_dir().map(|d| d.to_string_lossy().to_string()),
    (None, false) => None,
  };

  CorpusConfig {
    dir,
    refresh: c.refresh_corpus,
  }
}

fn normalize_sources(s: SourceArgs) -> Result<SourcesConfig> {
  let gerrit = !s.no_gerrit;
  let github = !s.no_github;

  if !gerrit && !github {
    bail!("--no-gerrit and --no-github together leave nothing to report");
  }

  let username = s.username.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
  if github && username.is_none() {
    bail!("--username is required unless --no-github is set");
  }

  let emails: Vec<String> = s
    .email
    .iter()
    .map(|e| e.trim().to_string())
    .filter(|e| !e.is_empty())
    .collect();
  if gerrit && emails.is_empty() {
    bail!("--email is required unless --no-gerrit is set");
  }

  Ok(SourcesConfig {
    username,
    emails,
    gerrit,
    github,
    gerrit_url: s.gerrit_url,
    tracker_repo: s.tracker_repo,
    mirrored_org: s.mirrored_org,
    github_repos: s.github_repo,
    corpus: normalize_corpus(&s.corpus),
  })
}

fn normalize_report(args: ReportArgs) -> Result<ReportConfig> {
  let window = window_spec(&args.window, false)?;
  let sheets = SheetsTarget::parse(&args.sheets)?;

  if sheets.is_enabled() {
    if args.token.as_deref().unwrap_or_default().is_empty() {
      bail!("--token is required with --sheets");
    }
    if args.credentials.as_deref().unwrap_or_default().is_empty() {
      bail!("--credentials is required with --sheets");
    }
  }

  Ok(ReportConfig {
    sources: normalize_sources(args.sources)?,
    window,
    out: args.out.as_deref().map(util::canonicalize_lossy),
    sheets,
    credentials: args.credentials,
    token: args.token,
    gerrit_prefix: args.gerrit_prefix,
  })
}

fn normalize_snippets(args: SnippetsArgs) -> Result<SnippetsConfig> {
  let week_of = args
    .week_of
    .as_deref()
    .map(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").with_context(|| format!("invalid --week-of {:?}", d)))
    .transpose()?;

  Ok(SnippetsConfig {
    sources: normalize_sources(args.sources)?,
    week_of,
  })
}

fn normalize_trends(args: TrendsArgs) -> Result<TrendsConfig> {
  let repo = args.repo.trim().to_string();
  if repo.split('/').filter(|p| !p.is_empty()).count() != 2 {
    bail!("--repo must look like owner/name, got {:?}", args.repo);
  }

  Ok(TrendsConfig {
    repo,
    label: args.label.filter(|l| !l.is_empty()),
    feature_label: args.feature_label,
    window: window_spec(&args.window, true)?,
    out: args.out.as_deref().map(util::canonicalize_lossy),
    corpus: normalize_corpus(&args.corpus),
  })
}
