// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Resolve reporting windows (explicit dates, month, natural-language phrase, snippet week) to UTC bounds
// role: time/windows
// inputs: WindowSpec from the CLI; "now" (possibly overridden); optional week-of date
// outputs: Window { start, end } in UTC; Monday-to-Monday week dates
// side_effects: none
// invariants:
// - resolve never returns start >= end
// - plain dates are midnight UTC; phrases are relative to local now
// - infer_week always spans exactly seven days starting on a Monday
// errors: Unparseable dates or phrases are errors naming the offending input
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use chrono_english::{parse_duration, Interval};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use two_timer::parse as parse_natural;

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum WindowSpec {
  /// Everything since 1900-01-01.
  All,
  Since { since: String },
  SinceUntil { since: String, until: String },
  Month { ym: String },
  ForPhrase { phrase: String },
}

/// A resolved `(start, end)` pair in UTC.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Window {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

impl Window {
  /// Calendar days (UTC) from the start day through the end day.
  pub fn days(&self) -> Vec<NaiveDate> {
    let last = self.end.date_naive();
    let mut day = self.start.date_naive();
    let mut out = Vec::new();

    while day <= last {
      out.push(day);
      match day.succ_opt() {
        Some(next) => day = next,
        None => break,
      }
    }

    out
  }
}

pub fn history_start() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn utc_midnight(d: NaiveDate) -> DateTime<Utc> {
  Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN))
}

fn local_from_naive(ndt: NaiveDateTime) -> Result<DateTime<Local>> {
  ndt
    .and_local_timezone(Local)
    .earliest()
    .ok_or_else(|| anyhow!("{} does not exist in the local timezone", ndt))
}

/// Local midnight of `d`, as UTC.
pub fn local_midnight(d: NaiveDate) -> Result<DateTime<Utc>> {
  Ok(local_from_naive(d.and_time(chrono::NaiveTime::MIN))?.with_timezone(&Utc))
}

/// `YYYY-MM-DD` (midnight UTC), `YYYY-MM-DDTHH:MM:SS` (UTC) or RFC3339.
pub fn parse_day_or_time(s: &str) -> Result<DateTime<Utc>> {
  let s = s.trim();

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
    return Ok(Utc.from_utc_datetime(&ndt));
  }
  let d = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date {:?}, expected YYYY-MM-DD", s))?;

  Ok(utc_midnight(d))
}

pub fn month_bounds(year_month: &str) -> Result<(NaiveDate, NaiveDate)> {
  let parts: Vec<&str> = year_month.split('-').collect();

  if parts.len() != 2 {
    bail!("invalid --month, expected YYYY-MM");
  }
  let y: i32 = parts[0].parse().context("parsing year in --month")?;
  let m: u32 = parts[1].parse().context("parsing month in --month")?;

  if !(1..=12).contains(&m) {
    bail!("invalid month in --month");
  }
  let next_y = if m == 12 { y + 1 } else { y };
  let next_m = if m == 12 { 1 } else { m + 1 };

  let start = NaiveDate::from_ymd_opt(y, m, 1).ok_or_else(|| anyhow!("invalid --month {}", year_month))?;
  let end = NaiveDate::from_ymd_opt(next_y, next_m, 1).ok_or_else(|| anyhow!("invalid --month {}", year_month))?;

  Ok((start, end))
}

/// Resolve a window against `now`. Start must precede end.
pub fn resolve(window: &WindowSpec, now: DateTime<Local>) -> Result<Window> {
  let now_utc = now.with_timezone(&Utc);

  let (start, end) = match window {
    WindowSpec::All => (history_start(), now_utc),
    WindowSpec::Since { since } => (parse_day_or_time(since)?, now_utc),
    WindowSpec::SinceUntil { since, until } => (parse_day_or_time(since)?, parse_day_or_time(until)?),
    WindowSpec::Month { ym } => {
      let (s, e) = month_bounds(ym)?;
      (utc_midnight(s), utc_midnight(e))
    }
    WindowSpec::ForPhrase { phrase } => {
      let (s, e) = for_phrase_bounds(phrase, now)?;
      (s.with_timezone(&Utc), e.with_timezone(&Utc))
    }
  };

  if start >= end {
    bail!("window start {} is not before end {}", start, end);
  }

  Ok(Window { start, end })
}

// --- Weekly snippet window ---

/// Monday-to-Monday week for a snippet report. Run on Monday through
/// Wednesday it reports the previous week; `week_of` picks the week containing that day.
pub fn infer_week(today: NaiveDate, week_of: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
  let reference = week_of.unwrap_or_else(|| match today.weekday() {
    Weekday::Mon => today - Duration::days(1),
    Weekday::Tue => today - Duration::days(2),
    Weekday::Wed => today - Duration::days(3),
    _ => today,
  });
  let start = reference - Duration::days(i64::from(reference.weekday().num_days_from_monday()));

  (start, start + Duration::days(7))
}

// --- Helpers for `--for` parsing ---

static RE_LAST_WEEKDAY: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^last\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)$").unwrap());

fn day_start(dt: DateTime<Local>) -> Result<DateTime<Local>> {
  local_from_naive(dt.date_naive().and_time(chrono::NaiveTime::MIN))
}

fn start_of_week(dt: DateTime<Local>) -> Result<DateTime<Local>> {
  let weekday = i64::from(dt.weekday().num_days_from_monday());
  day_start(dt - Duration::days(weekday))
}

fn last_week_range(now: DateTime<Local>) -> Result<(DateTime<Local>, DateTime<Local>)> {
  let start_this_week = start_of_week(now)?;
  let start_last_week = start_of_week(now - Duration::days(7))?;
  Ok((start_last_week, start_this_week))
}

fn last_month_range(now: DateTime<Local>) -> Result<(DateTime<Local>, DateTime<Local>)> {
  let (y, m) = (now.year(), now.month());
  let (last_y, last_m) = if m == 1 { (y - 1, 12) } else { (y, m - 1) };

  let first = |y: i32, m: u32| -> Result<DateTime<Local>> {
    let d = NaiveDate::from_ymd_opt(y, m, 1).ok_or_else(|| anyhow!("invalid month {}-{}", y, m))?;
    local_from_naive(d.and_time(chrono::NaiveTime::MIN))
  };

  Ok((first(last_y, last_m)?, first(y, m)?))
}

/// Parse a `--now-override` string into a local DateTime.
/// Accepts RFC3339 (e.g. 2025-08-15T12:00:00Z) or a naive local timestamp
/// formatted as `%Y-%m-%dT%H:%M:%S`.
pub fn parse_now_override(s: Option<&str>) -> Option<DateTime<Local>> {
  s.and_then(|raw| {
    DateTime::parse_from_rfc3339(raw)
      .ok()
      .map(|dt| dt.with_timezone(&Local))
      .or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
          .ok()
          .and_then(|ndt| ndt.and_local_timezone(Local).single())
      })
  })
}

/// Range for a natural-language phrase relative to `now`.
fn for_phrase_bounds(input: &str, now: DateTime<Local>) -> Result<(DateTime<Local>, DateTime<Local>)> {
  let phrase = input.trim().to_lowercase();

  // "today" runs from local day start to now.
  if phrase == "today" {
    return Ok((day_start(now)?, now));
  }

  // Previous calendar week: Mon 00:00 to this week's Mon 00:00.
  if phrase == "last week" {
    return last_week_range(now);
  }

  if phrase == "last month" {
    return last_month_range(now);
  }

  // Strictly previous occurrence of the weekday, through now.
  if let Some(caps) = RE_LAST_WEEKDAY.captures(&phrase) {
    let target: Weekday = caps[1].parse().map_err(|_| anyhow!("unknown weekday in {:?}", input))?;
    let today_start = day_start(now)?;

    let cur_idx = i64::from(today_start.weekday().num_days_from_monday());
    let target_idx = i64::from(target.num_days_from_monday());
    let mut delta_days = cur_idx - target_idx;
    if delta_days <= 0 {
      delta_days += 7;
    }

    return Ok((today_start - Duration::days(delta_days), now));
  }

  if phrase == "yesterday" {
    return Ok((now - Duration::days(1), now));
  }

  // Durations ("2 weeks ago", "10 minutes") via chrono-english, before two_timer
  // gets a chance to read them as instants.
  if let Ok(interval) = parse_duration(&phrase) {
    let range = match interval {
      Interval::Seconds(secs) => {
        let d = Duration::seconds(secs.into());
        if secs < 0 { (now + d, now) } else { (now, now + d) }
      }
      Interval::Days(days) => {
        let d = Duration::days(days.into());
        if days < 0 { (now + d, now) } else { (now, now + d) }
      }
      Interval::Months(months) => {
        if months < 0 {
          (shift_months(now, months)?, now)
        } else {
          (now, shift_months(now, months)?)
        }
      }
    };

    return Ok(range);
  }

  // Calendar ranges via two_timer (last year, this month, june 2024, ...), clipped to now.
  if let Ok((start_naive, end_naive, _)) = parse_natural(&phrase, None) {
    let start = local_from_naive(start_naive)?;
    let end = local_from_naive(end_naive)?;

    return Ok((start, if end > now { now } else { end }));
  }

  bail!("could not understand --for {:?}", input)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
  let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
  Some(NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()?.day())
}

/// Move `dt` by `n` calendar months, clamping the day of month.
fn shift_months(dt: DateTime<Local>, n: i32) -> Result<DateTime<Local>> {
  let total = (dt.year() * 12 + dt.month() as i32 - 1) + n;
  let y = total.div_euclid(12);
  let m = (total.rem_euclid(12) + 1) as u32;
  let last = last_day_of_month(y, m).ok_or_else(|| anyhow!("month out of range"))?;

  let nt = NaiveDate::from_ymd_opt(y, m, dt.day().min(last))
    .and_then(|d| d.and_hms_opt(dt.hour(), dt.minute(), dt.second()))
    .ok_or_else(|| anyhow!("month out of range"))?;

  local_from_naive(nt)
}
