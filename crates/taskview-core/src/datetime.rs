use chrono::{
  DateTime,
  Datelike,
  Days,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use parking_lot::Mutex;
use regex::Regex;

use crate::error::{
  Error,
  Result
};

/// Source of "now" for the async layers.
/// The engine itself never reads a clock;
/// callers pass the instant in.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[derive(Debug)]
pub struct FixedClock {
  now: Mutex<DateTime<Utc>>
}

impl FixedClock {
  pub fn new(
    now: DateTime<Utc>
  ) -> Self {
    Self {
      now: Mutex::new(now)
    }
  }

  pub fn set(
    &self,
    now: DateTime<Utc>
  ) {
    *self.now.lock() = now;
  }

  pub fn advance(
    &self,
    by: Duration
  ) {
    let mut guard = self.now.lock();
    *guard += by;
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock()
  }
}

/// Day-aligned boundaries for one
/// evaluation instant.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct DayBounds {
  pub today:             NaiveDate,
  pub tomorrow:          NaiveDate,
  pub start_of_today:    DateTime<Utc>,
  pub start_of_tomorrow: DateTime<Utc>,
  tz:                    Tz
}

impl DayBounds {
  pub fn at(
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    let today = local_date(now, tz);
    let tomorrow = today
      .checked_add_days(Days::new(1))
      .unwrap_or(today);

    Self {
      today,
      tomorrow,
      start_of_today: local_midnight(
        today, tz
      ),
      start_of_tomorrow:
        local_midnight(tomorrow, tz),
      tz
    }
  }

  pub fn timezone(&self) -> Tz {
    self.tz
  }

  /// Calendar day of `dt` in the same
  /// zone the bounds were computed in.
  pub fn day_of(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    local_date(dt, self.tz)
  }
}

#[must_use]
pub fn start_of_today(
  now: DateTime<Utc>,
  tz: Tz
) -> DateTime<Utc> {
  local_midnight(
    local_date(now, tz),
    tz
  )
}

#[must_use]
pub fn start_of_tomorrow(
  now: DateTime<Utc>,
  tz: Tz
) -> DateTime<Utc> {
  DayBounds::at(now, tz)
    .start_of_tomorrow
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

#[must_use]
pub fn format_local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%Y-%m-%d")
    .to_string()
}

/// Midnight of `date` in `tz`. A
/// midnight skipped by a DST jump
/// resolves to the first valid instant
/// of that day; an ambiguous one uses
/// the earliest.
#[must_use]
pub fn local_midnight(
  date: NaiveDate,
  tz: Tz
) -> DateTime<Utc> {
  let mut probe =
    date.and_time(NaiveTime::MIN);
  let end_of_day = probe
    + Duration::days(1);

  while probe < end_of_day {
    match tz.from_local_datetime(&probe)
    {
      | LocalResult::Single(dt) => {
        return dt.with_timezone(&Utc);
      }
      | LocalResult::Ambiguous(
        first,
        second
      ) => {
        tracing::trace!(
          %date,
          first = %first,
          second = %second,
          "ambiguous local midnight; using earliest"
        );
        return first
          .min(second)
          .with_timezone(&Utc);
      }
      | LocalResult::None => {
        probe += Duration::minutes(15);
      }
    }
  }

  tracing::warn!(
    %date,
    timezone = %tz,
    "no valid local instant for day; treating as UTC"
  );
  date
    .and_time(NaiveTime::MIN)
    .and_utc()
}

pub fn parse_timezone(
  raw: &str
) -> Result<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(Error::validation(
      "timezone cannot be empty"
    ));
  }

  trimmed.parse::<Tz>().map_err(
    |err| {
      Error::validation(format!(
        "unknown timezone \
         {trimmed}: {err}"
      ))
    }
  )
}

/// Parses a due-date expression into a
/// day-aligned instant. Accepts
/// `today`, `tomorrow`, `yesterday`,
/// weekday names, `+Nd`/`-Nd`,
/// `YYYY-MM-DD` and RFC 3339.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_due_date(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = local_date(now, tz);

  match lower.as_str() {
    | "today" => {
      return Ok(local_midnight(
        today, tz
      ));
    }
    | "tomorrow" => {
      return shift_days(today, 1, tz);
    }
    | "yesterday" => {
      return shift_days(today, -1, tz);
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    let target =
      next_weekday_date(today, weekday);
    return Ok(local_midnight(
      target, tz
    ));
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)d$"
  )
  .map_err(|e| {
    Error::validation(format!(
      "internal regex compile \
       failure: {e}"
    ))
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps["num"]
      .parse()
      .map_err(|_| {
        Error::validation(format!(
          "invalid relative day \
           count: {token}"
        ))
      })?;
    let signed = if &caps["sign"] == "-"
    {
      -num
    } else {
      num
    };
    return shift_days(
      today, signed, tz
    );
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(local_midnight(
      date, tz
    ));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  Err(Error::validation(format!(
    "malformed date: {token}"
  )))
}

fn shift_days(
  from: NaiveDate,
  days: i64,
  tz: Tz
) -> Result<DateTime<Utc>> {
  let shifted = from
    .checked_add_signed(
      Duration::days(days)
    )
    .ok_or_else(|| {
      Error::validation(format!(
        "date out of range: {from} \
         {days:+}d"
      ))
    })?;
  Ok(local_midnight(shifted, tz))
}

fn parse_weekday_name(
  lower: &str
) -> Option<Weekday> {
  match lower {
    | "mon" | "monday" => {
      Some(Weekday::Mon)
    }
    | "tue" | "tues" | "tuesday" => {
      Some(Weekday::Tue)
    }
    | "wed" | "wednesday" => {
      Some(Weekday::Wed)
    }
    | "thu" | "thur" | "thurs"
    | "thursday" => Some(Weekday::Thu),
    | "fri" | "friday" => {
      Some(Weekday::Fri)
    }
    | "sat" | "saturday" => {
      Some(Weekday::Sat)
    }
    | "sun" | "sunday" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

/// Next occurrence strictly after
/// `from`.
fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let current = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let wanted =
    target.num_days_from_monday() as i64;
  let mut delta = wanted - current;
  if delta <= 0 {
    delta += 7;
  }
  from + Duration::days(delta)
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    NaiveDate,
    TimeZone,
    Utc
  };
  use chrono_tz::Tz;

  use super::{
    Clock,
    DayBounds,
    FixedClock,
    local_midnight,
    parse_due_date,
    parse_timezone,
    start_of_today,
    start_of_tomorrow
  };

  #[test]
  fn bounds_follow_local_calendar_day()
  {
    let tz: Tz = "America/New_York"
      .parse()
      .unwrap();
    // 03:00 UTC is still the previous
    // evening in New York.
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 3, 0, 0
      )
      .unwrap();
    let bounds = DayBounds::at(now, tz);

    assert_eq!(
      bounds.today,
      NaiveDate::from_ymd_opt(
        2026, 2, 15
      )
      .unwrap()
    );
    assert_eq!(
      bounds.start_of_today,
      Utc
        .with_ymd_and_hms(
          2026, 2, 15, 5, 0, 0
        )
        .unwrap()
    );
    assert_eq!(
      bounds.start_of_tomorrow,
      Utc
        .with_ymd_and_hms(
          2026, 2, 16, 5, 0, 0
        )
        .unwrap()
    );
    assert_eq!(
      start_of_today(now, tz),
      bounds.start_of_today
    );
    assert_eq!(
      start_of_tomorrow(now, tz),
      bounds.start_of_tomorrow
    );
  }

  #[test]
  fn skipped_midnight_falls_forward() {
    // Chile springs forward at local
    // midnight.
    let tz: Tz = "America/Santiago"
      .parse()
      .unwrap();
    let date = NaiveDate::from_ymd_opt(
      2024, 9, 8
    )
    .unwrap();
    let start = local_midnight(date, tz);
    let local = start.with_timezone(&tz);

    assert_eq!(local.date_naive(), date);
    assert_eq!(
      local.format("%H:%M").to_string(),
      "01:00"
    );
  }

  #[test]
  fn due_date_expressions() {
    let tz = parse_timezone("UTC").unwrap();
    // Monday.
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 14, 30, 0
      )
      .unwrap();
    let midnight = |d: u32| {
      Utc
        .with_ymd_and_hms(
          2026, 2, d, 0, 0, 0
        )
        .unwrap()
    };

    assert_eq!(
      parse_due_date("today", now, tz)
        .unwrap(),
      midnight(16)
    );
    assert_eq!(
      parse_due_date(
        "Tomorrow", now, tz
      )
      .unwrap(),
      midnight(17)
    );
    assert_eq!(
      parse_due_date("+3d", now, tz)
        .unwrap(),
      midnight(19)
    );
    assert_eq!(
      parse_due_date("-1d", now, tz)
        .unwrap(),
      midnight(15)
    );
    assert_eq!(
      parse_due_date("monday", now, tz)
        .unwrap(),
      midnight(23)
    );
    assert_eq!(
      parse_due_date(
        "2026-02-20",
        now,
        tz
      )
      .unwrap(),
      midnight(20)
    );
    assert_eq!(
      parse_due_date(
        "2026-02-20T10:15:00Z",
        now,
        tz
      )
      .unwrap(),
      Utc
        .with_ymd_and_hms(
          2026, 2, 20, 10, 15, 0
        )
        .unwrap()
    );

    let err = parse_due_date(
      "next blue moon",
      now,
      tz
    )
    .unwrap_err();
    assert_eq!(err.code(), "validation");
  }

  #[test]
  fn unknown_timezone_is_rejected() {
    assert!(
      parse_timezone("Mars/Olympus")
        .is_err()
    );
    assert!(parse_timezone(" ").is_err());
  }

  #[test]
  fn fixed_clock_advances() {
    let start = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 23, 0, 0
      )
      .unwrap();
    let clock = FixedClock::new(start);
    clock.advance(Duration::hours(2));
    assert_eq!(
      clock.now(),
      start + Duration::hours(2)
    );
  }
}
