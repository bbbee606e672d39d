use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

// Snapshots are collected once a day; before this local time the previous day's
// collection is still the newest one.
const CUTOVER_HOUR: u32 = 8;
const CUTOVER_MINUTE: u32 = 30;
const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::London;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub latest: NaiveDate,
    pub previous: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSchedule {
    tz: Tz,
    hour: u32,
    minute: u32,
}

impl Default for CollectionSchedule {
    fn default() -> Self {
        Self {
            tz: DEFAULT_TIMEZONE,
            hour: CUTOVER_HOUR,
            minute: CUTOVER_MINUTE,
        }
    }
}

impl CollectionSchedule {
    pub fn in_timezone(name: &str) -> anyhow::Result<Self> {
        let tz = name
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid COLLECTION_TIMEZONE {name:?}: {e}"))?;
        Ok(Self {
            tz,
            ..Self::default()
        })
    }

    pub fn window_at(&self, now_utc: DateTime<Utc>) -> CollectionWindow {
        let now_local = now_utc.with_timezone(&self.tz);

        let cutover_reached = (now_local.hour(), now_local.minute()) >= (self.hour, self.minute);
        let mut latest = now_local.date_naive();
        if !cutover_reached {
            latest = latest - Duration::days(1);
        }

        CollectionWindow {
            latest,
            previous: latest - Duration::days(1),
        }
    }

    /// First cutover instant strictly after `now_utc`.
    pub fn next_cutover_after(&self, now_utc: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        let today = now_utc.with_timezone(&self.tz).date_naive();
        let candidate = self.cutover_on(today)?;
        if candidate > now_utc {
            return Ok(candidate);
        }
        self.cutover_on(today + Duration::days(1))
    }

    /// Time left in the current window; used as a cache expiry.
    pub fn ttl_until_next_cutover(
        &self,
        now_utc: DateTime<Utc>,
    ) -> anyhow::Result<std::time::Duration> {
        let next = self.next_cutover_after(now_utc)?;
        (next - now_utc)
            .to_std()
            .context("next cutover is not in the future")
    }

    fn cutover_on(&self, date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
        let naive = date
            .and_hms_opt(self.hour, self.minute, 0)
            .context("invalid cutover time")?;
        let local = self
            .tz
            .from_local_datetime(&naive)
            .earliest()
            .with_context(|| format!("cutover {naive} does not exist in {}", self.tz))?;
        Ok(local.with_timezone(&Utc))
    }
}
