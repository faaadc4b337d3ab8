//! Retention sweep — deletes hosted files older than 24 hours, once a
//! day at 23:59 local time. Individual deletion failures never abort
//! the rest of the sweep.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Maximum age of a hosted file.
const MAX_AGE_HOURS: i64 = 24;

/// Local wall-clock time the daily sweep runs at.
const SWEEP_TIME: (u32, u32) = (23, 59);

/// Delete every file in `dir` whose mtime is older than 24 h before `now`.
///
/// The clock is injected so tests (and the `sweep` subcommand) can run a
/// single deterministic pass. Returns the number of files deleted.
pub fn sweep_once(dir: &Path, now: DateTime<Local>) -> usize {
    let cutoff = now - ChronoDuration::hours(MAX_AGE_HOURS);

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("retention sweep cannot read {}: {e}", dir.display());
            return 0;
        }
    };

    let mut deleted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match file_mtime(&path) {
            Some(mtime) if mtime < cutoff => {
                if let Err(e) = std::fs::remove_file(&path) {
                    error!("failed to delete {}: {e}", path.display());
                } else {
                    info!("deleted old file {}", path.display());
                    deleted += 1;
                }
            }
            Some(_) => {}
            None => warn!("cannot stat {}", path.display()),
        }
    }
    deleted
}

fn file_mtime(path: &Path) -> Option<DateTime<Local>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified))
}

/// Seconds until the next scheduled sweep after `now`.
pub fn next_run_delay(now: DateTime<Local>) -> Duration {
    let (hour, minute) = SWEEP_TIME;
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let mut target_date = now.date_naive();
    let naive_now = now.naive_local();

    if naive_now.time() >= time {
        target_date += ChronoDuration::days(1);
    }

    let target = target_date.and_time(time);
    (target - naive_now)
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}

/// Background loop: sleep until 23:59 local, sweep, repeat forever.
pub async fn run(dir: PathBuf) {
    loop {
        let delay = next_run_delay(Local::now());
        tokio::time::sleep(delay).await;
        let deleted = sweep_once(&dir, Local::now());
        info!("retention sweep finished, {deleted} file(s) deleted");
    }
}
