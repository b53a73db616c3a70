//! Blocking daily scheduler.
//!
//! Computes the next wall-clock fire time from the configured hour/minute,
//! sleeps until then, runs the daily job, and loops. Runs are sequential by
//! construction, so a long job simply delays the next fire; there is no
//! catch-up for missed fires and no state survives a restart.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime, TimeZone};

use crate::config::Config;
use crate::job;

/// The next occurrence of `hour:minute` strictly after `now`.
fn next_fire(now: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    let fire_time = NaiveTime::from_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is valid"));

    let today = now.date_naive().and_time(fire_time);
    let candidate = match Local.from_local_datetime(&today).earliest() {
        Some(dt) => dt,
        // DST gap: fall through to tomorrow.
        None => now + ChronoDuration::days(1),
    };

    if candidate > now {
        candidate
    } else {
        let tomorrow = (now.date_naive() + ChronoDuration::days(1)).and_time(fire_time);
        Local
            .from_local_datetime(&tomorrow)
            .earliest()
            .unwrap_or(now + ChronoDuration::days(1))
    }
}

/// Block the process, firing the daily job at the configured time. A job
/// error is logged and the loop continues to the next day.
pub async fn run_scheduler(config: &Config) -> Result<()> {
    println!(
        "scheduler started — daily job at {:02}:{:02}",
        config.schedule.hour, config.schedule.minute
    );

    loop {
        let now = Local::now();
        let fire_at = next_fire(now, config.schedule.hour, config.schedule.minute);
        let wait = (fire_at - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));

        println!("  next fire: {}", fire_at.format("%Y-%m-%d %H:%M:%S"));
        tokio::time::sleep(wait).await;

        if let Err(e) = job::run_daily_job(config).await {
            eprintln!("Error: daily job failed: {}", e);
        }
    }
}
