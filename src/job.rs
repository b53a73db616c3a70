//! The daily pipeline: archive → fetch → sync.
//!
//! Archiving runs first so the sync only sees mail fetched in this run.
//! Any stage error aborts the remainder of the job; the scheduler logs it
//! and waits for the next fire.

use anyhow::Result;

use crate::archive;
use crate::config::Config;
use crate::ingest;
use crate::mail;

pub async fn run_daily_job(config: &Config) -> Result<()> {
    archive::run_archive(config)?;
    mail::run_fetch(config).await?;
    ingest::run_sync(config, false, None).await?;
    Ok(())
}
