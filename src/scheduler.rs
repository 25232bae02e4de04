//! Daily rotation scheduler.
//!
//! Sleeps until the next vendor reset (17:00 UTC), runs an availability
//! pre-flight (waiting out maintenance windows in 5-minute steps), then
//! refreshes and publishes each vendor due today. Every sleep honors the
//! shutdown channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::bungie::{ProbeStatus, SessionContext, VendorApi};
use crate::cache::RotationCache;
use crate::config::{MAINTENANCE_RETRY_SECS, RESET_HOUR_UTC, VENDORS};
use crate::render;
use crate::surface::Surface;

/// Shared handles the scheduler drives.
pub struct SchedulerContext {
    pub cache: Arc<RotationCache>,
    pub api: Arc<dyn VendorApi + Send + Sync>,
    pub surface: Arc<dyn Surface + Send + Sync>,
}

/// Time remaining until the next daily reset.
pub fn until_next_reset(now: DateTime<Utc>) -> Duration {
    let today_reset = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), RESET_HOUR_UTC, 0, 0)
        .single()
        .expect("reset time is always valid");
    let next = if now < today_reset {
        today_reset
    } else {
        today_reset + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Outcome of the availability pre-flight.
enum Preflight {
    Proceed,
    Abort,
    Shutdown,
}

/// Probe upstream until it answers, waiting out maintenance windows.
/// A dead upstream (no response at all) notifies the operator and aborts
/// this cycle; the next reset will try again.
async fn preflight(
    ctx: &SchedulerContext,
    session: &SessionContext,
    shutdown: &mut watch::Receiver<bool>,
) -> Preflight {
    loop {
        match ctx.api.probe(session).await {
            ProbeStatus::Ok => return Preflight::Proceed,
            ProbeStatus::NoResponse => {
                error!("[SCHED] Upstream unreachable, skipping this cycle");
                if let Err(err) = ctx
                    .surface
                    .notify_operator("Vendor rotation skipped: upstream API unreachable")
                    .await
                {
                    warn!("[SCHED] Operator notification failed: {:#}", err);
                }
                return Preflight::Abort;
            }
            ProbeStatus::Maintenance => {
                info!(
                    "[SCHED] Upstream in maintenance, re-probing in {}s",
                    MAINTENANCE_RETRY_SECS
                );
                tokio::select! {
                    _ = sleep(Duration::from_secs(MAINTENANCE_RETRY_SECS)) => {}
                    _ = shutdown.changed() => return Preflight::Shutdown,
                }
            }
        }
    }
}

/// One full rotation cycle: pre-flight, then refresh + publish every vendor
/// due today. Per-vendor failures are logged and do not stop the others.
pub async fn run_cycle(ctx: &SchedulerContext, shutdown: &mut watch::Receiver<bool>) -> bool {
    let session = match SessionContext::load(ctx.cache.store()) {
        Ok(session) => session,
        Err(err) => {
            error!("[SCHED] No usable operator session: {:#}", err);
            return true;
        }
    };

    match preflight(ctx, &session, shutdown).await {
        Preflight::Proceed => {}
        Preflight::Abort => return true,
        Preflight::Shutdown => return false,
    }

    let weekday = Utc::now().date_naive().weekday();
    for descriptor in VENDORS {
        if let Some(day) = descriptor.weekday {
            if day != weekday {
                info!("[SCHED] {} is not due on {:?}", descriptor.title, weekday);
                continue;
            }
        }

        if !ctx.cache.refresh(descriptor.id.hash()).await {
            warn!("[SCHED] {} refresh failed, skipping publish", descriptor.title);
            continue;
        }
        if let Err(err) = render::publish(
            &ctx.cache,
            ctx.surface.as_ref(),
            ctx.api.as_ref(),
            descriptor.id.hash(),
        )
        .await
        {
            error!("[SCHED] Publish failed for {}: {:#}", descriptor.title, err);
        }
    }
    true
}

/// Scheduler main loop. Returns when the shutdown channel fires.
pub async fn run(ctx: SchedulerContext, mut shutdown: watch::Receiver<bool>) {
    info!(
        "[SCHED] Scheduler started, daily reset at {:02}:00 UTC",
        RESET_HOUR_UTC
    );
    loop {
        let wait = until_next_reset(Utc::now());
        info!("[SCHED] Next reset in {}s", wait.as_secs());
        tokio::select! {
            _ = sleep(wait) => {}
            _ = shutdown.changed() => {
                info!("[SCHED] Shutdown requested, stopping scheduler");
                return;
            }
        }

        if !run_cycle(&ctx, &mut shutdown).await {
            info!("[SCHED] Shutdown requested during cycle, stopping scheduler");
            return;
        }
    }
}

/// Kick off an immediate catch-up cycle if we started after today's reset
/// with no current entries (e.g. the process was down at reset time).
pub fn reset_passed_today(now: DateTime<Utc>) -> bool {
    now.hour() >= RESET_HOUR_UTC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_until_next_reset_before_reset() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 14, 30, 0).unwrap();
        assert_eq!(until_next_reset(now), Duration::from_secs(2 * 3600 + 30 * 60));
    }

    #[test]
    fn test_until_next_reset_after_reset_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 17, 0, 1).unwrap();
        let wait = until_next_reset(now);
        assert_eq!(wait, Duration::from_secs(24 * 3600 - 1));
    }

    #[test]
    fn test_until_next_reset_at_reset_is_a_full_day() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 17, 0, 0).unwrap();
        assert_eq!(until_next_reset(now), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_reset_passed_today() {
        let before = Utc.with_ymd_and_hms(2026, 8, 25, 16, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 8, 25, 17, 1, 0).unwrap();
        assert!(!reset_passed_today(before));
        assert!(reset_passed_today(after));
    }
}
