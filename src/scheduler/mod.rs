//! Daily trigger for the backup run.
//!
//! One run happens straight away, then the loop wakes every
//! [`POLL_INTERVAL`] and runs the job once the configured UTC time has
//! passed. Runs are awaited inline, so two never overlap.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ScheduleTime;

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// First occurrence of `at` strictly after `now`.
pub fn next_fire_after(now: DateTime<Utc>, at: ScheduleTime) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(at.hour(), at.minute(), 0).unwrap_or_default();
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: ScheduleTime,
    next_fire: DateTime<Utc>,
}

impl DailySchedule {
    pub fn new(at: ScheduleTime, now: DateTime<Utc>) -> Self {
        DailySchedule {
            at,
            next_fire: next_fire_after(now, at),
        }
    }

    pub fn next_fire(&self) -> DateTime<Utc> {
        self.next_fire
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_fire
    }

    /// Moves to the next occurrence after `now`. Called once a run finishes,
    /// so a run that overshoots midnight does not fire twice.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.next_fire = next_fire_after(now, self.at);
    }
}

/// Runs `job` now and then daily at `at` until `shutdown` resolves.
///
/// `now` is the wall clock the schedule is checked against; the binary
/// passes `Utc::now`. `shutdown` is only polled between runs; a run in
/// progress always finishes.
pub async fn run_daily<C, F, Fut, S>(at: ScheduleTime, now: C, mut job: F, shutdown: S)
where
    C: Fn() -> DateTime<Utc>,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    let mut schedule = DailySchedule::new(at, now());
    job().await;
    info!("Next scheduled backup: {}", schedule.next_fire().format("%Y-%m-%d %H:%M UTC"));

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping backup scheduler");
                return;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        if schedule.is_due(now()) {
            job().await;
            schedule.advance(now());
            info!("Next scheduled backup: {}", schedule.next_fire().format("%Y-%m-%d %H:%M UTC"));
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
