use crate::desk::{CycleReport, TradingDesk};
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use core_types::TriggerKind;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A unit of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Mark open positions to market.
    Reprice,
    /// Run a coordination cycle.
    Analysis(TriggerKind),
    /// Append the close-of-session P&L record.
    CloseSummary,
}

impl Job {
    fn slot(&self) -> usize {
        match self {
            Job::Reprice => 0,
            Job::Analysis(_) => 1,
            Job::CloseSummary => 2,
        }
    }
}

const JOB_SLOTS: usize = 3;

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Exchange session calendar: weekdays only, two continuous trading windows.
///
/// Exchange holidays are not modelled; on those days the collaborators simply
/// return stale data.
#[derive(Debug, Clone)]
pub struct SessionCalendar {
    tz: Tz,
}

impl SessionCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn is_trading_day(&self, local: &DateTime<Tz>) -> bool {
        !matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Morning 09:00 to 11:30 and afternoon 13:00 to 15:00, both inclusive.
    pub fn in_reprice_window(&self, local: &DateTime<Tz>) -> bool {
        let t = hm(local.hour(), local.minute());
        (t >= hm(9, 0) && t <= hm(11, 30)) || (t >= hm(13, 0) && t <= hm(15, 0))
    }

    /// Analysis trigger scheduled for this exact minute, if any.
    pub fn analysis_at(&self, local: &DateTime<Tz>) -> Option<TriggerKind> {
        match (local.hour(), local.minute()) {
            (9, 25) => Some(TriggerKind::PreOpen),
            (10, 0) | (11, 0) | (14, 0) => Some(TriggerKind::Hourly),
            (13, 0) => Some(TriggerKind::Midday),
            _ => None,
        }
    }

    /// Every job that falls on the minute of `local`, in execution order.
    pub fn jobs_due(&self, local: &DateTime<Tz>) -> Vec<Job> {
        if !self.is_trading_day(local) {
            return Vec::new();
        }
        let mut jobs = Vec::new();
        if self.in_reprice_window(local) {
            jobs.push(Job::Reprice);
        }
        if let Some(trigger) = self.analysis_at(local) {
            jobs.push(Job::Analysis(trigger));
        }
        if (local.hour(), local.minute()) == (15, 5) {
            jobs.push(Job::CloseSummary);
        }
        jobs
    }
}

/// What the transport layer reports about the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
}

struct Runner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives the desk through the trading session.
///
/// The loop polls the clock and fires the jobs of each new exchange minute once.
/// A job that is still running when its next slot arrives is skipped rather than
/// started twice.
pub struct SessionScheduler {
    desk: Arc<TradingDesk>,
    calendar: SessionCalendar,
    poll_interval: Duration,
    busy: Arc<[AtomicBool; JOB_SLOTS]>,
    runner: Mutex<Option<Runner>>,
}

impl SessionScheduler {
    pub fn new(desk: Arc<TradingDesk>) -> Self {
        let calendar = SessionCalendar::new(desk.clock().tz());
        Self {
            desk,
            calendar,
            poll_interval: Duration::from_secs(1),
            busy: Arc::new([
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ]),
            runner: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Starts the polling loop. Calling it while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            warn!("Scheduler already running");
            return;
        }
        let (shutdown, mut stop_rx) = watch::channel(false);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_minute: Option<DateTime<Tz>> = None;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                let local = this.desk.clock().local_now();
                let minute = local.with_second(0).and_then(|t| t.with_nanosecond(0));
                if minute.is_none() || minute == last_minute {
                    continue;
                }
                last_minute = minute;
                this.tick(local);
            }
            info!("Scheduler loop exited");
        });
        *runner = Some(Runner { shutdown, handle });
        info!(tz = %self.calendar.tz(), "Scheduler started");
    }

    /// Stops the loop and waits for it to exit. Jobs already spawned finish on
    /// their own. Calling it when stopped is a no-op.
    pub async fn stop(&self) {
        let Some(runner) = self.runner.lock().await.take() else {
            return;
        };
        let _ = runner.shutdown.send(true);
        if let Err(e) = runner.handle.await {
            error!(error = %e, "Scheduler loop terminated abnormally");
        }
        info!("Scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.runner.lock().await.is_some()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let last_report = self.desk.last_report().await;
        SchedulerStatus {
            running: self.is_running().await,
            last_analysis_at: last_report.as_ref().map(|r| r.started_at),
            last_report,
        }
    }

    /// Spawns every job due at `local`. Jobs whose previous run has not
    /// finished are skipped.
    pub fn tick(&self, local: DateTime<Tz>) -> Vec<JoinHandle<()>> {
        self.calendar
            .jobs_due(&local)
            .into_iter()
            .filter_map(|job| self.spawn(job))
            .collect()
    }

    fn spawn(&self, job: Job) -> Option<JoinHandle<()>> {
        let slot = job.slot();
        if self.busy[slot]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(?job, "Previous run still in progress, skipping");
            return None;
        }
        let desk = Arc::clone(&self.desk);
        let busy = Arc::clone(&self.busy);
        Some(tokio::spawn(async move {
            run_job(&desk, job).await;
            busy[slot].store(false, Ordering::Release);
        }))
    }
}

async fn run_job(desk: &TradingDesk, job: Job) {
    match job {
        Job::Reprice => {
            if let Err(e) = desk.reprice().await {
                warn!(error = %e, "Scheduled reprice failed");
            }
        }
        Job::Analysis(trigger) => {
            if let Err(e) = desk.run_cycle(trigger).await {
                error!(error = %e, trigger = %trigger, "Scheduled analysis failed");
            }
        }
        Job::CloseSummary => {
            if let Err(e) = desk.close_session().await {
                error!(error = %e, "Close-of-session summary failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        // 2024-03-11 is a Monday.
        Shanghai.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn weekend_has_no_jobs() {
        let cal = SessionCalendar::new(Shanghai);
        assert!(cal.jobs_due(&at(16, 10, 0)).is_empty());
        assert!(cal.jobs_due(&at(17, 15, 5)).is_empty());
    }

    #[test]
    fn reprice_windows_are_inclusive() {
        let cal = SessionCalendar::new(Shanghai);
        assert!(cal.in_reprice_window(&at(11, 9, 0)));
        assert!(cal.in_reprice_window(&at(11, 11, 30)));
        assert!(!cal.in_reprice_window(&at(11, 11, 31)));
        assert!(!cal.in_reprice_window(&at(11, 12, 0)));
        assert!(cal.in_reprice_window(&at(11, 13, 0)));
        assert!(cal.in_reprice_window(&at(11, 15, 0)));
        assert!(!cal.in_reprice_window(&at(11, 15, 1)));
        assert!(!cal.in_reprice_window(&at(11, 8, 59)));
    }

    #[test]
    fn analysis_slots_map_to_triggers() {
        let cal = SessionCalendar::new(Shanghai);
        assert_eq!(cal.jobs_due(&at(12, 9, 25)), vec![Job::Analysis(TriggerKind::PreOpen)]);
        assert_eq!(
            cal.jobs_due(&at(12, 10, 0)),
            vec![Job::Reprice, Job::Analysis(TriggerKind::Hourly)]
        );
        assert_eq!(
            cal.jobs_due(&at(12, 13, 0)),
            vec![Job::Reprice, Job::Analysis(TriggerKind::Midday)]
        );
        assert_eq!(
            cal.jobs_due(&at(12, 14, 0)),
            vec![Job::Reprice, Job::Analysis(TriggerKind::Hourly)]
        );
        assert_eq!(cal.jobs_due(&at(12, 12, 0)), Vec::<Job>::new());
    }

    #[test]
    fn close_summary_runs_after_the_bell() {
        let cal = SessionCalendar::new(Shanghai);
        assert_eq!(cal.jobs_due(&at(15, 15, 5)), vec![Job::CloseSummary]);
        assert!(!cal.jobs_due(&at(15, 15, 0)).contains(&Job::CloseSummary));
    }
}
