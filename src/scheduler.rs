use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Days, Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{SchedulerStatus, SweepReport};
use crate::engine::RecurringExpenseService;
use crate::error::AppError;
use crate::store::{Clock, ExpenseSink, TemplateStore};

const SCHEDULE_DESCRIPTION: &str = "Daily at midnight (00:00)";

/// Drives the daily bulk sweep. One instance is constructed at bootstrap and
/// shared by handle with the shutdown hook; there is exactly one timer task
/// per process while it is running.
pub struct Scheduler<S, E, C> {
    service: Arc<RecurringExpenseService<S, E, C>>,
    timer: Mutex<Option<RunningTimer>>,
}

struct RunningTimer {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl<S, E, C> Scheduler<S, E, C>
where
    S: TemplateStore + 'static,
    E: ExpenseSink + 'static,
    C: Clock + 'static,
{
    pub fn new(service: Arc<RecurringExpenseService<S, E, C>>) -> Self {
        Self {
            service,
            timer: Mutex::new(None),
        }
    }

    /// Starts the daily timer. A no-op if already running.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap();
        if timer.is_some() {
            tracing::info!("Recurring expense scheduler is already running");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let service = self.service.clone();
        let handle = tokio::spawn(async move {
            loop {
                let wait = until_next_midnight(Local::now().naive_local());
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                tracing::info!("Running scheduled recurring expense sweep...");
                match service.process_all_due().await {
                    Ok(report) => tracing::info!(
                        "Scheduled sweep complete: processed={} succeeded={} failed={}",
                        report.processed,
                        report.succeeded,
                        report.failed
                    ),
                    Err(err) => {
                        tracing::error!("Scheduled recurring expense sweep failed: {:#?}", err)
                    }
                }

                // Checked after the sweep so stop() never interrupts one
                // that is already in flight.
                if *stop_rx.borrow() {
                    break;
                }
            }
        });

        *timer = Some(RunningTimer {
            handle,
            stop: stop_tx,
        });
        tracing::info!("Recurring expense scheduler started - will run daily at midnight");
    }

    /// Stops the timer. A no-op if not running; an in-flight sweep finishes.
    pub fn stop(&self) {
        match self.timer.lock().unwrap().take() {
            Some(timer) => {
                let _ = timer.stop.send(true);
                tracing::info!("Recurring expense scheduler stopped");
            }
            None => tracing::info!("Recurring expense scheduler is not running"),
        }
    }

    /// Stops the timer and waits for its task to exit, so an in-flight sweep
    /// runs to completion before the caller proceeds. Used on process
    /// shutdown; a no-op if not running.
    pub async fn shutdown(&self) {
        let timer = self.timer.lock().unwrap().take();
        if let Some(timer) = timer {
            let _ = timer.stop.send(true);
            if let Err(err) = timer.handle.await {
                tracing::error!("Scheduler timer task ended abnormally: {:#?}", err);
            }
            tracing::info!("Recurring expense scheduler stopped");
        }
    }

    /// Runs the sweep immediately, outside the timer schedule. Unlike the
    /// timer path this propagates errors to the caller.
    pub async fn trigger_manually(&self) -> Result<SweepReport, AppError> {
        tracing::info!("Manually triggering recurring expense sweep");
        self.service.process_all_due().await
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            is_running: self.timer.lock().unwrap().is_some(),
            schedule: String::from(SCHEDULE_DESCRIPTION),
        }
    }
}

fn until_next_midnight(now: NaiveDateTime) -> Duration {
    now.date()
        .checked_add_days(Days::new(1))
        .and_then(|next_day| next_day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| (midnight - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}
