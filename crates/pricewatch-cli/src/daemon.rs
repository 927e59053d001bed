//! Long-running mode: crawl cycles, dead-letter retries and batch flushes on
//! a timer until a shutdown signal arrives.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::{AppConfig, CatalogStore, NotifyMode};
use pricewatch_notify::Dispatcher;
use pricewatch_scraper::CategoryCrawler;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::cycle::{run_cycle, CycleOptions};

/// Interval of the dead-letter retry pass.
const DEAD_LETTER_RETRY_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub(crate) struct Daemon {
    store: Arc<dyn CatalogStore>,
    crawler: CategoryCrawler,
    dispatcher: Dispatcher,
    options: CycleOptions,
    /// Held while a cycle runs; a tick that finds it taken is skipped.
    cycle_lock: Mutex<()>,
}

impl Daemon {
    pub(crate) fn new(
        store: Arc<dyn CatalogStore>,
        crawler: CategoryCrawler,
        dispatcher: Dispatcher,
        options: CycleOptions,
    ) -> Self {
        Self {
            store,
            crawler,
            dispatcher,
            options,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Runs one cycle unless another is still in progress or shutdown has
    /// begun.
    ///
    /// Returns `false` when the tick was skipped.
    pub(crate) async fn tick(&self) -> bool {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            tracing::warn!("previous crawl cycle still running; skipping this tick");
            return false;
        };
        if self.options.stop_requested() {
            return false;
        }
        if let Err(e) = run_cycle(
            self.store.as_ref(),
            &self.crawler,
            &self.dispatcher,
            &self.options,
        )
        .await
        {
            tracing::error!(error = %e, "crawl cycle failed");
        }
        true
    }

    pub(crate) async fn retry_dead_letters(&self) {
        match self.dispatcher.retry_dead_letters().await {
            Ok(report) if report.attempted > 0 => tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                requeued = report.requeued,
                dropped = report.dropped,
                "dead-letter retry pass finished"
            ),
            Ok(_) => tracing::debug!("dead-letter log is empty"),
            Err(e) => tracing::error!(error = %e, "dead-letter retry pass failed"),
        }
    }

    pub(crate) async fn flush_if_due(&self) {
        let report = self.dispatcher.flush_if_due().await;
        if report.delivered + report.dead_lettered > 0 {
            tracing::info!(
                delivered = report.delivered,
                dead_lettered = report.dead_lettered,
                "timed notification flush"
            );
        }
    }

    /// Stops new categories from starting, waits for the running one to
    /// commit and notify, then flushes whatever is still buffered.
    pub(crate) async fn shutdown(&self) {
        self.options.stop.store(true, Ordering::SeqCst);
        let _cycle = self.cycle_lock.lock().await;

        let report = self.dispatcher.flush().await;
        tracing::info!(
            delivered = report.delivered,
            dead_lettered = report.dead_lettered,
            "flushed pending notifications"
        );
    }
}

/// Runs the daemon until ctrl-c or SIGTERM.
///
/// # Errors
///
/// Returns an error if the scheduler cannot be started.
pub(crate) async fn run_daemon(daemon: Arc<Daemon>, config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        interval_secs = config.crawl_interval_secs,
        notify_mode = %config.notify_mode,
        "daemon starting"
    );

    let mut scheduler = build_scheduler(&daemon, config).await?;

    let initial = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move {
            daemon.tick().await;
        })
    };

    shutdown_signal().await;

    daemon.shutdown().await;
    scheduler.shutdown().await?;
    if let Err(e) = initial.await {
        tracing::warn!(error = %e, "initial crawl cycle task failed");
    }
    tracing::info!("daemon stopped");
    Ok(())
}

async fn build_scheduler(
    daemon: &Arc<Daemon>,
    config: &AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let crawl = {
        let daemon = Arc::clone(daemon);
        Job::new_repeated_async(config.crawl_interval(), move |_uuid, _lock| {
            let daemon = Arc::clone(&daemon);
            Box::pin(async move {
                daemon.tick().await;
            })
        })?
    };
    scheduler.add(crawl).await?;

    let retry = {
        let daemon = Arc::clone(daemon);
        Job::new_repeated_async(DEAD_LETTER_RETRY_INTERVAL, move |_uuid, _lock| {
            let daemon = Arc::clone(&daemon);
            Box::pin(async move {
                daemon.retry_dead_letters().await;
            })
        })?
    };
    scheduler.add(retry).await?;

    if config.notify_mode == NotifyMode::Batched {
        let flush_every = Duration::from_secs(config.notify_flush_interval_secs.max(1));
        let daemon = Arc::clone(daemon);
        let flush = Job::new_repeated_async(flush_every, move |_uuid, _lock| {
            let daemon = Arc::clone(&daemon);
            Box::pin(async move {
                daemon.flush_if_due().await;
            })
        })?;
        scheduler.add(flush).await?;
    }

    scheduler.start().await?;
    tracing::info!(
        crawl_interval_secs = config.crawl_interval_secs,
        "scheduler: registered crawl and dead-letter jobs"
    );
    Ok(scheduler)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}

#[cfg(test)]
#[path = "daemon_test.rs"]
mod tests;
