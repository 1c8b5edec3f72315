//! Waiting for a job to finish processing.

use super::job::Job;
use super::types::{Info, State};
use super::Error;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Polling schedule for [`Job::wait_with`].
///
/// The first poll happens after `initial_interval`; each following interval
/// is the previous one times `multiplier`, capped at `max_interval`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(10 * 60),
            multiplier: 2.0,
        }
    }
}

impl WaitConfig {
    /// A fixed schedule that polls every `interval`.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
        }
    }
}

/// Growing poll intervals. A fresh schedule is created for every wait.
#[derive(Debug)]
struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    fn new(config: WaitConfig) -> Self {
        let max = config.max_interval.max(config.initial_interval);
        Self {
            next: config.initial_interval,
            max,
            multiplier: config.multiplier.max(1.0),
        }
    }

    fn next_interval(&mut self) -> Duration {
        let current = self.next;
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        current
    }
}

impl Job {
    /// Polls the job until the server finishes processing it, using the
    /// default [`WaitConfig`].
    ///
    /// See [`Job::wait_with`].
    pub async fn wait(&self, cancel: CancellationToken) -> Result<Info, Error> {
        self.wait_with(WaitConfig::default(), cancel).await
    }

    /// Polls the job on a backoff schedule until it reaches a terminal state.
    ///
    /// Returns the final snapshot once the job is `JobComplete`. A job that
    /// ends `Failed` or `Aborted` yields [`Error::JobTerminated`] carrying that
    /// snapshot, and a failed status request ends the wait with its error.
    ///
    /// Cancelling `cancel` returns [`Error::Cancelled`] immediately and sends
    /// exactly one abort request for the job in the background; an abort
    /// failure is only logged. Dropping the returned future has the same
    /// effect as cancelling. An outcome the poller already produced wins
    /// over a later cancellation.
    ///
    /// Bulk 1.0 jobs never report `JobComplete` and yield [`Error::Usage`]
    /// without sending a request.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use salesforce_bulk::bulkapi::{Job, WaitConfig};
    /// # use std::time::Duration;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example(job: Job) -> Result<(), Box<dyn std::error::Error>> {
    /// let cancel = CancellationToken::new();
    /// let config = WaitConfig {
    ///     initial_interval: Duration::from_secs(5),
    ///     ..WaitConfig::default()
    /// };
    /// let info = job.wait_with(config, cancel.clone()).await?;
    /// println!("{} records failed", info.number_records_failed);
    /// # Ok(())
    /// # }
    /// ```
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn wait_with(
        &self,
        config: WaitConfig,
        cancel: CancellationToken,
    ) -> Result<Info, Error> {
        if !self.endpoint().supports_wait() {
            return Err(Error::Usage {
                reason: "classic jobs cannot be waited on; poll their batches instead".to_string(),
            });
        }

        let token = cancel.child_token();
        let _abort_on_drop = token.clone().drop_guard();
        let (tx, mut rx) = oneshot::channel();
        tokio::spawn(self.clone().poll_until_done(config, token, tx));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => match rx.try_recv() {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::info!(job_id = %self.id(), "wait cancelled, aborting bulk job");
                    Err(Error::Cancelled)
                }
            },
            outcome = &mut rx => outcome.unwrap_or(Err(Error::WaitInterrupted)),
        }
    }

    async fn poll_until_done(
        self,
        config: WaitConfig,
        token: CancellationToken,
        tx: oneshot::Sender<Result<Info, Error>>,
    ) {
        let mut backoff = Backoff::new(config);
        loop {
            let interval = backoff.next_interval();
            tokio::select! {
                _ = token.cancelled() => return self.abort_after_cancel().await,
                _ = tokio::time::sleep(interval) => {}
            }

            let info = tokio::select! {
                _ = token.cancelled() => return self.abort_after_cancel().await,
                info = self.info() => info,
            };

            if let Ok(info) = &info {
                if info.state.is_terminal() {
                    tracing::info!(job_id = %self.id(), state = %info.state, "bulk job finished processing");
                }
            }
            let outcome = match info {
                Err(err) => Err(err),
                Ok(info) => match info.state {
                    State::JobComplete => Ok(info),
                    State::Failed | State::Aborted => Err(Error::JobTerminated {
                        info: Box::new(info),
                    }),
                    state => {
                        tracing::debug!(job_id = %self.id(), %state, next_poll = ?backoff.next, "bulk job still processing");
                        continue;
                    }
                },
            };

            if let Err(err) = &outcome {
                tracing::debug!(job_id = %self.id(), error = %err, "wait for bulk job ended");
            }
            // A closed receiver means the wait already returned as cancelled.
            if tx.send(outcome).is_err() {
                self.abort_after_cancel().await;
            }
            return;
        }
    }

    async fn abort_after_cancel(&self) {
        if let Err(err) = self.abort().await {
            tracing::warn!(job_id = %self.id(), error = %err, "failed to abort bulk job after cancellation");
        }
    }
}
