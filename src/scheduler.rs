use crate::dispatch::{
    BatchReport,
    DispatchError,
    Dispatcher,
};
use agent_metrics_backend::MetricsSink;
use agent_metrics_token::TokenSource;
use std::time::Duration;
use tokio::time::{
    sleep,
    Instant,
};
use tokio_util::sync::CancellationToken;

/// Poll bookkeeping of a long-lived process that is invoked from the outside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerState {
    pub last_poll_time: Option<Instant>,
    pub next_allowed_poll_time: Option<Instant>,
}

impl SchedulerState {
    /// Time left before polling is allowed again, if any.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next_allowed_poll_time
            .filter(|next| *next > now)
            .map(|next| next - now)
    }

    /// Records a completed batch.
    pub fn record(&mut self, now: Instant, poll_duration: Duration) {
        self.last_poll_time = Some(now);
        self.next_allowed_poll_time = Some(now + poll_duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Ran(BatchReport),
    /// Invoked before the advised poll duration elapsed. Nothing was polled.
    Skipped { remaining: Duration },
}

/// Time to wait before the next batch.
pub fn next_wait(interval: Duration, poll_duration: Duration) -> Duration {
    interval.max(poll_duration)
}

/// Runs a batch unless the previous one advised waiting longer.
///
/// `state` is updated once every token went through the batch, even if all of them failed. An
/// aborted batch leaves it alone.
pub async fn invoke(
    state: &mut SchedulerState,
    dispatcher: &Dispatcher,
    tokens: &TokenSource,
    sink: &mut dyn MetricsSink,
) -> Result<Invocation, DispatchError> {
    if let Some(remaining) = state.remaining(Instant::now()) {
        info!("Skipping polling, next poll time is in {remaining:?}");
        return Ok(Invocation::Skipped { remaining });
    }

    match dispatcher.dispatch(tokens, sink).await {
        Ok(report) => {
            state.record(Instant::now(), report.poll_duration);
            if !report.poll_duration.is_zero() {
                info!("Next poll allowed in {:?}", report.poll_duration);
            }
            Ok(Invocation::Ran(report))
        }
        Err(DispatchError::AllTokensFailed(report)) => {
            state.record(Instant::now(), report.poll_duration);
            Err(DispatchError::AllTokensFailed(report))
        }
        Err(err) => Err(err),
    }
}

/// Polls every `interval`, or longer when the API advises it, until cancelled.
///
/// Failed batches are logged and retried on the next tick, except for an unauthorized token which
/// ends the loop with that error.
pub async fn run_loop(
    interval: Duration,
    dispatcher: &Dispatcher,
    tokens: &TokenSource,
    sink: &mut dyn MetricsSink,
    cancel: CancellationToken,
) -> Result<(), DispatchError> {
    loop {
        let wait = match dispatcher.dispatch(tokens, sink).await {
            Ok(report) => next_wait(interval, report.poll_duration),
            Err(err) if err.is_unauthorized() => {
                error!("{err}, stopping");
                return Err(err);
            }
            Err(err) => {
                error!("{err}");
                interval
            }
        };

        if wait > interval {
            info!("Increased poll duration to {wait:?} as advised by the API");
        }
        debug!("Waiting for {wait:?}");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Polling cancelled");
                return Ok(());
            }
            _ = sleep(wait) => {}
        }
    }
}
