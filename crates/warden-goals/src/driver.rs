use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use warden_config::GoalManagerConfig;
use warden_core::Event;

use crate::manager::{DispatchOptions, DispatchOutcome, GoalManager};

/// Runs the tick loop and the dispatch loop side by side until cancelled.
///
/// The loops are independent: a slow tick (model calls during generation)
/// never delays dispatch of an already queued goal, and a long dispatch never
/// delays the next tick.
pub struct GoalDriver {
    manager: Arc<GoalManager>,
    tick_interval: Duration,
    dispatch_interval: Duration,
}

impl GoalDriver {
    pub fn new(manager: Arc<GoalManager>, tick_interval: Duration, dispatch_interval: Duration) -> Self {
        Self {
            manager,
            tick_interval,
            dispatch_interval,
        }
    }

    pub fn from_config(manager: Arc<GoalManager>, config: &GoalManagerConfig) -> Self {
        Self::new(
            manager,
            Duration::from_secs(config.tick_interval_secs.max(1)),
            Duration::from_secs(config.dispatch_interval_secs.max(1)),
        )
    }

    /// Returns once `token` is cancelled and both loops have stopped.
    pub async fn run(self, token: CancellationToken) {
        info!(
            tick_secs = self.tick_interval.as_secs(),
            dispatch_secs = self.dispatch_interval.as_secs(),
            "goal driver started"
        );
        tokio::join!(
            tick_loop(Arc::clone(&self.manager), self.tick_interval, token.clone()),
            dispatch_loop(Arc::clone(&self.manager), self.dispatch_interval, token),
        );
        self.manager.events().publish(Event::Shutdown);
        info!("goal driver stopped");
    }
}

async fn tick_loop(manager: Arc<GoalManager>, interval: Duration, token: CancellationToken) {
    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(ticks, "shutdown signal received, exiting tick loop");
                break;
            },
            _ = tokio::time::sleep(interval) => {
                ticks += 1;
                if let Err(e) = manager.tick_goal_manager(Utc::now()).await {
                    error!(error = %e, "goal manager tick failed");
                }
            },
        }
    }
}

async fn dispatch_loop(manager: Arc<GoalManager>, interval: Duration, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("shutdown signal received, exiting dispatch loop");
                break;
            },
            _ = tokio::time::sleep(interval) => {
                manager.events().publish(Event::Heartbeat { timestamp: Utc::now() });
                match manager.dispatch_top_goal(&DispatchOptions::scheduler()).await {
                    Ok(DispatchOutcome::Idle | DispatchOutcome::Disabled) => {}
                    Ok(outcome) => debug!(
                        outcome = outcome.label(),
                        goal_id = outcome.goal_id().unwrap_or_default(),
                        "scheduled dispatch finished"
                    ),
                    Err(e) => error!(error = %e, "scheduled dispatch failed"),
                }
            },
        }
    }
}
