//! Periodic schedule dispatch. Every tick finds active schedules whose
//! next_run_at has passed and runs each one synchronously through the task
//! manager, so a schedule never overlaps itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use newsdesk_common::{Result, ScheduleStatus};
use newsdesk_store::{Schedule, Store};

use crate::manager::TaskManager;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub check_interval_secs: u64,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

pub struct SchedulerService {
    store: Store,
    manager: Arc<TaskManager>,
    check_interval: Duration,
    running: AtomicBool,
    ticks: AtomicU64,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
}

impl SchedulerService {
    pub fn new(store: Store, manager: Arc<TaskManager>, check_interval: Duration) -> Self {
        Self {
            store,
            manager,
            check_interval,
            running: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            last_tick_at: RwLock::new(None),
        }
    }

    /// Tick loop. Runs until `stop` is called; tick failures are logged and
    /// the loop continues.
    pub async fn run(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }
        info!(interval_secs = self.check_interval.as_secs(), "scheduler started");

        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "scheduler tick failed");
            }
        }
        info!("scheduler stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            check_interval_secs: self.check_interval.as_secs(),
            ticks: self.ticks.load(Ordering::SeqCst),
            last_tick_at: *self.last_tick_at.read().await,
        }
    }

    /// One pass over due schedules. Dispatch is serial; one schedule's
    /// failure is recorded on that schedule and the pass continues.
    pub async fn tick(&self) -> Result<usize> {
        let now = Utc::now();
        self.ticks.fetch_add(1, Ordering::SeqCst);
        *self.last_tick_at.write().await = Some(now);

        let due = self.store.schedules.due(now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        info!(count = due.len(), "due schedules found");

        let mut dispatched = 0usize;
        for schedule in due {
            match self.dispatch(&schedule).await {
                Ok(()) => dispatched += 1,
                Err(e) => {
                    error!(schedule_id = schedule.id, name = %schedule.name, error = %e,
                        "schedule dispatch failed");
                }
            }
        }
        Ok(dispatched)
    }

    /// Run one schedule immediately, outside the tick cycle.
    pub async fn execute_now(&self, schedule_id: i64) -> Result<()> {
        let schedule = self
            .store
            .schedules
            .get(schedule_id)
            .await?
            .ok_or_else(|| newsdesk_common::NewsdeskError::NotFound(format!(
                "schedule {schedule_id}"
            )))?;
        self.dispatch(&schedule).await
    }

    /// Run one schedule now: create the task, execute it synchronously, and
    /// record the outcome plus the next run time.
    async fn dispatch(&self, schedule: &Schedule) -> Result<()> {
        let task_type = format!("schedule_{}", schedule.schedule_type);
        let mut params = schedule
            .config
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        if let serde_json::Value::Object(map) = &mut params {
            map.insert("schedule_id".to_string(), serde_json::json!(schedule.id));
        }

        let task = self
            .manager
            .create(
                &task_type,
                &format!("Scheduled run: {}", schedule.name),
                Some(params),
            )
            .await?;

        let outcome = self.manager.run(task.id).await;
        let now = Utc::now();
        let (status, error) = match &outcome {
            Ok(()) => ("success", None),
            Err(e) => ("failed", Some(e.to_string())),
        };

        self.store
            .schedules
            .record_run(schedule.id, now, schedule.interval_minutes, status, error.as_deref())
            .await?;

        if reached_execution_cap(schedule.max_executions, schedule.execution_count + 1) {
            info!(schedule_id = schedule.id, "execution cap reached, disabling schedule");
            self.store
                .schedules
                .set_status(schedule.id, ScheduleStatus::Disabled)
                .await?;
        }

        info!(
            schedule_id = schedule.id,
            name = %schedule.name,
            task_id = task.id,
            status,
            "schedule run recorded"
        );
        Ok(())
    }
}

/// A schedule is eligible only while active with a due next_run_at.
pub fn is_due(status: &str, next_run_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    status == "active" && next_run_at.map(|t| t <= now).unwrap_or(false)
}

/// Next run is interval minutes after the dispatching tick.
pub fn next_run_after(now: DateTime<Utc>, interval_minutes: i32) -> DateTime<Utc> {
    now + chrono::Duration::minutes(interval_minutes as i64)
}

fn reached_execution_cap(max_executions: Option<i32>, execution_count: i32) -> bool {
    max_executions.map(|max| execution_count >= max).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn due_requires_active_status_and_past_next_run() {
        let now = Utc::now();
        let past = Some(now - Duration::minutes(1));
        let future = Some(now + Duration::minutes(1));

        assert!(is_due("active", past, now));
        assert!(is_due("active", Some(now), now));
        assert!(!is_due("active", future, now));
        assert!(!is_due("paused", past, now));
        assert!(!is_due("disabled", past, now));
        assert!(!is_due("active", None, now));
    }

    #[test]
    fn next_run_advances_by_interval() {
        let now = Utc::now();
        let next = next_run_after(now, 60);
        assert_eq!(next - now, Duration::minutes(60));
    }

    #[test]
    fn execution_cap() {
        assert!(!reached_execution_cap(None, 100));
        assert!(!reached_execution_cap(Some(5), 4));
        assert!(reached_execution_cap(Some(5), 5));
        assert!(reached_execution_cap(Some(5), 6));
    }
}
