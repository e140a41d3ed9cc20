//! Periodic task runner — cron-style triggering with per-task
//! skip-if-running enforcement.
//!
//! Each registration carries its own overlap gate: when a tick arrives
//! while the previous invocation of the same task is still executing,
//! the tick is skipped outright (not queued, not delayed). Different
//! tasks never block each other.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::cron;

type TaskBody = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct PeriodicTask {
    name: String,
    expression: String,
    next_run: Option<DateTime<Utc>>,
    /// Held for the duration of one invocation; `try_lock` failing on
    /// the next tick is how an overlap is detected.
    gate: Arc<tokio::sync::Mutex<()>>,
    body: TaskBody,
}

/// Registers `(cron, task)` pairs and fires them on its own clock.
///
/// The runner owns *when* and *at-most-one-concurrently*; the bodies
/// own everything else (feature flag checks, domain calls, fan-out).
#[derive(Default)]
pub struct PeriodicRunner {
    tasks: Vec<PeriodicTask>,
}

impl PeriodicRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under a cron expression. Invalid expressions are
    /// logged at registration and the task simply never fires.
    pub fn register<F>(&mut self, name: impl Into<String>, expression: &str, body: F)
    where
        F: Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        let name = name.into();
        if cron::CronSchedule::parse(expression).is_none() {
            tracing::warn!(
                "Invalid cron expression '{}' for task '{}'; task will never fire",
                expression,
                name
            );
        }
        tracing::info!("📅 Periodic task registered: '{}' ({})", name, expression);
        self.tasks.push(PeriodicTask {
            name,
            expression: expression.to_string(),
            next_run: None,
            gate: Arc::new(tokio::sync::Mutex::new(())),
            body: Arc::new(body),
        });
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Fire every task that is due at `now`. Returns (fired, skipped).
    ///
    /// A fired task runs as its own spawned task so a slow body never
    /// delays sibling registrations or the tick clock.
    fn run_due(&mut self, now: DateTime<Utc>) -> (usize, usize) {
        let mut fired = 0;
        let mut skipped = 0;
        for task in &mut self.tasks {
            let due = task.next_run.is_some_and(|next| now >= next);
            if !due {
                continue;
            }
            task.next_run = cron::next_run_from_cron(&task.expression, now);

            match Arc::clone(&task.gate).try_lock_owned() {
                Ok(guard) => {
                    tracing::info!("🔔 Periodic task '{}' fired", task.name);
                    let body = (task.body)();
                    tokio::spawn(async move {
                        body.await;
                        drop(guard);
                    });
                    fired += 1;
                }
                Err(_) => {
                    tracing::warn!(
                        "⏭️ Periodic task '{}' still running; tick skipped",
                        task.name
                    );
                    skipped += 1;
                }
            }
        }
        (fired, skipped)
    }

    /// Main loop: check for due tasks every `check_interval` until the
    /// shutdown signal flips, then wait for any in-flight invocation to
    /// finish before returning.
    pub async fn run(mut self, check_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let now = Utc::now();
        for task in &mut self.tasks {
            task.next_run = cron::next_run_from_cron(&task.expression, now);
        }
        tracing::info!(
            "⏰ Periodic runner started ({} tasks, check every {:?})",
            self.tasks.len(),
            check_interval
        );

        let mut interval = tokio::time::interval(check_interval);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender can never signal again; treat it
                    // as a stop request.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.run_due(Utc::now());
                }
            }
        }

        // Drain: acquiring each gate means its invocation has returned.
        for task in &self.tasks {
            let _guard = task.gate.lock().await;
        }
        tracing::info!("⏰ Periodic runner stopped");
    }

    #[cfg(test)]
    fn force_due(&mut self, name: &str) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.name == name) {
            task.next_run = Some(Utc::now() - chrono::Duration::seconds(1));
        }
    }
}
