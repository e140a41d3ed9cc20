//! Scheduler — owns and wires the worker pool, the periodic runner,
//! and the mail drainer, and exposes the ad-hoc dispatch surface used
//! by the rest of the system.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use appraise_core::config::{AppraiseConfig, MailConfig};
use appraise_core::flags::FeatureFlags;
use appraise_core::outbox::OutboxStore;
use appraise_core::services::{
    CompetencyService, RequestService, ReviewPeriodService, ReviewService, WorkProductService,
};

use crate::mailer::{MailDrainer, MailTransport};
use crate::periodic::PeriodicRunner;
use crate::pool::{Job, WorkerPool};
use crate::tasks;

/// Everything the scheduler needs injected. The outbox store and mail
/// transport are optional — without them the delivery drainer simply
/// is not started.
pub struct SchedulerDeps {
    pub flags: Arc<dyn FeatureFlags>,
    pub review_periods: Arc<dyn ReviewPeriodService>,
    pub competencies: Arc<dyn CompetencyService>,
    pub requests: Arc<dyn RequestService>,
    pub reviews: Arc<dyn ReviewService>,
    pub work_products: Arc<dyn WorkProductService>,
    pub outbox: Option<Arc<dyn OutboxStore>>,
    pub transport: Option<Arc<dyn MailTransport>>,
}

/// Top-level orchestrator with a `start`/`stop` lifecycle and typed
/// dispatch helpers for callers that want named jobs without building
/// [`Job`] literals by hand.
pub struct Scheduler {
    pool: Arc<WorkerPool>,
    review_periods: Arc<dyn ReviewPeriodService>,
    competencies: Arc<dyn CompetencyService>,
    requests: Arc<dyn RequestService>,
    reviews: Arc<dyn ReviewService>,
    work_products: Arc<dyn WorkProductService>,
    outbox: Option<Arc<dyn OutboxStore>>,
    transport: Option<Arc<dyn MailTransport>>,
    mail_config: MailConfig,
    check_interval: Duration,
    runner: std::sync::Mutex<Option<PeriodicRunner>>,
    runner_stop: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
    runner_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    drainer_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: &AppraiseConfig, deps: SchedulerDeps) -> Self {
        let pool = Arc::new(WorkerPool::new(
            config.scheduler.workers,
            config.scheduler.queue_capacity,
        ));

        let mut runner = PeriodicRunner::new();
        let cron = &config.scheduler.cron;
        runner.register(
            "review-period-closure",
            cron,
            tasks::review_period_closure(
                Arc::clone(&deps.flags),
                Arc::clone(&deps.review_periods),
            ),
        );
        runner.register(
            "competency-gap-closure",
            cron,
            tasks::competency_gap_closure(
                Arc::clone(&deps.flags),
                Arc::clone(&deps.competencies),
                Arc::clone(&pool),
            ),
        );
        runner.register(
            "auto-reassign",
            cron,
            tasks::auto_reassign(
                Arc::clone(&deps.flags),
                Arc::clone(&deps.requests),
                Arc::clone(&pool),
            ),
        );

        let (runner_stop, _) = watch::channel(false);
        let (cancel, _) = watch::channel(false);
        Self {
            pool,
            review_periods: deps.review_periods,
            competencies: deps.competencies,
            requests: deps.requests,
            reviews: deps.reviews,
            work_products: deps.work_products,
            outbox: deps.outbox,
            transport: deps.transport,
            mail_config: config.mail.clone(),
            check_interval: Duration::from_secs(config.scheduler.check_interval_secs.max(1)),
            runner: std::sync::Mutex::new(Some(runner)),
            runner_stop,
            cancel,
            runner_handle: std::sync::Mutex::new(None),
            drainer_handle: std::sync::Mutex::new(None),
        }
    }

    /// Start the pool, the periodic runner, and — when an outbox is
    /// configured — the mail drainer.
    pub fn start(&self) {
        self.pool.start();

        if let Some(runner) = self.runner.lock().expect("runner lock").take() {
            let rx = self.runner_stop.subscribe();
            let check_interval = self.check_interval;
            *self.runner_handle.lock().expect("runner handle lock") =
                Some(tokio::spawn(runner.run(check_interval, rx)));
        }

        match (&self.outbox, &self.transport) {
            (Some(outbox), Some(transport)) => {
                let drainer =
                    MailDrainer::new(Arc::clone(outbox), Arc::clone(transport), &self.mail_config);
                let rx = self.cancel.subscribe();
                *self.drainer_handle.lock().expect("drainer handle lock") =
                    Some(tokio::spawn(drainer.run(rx)));
            }
            _ => {
                tracing::info!("📭 Mail outbox not configured; delivery drainer not started");
            }
        }
        tracing::info!("🚀 Scheduler started");
    }

    /// Ordered shutdown: stop the periodic runner and wait for any
    /// in-flight invocation, signal the drainer to exit after its
    /// current tick, then drain the worker pool last so jobs enqueued
    /// by periodic tasks still execute.
    pub async fn stop(&self) {
        tracing::info!("🛑 Scheduler stopping");
        let _ = self.runner_stop.send(true);
        if let Some(handle) = self.runner_handle.lock().expect("runner handle lock").take() {
            let _ = handle.await;
        }

        let _ = self.cancel.send(true);
        if let Some(handle) = self
            .drainer_handle
            .lock()
            .expect("drainer handle lock")
            .take()
        {
            let _ = handle.await;
        }

        self.pool.shutdown().await;
        tracing::info!("🛑 Scheduler stopped");
    }

    /// Fire-and-forget submission into the worker pool.
    pub async fn enqueue(&self, job: Job) {
        self.pool.enqueue(job).await;
    }

    // ─── Typed dispatch helpers ──────────────────────────────────

    /// Set up gap-closure follow-up for one staff member.
    pub async fn enqueue_gap_closure(&self, staff_id: i64) {
        let svc = Arc::clone(&self.competencies);
        self.enqueue(Job::new(
            format!("gap-closure-setup-{staff_id}"),
            async move { svc.setup_gap_closure(staff_id).await },
        ))
        .await;
    }

    /// Reassign one SLA-breached request to the assignee's manager.
    pub async fn enqueue_auto_reassign(&self, request_id: i64) {
        let svc = Arc::clone(&self.requests);
        self.enqueue(Job::new(format!("auto-reassign-{request_id}"), async move {
            svc.reassign_to_manager(request_id).await
        }))
        .await;
    }

    /// Kick off a 360 review for one staff member.
    pub async fn enqueue_review360(&self, staff_id: i64) {
        let svc = Arc::clone(&self.reviews);
        self.enqueue(Job::new(format!("review360-init-{staff_id}"), async move {
            svc.initiate_review360(staff_id).await
        }))
        .await;
    }

    /// Close one review-period request.
    pub async fn enqueue_request_closure(&self, request_id: i64) {
        let svc = Arc::clone(&self.review_periods);
        self.enqueue(Job::new(
            format!("period-request-closure-{request_id}"),
            async move { svc.close_request(request_id).await },
        ))
        .await;
    }

    /// Set up work-product tracking for one staff member.
    pub async fn enqueue_work_product_setup(&self, staff_id: i64) {
        let svc = Arc::clone(&self.work_products);
        self.enqueue(Job::new(
            format!("work-product-setup-{staff_id}"),
            async move { svc.setup_work_product(staff_id).await },
        ))
        .await;
    }

    /// Evaluate one submitted work product.
    pub async fn enqueue_work_product_evaluation(&self, work_product_id: i64) {
        let svc = Arc::clone(&self.work_products);
        self.enqueue(Job::new(
            format!("work-product-evaluation-{work_product_id}"),
            async move { svc.evaluate_work_product(work_product_id).await },
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::EmailMessage;
    use crate::persistence::SchedulerDb;
    use appraise_core::Result;
    use appraise_core::flags::StaticFlags;
    use appraise_core::outbox::NewOutboxEmail;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingServices {
        period_requests_closed: AtomicUsize,
        gap_setups: AtomicUsize,
        reassignments: AtomicUsize,
        reviews_initiated: AtomicUsize,
        work_products_setup: AtomicUsize,
        work_products_evaluated: AtomicUsize,
    }

    #[async_trait]
    impl ReviewPeriodService for CountingServices {
        async fn close_expired_periods(&self) -> Result<u32> {
            Ok(0)
        }
        async fn close_request(&self, _request_id: i64) -> Result<()> {
            self.period_requests_closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl CompetencyService for CountingServices {
        async fn staff_with_closed_gaps(&self) -> Result<Vec<i64>> {
            Ok(Vec::new())
        }
        async fn setup_gap_closure(&self, _staff_id: i64) -> Result<()> {
            self.gap_setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl RequestService for CountingServices {
        async fn breached_requests(&self) -> Result<Vec<i64>> {
            Ok(Vec::new())
        }
        async fn reassign_to_manager(&self, _request_id: i64) -> Result<()> {
            self.reassignments.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl ReviewService for CountingServices {
        async fn initiate_review360(&self, _staff_id: i64) -> Result<()> {
            self.reviews_initiated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl WorkProductService for CountingServices {
        async fn setup_work_product(&self, _staff_id: i64) -> Result<()> {
            self.work_products_setup.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn evaluate_work_product(&self, _work_product_id: i64) -> Result<()> {
            self.work_products_evaluated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, email: &EmailMessage) -> Result<()> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn deps(
        services: Arc<CountingServices>,
        outbox: Option<Arc<dyn appraise_core::outbox::OutboxStore>>,
        transport: Option<Arc<dyn MailTransport>>,
    ) -> SchedulerDeps {
        SchedulerDeps {
            flags: Arc::new(StaticFlags::new()),
            review_periods: Arc::clone(&services) as _,
            competencies: Arc::clone(&services) as _,
            requests: Arc::clone(&services) as _,
            reviews: Arc::clone(&services) as _,
            work_products: services as _,
            outbox,
            transport,
        }
    }

    #[tokio::test]
    async fn test_typed_helpers_run_through_the_pool() {
        let services = Arc::new(CountingServices::default());
        let config = AppraiseConfig::default();
        let scheduler = Scheduler::new(&config, deps(Arc::clone(&services), None, None));
        scheduler.start();

        scheduler.enqueue_gap_closure(1).await;
        scheduler.enqueue_auto_reassign(2).await;
        scheduler.enqueue_review360(3).await;
        scheduler.enqueue_request_closure(4).await;
        scheduler.enqueue_work_product_setup(5).await;
        scheduler.enqueue_work_product_evaluation(6).await;
        scheduler.stop().await;

        assert_eq!(services.gap_setups.load(Ordering::SeqCst), 1);
        assert_eq!(services.reassignments.load(Ordering::SeqCst), 1);
        assert_eq!(services.reviews_initiated.load(Ordering::SeqCst), 1);
        assert_eq!(services.period_requests_closed.load(Ordering::SeqCst), 1);
        assert_eq!(services.work_products_setup.load(Ordering::SeqCst), 1);
        assert_eq!(services.work_products_evaluated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drainer_runs_when_outbox_configured() {
        let services = Arc::new(CountingServices::default());
        let db = Arc::new(SchedulerDb::open_in_memory().unwrap());
        let transport = Arc::new(RecordingTransport::default());

        use appraise_core::outbox::OutboxStore;
        db.insert(&NewOutboxEmail {
            to: "user@test.com".into(),
            subject: "hello".into(),
            body: "world".into(),
            ..NewOutboxEmail::default()
        })
        .await
        .unwrap();

        let mut config = AppraiseConfig::default();
        config.mail.sender_address = "noreply@appraise.test".into();
        config.mail.poll_interval_secs = 1;

        let scheduler = Scheduler::new(
            &config,
            deps(
                services,
                Some(Arc::clone(&db) as _),
                Some(Arc::clone(&transport) as _),
            ),
        );
        scheduler.start();

        // The drainer's first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert!(db.fetch_new(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_outbox_is_not_fatal() {
        let services = Arc::new(CountingServices::default());
        let config = AppraiseConfig::default();
        let scheduler = Scheduler::new(&config, deps(services, None, None));
        scheduler.start();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_is_dropped() {
        let services = Arc::new(CountingServices::default());
        let config = AppraiseConfig::default();
        let scheduler = Scheduler::new(&config, deps(Arc::clone(&services), None, None));
        scheduler.start();
        scheduler.stop().await;

        scheduler.enqueue_gap_closure(1).await;
        assert_eq!(services.gap_setups.load(Ordering::SeqCst), 0);
    }
}
