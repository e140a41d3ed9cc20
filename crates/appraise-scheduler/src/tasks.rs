//! The registered periodic task bodies.
//!
//! Each body reads its feature flag first and returns quietly when the
//! flag is off — pausing a background process is a normal operational
//! state, logged at debug level only. The bodies delegate the actual
//! domain work to injected collaborators; fan-out work goes through
//! the worker pool as named jobs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use appraise_core::flags::{
    ENABLE_AUTO_REASSIGN_REQUEST_BACKGROUND_SERVICE,
    ENABLE_COMPETENCY_CLOSURE_BACKGROUND_SERVICE, ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE,
    FeatureFlags,
};
use appraise_core::services::{CompetencyService, RequestService, ReviewPeriodService};

use crate::pool::{Job, WorkerPool};

type BoxedBody = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Closes review periods and extensions whose end date has passed.
/// The write happens synchronously inside the tick — no fan-out.
pub fn review_period_closure(
    flags: Arc<dyn FeatureFlags>,
    periods: Arc<dyn ReviewPeriodService>,
) -> impl Fn() -> BoxedBody + Send + Sync {
    move || {
        let flags = Arc::clone(&flags);
        let periods = Arc::clone(&periods);
        Box::pin(async move {
            if !flags.is_enabled(ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE).await {
                tracing::debug!("Review period closure disabled; skipping tick");
                return;
            }
            match periods.close_expired_periods().await {
                Ok(0) => tracing::debug!("No expired review periods to close"),
                Ok(n) => tracing::info!("📅 Closed {n} expired review period(s)"),
                Err(e) => tracing::error!("❌ Review period closure failed: {e}"),
            }
        })
    }
}

/// Finds staff whose development plan reached "gap closed" within the
/// active review window and enqueues one job per staff member.
pub fn competency_gap_closure(
    flags: Arc<dyn FeatureFlags>,
    competencies: Arc<dyn CompetencyService>,
    pool: Arc<WorkerPool>,
) -> impl Fn() -> BoxedBody + Send + Sync {
    move || {
        let flags = Arc::clone(&flags);
        let competencies = Arc::clone(&competencies);
        let pool = Arc::clone(&pool);
        Box::pin(async move {
            if !flags
                .is_enabled(ENABLE_COMPETENCY_CLOSURE_BACKGROUND_SERVICE)
                .await
            {
                tracing::debug!("Competency gap closure disabled; skipping tick");
                return;
            }
            let staff = match competencies.staff_with_closed_gaps().await {
                Ok(staff) => staff,
                Err(e) => {
                    tracing::error!("❌ Competency gap lookup failed: {e}");
                    return;
                }
            };
            if !staff.is_empty() {
                tracing::info!("🎯 Dispatching gap-closure setup for {} staff", staff.len());
            }
            for staff_id in staff {
                let svc = Arc::clone(&competencies);
                pool.enqueue(Job::new(
                    format!("gap-closure-setup-{staff_id}"),
                    async move { svc.setup_gap_closure(staff_id).await },
                ))
                .await;
            }
        })
    }
}

/// Finds requests breaching their service-level deadline and enqueues
/// one reassignment job per request.
pub fn auto_reassign(
    flags: Arc<dyn FeatureFlags>,
    requests: Arc<dyn RequestService>,
    pool: Arc<WorkerPool>,
) -> impl Fn() -> BoxedBody + Send + Sync {
    move || {
        let flags = Arc::clone(&flags);
        let requests = Arc::clone(&requests);
        let pool = Arc::clone(&pool);
        Box::pin(async move {
            if !flags
                .is_enabled(ENABLE_AUTO_REASSIGN_REQUEST_BACKGROUND_SERVICE)
                .await
            {
                tracing::debug!("Auto reassign disabled; skipping tick");
                return;
            }
            let breached = match requests.breached_requests().await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::error!("❌ SLA breach lookup failed: {e}");
                    return;
                }
            };
            if !breached.is_empty() {
                tracing::info!("⏱️ Dispatching reassignment for {} breached request(s)", breached.len());
            }
            for request_id in breached {
                let svc = Arc::clone(&requests);
                pool.enqueue(Job::new(format!("auto-reassign-{request_id}"), async move {
                    svc.reassign_to_manager(request_id).await
                }))
                .await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appraise_core::Result;
    use appraise_core::flags::StaticFlags;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakePeriods {
        closed: AtomicUsize,
    }

    #[async_trait]
    impl ReviewPeriodService for FakePeriods {
        async fn close_expired_periods(&self) -> Result<u32> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        }
        async fn close_request(&self, _request_id: i64) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCompetencies {
        setups: AtomicUsize,
    }

    #[async_trait]
    impl CompetencyService for FakeCompetencies {
        async fn staff_with_closed_gaps(&self) -> Result<Vec<i64>> {
            Ok(vec![11, 22, 33])
        }
        async fn setup_gap_closure(&self, _staff_id: i64) -> Result<()> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRequests {
        reassigned: AtomicUsize,
    }

    #[async_trait]
    impl RequestService for FakeRequests {
        async fn breached_requests(&self) -> Result<Vec<i64>> {
            Ok(vec![7])
        }
        async fn reassign_to_manager(&self, _request_id: i64) -> Result<()> {
            self.reassigned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_flag_off_means_no_domain_call() {
        let periods = Arc::new(FakePeriods::default());
        let flags = Arc::new(
            StaticFlags::new().with(ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE, false),
        );
        let body = review_period_closure(flags, Arc::clone(&periods) as _);
        body().await;
        assert_eq!(periods.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flag_on_runs_domain_call() {
        let periods = Arc::new(FakePeriods::default());
        let flags =
            Arc::new(StaticFlags::new().with(ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE, true));
        let body = review_period_closure(flags, Arc::clone(&periods) as _);
        body().await;
        assert_eq!(periods.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gap_closure_fans_out_one_job_per_staff() {
        let pool = Arc::new(WorkerPool::new(2, 10));
        pool.start();
        let competencies = Arc::new(FakeCompetencies::default());
        let flags = Arc::new(
            StaticFlags::new().with(ENABLE_COMPETENCY_CLOSURE_BACKGROUND_SERVICE, true),
        );

        let body = competency_gap_closure(flags, Arc::clone(&competencies) as _, Arc::clone(&pool));
        body().await;
        pool.shutdown().await;

        assert_eq!(competencies.setups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auto_reassign_fans_out() {
        let pool = Arc::new(WorkerPool::new(1, 10));
        pool.start();
        let requests = Arc::new(FakeRequests::default());
        let flags = Arc::new(
            StaticFlags::new().with(ENABLE_AUTO_REASSIGN_REQUEST_BACKGROUND_SERVICE, true),
        );

        let body = auto_reassign(flags, Arc::clone(&requests) as _, Arc::clone(&pool));
        body().await;
        pool.shutdown().await;

        assert_eq!(requests.reassigned.load(Ordering::SeqCst), 1);
    }
}
