//! Domain collaborator traits.
//!
//! The scheduler decides *when* these run; the implementations (in the
//! Appraise application crates) decide *what* they do. Each method is
//! one unit of domain work the background subsystem can invoke.

use async_trait::async_trait;

use crate::error::Result;

/// Review period lifecycle operations.
#[async_trait]
pub trait ReviewPeriodService: Send + Sync {
    /// Close review periods and extensions whose end date has passed.
    /// Returns how many were closed.
    async fn close_expired_periods(&self) -> Result<u32>;

    /// Close a single review-period request.
    async fn close_request(&self, request_id: i64) -> Result<()>;
}

/// Competency development operations.
#[async_trait]
pub trait CompetencyService: Send + Sync {
    /// Staff whose development plan reached "gap closed" within the
    /// active review window.
    async fn staff_with_closed_gaps(&self) -> Result<Vec<i64>>;

    /// Set up the gap-closure follow-up for one staff member.
    async fn setup_gap_closure(&self, staff_id: i64) -> Result<()>;
}

/// Request SLA operations.
#[async_trait]
pub trait RequestService: Send + Sync {
    /// Requests currently breaching their service-level deadline.
    async fn breached_requests(&self) -> Result<Vec<i64>>;

    /// Reassign a breached request to the assignee's manager and record
    /// the reassignment.
    async fn reassign_to_manager(&self, request_id: i64) -> Result<()>;
}

/// 360-review operations.
#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Kick off a 360 review for one staff member.
    async fn initiate_review360(&self, staff_id: i64) -> Result<()>;
}

/// Work product operations.
#[async_trait]
pub trait WorkProductService: Send + Sync {
    /// Set up work-product tracking for one staff member.
    async fn setup_work_product(&self, staff_id: i64) -> Result<()>;

    /// Evaluate one submitted work product.
    async fn evaluate_work_product(&self, work_product_id: i64) -> Result<()>;
}
