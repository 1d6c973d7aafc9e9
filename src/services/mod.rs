//! Business logic services

pub mod clock;
pub mod copies;
pub mod eligibility;
pub mod fines;
pub mod loans;
pub mod notifier;
pub mod reports;
pub mod reservations;
pub mod retry;
pub mod sweeper;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{config::CirculationConfig, error::AppResult, repository::Repository};

use self::{
    clock::Clock, eligibility::EligibilityPolicy, fines::FineCalculator, notifier::Notifier,
};

/// Rules and collaborators shared by every circulation service
#[derive(Clone)]
pub struct ServiceContext {
    pub repository: Arc<dyn Repository>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub rules: CirculationConfig,
    pub fines: FineCalculator,
    pub eligibility: EligibilityPolicy,
}

impl ServiceContext {
    pub fn new(
        repository: Arc<dyn Repository>,
        rules: CirculationConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fines: FineCalculator::new(rules.fine_per_day),
            eligibility: EligibilityPolicy::new(rules.max_active_loans),
            repository,
            clock,
            notifier,
            rules,
        }
    }

    /// Retry a transactional operation according to the configured bounds
    pub(crate) async fn retry<T, F, Fut>(&self, operation: &str, attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        retry::with_retry(
            operation,
            self.rules.max_retries,
            Duration::from_millis(self.rules.retry_backoff_ms),
            attempt,
        )
        .await
    }
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
    pub copies: copies::CopiesService,
    pub reports: reports::ReportsService,
}

impl Services {
    /// Create all services over the given repository
    pub fn new(
        repository: Arc<dyn Repository>,
        rules: CirculationConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let context = ServiceContext::new(repository, rules, clock, notifier);
        Self {
            loans: loans::LoansService::new(context.clone()),
            reservations: reservations::ReservationsService::new(context.clone()),
            copies: copies::CopiesService::new(context.clone()),
            reports: reports::ReportsService::new(context),
        }
    }
}
