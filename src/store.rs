use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use uuid::Uuid;

use crate::domain::{Expense, NewExpense, RecurringTemplate};
use crate::error::AppError;

/// Persistence contract for recurring templates. The generation engine only
/// talks to this trait so tests can run against an in-memory implementation.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn insert(&self, template: &RecurringTemplate) -> Result<(), AppError>;

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<RecurringTemplate>, AppError>;

    async fn list(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError>;

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError>;

    /// Templates due for generation on `today`, across all owners: active,
    /// `next_occurrence == today`, not already generated today, and not past
    /// their end date.
    async fn list_due(&self, today: NaiveDate) -> Result<Vec<RecurringTemplate>, AppError>;

    /// Active templates whose next occurrence falls within
    /// `[today, today + within_days]`, ordered by next occurrence ascending.
    async fn list_upcoming(
        &self,
        user_id: Uuid,
        today: NaiveDate,
        within_days: i64,
    ) -> Result<Vec<RecurringTemplate>, AppError>;

    async fn update(&self, template: &RecurringTemplate) -> Result<(), AppError>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;
}

/// Collaborator that persists generated expense records.
#[async_trait]
pub trait ExpenseSink: Send + Sync {
    async fn create(&self, expense: NewExpense) -> Result<Expense, AppError>;

    /// All expenses generated from the given template, newest first.
    async fn list_generated(
        &self,
        user_id: Uuid,
        recurring_expense_id: Uuid,
    ) -> Result<Vec<Expense>, AppError>;
}

/// Injectable source of "today" so tests can pin the calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
