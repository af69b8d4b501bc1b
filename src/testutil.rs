//! In-memory collaborators for engine and scheduler tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{Expense, NewExpense, RecurringTemplate};
use crate::error::AppError;
use crate::store::{Clock, ExpenseSink, TemplateStore};

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Default)]
pub struct MemoryTemplateStore {
    rows: Mutex<Vec<RecurringTemplate>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn insert(&self, template: &RecurringTemplate) -> Result<(), AppError> {
        self.rows.lock().unwrap().push(template.clone());
        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<RecurringTemplate>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id && t.user_id == user_id)
            .cloned())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id && t.is_active)
            .cloned()
            .collect())
    }

    async fn list_due(&self, today: NaiveDate) -> Result<Vec<RecurringTemplate>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_due_on(today))
            .cloned()
            .collect())
    }

    async fn list_upcoming(
        &self,
        user_id: Uuid,
        today: NaiveDate,
        within_days: i64,
    ) -> Result<Vec<RecurringTemplate>, AppError> {
        let horizon = today
            .checked_add_days(Days::new(within_days.max(0) as u64))
            .unwrap_or(NaiveDate::MAX);
        let mut matches: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.is_active
                    && t.next_occurrence >= today
                    && t.next_occurrence <= horizon
            })
            .cloned()
            .collect();
        matches.sort_by_key(|t| t.next_occurrence);
        Ok(matches)
    }

    async fn update(&self, template: &RecurringTemplate) -> Result<(), AppError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|t| t.id == template.id && t.user_id == template.user_id)
        {
            *row = template.clone();
        }
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|t| !(t.id == id && t.user_id == user_id));
        Ok(rows.len() < before)
    }
}

#[derive(Default)]
pub struct MemoryExpenseSink {
    rows: Mutex<Vec<Expense>>,
    failing_templates: Mutex<HashSet<Uuid>>,
}

impl MemoryExpenseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create` fail for expenses generated from the given template,
    /// simulating a sink-side rejection mid-sweep.
    pub fn fail_for(&self, template_id: Uuid) {
        self.failing_templates.lock().unwrap().insert(template_id);
    }

    pub fn created(&self) -> Vec<Expense> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExpenseSink for MemoryExpenseSink {
    async fn create(&self, expense: NewExpense) -> Result<Expense, AppError> {
        if let Some(template_id) = expense.recurring_expense_id {
            if self.failing_templates.lock().unwrap().contains(&template_id) {
                return Err(AppError::Generation {
                    template_id,
                    message: String::from("expense sink rejected the payload"),
                });
            }
        }

        let created = Expense {
            id: Uuid::new_v4(),
            user_id: expense.user_id,
            amount: expense.amount,
            description: expense.description,
            date: expense.date,
            category_id: expense.category_id,
            tags: expense.tags,
            payment_method: expense.payment_method,
            notes: expense.notes,
            is_recurring: expense.is_recurring,
            recurring_expense_id: expense.recurring_expense_id,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn list_generated(
        &self,
        user_id: Uuid,
        recurring_expense_id: Uuid,
    ) -> Result<Vec<Expense>, AppError> {
        let mut matches: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.user_id == user_id && e.recurring_expense_id == Some(recurring_expense_id)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(matches)
    }
}
