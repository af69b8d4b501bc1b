use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::domain::{Expense, Frequency, NewExpense, PaymentMethod, RecurringTemplate};
use crate::error::AppError;
use crate::store::{ExpenseSink, TemplateStore};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

/// Idempotent schema bootstrap, run once at startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS recurring_expenses (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                amount NUMERIC(12, 2) NOT NULL,
                description TEXT NOT NULL,
                category_id UUID,
                tags UUID[] NOT NULL DEFAULT '{}',
                payment_method TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                frequency TEXT NOT NULL,
                interval_count INT NOT NULL,
                day_of_month INT,
                day_of_week INT,
                start_date DATE NOT NULL,
                end_date DATE,
                next_occurrence DATE NOT NULL,
                last_generated DATE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "
            CREATE INDEX IF NOT EXISTS idx_recurring_expenses_due
                ON recurring_expenses (next_occurrence)
                WHERE is_active
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS expenses (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                amount NUMERIC(12, 2) NOT NULL,
                description TEXT NOT NULL,
                date DATE NOT NULL,
                category_id UUID,
                tags UUID[] NOT NULL DEFAULT '{}',
                payment_method TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                is_recurring BOOLEAN NOT NULL DEFAULT FALSE,
                recurring_expense_id UUID,
                created_at TIMESTAMPTZ NOT NULL
            )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "
            CREATE INDEX IF NOT EXISTS idx_expenses_recurring_expense_id
                ON expenses (user_id, recurring_expense_id)
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

fn template_from_row(row: &PgRow) -> Result<RecurringTemplate, sqlx::Error> {
    let frequency = Frequency::from_str(row.try_get::<String, _>("frequency")?.as_str())
        .map_err(|err| decode_error("frequency", err))?;
    let payment_method =
        PaymentMethod::from_str(row.try_get::<String, _>("payment_method")?.as_str())
            .map_err(|err| decode_error("payment_method", err))?;

    Ok(RecurringTemplate {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        category_id: row.try_get("category_id")?,
        tags: row.try_get("tags")?,
        payment_method,
        notes: row.try_get("notes")?,
        frequency,
        interval_count: row.try_get("interval_count")?,
        day_of_month: row.try_get("day_of_month")?,
        day_of_week: row.try_get("day_of_week")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        next_occurrence: row.try_get("next_occurrence")?,
        last_generated: row.try_get("last_generated")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn expense_from_row(row: &PgRow) -> Result<Expense, sqlx::Error> {
    let payment_method =
        PaymentMethod::from_str(row.try_get::<String, _>("payment_method")?.as_str())
            .map_err(|err| decode_error("payment_method", err))?;

    Ok(Expense {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        date: row.try_get("date")?,
        category_id: row.try_get("category_id")?,
        tags: row.try_get("tags")?,
        payment_method,
        notes: row.try_get("notes")?,
        is_recurring: row.try_get("is_recurring")?,
        recurring_expense_id: row.try_get("recurring_expense_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Postgres-backed template store.
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn insert(&self, template: &RecurringTemplate) -> Result<(), AppError> {
        sqlx::query(
            "
                INSERT INTO recurring_expenses (
                    id,
                    user_id,
                    amount,
                    description,
                    category_id,
                    tags,
                    payment_method,
                    notes,
                    frequency,
                    interval_count,
                    day_of_month,
                    day_of_week,
                    start_date,
                    end_date,
                    next_occurrence,
                    last_generated,
                    is_active,
                    created_at,
                    updated_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19
                )
            ",
        )
        .bind(template.id)
        .bind(template.user_id)
        .bind(template.amount)
        .bind(&template.description)
        .bind(template.category_id)
        .bind(&template.tags)
        .bind(template.payment_method.as_str())
        .bind(&template.notes)
        .bind(template.frequency.as_str())
        .bind(template.interval_count)
        .bind(template.day_of_month)
        .bind(template.day_of_week)
        .bind(template.start_date)
        .bind(template.end_date)
        .bind(template.next_occurrence)
        .bind(template.last_generated)
        .bind(template.is_active)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<RecurringTemplate>, AppError> {
        let row = sqlx::query(
            "
                SELECT * FROM recurring_expenses
                WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(template_from_row).transpose().map_err(AppError::from)
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError> {
        let rows = sqlx::query(
            "
                SELECT * FROM recurring_expenses
                WHERE user_id = $1
                ORDER BY created_at
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(template_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError> {
        let rows = sqlx::query(
            "
                SELECT * FROM recurring_expenses
                WHERE user_id = $1 AND is_active
                ORDER BY created_at
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(template_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }

    async fn list_due(&self, today: NaiveDate) -> Result<Vec<RecurringTemplate>, AppError> {
        let rows = sqlx::query(
            "
                SELECT * FROM recurring_expenses
                WHERE is_active
                    AND next_occurrence = $1
                    AND (last_generated IS NULL OR last_generated <> $1)
                    AND (end_date IS NULL OR end_date >= $1)
            ",
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(template_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }

    async fn list_upcoming(
        &self,
        user_id: Uuid,
        today: NaiveDate,
        within_days: i64,
    ) -> Result<Vec<RecurringTemplate>, AppError> {
        let horizon = today
            .checked_add_days(chrono::Days::new(within_days.max(0) as u64))
            .unwrap_or(NaiveDate::MAX);
        let rows = sqlx::query(
            "
                SELECT * FROM recurring_expenses
                WHERE user_id = $1
                    AND is_active
                    AND next_occurrence BETWEEN $2 AND $3
                ORDER BY next_occurrence
            ",
        )
        .bind(user_id)
        .bind(today)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(template_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }

    async fn update(&self, template: &RecurringTemplate) -> Result<(), AppError> {
        sqlx::query(
            "
                UPDATE recurring_expenses SET
                    amount = $3,
                    description = $4,
                    category_id = $5,
                    tags = $6,
                    payment_method = $7,
                    notes = $8,
                    frequency = $9,
                    interval_count = $10,
                    day_of_month = $11,
                    day_of_week = $12,
                    start_date = $13,
                    end_date = $14,
                    next_occurrence = $15,
                    last_generated = $16,
                    is_active = $17,
                    updated_at = $18
                WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(template.id)
        .bind(template.user_id)
        .bind(template.amount)
        .bind(&template.description)
        .bind(template.category_id)
        .bind(&template.tags)
        .bind(template.payment_method.as_str())
        .bind(&template.notes)
        .bind(template.frequency.as_str())
        .bind(template.interval_count)
        .bind(template.day_of_month)
        .bind(template.day_of_week)
        .bind(template.start_date)
        .bind(template.end_date)
        .bind(template.next_occurrence)
        .bind(template.last_generated)
        .bind(template.is_active)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "
                DELETE FROM recurring_expenses
                WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Postgres-backed expense sink.
pub struct PgExpenseStore {
    pool: PgPool,
}

impl PgExpenseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExpenseSink for PgExpenseStore {
    async fn create(&self, expense: NewExpense) -> Result<Expense, AppError> {
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
            created_at: chrono::Utc::now(),
        };

        sqlx::query(
            "
                INSERT INTO expenses (
                    id,
                    user_id,
                    amount,
                    description,
                    date,
                    category_id,
                    tags,
                    payment_method,
                    notes,
                    is_recurring,
                    recurring_expense_id,
                    created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(created.id)
        .bind(created.user_id)
        .bind(created.amount)
        .bind(&created.description)
        .bind(created.date)
        .bind(created.category_id)
        .bind(&created.tags)
        .bind(created.payment_method.as_str())
        .bind(&created.notes)
        .bind(created.is_recurring)
        .bind(created.recurring_expense_id)
        .bind(created.created_at)
        .execute(&self.pool)
        .await
        .inspect_err(|err| {
            tracing::error!(
                "Failed to insert generated expense for template {:?}: {}",
                created.recurring_expense_id,
                err
            );
        })?;

        Ok(created)
    }

    async fn list_generated(
        &self,
        user_id: Uuid,
        recurring_expense_id: Uuid,
    ) -> Result<Vec<Expense>, AppError> {
        let rows = sqlx::query(
            "
                SELECT * FROM expenses
                WHERE user_id = $1 AND recurring_expense_id = $2
                ORDER BY date DESC, created_at DESC
            ",
        )
        .bind(user_id)
        .bind(recurring_expense_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(expense_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }
}
