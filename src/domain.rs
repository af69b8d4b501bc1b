use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DESCRIPTION_MAX: usize = 500;
pub const NOTES_MAX: usize = 1000;
pub const INTERVAL_MIN: i32 = 1;
pub const INTERVAL_MAX: i32 = 365;

/// 999,999,999.99 — the largest amount accepted for a single expense.
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999, 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(format!("unknown frequency '{}'", other)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Credit,
    Debit,
    Online,
    Check,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Debit => "debit",
            PaymentMethod::Online => "online",
            PaymentMethod::Check => "check",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cash" => Ok(PaymentMethod::Cash),
            "credit" => Ok(PaymentMethod::Credit),
            "debit" => Ok(PaymentMethod::Debit),
            "online" => Ok(PaymentMethod::Online),
            "check" => Ok(PaymentMethod::Check),
            "other" => Ok(PaymentMethod::Other),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// A recurring expense template: the payload copied into each generated
/// expense plus the recurrence rule that decides when generation fires.
#[derive(Debug, Clone, Serialize)]
pub struct RecurringTemplate {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub tags: Vec<Uuid>,
    pub payment_method: PaymentMethod,
    pub notes: String,
    pub frequency: Frequency,
    pub interval_count: i32,
    pub day_of_month: Option<i32>,
    pub day_of_week: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_occurrence: NaiveDate,
    pub last_generated: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringTemplate {
    /// Collects every violated constraint rather than failing on the first,
    /// so a caller gets the full list back in one response.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.amount <= Decimal::ZERO {
            errors.push(String::from("Amount must be a positive number"));
        } else if self.amount > max_amount() {
            errors.push(String::from("Amount is too large"));
        }

        if self.description.trim().is_empty() {
            errors.push(String::from("Description is required"));
        } else if self.description.chars().count() > DESCRIPTION_MAX {
            errors.push(String::from("Description must not exceed 500 characters"));
        }

        if self.notes.chars().count() > NOTES_MAX {
            errors.push(String::from("Notes must not exceed 1000 characters"));
        }

        if self.interval_count < INTERVAL_MIN || self.interval_count > INTERVAL_MAX {
            errors.push(String::from("Interval count must be between 1 and 365"));
        }

        if let Some(day) = self.day_of_month {
            if !(1..=31).contains(&day) {
                errors.push(String::from("Day of month must be between 1 and 31"));
            }
        }

        if let Some(day) = self.day_of_week {
            if !(0..=6).contains(&day) {
                errors.push(String::from(
                    "Day of week must be between 0 (Sunday) and 6 (Saturday)",
                ));
            }
        }

        if let Some(end_date) = self.end_date {
            if end_date <= self.start_date {
                errors.push(String::from("End date must be after start date"));
            }
        }

        errors
    }

    /// The due predicate: active, scheduled for `today`, not yet generated
    /// today, and not past the end date.
    pub fn is_due_on(&self, today: NaiveDate) -> bool {
        if !self.is_active {
            return false;
        }
        if self.next_occurrence != today {
            return false;
        }
        if self.last_generated == Some(today) {
            return false;
        }
        if let Some(end_date) = self.end_date {
            if end_date < today {
                return false;
            }
        }
        true
    }
}

/// Creation payload for a recurring template.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub amount: Decimal,
    pub description: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: String,
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval_count: i32,
    #[serde(default)]
    pub day_of_month: Option<i32>,
    #[serde(default)]
    pub day_of_week: Option<i32>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_interval() -> i32 {
    1
}

/// Partial update for a recurring template. A missing field leaves the stored
/// value untouched; nullable fields use a double `Option` so an explicit JSON
/// `null` clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatePatch {
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub tags: Option<Vec<Uuid>>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    pub frequency: Option<Frequency>,
    pub interval_count: Option<i32>,
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub day_of_month: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub day_of_week: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<NaiveDate>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A concrete expense record, as produced by generation.
#[derive(Debug, Clone, Serialize)]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub category_id: Option<Uuid>,
    pub tags: Vec<Uuid>,
    pub payment_method: PaymentMethod,
    pub notes: String,
    pub is_recurring: bool,
    pub recurring_expense_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Creation payload handed to the expense sink.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub category_id: Option<Uuid>,
    pub tags: Vec<Uuid>,
    pub payment_method: PaymentMethod,
    pub notes: String,
    pub is_recurring: bool,
    pub recurring_expense_id: Option<Uuid>,
}

/// Aggregate result of one bulk sweep over the due templates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub errors: Vec<SweepError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepError {
    pub template_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub schedule: String,
}
