use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    Expense, NewExpense, NewTemplate, RecurringTemplate, SweepError, SweepReport, TemplatePatch,
};
use crate::error::AppError;
use crate::recurrence;
use crate::store::{Clock, ExpenseSink, TemplateStore};

/// Service layer for recurring expenses: template CRUD, pause/resume, manual
/// generation, and the bulk sweep the scheduler drives once a day.
pub struct RecurringExpenseService<S, E, C> {
    templates: S,
    expenses: E,
    clock: C,
}

impl<S, E, C> RecurringExpenseService<S, E, C>
where
    S: TemplateStore,
    E: ExpenseSink,
    C: Clock,
{
    pub fn new(templates: S, expenses: E, clock: C) -> Self {
        Self {
            templates,
            expenses,
            clock,
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        data: NewTemplate,
    ) -> Result<RecurringTemplate, AppError> {
        let now = Utc::now();
        let template = RecurringTemplate {
            id: Uuid::new_v4(),
            user_id,
            amount: data.amount,
            description: data.description.trim().to_string(),
            category_id: data.category_id,
            tags: data.tags,
            payment_method: data.payment_method,
            notes: data.notes,
            frequency: data.frequency,
            interval_count: data.interval_count,
            day_of_month: data.day_of_month,
            day_of_week: data.day_of_week,
            start_date: data.start_date,
            end_date: data.end_date,
            next_occurrence: data.start_date,
            last_generated: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let errors = template.validate();
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        self.templates.insert(&template).await?;
        tracing::info!(
            "Created recurring template id={} user_id={} frequency={}",
            template.id,
            template.user_id,
            template.frequency
        );
        Ok(template)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<RecurringTemplate, AppError> {
        self.templates
            .get(user_id, id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError> {
        self.templates.list(user_id).await
    }

    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<RecurringTemplate>, AppError> {
        self.templates.list_active(user_id).await
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TemplatePatch,
    ) -> Result<RecurringTemplate, AppError> {
        let mut template = self.get(user_id, id).await?;
        apply_patch(&mut template, patch);

        let errors = template.validate();
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        template.updated_at = Utc::now();
        self.templates.update(&template).await?;
        Ok(template)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        if !self.templates.delete(user_id, id).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!("Deleted recurring template id={} user_id={}", id, user_id);
        Ok(())
    }

    pub async fn pause(&self, user_id: Uuid, id: Uuid) -> Result<RecurringTemplate, AppError> {
        let mut template = self.get(user_id, id).await?;
        if !template.is_active {
            return Err(AppError::AlreadyPaused);
        }

        template.is_active = false;
        template.updated_at = Utc::now();
        self.templates.update(&template).await?;
        Ok(template)
    }

    pub async fn resume(&self, user_id: Uuid, id: Uuid) -> Result<RecurringTemplate, AppError> {
        let mut template = self.get(user_id, id).await?;
        if template.is_active {
            return Err(AppError::AlreadyActive);
        }

        template.is_active = true;
        template.updated_at = Utc::now();
        self.templates.update(&template).await?;
        Ok(template)
    }

    /// Generates one expense from the template and advances its schedule.
    ///
    /// This is the manual trigger: it does not check the due predicate, so
    /// calling it twice on the same day creates two expenses. The sweep gets
    /// its once-per-day guarantee from `list_due` filtering instead.
    ///
    /// The expense insert is not rolled back if the template update after it
    /// fails; the template then stays due and the next sweep generates again.
    pub async fn generate_now(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<(Expense, RecurringTemplate), AppError> {
        let template = self.get(user_id, id).await?;
        let today = self.clock.today();

        let expense = self
            .expenses
            .create(NewExpense {
                user_id: template.user_id,
                amount: template.amount,
                description: template.description.clone(),
                date: today,
                category_id: template.category_id,
                tags: template.tags.clone(),
                payment_method: template.payment_method,
                notes: template.notes.clone(),
                is_recurring: true,
                recurring_expense_id: Some(template.id),
            })
            .await?;

        let mut updated = template;
        updated.next_occurrence = recurrence::advance_template(&updated);
        updated.last_generated = Some(today);
        updated.updated_at = Utc::now();
        self.templates.update(&updated).await?;

        tracing::info!(
            "Generated expense id={} from template id={}, next occurrence {}",
            expense.id,
            updated.id,
            updated.next_occurrence
        );
        Ok((expense, updated))
    }

    /// All expenses previously generated from the template.
    pub async fn history(&self, user_id: Uuid, id: Uuid) -> Result<Vec<Expense>, AppError> {
        self.get(user_id, id).await?;
        self.expenses.list_generated(user_id, id).await
    }

    /// Active templates due within the next `within_days` days.
    pub async fn upcoming(
        &self,
        user_id: Uuid,
        within_days: i64,
    ) -> Result<Vec<RecurringTemplate>, AppError> {
        self.templates
            .list_upcoming(user_id, self.clock.today(), within_days)
            .await
    }

    /// The daily sweep: generate for every due template, isolating failures
    /// so one bad template cannot starve the rest.
    pub async fn process_all_due(&self) -> Result<SweepReport, AppError> {
        let today = self.clock.today();
        let due = self.templates.list_due(today).await?;
        tracing::info!("Sweep found {} due templates for {}", due.len(), today);

        let mut report = SweepReport::default();
        for template in due {
            report.processed += 1;
            match self.generate_now(template.user_id, template.id).await {
                Ok(_) => report.succeeded += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        "Failed to generate expense for template id={}: {}",
                        template.id,
                        err
                    );
                    report.errors.push(SweepError {
                        template_id: template.id,
                        message: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Sweep complete: processed={} succeeded={} failed={}",
            report.processed,
            report.succeeded,
            report.failed
        );
        Ok(report)
    }
}

fn apply_patch(template: &mut RecurringTemplate, patch: TemplatePatch) {
    if let Some(amount) = patch.amount {
        template.amount = amount;
    }
    if let Some(description) = patch.description {
        template.description = description.trim().to_string();
    }
    if let Some(tags) = patch.tags {
        template.tags = tags;
    }
    if let Some(payment_method) = patch.payment_method {
        template.payment_method = payment_method;
    }
    if let Some(notes) = patch.notes {
        template.notes = notes;
    }
    if let Some(frequency) = patch.frequency {
        template.frequency = frequency;
    }
    if let Some(interval_count) = patch.interval_count {
        template.interval_count = interval_count;
    }
    if let Some(start_date) = patch.start_date {
        template.start_date = start_date;
    }
    if let Some(category_id) = patch.category_id {
        template.category_id = category_id;
    }
    if let Some(day_of_month) = patch.day_of_month {
        template.day_of_month = day_of_month;
    }
    if let Some(day_of_week) = patch.day_of_week {
        template.day_of_week = day_of_week;
    }
    if let Some(end_date) = patch.end_date {
        template.end_date = end_date;
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{Frequency, PaymentMethod};
    use crate::testutil::{FixedClock, MemoryExpenseSink, MemoryTemplateStore};

    type TestService = RecurringExpenseService<MemoryTemplateStore, MemoryExpenseSink, FixedClock>;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service_on(today: NaiveDate) -> TestService {
        RecurringExpenseService::new(
            MemoryTemplateStore::new(),
            MemoryExpenseSink::new(),
            FixedClock(today),
        )
    }

    fn monthly_template(start: NaiveDate) -> NewTemplate {
        NewTemplate {
            amount: Decimal::new(1999, 2),
            description: String::from("Streaming subscription"),
            category_id: None,
            tags: Vec::new(),
            payment_method: PaymentMethod::Credit,
            notes: String::new(),
            frequency: Frequency::Monthly,
            interval_count: 1,
            day_of_month: Some(15),
            day_of_week: None,
            start_date: start,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn create_initializes_next_occurrence_to_start_date() {
        let service = service_on(date(2024, 1, 1));
        let user_id = Uuid::new_v4();

        let template = service
            .create(user_id, monthly_template(date(2024, 1, 15)))
            .await
            .unwrap();

        assert_eq!(template.next_occurrence, date(2024, 1, 15));
        assert_eq!(template.last_generated, None);
        assert!(template.is_active);
    }

    #[tokio::test]
    async fn create_rejects_invalid_template_with_all_errors() {
        let service = service_on(date(2024, 1, 1));
        let mut data = monthly_template(date(2024, 1, 15));
        data.amount = Decimal::ZERO;
        data.interval_count = 400;

        let err = service.create(Uuid::new_v4(), data).await.unwrap_err();
        match err {
            AppError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_is_scoped_to_owner() {
        let service = service_on(date(2024, 1, 1));
        let owner = Uuid::new_v4();
        let template = service
            .create(owner, monthly_template(date(2024, 1, 15)))
            .await
            .unwrap();

        let err = service
            .get(Uuid::new_v4(), template.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        assert!(service.get(owner, template.id).await.is_ok());
    }

    #[tokio::test]
    async fn generate_now_creates_expense_and_advances_schedule() {
        let today = date(2024, 1, 15);
        let service = service_on(today);
        let user_id = Uuid::new_v4();
        let template = service
            .create(user_id, monthly_template(today))
            .await
            .unwrap();

        let (expense, updated) = service.generate_now(user_id, template.id).await.unwrap();

        assert_eq!(expense.date, today);
        assert_eq!(expense.amount, template.amount);
        assert!(expense.is_recurring);
        assert_eq!(expense.recurring_expense_id, Some(template.id));
        assert_eq!(updated.next_occurrence, date(2024, 2, 15));
        assert_eq!(updated.last_generated, Some(today));

        let stored = service.get(user_id, template.id).await.unwrap();
        assert_eq!(stored.next_occurrence, date(2024, 2, 15));
    }

    #[tokio::test]
    async fn generate_now_twice_same_day_creates_two_expenses() {
        let today = date(2024, 1, 15);
        let service = service_on(today);
        let user_id = Uuid::new_v4();
        let template = service
            .create(user_id, monthly_template(today))
            .await
            .unwrap();

        service.generate_now(user_id, template.id).await.unwrap();
        let (_, updated) = service.generate_now(user_id, template.id).await.unwrap();

        assert_eq!(service.expenses.created().len(), 2);
        // Advanced twice: Jan 15 -> Feb 15 -> Mar 15.
        assert_eq!(updated.next_occurrence, date(2024, 3, 15));
    }

    #[tokio::test]
    async fn generate_now_for_unknown_template_is_not_found() {
        let service = service_on(date(2024, 1, 15));
        let err = service
            .generate_now(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        assert!(service.expenses.created().is_empty());
    }

    #[tokio::test]
    async fn pause_and_resume_reject_redundant_transitions() {
        let service = service_on(date(2024, 1, 1));
        let user_id = Uuid::new_v4();
        let template = service
            .create(user_id, monthly_template(date(2024, 1, 15)))
            .await
            .unwrap();

        let err = service.resume(user_id, template.id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyActive));

        let paused = service.pause(user_id, template.id).await.unwrap();
        assert!(!paused.is_active);

        let err = service.pause(user_id, template.id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyPaused));

        let resumed = service.resume(user_id, template.id).await.unwrap();
        assert!(resumed.is_active);
    }

    #[tokio::test]
    async fn list_active_excludes_paused_templates() {
        let service = service_on(date(2024, 1, 1));
        let user_id = Uuid::new_v4();

        let kept = service
            .create(user_id, monthly_template(date(2024, 1, 15)))
            .await
            .unwrap();
        let paused = service
            .create(user_id, monthly_template(date(2024, 2, 15)))
            .await
            .unwrap();
        service.pause(user_id, paused.id).await.unwrap();

        let active = service.list_active(user_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);
        assert_eq!(service.list(user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_merges_patch_and_revalidates() {
        let service = service_on(date(2024, 1, 1));
        let user_id = Uuid::new_v4();
        let template = service
            .create(user_id, monthly_template(date(2024, 1, 15)))
            .await
            .unwrap();

        let patch = TemplatePatch {
            amount: Some(Decimal::new(2499, 2)),
            day_of_month: Some(None),
            ..TemplatePatch::default()
        };
        let updated = service.update(user_id, template.id, patch).await.unwrap();
        assert_eq!(updated.amount, Decimal::new(2499, 2));
        assert_eq!(updated.day_of_month, None);
        assert_eq!(updated.description, template.description);

        let bad_patch = TemplatePatch {
            end_date: Some(Some(date(2024, 1, 1))),
            ..TemplatePatch::default()
        };
        let err = service
            .update(user_id, template.id, bad_patch)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_removes_template() {
        let service = service_on(date(2024, 1, 1));
        let user_id = Uuid::new_v4();
        let template = service
            .create(user_id, monthly_template(date(2024, 1, 15)))
            .await
            .unwrap();

        service.delete(user_id, template.id).await.unwrap();
        let err = service.delete(user_id, template.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn history_returns_generated_expenses() {
        let today = date(2024, 1, 15);
        let service = service_on(today);
        let user_id = Uuid::new_v4();
        let template = service
            .create(user_id, monthly_template(today))
            .await
            .unwrap();

        assert!(service.history(user_id, template.id).await.unwrap().is_empty());

        service.generate_now(user_id, template.id).await.unwrap();
        service.generate_now(user_id, template.id).await.unwrap();

        let history = service.history(user_id, template.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.recurring_expense_id == Some(template.id)));
    }

    #[tokio::test]
    async fn upcoming_is_windowed_and_ordered() {
        let today = date(2024, 3, 1);
        let service = service_on(today);
        let user_id = Uuid::new_v4();

        let mut soon = monthly_template(date(2024, 3, 10));
        soon.description = String::from("soon");
        let mut sooner = monthly_template(date(2024, 3, 5));
        sooner.description = String::from("sooner");
        let mut far = monthly_template(date(2024, 5, 1));
        far.description = String::from("far");

        service.create(user_id, soon).await.unwrap();
        service.create(user_id, sooner).await.unwrap();
        service.create(user_id, far).await.unwrap();

        let upcoming = service.upcoming(user_id, 30).await.unwrap();
        let descriptions: Vec<_> = upcoming.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descriptions, vec!["sooner", "soon"]);
    }

    #[tokio::test]
    async fn upcoming_with_huge_window_does_not_panic() {
        let today = date(2024, 3, 1);
        let service = service_on(today);
        let user_id = Uuid::new_v4();
        service
            .create(user_id, monthly_template(date(2024, 3, 10)))
            .await
            .unwrap();

        // A window too large to add to today saturates instead of panicking.
        let upcoming = service.upcoming(user_id, i64::MAX).await.unwrap();
        assert_eq!(upcoming.len(), 1);
    }

    #[tokio::test]
    async fn upcoming_excludes_paused_templates() {
        let today = date(2024, 3, 1);
        let service = service_on(today);
        let user_id = Uuid::new_v4();
        let template = service
            .create(user_id, monthly_template(date(2024, 3, 10)))
            .await
            .unwrap();

        service.pause(user_id, template.id).await.unwrap();
        assert!(service.upcoming(user_id, 30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_generates_for_all_due_templates() {
        let today = date(2024, 1, 15);
        let service = service_on(today);

        service
            .create(Uuid::new_v4(), monthly_template(today))
            .await
            .unwrap();
        service
            .create(Uuid::new_v4(), monthly_template(today))
            .await
            .unwrap();
        // Not due: scheduled for next month.
        service
            .create(Uuid::new_v4(), monthly_template(date(2024, 2, 15)))
            .await
            .unwrap();

        let report = service.process_all_due().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(service.expenses.created().len(), 2);
    }

    #[tokio::test]
    async fn second_sweep_same_day_generates_nothing() {
        let today = date(2024, 1, 15);
        let service = service_on(today);
        service
            .create(Uuid::new_v4(), monthly_template(today))
            .await
            .unwrap();

        let first = service.process_all_due().await.unwrap();
        assert_eq!(first.succeeded, 1);

        let second = service.process_all_due().await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(service.expenses.created().len(), 1);
    }

    #[tokio::test]
    async fn sweep_skips_templates_past_end_date() {
        let today = date(2024, 1, 25);
        let service = service_on(today);
        let user_id = Uuid::new_v4();

        // end_date before next_occurrence: created valid, then patched so the
        // stored row matches the scenario.
        let template = service
            .create(user_id, monthly_template(date(2024, 1, 10)))
            .await
            .unwrap();
        let patch = TemplatePatch {
            end_date: Some(Some(date(2024, 1, 20))),
            ..TemplatePatch::default()
        };
        let mut updated = service.update(user_id, template.id, patch).await.unwrap();
        updated.next_occurrence = today;
        service.templates.update(&updated).await.unwrap();

        let report = service.process_all_due().await.unwrap();
        assert_eq!(report.processed, 0);
    }

    #[tokio::test]
    async fn sweep_isolates_per_template_failures() {
        let today = date(2024, 1, 15);
        let service = service_on(today);

        let healthy = service
            .create(Uuid::new_v4(), monthly_template(today))
            .await
            .unwrap();
        let broken = service
            .create(Uuid::new_v4(), monthly_template(today))
            .await
            .unwrap();
        service.expenses.fail_for(broken.id);

        let report = service.process_all_due().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].template_id, broken.id);

        // The healthy template advanced; the broken one is still due.
        let stored = service.get(healthy.user_id, healthy.id).await.unwrap();
        assert_eq!(stored.last_generated, Some(today));
        let stored = service.get(broken.user_id, broken.id).await.unwrap();
        assert_eq!(stored.last_generated, None);
        assert!(stored.is_due_on(today));
    }
}
