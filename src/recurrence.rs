use chrono::{Datelike, Days, Months, NaiveDate};

use crate::domain::{Frequency, RecurringTemplate};

/// Computes the next occurrence date from the current one.
///
/// Month and year arithmetic use chrono's clamping convention: landing on a
/// day past the end of the target month clamps to its last day, so
/// Jan 31 + 1 month is Feb 28 (29 in leap years) and Feb 29 + 1 year is
/// Feb 28. When `day_of_month` is set for a monthly rule the day component is
/// overridden after the month shift, again clamped to the target month.
///
/// Weekly advancement is purely interval-based from the last occurrence;
/// `day_of_week` is stored and validated but never re-anchors the schedule.
pub fn advance(
    current: NaiveDate,
    frequency: Frequency,
    interval_count: i32,
    day_of_month: Option<i32>,
) -> NaiveDate {
    let interval = interval_count.max(1) as u64;
    match frequency {
        Frequency::Daily => current
            .checked_add_days(Days::new(interval))
            .unwrap_or(current),
        Frequency::Weekly => current
            .checked_add_days(Days::new(7 * interval))
            .unwrap_or(current),
        Frequency::Monthly => {
            let shifted = current
                .checked_add_months(Months::new(interval as u32))
                .unwrap_or(current);
            match day_of_month {
                Some(day) => with_clamped_day(shifted, day as u32),
                None => shifted,
            }
        }
        Frequency::Yearly => current
            .checked_add_months(Months::new(12 * interval as u32))
            .unwrap_or(current),
    }
}

/// [`advance`] applied to a template's own recurrence fields.
pub fn advance_template(template: &RecurringTemplate) -> NaiveDate {
    advance(
        template.next_occurrence,
        template.frequency,
        template.interval_count,
        template.day_of_month,
    )
}

fn with_clamped_day(date: NaiveDate, day: u32) -> NaiveDate {
    date.with_day(day)
        .unwrap_or_else(|| last_day_of_month(date))
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.checked_sub_days(Days::new(1)))
        .unwrap_or(date)
}
