//! Date Validator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constraint::{resolve, DateConstraint};
use crate::group::{ShipmentGroup, ShipmentId};

pub const END_BEFORE_START: &str = "End date must be after start date";
pub const START_REQUIRED: &str = "Start date is required";
pub const END_REQUIRED: &str = "End date is required";

/// Which date input an error belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    Start,
    End,
}

/// Field-scoped validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: DateField,
    pub message: String,
}

impl FieldError {
    fn new(field: DateField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn errors_for(&self, field: DateField) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |e| e.field == field)
    }
}

/// Validation outcome of one shipment of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentValidation {
    pub shipment_id: ShipmentId,
    pub report: ValidationReport,
}

/// `Mar 1` style rendering used in messages.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

fn prior_to_message(bound: NaiveDate, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("Cannot be prior to {} ({label})", format_date(bound)),
        None => format!("Cannot be prior to {}", format_date(bound)),
    }
}

/// Check candidate dates against constraints.
///
/// Errors come out as: every start violation in constraint order, then every
/// end violation, then the ordering error. The ordering error is reported even
/// when an end violation was already emitted for the same field.
pub fn validate(
    candidate_start: Option<NaiveDate>,
    candidate_end: Option<NaiveDate>,
    constraints: &[DateConstraint],
) -> ValidationReport {
    let mut errors = Vec::new();

    if let Some(start) = candidate_start {
        for c in constraints {
            if let Some(bound) = c.start.filter(|bound| start < *bound) {
                errors.push(FieldError::new(
                    DateField::Start,
                    prior_to_message(bound, c.label.as_deref()),
                ));
            }
        }
    }

    if let Some(end) = candidate_end {
        for c in constraints {
            if let Some(bound) = c.end.filter(|bound| end < *bound) {
                errors.push(FieldError::new(
                    DateField::End,
                    prior_to_message(bound, c.label.as_deref()),
                ));
            }
        }
    }

    if let (Some(start), Some(end)) = (candidate_start, candidate_end) {
        if start > end {
            errors.push(FieldError::new(DateField::End, END_BEFORE_START));
        }
    }

    ValidationReport::from_errors(errors)
}

/// Validate a group's planned dates against its resolved constraints.
pub fn validate_group(group: &ShipmentGroup) -> ValidationReport {
    validate(
        group.planned_ship_start(),
        group.planned_ship_end(),
        &resolve(group).to_date_constraints(),
    )
}

/// Submission-time check: like [`validate_group`], and both dates must be set.
pub fn validate_for_submit(group: &ShipmentGroup) -> ValidationReport {
    let mut errors = Vec::new();
    if group.planned_ship_start().is_none() {
        errors.push(FieldError::new(DateField::Start, START_REQUIRED));
    }
    if group.planned_ship_end().is_none() {
        errors.push(FieldError::new(DateField::End, END_REQUIRED));
    }
    errors.extend(validate_group(group).errors);
    ValidationReport::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::CollectionId;
    use proptest::prelude::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn own(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DateConstraint {
        DateConstraint {
            label: None,
            collection_id: Some(CollectionId::new("A")),
            start,
            end,
        }
    }

    fn labeled(label: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> DateConstraint {
        DateConstraint {
            label: Some(label.to_string()),
            collection_id: Some(CollectionId::new(label)),
            start,
            end,
        }
    }

    #[test]
    fn start_before_collection_window_is_flagged() {
        let report = validate(
            Some(date(2, 20)),
            Some(date(3, 15)),
            &[own(Some(date(3, 1)), Some(date(3, 15)))],
        );
        assert_eq!(
            report,
            ValidationReport {
                valid: false,
                errors: vec![FieldError {
                    field: DateField::Start,
                    message: "Cannot be prior to Mar 1".to_string(),
                }],
            }
        );
    }

    #[test]
    fn dates_inside_window_are_valid() {
        let report = validate(
            Some(date(3, 2)),
            Some(date(3, 20)),
            &[own(Some(date(3, 1)), Some(date(3, 15)))],
        );
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn end_before_window_end_is_flagged() {
        let report = validate(
            Some(date(3, 1)),
            Some(date(3, 10)),
            &[own(Some(date(3, 1)), Some(date(3, 15)))],
        );
        assert!(!report.valid);
        assert_eq!(report.errors_for(DateField::End).count(), 1);
        assert_eq!(report.errors[0].message, "Cannot be prior to Mar 15");
    }

    #[test]
    fn per_origin_errors_name_the_collection() {
        let constraints = vec![
            labeled("Spring", Some(date(3, 1)), Some(date(3, 15))),
            labeled("Summer", Some(date(5, 1)), Some(date(5, 31))),
        ];
        let report = validate(Some(date(3, 1)), Some(date(3, 15)), &constraints);
        let messages: Vec<_> = report.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Cannot be prior to May 1 (Summer)", "Cannot be prior to May 31 (Summer)"]
        );
        assert_eq!(report.errors[0].field, DateField::Start);
        assert_eq!(report.errors[1].field, DateField::End);
    }

    #[test]
    fn ordering_error_follows_constraint_errors_on_end() {
        let report = validate(
            Some(date(3, 20)),
            Some(date(3, 10)),
            &[own(Some(date(3, 1)), Some(date(3, 15)))],
        );
        let end: Vec<_> = report.errors_for(DateField::End).map(|e| e.message.as_str()).collect();
        assert_eq!(end, vec!["Cannot be prior to Mar 15", END_BEFORE_START]);
    }

    #[test]
    fn missing_dates_are_not_checked_interactively() {
        let report = validate(None, None, &[own(Some(date(3, 1)), Some(date(3, 15)))]);
        assert!(report.valid);
    }

    #[test]
    fn submission_requires_both_dates() {
        use crate::group::ShipmentGroup;
        let group = ShipmentGroup::unconstrained(ShipmentId::new_draft(), vec![]);
        let report = validate_for_submit(&group);
        assert!(!report.valid);
        let messages: Vec<_> = report.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec![START_REQUIRED, END_REQUIRED]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: start > end is always invalid with an `end` ordering error.
        #[test]
        fn reversed_dates_are_always_invalid(
            start_offset in 1i64..400,
            gap in 1i64..60,
            bound_offset in prop::option::of(0i64..400),
        ) {
            let base = date(1, 1);
            let start = base + chrono::Duration::days(start_offset);
            let end = start - chrono::Duration::days(gap);
            let bound = bound_offset.map(|o| base + chrono::Duration::days(o));
            let constraints = vec![own(bound, bound)];

            let report = validate(Some(start), Some(end), &constraints);
            prop_assert!(!report.valid);
            prop_assert!(report
                .errors
                .iter()
                .any(|e| e.field == DateField::End && e.message == END_BEFORE_START));
        }
    }
}
