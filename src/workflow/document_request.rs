//! Academic document requests: input checks, pricing and status flow.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Step, WorkflowError};

status_enum! {
    DocumentRequestStatus, "document request status" {
        PendingForPayment => "Pending for Payment",
        Processing => "Processing",
        ReadyForPickup => "Ready for Pickup",
        Rejected => "Rejected",
    }
}

impl DocumentRequestStatus {
    pub fn next(self, to: DocumentRequestStatus) -> Result<Step<Self>, WorkflowError> {
        use DocumentRequestStatus::*;

        if self == to {
            return Ok(Step::Unchanged(self));
        }
        match (self, to) {
            (PendingForPayment, Processing)
            | (Processing, ReadyForPickup)
            | (PendingForPayment, Rejected)
            | (Processing, Rejected) => Ok(Step::Apply { from: self, to }),
            _ => Err(WorkflowError::invalid_transition("document request", self, to)),
        }
    }
}

/// Academic credential options with their unit price in centavos.
/// `None` marks a selectable option with no catalogue price.
pub const ACADEMIC_CREDENTIALS: &[(&str, Option<i64>)] = &[
    ("DIPLOMA", Some(50_000)),
    ("TRANSCRIPT OF RECORDS", Some(30_000)),
    ("FORM 137", Some(20_000)),
    ("FORM 138", Some(15_000)),
    ("CERTIFICATE OF GRADES", Some(10_000)),
    ("OTHERS", None),
];

/// Certification options with their unit price in centavos
pub const CERTIFICATIONS: &[(&str, Option<i64>)] = &[
    ("CERTIFICATE OF ENROLLMENT", Some(10_000)),
    ("GOOD MORAL CHARACTER", Some(10_000)),
    ("CERTIFICATE OF GRADUATION", Some(15_000)),
    ("HONORABLE DISMISSAL", Some(20_000)),
    ("ENGLISH AS MEDIUM OF INSTRUCTION", Some(10_000)),
    ("UNITS EARNED", Some(10_000)),
    ("GENERAL WEIGHTED AVERAGE", Some(10_000)),
    ("OTHERS", None),
];

pub const LEVELS_ATTENDED: &[&str] = &["PS/GS", "HS", "JHS", "SHS", "COLLEGE"];

const DESCRIPTION_MIN: usize = 10;
const DESCRIPTION_MAX: usize = 500;
const GRADE_STRAND_COURSE_MAX: usize = 100;
const EARLIEST_GRADUATION_YEAR: i32 = 1950;

/// Which option groups a request draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    AcademicCredentials,
    Certification,
    Both,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::AcademicCredentials => "Academic Credentials",
            DocType::Certification => "Certification",
            DocType::Both => "Academic Credentials, Certification",
        }
    }

    /// Flat price charged when the selected items carry no catalogue price
    pub fn flat_price(&self) -> Decimal {
        match self {
            DocType::AcademicCredentials => Decimal::new(50_000, 2),
            DocType::Certification => Decimal::new(10_000, 2),
            DocType::Both => Decimal::new(60_000, 2),
        }
    }

    fn derive(academic: &[String], certification: &[String]) -> Option<Self> {
        match (academic.is_empty(), certification.is_empty()) {
            (false, true) => Some(DocType::AcademicCredentials),
            (true, false) => Some(DocType::Certification),
            (false, false) => Some(DocType::Both),
            (true, true) => None,
        }
    }
}

impl Serialize for DocType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Document request form as posted by a student
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequestInput {
    pub description: Option<String>,
    pub date: Option<String>,
    /// Accepted as a JSON number or a numeric string
    pub year_graduated: Option<Value>,
    pub grade_strand_course: Option<String>,
    #[serde(default)]
    pub level_attended: Vec<String>,
    #[serde(default)]
    pub academic_credentials: Vec<String>,
    #[serde(default)]
    pub certification: Vec<String>,
}

/// A priced line of a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedItem {
    pub item: String,
    pub price: Decimal,
}

/// Request that passed validation, with its derived type and price
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedDocumentRequest {
    pub description: String,
    pub request_date: NaiveDate,
    pub year_graduated: i32,
    pub grade_strand_course: String,
    pub level_attended: Vec<String>,
    pub academic_credentials: Vec<String>,
    pub certification: Vec<String>,
    pub doc_type: DocType,
    pub items: Vec<PricedItem>,
    pub document_price: Decimal,
}

fn unit_price(table: &[(&str, Option<i64>)], item: &str) -> Option<Decimal> {
    table
        .iter()
        .find(|(name, _)| *name == item)
        .and_then(|(_, centavos)| centavos.map(|c| Decimal::new(c, 2)))
}

fn allowed(table: &[(&str, Option<i64>)], item: &str) -> bool {
    table.iter().any(|(name, _)| *name == item)
}

/// At least one item is selected and every item is in its catalogue
pub fn check_selection(academic: &[String], certification: &[String]) -> Result<(), WorkflowError> {
    if academic.is_empty() && certification.is_empty() {
        return Err(WorkflowError::validation(
            "academicCredentials",
            "Select at least one academic credential or certification",
        ));
    }
    if let Some(bad) = academic.iter().find(|item| !allowed(ACADEMIC_CREDENTIALS, item)) {
        return Err(WorkflowError::validation(
            "academicCredentials",
            format!("Invalid academic credential: {}", bad),
        ));
    }
    if let Some(bad) = certification.iter().find(|item| !allowed(CERTIFICATIONS, item)) {
        return Err(WorkflowError::validation(
            "certification",
            format!("Invalid certification: {}", bad),
        ));
    }
    Ok(())
}

/// Sum the catalogue prices of every selected item, falling back to the
/// flat price of the derived document type when that sum is zero.
pub fn price_request(academic: &[String], certification: &[String]) -> Option<(DocType, Vec<PricedItem>, Decimal)> {
    let doc_type = DocType::derive(academic, certification)?;
    let items: Vec<PricedItem> = academic
        .iter()
        .map(|item| (item, unit_price(ACADEMIC_CREDENTIALS, item)))
        .chain(certification.iter().map(|item| (item, unit_price(CERTIFICATIONS, item))))
        .map(|(item, price)| PricedItem {
            item: item.clone(),
            price: price.unwrap_or(Decimal::ZERO),
        })
        .collect();

    let sum: Decimal = items.iter().map(|line| line.price).sum();
    let total = if sum.is_zero() { doc_type.flat_price() } else { sum };
    Some((doc_type, items, total))
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

impl DocumentRequestInput {
    /// Validate in a fixed order and price the request. `today` is the
    /// server's current date; request dates up to one day ahead are accepted.
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedDocumentRequest, WorkflowError> {
        let description = trimmed(&self.description);
        if description.is_empty() {
            return Err(WorkflowError::validation("description", "Description is required"));
        }
        let length = description.chars().count();
        if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&length) {
            return Err(WorkflowError::validation(
                "description",
                format!(
                    "Description must be between {} and {} characters",
                    DESCRIPTION_MIN, DESCRIPTION_MAX
                ),
            ));
        }

        let date_text = trimmed(&self.date);
        let request_date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
            .map_err(|_| WorkflowError::validation("date", "Date must be a valid YYYY-MM-DD date"))?;
        if request_date > today + Duration::days(1) {
            return Err(WorkflowError::validation("date", "Date cannot be in the future"));
        }

        let year_graduated = match &self.year_graduated {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| WorkflowError::validation("yearGraduated", "Year graduated must be a number"))?;
        let latest = i64::from(today.year()) + 1;
        if year_graduated < i64::from(EARLIEST_GRADUATION_YEAR) || year_graduated > latest {
            return Err(WorkflowError::validation(
                "yearGraduated",
                format!("Year graduated must be between {} and {}", EARLIEST_GRADUATION_YEAR, latest),
            ));
        }

        let grade_strand_course = trimmed(&self.grade_strand_course);
        if grade_strand_course.is_empty() {
            return Err(WorkflowError::validation("gradeStrandCourse", "Grade/strand/course is required"));
        }
        if grade_strand_course.chars().count() > GRADE_STRAND_COURSE_MAX {
            return Err(WorkflowError::validation(
                "gradeStrandCourse",
                format!("Grade/strand/course must be at most {} characters", GRADE_STRAND_COURSE_MAX),
            ));
        }

        let level_attended = clean_list(&self.level_attended);
        if level_attended.is_empty() {
            return Err(WorkflowError::validation("levelAttended", "Select at least one level attended"));
        }
        if let Some(bad) = level_attended.iter().find(|level| !LEVELS_ATTENDED.contains(&level.as_str())) {
            return Err(WorkflowError::validation(
                "levelAttended",
                format!("Invalid level attended: {}", bad),
            ));
        }

        let academic_credentials = clean_list(&self.academic_credentials);
        let certification = clean_list(&self.certification);
        check_selection(&academic_credentials, &certification)?;

        let (doc_type, items, document_price) = price_request(&academic_credentials, &certification)
            .ok_or_else(|| WorkflowError::validation("academicCredentials", "Nothing selected"))?;

        Ok(ValidatedDocumentRequest {
            description,
            request_date,
            year_graduated: year_graduated as i32,
            grade_strand_course,
            level_attended,
            academic_credentials,
            certification,
            doc_type,
            items,
            document_price,
        })
    }
}
