//! Bulk student import types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical student column an uploaded header can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportField {
    FirstName,
    LastName,
    Email,
    Phone,
    DateOfBirth,
    Gender,
    Grade,
    SchoolName,
    Address,
    ParentName,
    ParentEmail,
    ParentPhone,
}

impl ImportField {
    /// Every field, in template column order.
    pub const ALL: [ImportField; 12] = [
        ImportField::FirstName,
        ImportField::LastName,
        ImportField::Email,
        ImportField::Phone,
        ImportField::DateOfBirth,
        ImportField::Gender,
        ImportField::Grade,
        ImportField::SchoolName,
        ImportField::Address,
        ImportField::ParentName,
        ImportField::ParentEmail,
        ImportField::ParentPhone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportField::FirstName => "first_name",
            ImportField::LastName => "last_name",
            ImportField::Email => "email",
            ImportField::Phone => "phone",
            ImportField::DateOfBirth => "date_of_birth",
            ImportField::Gender => "gender",
            ImportField::Grade => "grade",
            ImportField::SchoolName => "school_name",
            ImportField::Address => "address",
            ImportField::ParentName => "parent_name",
            ImportField::ParentEmail => "parent_email",
            ImportField::ParentPhone => "parent_phone",
        }
    }
}

/// One validated CSV row, ready to become a student.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentImportRow {
    /// Line of the uploaded file this row came from (header is line 1)
    pub row: usize,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub grade: Option<String>,
    pub school_name: Option<String>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_email: Option<String>,
    pub parent_phone: Option<String>,
}

/// Validation failure for one line of the file. Row 0 means the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRowError {
    pub row: usize,
    pub message: String,
}

impl ImportRowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

/// Output of parsing an upload: valid rows and the errors of rejected ones.
#[derive(Debug, Default)]
pub struct ParsedImport {
    pub rows: Vec<StudentImportRow>,
    pub errors: Vec<ImportRowError>,

    /// Headers that matched no known column; their values are ignored
    pub unmapped_headers: Vec<String>,
}

impl ParsedImport {
    /// True when the file itself was unusable (empty, or missing a name column).
    pub fn rejected(&self) -> bool {
        self.errors.iter().any(|e| e.row == 0)
    }
}

/// `POST /api/v1/imports/students?dry_run=true`
#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// Response body of a student import.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub dry_run: bool,

    /// Students inserted (always 0 for a dry run)
    pub imported: usize,

    /// Rows that passed validation
    pub valid_rows: usize,

    /// Validated rows, only echoed back on a dry run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<StudentImportRow>,

    pub errors: Vec<ImportRowError>,
    pub unmapped_headers: Vec<String>,
}
