//! Import service - bulk student import from CSV.
//!
//! Parsing and validation are pure and do no I/O: [`parse_student_csv`] turns
//! the uploaded text into validated rows plus per-row errors. [`import_students`]
//! then inserts the valid rows in one transaction.
//!
//! Records are line based: a quoted field may contain commas and `""` escapes
//! but not line breaks.

use std::{collections::HashMap, sync::LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use uuid::Uuid;

use crate::{
    config::{BillingSettings, DateOrder, PhoneRegion},
    db::DbPool,
    error::AppError,
    models::{
        audit_log::AuditAction,
        import::{ImportField, ImportReport, ImportRowError, ParsedImport, StudentImportRow},
        student::{STUDENT_COLUMNS, Student},
    },
    services::audit_service,
};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static ZA_PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+27|27|0)\d{9}$").expect("valid phone regex"));

static INTL_PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{7,14}$").expect("valid phone regex"));

/// Widths of the `students` columns a CSV value is written to.
const FIELD_LIMITS: [(ImportField, &str, usize); 7] = [
    (ImportField::FirstName, "First name", 255),
    (ImportField::LastName, "Last name", 255),
    (ImportField::Email, "Email address", 255),
    (ImportField::Grade, "Grade", 64),
    (ImportField::SchoolName, "School name", 255),
    (ImportField::ParentName, "Parent name", 255),
    (ImportField::ParentEmail, "Parent email address", 255),
];

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid date regex"));

static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})([/-])(\d{1,2})([/-])(\d{4})$").expect("valid date regex")
});

/// Map an uploaded column header to the student field it holds.
///
/// Case, surrounding whitespace, and the choice of space, `_` or `-` between
/// words don't matter: "Surname", "last_name" and "LAST-NAME" all map to
/// `last_name`.
pub fn normalize_header(raw: &str) -> Option<ImportField> {
    let spaced: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    let key = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    let field = match key.as_str() {
        "first name" | "firstname" | "name" | "given name" | "given names" | "forename"
        | "student first name" | "student name" => ImportField::FirstName,
        "last name" | "lastname" | "surname" | "family name" | "student last name"
        | "student surname" => ImportField::LastName,
        "email" | "email address" | "e mail" | "mail" | "student email" => ImportField::Email,
        "phone" | "phone number" | "cell" | "cellphone" | "cell phone" | "cell number"
        | "mobile" | "mobile number" | "contact number" | "telephone" | "tel"
        | "student phone" | "student cell" => ImportField::Phone,
        "date of birth" | "dob" | "birth date" | "birthdate" | "birthday" => {
            ImportField::DateOfBirth
        }
        "gender" | "sex" => ImportField::Gender,
        "grade" | "grade level" | "class" | "year" | "standard" => ImportField::Grade,
        "school" | "school name" => ImportField::SchoolName,
        "address" | "home address" | "physical address" | "street address" => {
            ImportField::Address
        }
        "parent" | "parent name" | "guardian" | "guardian name" | "parent/guardian"
        | "parent or guardian" => ImportField::ParentName,
        "parent email" | "parent email address" | "guardian email" => ImportField::ParentEmail,
        "parent phone" | "parent phone number" | "parent cell" | "parent cellphone"
        | "parent mobile" | "parent contact" | "guardian phone" | "guardian cell" => {
            ImportField::ParentPhone
        }
        _ => return None,
    };

    Some(field)
}

/// Split one CSV line into fields.
///
/// Double quotes group a field; `""` inside quotes is a literal quote.
pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Strip formatting from a phone number and check it against the region's pattern.
///
/// Returns the compact number (`082 123-4567` becomes `0821234567`).
pub fn normalize_phone(raw: &str, region: PhoneRegion) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let pattern = match region {
        PhoneRegion::Za => &*ZA_PHONE_RE,
        PhoneRegion::International => &*INTL_PHONE_RE,
    };

    pattern.is_match(&compact).then_some(compact)
}

/// Map free-text gender to `male`, `female` or `other`.
///
/// Empty input means not provided; anything unrecognized is `other`.
pub fn normalize_gender(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "" => None,
        "m" | "male" | "boy" | "man" => Some("male"),
        "f" | "female" | "girl" | "woman" => Some("female"),
        _ => Some("other"),
    }
}

/// Parse a date written as `YYYY-MM-DD`, `NN/NN/YYYY` or `NN-NN-YYYY`.
///
/// The two-number forms are read in the configured order. With the default
/// day-first order `05/06/2010` is 5 June; a month-first file uploaded to a
/// day-first center is read wrongly whenever the day is 12 or less. Nothing in
/// the text tells the two apart, so no guess is attempted.
pub fn normalize_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Some(caps) = ISO_DATE_RE.captures(raw) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    let caps = NUMERIC_DATE_RE.captures(raw)?;
    if caps[2] != caps[4] {
        return None;
    }
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[3].parse().ok()?;
    let year: i32 = caps[5].parse().ok()?;

    let (day, month) = match order {
        DateOrder::DayFirst => (first, second),
        DateOrder::MonthFirst => (second, first),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse and validate an uploaded student CSV.
///
/// The first non-blank line is the header. If the file is empty or the header
/// lacks a first or last name column, the result holds a single row 0 error and
/// no rows. Otherwise every data line is validated on its own: rows with errors
/// are left out and their errors reported against the line number of the file.
pub fn parse_student_csv(text: &str, settings: &BillingSettings) -> ParsedImport {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header_line)) = lines.next() else {
        return ParsedImport {
            errors: vec![ImportRowError::new(0, "CSV file is empty")],
            ..ParsedImport::default()
        };
    };

    let mut columns: HashMap<ImportField, usize> = HashMap::new();
    let mut unmapped_headers = Vec::new();
    for (index, header) in parse_csv_record(header_line).iter().enumerate() {
        match normalize_header(header) {
            Some(field) => {
                columns.entry(field).or_insert(index);
            }
            None if !header.trim().is_empty() => unmapped_headers.push(header.trim().to_string()),
            None => {}
        }
    }

    let missing: Vec<&str> = [ImportField::FirstName, ImportField::LastName]
        .iter()
        .filter(|field| !columns.contains_key(*field))
        .map(|field| field.as_str())
        .collect();
    if !missing.is_empty() {
        return ParsedImport {
            errors: vec![ImportRowError::new(
                0,
                format!("Missing required column(s): {}", missing.join(", ")),
            )],
            unmapped_headers,
            ..ParsedImport::default()
        };
    }

    let mut parsed = ParsedImport {
        unmapped_headers,
        ..ParsedImport::default()
    };

    for (index, line) in lines {
        let fields = parse_csv_record(line);
        match validate_row(index + 1, &fields, &columns, settings) {
            Ok(row) => parsed.rows.push(row),
            Err(errors) => parsed.errors.extend(errors),
        }
    }

    parsed
}

fn validate_row(
    row: usize,
    fields: &[String],
    columns: &HashMap<ImportField, usize>,
    settings: &BillingSettings,
) -> Result<StudentImportRow, Vec<ImportRowError>> {
    let value = |field: ImportField| -> Option<&str> {
        columns
            .get(&field)
            .and_then(|&i| fields.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    };
    let text = |field: ImportField| value(field).map(str::to_string);

    let mut errors = Vec::new();

    let first_name = value(ImportField::FirstName).unwrap_or_default();
    if first_name.is_empty() {
        errors.push(ImportRowError::new(row, "First name is required"));
    }
    let last_name = value(ImportField::LastName).unwrap_or_default();
    if last_name.is_empty() {
        errors.push(ImportRowError::new(row, "Last name is required"));
    }

    for (field, label, max) in FIELD_LIMITS {
        if value(field).is_some_and(|v| v.chars().count() > max) {
            errors.push(ImportRowError::new(
                row,
                format!("{label} is too long (max {max} characters)"),
            ));
        }
    }

    let email = value(ImportField::Email).map(str::to_lowercase);
    if email.as_deref().is_some_and(|e| !EMAIL_RE.is_match(e)) {
        errors.push(ImportRowError::new(row, "Invalid email address"));
    }

    let parent_email = value(ImportField::ParentEmail).map(str::to_lowercase);
    if parent_email.as_deref().is_some_and(|e| !EMAIL_RE.is_match(e)) {
        errors.push(ImportRowError::new(row, "Invalid parent email address"));
    }

    let phone = match value(ImportField::Phone) {
        Some(raw) => normalize_phone(raw, settings.phone_region).or_else(|| {
            errors.push(ImportRowError::new(row, "Invalid phone number"));
            None
        }),
        None => None,
    };

    let parent_phone = match value(ImportField::ParentPhone) {
        Some(raw) => normalize_phone(raw, settings.phone_region).or_else(|| {
            errors.push(ImportRowError::new(row, "Invalid parent phone number"));
            None
        }),
        None => None,
    };

    let date_of_birth = match value(ImportField::DateOfBirth) {
        Some(raw) => normalize_date(raw, settings.date_order).or_else(|| {
            errors.push(ImportRowError::new(row, "Invalid date of birth"));
            None
        }),
        None => None,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(StudentImportRow {
        row,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email,
        phone,
        date_of_birth,
        gender: value(ImportField::Gender)
            .and_then(normalize_gender)
            .map(str::to_string),
        grade: text(ImportField::Grade),
        school_name: text(ImportField::SchoolName),
        address: text(ImportField::Address),
        parent_name: text(ImportField::ParentName),
        parent_email,
        parent_phone,
    })
}

/// Sample upload with every supported column and one example student.
///
/// The date is ISO and the phone numbers carry the `+27` country code, so the
/// template is a valid upload under every date order and phone region.
pub fn template_csv() -> String {
    let header = ImportField::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(",");

    let example = [
        "Thabo",
        "Nkosi",
        "thabo.nkosi@example.com",
        "+27 82 123 4567",
        "2010-05-15",
        "male",
        "Grade 8",
        "Greenwood High",
        "12 Main Road, Durban",
        "Lerato Nkosi",
        "lerato.nkosi@example.com",
        "+27 83 123 4567",
    ]
    .iter()
    .map(|v| csv_quote(v))
    .collect::<Vec<_>>()
    .join(",");

    format!("{header}\n{example}\n")
}

/// Import students from CSV text into a center.
///
/// A dry run only validates and echoes the rows back. Otherwise the valid rows
/// are inserted as active students in one transaction, each with a `create`
/// audit record; rows with errors are reported and skipped.
///
/// # Errors
///
/// - `Import`: the file is empty or lacks a first/last name column
/// - `Database`: Database error occurred
pub async fn import_students(
    pool: &DbPool,
    settings: &BillingSettings,
    center_id: Uuid,
    text: &str,
    dry_run: bool,
) -> Result<ImportReport, AppError> {
    let parsed = parse_student_csv(text, settings);
    if parsed.rejected() {
        let message = parsed
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AppError::Import(message));
    }

    let valid_rows = parsed.rows.len();

    if dry_run {
        return Ok(ImportReport {
            success: true,
            dry_run,
            imported: 0,
            valid_rows,
            rows: parsed.rows,
            errors: parsed.errors,
            unmapped_headers: parsed.unmapped_headers,
        });
    }

    let insert_sql = format!(
        r#"
        INSERT INTO students (
            center_id, first_name, last_name, email, phone, date_of_birth, gender,
            grade, school_name, address, parent_name, parent_email, parent_phone
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {STUDENT_COLUMNS}
        "#
    );

    let mut tx = pool.begin().await?;

    for row in &parsed.rows {
        let student = sqlx::query_as::<_, Student>(&insert_sql)
            .bind(center_id)
            .bind(&row.first_name)
            .bind(&row.last_name)
            .bind(&row.email)
            .bind(&row.phone)
            .bind(row.date_of_birth)
            .bind(&row.gender)
            .bind(&row.grade)
            .bind(&row.school_name)
            .bind(&row.address)
            .bind(&row.parent_name)
            .bind(&row.parent_email)
            .bind(&row.parent_phone)
            .fetch_one(&mut *tx)
            .await?;

        audit_service::record(
            &mut *tx,
            center_id,
            AuditAction::Create,
            "student",
            Some(student.id),
            None,
            Some(audit_service::snapshot(&student)?),
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        %center_id,
        imported = valid_rows,
        rejected_rows = parsed.errors.len(),
        "student import finished"
    );

    Ok(ImportReport {
        success: true,
        dry_run,
        imported: valid_rows,
        valid_rows,
        rows: Vec::new(),
        errors: parsed.errors,
        unmapped_headers: parsed.unmapped_headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BillingSettings {
        BillingSettings::default()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn header_synonyms_normalize() {
        assert_eq!(normalize_header("Surname"), Some(ImportField::LastName));
        assert_eq!(normalize_header("  DOB "), Some(ImportField::DateOfBirth));
        assert_eq!(normalize_header("Cell"), Some(ImportField::Phone));
        assert_eq!(normalize_header("first_name"), Some(ImportField::FirstName));
        assert_eq!(normalize_header("E-mail"), Some(ImportField::Email));
        assert_eq!(normalize_header("Parent  Cell"), Some(ImportField::ParentPhone));
        assert_eq!(normalize_header("favourite colour"), None);
    }

    #[test]
    fn csv_record_handles_quotes() {
        assert_eq!(
            parse_csv_record(r#"Jane,"Doe, Jr","say ""hi""",,"#),
            vec!["Jane", "Doe, Jr", r#"say "hi""#, "", ""]
        );
    }

    #[test]
    fn day_first_dates_are_assumed() {
        assert_eq!(normalize_date("15/05/2010", DateOrder::DayFirst), Some(date(2010, 5, 15)));
        assert_eq!(normalize_date("15-05-2010", DateOrder::DayFirst), Some(date(2010, 5, 15)));
        assert_eq!(normalize_date("2010-05-15", DateOrder::DayFirst), Some(date(2010, 5, 15)));
        // Ambiguous: read as 5 June, never second-guessed
        assert_eq!(normalize_date("05/06/2010", DateOrder::DayFirst), Some(date(2010, 6, 5)));
        // A month-first date with day > 12 is simply invalid day-first
        assert_eq!(normalize_date("05/15/2010", DateOrder::DayFirst), None);
    }

    #[test]
    fn month_first_order_flips_numeric_dates() {
        assert_eq!(normalize_date("05/15/2010", DateOrder::MonthFirst), Some(date(2010, 5, 15)));
        assert_eq!(normalize_date("2010-05-15", DateOrder::MonthFirst), Some(date(2010, 5, 15)));
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert_eq!(normalize_date("31/02/2010", DateOrder::DayFirst), None);
        assert_eq!(normalize_date("15/05-2010", DateOrder::DayFirst), None);
        assert_eq!(normalize_date("May 15 2010", DateOrder::DayFirst), None);
    }

    #[test]
    fn south_african_phone_numbers() {
        assert_eq!(normalize_phone("082 123 4567", PhoneRegion::Za), Some("0821234567".into()));
        assert_eq!(normalize_phone("+27 (82) 123-4567", PhoneRegion::Za), Some("+27821234567".into()));
        assert_eq!(normalize_phone("27821234567", PhoneRegion::Za), Some("27821234567".into()));
        assert_eq!(normalize_phone("082 123 456", PhoneRegion::Za), None);
        assert_eq!(normalize_phone("+44 20 7946 0958", PhoneRegion::Za), None);
        assert_eq!(
            normalize_phone("+44 20 7946 0958", PhoneRegion::International),
            Some("+442079460958".into())
        );
    }

    #[test]
    fn gender_synonyms() {
        assert_eq!(normalize_gender("M"), Some("male"));
        assert_eq!(normalize_gender("Girl"), Some("female"));
        assert_eq!(normalize_gender("non-binary"), Some("other"));
        assert_eq!(normalize_gender("  "), None);
    }

    #[test]
    fn parses_valid_rows_with_synonym_headers() {
        let csv = "Name,Surname,DOB,Cell,Sex,Email\n\
                   Jane,Doe,15/05/2010,082 123 4567,F,Jane@Example.com\n";

        let parsed = parse_student_csv(csv, &settings());

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows.len(), 1);
        let row = &parsed.rows[0];
        assert_eq!(row.row, 2);
        assert_eq!(row.first_name, "Jane");
        assert_eq!(row.last_name, "Doe");
        assert_eq!(row.date_of_birth, Some(date(2010, 5, 15)));
        assert_eq!(row.phone.as_deref(), Some("0821234567"));
        assert_eq!(row.gender.as_deref(), Some("female"));
        assert_eq!(row.email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn missing_first_name_rejects_only_that_row() {
        let csv = "first_name,last_name\n,Doe\nJohn,Smith\n";

        let parsed = parse_student_csv(csv, &settings());

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].first_name, "John");
        assert_eq!(
            parsed.errors,
            vec![ImportRowError::new(2, "First name is required")]
        );
        assert!(!parsed.rejected());
    }

    #[test]
    fn invalid_optional_fields_reject_the_row_with_every_message() {
        let csv = "first_name,last_name,email,phone,date_of_birth,parent_phone\n\
                   Amy,Lee,not-an-email,12345,99/99/2010,0821234567\n";

        let parsed = parse_student_csv(csv, &settings());

        assert!(parsed.rows.is_empty());
        let messages: Vec<&str> = parsed.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Invalid email address", "Invalid phone number", "Invalid date of birth"]
        );
        assert!(parsed.errors.iter().all(|e| e.row == 2));
    }

    #[test]
    fn missing_required_column_aborts_with_row_zero() {
        let parsed = parse_student_csv("first_name,email\nJane,jane@example.com\n", &settings());

        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].row, 0);
        assert!(parsed.errors[0].message.contains("last_name"));
        assert!(parsed.rejected());
    }

    #[test]
    fn empty_upload_is_rejected() {
        let parsed = parse_student_csv("\n  \n", &settings());
        assert!(parsed.rejected());
    }

    #[test]
    fn blank_lines_bom_and_crlf_are_tolerated() {
        let csv = "\u{feff}First Name,Last Name,Favourite Colour\r\n\r\nJane,Doe,blue\r\n";

        let parsed = parse_student_csv(csv, &settings());

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].row, 3);
        assert_eq!(parsed.rows[0].last_name, "Doe");
        assert_eq!(parsed.unmapped_headers, vec!["Favourite Colour"]);
    }

    #[test]
    fn template_is_a_valid_upload_in_every_region() {
        let template = template_csv();
        assert!(template.starts_with("first_name,last_name,email,phone,date_of_birth"));

        for phone_region in [PhoneRegion::Za, PhoneRegion::International] {
            for date_order in [DateOrder::DayFirst, DateOrder::MonthFirst] {
                let settings = BillingSettings {
                    phone_region,
                    date_order,
                    ..BillingSettings::default()
                };

                let parsed = parse_student_csv(&template, &settings);

                assert!(parsed.errors.is_empty(), "{phone_region:?}/{date_order:?}: {:?}", parsed.errors);
                assert_eq!(parsed.rows.len(), 1);
                assert_eq!(parsed.rows[0].phone.as_deref(), Some("+27821234567"));
                assert_eq!(parsed.rows[0].date_of_birth, Some(date(2010, 5, 15)));
                assert_eq!(parsed.rows[0].address.as_deref(), Some("12 Main Road, Durban"));
                assert_eq!(parsed.rows[0].parent_phone.as_deref(), Some("+27831234567"));
            }
        }
    }

    #[test]
    fn overlong_values_are_row_errors() {
        let long_name = "a".repeat(256);
        let long_grade = "g".repeat(65);
        let csv = format!(
            "first_name,last_name,grade\n{long_name},Doe,{long_grade}\nJane,Doe,Grade 8\n"
        );

        let parsed = parse_student_csv(&csv, &settings());

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].first_name, "Jane");
        assert_eq!(
            parsed.errors,
            vec![
                ImportRowError::new(2, "First name is too long (max 255 characters)"),
                ImportRowError::new(2, "Grade is too long (max 64 characters)"),
            ]
        );
    }

    #[test]
    fn values_at_the_column_width_are_accepted() {
        let csv = format!("first_name,last_name,grade\n{},Doe,{}\n", "é".repeat(255), "g".repeat(64));

        let parsed = parse_student_csv(&csv, &settings());

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows.len(), 1);
    }
}
