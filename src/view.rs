use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{DashboardSummary, Drive, DriveSummary, ReportRecord, Student};

pub const PAST_DRIVE_MESSAGE: &str = "This drive has already passed and cannot be edited.";

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Error(String),
    Populated(Vec<T>),
    Empty,
}

/// Rows of one screen plus an inline error from the last failed action.
///
/// A failure after a successful load keeps the rows and only sets the
/// inline error, so the screen never loses what it already showed.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    state: ViewState<T>,
    inline_error: Option<String>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            state: ViewState::Loading,
            inline_error: None,
        }
    }
}

impl<T> Collection<T> {
    pub fn state(&self) -> &ViewState<T> {
        &self.state
    }

    pub fn rows(&self) -> &[T] {
        match &self.state {
            ViewState::Populated(rows) => rows,
            _ => &[],
        }
    }

    pub fn load(&mut self, rows: Vec<T>) {
        self.state = if rows.is_empty() {
            ViewState::Empty
        } else {
            ViewState::Populated(rows)
        };
        self.inline_error = None;
    }

    pub fn fail(&mut self, message: String) {
        match self.state {
            ViewState::Loading | ViewState::Error(_) => self.state = ViewState::Error(message),
            ViewState::Populated(_) | ViewState::Empty => self.inline_error = Some(message),
        }
    }

    pub fn set_inline_error(&mut self, message: String) {
        self.inline_error = Some(message);
    }

    pub fn inline_error(&self) -> Option<&str> {
        self.inline_error.as_deref()
    }

    /// Message of a load that failed before any rows were shown.
    pub fn load_error(&self) -> Option<&str> {
        match &self.state {
            ViewState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// At most one record is being edited at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSlot<F> {
    current: Option<(i64, F)>,
}

impl<F> Default for EditSlot<F> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<F> EditSlot<F> {
    /// Opening a new context replaces whatever was open before.
    pub fn open(&mut self, id: i64, form: F) {
        self.current = Some((id, form));
    }

    pub fn editing_id(&self) -> Option<i64> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    pub fn form(&self) -> Option<&F> {
        self.current.as_ref().map(|(_, form)| form)
    }

    pub fn form_mut(&mut self) -> Option<&mut F> {
        self.current.as_mut().map(|(_, form)| form)
    }

    pub fn close(&mut self) {
        self.current = None;
    }
}

pub fn can_mark_vaccinated(student: &Student, selected_drive: Option<i64>) -> bool {
    !student.vaccinated && selected_drive.is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditControl {
    pub enabled: bool,
    pub label: &'static str,
}

pub fn drive_edit_control(drive: &Drive, today: NaiveDate) -> EditControl {
    if drive.is_past(today) {
        EditControl {
            enabled: false,
            label: "Cannot Edit",
        }
    } else {
        EditControl {
            enabled: true,
            label: "Edit",
        }
    }
}

fn student_actions(student: &Student, selected_drive: Option<i64>) -> String {
    let mut actions = Vec::with_capacity(3);
    if can_mark_vaccinated(student, selected_drive) {
        actions.push("Mark Vaccinated");
    }
    actions.push("Edit");
    actions.push("Delete");
    actions.join(" / ")
}

/// Column-aligned plain text table.
struct TextTable {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn render(&self, output: &mut String) {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: Vec<&str>| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<w$}", cell, w = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let _ = writeln!(output, "{}", line(self.headers.clone()));
        let _ = writeln!(
            output,
            "{}",
            widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("-+-")
        );
        for row in &self.rows {
            let _ = writeln!(output, "{}", line(row.iter().map(String::as_str).collect()));
        }
    }
}

fn render_inline_error<T>(output: &mut String, collection: &Collection<T>) {
    if let Some(message) = collection.inline_error() {
        let _ = writeln!(output, "! {message}");
    }
}

fn render_drive_options(output: &mut String, drives: &[DriveSummary], selected: Option<i64>) {
    if drives.is_empty() {
        let _ = writeln!(output, "Drive: none available");
        return;
    }
    let options: Vec<String> = drives
        .iter()
        .map(|drive| {
            let marker = if selected == Some(drive.id) { "*" } else { "" };
            format!("{marker}[{}] {} on {}", drive.id, drive.vaccine, drive.date)
        })
        .collect();
    let _ = writeln!(output, "Drive: {}", options.join(", "));
}

pub fn render_students(
    students: &Collection<Student>,
    drive_options: &[DriveSummary],
    selected_drive: Option<i64>,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Student Management");
    render_drive_options(&mut output, drive_options, selected_drive);

    match students.state() {
        ViewState::Loading => {
            let _ = writeln!(output, "Loading students...");
        }
        ViewState::Error(message) => {
            let _ = writeln!(output, "{message}");
        }
        ViewState::Empty => {
            let _ = writeln!(output, "No students found.");
        }
        ViewState::Populated(rows) => {
            let mut table = TextTable::new(&["Id", "Name", "Class", "Student ID", "Vaccinated", "Action"]);
            for student in rows {
                table.push(vec![
                    student.id.to_string(),
                    student.name.clone(),
                    student.class.clone(),
                    student.student_id.clone(),
                    if student.vaccinated { "Yes" } else { "No" }.to_string(),
                    student_actions(student, selected_drive),
                ]);
            }
            table.render(&mut output);
        }
    }

    render_inline_error(&mut output, students);
    output
}

pub fn render_drives(drives: &Collection<Drive>, today: NaiveDate) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Upcoming Vaccination Drives");

    match drives.state() {
        ViewState::Loading => {
            let _ = writeln!(output, "Loading vaccination drives...");
        }
        ViewState::Error(message) => {
            let _ = writeln!(output, "{message}");
        }
        ViewState::Empty => {
            let _ = writeln!(output, "No upcoming drives scheduled.");
        }
        ViewState::Populated(rows) => {
            let mut table = TextTable::new(&[
                "Id",
                "Vaccine",
                "Date",
                "Available Doses",
                "Applicable Classes",
                "Actions",
            ]);
            for drive in rows {
                table.push(vec![
                    drive.id.to_string(),
                    drive.vaccine_name.clone(),
                    drive.date.to_string(),
                    drive.available_doses.to_string(),
                    drive.applicable_classes.join(", "),
                    drive_edit_control(drive, today).label.to_string(),
                ]);
            }
            table.render(&mut output);
        }
    }

    render_inline_error(&mut output, drives);
    output
}

pub fn render_report(
    records: &Collection<ReportRecord>,
    vaccines: &[String],
    selected_vaccine: Option<&str>,
    page: u32,
    total_pages: u32,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Vaccination Report");
    if !vaccines.is_empty() {
        let options: Vec<String> = vaccines
            .iter()
            .map(|name| {
                if selected_vaccine == Some(name.as_str()) {
                    format!("*{name}")
                } else {
                    name.clone()
                }
            })
            .collect();
        let _ = writeln!(output, "Vaccine: {}", options.join(", "));
    }

    match records.state() {
        ViewState::Loading => {
            let _ = writeln!(output, "Loading vaccination report...");
        }
        ViewState::Error(message) => {
            let _ = writeln!(output, "{message}");
        }
        ViewState::Empty | ViewState::Populated(_) => {
            let mut table = TextTable::new(&["Student Name", "Class", "Vaccine Name", "Date Vaccinated"]);
            for record in records.rows() {
                table.push(vec![
                    record.student_name.clone(),
                    record.class.clone(),
                    record.vaccine_name.clone(),
                    record.date_vaccinated.clone(),
                ]);
            }
            table.render(&mut output);
            if records.rows().is_empty() {
                let _ = writeln!(output, "No records found.");
            }
            let _ = writeln!(output);
            let _ = writeln!(output, "Page {page} of {total_pages}");
        }
    }

    render_inline_error(&mut output, records);
    output
}

fn render_drive_summaries(output: &mut String, heading: &str, drives: &[DriveSummary], empty: &str) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {heading}");
    if drives.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }
    for drive in drives {
        let _ = writeln!(output, "- {} on {}", drive.vaccine, drive.date);
    }
}

pub fn render_dashboard(summary: &DashboardSummary) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Dashboard");
    let _ = writeln!(output, "Total Students: {}", summary.total_students);
    let _ = writeln!(output, "Vaccinated Students: {}", summary.vaccinated_students);
    let _ = writeln!(output, "Vaccination %: {:.1}%", summary.percentage_vaccinated);

    render_drive_summaries(
        &mut output,
        "Ongoing Vaccination Drives",
        &summary.ongoing_drives,
        "No ongoing drives today",
    );
    render_drive_summaries(
        &mut output,
        "Upcoming Vaccination Drives",
        &summary.upcoming_drives,
        "No upcoming drives",
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: i64, vaccinated: bool) -> Student {
        Student {
            id,
            name: format!("Student {id}"),
            class: "Grade 1".to_string(),
            student_id: format!("S-{id:03}"),
            vaccinated,
        }
    }

    fn drive_on(date: NaiveDate) -> Drive {
        Drive {
            id: 1,
            vaccine_name: "MMR".to_string(),
            date,
            available_doses: 30,
            applicable_classes: vec!["Grade 1".to_string(), "Grade 2".to_string()],
        }
    }

    #[test]
    fn mark_vaccinated_needs_unvaccinated_row_and_selected_drive() {
        assert!(can_mark_vaccinated(&student(1, false), Some(3)));
        assert!(!can_mark_vaccinated(&student(1, false), None));
        assert!(!can_mark_vaccinated(&student(1, true), Some(3)));
        assert!(!can_mark_vaccinated(&student(1, true), None));
    }

    #[test]
    fn edit_control_is_disabled_for_past_drives_only() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let yesterday = today.pred_opt().unwrap();
        let tomorrow = today.succ_opt().unwrap();

        let past = drive_edit_control(&drive_on(yesterday), today);
        assert!(!past.enabled);
        assert_eq!(past.label, "Cannot Edit");

        assert!(drive_edit_control(&drive_on(today), today).enabled);
        assert_eq!(drive_edit_control(&drive_on(tomorrow), today).label, "Edit");
    }

    #[test]
    fn failure_after_load_keeps_rows() {
        let mut collection = Collection::default();
        collection.fail("Could not load students.".to_string());
        assert_eq!(
            collection.state(),
            &ViewState::Error("Could not load students.".to_string())
        );

        collection.load(vec![student(1, false)]);
        collection.fail("Could not load students.".to_string());
        assert_eq!(collection.rows().len(), 1);
        assert_eq!(collection.inline_error(), Some("Could not load students."));

        collection.load(Vec::new());
        assert_eq!(collection.state(), &ViewState::Empty);
        assert!(collection.inline_error().is_none());
    }

    #[test]
    fn opening_an_edit_replaces_the_previous_one() {
        let mut slot = EditSlot::default();
        slot.open(1, "first".to_string());
        slot.open(2, "second".to_string());
        assert_eq!(slot.editing_id(), Some(2));
        assert_eq!(slot.form().map(String::as_str), Some("second"));
        slot.close();
        assert_eq!(slot.editing_id(), None);
        assert!(slot.form().is_none());
    }

    #[test]
    fn student_table_shows_mark_vaccinated_only_where_allowed() {
        let mut collection = Collection::default();
        collection.load(vec![student(1, false), student(2, true)]);

        let with_drive = render_students(&collection, &[], Some(9));
        let lines: Vec<&str> = with_drive.lines().collect();
        assert!(lines.iter().any(|l| l.contains("S-001") && l.contains("Mark Vaccinated")));
        assert!(lines.iter().any(|l| l.contains("S-002") && !l.contains("Mark Vaccinated")));

        let without_drive = render_students(&collection, &[], None);
        assert!(!without_drive.contains("Mark Vaccinated"));
        assert!(without_drive.contains("Drive: none available"));
    }

    #[test]
    fn empty_report_keeps_header_and_footer() {
        let mut collection: Collection<ReportRecord> = Collection::default();
        collection.load(Vec::new());
        let text = render_report(&collection, &[], None, 1, 1);
        assert!(text.contains("Student Name"));
        assert!(!text.contains("Vaccine:"));
        assert!(text.contains("No records found."));
        assert!(text.contains("Page 1 of 1"));
    }

    #[test]
    fn option_lists_mark_the_current_choice() {
        let mut students = Collection::default();
        students.load(vec![student(1, false)]);
        let drives = vec![
            DriveSummary {
                id: 4,
                vaccine: "Polio".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            },
            DriveSummary {
                id: 5,
                vaccine: "MMR".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 11, 9).unwrap(),
            },
        ];
        let text = render_students(&students, &drives, Some(5));
        assert!(text.contains("Drive: [4] Polio on 2026-11-02, *[5] MMR on 2026-11-09"));

        let mut records: Collection<ReportRecord> = Collection::default();
        records.load(Vec::new());
        let vaccines = vec!["MMR".to_string(), "Polio".to_string()];
        let text = render_report(&records, &vaccines, Some("Polio"), 1, 0);
        assert!(text.contains("Vaccine: MMR, *Polio"));
    }

    #[test]
    fn load_error_only_reports_failed_first_load() {
        let mut collection: Collection<Student> = Collection::default();
        collection.fail("Could not load students.".to_string());
        assert_eq!(collection.load_error(), Some("Could not load students."));

        collection.load(vec![student(1, true)]);
        collection.fail("Could not load students.".to_string());
        assert_eq!(collection.load_error(), None);
    }

    #[test]
    fn dashboard_percentage_has_one_decimal() {
        let summary = DashboardSummary {
            total_students: 3,
            vaccinated_students: 1,
            percentage_vaccinated: 33.333_333,
            ongoing_drives: Vec::new(),
            upcoming_drives: vec![DriveSummary {
                id: 4,
                vaccine: "Polio".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            }],
        };
        let text = render_dashboard(&summary);
        assert!(text.contains("Vaccination %: 33.3%"));
        assert!(text.contains("No ongoing drives today"));
        assert!(text.contains("- Polio on 2026-11-02"));
    }
}
