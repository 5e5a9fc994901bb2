use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::api::{self, ApiRequest, Backend};
use crate::error::ApiError;
use crate::export::{self, ExportFormat};
use crate::models::{
    DashboardSummary, Drive, DriveForm, DriveSummary, ReportPage, ReportRecord, Student,
    StudentForm,
};
use crate::query::{
    FetchTicket, ReportFilters, ReportQuery, Sequencer, StudentFilters, StudentQuery,
    VaccinatedFilter,
};
use crate::view::{self, Collection, EditControl, EditSlot, PAST_DRIVE_MESSAGE};

pub const MISSING_FIELDS: &str = "Please fill in all fields.";
pub const NO_DRIVE_SELECTED: &str = "Select a drive before marking students vaccinated.";
pub const NO_FILE_SELECTED: &str = "Please choose a CSV file to upload.";

const LOAD_STUDENTS_FAILED: &str = "Could not load students.";
const SAVE_STUDENT_FAILED: &str = "Could not save student.";
const LOAD_DRIVES_FAILED: &str = "Could not load vaccination drives.";
const SAVE_DRIVE_FAILED: &str = "Error saving vaccination drive.";
const LOAD_REPORT_FAILED: &str = "Could not load vaccination report.";
const LOAD_DASHBOARD_FAILED: &str = "Error loading dashboard.";

/// Student list with filters, drive selection and row actions.
pub struct StudentScreen<'a, B> {
    backend: &'a B,
    query: StudentQuery,
    students: Collection<Student>,
    drive_options: Vec<DriveSummary>,
    editor: EditSlot<StudentForm>,
}

impl<'a, B: Backend> StudentScreen<'a, B> {
    pub fn new(backend: &'a B, filters: StudentFilters) -> Self {
        Self {
            backend,
            query: StudentQuery::new(filters),
            students: Collection::default(),
            drive_options: Vec::new(),
            editor: EditSlot::default(),
        }
    }

    /// Loads the drive options, then the list for the initial filters.
    ///
    /// An initial drive that is not on offer fails before the list is fetched.
    pub async fn mount(&mut self) -> Result<(), ApiError> {
        match api::fetch::<DashboardSummary, _>(self.backend, &ApiRequest::dashboard()).await {
            Ok(summary) => self.drive_options = summary.upcoming_drives,
            Err(err) => log::warn!("could not load drive options: {err}"),
        }
        if let Err(err) = self.check_drive(self.query.selected_drive()) {
            self.students.fail(err.user_message(LOAD_STUDENTS_FAILED));
            return Err(err);
        }
        let ticket = self.query.refresh();
        self.run(ticket).await;
        Ok(())
    }

    pub fn students(&self) -> &Collection<Student> {
        &self.students
    }

    /// Only drives from the loaded options can be selected.
    fn check_drive(&self, drive_id: Option<i64>) -> Result<(), ApiError> {
        match drive_id {
            Some(id) if !self.drive_options.iter().any(|drive| drive.id == id) => Err(
                ApiError::precondition(format!("Drive {id} is not an upcoming drive.")),
            ),
            _ => Ok(()),
        }
    }

    pub async fn run(&mut self, ticket: FetchTicket) {
        let result = api::fetch(self.backend, &ticket.request).await;
        self.apply(ticket.seq, result);
    }

    /// Stores a list result unless a newer fetch has been issued since.
    pub fn apply(&mut self, seq: u64, result: Result<Vec<Student>, ApiError>) -> bool {
        if !self.query.accepts(seq) {
            log::warn!("discarding superseded student list #{seq}");
            return false;
        }
        match result {
            Ok(rows) => self.students.load(rows),
            Err(err) => self.students.fail(err.user_message(LOAD_STUDENTS_FAILED)),
        }
        true
    }

    async fn run_if(&mut self, ticket: Option<FetchTicket>) {
        if let Some(ticket) = ticket {
            self.run(ticket).await;
        }
    }

    pub async fn set_name(&mut self, name: &str) {
        let ticket = self.query.set_name(name);
        self.run_if(ticket).await;
    }

    pub async fn set_class(&mut self, class: &str) {
        let ticket = self.query.set_class(class);
        self.run_if(ticket).await;
    }

    pub async fn set_vaccinated(&mut self, vaccinated: VaccinatedFilter) {
        let ticket = self.query.set_vaccinated(vaccinated);
        self.run_if(ticket).await;
    }

    pub async fn select_drive(&mut self, drive_id: Option<i64>) -> Result<(), ApiError> {
        if let Err(err) = self.check_drive(drive_id) {
            self.students.set_inline_error(err.user_message(LOAD_STUDENTS_FAILED));
            return Err(err);
        }
        let ticket = self.query.select_drive(drive_id);
        self.run_if(ticket).await;
        Ok(())
    }

    pub async fn search(&mut self) {
        let ticket = self.query.refresh();
        self.run(ticket).await;
    }

    /// Sends one mutation and reads the whole list back on success.
    async fn mutate(
        &mut self,
        request: Result<ApiRequest, ApiError>,
        fallback: &str,
    ) -> Result<(), ApiError> {
        let outcome = match request {
            Ok(request) => api::execute(self.backend, &request).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => {
                self.search().await;
                Ok(())
            }
            Err(err) => {
                self.students.set_inline_error(err.user_message(fallback));
                Err(err)
            }
        }
    }

    pub async fn add_student(&mut self, form: &StudentForm) -> Result<(), ApiError> {
        let request = if form.is_complete() {
            Ok(ApiRequest::create_student(form))
        } else {
            Err(ApiError::precondition(MISSING_FIELDS))
        };
        self.mutate(request, SAVE_STUDENT_FAILED).await
    }

    pub fn begin_edit(&mut self, id: i64) -> Result<(), ApiError> {
        let student = self
            .students
            .rows()
            .iter()
            .find(|student| student.id == id)
            .ok_or_else(|| ApiError::precondition(format!("Student {id} is not in the list.")))?;
        self.editor.open(id, StudentForm::from_student(student));
        Ok(())
    }

    pub fn edit_form_mut(&mut self) -> Option<&mut StudentForm> {
        self.editor.form_mut()
    }

    pub async fn save_edit(&mut self) -> Result<(), ApiError> {
        let request = match (self.editor.editing_id(), self.editor.form()) {
            (Some(id), Some(form)) if form.is_complete() => Ok(ApiRequest::update_student(id, form)),
            (Some(_), Some(_)) => Err(ApiError::precondition(MISSING_FIELDS)),
            _ => Err(ApiError::precondition("No student is being edited.")),
        };
        self.mutate(request, SAVE_STUDENT_FAILED).await?;
        self.editor.close();
        Ok(())
    }

    pub async fn delete_student(&mut self, id: i64) -> Result<(), ApiError> {
        self.mutate(Ok(ApiRequest::delete_student(id)), SAVE_STUDENT_FAILED)
            .await
    }

    /// Bulk import; the server accepts or rejects the file as a whole.
    pub async fn import_csv(&mut self, file: Option<(String, Vec<u8>)>) -> Result<(), ApiError> {
        let request = match file {
            Some((file_name, bytes)) => Ok(ApiRequest::upload_students(file_name, bytes)),
            None => Err(ApiError::precondition(NO_FILE_SELECTED)),
        };
        self.mutate(request, SAVE_STUDENT_FAILED).await
    }

    pub async fn vaccinate(&mut self, id: i64) -> Result<(), ApiError> {
        let drive = self.query.selected_drive();
        let request = match (drive, self.students.rows().iter().find(|s| s.id == id)) {
            (None, _) => Err(ApiError::precondition(NO_DRIVE_SELECTED)),
            (Some(drive_id), _) if self.check_drive(Some(drive_id)).is_err() => {
                Err(ApiError::precondition(format!("Drive {drive_id} is not an upcoming drive.")))
            }
            (Some(drive_id), Some(student)) if view::can_mark_vaccinated(student, drive) => {
                Ok(ApiRequest::vaccinate(id, drive_id))
            }
            (Some(_), Some(student)) => Err(ApiError::precondition(format!(
                "{} is already vaccinated for this drive.",
                student.name
            ))),
            (Some(_), None) => Err(ApiError::precondition(format!(
                "Student {id} is not in the list."
            ))),
        };
        self.mutate(request, SAVE_STUDENT_FAILED).await
    }

    pub fn render(&self) -> String {
        view::render_students(&self.students, &self.drive_options, self.query.selected_drive())
    }
}

/// Upcoming drives plus the create/edit form.
pub struct DriveScreen<'a, B> {
    backend: &'a B,
    today: NaiveDate,
    seq: Sequencer,
    drives: Collection<Drive>,
    form: DriveForm,
    editing: Option<i64>,
    form_error: Option<String>,
}

impl<'a, B: Backend> DriveScreen<'a, B> {
    pub fn new(backend: &'a B, today: NaiveDate) -> Self {
        Self {
            backend,
            today,
            seq: Sequencer::default(),
            drives: Collection::default(),
            form: DriveForm::default(),
            editing: None,
            form_error: None,
        }
    }

    pub async fn refresh(&mut self) {
        let seq = self.seq.next();
        let result = api::fetch(self.backend, &ApiRequest::upcoming_drives()).await;
        self.apply(seq, result);
    }

    pub fn apply(&mut self, seq: u64, result: Result<Vec<Drive>, ApiError>) -> bool {
        if !self.seq.is_current(seq) {
            log::warn!("discarding superseded drive list #{seq}");
            return false;
        }
        match result {
            Ok(rows) => self.drives.load(rows),
            Err(err) => self.drives.fail(err.user_message(LOAD_DRIVES_FAILED)),
        }
        true
    }

    pub fn drives(&self) -> &Collection<Drive> {
        &self.drives
    }

    pub fn form_mut(&mut self) -> &mut DriveForm {
        &mut self.form
    }

    pub fn edit_control(&self, drive: &Drive) -> EditControl {
        view::drive_edit_control(drive, self.today)
    }

    /// Loads a drive into the form; past drives stay read-only.
    pub fn begin_edit(&mut self, id: i64) -> Result<(), ApiError> {
        let drive = self
            .drives
            .rows()
            .iter()
            .find(|drive| drive.id == id)
            .ok_or_else(|| ApiError::precondition(format!("Drive {id} is not listed.")))?;
        if !self.edit_control(drive).enabled {
            return Err(ApiError::precondition(PAST_DRIVE_MESSAGE));
        }
        self.form = DriveForm::from_drive(drive);
        self.editing = Some(id);
        self.form_error = None;
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.form = DriveForm::default();
        self.editing = None;
        self.form_error = None;
    }

    /// Creates or updates depending on edit mode; incomplete forms never leave the client.
    pub async fn submit(&mut self) -> Result<(), ApiError> {
        self.form_error = None;
        let Some(payload) = self.form.payload() else {
            self.form_error = Some(MISSING_FIELDS.to_string());
            return Err(ApiError::precondition(MISSING_FIELDS));
        };
        let request = match self.editing {
            Some(id) => ApiRequest::update_drive(id, &payload),
            None => ApiRequest::create_drive(&payload),
        };

        if let Err(err) = api::execute(self.backend, &request).await {
            self.form_error = Some(err.user_message(SAVE_DRIVE_FAILED));
            return Err(err);
        }

        let verb = if self.editing.is_some() { "updated" } else { "created" };
        log::info!("drive {verb}: {} on {}", payload.vaccine_name, payload.date);
        self.cancel_edit();
        self.refresh().await;
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut output = view::render_drives(&self.drives, self.today);
        if let Some(message) = &self.form_error {
            output.push_str(&format!("! {message}\n"));
        }
        output
    }
}

/// One page of the vaccination report and its filters.
pub struct ReportScreen<'a, B> {
    backend: &'a B,
    query: ReportQuery,
    records: Collection<ReportRecord>,
    vaccines: Vec<String>,
    total_items: Option<u64>,
}

impl<'a, B: Backend> ReportScreen<'a, B> {
    pub fn new(backend: &'a B, filters: ReportFilters) -> Self {
        Self {
            backend,
            query: ReportQuery::new(filters),
            records: Collection::default(),
            vaccines: Vec::new(),
            total_items: None,
        }
    }

    pub async fn mount(&mut self) {
        match api::fetch::<Vec<String>, _>(self.backend, &ApiRequest::vaccines()).await {
            Ok(vaccines) => self.vaccines = vaccines,
            Err(err) => log::warn!("could not load vaccine names: {err}"),
        }
        let ticket = self.query.refresh();
        self.run(ticket).await;
    }

    pub async fn run(&mut self, ticket: FetchTicket) {
        let result = api::fetch(self.backend, &ticket.request).await;
        self.apply(ticket.seq, result);
    }

    pub fn apply(&mut self, seq: u64, result: Result<ReportPage, ApiError>) -> bool {
        if !self.query.accepts(seq) {
            log::warn!("discarding superseded report page #{seq}");
            return false;
        }
        match result {
            Ok(page) => {
                self.query.accept(seq, page.total_pages, page.page);
                self.total_items = page.total_items;
                self.records.load(page.records);
            }
            Err(err) => self.records.fail(err.user_message(LOAD_REPORT_FAILED)),
        }
        true
    }

    async fn run_if(&mut self, ticket: Option<FetchTicket>) -> bool {
        match ticket {
            Some(ticket) => {
                self.run(ticket).await;
                true
            }
            None => false,
        }
    }

    pub async fn set_vaccine(&mut self, vaccine_name: Option<&str>) -> bool {
        let ticket = self.query.set_vaccine_name(vaccine_name);
        self.run_if(ticket).await
    }

    pub async fn set_limit(&mut self, limit: u32) -> bool {
        let ticket = self.query.set_limit(limit);
        self.run_if(ticket).await
    }

    /// Returns false when the page is out of range and nothing happened.
    pub async fn go_to_page(&mut self, page: u32) -> bool {
        let ticket = self.query.go_to_page(page);
        self.run_if(ticket).await
    }

    pub async fn next_page(&mut self) -> bool {
        let ticket = self.query.next_page();
        self.run_if(ticket).await
    }

    pub async fn previous_page(&mut self) -> bool {
        let ticket = self.query.previous_page();
        self.run_if(ticket).await
    }

    pub fn page(&self) -> u32 {
        self.query.page()
    }

    pub fn total_pages(&self) -> u32 {
        self.query.total_pages()
    }

    pub fn total_items(&self) -> Option<u64> {
        self.total_items
    }

    pub fn records(&self) -> &Collection<ReportRecord> {
        &self.records
    }

    /// Exports exactly the rows currently on screen.
    pub fn export(&self, dir: &Path, formats: &[ExportFormat]) -> anyhow::Result<Vec<PathBuf>> {
        export::write_exports(dir, formats, self.records.rows())
    }

    pub fn render(&self) -> String {
        view::render_report(
            &self.records,
            &self.vaccines,
            self.query.filters().vaccine_name.as_deref(),
            self.query.page(),
            self.query.total_pages(),
        )
    }
}

pub async fn load_dashboard<B: Backend>(backend: &B) -> Result<DashboardSummary, String> {
    api::fetch(backend, &ApiRequest::dashboard())
        .await
        .map_err(|err| err.user_message(LOAD_DASHBOARD_FAILED))
}

/// Full report as CSV, rendered by the server over every page.
pub async fn download_report<B: Backend>(
    backend: &B,
    vaccine_name: Option<&str>,
) -> Result<Vec<u8>, ApiError> {
    backend.send(&ApiRequest::report_export(vaccine_name)).await
}
