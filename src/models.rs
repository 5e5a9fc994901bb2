use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Classes a drive can be scheduled for.
pub const SCHOOL_CLASSES: [&str; 4] = ["Grade 1", "Grade 2", "Grade 3", "Grade 4"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub class: String,
    pub student_id: String,
    #[serde(default)]
    pub vaccinated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentForm {
    pub name: String,
    pub student_class: String,
    pub student_id: String,
}

impl StudentForm {
    pub fn from_student(student: &Student) -> Self {
        Self {
            name: student.name.clone(),
            student_class: student.class.clone(),
            student_id: student.student_id.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        [&self.name, &self.student_class, &self.student_id]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Drive {
    pub id: i64,
    pub vaccine_name: String,
    pub date: NaiveDate,
    pub available_doses: u32,
    pub applicable_classes: Vec<String>,
}

impl Drive {
    /// Past drives are read-only.
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.date < today
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriveForm {
    pub vaccine_name: String,
    pub date: Option<NaiveDate>,
    pub available_doses: Option<u32>,
    pub applicable_classes: Vec<String>,
}

impl DriveForm {
    pub fn from_drive(drive: &Drive) -> Self {
        Self {
            vaccine_name: drive.vaccine_name.clone(),
            date: Some(drive.date),
            available_doses: Some(drive.available_doses),
            applicable_classes: drive.applicable_classes.clone(),
        }
    }

    /// Ticks or clears one class; names outside [`SCHOOL_CLASSES`] are ignored.
    pub fn toggle_class(&mut self, class: &str, checked: bool) -> bool {
        if !SCHOOL_CLASSES.contains(&class) {
            return false;
        }
        let present = self.applicable_classes.iter().any(|c| c == class);
        if checked && !present {
            self.applicable_classes.push(class.to_string());
        } else if !checked {
            self.applicable_classes.retain(|c| c != class);
        }
        true
    }

    /// Returns the wire payload once every mandatory field is filled in.
    pub fn payload(&self) -> Option<DrivePayload> {
        if self.vaccine_name.trim().is_empty() || self.applicable_classes.is_empty() {
            return None;
        }
        Some(DrivePayload {
            vaccine_name: self.vaccine_name.trim().to_string(),
            date: self.date?,
            available_doses: self.available_doses?,
            applicable_classes: self.applicable_classes.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrivePayload {
    pub vaccine_name: String,
    pub date: NaiveDate,
    pub available_doses: u32,
    pub applicable_classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub student_name: String,
    pub class: String,
    pub vaccine_name: String,
    pub date_vaccinated: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportPage {
    #[serde(default)]
    pub records: Vec<ReportRecord>,
    pub total_pages: u32,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub total_items: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DriveSummary {
    pub id: i64,
    pub vaccine: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DashboardSummary {
    pub total_students: u64,
    pub vaccinated_students: u64,
    pub percentage_vaccinated: f64,
    #[serde(default)]
    pub ongoing_drives: Vec<DriveSummary>,
    #[serde(default)]
    pub upcoming_drives: Vec<DriveSummary>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginGrant {
    pub token: String,
    #[serde(default)]
    pub role: Option<String>,
}
