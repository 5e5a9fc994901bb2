//! In-memory backend shared by the screen and browse tests.

use std::cell::RefCell;

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::api::{ApiRequest, Backend, Body, Method};
use crate::error::ApiError;
use crate::models::{Drive, ReportRecord, Student};

/// In-memory stand-in for the school backend.
#[derive(Default)]
pub struct FakeSchool {
    pub students: RefCell<Vec<Student>>,
    pub vaccinations: RefCell<Vec<(i64, i64)>>,
    pub drives: RefCell<Vec<Drive>>,
    pub records: RefCell<Vec<ReportRecord>>,
    pub sent: RefCell<Vec<ApiRequest>>,
    pub offline: RefCell<bool>,
}

pub fn param<'r>(request: &'r ApiRequest, key: &str) -> &'r str {
    request
        .query
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

fn json_body(request: &ApiRequest) -> Value {
    match &request.body {
        Body::Json(value) => value.clone(),
        _ => Value::Null,
    }
}

fn rejected(request: &ApiRequest, status: u16, message: &str) -> ApiError {
    ApiError::Rejected {
        path: request.path.clone(),
        status,
        message: Some(message.to_string()),
    }
}

impl FakeSchool {
    pub fn with_students(students: &[(&str, &str, bool)]) -> Self {
        let school = Self::default();
        school.drives.borrow_mut().push(Drive {
            id: 1,
            vaccine_name: "MMR".to_string(),
            date: NaiveDate::from_ymd_opt(2030, 1, 10).unwrap(),
            available_doses: 100,
            applicable_classes: vec!["Grade 1".to_string()],
        });
        for (index, (name, class, vaccinated)) in students.iter().enumerate() {
            let id = index as i64 + 1;
            school.students.borrow_mut().push(Student {
                id,
                name: name.to_string(),
                class: class.to_string(),
                student_id: format!("S-{id:03}"),
                vaccinated: false,
            });
            if *vaccinated {
                school.vaccinations.borrow_mut().push((id, 1));
            }
        }
        school
    }

    pub fn sent_count(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn last_sent(&self) -> ApiRequest {
        self.sent.borrow().last().cloned().expect("a request was sent")
    }

    fn list_students(&self, request: &ApiRequest) -> Value {
        let name = param(request, "name").to_lowercase();
        let class = param(request, "studentClass").to_lowercase();
        let vaccinated = param(request, "vaccinated");
        let drive: Option<i64> = param(request, "drive_id").parse().ok();
        let vaccinations = self.vaccinations.borrow();

        let rows: Vec<Value> = self
            .students
            .borrow()
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&name))
            .filter(|s| s.class.to_lowercase().contains(&class))
            .filter_map(|s| {
                let done = vaccinations
                    .iter()
                    .any(|(student, d)| *student == s.id && drive.map_or(true, |id| id == *d));
                match vaccinated {
                    "true" if !done => None,
                    "false" if done => None,
                    _ => Some(json!({
                        "id": s.id,
                        "name": s.name,
                        "class": s.class,
                        "student_id": s.student_id,
                        "vaccinated": done,
                    })),
                }
            })
            .collect();
        json!(rows)
    }

    fn route(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["students"]) => Ok(self.list_students(request)),
            (Method::Post, ["students"]) => {
                let body = json_body(request);
                let mut students = self.students.borrow_mut();
                let id = students.len() as i64 + 1;
                students.push(Student {
                    id,
                    name: body["name"].as_str().unwrap_or_default().to_string(),
                    class: body["student_class"].as_str().unwrap_or_default().to_string(),
                    student_id: body["student_id"].as_str().unwrap_or_default().to_string(),
                    vaccinated: false,
                });
                Ok(json!({ "message": "Student added successfully." }))
            }
            (Method::Put, ["students", id]) => {
                let body = json_body(request);
                let id: i64 = id.parse().unwrap();
                let mut students = self.students.borrow_mut();
                let student = students
                    .iter_mut()
                    .find(|s| s.id == id)
                    .ok_or_else(|| rejected(request, 404, "Student not found"))?;
                student.name = body["name"].as_str().unwrap_or_default().to_string();
                student.class = body["student_class"].as_str().unwrap_or_default().to_string();
                Ok(json!({ "message": "Student updated successfully" }))
            }
            (Method::Delete, ["students", id]) => {
                let id: i64 = id.parse().unwrap();
                self.students.borrow_mut().retain(|s| s.id != id);
                Ok(json!({ "message": "Student deleted successfully" }))
            }
            (Method::Post, ["students", "upload"]) => match &request.body {
                Body::File { bytes, .. } => {
                    let text = String::from_utf8(bytes.clone()).unwrap();
                    let mut students = self.students.borrow_mut();
                    for line in text.lines().skip(1) {
                        let cells: Vec<&str> = line.split(',').collect();
                        let id = students.len() as i64 + 1;
                        students.push(Student {
                            id,
                            name: cells[0].to_string(),
                            class: cells[2].to_string(),
                            student_id: cells[1].to_string(),
                            vaccinated: false,
                        });
                    }
                    Ok(json!({ "message": "Students uploaded successfully" }))
                }
                _ => Err(rejected(request, 400, "No file part")),
            },
            (Method::Post, ["students", id, "vaccinate"]) => {
                let id: i64 = id.parse().unwrap();
                let drive = json_body(request)["drive_id"].as_i64().unwrap();
                let mut vaccinations = self.vaccinations.borrow_mut();
                if vaccinations.contains(&(id, drive)) {
                    return Err(rejected(request, 400, "Student already vaccinated for this drive."));
                }
                vaccinations.push((id, drive));
                Ok(json!({ "message": "Student vaccinated successfully." }))
            }
            (Method::Get, ["drives", "upcoming"]) => {
                let rows: Vec<Value> = self
                    .drives
                    .borrow()
                    .iter()
                    .map(|d| {
                        json!({
                            "id": d.id,
                            "vaccine_name": d.vaccine_name,
                            "date": d.date.to_string(),
                            "available_doses": d.available_doses,
                            "applicable_classes": d.applicable_classes,
                        })
                    })
                    .collect();
                Ok(json!(rows))
            }
            (Method::Post, ["drives"]) => {
                let body = json_body(request);
                let date: NaiveDate = body["date"].as_str().unwrap().parse().unwrap();
                let mut drives = self.drives.borrow_mut();
                if drives.iter().any(|d| d.date == date) {
                    return Err(rejected(
                        request,
                        400,
                        "Another drive is already scheduled on this date.",
                    ));
                }
                let id = drives.len() as i64 + 1;
                drives.push(Drive {
                    id,
                    vaccine_name: body["vaccine_name"].as_str().unwrap().to_string(),
                    date,
                    available_doses: body["available_doses"].as_u64().unwrap() as u32,
                    applicable_classes: serde_json::from_value(body["applicable_classes"].clone())
                        .unwrap(),
                });
                Ok(json!({ "message": "Drive created." }))
            }
            (Method::Put, ["drives", id]) => {
                let id: i64 = id.parse().unwrap();
                let body = json_body(request);
                let mut drives = self.drives.borrow_mut();
                let drive = drives
                    .iter_mut()
                    .find(|d| d.id == id)
                    .ok_or_else(|| rejected(request, 404, "Drive not found."))?;
                drive.available_doses = body["available_doses"].as_u64().unwrap() as u32;
                Ok(json!({ "message": "Drive updated successfully." }))
            }
            (Method::Get, ["dashboard", "overview"]) => {
                let upcoming: Vec<Value> = self
                    .drives
                    .borrow()
                    .iter()
                    .map(|d| json!({ "id": d.id, "vaccine": d.vaccine_name, "date": d.date.to_string() }))
                    .collect();
                Ok(json!({
                    "total_students": self.students.borrow().len(),
                    "vaccinated_students": self.vaccinations.borrow().len(),
                    "percentage_vaccinated": 0.0,
                    "ongoing_drives": [],
                    "upcoming_drives": upcoming,
                }))
            }
            (Method::Get, ["reports"]) => {
                let vaccine = param(request, "vaccine_name").to_lowercase();
                let page: usize = param(request, "page").parse().unwrap();
                let limit: usize = param(request, "limit").parse().unwrap();
                let matching: Vec<ReportRecord> = self
                    .records
                    .borrow()
                    .iter()
                    .filter(|r| r.vaccine_name.to_lowercase().contains(&vaccine))
                    .cloned()
                    .collect();
                let slice: Vec<ReportRecord> = matching
                    .iter()
                    .skip((page - 1) * limit)
                    .take(limit)
                    .cloned()
                    .collect();
                Ok(json!({
                    "records": slice,
                    "page": page,
                    "total_pages": matching.len().div_ceil(limit),
                    "total_items": matching.len(),
                }))
            }
            (Method::Get, ["vaccines"]) => {
                let mut names: Vec<String> = self
                    .drives
                    .borrow()
                    .iter()
                    .map(|d| d.vaccine_name.clone())
                    .collect();
                names.dedup();
                Ok(json!(names))
            }
            _ => Err(rejected(request, 404, "Not found")),
        }
    }
}

impl Backend for FakeSchool {
    async fn send(&self, request: &ApiRequest) -> Result<Vec<u8>, ApiError> {
        self.sent.borrow_mut().push(request.clone());
        if *self.offline.borrow() {
            return Err(ApiError::Transport {
                path: request.path.clone(),
                message: "connection refused".to_string(),
            });
        }
        let value = self.route(request)?;
        Ok(serde_json::to_vec(&value).unwrap())
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub fn report_record(index: usize, vaccine: &str) -> ReportRecord {
    ReportRecord {
        student_name: format!("Student {index}"),
        class: "Grade 2".to_string(),
        vaccine_name: vaccine.to_string(),
        date_vaccinated: "2026-09-01".to_string(),
    }
}
