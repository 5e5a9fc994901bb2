use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{DrivePayload, StudentForm};
use crate::query::{ReportFilters, StudentFilters};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    File {
        field: &'static str,
        file_name: String,
        bytes: Vec<u8>,
    },
}

/// A fully described call against the backend.
///
/// Built by pure constructors so the exact verb, path and parameters can be
/// checked without a network.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Body,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    fn with_json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn login(username: &str, password: &str) -> Self {
        Self::new(Method::Post, "/login")
            .with_json(json!({ "username": username, "password": password }))
    }

    pub fn dashboard() -> Self {
        Self::new(Method::Get, "/dashboard/overview")
    }

    /// Every filter is always sent; an empty value means "no constraint".
    pub fn list_students(filters: &StudentFilters) -> Self {
        let mut request = Self::new(Method::Get, "/students");
        request.query = vec![
            ("name", filters.name.clone()),
            ("studentClass", filters.class.clone()),
            ("vaccinated", filters.vaccinated.as_query().to_string()),
            (
                "drive_id",
                filters.drive_id.map(|id| id.to_string()).unwrap_or_default(),
            ),
        ];
        request
    }

    pub fn create_student(form: &StudentForm) -> Self {
        Self::new(Method::Post, "/students").with_json(json!(form))
    }

    pub fn update_student(id: i64, form: &StudentForm) -> Self {
        Self::new(Method::Put, format!("/students/{id}")).with_json(json!(form))
    }

    pub fn delete_student(id: i64) -> Self {
        Self::new(Method::Delete, format!("/students/{id}"))
    }

    pub fn upload_students(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mut request = Self::new(Method::Post, "/students/upload");
        request.body = Body::File {
            field: "file",
            file_name: file_name.into(),
            bytes,
        };
        request
    }

    pub fn vaccinate(student_id: i64, drive_id: i64) -> Self {
        Self::new(Method::Post, format!("/students/{student_id}/vaccinate"))
            .with_json(json!({ "drive_id": drive_id }))
    }

    pub fn upcoming_drives() -> Self {
        Self::new(Method::Get, "/drives/upcoming")
    }

    pub fn create_drive(payload: &DrivePayload) -> Self {
        Self::new(Method::Post, "/drives").with_json(json!(payload))
    }

    pub fn update_drive(id: i64, payload: &DrivePayload) -> Self {
        Self::new(Method::Put, format!("/drives/{id}")).with_json(json!(payload))
    }

    pub fn report(filters: &ReportFilters) -> Self {
        let mut request = Self::new(Method::Get, "/reports");
        request.query = vec![
            ("vaccine_name", filters.vaccine_name.clone().unwrap_or_default()),
            ("page", filters.page.to_string()),
            ("limit", filters.limit.to_string()),
        ];
        request
    }

    pub fn report_export(vaccine_name: Option<&str>) -> Self {
        let mut request = Self::new(Method::Get, "/reports/export");
        request.query = vec![("vaccine_name", vaccine_name.unwrap_or_default().to_string())];
        request
    }

    pub fn vaccines() -> Self {
        Self::new(Method::Get, "/vaccines")
    }
}

/// Anything that can execute an [`ApiRequest`] and hand back the raw body.
pub trait Backend {
    async fn send(&self, request: &ApiRequest) -> Result<Vec<u8>, ApiError>;
}

/// Sends `request` and decodes the JSON body into `T`.
pub async fn fetch<T, B>(backend: &B, request: &ApiRequest) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    B: Backend,
{
    let bytes = backend.send(request).await?;
    serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode {
        path: request.path.clone(),
        message: err.to_string(),
    })
}

/// Sends `request` and ignores whatever body comes back.
pub async fn execute<B: Backend>(backend: &B, request: &ApiRequest) -> Result<(), ApiError> {
    backend.send(request).await.map(|_| ())
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Server-supplied text of a failed response: `error`, else `message`.
///
/// Anything that is not a JSON object with string fields yields `None`,
/// leaving the caller's generic message in place.
pub fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.error.or(body.message))
}

/// HTTP implementation of [`Backend`] over a fixed base URL.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    fn transport_error(path: &str, err: reqwest::Error) -> ApiError {
        log::error!("request to {path} failed: {err}");
        ApiError::Transport {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    /// Turns a described call into the HTTP request that will be sent.
    fn build(&self, request: &ApiRequest) -> Result<reqwest::Request, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::File {
                field,
                file_name,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                builder.multipart(reqwest::multipart::Form::new().part(*field, part))
            }
        };
        builder
            .build()
            .map_err(|err| Self::transport_error(&request.path, err))
    }
}

impl Backend for ApiClient {
    async fn send(&self, request: &ApiRequest) -> Result<Vec<u8>, ApiError> {
        let http_request = self.build(request)?;
        log::debug!("{} {}", request.method, http_request.url());

        let response = self
            .http
            .execute(http_request)
            .await
            .map_err(|err| Self::transport_error(&request.path, err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| Self::transport_error(&request.path, err))?;

        if !status.is_success() {
            log::warn!("{} {} rejected with {}", request.method, request.path, status);
            return Err(ApiError::Rejected {
                path: request.path.clone(),
                status: status.as_u16(),
                message: error_message(&bytes),
            });
        }

        Ok(bytes.to_vec())
    }
}
