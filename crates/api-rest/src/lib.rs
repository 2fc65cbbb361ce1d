//! # API REST
//!
//! REST API implementation for HQM.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation
//! - REST-specific concerns (JSON serialization, CORS, server-sent events)
//!
//! Uses `api-shared` for wire types and the API key check.

#![warn(rust_2018_idioms)]

use api_shared::{
    validate_api_key, AuthError, CreateDepartmentReq, DepartmentRes, ErrorRes, HealthRes,
    HealthService, PatientRes, QueueEventRes, RegisterPatientReq, StatusQuery,
    UpdateDepartmentReq, WaitTimeRes, API_KEY_HEADER,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post, put},
    Router,
};
use hqm_core::{
    config::{
        consultation_minutes_from_env_value, max_conflict_retries_from_env_value,
        serving_policy_from_env_value, store_kind_from_env_value, store_timeout_from_env_value,
    },
    constants::DEFAULT_QUEUE_DATA_DIR,
    open_store, BroadcastNotifier, CoreConfig, DepartmentChanges, ErrorKind, NewPatient,
    PatientStatus, QueueError, QueueServices, RecordId, StoreKind,
};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

/// Default listen address of the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:5001";

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorRes>);

/// Settings resolved from the environment once at startup.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: String,
    pub store: StoreKind,
    pub cfg: CoreConfig,
    pub api_key: Option<String>,
}

impl ServerSettings {
    /// Reads `HQM_REST_ADDR`, `HQM_STORE`, `QUEUE_DATA_DIR`, `HQM_AVG_CONSULTATION_MINUTES`,
    /// `HQM_SERVING_POLICY`, `HQM_MAX_CONFLICT_RETRIES`, `HQM_STORE_TIMEOUT_MS` and `API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidInput` if any value is malformed.
    pub fn from_env() -> hqm_core::QueueResult<Self> {
        let env = |name: &str| std::env::var(name).ok();

        let data_dir = env("QUEUE_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUEUE_DATA_DIR.into());
        let cfg = CoreConfig::new(
            PathBuf::from(data_dir),
            consultation_minutes_from_env_value(env("HQM_AVG_CONSULTATION_MINUTES"))?,
            serving_policy_from_env_value(env("HQM_SERVING_POLICY"))?,
            max_conflict_retries_from_env_value(env("HQM_MAX_CONFLICT_RETRIES"))?,
            store_timeout_from_env_value(env("HQM_STORE_TIMEOUT_MS"))?,
        )?;

        Ok(Self {
            addr: env("HQM_REST_ADDR").unwrap_or_else(|| DEFAULT_REST_ADDR.into()),
            store: store_kind_from_env_value(env("HQM_STORE"))?,
            cfg,
            api_key: env("API_KEY").filter(|k| !k.is_empty()),
        })
    }
}

/// Application state for the REST API server.
#[derive(Clone)]
pub struct AppState {
    pub services: QueueServices,
    pub notifier: Arc<BroadcastNotifier>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        services: QueueServices,
        notifier: Arc<BroadcastNotifier>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            services,
            notifier,
            api_key: api_key.map(Arc::from),
        }
    }

    /// Opens the configured datastore and wires every service to a broadcast notifier.
    pub fn from_settings(settings: &ServerSettings) -> hqm_core::QueueResult<Self> {
        let cfg = Arc::new(settings.cfg.clone());
        let store = open_store(settings.store, &cfg)?;
        let notifier = Arc::new(BroadcastNotifier::default());
        let services = QueueServices::new(store, notifier.clone(), cfg);
        Ok(Self::new(services, notifier, settings.api_key.clone()))
    }

    fn require_staff(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        validate_api_key(self.api_key.as_deref(), provided).map_err(auth_error)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_departments,
        create_department,
        get_department,
        update_department,
        delete_department,
        register_patient,
        list_patients_by_department,
        get_patient_by_token,
        cancel_patient,
        list_queue,
        call_next,
        current_serving,
        wait_time,
        complete_patient,
        queue_events,
    ),
    components(schemas(
        HealthRes,
        DepartmentRes,
        CreateDepartmentReq,
        UpdateDepartmentReq,
        RegisterPatientReq,
        PatientRes,
        WaitTimeRes,
        QueueEventRes,
        ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Builds the HQM router. Queue, patient and department routes live under `/api`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/departments", get(list_departments).post(create_department))
        .route(
            "/departments/:id",
            get(get_department)
                .put(update_department)
                .delete(delete_department),
        )
        .route("/patients", post(register_patient))
        .route(
            "/patients/department/:department",
            get(list_patients_by_department),
        )
        .route("/patients/token/:token", get(get_patient_by_token))
        .route("/patients/:id/cancel", post(cancel_patient))
        .route("/queue/department/:department", get(list_queue))
        .route("/queue/department/:department/next", post(call_next))
        .route("/queue/department/:department/current", get(current_serving))
        .route("/queue/department/:department/wait-time", get(wait_time))
        .route("/queue/department/:department/events", get(queue_events))
        .route("/queue/patient/:id/complete", put(complete_patient))
}

/// Serves `router(state)` on `listener` until the server fails.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn queue_error(e: QueueError) -> ApiError {
    match e.kind() {
        ErrorKind::Internal | ErrorKind::Transient => {
            tracing::error!("request failed: {:?}", e);
        }
        _ => tracing::debug!(error = %e, "request rejected"),
    }
    (status_for(e.kind()), Json(ErrorRes::from(&e)))
}

fn auth_error(e: AuthError) -> ApiError {
    if e == AuthError::NotConfigured {
        tracing::warn!("staff request refused: API_KEY is not configured");
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorRes {
            error: e.to_string(),
            kind: "unauthorized".into(),
        }),
    )
}

fn parse_id(id: &str) -> Result<RecordId, ApiError> {
    RecordId::parse(id).map_err(|e| queue_error(QueueError::from(e)))
}

fn parse_status(query: &StatusQuery) -> Result<PatientStatus, ApiError> {
    match query.status.as_deref() {
        None | Some("") => Ok(PatientStatus::Waiting),
        Some(s) => s.parse().map_err(queue_error),
    }
}

fn patient_list(patients: &[hqm_core::Patient]) -> Vec<PatientRes> {
    patients.iter().map(PatientRes::from).collect()
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint, used for monitoring and load balancer checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/api/departments",
    responses(
        (status = 200, description = "All departments, sorted by name", body = [DepartmentRes]),
        (status = 503, description = "Datastore unavailable", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_departments(
    State(state): State<AppState>,
) -> Result<Json<Vec<DepartmentRes>>, ApiError> {
    let departments = state
        .services
        .departments
        .list()
        .await
        .map_err(queue_error)?;
    Ok(Json(departments.iter().map(DepartmentRes::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = CreateDepartmentReq,
    params(("x-api-key" = String, Header, description = "Staff API key")),
    responses(
        (status = 201, description = "Department created", body = DepartmentRes),
        (status = 400, description = "Invalid name or prefix", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 409, description = "Name or prefix already in use", body = ErrorRes)
    )
)]
/// Create a department. Its token counter starts at zero.
#[axum::debug_handler]
async fn create_department(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateDepartmentReq>,
) -> Result<(StatusCode, Json<DepartmentRes>), ApiError> {
    state.require_staff(&headers)?;
    let department = state
        .services
        .departments
        .create(&req.name, &req.prefix)
        .await
        .map_err(queue_error)?;
    Ok((StatusCode::CREATED, Json(DepartmentRes::from(&department))))
}

#[utoipa::path(
    get,
    path = "/api/departments/{id}",
    params(("id" = String, Path, description = "Department id")),
    responses(
        (status = 200, description = "The department", body = DepartmentRes),
        (status = 404, description = "No such department", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_department(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DepartmentRes>, ApiError> {
    let id = parse_id(&id)?;
    let department = state
        .services
        .departments
        .get(&id)
        .await
        .map_err(queue_error)?;
    Ok(Json(DepartmentRes::from(&department)))
}

#[utoipa::path(
    put,
    path = "/api/departments/{id}",
    request_body = UpdateDepartmentReq,
    params(
        ("id" = String, Path, description = "Department id"),
        ("x-api-key" = String, Header, description = "Staff API key")
    ),
    responses(
        (status = 200, description = "Updated department", body = DepartmentRes),
        (status = 400, description = "Invalid field", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "No such department", body = ErrorRes),
        (
            status = 409,
            description = "Name or prefix in use, or rename with a live queue",
            body = ErrorRes
        )
    )
)]
/// Update a department's name, prefix or active flag. The token counter is never changed.
#[axum::debug_handler]
async fn update_department(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateDepartmentReq>,
) -> Result<Json<DepartmentRes>, ApiError> {
    state.require_staff(&headers)?;
    let id = parse_id(&id)?;
    let changes = DepartmentChanges::parse(
        req.name.as_deref(),
        req.prefix.as_deref(),
        req.is_active,
    )
    .map_err(queue_error)?;

    let department = state
        .services
        .departments
        .update(&id, changes)
        .await
        .map_err(queue_error)?;
    Ok(Json(DepartmentRes::from(&department)))
}

#[utoipa::path(
    delete,
    path = "/api/departments/{id}",
    params(
        ("id" = String, Path, description = "Department id"),
        ("x-api-key" = String, Header, description = "Staff API key")
    ),
    responses(
        (status = 200, description = "Deleted department", body = DepartmentRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "No such department", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn delete_department(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DepartmentRes>, ApiError> {
    state.require_staff(&headers)?;
    let id = parse_id(&id)?;
    let department = state
        .services
        .departments
        .delete(&id)
        .await
        .map_err(queue_error)?;
    Ok(Json(DepartmentRes::from(&department)))
}

#[utoipa::path(
    post,
    path = "/api/patients",
    request_body = RegisterPatientReq,
    responses(
        (status = 201, description = "Patient registered and queued", body = PatientRes),
        (status = 400, description = "Invalid input or inactive department", body = ErrorRes),
        (status = 404, description = "No such department", body = ErrorRes),
        (status = 409, description = "Token issue did not settle", body = ErrorRes),
        (status = 503, description = "Datastore unavailable", body = ErrorRes)
    )
)]
/// Register a patient and issue their queue token.
#[axum::debug_handler]
async fn register_patient(
    State(state): State<AppState>,
    Json(req): Json<RegisterPatientReq>,
) -> Result<(StatusCode, Json<PatientRes>), ApiError> {
    let patient = state
        .services
        .patients
        .register(NewPatient {
            name: req.name,
            age: req.age,
            department: req.department,
            priority: req.priority,
        })
        .await
        .map_err(queue_error)?;
    Ok((StatusCode::CREATED, Json(PatientRes::from(&patient))))
}

#[utoipa::path(
    get,
    path = "/api/patients/department/{department}",
    params(("department" = String, Path, description = "Department name"), StatusQuery),
    responses(
        (status = 200, description = "Patients in service order", body = [PatientRes]),
        (status = 400, description = "Unknown status", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_patients_by_department(
    State(state): State<AppState>,
    Path(department): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<PatientRes>>, ApiError> {
    let status = parse_status(&query)?;
    let patients = state
        .services
        .patients
        .list_by_department(&department, status)
        .await
        .map_err(queue_error)?;
    Ok(Json(patient_list(&patients)))
}

#[utoipa::path(
    get,
    path = "/api/patients/token/{token}",
    params(("token" = String, Path, description = "Token number, e.g. C-23")),
    responses(
        (status = 200, description = "The patient holding the token", body = PatientRes),
        (status = 400, description = "Malformed token", body = ErrorRes),
        (status = 404, description = "No patient holds the token", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_patient_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PatientRes>, ApiError> {
    let patient = state
        .services
        .patients
        .by_token(&token)
        .await
        .map_err(queue_error)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    post,
    path = "/api/patients/{id}/cancel",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("x-api-key" = String, Header, description = "Staff API key")
    ),
    responses(
        (status = 200, description = "Patient cancelled", body = PatientRes),
        (status = 400, description = "Patient is not waiting", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn cancel_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PatientRes>, ApiError> {
    state.require_staff(&headers)?;
    let id = parse_id(&id)?;
    let patient = state
        .services
        .patients
        .cancel(&id)
        .await
        .map_err(queue_error)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    get,
    path = "/api/queue/department/{department}",
    params(("department" = String, Path, description = "Department name"), StatusQuery),
    responses(
        (status = 200, description = "Queue in service order", body = [PatientRes]),
        (status = 400, description = "Unknown status", body = ErrorRes)
    )
)]
/// The department queue: emergencies first, then by arrival.
#[axum::debug_handler]
async fn list_queue(
    State(state): State<AppState>,
    Path(department): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<PatientRes>>, ApiError> {
    let status = parse_status(&query)?;
    let queue = state
        .services
        .queue
        .list_queue(&department, status)
        .await
        .map_err(queue_error)?;
    Ok(Json(patient_list(&queue)))
}

#[utoipa::path(
    post,
    path = "/api/queue/department/{department}/next",
    params(
        ("department" = String, Path, description = "Department name"),
        ("x-api-key" = String, Header, description = "Staff API key")
    ),
    responses(
        (
            status = 200,
            description = "The called patient, or null if nobody is waiting",
            body = PatientRes
        ),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 409, description = "Department is already serving a patient", body = ErrorRes)
    )
)]
/// Call the next patient in the department queue.
#[axum::debug_handler]
async fn call_next(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(department): Path<String>,
) -> Result<Json<Option<PatientRes>>, ApiError> {
    state.require_staff(&headers)?;
    let called = state
        .services
        .queue
        .call_next(&department)
        .await
        .map_err(queue_error)?;
    Ok(Json(called.as_ref().map(PatientRes::from)))
}

#[utoipa::path(
    get,
    path = "/api/queue/department/{department}/current",
    params(("department" = String, Path, description = "Department name")),
    responses(
        (status = 200, description = "The patient being served, or null", body = PatientRes)
    )
)]
#[axum::debug_handler]
async fn current_serving(
    State(state): State<AppState>,
    Path(department): Path<String>,
) -> Result<Json<Option<PatientRes>>, ApiError> {
    let current = state
        .services
        .queue
        .current_serving(&department)
        .await
        .map_err(queue_error)?;
    Ok(Json(current.as_ref().map(PatientRes::from)))
}

#[utoipa::path(
    get,
    path = "/api/queue/department/{department}/wait-time",
    params(("department" = String, Path, description = "Department name")),
    responses(
        (status = 200, description = "Waiting count and estimated minutes", body = WaitTimeRes)
    )
)]
#[axum::debug_handler]
async fn wait_time(
    State(state): State<AppState>,
    Path(department): Path<String>,
) -> Result<Json<WaitTimeRes>, ApiError> {
    let estimate = state
        .services
        .queue
        .estimate_wait_time(&department)
        .await
        .map_err(queue_error)?;
    Ok(Json(WaitTimeRes::new(&department, estimate)))
}

#[utoipa::path(
    put,
    path = "/api/queue/patient/{id}/complete",
    params(
        ("id" = String, Path, description = "Patient id"),
        ("x-api-key" = String, Header, description = "Staff API key")
    ),
    responses(
        (status = 200, description = "Consultation completed", body = PatientRes),
        (status = 400, description = "Patient is not being served", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "No such patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn complete_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PatientRes>, ApiError> {
    state.require_staff(&headers)?;
    let id = parse_id(&id)?;
    let patient = state
        .services
        .queue
        .mark_completed(&id)
        .await
        .map_err(queue_error)?;
    Ok(Json(PatientRes::from(&patient)))
}

#[utoipa::path(
    get,
    path = "/api/queue/department/{department}/events",
    params(("department" = String, Path, description = "Department name")),
    responses(
        (
            status = 200,
            description = "Server-sent stream of queue events",
            content_type = "text/event-stream",
            body = QueueEventRes
        )
    )
)]
/// Live queue updates for one department as server-sent events.
///
/// Each event is named after its kind (`patientAdded`, `patientCalled`, ...) and carries a
/// `QueueEventRes` JSON payload. Slow clients skip events they fell too far behind on.
async fn queue_events(
    State(state): State<AppState>,
    Path(department): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let receiver = state.notifier.subscribe(&department).map_err(|e| {
        tracing::error!("event subscription failed: {}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorRes {
                error: e.to_string(),
                kind: ErrorKind::Transient.as_str().into(),
            }),
        )
    })?;

    let stream = BroadcastStream::new(receiver).filter_map(move |message| match message {
        Ok(event) => Event::default()
            .event(event.kind.as_str())
            .json_data(QueueEventRes::from(&event))
            .ok()
            .map(Ok),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "event subscriber lagged");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
