use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use campus_schedule_core::{Error, prelude::*};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<ScheduleRepository<Arc<dyn KeyedStore>>>,
    /// 导入课表时的创建时间来源
    pub clock: Arc<dyn Clock>,
}

/// 健康检查响应
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// 错误响应
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// 导出请求
#[derive(Deserialize)]
struct ExportRequest {
    schedule: Schedule,
    courses: Vec<Course>,
    config: WeekConfig,
    #[serde(default)]
    table: TimeSlotTable,
    #[serde(default)]
    options: IcsOptions,
}

/// 导入请求
#[derive(Deserialize)]
struct ImportRequest {
    ics: String,
    config: WeekConfig,
    #[serde(default)]
    table: TimeSlotTable,
    #[serde(default)]
    options: IcsOptions,
    /// 保存到存储中
    #[serde(default)]
    save: bool,
    /// 保存后激活
    #[serde(default)]
    activate: bool,
}

#[derive(Serialize)]
struct ImportResponse {
    schedule: Schedule,
    saved: bool,
    #[serde(flatten)]
    calendar: ImportedCalendar,
}

/// 周视图请求：直接给出课程，或读取已保存的课表（默认为激活课表）
#[derive(Deserialize)]
struct LayoutRequest {
    date: NaiveDate,
    config: WeekConfig,
    #[serde(default)]
    table: TimeSlotTable,
    courses: Option<Vec<Course>>,
    schedule_id: Option<Uuid>,
}

#[derive(Serialize)]
struct LayoutResponse<'a> {
    week: i64,
    dates: [NaiveDate; 7],
    shows_current_time_line: bool,
    blocks: Vec<PositionedBlock<'a>>,
}

#[derive(Serialize)]
struct ScheduleSummary {
    #[serde(flatten)]
    schedule: Schedule,
    course_count: usize,
}

/// 导出已保存课表的查询参数
#[derive(Deserialize)]
struct ScheduleIcsQuery {
    semester_start: NaiveDate, // 格式：YYYY-MM-DD
    week_start: Option<WeekStart>,
    reminder_minutes: Option<u32>,
    /// 均分节次数，不指定时使用标准作息
    periods: Option<u32>,
}

pub fn create_app(store: Arc<dyn KeyedStore>, clock: Arc<dyn Clock>) -> Router {
    let state = AppState {
        repo: Arc::new(ScheduleRepository::new(store)),
        clock,
    };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ics/export", post(export_handler))
        .route("/ics/import", post(import_handler))
        .route("/layout/week", post(layout_week_handler))
        .route("/schedules", get(list_schedules_handler))
        .route("/schedules/{id}", delete(delete_schedule_handler))
        .route("/schedules/{id}/ics", get(schedule_ics_handler))
        .route("/schedules/{id}/activate", post(activate_schedule_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// 根路径处理器
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Campus Schedule Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Course schedule layout and ICS import/export",
        "endpoints": {
            "health": "GET /health",
            "export": "POST /ics/export",
            "import": "POST /ics/import",
            "layout": "POST /layout/week",
            "schedules": "GET /schedules",
            "schedule_ics": "GET /schedules/{id}/ics",
            "activate": "POST /schedules/{id}/activate",
            "delete": "DELETE /schedules/{id}"
        }
    }))
}

/// 健康检查处理器
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn calendar_response(ics_content: String) -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "text/calendar; charset=utf-8")],
        ics_content,
    )
        .into_response()
}

/// 导出ICS
async fn export_handler(Json(request): Json<ExportRequest>) -> Result<Response, AppError> {
    tracing::info!(
        "导出课表: {} ({} 门课程)",
        request.schedule.name,
        request.courses.len()
    );

    let codec = IcsCodec::new(request.options);
    let ics_content = codec.export(
        &request.schedule,
        &request.courses,
        &request.table,
        &request.config,
    )?;

    Ok(calendar_response(ics_content))
}

/// 导入ICS，可选保存
async fn import_handler(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, AppError> {
    let codec = IcsCodec::new(request.options);
    let calendar = codec.import(&request.ics, &request.table, &request.config)?;
    let mut schedule = calendar.schedule(state.clock.as_ref());

    tracing::info!(
        "导入课表: {} ({} 门课程, {} 条警告)",
        calendar.name,
        calendar.courses.len(),
        calendar.warnings.len()
    );

    if request.save {
        // 重新导入时保留原来的创建时间
        if let Ok(existing) = state.repo.schedule(schedule.id).await {
            schedule.created_at = existing.created_at;
            schedule.is_active = existing.is_active;
        }
        schedule.is_active |= request.activate;
        state.repo.save(&schedule, &calendar.courses).await?;
    }

    Ok(Json(ImportResponse {
        schedule,
        saved: request.save,
        calendar,
    }))
}

/// 计算一周的定位块
async fn layout_week_handler(
    State(state): State<AppState>,
    Json(request): Json<LayoutRequest>,
) -> Result<Response, AppError> {
    request.config.validate()?;

    let courses = match request.courses {
        Some(courses) => {
            for course in &courses {
                course.validate(&request.table)?;
            }
            courses
        }
        None => {
            let id = match request.schedule_id {
                Some(id) => id,
                None => state
                    .repo
                    .active()
                    .await?
                    .map(|schedule| schedule.id)
                    .ok_or_else(|| Error::NotFound("active schedule".to_string()))?,
            };
            state.repo.courses(id).await?
        }
    };

    let occurrences = RecurrenceExpander::occurrences_for_week(
        request.date,
        &courses,
        &request.table,
        &request.config,
    )?;
    let blocks = OverlapLayout::layout_week(&occurrences);

    Ok(Json(LayoutResponse {
        week: WeekCalculator::week_number(request.date, &request.config),
        dates: WeekCalculator::week_dates(request.date, &request.config),
        shows_current_time_line: request
            .config
            .timeline_display_mode
            .shows_current_time_line(),
        blocks,
    })
    .into_response())
}

/// 列出已保存的课表
async fn list_schedules_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduleSummary>>, AppError> {
    let mut summaries = Vec::new();
    for schedule in state.repo.list().await? {
        let course_count = state.repo.courses(schedule.id).await?.len();
        summaries.push(ScheduleSummary {
            schedule,
            course_count,
        });
    }
    Ok(Json(summaries))
}

/// 导出已保存的课表
async fn schedule_ics_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ScheduleIcsQuery>,
) -> Result<Response, AppError> {
    let (schedule, courses) = state.repo.load(id).await?;

    let mut config = WeekConfig::new(params.semester_start);
    if let Some(week_start) = params.week_start {
        config.week_start_day = week_start;
    }
    let table = match params.periods {
        Some(periods) => TimeSlotTable::uniform(periods)?,
        None => TimeSlotTable::campus_default(),
    };

    let codec = IcsCodec::new(IcsOptions {
        reminder_minutes: params.reminder_minutes,
        ..IcsOptions::default()
    });
    let ics_content = codec.export(&schedule, &courses, &table, &config)?;

    Ok(calendar_response(ics_content))
}

async fn activate_schedule_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Schedule>, AppError> {
    Ok(Json(state.repo.activate(id).await?))
}

async fn delete_schedule_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Schedule>, AppError> {
    Ok(Json(state.repo.delete(id).await?))
}

/// 应用错误类型
#[derive(Debug)]
struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self.0 {
            Error::Validation { .. } => (StatusCode::BAD_REQUEST, "参数错误"),
            Error::Json(_) | Error::DateTime(_) => (StatusCode::BAD_REQUEST, "请求格式错误"),
            Error::IcsParse(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ICS解析失败"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "未找到"),
            Error::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "存储错误"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "内部服务器错误"),
        };

        if status.is_server_error() {
            tracing::error!("{}", self.0);
        }

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let clock = FixedClock(
            NaiveDate::from_ymd_opt(2025, 2, 20)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        );
        create_app(Arc::new(MemoryStore::new()), Arc::new(clock))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn course_json(id: u128, slot: u32, duration: u32) -> serde_json::Value {
        serde_json::json!({
            "id": Uuid::from_u128(id),
            "name": format!("课程{id}"),
            "instructor": "张老师",
            "location": "2108",
            "weeks": [1, 2, 3],
            "day_of_week": 1,
            "time_slot": slot,
            "duration": duration,
            "color": "#4A90D9",
            "schedule_id": Uuid::from_u128(0xABCD),
        })
    }

    fn config_json() -> serde_json::Value {
        serde_json::json!({ "semester_start_date": "2025-02-24" })
    }

    #[tokio::test]
    async fn health_reports_version() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("healthy"));
    }

    #[tokio::test]
    async fn export_returns_calendar() {
        let body = serde_json::json!({
            "schedule": {
                "id": Uuid::from_u128(0xABCD),
                "name": "春季课表",
                "term_name": "2025 春季",
                "is_active": true,
                "created_at": "2025-02-20T12:00:00",
            },
            "courses": [course_json(1, 1, 2)],
            "config": config_json(),
        });
        let response = app()
            .oneshot(json_request("POST", "/ics/export", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["Content-Type"],
            "text/calendar; charset=utf-8"
        );
        let text = body_text(response).await;
        assert!(text.contains("RRULE:FREQ=WEEKLY;BYDAY=MO;COUNT=3"));
    }

    #[tokio::test]
    async fn invalid_course_is_bad_request() {
        let body = serde_json::json!({
            "date": "2025-02-24",
            "config": config_json(),
            "courses": [course_json(1, 11, 2)],
        });
        let response = app()
            .oneshot(json_request("POST", "/layout/week", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("duration"));
    }

    #[tokio::test]
    async fn huge_duration_is_bad_request() {
        let layout = serde_json::json!({
            "date": "2025-02-24",
            "config": config_json(),
            "courses": [course_json(1, 2, u32::MAX)],
        });
        let response = app()
            .oneshot(json_request("POST", "/layout/week", layout))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let export = serde_json::json!({
            "schedule": {
                "id": Uuid::from_u128(0xABCD),
                "name": "春季课表",
                "term_name": "2025 春季",
                "is_active": true,
                "created_at": "2025-02-20T12:00:00",
            },
            "courses": [course_json(1, 2, u32::MAX)],
            "config": config_json(),
        });
        let response = app()
            .oneshot(json_request("POST", "/ics/export", export))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("duration"));
    }

    #[tokio::test]
    async fn layout_assigns_columns() {
        let body = serde_json::json!({
            "date": "2025-02-26",
            "config": config_json(),
            "courses": [course_json(1, 1, 2), course_json(2, 2, 1), course_json(3, 5, 1)],
        });
        let response = app()
            .oneshot(json_request("POST", "/layout/week", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["week"], 1);
        let blocks = value["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["column"], 0);
        assert_eq!(blocks[0]["total_columns"], 2);
        assert_eq!(blocks[1]["column"], 1);
        assert_eq!(blocks[2]["total_columns"], 1);
    }

    #[tokio::test]
    async fn imported_schedule_can_be_listed_and_deleted() {
        let app = app();
        let ics = "BEGIN:VCALENDAR\r\nX-WR-CALNAME:导入课表\r\nBEGIN:VEVENT\r\n\
                   DTSTART:20250224T080000\r\nDTEND:20250224T094000\r\nSUMMARY:高等数学\r\n\
                   RRULE:FREQ=WEEKLY;COUNT=4\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let body = serde_json::json!({
            "ics": ics,
            "config": config_json(),
            "save": true,
            "activate": true,
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/ics/import", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["courses"][0]["weeks"], serde_json::json!([1, 2, 3, 4]));
        assert_eq!(value["schedule"]["created_at"], "2025-02-20T12:00:00");
        let id = value["schedule"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(Request::get("/schedules").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value[0]["course_count"], 1);
        assert_eq!(value[0]["is_active"], true);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/schedules/{id}/ics?semester_start=2025-02-24"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("SUMMARY:高等数学"));

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/schedules/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::post(format!("/schedules/{id}/activate"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
