use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{self, CurrentUser};
use crate::error::ApiError;
use crate::models::{
    AnalysisResult, AnalysisSaved, AnalysisSubmission, Interview, InterviewCategory,
    InterviewResponse, MessageResponse, Question, QuestionCreate, ResponseSaved, SessionCreated,
    SessionExchangeRequest, StartInterviewRequest, User, UserSession,
};
use crate::uploads::{self, MediaKind};
use crate::AppState;

/// Full route table; `/api` carries everything the client talks to.
pub fn router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    let api = Router::new()
        .route("/auth/session", post(create_session))
        .route("/auth/me", get(current_user))
        .route("/auth/logout", post(logout))
        .route("/categories", get(list_categories))
        .route("/questions", post(create_question))
        .route("/questions/:category_id", get(list_questions))
        .route("/interviews", post(create_interview).get(list_interviews))
        .route("/interviews/:interview_id", get(get_interview))
        .route(
            "/interviews/:interview_id/responses",
            post(save_response).layer(upload_limit).get(list_responses),
        )
        .route("/interviews/:interview_id/analyze", post(analyze_interview))
        .route("/interviews/:interview_id/analysis", get(get_analysis));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// CORS for the browser client. `*` (or an empty list) mirrors the caller's
/// origin; anything else is an exact allow-list. Credentials are always allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let list: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Skipping invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn root() -> String {
    format!("Interview Practice API v{}", env!("CARGO_PKG_VERSION"))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Re-fetches an interview through the ownership filter.
fn owned_interview(state: &AppState, interview_id: &str, user: &User) -> Result<Interview, ApiError> {
    state
        .store
        .find_owned_interview(interview_id, &user.id)?
        .ok_or_else(ApiError::interview_not_found)
}

// Auth

/// Exchanges an identity-provider session id for a local session.
async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<SessionExchangeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let session_id = body
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("session_id required".to_string()))?;

    let external = state.identity.exchange(&session_id).await?;

    let user = match state.store.find_user_by_email(&external.email)? {
        Some(user) => user,
        None => {
            let user = User::new(external.email, external.name, external.picture);
            state.store.insert_user(&user)?;
            info!(user_id = %user.id, "Registered new user");
            user
        }
    };

    let now = Utc::now();
    let session = UserSession {
        user_id: user.id.clone(),
        session_token: external.session_token,
        expires_at: now + state.session_ttl,
        created_at: now,
    };
    state.store.insert_session(&session)?;
    info!(user_id = %user.id, "Session created");

    let cookie = auth::session_cookie(&session.session_token, state.session_ttl.num_seconds());
    Ok((
        [(SET_COOKIE, cookie)],
        Json(SessionCreated {
            user,
            session_token: session.session_token,
        }),
    ))
}

async fn current_user(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// Always succeeds; drops the session behind the presented credential, if any.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = auth::session_token(&headers) {
        if state.store.delete_session(&token)? {
            info!("Session ended");
        }
    }

    Ok((
        [(SET_COOKIE, auth::clear_session_cookie())],
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

// Catalog

async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<InterviewCategory>>, ApiError> {
    Ok(Json(state.store.list_categories()?))
}

async fn list_questions(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<Json<Vec<Question>>, ApiError> {
    Ok(Json(state.store.list_questions(&category_id)?))
}

async fn create_question(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<QuestionCreate>, JsonRejection>,
) -> Result<Json<Question>, ApiError> {
    let Json(input) = payload?;
    let text = input.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Question text must not be empty".to_string()));
    }
    if state.store.get_category(&input.category_id)?.is_none() {
        return Err(ApiError::NotFound("Category not found".to_string()));
    }

    let question = Question::new(&input.category_id, text, true);
    state.store.insert_question(&question)?;
    info!(user_id = %user.id, question_id = %question.id, "Custom question added");
    Ok(Json(question))
}

// Interviews

async fn create_interview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<StartInterviewRequest>, JsonRejection>,
) -> Result<Json<Interview>, ApiError> {
    let Json(input) = payload?;
    let category = state
        .store
        .get_category(&input.category_id)?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

    let interview = Interview::start(&user.id, &category);
    state.store.insert_interview(&interview)?;
    info!(user_id = %user.id, interview_id = %interview.id, category = %category.id, "Interview started");
    Ok(Json(interview))
}

async fn list_interviews(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Interview>>, ApiError> {
    Ok(Json(state.store.list_interviews(&user.id)?))
}

async fn get_interview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(interview_id): Path<String>,
) -> Result<Json<Interview>, ApiError> {
    Ok(Json(owned_interview(&state, &interview_id, &user)?))
}

fn parse_score(field: &str, raw: &str) -> Result<f64, ApiError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} must be a number")))
}

fn metrics_object(field: &str, value: serde_json::Value) -> Result<serde_json::Value, ApiError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ApiError::BadRequest(format!("{field} must be a JSON object")))
    }
}

/// Multipart answer upload: text fields plus optional `video` / `audio` files.
async fn save_response(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(interview_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ResponseSaved>, ApiError> {
    let mut multipart = multipart?;
    let interview = owned_interview(&state, &interview_id, &user)?;

    let mut question_id = None;
    let mut question_text = None;
    let mut stress_score = None;
    let mut confidence_score = None;
    let mut analysis_data = None;
    let mut media = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "question_id" => question_id = Some(field.text().await?),
            "question_text" => question_text = Some(field.text().await?),
            "stress_score" => stress_score = Some(parse_score(&name, &field.text().await?)?),
            "confidence_score" => {
                confidence_score = Some(parse_score(&name, &field.text().await?)?)
            }
            "analysis_data" => {
                let raw = field.text().await?;
                let value: serde_json::Value = serde_json::from_str(&raw).map_err(|_| {
                    ApiError::BadRequest("analysis_data must be a JSON object".to_string())
                })?;
                analysis_data = Some(metrics_object(&name, value)?);
            }
            other => match MediaKind::from_field(other) {
                Some(kind) => media.push((kind, field.bytes().await?)),
                None => tracing::debug!(field = other, "Ignoring unknown form field"),
            },
        }
    }

    let question_id =
        question_id.ok_or_else(|| ApiError::BadRequest("question_id is required".to_string()))?;
    let question_text = question_text
        .ok_or_else(|| ApiError::BadRequest("question_text is required".to_string()))?;

    let mut video_path = None;
    let mut audio_path = None;
    for (kind, bytes) in media {
        let path =
            uploads::save_media(&state.upload_dir, &interview.id, &question_id, kind, &bytes).await?;
        let path = path.to_string_lossy().into_owned();
        match kind {
            MediaKind::Video => video_path = Some(path),
            MediaKind::Audio => audio_path = Some(path),
        }
    }

    let response = InterviewResponse {
        id: uuid::Uuid::new_v4().to_string(),
        interview_id: interview.id.clone(),
        question_id,
        question_text,
        video_path,
        audio_path,
        stress_score,
        confidence_score,
        analysis_data,
        created_at: Utc::now(),
    };
    state.store.insert_response(&response)?;
    info!(interview_id = %interview.id, response_id = %response.id, "Response saved");

    Ok(Json(ResponseSaved {
        message: "Response saved".to_string(),
        response_id: response.id,
    }))
}

async fn list_responses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(interview_id): Path<String>,
) -> Result<Json<Vec<InterviewResponse>>, ApiError> {
    let interview = owned_interview(&state, &interview_id, &user)?;
    Ok(Json(state.store.list_responses(&interview.id)?))
}

// Analysis

/// Stores client-computed scores and closes the interview.
async fn analyze_interview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(interview_id): Path<String>,
    payload: Result<Json<AnalysisSubmission>, JsonRejection>,
) -> Result<Json<AnalysisSaved>, ApiError> {
    let Json(mut submission) = payload?;
    let interview = owned_interview(&state, &interview_id, &user)?;
    submission.detailed_metrics = metrics_object("detailed_metrics", submission.detailed_metrics)?;

    state.store.complete_interview(
        &interview.id,
        submission.overall_stress,
        submission.overall_confidence,
        Utc::now(),
    )?;

    let result = AnalysisResult::from_submission(&interview.id, submission);
    state.store.insert_analysis(&result)?;
    info!(
        interview_id = %interview.id,
        stress = result.overall_stress,
        confidence = result.overall_confidence,
        "Interview completed"
    );

    Ok(Json(AnalysisSaved {
        message: "Analysis saved".to_string(),
        result,
    }))
}

async fn get_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(interview_id): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let interview = owned_interview(&state, &interview_id, &user)?;
    state
        .store
        .latest_analysis(&interview.id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Analysis not found".to_string()))
}
