use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, name: String, picture: Option<String>) -> Self {
        Self {
            id: new_id(),
            email,
            name,
            picture,
            created_at: Utc::now(),
        }
    }
}

/// Login session; the token doubles as the cookie value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewCategory {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub category_id: String,
    pub text: String,
    pub is_custom: bool,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn new(category_id: &str, text: &str, is_custom: bool) -> Self {
        Self {
            id: new_id(),
            category_id: category_id.to_string(),
            text: text.to_string(),
            is_custom,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    InProgress,
    Completed,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::InProgress => "in_progress",
            InterviewStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(InterviewStatus::InProgress),
            "completed" => Some(InterviewStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interview {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub category_name: String,
    pub status: InterviewStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub overall_stress_score: Option<f64>,
    pub overall_confidence_score: Option<f64>,
}

impl Interview {
    pub fn start(user_id: &str, category: &InterviewCategory) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            status: InterviewStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            overall_stress_score: None,
            overall_confidence_score: None,
        }
    }
}

/// One answered question. Media paths point into the upload directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewResponse {
    pub id: String,
    pub interview_id: String,
    pub question_id: String,
    pub question_text: String,
    pub video_path: Option<String>,
    pub audio_path: Option<String>,
    pub stress_score: Option<f64>,
    pub confidence_score: Option<f64>,
    pub analysis_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub interview_id: String,
    pub overall_stress: f64,
    pub overall_confidence: f64,
    pub detailed_metrics: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn from_submission(interview_id: &str, submission: AnalysisSubmission) -> Self {
        Self {
            id: new_id(),
            interview_id: interview_id.to_string(),
            overall_stress: submission.overall_stress,
            overall_confidence: submission.overall_confidence,
            detailed_metrics: submission.detailed_metrics,
            created_at: Utc::now(),
        }
    }
}

// Request bodies

#[derive(Debug, Deserialize)]
pub struct SessionExchangeRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionCreate {
    pub category_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    pub category_id: String,
}

/// Scores computed by the client. `detailed_metrics` is stored verbatim.
#[derive(Debug, Deserialize)]
pub struct AnalysisSubmission {
    #[serde(default)]
    pub overall_stress: f64,
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default = "empty_object")]
    pub detailed_metrics: serde_json::Value,
}

// Response bodies

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub user: User,
    pub session_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseSaved {
    pub message: String,
    pub response_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisSaved {
    pub message: String,
    pub result: AnalysisResult,
}
