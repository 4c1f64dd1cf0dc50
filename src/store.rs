use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    AnalysisResult, Interview, InterviewCategory, InterviewResponse, InterviewStatus, Question,
    User, UserSession,
};

/// Canonical stored form of a timestamp.
///
/// Fixed width with a `Z` suffix, so comparing two stored values as text
/// gives the same answer as comparing the instants.
pub fn db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(idx, &raw)
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

fn json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn to_json_text(value: &serde_json::Value) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

const USER_COLUMNS: &str = "id, email, name, picture, created_at";
const INTERVIEW_COLUMNS: &str = "id, user_id, category_id, category_name, status, started_at, \
     completed_at, overall_stress_score, overall_confidence_score";
const RESPONSE_COLUMNS: &str = "id, interview_id, question_id, question_text, video_path, \
     audio_path, stress_score, confidence_score, analysis_data, created_at";
const ANALYSIS_COLUMNS: &str =
    "id, interview_id, overall_stress, overall_confidence, detailed_metrics, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        picture: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<InterviewCategory> {
    Ok(InterviewCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: timestamp_at(row, 3)?,
    })
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(Question {
        id: row.get(0)?,
        category_id: row.get(1)?,
        text: row.get(2)?,
        is_custom: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

fn interview_from_row(row: &Row<'_>) -> rusqlite::Result<Interview> {
    let raw_status: String = row.get(4)?;
    let status = InterviewStatus::parse(&raw_status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown interview status: {raw_status}").into(),
        )
    })?;

    Ok(Interview {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        category_name: row.get(3)?,
        status,
        started_at: timestamp_at(row, 5)?,
        completed_at: optional_timestamp_at(row, 6)?,
        overall_stress_score: row.get(7)?,
        overall_confidence_score: row.get(8)?,
    })
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<InterviewResponse> {
    Ok(InterviewResponse {
        id: row.get(0)?,
        interview_id: row.get(1)?,
        question_id: row.get(2)?,
        question_text: row.get(3)?,
        video_path: row.get(4)?,
        audio_path: row.get(5)?,
        stress_score: row.get(6)?,
        confidence_score: row.get(7)?,
        analysis_data: optional_json_at(row, 8)?,
        created_at: timestamp_at(row, 9)?,
    })
}

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisResult> {
    Ok(AnalysisResult {
        id: row.get(0)?,
        interview_id: row.get(1)?,
        overall_stress: row.get(2)?,
        overall_confidence: row.get(3)?,
        detailed_metrics: json_at(row, 4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

/// Document store backed by a single SQLite connection.
///
/// Each entity lives in its own table; every call takes the lock for the
/// duration of one statement (or one seeding transaction) and never across
/// an `.await`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        tracing::debug!("Store schema initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // Users

    pub fn insert_user(&self, user: &User) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO users (id, email, name, picture, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.email,
                user.name,
                user.picture,
                db_timestamp(&user.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> rusqlite::Result<Option<User>> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()
    }

    pub fn find_user_by_email(&self, email: &str) -> rusqlite::Result<Option<User>> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()
    }

    // Sessions

    /// Stores a session. A token that is already present is replaced, so a
    /// token never maps to more than one session.
    pub fn insert_session(&self, session: &UserSession) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO user_sessions (session_token, user_id, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.session_token,
                session.user_id,
                db_timestamp(&session.expires_at),
                db_timestamp(&session.created_at)
            ],
        )?;
        Ok(())
    }

    /// Looks up a session that is still valid at `now` (`expires_at > now`).
    pub fn find_active_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> rusqlite::Result<Option<UserSession>> {
        self.conn
            .lock()
            .query_row(
                "SELECT user_id, session_token, expires_at, created_at
                 FROM user_sessions WHERE session_token = ?1 AND expires_at > ?2",
                params![token, db_timestamp(&now)],
                |row| {
                    Ok(UserSession {
                        user_id: row.get(0)?,
                        session_token: row.get(1)?,
                        expires_at: timestamp_at(row, 2)?,
                        created_at: timestamp_at(row, 3)?,
                    })
                },
            )
            .optional()
    }

    /// Returns whether a session row was removed.
    pub fn delete_session(&self, token: &str) -> rusqlite::Result<bool> {
        let removed = self.conn.lock().execute(
            "DELETE FROM user_sessions WHERE session_token = ?1",
            params![token],
        )?;
        Ok(removed > 0)
    }

    // Categories and questions

    pub fn count_categories(&self) -> rusqlite::Result<i64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM interview_categories", [], |row| row.get(0))
    }

    /// Writes categories and questions in one transaction.
    pub fn insert_catalog(
        &self,
        categories: &[InterviewCategory],
        questions: &[Question],
    ) -> rusqlite::Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut insert_category = tx.prepare(
                "INSERT INTO interview_categories (id, name, description, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for category in categories {
                insert_category.execute(params![
                    category.id,
                    category.name,
                    category.description,
                    db_timestamp(&category.created_at)
                ])?;
            }

            let mut insert_question = tx.prepare(
                "INSERT INTO questions (id, category_id, text, is_custom, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for question in questions {
                insert_question.execute(params![
                    question.id,
                    question.category_id,
                    question.text,
                    question.is_custom,
                    db_timestamp(&question.created_at)
                ])?;
            }
        }
        tx.commit()
    }

    pub fn list_categories(&self) -> rusqlite::Result<Vec<InterviewCategory>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at FROM interview_categories ORDER BY rowid",
        )?;
        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    pub fn get_category(&self, id: &str) -> rusqlite::Result<Option<InterviewCategory>> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, name, description, created_at FROM interview_categories WHERE id = ?1",
                params![id],
                category_from_row,
            )
            .optional()
    }

    pub fn insert_question(&self, question: &Question) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO questions (id, category_id, text, is_custom, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                question.id,
                question.category_id,
                question.text,
                question.is_custom,
                db_timestamp(&question.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn list_questions(&self, category_id: &str) -> rusqlite::Result<Vec<Question>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, category_id, text, is_custom, created_at FROM questions
             WHERE category_id = ?1 ORDER BY created_at, rowid",
        )?;
        let questions = stmt
            .query_map(params![category_id], question_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(questions)
    }

    // Interviews

    pub fn insert_interview(&self, interview: &Interview) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            &format!(
                "INSERT INTO interviews ({INTERVIEW_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                interview.id,
                interview.user_id,
                interview.category_id,
                interview.category_name,
                interview.status.as_str(),
                db_timestamp(&interview.started_at),
                interview.completed_at.as_ref().map(db_timestamp),
                interview.overall_stress_score,
                interview.overall_confidence_score
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn list_interviews(&self, user_id: &str) -> rusqlite::Result<Vec<Interview>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interviews
             WHERE user_id = ?1 ORDER BY started_at DESC, rowid DESC"
        ))?;
        let interviews = stmt
            .query_map(params![user_id], interview_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(interviews)
    }

    /// Fetches an interview only if `user_id` owns it.
    pub fn find_owned_interview(
        &self,
        id: &str,
        user_id: &str,
    ) -> rusqlite::Result<Option<Interview>> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                interview_from_row,
            )
            .optional()
    }

    pub fn complete_interview(
        &self,
        id: &str,
        overall_stress: f64,
        overall_confidence: f64,
        completed_at: DateTime<Utc>,
    ) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "UPDATE interviews
             SET status = ?1, completed_at = ?2, overall_stress_score = ?3,
                 overall_confidence_score = ?4
             WHERE id = ?5",
            params![
                InterviewStatus::Completed.as_str(),
                db_timestamp(&completed_at),
                overall_stress,
                overall_confidence,
                id
            ],
        )?;
        Ok(())
    }

    // Responses

    pub fn insert_response(&self, response: &InterviewResponse) -> rusqlite::Result<()> {
        let analysis_data = response.analysis_data.as_ref().map(to_json_text).transpose()?;
        self.conn.lock().execute(
            &format!(
                "INSERT INTO interview_responses ({RESPONSE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                response.id,
                response.interview_id,
                response.question_id,
                response.question_text,
                response.video_path,
                response.audio_path,
                response.stress_score,
                response.confidence_score,
                analysis_data,
                db_timestamp(&response.created_at)
            ],
        )?;
        Ok(())
    }

    /// Oldest first, i.e. answer order.
    pub fn list_responses(&self, interview_id: &str) -> rusqlite::Result<Vec<InterviewResponse>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM interview_responses
             WHERE interview_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let responses = stmt
            .query_map(params![interview_id], response_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(responses)
    }

    // Analysis

    pub fn insert_analysis(&self, result: &AnalysisResult) -> rusqlite::Result<()> {
        let detailed_metrics = to_json_text(&result.detailed_metrics)?;
        self.conn.lock().execute(
            &format!(
                "INSERT INTO analysis_results ({ANALYSIS_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                result.id,
                result.interview_id,
                result.overall_stress,
                result.overall_confidence,
                detailed_metrics,
                db_timestamp(&result.created_at)
            ],
        )?;
        Ok(())
    }

    /// Most recent analysis for an interview, if any.
    pub fn latest_analysis(&self, interview_id: &str) -> rusqlite::Result<Option<AnalysisResult>> {
        self.conn
            .lock()
            .query_row(
                &format!(
                    "SELECT {ANALYSIS_COLUMNS} FROM analysis_results
                     WHERE interview_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![interview_id],
                analysis_from_row,
            )
            .optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn category(id: &str, name: &str) -> InterviewCategory {
        InterviewCategory {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("{name} description"),
            created_at: Utc::now(),
        }
    }

    fn session(token: &str, user_id: &str, expires_at: DateTime<Utc>) -> UserSession {
        UserSession {
            user_id: user_id.to_string(),
            session_token: token.to_string(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_timestamp_text_orders_like_instants() {
        let early = DateTime::parse_from_rfc3339("2024-05-01T09:59:59.999999Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + Duration::microseconds(1);

        assert_eq!(db_timestamp(&late), "2024-05-01T10:00:00.000000Z");
        assert!(db_timestamp(&early) < db_timestamp(&late));
        assert_eq!(db_timestamp(&early).len(), db_timestamp(&late).len());
    }

    #[test]
    fn test_user_lookup_by_email() {
        let store = Store::open_in_memory().unwrap();
        let user = User::new("ada@example.com".into(), "Ada".into(), None);
        store.insert_user(&user).unwrap();

        let found = store.find_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(store.find_user_by_email("bob@example.com").unwrap().is_none());
        assert_eq!(store.get_user(&user.id).unwrap().unwrap().name, "Ada");
    }

    #[test]
    fn test_session_expiry_boundary() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.insert_session(&session("tok", "u1", now)).unwrap();

        // Expiring exactly now is no longer valid
        assert!(store.find_active_session("tok", now).unwrap().is_none());

        let later = now + Duration::microseconds(1);
        store.insert_session(&session("tok", "u1", later)).unwrap();
        let found = store.find_active_session("tok", now).unwrap().unwrap();
        assert_eq!(found.user_id, "u1");
        assert_eq!(db_timestamp(&found.expires_at), db_timestamp(&later));
    }

    #[test]
    fn test_longest_session_is_active() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let expires = now + Duration::days(crate::config::MAX_SESSION_TTL_DAYS);
        store.insert_session(&session("tok", "u1", expires)).unwrap();

        assert!(!db_timestamp(&expires).starts_with('+'));
        assert!(store.find_active_session("tok", now).unwrap().is_some());
    }

    #[test]
    fn test_session_token_maps_to_one_session() {
        let store = Store::open_in_memory().unwrap();
        let expires = Utc::now() + Duration::days(7);
        store.insert_session(&session("tok", "u1", expires)).unwrap();
        store.insert_session(&session("tok", "u2", expires)).unwrap();

        let found = store.find_active_session("tok", Utc::now()).unwrap().unwrap();
        assert_eq!(found.user_id, "u2");

        assert!(store.delete_session("tok").unwrap());
        assert!(!store.delete_session("tok").unwrap());
        assert!(store.find_active_session("tok", Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_interview_ownership_filter() {
        let store = Store::open_in_memory().unwrap();
        let technical = category("technical", "Technical Interview");
        store.insert_catalog(&[technical.clone()], &[]).unwrap();

        let interview = Interview::start("owner", &technical);
        store.insert_interview(&interview).unwrap();

        assert!(store.find_owned_interview(&interview.id, "owner").unwrap().is_some());
        assert!(store.find_owned_interview(&interview.id, "intruder").unwrap().is_none());
        assert!(store.list_interviews("intruder").unwrap().is_empty());
    }

    #[test]
    fn test_interviews_listed_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let hr = category("hr", "HR Interview");

        let mut older = Interview::start("u1", &hr);
        older.started_at = Utc::now() - Duration::hours(1);
        let newer = Interview::start("u1", &hr);
        store.insert_interview(&older).unwrap();
        store.insert_interview(&newer).unwrap();

        let ids: Vec<String> = store
            .list_interviews("u1")
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn test_complete_interview_and_analysis() {
        let store = Store::open_in_memory().unwrap();
        let interview = Interview::start("u1", &category("behavioral", "Behavioral Interview"));
        store.insert_interview(&interview).unwrap();
        assert!(store.latest_analysis(&interview.id).unwrap().is_none());

        store
            .complete_interview(&interview.id, 45.5, 72.3, Utc::now())
            .unwrap();
        let result = AnalysisResult {
            id: "a1".into(),
            interview_id: interview.id.clone(),
            overall_stress: 45.5,
            overall_confidence: 72.3,
            detailed_metrics: serde_json::json!({ "responses": [{ "stress": 40.0 }] }),
            created_at: Utc::now(),
        };
        store.insert_analysis(&result).unwrap();

        let stored = store.find_owned_interview(&interview.id, "u1").unwrap().unwrap();
        assert_eq!(stored.status, InterviewStatus::Completed);
        assert_eq!(stored.overall_stress_score, Some(45.5));
        assert!(stored.completed_at.is_some());

        let analysis = store.latest_analysis(&interview.id).unwrap().unwrap();
        assert_eq!(analysis.overall_confidence, 72.3);
        assert_eq!(analysis.detailed_metrics, result.detailed_metrics);
    }

    #[test]
    fn test_response_round_trip_keeps_optional_fields() {
        let store = Store::open_in_memory().unwrap();
        let response = InterviewResponse {
            id: "r1".into(),
            interview_id: "i1".into(),
            question_id: "q1".into(),
            question_text: "Tell me about yourself.".into(),
            video_path: Some("uploads/i1_q1_x.webm".into()),
            audio_path: None,
            stress_score: Some(30.0),
            confidence_score: None,
            analysis_data: Some(serde_json::json!({ "blink_rate": 0.4 })),
            created_at: Utc::now(),
        };
        store.insert_response(&response).unwrap();

        let listed = store.list_responses("i1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].video_path, response.video_path);
        assert_eq!(listed[0].audio_path, None);
        assert_eq!(listed[0].analysis_data, response.analysis_data);
        assert!(store.list_responses("other").unwrap().is_empty());
    }
}
