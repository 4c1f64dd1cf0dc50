use chrono::Utc;

use crate::models::{InterviewCategory, Question};
use crate::store::Store;

const CATEGORIES: [(&str, &str, &str); 3] = [
    (
        "technical",
        "Technical Interview",
        "Assess technical knowledge and problem-solving skills",
    ),
    (
        "hr",
        "HR Interview",
        "Evaluate communication and cultural fit",
    ),
    (
        "behavioral",
        "Behavioral Interview",
        "Understand past experiences and behavioral patterns",
    ),
];

const BUILT_IN_QUESTIONS: [(&str, &str); 15] = [
    ("technical", "Explain the difference between process and thread."),
    ("technical", "What is the time complexity of binary search?"),
    ("technical", "Describe RESTful API design principles."),
    ("technical", "What are the SOLID principles in software design?"),
    ("technical", "Explain database normalization and its importance."),
    ("hr", "Tell me about yourself."),
    ("hr", "Why do you want to work for our company?"),
    ("hr", "What are your greatest strengths and weaknesses?"),
    ("hr", "Where do you see yourself in 5 years?"),
    ("hr", "Why should we hire you?"),
    ("behavioral", "Describe a time when you faced a challenging situation at work."),
    ("behavioral", "Tell me about a time you worked on a team project."),
    ("behavioral", "Give an example of a goal you set and how you achieved it."),
    ("behavioral", "Describe a situation where you had to deal with a difficult colleague."),
    ("behavioral", "Tell me about a time when you had to adapt to a significant change."),
];

/// Inserts the built-in catalog when no category exists yet.
///
/// Returns `true` if anything was written. An existing catalog, even a
/// partial one, is left alone.
pub fn seed_catalog(store: &Store) -> rusqlite::Result<bool> {
    let existing = store.count_categories()?;
    if existing > 0 {
        tracing::debug!(existing, "Categories present, skipping seed");
        return Ok(false);
    }

    let now = Utc::now();
    let categories: Vec<InterviewCategory> = CATEGORIES
        .iter()
        .map(|(id, name, description)| InterviewCategory {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
        })
        .collect();

    let questions: Vec<Question> = BUILT_IN_QUESTIONS
        .iter()
        .map(|(category_id, text)| Question {
            created_at: now,
            ..Question::new(category_id, text, false)
        })
        .collect();

    store.insert_catalog(&categories, &questions)?;
    tracing::info!(
        categories = categories.len(),
        questions = questions.len(),
        "Seeded interview catalog"
    );
    Ok(true)
}
