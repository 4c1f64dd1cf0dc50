use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Media kinds accepted with an interview response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn from_field(name: &str) -> Option<Self> {
        match name {
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

/// Keeps only characters that are safe inside a file name.
fn file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `{interview}_{question}_{uuid}.webm`; the random part keeps concurrent
/// uploads for the same question apart.
pub fn media_file_name(interview_id: &str, question_id: &str) -> String {
    format!(
        "{}_{}_{}.webm",
        file_component(interview_id),
        file_component(question_id),
        Uuid::new_v4()
    )
}

/// Writes one uploaded file in full and returns its path.
pub async fn save_media(
    upload_dir: &Path,
    interview_id: &str,
    question_id: &str,
    kind: MediaKind,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    let path = upload_dir.join(media_file_name(interview_id, question_id));
    tokio::fs::write(&path, bytes).await?;
    tracing::debug!(?kind, path = %path.display(), size = bytes.len(), "Stored uploaded media");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_media_file_name_shape() {
        let name = media_file_name("int-1", "q-2");
        assert!(name.starts_with("int-1_q-2_"));
        assert!(name.ends_with(".webm"));
        assert_ne!(name, media_file_name("int-1", "q-2"));
    }

    #[test]
    fn test_media_file_name_strips_path_separators() {
        let name = media_file_name("../etc", "a/b");
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
    }

    #[test]
    fn test_media_kind_from_field() {
        assert_eq!(MediaKind::from_field("video"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_field("audio"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_field("question_id"), None);
    }

    #[tokio::test]
    async fn test_save_media_writes_whole_buffer() {
        let dir = tempdir().unwrap();
        let first = save_media(dir.path(), "i1", "q1", MediaKind::Video, b"webm-bytes")
            .await
            .unwrap();
        let second = save_media(dir.path(), "i1", "q1", MediaKind::Audio, b"other")
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"webm-bytes");
        assert_eq!(std::fs::read(&second).unwrap(), b"other");
        assert!(first.starts_with(dir.path()));
    }
}
