use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::HistoryEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub fullname: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String, fullname: String, email: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            fullname,
            email,
            created_at: Utc::now(),
        }
    }
}

/// One finalized upload-mode detection. Immutable after creation; removed
/// only when the owning user is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub detection_date: DateTime<Utc>,
    pub image_path: String,
    pub diseases: Vec<String>,
    pub confidence: f32,
    pub recommendations: String,
}

impl DetectionRecord {
    pub fn new(
        user_id: Uuid,
        image_path: String,
        diseases: Vec<String>,
        confidence: f32,
        recommendations: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            detection_date: Utc::now(),
            image_path,
            diseases,
            confidence,
            recommendations,
        }
    }

    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            detection_date: self.detection_date,
            image_path: self.image_path.clone(),
            diseases: self.diseases.clone(),
            confidence: self.confidence,
            recommendations: self.recommendations.clone(),
        }
    }
}
