use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{DetectionRecord, User};

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    users_table: String,
    detections_table: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found")]
    NotFound,
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

impl DynamoDbRepository {
    pub fn new(client: Client, users_table: String, detections_table: String) -> Self {
        Self {
            client,
            users_table,
            detections_table,
        }
    }

    pub async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        log::info!(
            "Creating user '{}' in table '{}'",
            user.username,
            self.users_table
        );

        self.client
            .put_item()
            .table_name(&self.users_table)
            .set_item(Some(user_to_item(user)))
            .send()
            .await
            .map_err(|e| {
                log::error!("DynamoDB put_item failed for user {}: {:?}", user.username, e);
                RepositoryError::DynamoDb(e.to_string())
            })?;

        Ok(())
    }

    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, RepositoryError> {
        let mut key = HashMap::new();
        key.insert("id".to_string(), AttributeValue::S(user_id.to_string()));

        let result = self
            .client
            .get_item()
            .table_name(&self.users_table)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        if let Some(item) = result.item {
            Ok(Some(parse_user_from_item(&item)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let result = self
            .client
            .scan()
            .table_name(&self.users_table)
            .filter_expression("username = :username")
            .expression_attribute_values(":username", AttributeValue::S(username.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        if let Some(items) = result.items {
            if let Some(item) = items.into_iter().next() {
                return Ok(Some(parse_user_from_item(&item)?));
            }
        }
        Ok(None)
    }

    /// Persist one finalized detection. An unknown user id means the caller
    /// violated the post-authentication invariant: nothing is written and
    /// the failure is signaled.
    pub async fn save_detection(&self, record: &DetectionRecord) -> Result<(), RepositoryError> {
        if self.get_user_by_id(record.user_id).await?.is_none() {
            log::error!(
                "Refusing to save detection for unknown user id {}",
                record.user_id
            );
            return Err(RepositoryError::NotFound);
        }

        let item = detection_to_item(record)?;
        self.client
            .put_item()
            .table_name(&self.detections_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| {
                log::error!("DynamoDB put_item failed for detection {}: {:?}", record.id, e);
                RepositoryError::DynamoDb(e.to_string())
            })?;

        log::info!("Saved detection {} for user {}", record.id, record.user_id);
        Ok(())
    }

    /// All of one user's detections, newest first. No history is an empty
    /// list, not an error.
    pub async fn list_detections(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<DetectionRecord>, RepositoryError> {
        let result = self
            .client
            .scan()
            .table_name(&self.detections_table)
            .filter_expression("user_id = :user_id")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        let mut records = Vec::new();
        if let Some(items) = result.items {
            for item in items {
                records.push(parse_detection_from_item(&item)?);
            }
        }

        records.sort_by(|a, b| b.detection_date.cmp(&a.detection_date));
        Ok(records)
    }

    async fn delete_detection(&self, detection_id: Uuid) -> Result<(), RepositoryError> {
        let mut key = HashMap::new();
        key.insert("id".to_string(), AttributeValue::S(detection_id.to_string()));

        self.client
            .delete_item()
            .table_name(&self.detections_table)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        Ok(())
    }

    /// Remove a user and, cascade-style, every detection they own.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        let records = self.list_detections(user_id).await?;
        for record in records {
            self.delete_detection(record.id).await?;
        }

        let mut key = HashMap::new();
        key.insert("id".to_string(), AttributeValue::S(user_id.to_string()));

        self.client
            .delete_item()
            .table_name(&self.users_table)
            .set_key(Some(key))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        log::info!("Deleted user {} and their detection history", user_id);
        Ok(())
    }
}

fn user_to_item(user: &User) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(user.id.to_string()));
    item.insert(
        "username".to_string(),
        AttributeValue::S(user.username.clone()),
    );
    item.insert(
        "password_hash".to_string(),
        AttributeValue::S(user.password_hash.clone()),
    );
    item.insert(
        "fullname".to_string(),
        AttributeValue::S(user.fullname.clone()),
    );
    item.insert("email".to_string(), AttributeValue::S(user.email.clone()));
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(user.created_at.to_rfc3339()),
    );
    item
}

fn detection_to_item(
    record: &DetectionRecord,
) -> Result<HashMap<String, AttributeValue>, RepositoryError> {
    // The diseases list is stored as a JSON string column, mirroring the
    // original schema.
    let diseases_json = serde_json::to_string(&record.diseases)?;

    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(record.id.to_string()));
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(record.user_id.to_string()),
    );
    item.insert(
        "detection_date".to_string(),
        AttributeValue::S(record.detection_date.to_rfc3339()),
    );
    item.insert(
        "image_path".to_string(),
        AttributeValue::S(record.image_path.clone()),
    );
    item.insert("diseases".to_string(), AttributeValue::S(diseases_json));
    item.insert(
        "confidence".to_string(),
        AttributeValue::N(record.confidence.to_string()),
    );
    item.insert(
        "recommendations".to_string(),
        AttributeValue::S(record.recommendations.clone()),
    );
    Ok(item)
}

fn get_s(
    item: &HashMap<String, AttributeValue>,
    attribute: &str,
) -> Result<String, RepositoryError> {
    item.get(attribute)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidData(format!("missing attribute '{}'", attribute)))
}

fn parse_uuid(value: &str, attribute: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value)
        .map_err(|_| RepositoryError::InvalidData(format!("bad uuid in '{}'", attribute)))
}

fn parse_timestamp(value: &str, attribute: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::InvalidData(format!("bad timestamp in '{}'", attribute)))
}

fn parse_user_from_item(item: &HashMap<String, AttributeValue>) -> Result<User, RepositoryError> {
    Ok(User {
        id: parse_uuid(&get_s(item, "id")?, "id")?,
        username: get_s(item, "username")?,
        password_hash: get_s(item, "password_hash")?,
        fullname: get_s(item, "fullname")?,
        email: get_s(item, "email")?,
        created_at: parse_timestamp(&get_s(item, "created_at")?, "created_at")?,
    })
}

fn parse_detection_from_item(
    item: &HashMap<String, AttributeValue>,
) -> Result<DetectionRecord, RepositoryError> {
    let diseases_json = get_s(item, "diseases")?;
    let diseases: Vec<String> = serde_json::from_str(&diseases_json)?;

    let confidence = item
        .get("confidence")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<f32>().ok())
        .ok_or_else(|| RepositoryError::InvalidData("missing attribute 'confidence'".into()))?;

    Ok(DetectionRecord {
        id: parse_uuid(&get_s(item, "id")?, "id")?,
        user_id: parse_uuid(&get_s(item, "user_id")?, "user_id")?,
        detection_date: parse_timestamp(&get_s(item, "detection_date")?, "detection_date")?,
        image_path: get_s(item, "image_path")?,
        diseases,
        confidence,
        recommendations: get_s(item, "recommendations")?,
    })
}
