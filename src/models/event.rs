//! Normalized event shape shared by the sync pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LemlistActivity, SmartleadEvent};

/// A platform event normalized for synchronization.
///
/// `key` is assigned by the key generator before the event is handed to the
/// persistence layer; callers treat it as an opaque idempotency token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub platform: String,
    pub campaign_id: String,
    pub event_type: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl SyncEvent {
    /// Normalize a Lemlist activity.
    pub fn from_lemlist(activity: &LemlistActivity) -> Self {
        Self {
            key: None,
            platform: "lemlist".to_string(),
            campaign_id: activity.campaign_id.clone(),
            event_type: activity.activity_type.clone(),
            email: activity.lead_email.clone().unwrap_or_default(),
            activity_id: Some(activity.id.clone()),
            occurred_at: activity.created_at,
            metadata: Value::Object(activity.extra.clone()),
        }
    }

    /// Normalize a Smartlead webhook event.
    pub fn from_smartlead(event: &SmartleadEvent) -> Self {
        let mut metadata = event.extra.clone();
        if let Some(seq_id) = event.email_campaign_seq_id {
            metadata.insert("email_campaign_seq_id".to_string(), seq_id.into());
        }
        Self {
            key: None,
            platform: "smartlead".to_string(),
            campaign_id: event.campaign_id.to_string(),
            event_type: event.event_type.clone(),
            email: event.lead_email.clone().unwrap_or_default(),
            activity_id: None,
            occurred_at: event.event_timestamp,
            metadata: Value::Object(metadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lemlist() {
        let activity: LemlistActivity = serde_json::from_value(serde_json::json!({
            "_id": "act1",
            "type": "emailsSent",
            "campaignId": "camp-678",
            "leadEmail": "a@b.com"
        }))
        .unwrap();

        let event = SyncEvent::from_lemlist(&activity);
        assert_eq!(event.platform, "lemlist");
        assert_eq!(event.campaign_id, "camp-678");
        assert_eq!(event.activity_id.as_deref(), Some("act1"));
    }

    #[test]
    fn test_from_smartlead_carries_seq_id() {
        let raw: SmartleadEvent = serde_json::from_value(serde_json::json!({
            "event_type": "EMAIL_SENT",
            "campaign_id": 42,
            "lead_email": "a@b.com",
            "email_campaign_seq_id": 7
        }))
        .unwrap();

        let event = SyncEvent::from_smartlead(&raw);
        assert_eq!(event.campaign_id, "42");
        assert_eq!(
            event.metadata.get("email_campaign_seq_id"),
            Some(&serde_json::Value::from(7))
        );
    }
}
