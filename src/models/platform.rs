//! Native event payloads from the outreach platforms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An activity record as returned by the Lemlist activities API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LemlistActivity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(rename = "campaignId")]
    pub campaign_id: String,
    #[serde(rename = "leadEmail", default)]
    pub lead_email: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Remaining payload fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A webhook event as delivered by Smartlead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartleadEvent {
    pub event_type: String,
    pub campaign_id: i64,
    #[serde(default)]
    pub lead_email: Option<String>,
    #[serde(default)]
    pub email_campaign_seq_id: Option<i64>,
    #[serde(default)]
    pub event_timestamp: Option<DateTime<Utc>>,
    /// Remaining payload fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lemlist_activity_deserializes() {
        let raw = serde_json::json!({
            "_id": "act_8f2",
            "type": "emailsOpened",
            "campaignId": "cam_123",
            "leadEmail": "jane@acme.io",
            "createdAt": "2026-03-01T12:00:00Z",
            "sequenceStep": 2
        });

        let activity: LemlistActivity = serde_json::from_value(raw).unwrap();
        assert_eq!(activity.id, "act_8f2");
        assert_eq!(activity.activity_type, "emailsOpened");
        assert_eq!(activity.campaign_id, "cam_123");
        assert_eq!(activity.extra.get("sequenceStep"), Some(&Value::from(2)));
    }

    #[test]
    fn test_smartlead_event_deserializes() {
        let raw = serde_json::json!({
            "event_type": "EMAIL_REPLY",
            "campaign_id": 4411,
            "lead_email": "jane@acme.io",
            "email_campaign_seq_id": 9,
            "secondary_email": null
        });

        let event: SmartleadEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type, "EMAIL_REPLY");
        assert_eq!(event.campaign_id, 4411);
        assert_eq!(event.email_campaign_seq_id, Some(9));
        assert!(event.event_timestamp.is_none());
    }
}
