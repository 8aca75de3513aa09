//! Platform-specific key extraction.
//!
//! Thin wrappers that pull identifying fields out of each platform's
//! native event shape and delegate to [`EventKeyGenerator::generate`].

use serde_json::Value;

use super::{EventKeyFields, EventKeyGenerator};
use crate::models::{LemlistActivity, SmartleadEvent, SyncEvent};

impl EventKeyGenerator {
    /// Key for a Lemlist activity.
    pub fn for_lemlist_activity(&mut self, activity: &LemlistActivity) -> String {
        self.generate(&EventKeyFields {
            platform: "lemlist".to_string(),
            campaign_id: activity.campaign_id.clone(),
            event_type: activity.activity_type.clone(),
            email: activity.lead_email.clone().unwrap_or_default(),
            activity_id: Some(activity.id.clone()),
            timestamp: activity.created_at,
            namespace: None,
            metadata: Value::Object(activity.extra.clone()),
        })
    }

    /// Key for a Smartlead webhook event.
    pub fn for_smartlead_event(&mut self, event: &SmartleadEvent) -> String {
        let mut metadata = event.extra.clone();
        if let Some(seq_id) = event.email_campaign_seq_id {
            metadata.insert("email_campaign_seq_id".to_string(), seq_id.into());
        }
        self.generate(&EventKeyFields {
            platform: "smartlead".to_string(),
            campaign_id: event.campaign_id.to_string(),
            event_type: event.event_type.clone(),
            email: event.lead_email.clone().unwrap_or_default(),
            activity_id: None,
            timestamp: event.event_timestamp,
            namespace: None,
            metadata: Value::Object(metadata),
        })
    }

    /// Key for an already-normalized event.
    pub fn for_sync_event(&mut self, event: &SyncEvent) -> String {
        self.generate(&EventKeyFields {
            platform: event.platform.clone(),
            campaign_id: event.campaign_id.clone(),
            event_type: event.event_type.clone(),
            email: event.email.clone(),
            activity_id: event.activity_id.clone(),
            timestamp: event.occurred_at,
            namespace: None,
            metadata: event.metadata.clone(),
        })
    }
}
