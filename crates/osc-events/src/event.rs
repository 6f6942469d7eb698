//! Domain event shape fanned out by the broker (§4.11).

use osc_core::ids::SpaceId;
use serde::{Deserialize, Serialize};

/// Every event kind an Object Manager may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(rename = "chat:message:new")]
    ChatMessageNew,
    #[serde(rename = "chat:message:edit")]
    ChatMessageEdit,
    #[serde(rename = "chat:message:delete")]
    ChatMessageDelete,
    #[serde(rename = "chat:channel:new")]
    ChatChannelNew,
    #[serde(rename = "chat:reaction:add")]
    ChatReactionAdd,
    #[serde(rename = "chat:reaction:remove")]
    ChatReactionRemove,
    NoticeCreated,
    NoticePublished,
    NoticeArchived,
    NoticeComment,
    NoticeReaction,
}

/// One published event: a typed kind plus an opaque JSON body the subscriber
/// decodes according to `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub space_id: SpaceId,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: EventType, space_id: SpaceId, data: serde_json::Value) -> Self {
        Self {
            event_type,
            space_id,
            data,
        }
    }
}
