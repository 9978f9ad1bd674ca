//! Ledger wire types
//!
//! DTOs for the ledger JSON API: commands, events, updates and active
//! contracts. Payloads stay as `serde_json::Value` at this layer; typed
//! decoding into `models::*` happens at the call site so the gateway stays
//! template-agnostic.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

use super::error::LedgerError;

// ============================================================================
// Template identity
// ============================================================================

/// Fully qualified template identifier, `packageId:module:entity` on the
/// wire. Unqualified names never cross the gateway boundary; package ids
/// are resolved through discovery first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateId {
    pub package_id: String,
    pub module: String,
    pub entity: String,
}

impl TemplateId {
    pub fn new(package_id: &str, module: &str, entity: &str) -> Self {
        Self {
            package_id: package_id.to_string(),
            module: module.to_string(),
            entity: entity.to_string(),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}:{}:{}", self.package_id, self.module, self.entity)
    }

    /// Entity name of a qualified template id string, used to classify
    /// stream events without caring which package produced them.
    pub fn entity_of(qualified: &str) -> &str {
        qualified.rsplit(':').next().unwrap_or(qualified)
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

impl Serialize for TemplateId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.qualified())
    }
}

// ============================================================================
// Commands
// ============================================================================

/// A single ledger command. Batches submitted together are atomic.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    Create {
        template_id: TemplateId,
        payload: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    Exercise {
        template_id: TemplateId,
        contract_id: String,
        choice: String,
        argument: serde_json::Value,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Caller-supplied idempotency key; repeating it within the server's
    /// deduplication window must not produce a second effect.
    pub command_id: String,
    pub act_as: Vec<String>,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub update_offset: u64,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
}

impl SubmitResult {
    /// First created event whose template entity matches, decoded.
    pub fn find_created(&self, entity: &str) -> Option<&CreatedEvent> {
        self.events.iter().find_map(|event| match event {
            LedgerEvent::Created(created) if created.entity() == entity => Some(created),
            _ => None,
        })
    }
}

// ============================================================================
// Events and updates
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerEvent {
    Created(CreatedEvent),
    Archived(ArchivedEvent),
    Exercised(ExercisedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub contract_id: String,
    pub template_id: String,
    pub payload: serde_json::Value,
}

impl CreatedEvent {
    pub fn entity(&self) -> &str {
        TemplateId::entity_of(&self.template_id)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, LedgerError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            LedgerError::Internal(format!(
                "undecodable {} payload for {}: {}",
                self.template_id, self.contract_id, e
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedEvent {
    pub contract_id: String,
    pub template_id: String,
}

impl ArchivedEvent {
    pub fn entity(&self) -> &str {
        TemplateId::entity_of(&self.template_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExercisedEvent {
    pub contract_id: String,
    pub template_id: String,
    pub choice: String,
    #[serde(default)]
    pub argument: serde_json::Value,
    #[serde(default)]
    pub consuming: bool,
}

/// One transaction on the update stream. Offsets are strictly monotone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerUpdate {
    pub offset: u64,
    pub events: Vec<LedgerEvent>,
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub template_ids: Vec<TemplateId>,
    /// Party scope of the filter. Admin-wide filters are forbidden for
    /// non-operator callers, so this is always present.
    pub readers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub result: Vec<ActiveContract>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveContract {
    pub contract_id: String,
    pub template_id: String,
    pub payload: serde_json::Value,
    /// Offset of the transaction that created this contract. Absent on
    /// older API versions; treated as 0 so any stream event supersedes it.
    #[serde(default)]
    pub offset: u64,
}

impl ActiveContract {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, LedgerError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            LedgerError::Internal(format!(
                "undecodable {} payload for {}: {}",
                self.template_id, self.contract_id, e
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PackageListResponse {
    #[serde(default)]
    pub result: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_id_round_trip() {
        let tid = TemplateId::new("pkg123", "Exchange", "OrderBook");
        assert_eq!(tid.qualified(), "pkg123:Exchange:OrderBook");
        assert_eq!(TemplateId::entity_of("pkg123:Exchange:OrderBook"), "OrderBook");
        assert_eq!(serde_json::to_value(&tid).unwrap(), "pkg123:Exchange:OrderBook");
    }

    #[test]
    fn command_wire_shape() {
        let cmd = Command::Exercise {
            template_id: TemplateId::new("pkg", "Exchange", "OrderBook"),
            contract_id: "#book-1".into(),
            choice: "AddOrder".into(),
            argument: json!({"orderId": "o-1"}),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "exercise");
        assert_eq!(json["contractId"], "#book-1");
        assert_eq!(json["templateId"], "pkg:Exchange:OrderBook");
    }

    #[test]
    fn event_classification_by_entity() {
        let update: LedgerUpdate = serde_json::from_value(json!({
            "offset": 42,
            "events": [
                {"created": {"contractId": "#o-1", "templateId": "pkg:Exchange:Order", "payload": {}}},
                {"archived": {"contractId": "#b-0", "templateId": "pkg:Exchange:OrderBook"}}
            ]
        }))
        .unwrap();

        assert_eq!(update.offset, 42);
        match &update.events[0] {
            LedgerEvent::Created(created) => assert_eq!(created.entity(), "Order"),
            other => panic!("expected created event, got {:?}", other),
        }
    }
}
