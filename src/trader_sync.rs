// server/src/trader_sync.rs
//
// Authoritative trader-location replication. The server keeps every location
// instance loaded; clients only stream nearby regions, so on request the
// server hands the asking client the full set of trader location instances
// as one count-prefixed batch. The client walks the list and registers each
// entry into its local location registry. Plain data replication - there is
// no further protocol.

use spacetimedb::{table, Identity, Timestamp, ReducerContext, Table};
use serde::{Serialize, Deserialize};
use log;

use crate::locations::location_instance as LocationInstanceTableTrait;
use crate::trader_classifier::trader_location_classification as TraderLocationClassificationTableTrait;

/// One replicated location instance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TraderLocationEntry {
    pub template_name: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub elevation: f32,
    pub placed: bool,
}

/// Per-recipient response row. `count` prefixes the JSON payload so the
/// client can verify it parsed the whole list.
#[table(accessor = trader_location_batch, public)]
#[derive(Clone, Debug)]
pub struct TraderLocationBatch {
    #[primary_key]
    pub recipient: Identity,
    pub count: u32,
    pub payload: String,
    pub sent: Timestamp,
}

/// Encode a batch payload. Deterministic: entries are expected pre-sorted
/// by (template name, registration order).
pub fn encode_trader_locations(entries: &[TraderLocationEntry]) -> Result<(u32, String), String> {
    let payload = serde_json::to_string(entries)
        .map_err(|e| format!("Failed to encode trader locations: {}", e))?;
    Ok((entries.len() as u32, payload))
}

/// Client asks for the authoritative trader-location set; the server
/// overwrites the client's previous batch row with a fresh one.
#[spacetimedb::reducer]
pub fn request_trader_locations(ctx: &ReducerContext) -> Result<(), String> {
    let recipient = ctx.sender();

    let mut entries: Vec<TraderLocationEntry> = Vec::new();
    let mut trader_templates: Vec<String> = ctx.db.trader_location_classification().iter()
        .filter(|c| c.is_trader_location)
        .map(|c| c.template_name)
        .collect();
    trader_templates.sort();

    for template_name in &trader_templates {
        let mut instances: Vec<_> = ctx.db.location_instance()
            .template_name()
            .filter(template_name)
            .collect();
        instances.sort_by_key(|i| i.id);
        for instance in instances {
            entries.push(TraderLocationEntry {
                template_name: instance.template_name,
                pos_x: instance.pos_x,
                pos_y: instance.pos_y,
                elevation: instance.elevation,
                placed: instance.placed,
            });
        }
    }

    let (count, payload) = encode_trader_locations(&entries)?;
    ctx.db.trader_location_batch().recipient().delete(recipient);
    ctx.db.trader_location_batch().try_insert(TraderLocationBatch {
        recipient,
        count,
        payload,
        sent: ctx.timestamp,
    }).map_err(|e| format!("Failed to store trader location batch: {}", e))?;

    log::info!(
        "[TraderSync] Sent {} trader location instances across {} templates to {:?}.",
        count, trader_templates.len(), recipient
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(template_name: &str, pos_x: f32, placed: bool) -> TraderLocationEntry {
        TraderLocationEntry {
            template_name: template_name.to_string(),
            pos_x,
            pos_y: 0.0,
            elevation: 0.0,
            placed,
        }
    }

    #[test]
    fn count_prefix_matches_entry_count() {
        let entries = vec![
            entry("fishing_village", 100.0, true),
            entry("fishing_village", 900.0, false),
            entry("hermit_cove", -40.0, false),
        ];
        let (count, payload) = encode_trader_locations(&entries).unwrap();
        assert_eq!(count, 3);
        let decoded: Vec<TraderLocationEntry> = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded.len(), count as usize);
        assert_eq!(decoded, entries);
    }

    #[test]
    fn empty_set_encodes_to_zero_count() {
        let (count, payload) = encode_trader_locations(&[]).unwrap();
        assert_eq!(count, 0);
        assert_eq!(payload, "[]");
    }
}
