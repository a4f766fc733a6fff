// Field-mapping transformer
// Pure, deterministic field-name translation between an ERP's native schema
// and the internal schema, driven by a per-entity-type mapping table.

use serde_json::{Map, Value};

use crate::models::integration::MappingTable;

/// A record as exchanged with an ERP: a flat JSON object.
pub type ErpRecord = Map<String, Value>;

/// Translate an external record into internal field names.
///
/// Mapped fields are copied external -> internal. Fields not present in the
/// table pass through unchanged. A field that is a mapping source is never
/// also passed through, and a mapped value wins over a pass-through field of
/// the same target name. No table for the entity type returns the record
/// unmodified.
pub fn apply_mapping(record: &ErpRecord, entity_type: &str, table: &MappingTable) -> ErpRecord {
    let Some(fields) = table.get(entity_type) else {
        return record.clone();
    };

    let mut out = ErpRecord::new();

    // Pass-through first so mapped values override on collision.
    for (key, value) in record {
        if !fields.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }

    for (external_field, internal_field) in fields {
        if let Some(value) = record.get(external_field) {
            out.insert(internal_field.clone(), value.clone());
        }
    }

    out
}

/// Translate an internal record back into external field names.
///
/// Reverse mapping emits only mapped fields; unmapped fields are dropped.
pub fn apply_reverse_mapping(
    record: &ErpRecord,
    entity_type: &str,
    table: &MappingTable,
) -> ErpRecord {
    let Some(fields) = table.get(entity_type) else {
        return record.clone();
    };

    let mut out = ErpRecord::new();

    for (external_field, internal_field) in fields {
        if let Some(value) = record.get(internal_field) {
            out.insert(external_field.clone(), value.clone());
        }
    }

    out
}

/// Overlay a configuration's mapping overrides onto an adapter's default
/// table. Entity types and fields not mentioned in the overlay are kept.
pub fn merge_tables(base: &MappingTable, overlay: &MappingTable) -> MappingTable {
    let mut merged = base.clone();
    for (entity_type, fields) in overlay {
        merged
            .entry(entity_type.clone())
            .or_default()
            .extend(fields.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn table() -> MappingTable {
        HashMap::from([(
            "assets".to_string(),
            HashMap::from([
                ("EQUNR".to_string(), "asset_number".to_string()),
                ("EQKTX".to_string(), "name".to_string()),
                ("HERST".to_string(), "manufacturer".to_string()),
            ]),
        )])
    }

    fn record(value: Value) -> ErpRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn maps_known_fields_and_passes_through_the_rest() {
        let input = record(json!({
            "EQUNR": "10001",
            "EQKTX": "Hydraulic pump",
            "SERGE": "SN-443"
        }));

        let out = apply_mapping(&input, "assets", &table());

        assert_eq!(out["asset_number"], "10001");
        assert_eq!(out["name"], "Hydraulic pump");
        // unmapped field passes through
        assert_eq!(out["SERGE"], "SN-443");
        // the mapping source is not double-applied
        assert!(!out.contains_key("EQUNR"));
    }

    #[test]
    fn mapped_value_wins_over_pass_through_collision() {
        let input = record(json!({
            "EQKTX": "from ERP",
            "name": "stale local value"
        }));

        let out = apply_mapping(&input, "assets", &table());
        assert_eq!(out["name"], "from ERP");
    }

    #[test]
    fn missing_table_returns_record_unchanged() {
        let input = record(json!({"EQUNR": "10001"}));
        let out = apply_mapping(&input, "inventory", &table());
        assert_eq!(out, input);
    }

    #[test]
    fn reverse_emits_only_mapped_fields() {
        let input = record(json!({
            "asset_number": "10001",
            "manufacturer": "Bosch",
            "local_only": true
        }));

        let out = apply_reverse_mapping(&input, "assets", &table());
        assert_eq!(out["EQUNR"], "10001");
        assert_eq!(out["HERST"], "Bosch");
        assert!(!out.contains_key("local_only"));
    }

    #[test]
    fn round_trip_preserves_mapped_fields_and_is_lossy_for_pass_through() {
        let original = record(json!({
            "EQUNR": "10001",
            "EQKTX": "Pump",
            "HERST": "Bosch",
            "UNMAPPED": "extra"
        }));

        let forward = apply_mapping(&original, "assets", &table());
        let back = apply_reverse_mapping(&forward, "assets", &table());

        // every field in the table's set survives the round trip
        assert_eq!(back["EQUNR"], original["EQUNR"]);
        assert_eq!(back["EQKTX"], original["EQKTX"]);
        assert_eq!(back["HERST"], original["HERST"]);
        // pass-through fields are dropped on the way back, by contract
        assert!(!back.contains_key("UNMAPPED"));
    }
}
