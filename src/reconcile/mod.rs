use crate::error::InputError;
use crate::models::{
    composite_key, Address, AddressInventory, FootprintIndex, FootprintRecord, MatchedAddress,
    ReconciliationResult,
};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

const SHARP_S_SUFFIX: &str = "traße";
const ASCII_SUFFIX: &str = "trasse";

/// Reads an Overpass-style `{"elements": [...]}` document
pub async fn load_footprints(path: &Path) -> Result<FootprintIndex, InputError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| InputError::from_io(path, e))?;

    let document: Value =
        serde_json::from_str(&raw).map_err(|e| InputError::MalformedFootprints {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let index = index_footprints(&document).ok_or_else(|| InputError::MalformedFootprints {
        path: path.to_path_buf(),
        reason: "no top-level \"elements\" array".to_string(),
    })?;

    info!(path = %path.display(), addresses = index.len(), "Loaded building footprints");
    Ok(index)
}

/// Groups elements by `"<addr:street> <addr:housenumber>"`. Elements lacking
/// either tag are skipped. `None` when there is no `elements` array.
pub fn index_footprints(document: &Value) -> Option<FootprintIndex> {
    let elements = document.get("elements")?.as_array()?;
    let mut index = FootprintIndex::new();
    let mut skipped = 0;

    for element in elements {
        match address_of(element) {
            Some((street, housenumber)) => {
                index.insert(composite_key(&street, &housenumber), element.clone());
            }
            None => skipped += 1,
        }
    }

    debug!(elements = elements.len(), skipped, "Indexed footprints");
    Some(index)
}

fn address_of(element: &Value) -> Option<(String, String)> {
    let tags = element.get("tags")?.as_object()?;
    let street = tag_text(tags.get("addr:street")?)?;
    let housenumber = tag_text(tags.get("addr:housenumber")?)?;
    Some((street, housenumber))
}

fn tag_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Keys tried for one address, in order: exact, `traße`→`trasse`, `trasse`→`traße`
pub fn lookup_keys(address: &Address) -> [String; 3] {
    let street = &address.street;
    [
        composite_key(street, &address.housenumber),
        composite_key(&street.replace(SHARP_S_SUFFIX, ASCII_SUFFIX), &address.housenumber),
        composite_key(&street.replace(ASCII_SUFFIX, SHARP_S_SUFFIX), &address.housenumber),
    ]
}

/// Partitions every inventory address into matched or unmatched.
/// The first lookup key that hits decides the footprint set.
pub fn reconcile(inventory: &AddressInventory, footprints: &FootprintIndex) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();

    for address in inventory.addresses() {
        let hit = lookup_keys(&address)
            .into_iter()
            .find_map(|key| footprints.get(&key).map(|records| (key, records)));

        match hit {
            Some((matched_key, records)) => {
                for (position, record) in records.iter().enumerate() {
                    result
                        .footprints
                        .entry(footprint_identity(record, &matched_key, position))
                        .or_insert_with(|| record.clone());
                }
                result.matched.push(MatchedAddress {
                    address,
                    matched_key,
                    footprints: records.to_vec(),
                });
            }
            None => result.unmatched.push(address),
        }
    }

    info!(
        matched = result.matched.len(),
        unmatched = result.unmatched.len(),
        footprints = result.footprints.len(),
        "Reconciliation finished"
    );
    result
}

/// `"<type>/<id>"` when the element carries both, else the address key and position
fn footprint_identity(record: &FootprintRecord, key: &str, position: usize) -> String {
    let kind = record.get("type").and_then(Value::as_str);
    let id = record.get("id").and_then(tag_text);
    match (kind, id) {
        (Some(kind), Some(id)) => format!("{kind}/{id}"),
        _ => format!("{key}#{position}"),
    }
}
