// Entity map BLOB: [version: u8][wincode Vec<EntityEntry>].

use wincode::{SchemaRead, SchemaWrite};

use super::{StoreError, StoreResult};
use crate::models::{EntityMap, MetricSample};

pub(super) const BLOB_VERSION: u8 = 1;

#[derive(SchemaRead, SchemaWrite)]
struct EntityEntry {
    id: String,
    sample: MetricSample,
}

fn with_version_prefix(version: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(version);
    out.extend_from_slice(&payload);
    out
}

pub(super) fn blob_version(bytes: &[u8]) -> u8 {
    if bytes.is_empty() { 0 } else { bytes[0] }
}

pub(super) fn encode_entities(entities: &EntityMap) -> StoreResult<Vec<u8>> {
    let entries: Vec<EntityEntry> = entities
        .iter()
        .map(|(id, sample)| EntityEntry {
            id: id.clone(),
            sample: sample.clone(),
        })
        .collect();
    let payload = wincode::serialize(&entries)
        .map_err(|e| StoreError::Encoding(format!("wincode: {}", e)))?;
    Ok(with_version_prefix(BLOB_VERSION, payload))
}

pub(super) fn decode_entities(bytes: &[u8]) -> StoreResult<EntityMap> {
    let version = blob_version(bytes);
    if version != BLOB_VERSION {
        return Err(StoreError::Encoding(format!(
            "unknown entity blob version {}",
            version
        )));
    }
    let entries: Vec<EntityEntry> = wincode::deserialize(&bytes[1..])
        .map_err(|e| StoreError::Encoding(format!("wincode: {}", e)))?;
    Ok(entries.into_iter().map(|e| (e.id, e.sample)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_survive_blob_encoding() {
        let mut entities = EntityMap::new();
        entities.insert(
            "web".into(),
            MetricSample {
                cpu_percent: 12.5,
                memory_limit: 7836.0,
                pids: 9,
                ..MetricSample::named("web")
            },
        );
        let bytes = encode_entities(&entities).unwrap();
        assert_eq!(blob_version(&bytes), BLOB_VERSION);
        assert_eq!(decode_entities(&bytes).unwrap(), entities);
    }

    #[test]
    fn unknown_version_is_an_error() {
        assert!(decode_entities(&[]).is_err());
        assert!(decode_entities(&[9, 0, 0]).is_err());
    }
}
