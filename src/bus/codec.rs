//! Wire encoding of batches on the bus (JSON)

use crate::Batch;

use super::BusError;

pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>, BusError> {
    Ok(serde_json::to_vec(batch)?)
}

pub fn decode_batch(payload: &[u8]) -> Result<Batch, BusError> {
    Ok(serde_json::from_slice(payload)?)
}
