//! Wire representation of saga progress.
//!
//! ```json
//! {
//!   "payload": { "id": 1 },
//!   "saga": { "index": 0, "phase": "STEP_FORWARD" }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;
use crate::state::{Phase, SagaProgress};

/// Bounds required of the payload threaded through a saga.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// The message carrying a saga's payload together with its progress.
///
/// This is the only representation of saga state: one envelope is created
/// per transition and discarded once it has been handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaEnvelope<P> {
    /// Business payload, opaque to the orchestrator.
    pub payload: P,
    /// Which step to run next, and in which direction.
    pub saga: SagaProgress,
}

impl<P> SagaEnvelope<P> {
    /// Creates an envelope.
    pub fn new(payload: P, saga: SagaProgress) -> Self {
        Self { payload, saga }
    }

    /// Returns the addressed step index.
    pub fn index(&self) -> usize {
        self.saga.index
    }

    /// Returns the direction of travel.
    pub fn phase(&self) -> Phase {
        self.saga.phase
    }
}

impl<P: Serialize> SagaEnvelope<P> {
    /// Serializes the envelope to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::Encode)
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    payload: serde_json::Value,
    saga: RawProgress,
}

#[derive(Deserialize)]
struct RawProgress {
    index: usize,
    phase: String,
}

impl<P: DeserializeOwned> SagaEnvelope<P> {
    /// Parses an envelope from JSON bytes.
    ///
    /// Decoding happens in two stages so that an unknown phase is reported
    /// as [`EnvelopeError::UnrecognizedPhase`] rather than a generic parse
    /// error. A missing payload decodes as JSON `null`.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(EnvelopeError::Malformed)?;
        let phase = raw.saga.phase.parse::<Phase>()?;
        let payload = serde_json::from_value(raw.payload).map_err(EnvelopeError::Payload)?;

        Ok(Self {
            payload,
            saga: SagaProgress {
                index: raw.saga.index,
                phase,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Booking {
        id: u64,
    }

    #[test]
    fn test_encode_matches_wire_format() {
        let envelope = SagaEnvelope::new(Booking { id: 1 }, SagaProgress::forward(0));
        let value: serde_json::Value = serde_json::from_slice(&envelope.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "payload": { "id": 1 },
                "saga": { "index": 0, "phase": "STEP_FORWARD" }
            })
        );
    }

    #[test]
    fn test_round_trip() {
        let envelope = SagaEnvelope::new(Booking { id: 7 }, SagaProgress::backward(2));
        let decoded = SagaEnvelope::<Booking>::decode(&envelope.encode().unwrap()).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.index(), 2);
        assert_eq!(decoded.phase(), Phase::Backward);
    }

    #[test]
    fn test_round_trip_with_opaque_json_payload() {
        let payload = json!({ "id": 1, "seats": ["1A", "1B"], "note": null });
        let envelope = SagaEnvelope::new(payload, SagaProgress::forward(1));
        let decoded =
            SagaEnvelope::<serde_json::Value>::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_decode_unrecognized_phase() {
        let bytes = br#"{"payload":{"id":1},"saga":{"index":0,"phase":"STEP_SIDEWAYS"}}"#;
        let result = SagaEnvelope::<Booking>::decode(bytes);
        assert!(matches!(
            result,
            Err(EnvelopeError::UnrecognizedPhase(ref phase)) if phase == "STEP_SIDEWAYS"
        ));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            SagaEnvelope::<Booking>::decode(b"not json"),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            SagaEnvelope::<Booking>::decode(br#"{"payload":{"id":1}}"#),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_negative_index_is_malformed() {
        let bytes = br#"{"payload":{"id":1},"saga":{"index":-1,"phase":"STEP_BACKWARD"}}"#;
        assert!(matches!(
            SagaEnvelope::<Booking>::decode(bytes),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_payload_type_mismatch() {
        let bytes = br#"{"payload":{"id":"one"},"saga":{"index":0,"phase":"STEP_FORWARD"}}"#;
        assert!(matches!(
            SagaEnvelope::<Booking>::decode(bytes),
            Err(EnvelopeError::Payload(_))
        ));
    }

    #[test]
    fn test_decode_missing_payload_is_null() {
        let bytes = br#"{"saga":{"index":0,"phase":"STEP_FORWARD"}}"#;
        let envelope = SagaEnvelope::<Option<Booking>>::decode(bytes).unwrap();
        assert_eq!(envelope.payload, None);
    }
}
