fn main() {
    println!("Run `cargo test -p format-compat` to execute format compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use swarmshare_protocol::{ChunkStatusReport, DownloadJobRecord, FileDescriptor, Message};

    /// Returns the path to the committed fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture file as raw JSON text.
    ///
    /// Envelope payloads are `RawValue`, which only deserializes from
    /// text, so fixtures are always parsed from the string form.
    fn load_raw(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal
    /// (`65` vs `65.0` are semantically the same number).
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    serde_json::json!(f)
                } else {
                    v.clone()
                }
            }
            serde_json::Value::Object(map) => {
                let normalized: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect();
                serde_json::Value::Object(normalized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and
    /// compares the JSON values. A mismatch means the persisted format
    /// drifted and stored files from older builds would no longer load.
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let raw = load_raw(name);
        let fixture: serde_json::Value = serde_json::from_str(&raw)
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"));
        let parsed: T = serde_json::from_str(&raw)
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        let norm_fixture = normalize_value(&fixture);
        let norm_reserialized = normalize_value(&reserialized);
        assert_eq!(
            norm_fixture, norm_reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
    }

    // --- Persisted formats ---

    #[test]
    fn fixture_file_descriptor() {
        roundtrip_test::<FileDescriptor>("file_descriptor.json");
    }

    #[test]
    fn fixture_download_job_record() {
        roundtrip_test::<DownloadJobRecord>("download_job_record.json");
    }

    #[test]
    fn file_descriptor_placement_keys_are_strings() {
        // BTreeMap<u32, PeerId> lands in JSON with stringified keys; the
        // fixture pins that so readers in other languages agree.
        let fixture: serde_json::Value =
            serde_json::from_str(&load_raw("file_descriptor.json")).unwrap();
        let placement = fixture["placement"].as_object().unwrap();
        assert_eq!(placement["0"], "peer-a");
        assert_eq!(placement["2"], "peer-c");
    }

    #[test]
    fn job_record_pins_state_spellings() {
        let record: DownloadJobRecord =
            serde_json::from_str(&load_raw("download_job_record.json")).unwrap();
        assert_eq!(
            serde_json::to_value(record.state).unwrap(),
            serde_json::json!("partialStalled")
        );
        assert_eq!(
            serde_json::to_value(record.chunk_states[&1]).unwrap(),
            serde_json::json!("failed")
        );
    }

    // --- Wire formats ---

    #[test]
    fn fixture_chunk_status_report() {
        roundtrip_test::<ChunkStatusReport>("chunk_status_report.json");
    }

    #[test]
    fn fixture_publish_descriptor_message() {
        roundtrip_test::<Message>("publish_descriptor_message.json");
    }

    #[test]
    fn fixture_descriptor_response_miss() {
        roundtrip_test::<Message>("descriptor_response_miss.json");
    }

    #[test]
    fn fixture_error_message() {
        roundtrip_test::<Message>("error_message.json");
    }

    #[test]
    fn error_message_carries_no_payload() {
        let msg: Message = serde_json::from_str(&load_raw("error_message.json")).unwrap();
        assert!(msg.payload.is_none());
        let err = msg.error.unwrap();
        assert_eq!(err.code, 400);
    }

    #[test]
    fn publish_message_payload_decodes_to_descriptor() {
        let msg: Message =
            serde_json::from_str(&load_raw("publish_descriptor_message.json")).unwrap();
        let payload: Option<swarmshare_protocol::messages::PublishDescriptorRequest> =
            msg.parse_payload().unwrap();
        let descriptor = payload.unwrap().descriptor;
        assert_eq!(descriptor.chunk_count, 3);
        assert!(descriptor.has_complete_placement());
    }

    #[test]
    fn descriptor_response_miss_decodes_to_none() {
        let msg: Message =
            serde_json::from_str(&load_raw("descriptor_response_miss.json")).unwrap();
        let payload: Option<swarmshare_protocol::messages::DescriptorResponse> =
            msg.parse_payload().unwrap();
        assert!(payload.unwrap().descriptor.is_none());
    }
}
