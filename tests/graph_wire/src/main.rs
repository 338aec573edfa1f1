fn main() {
    println!("Run `cargo test -p graph-wire` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use skylift_graph::{
        ConflictBehavior, DriveItem, DriveQuota, TokenResponse, UploadSessionItem,
        UploadSessionRequest, UploadSessionResponse,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, ignoring fields the
    /// service adds that we never read.
    fn parse_fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
        serde_json::from_value(load_fixture(name))
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"))
    }

    // --- Responses the service sends us ---

    #[test]
    fn fixture_upload_session_response() {
        let resp: UploadSessionResponse = parse_fixture("upload_session_response.json");
        assert!(resp.upload_url.starts_with("https://sn3302.up.1drv.com/up/"));
        assert_eq!(
            resp.expiration_date_time.as_deref(),
            Some("2026-01-29T09:21:55.523Z")
        );
        assert_eq!(resp.next_expected_ranges.unwrap(), vec!["0-"]);
    }

    #[test]
    fn fixture_drive_item_with_hashes() {
        let item: DriveItem = parse_fixture("drive_item_with_hashes.json");
        assert_eq!(item.id, "0123456789ABC!104");
        assert_eq!(item.name.as_deref(), Some("vacation.mp4"));
        assert_eq!(item.size, Some(57344021));

        let file = item.file.expect("file facet");
        assert_eq!(file.mime_type.as_deref(), Some("video/mp4"));
        let hashes = file.hashes.expect("hashes facet");
        assert_eq!(
            hashes.quick_xor_hash.as_deref(),
            Some("YSBoYXNoIG9mIHNvcnRzAAAAAAA=")
        );
        assert!(hashes.sha1_hash.is_some());
        assert!(hashes.sha256_hash.is_some());
    }

    #[test]
    fn fixture_drive_quota() {
        let quota: DriveQuota = parse_fixture("drive_quota.json");
        assert_eq!(quota.total, 1104880336896);
        assert_eq!(quota.used, 5432983357);
        assert_eq!(quota.remaining, 1099447353539);
        assert_eq!(quota.deleted, 256938);
        assert_eq!(quota.state.as_deref(), Some("normal"));
    }

    #[test]
    fn fixture_token_response() {
        let token: TokenResponse = parse_fixture("token_response.json");
        assert!(token.access_token.starts_with("EwBgA8l6BAAU"));
        assert!(token.refresh_token.unwrap().starts_with("M.C519_BAY"));
        assert_eq!(token.expires_in, 3600);
    }

    // --- Requests we send the service ---

    #[test]
    fn upload_session_request_serializes_exactly() {
        let request = UploadSessionRequest {
            item: UploadSessionItem {
                conflict_behavior: ConflictBehavior::Replace,
            },
        };
        let serialized = serde_json::to_value(&request).unwrap();
        assert_eq!(serialized, load_fixture("upload_session_request.json"));
    }

    // --- Responses stripped down to their minimum ---

    #[test]
    fn drive_item_without_file_facet() {
        // Folders carry no file facet at all.
        let json = r#"{
            "id": "0123456789ABC!103",
            "name": "Attachments",
            "size": 4202
        }"#;
        let item: DriveItem = serde_json::from_str(json).unwrap();
        assert!(item.file.is_none());
    }

    #[test]
    fn token_response_without_refresh_token() {
        let json = r#"{
            "access_token": "tok",
            "expires_in": 3600
        }"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(
            token.refresh_token.is_none(),
            "missing field should default to None"
        );
    }

    #[test]
    fn upload_session_response_minimal() {
        let json = r#"{"uploadUrl": "https://up.example/s"}"#;
        let resp: UploadSessionResponse = serde_json::from_str(json).unwrap();
        assert!(resp.expiration_date_time.is_none());
        assert!(resp.next_expected_ranges.is_none());
    }
}
