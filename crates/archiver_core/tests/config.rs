use archiver_core::{
    parse_formats, BlockDetector, ConfigError, EvasionConfig, OutputFormat, OxylabsCredentials,
    ZenRowsCredentials,
};
use pretty_assertions::assert_eq;

fn zenrows() -> ZenRowsCredentials {
    ZenRowsCredentials {
        api_key: "key".into(),
    }
}

fn oxylabs() -> OxylabsCredentials {
    OxylabsCredentials {
        username: "user".into(),
        password: "pass".into(),
    }
}

#[test]
fn formats_keep_request_order_and_drop_duplicates() {
    let formats = parse_formats(&["pdf", "html", "pdf", "markdown"]).unwrap();
    assert_eq!(
        formats,
        vec![OutputFormat::Pdf, OutputFormat::Html, OutputFormat::Markdown]
    );
}

#[test]
fn unknown_format_is_rejected() {
    let err = parse_formats(&["html", "docx"]).unwrap_err();
    assert_eq!(err, ConfigError::UnsupportedFormat("docx".into()));
}

#[test]
fn empty_format_list_is_rejected() {
    let names: [&str; 0] = [];
    assert_eq!(parse_formats(&names).unwrap_err(), ConfigError::EmptyFormatList);
}

#[test]
fn both_evasion_providers_conflict() {
    let err = EvasionConfig::from_credentials(Some(zenrows()), Some(oxylabs())).unwrap_err();
    assert_eq!(err, ConfigError::ConflictingEvasionProviders);
}

#[test]
fn single_provider_is_selected() {
    assert_eq!(
        EvasionConfig::from_credentials(Some(zenrows()), None).unwrap(),
        EvasionConfig::ZenRows(zenrows())
    );
    assert_eq!(
        EvasionConfig::from_credentials(None, Some(oxylabs()))
            .unwrap()
            .provider_name(),
        Some("oxylabs")
    );
    assert!(!EvasionConfig::from_credentials(None, None)
        .unwrap()
        .is_enabled());
}

#[test]
fn blank_api_key_is_rejected() {
    let creds = ZenRowsCredentials {
        api_key: "  ".into(),
    };
    assert!(matches!(
        EvasionConfig::from_credentials(Some(creds), None),
        Err(ConfigError::InvalidCredential(_))
    ));
}

#[test]
fn block_detector_status_rules() {
    let detector = BlockDetector::default();
    assert!(detector.is_blocked(403, "<html>Forbidden</html>"));
    assert!(detector.is_blocked(503, ""));
    assert!(!detector.is_blocked(404, "<html>Not found</html>"));
    assert!(!detector.is_blocked(200, "<html><p>Hello</p></html>"));
}

#[test]
fn block_detector_matches_challenge_markers() {
    let detector = BlockDetector::default();
    assert!(detector.is_blocked(200, "<title>Just a moment...</title>"));
    assert!(detector.is_blocked(
        200,
        r#"<script src="https://geo.captcha-delivery.com/captcha/"></script>"#
    ));
    // Case-sensitive on purpose.
    assert!(!detector.is_blocked(200, "<title>just a moment...</title>"));
}

#[test]
fn block_detector_markers_are_configurable() {
    let detector = BlockDetector::with_markers(["Access denied by robots", ""]);
    assert_eq!(detector.markers().len(), 1);
    assert!(detector.is_blocked(200, "Access denied by robots"));
    assert!(!detector.is_blocked(200, "Just a moment..."));
}
