mod support;

use std::io::Write;

use docpipe_provision_aws::handlers::apply::apply_environment;
use docpipe_provision_aws::handlers::inspect::inspect_environment;
use docpipe_provision_core::config::EnvironmentConfig;

use support::InMemoryCloud;

fn config_json() -> &'static str {
    r#"{
        "environment": "dev",
        "name_prefix": "docpipe",
        "region": "eu-central-1",
        "bucket": "docpipe-dev-contracts"
    }"#
}

#[test]
fn inspect_reports_every_handshake_identifier_after_apply() {
    let cloud = InMemoryCloud::with_bucket("docpipe-dev-contracts");
    let config = EnvironmentConfig::from_json_str(config_json()).expect("config should parse");

    apply_environment(&cloud.adapters(), &config).expect("apply should succeed");
    let report = inspect_environment(&cloud.adapters(), &config).expect("inspect should succeed");

    assert!(report
        .repository_uri
        .expect("repository uri should be reported")
        .ends_with("docpipe-dev-pdf-processor"));
    assert!(report
        .image_uri
        .expect("image uri should be reported")
        .ends_with(":latest"));
    assert!(report.queue_url.is_some());
    assert!(report.dead_letter_queue_arn.is_some());
    assert!(report.role_arn.is_some());
    assert!(report.function_arn.is_some());
    assert!(report.trigger_binding_id.is_some());
    assert_eq!(report.discovery_parameters.len(), 2);
}

#[test]
fn inspect_of_an_unprovisioned_environment_reports_nothing() {
    let cloud = InMemoryCloud::with_bucket("docpipe-dev-contracts");
    let config = EnvironmentConfig::from_json_str(config_json()).expect("config should parse");

    let report = inspect_environment(&cloud.adapters(), &config).expect("inspect should succeed");

    assert!(report.repository_uri.is_none());
    assert!(report.queue_url.is_none());
    assert!(report.function_arn.is_none());
    assert!(report.discovery_parameters.is_empty());
}

#[test]
fn config_loads_from_a_file_with_validation() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file should create");
    file.write_all(config_json().as_bytes())
        .expect("config should write");

    let config = EnvironmentConfig::load(file.path()).expect("config should load");

    assert_eq!(config.environment, "dev");
    assert_eq!(config.queue.max_receive_count, 4);
}

#[test]
fn invalid_config_file_fails_to_load() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file should create");
    file.write_all(
        br#"{
            "environment": "dev",
            "name_prefix": "docpipe",
            "region": "eu-central-1",
            "bucket": "docpipe-dev-contracts",
            "queue": { "visibility_timeout_seconds": 60 },
            "compute": { "timeout_seconds": 900 }
        }"#,
    )
    .expect("config should write");

    let error = EnvironmentConfig::load(file.path()).expect_err("load should fail validation");
    assert!(error.to_string().contains("visibility_timeout_seconds"));
}
