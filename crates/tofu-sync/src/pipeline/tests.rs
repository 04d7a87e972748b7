//! Scenario tests for the sync pipeline against a mock registry

use super::*;

use camino::Utf8PathBuf;
use serde_json::json;
use tempfile::TempDir;
use tofu_core::utils::compute_hash;
use tofu_store::{CasStore, FileLedger, ObjectStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    _dir: TempDir,
    pipeline: SyncPipeline,
    ledger: Arc<FileLedger>,
    store: Arc<CasStore>,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

    let store = Arc::new(CasStore::new(root.join("objects")).unwrap());
    let ledger = Arc::new(FileLedger::open(root.join("ledger")).unwrap());
    let client = RegistryClient::new().unwrap();
    let fetcher = Arc::new(ArtifactFetcher::new(client.http().clone(), store.clone()));
    let pipeline = SyncPipeline::new(client, fetcher, ledger.clone());

    Harness {
        _dir: dir,
        pipeline,
        ledger,
        store,
    }
}

fn remote(server: &MockServer, includes: &[&str], excludes: &[&str]) -> RemoteConfig {
    let mut remote = RemoteConfig::new("upstream", &server.uri())
        .with_includes(includes.iter().copied())
        .with_excludes(excludes.iter().copied());
    remote.max_retries = 0;
    remote
}

async fn mount_module(server: &MockServer, address: &str, versions: &[&str]) {
    let listed: Vec<_> = versions.iter().map(|v| json!({ "version": v })).collect();
    Mock::given(method("GET"))
        .and(path(format!("/{}/versions", address)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "modules": [{ "versions": listed }] })))
        .mount(server)
        .await;

    for version in versions {
        let file = format!("/files/{}/{}.tar.gz", address, version);
        Mock::given(method("GET"))
            .and(path(format!("/{}/{}/download", address, version)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "location": format!("{}{}", server.uri(), file) })),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(file))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("{}@{}", address, version).into_bytes()))
            .mount(server)
            .await;
    }
}

/// Provider with one version and the given platforms; `shasum` overrides the advertised digest
async fn mount_provider(server: &MockServer, address: &str, version: &str, platforms: &[(&str, &str)], shasum: Option<&str>) {
    let listed: Vec<_> = platforms.iter().map(|(os, arch)| json!({ "os": os, "arch": arch })).collect();
    Mock::given(method("GET"))
        .and(path(format!("/{}/versions", address)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": [{ "version": version, "protocols": ["5.0"], "platforms": listed }]
        })))
        .mount(server)
        .await;

    for (os, arch) in platforms {
        let body = format!("{}@{} {}_{}", address, version, os, arch);
        let digest = shasum
            .map(str::to_string)
            .unwrap_or_else(|| compute_hash(body.as_bytes()).to_hex());
        let filename = format!("provider_{}_{}_{}.zip", version, os, arch);
        let file = format!("/files/{}/{}", address, filename);

        Mock::given(method("GET"))
            .and(path(format!("/{}/{}/download/{}/{}", address, version, os, arch)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "protocols": ["5.0"],
                "os": os,
                "arch": arch,
                "filename": filename,
                "download_url": format!("{}{}", server.uri(), file),
                "shasum": digest
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(file))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into_bytes()))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_two_versions_produce_two_records() {
    let server = MockServer::start().await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0", "1.1.0"]).await;
    let h = harness();

    let report = h
        .pipeline
        .run("main", &remote(&server, &["hashicorp/consul/aws"], &[]), SyncMode::Additive)
        .await
        .unwrap();

    assert_eq!(report.state, SyncState::Committed);
    assert_eq!(report.version, 1);
    assert_eq!(report.records, 2);
    assert_eq!(report.added, 2);
    assert!(report.skipped.is_empty());

    let snapshot = h.ledger.latest("main").unwrap();
    assert_eq!(snapshot.content.len(), 2);
    for record in snapshot.content.iter() {
        assert_eq!(record.address.path(), "hashicorp/consul/aws");
        let digest = record.digest.unwrap();
        assert!(h.store.contains(&digest));
        assert_eq!(
            h.store.get(&digest).unwrap(),
            format!("hashicorp/consul/aws@{}", record.version).into_bytes()
        );
    }
    assert_eq!(h.pipeline.state(), SyncState::Committed);
}

#[tokio::test]
async fn test_namespace_exclude_drops_everything() {
    let server = MockServer::start().await;
    let h = harness();

    let report = h
        .pipeline
        .run(
            "main",
            &remote(&server, &["hashicorp/consul/aws"], &["hashicorp/*"]),
            SyncMode::Additive,
        )
        .await
        .unwrap();

    assert_eq!(report.records, 0);
    assert_eq!(report.addresses, 1);
    assert!(h.ledger.latest("main").unwrap().content.is_empty());
}

#[tokio::test]
async fn test_one_missing_address_among_three() {
    let server = MockServer::start().await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0"]).await;
    mount_module(&server, "hashicorp/vault/aws", &["2.0.0"]).await;
    Mock::given(method("GET"))
        .and(path("/hashicorp/nomad/aws/versions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let h = harness();

    let includes = ["hashicorp/consul/aws", "hashicorp/nomad/aws", "hashicorp/vault/aws"];
    let report = h
        .pipeline
        .run("main", &remote(&server, &includes, &[]), SyncMode::Additive)
        .await
        .unwrap();

    assert_eq!(report.state, SyncState::Committed);
    assert_eq!(report.records, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].unit, "hashicorp/nomad/aws");
    assert_eq!(report.addresses, 3);
    assert_eq!(h.pipeline.progress().current().completed, 3);
}

#[tokio::test]
async fn test_digest_mismatch_rejects_only_that_record() {
    let server = MockServer::start().await;
    mount_provider(&server, "opentofu/random", "3.7.2", &[("linux", "amd64")], None).await;
    mount_provider(&server, "opentofu/null", "3.2.0", &[("linux", "amd64")], Some(&"0".repeat(64))).await;
    let h = harness();

    let report = h
        .pipeline
        .run("main", &remote(&server, &["opentofu/random", "opentofu/null"], &[]), SyncMode::Additive)
        .await
        .unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].unit.starts_with("opentofu/null@3.2.0"));
    assert!(report.skipped[0].reason.contains("Digest mismatch"));

    let snapshot = h.ledger.latest("main").unwrap();
    let record = snapshot.content.iter().next().unwrap();
    assert_eq!(record.address.path(), "opentofu/random");
    assert_eq!(record.filename, "provider_3.7.2_linux_amd64.zip");
    assert!(record.protocols.contains("5.0"));
}

#[tokio::test]
async fn test_provider_platforms_and_platform_exclude() {
    let server = MockServer::start().await;
    mount_provider(
        &server,
        "opentofu/random",
        "3.7.2",
        &[("linux", "amd64"), ("darwin", "arm64"), ("windows", "amd64")],
        None,
    )
    .await;
    let h = harness();

    let report = h
        .pipeline
        .run(
            "main",
            &remote(&server, &["opentofu/random"], &["opentofu/random/*/windows_*"]),
            SyncMode::Additive,
        )
        .await
        .unwrap();

    assert_eq!(report.records, 2);
    let snapshot = h.ledger.latest("main").unwrap();
    let mut platforms: Vec<String> = snapshot
        .content
        .iter()
        .map(|r| r.platform.as_ref().unwrap().to_string())
        .collect();
    platforms.sort();
    assert_eq!(platforms, vec!["darwin_arm64", "linux_amd64"]);
}

#[tokio::test]
async fn test_version_grain_exclude() {
    let server = MockServer::start().await;
    mount_module(&server, "hashicorp/consul/aws", &["0.9.0", "1.0.0"]).await;
    let h = harness();

    let report = h
        .pipeline
        .run(
            "main",
            &remote(&server, &["hashicorp/consul/aws"], &["hashicorp/consul/aws/0.*"]),
            SyncMode::Additive,
        )
        .await
        .unwrap();

    assert_eq!(report.records, 1);
    let snapshot = h.ledger.latest("main").unwrap();
    assert_eq!(snapshot.content.iter().next().unwrap().version, "1.0.0");
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let server = MockServer::start().await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0", "1.1.0"]).await;
    let h = harness();
    let remote = remote(&server, &["hashicorp/consul/aws"], &[]);

    let first = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap();
    let second = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap();

    // Additive mode creates a version per run
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert!(second.created_version);
    assert_eq!(second.added, 0);
    assert_eq!(second.unchanged, 2);

    let v1 = h.ledger.get("main", 1).unwrap();
    let v2 = h.ledger.get("main", 2).unwrap();
    assert_eq!(v1.content, v2.content);
}

#[tokio::test]
async fn test_mirror_removes_and_additive_keeps() {
    let first_server = MockServer::start().await;
    mount_module(&first_server, "hashicorp/consul/aws", &["1.0.0", "1.1.0"]).await;
    let second_server = MockServer::start().await;
    mount_module(&second_server, "hashicorp/consul/aws", &["1.1.0", "1.2.0"]).await;

    let additive = harness();
    additive
        .pipeline
        .run("main", &remote(&first_server, &["hashicorp/consul/aws"], &[]), SyncMode::Additive)
        .await
        .unwrap();
    let report = additive
        .pipeline
        .run("main", &remote(&second_server, &["hashicorp/consul/aws"], &[]), SyncMode::Additive)
        .await
        .unwrap();
    assert_eq!(report.records, 3);
    assert_eq!(report.removed, 0);

    let mirror = harness();
    mirror
        .pipeline
        .run("main", &remote(&first_server, &["hashicorp/consul/aws"], &[]), SyncMode::Mirror)
        .await
        .unwrap();
    let report = mirror
        .pipeline
        .run("main", &remote(&second_server, &["hashicorp/consul/aws"], &[]), SyncMode::Mirror)
        .await
        .unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);

    let versions: Vec<String> = mirror
        .ledger
        .latest("main")
        .unwrap()
        .content
        .iter()
        .map(|r| r.version.clone())
        .collect();
    assert_eq!(versions, vec!["1.1.0", "1.2.0"]);
}

#[tokio::test]
async fn test_mirror_elides_unchanged_content() {
    let server = MockServer::start().await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0"]).await;
    let h = harness();
    let remote = remote(&server, &["hashicorp/consul/aws"], &[]);

    let first = h.pipeline.run("main", &remote, SyncMode::Mirror).await.unwrap();
    let second = h.pipeline.run("main", &remote, SyncMode::Mirror).await.unwrap();

    assert_eq!(first.version, 1);
    assert_eq!(second.version, 1);
    assert!(!second.created_version);
    assert_eq!(h.ledger.list("main").unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_url_fails_before_network() {
    let h = harness();
    let remote = RemoteConfig::new("upstream", "").with_includes(["hashicorp/consul/aws"]);

    let err = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap_err();

    assert!(matches!(err, TofuError::Config { .. }));
    assert_eq!(h.pipeline.state(), SyncState::Failed);
    assert_eq!(h.ledger.list("main").unwrap().len(), 1);
}

#[tokio::test]
async fn test_discovery_document_drives_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/terraform.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "modules.v1": "/v1/modules/" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/modules/hashicorp/consul/aws/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "modules": [{ "versions": [{ "version": "1.0.0" }] }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/modules/hashicorp/consul/aws/1.0.0/download"))
        .respond_with(ResponseTemplate::new(204).insert_header("X-Terraform-Get", "/archive.tgz"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive".to_vec()))
        .mount(&server)
        .await;

    let h = harness();
    let remote = RemoteConfig::new("upstream", &format!("{}/.well-known/terraform.json", server.uri()))
        .with_includes(["hashicorp/consul/aws"]);

    let report = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap();
    assert_eq!(report.records, 1);

    let snapshot = h.ledger.latest("main").unwrap();
    let record = snapshot.content.iter().next().unwrap();
    assert_eq!(record.source_url, format!("{}/archive.tgz", server.uri()));
    assert_eq!(record.digest, Some(compute_hash(b"archive")));
}

#[tokio::test]
async fn test_missing_protocol_endpoint_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/terraform.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "modules.v1": "/v1/modules/" })))
        .mount(&server)
        .await;

    let h = harness();
    let remote = RemoteConfig::new("upstream", &format!("{}/.well-known/terraform.json", server.uri()))
        .with_includes(["opentofu/random"]);

    let err = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap_err();
    assert!(matches!(err, TofuError::Discovery { .. }));
    assert_eq!(h.ledger.list("main").unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_include_is_skipped() {
    let server = MockServer::start().await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0"]).await;
    let h = harness();

    let report = h
        .pipeline
        .run(
            "main",
            &remote(&server, &["hashicorp/consul/aws", "not-an-address", "hashicorp/*/aws"], &[]),
            SyncMode::Additive,
        )
        .await
        .unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.addresses, 3);
}

#[tokio::test]
async fn test_empty_includes_is_a_noop() {
    let server = MockServer::start().await;
    let h = harness();

    let report = h
        .pipeline
        .run("main", &remote(&server, &[], &[]), SyncMode::Mirror)
        .await
        .unwrap();

    assert_eq!(report.version, 0);
    assert!(!report.created_version);
    assert_eq!(h.ledger.list("main").unwrap().len(), 1);
}

#[tokio::test]
async fn test_deferred_policy_skips_downloads() {
    let server = MockServer::start().await;
    let body = "opentofu/random@3.7.2 linux_amd64";
    Mock::given(method("GET"))
        .and(path("/opentofu/random/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "versions": [{ "version": "3.7.2", "protocols": ["5.0"], "platforms": [{ "os": "linux", "arch": "amd64" }] }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opentofu/random/3.7.2/download/linux/amd64"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "os": "linux",
            "arch": "amd64",
            "download_url": format!("{}/files/random.zip", server.uri()),
            "shasum": compute_hash(body.as_bytes()).to_hex()
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/random.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.as_bytes().to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness();
    let remote = remote(&server, &["opentofu/random"], &[]).with_policy(DownloadPolicy::OnDemand);
    let report = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap();
    assert_eq!(report.records, 1);

    let snapshot = h.ledger.latest("main").unwrap();
    let record = snapshot.content.iter().next().unwrap();
    assert_eq!(record.policy, DownloadPolicy::OnDemand);
    assert_eq!(record.digest, Some(compute_hash(body.as_bytes())));
    assert_eq!(record.size, None);
    assert_eq!(record.filename, "random.zip");
    assert!(record.protocols.contains("5.0"));
    assert!(!h.store.contains(&compute_hash(body.as_bytes())));
}

#[tokio::test]
async fn test_cancelled_run_commits_nothing() {
    let server = MockServer::start().await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0"]).await;
    let h = harness();

    h.pipeline.cancel_flag().cancel();
    let err = h
        .pipeline
        .run("main", &remote(&server, &["hashicorp/consul/aws"], &[]), SyncMode::Additive)
        .await
        .unwrap_err();

    assert!(matches!(err, TofuError::Cancelled));
    assert_eq!(h.pipeline.state(), SyncState::Failed);
    assert_eq!(h.ledger.list("main").unwrap().len(), 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    // Mounted first, so it answers until exhausted
    Mock::given(method("GET"))
        .and(path("/hashicorp/consul/aws/versions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0"]).await;

    let h = harness();
    let mut remote = remote(&server, &["hashicorp/consul/aws"], &[]);
    remote.max_retries = 2;

    let report = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap();
    assert_eq!(report.records, 1);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_transient_discovery_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/terraform.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/.well-known/terraform.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "modules.v1": "/" })))
        .mount(&server)
        .await;
    mount_module(&server, "hashicorp/consul/aws", &["1.0.0"]).await;

    let h = harness();
    let mut remote = RemoteConfig::new("upstream", &format!("{}/.well-known/terraform.json", server.uri()))
        .with_includes(["hashicorp/consul/aws"]);
    remote.max_retries = 3;

    let report = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(h.pipeline.state(), SyncState::Committed);
}

#[tokio::test]
async fn test_discovery_failure_after_retries_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/terraform.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness();
    let mut remote = RemoteConfig::new("upstream", &format!("{}/.well-known/terraform.json", server.uri()))
        .with_includes(["hashicorp/consul/aws"]);
    remote.max_retries = 1;

    let err = h.pipeline.run("main", &remote, SyncMode::Additive).await.unwrap_err();
    assert!(matches!(err, TofuError::Discovery { .. }));
    assert_eq!(h.pipeline.state(), SyncState::Failed);
}

#[test]
fn test_worker_failures_are_classified() {
    let missing = TofuError::NotFound {
        what: "hashicorp/consul/aws".to_string(),
    };
    match failure("hashicorp/consul/aws".to_string(), missing) {
        Declaration::Skipped(unit) => assert_eq!(unit.unit, "hashicorp/consul/aws"),
        other => panic!("expected a skip, got {:?}", other),
    }

    match failure("hashicorp/consul/aws@1.0.0".to_string(), TofuError::Cancelled) {
        Declaration::Aborted(TofuError::Cancelled) => {}
        other => panic!("expected an abort, got {:?}", other),
    }
}

#[test]
fn test_default_provider_filename() {
    let address = Address::parse("opentofu/random").unwrap();
    let platform = Platform::new("linux", "amd64");
    assert_eq!(
        default_provider_filename(&address, "3.7.2", &platform, "https://cdn/x/random_3.7.2.zip?sig=1"),
        "random_3.7.2.zip"
    );
    assert_eq!(
        default_provider_filename(&address, "3.7.2", &platform, "https://cdn/download/"),
        "terraform-provider-random_3.7.2_linux_amd64.zip"
    );
}
