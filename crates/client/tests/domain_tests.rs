//! Integration tests for the concept, profile, liking and README clients

use conceptual_client::types::{Profile, ProfileUpdate, ReadmeOptions, UploadFile};
use conceptual_client::{
    ApiClient, ClientError, ConceptsClient, LikeState, LikeTracker, LikingClient, ProfileClient,
    ReadmeClient, TokenStore,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> ApiClient {
    let tokens = TokenStore::in_memory();
    tokens.set_auth_data("u1", "atok", "rtok");
    ApiClient::new(format!("{}/api", server.uri()), tokens).unwrap()
}

fn counter_files() -> Vec<UploadFile> {
    vec![
        UploadFile::new("Counter/spec.md", b"hi".to_vec()),
        UploadFile::new("Counter/src/counter.ts", vec![0, 255]),
    ]
}

#[tokio::test]
async fn test_publish_sends_files_as_byte_arrays() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/publish"))
        .and(body_partial_json(json!({
            "unique_name": "Counter",
            "files": {
                "Counter/spec.md": [104, 105],
                "Counter/src/counter.ts": [0, 255]
            },
            "accessToken": "atok"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "concept": "c1",
            "version": "1",
            "unique_name": "Counter",
            "ok": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let concepts = ConceptsClient::new(api_for(&mock_server));
    let published = concepts
        .publish_concept_with_folder("  Counter ", &counter_files())
        .await
        .unwrap();
    assert_eq!(published.version, "1");
    assert!(!published.recovered);
    assert!(!concepts.is_publishing("Counter"));

    let requests = mock_server.received_requests().await.unwrap();
    let publish = requests
        .iter()
        .find(|r| r.url.path() == "/api/registry/publish")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&publish.body).unwrap();
    assert!(body["requestId"].as_str().is_some_and(|id| !id.is_empty()));

    mock_server.verify().await;
}

#[tokio::test]
async fn test_publish_validates_before_sending() {
    let concepts = ConceptsClient::new(
        ApiClient::new("http://127.0.0.1:9/api", TokenStore::in_memory()).unwrap(),
    );

    let err = concepts
        .publish_concept_with_folder("   ", &counter_files())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(ref m) if m == "Concept name is required"));

    let err = concepts
        .publish_concept_with_folder("Counter", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn test_duplicate_publish_is_rejected_while_pending() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/publish"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "concept": "c1", "version": 1, "unique_name": "Counter", "ok": true }))
                .set_delay(Duration::from_millis(400)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let concepts = ConceptsClient::new(api_for(&mock_server));

    let first = tokio::spawn({
        let concepts = concepts.clone();
        async move {
            concepts
                .publish_concept_with_folder("Counter", &counter_files())
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(concepts.is_publishing("Counter"));

    let second = concepts
        .publish_concept_with_folder("Counter", &counter_files())
        .await;
    assert!(matches!(second, Err(ClientError::PublishInProgress(ref name)) if name == "Counter"));

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.version, "1");

    let third = concepts
        .publish_concept_with_folder("Counter", &counter_files())
        .await
        .unwrap();
    assert_eq!(third.version, "1");

    mock_server.verify().await;
}

#[tokio::test]
async fn test_publish_recovers_from_lost_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_getConceptByUniqueName"))
        .and(body_json(json!({ "uniqueName": "Counter" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "concept": "c1" }])))
        .mount(&mock_server)
        .await;

    // Before submission only version 1 exists
    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_listVersions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "version": 1 }])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_listVersions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "version": 1 }, { "version": "2" }])),
        )
        .mount(&mock_server)
        .await;

    // Success status with an unreadable body
    Mock::given(method("POST"))
        .and(path("/api/registry/publish"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let concepts = ConceptsClient::new(api_for(&mock_server));
    let published = concepts
        .publish_concept_with_folder("Counter", &counter_files())
        .await
        .unwrap();
    assert_eq!(published.version, "2");
    assert!(published.recovered);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_publish_recovery_does_not_report_stale_version() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_getConceptByUniqueName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "concept": "c1" }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_listVersions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "version": 1 }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/registry/publish"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let concepts = ConceptsClient::new(api_for(&mock_server));
    let err = concepts
        .publish_concept_with_folder("Counter", &counter_files())
        .await
        .unwrap_err();
    assert!(err.is_client_side());
}

#[tokio::test]
async fn test_publish_server_rejection_is_not_recovered() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/publish"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Concept name taken" })),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_listVersions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "version": 9 }])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let concepts = ConceptsClient::new(api_for(&mock_server));
    let err = concepts
        .publish_concept_with_folder("Counter", &counter_files())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::BadRequest(ref m) if m == "Concept name taken"));

    mock_server.verify().await;
}

#[tokio::test]
async fn test_browse_and_download() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "concept": "c1",
                "unique_name": "Counter",
                "author": "u1",
                "author_username": "ada",
                "created_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-02T00:00:00Z"
            }]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/registry/files"))
        .and(body_json(json!({ "unique_name": "Counter", "version": "2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": { "Counter/spec.md": "# Counter" }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/registry/download"))
        .and(body_json(json!({
            "unique_name": "Counter",
            "version": "2",
            "accessToken": "atok",
            "author_username": "ada"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": { "Counter/spec.md": "# Counter", "Counter/src/counter.ts": "export {}" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/Downloading/_countForItem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "n": 12 }])))
        .mount(&mock_server)
        .await;

    let concepts = ConceptsClient::new(api_for(&mock_server));

    let all = concepts.get_all_concepts().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].unique_name, "Counter");
    assert_eq!(all[0].owner, "u1");
    assert_eq!(all[0].author_username, "ada");
    assert!(all[0].versions.is_empty());

    let files = concepts.get_concept_files("Counter", Some("2")).await.unwrap();
    assert_eq!(files["Counter/spec.md"], "# Counter");

    let downloaded = concepts
        .download_version("Counter", "2", Some("ada"))
        .await
        .unwrap();
    assert_eq!(downloaded.len(), 2);

    assert_eq!(concepts.download_count("Counter").await, 12);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_lookup_fallbacks() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_getUniqueName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/ConceptRegistering/_latestPublished"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "version": "3" }])))
        .mount(&mock_server)
        .await;

    let concepts = ConceptsClient::new(api_for(&mock_server));
    assert_eq!(concepts.get_concept_unique_name("c1").await, "c1");
    assert_eq!(concepts.get_concept_owner("c1").await, "");
    assert_eq!(
        concepts.get_concept_latest_version("c1").await.as_deref(),
        Some("3")
    );
    assert_eq!(concepts.get_concept_id("Missing").await.ok().flatten(), None);
    assert_eq!(concepts.download_count("Counter").await, 0);
}

#[tokio::test]
async fn test_profile_defaults_when_missing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/UserProfileDisplaying/_profileOf"))
        .and(body_json(json!({ "user": "nobody" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/UserProfileDisplaying/_profileOf"))
        .and(body_json(json!({ "user": "u1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "username": "ada",
            "displayName": "Ada",
            "avatarUrl": "https://img/ada.png"
        }])))
        .mount(&mock_server)
        .await;

    let profiles = ProfileClient::new(api_for(&mock_server));

    assert_eq!(profiles.get_profile("nobody").await.unwrap(), Profile::default());

    let profile = profiles.get_profile("u1").await.unwrap();
    assert_eq!(profile.username, "ada");
    assert_eq!(profile.display_name, "Ada");
    assert_eq!(profile.bio, "");
}

#[tokio::test]
async fn test_set_profile_sends_only_provided_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/UserProfileDisplaying/setProfile"))
        .and(body_json(json!({ "user": "u1", "displayName": "Ada L.", "bio": "" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let profiles = ProfileClient::new(api_for(&mock_server));
    let update = ProfileUpdate {
        display_name: Some("Ada L.".into()),
        bio: Some(String::new()),
        ..ProfileUpdate::default()
    };
    assert!(profiles.set_profile("u1", &update).await.unwrap().ok);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_liking_reads_degrade_to_defaults() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/like"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Already liked" })),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let liking = LikingClient::new(api_for(&mock_server));
    assert!(!liking.is_liked("c1", "u1").await);
    assert_eq!(liking.count_for_item("c1").await, 0);
    assert!(liking.liked_items("u1").await.is_empty());

    let response = liking.like("c1", "u1").await;
    assert_eq!(response.error.as_deref(), Some("Already liked"));

    let response = liking.unlike("c1", "u1").await;
    assert!(!response.is_ok());
}

#[tokio::test]
async fn test_liking_accepts_wrapped_and_bare_payloads() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/_isLiked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "liked": true }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/_countForItem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "n": 3 })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/_likedItems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "items": ["c1", "c2"] }])))
        .mount(&mock_server)
        .await;

    let liking = LikingClient::new(api_for(&mock_server));
    assert!(liking.is_liked("c1", "u1").await);
    assert_eq!(liking.count_for_item("c1").await, 3);
    assert_eq!(liking.liked_items("u1").await, vec!["c1", "c2"]);
}

#[tokio::test]
async fn test_like_tracker_is_optimistic_and_rolls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/_isLiked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "liked": false })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/_countForItem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "n": 4 })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/like"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/Liking/unlike"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "Not liked" })))
        .mount(&mock_server)
        .await;

    let mut tracker = LikeTracker::new(LikingClient::new(api_for(&mock_server)), "c1", "u1");
    assert_eq!(tracker.fetch().await, LikeState { liked: false, count: 4 });

    assert!(tracker.toggle().await.is_ok());
    assert_eq!(tracker.state(), LikeState { liked: true, count: 5 });

    let response = tracker.toggle().await;
    assert_eq!(response.error.as_deref(), Some("Not liked"));
    assert_eq!(tracker.state(), LikeState { liked: true, count: 5 });

    // The next fetch replaces local state with the server's view
    assert_eq!(tracker.fetch().await, LikeState { liked: false, count: 4 });
}

#[tokio::test]
async fn test_readme_generation_polls_until_ready() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/readme/generate"))
        .and(body_partial_json(json!({
            "concept": "c1",
            "overwrite": true,
            "displayName": "Counter",
            "accessToken": "atok"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/registry/readme/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "path": "README.md" })))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/registry/readme/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "path": "README.md",
            "content": "# Counter"
        })))
        .mount(&mock_server)
        .await;

    let readme = ReadmeClient::new(api_for(&mock_server));
    let options = ReadmeOptions {
        overwrite: true,
        display_name: Some("Counter".into()),
        ..ReadmeOptions::default()
    };

    let generated = readme
        .generate_and_wait("c1", &options, Duration::from_millis(20), 5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(generated.content.as_deref(), Some("# Counter"));
    assert!(!readme.is_generating("c1"));

    mock_server.verify().await;
}

#[tokio::test]
async fn test_readme_generation_is_guarded_per_concept() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/readme/generate"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(400)))
        .mount(&mock_server)
        .await;

    let readme = ReadmeClient::new(api_for(&mock_server));
    let first = tokio::spawn({
        let readme = readme.clone();
        async move { readme.generate_readme("c1", &ReadmeOptions::default()).await }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = readme
        .generate_readme("c1", &ReadmeOptions::default())
        .await;
    assert!(matches!(second, Err(ClientError::ReadmeInProgress(_))));

    let other = readme.generate_readme("c2", &ReadmeOptions::default()).await;
    assert!(other.is_ok());

    first.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_readme_reads_degrade_and_updates_return_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/registry/readme/update"))
        .and(body_json(json!({ "concept": "c1", "content": "# New" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "path": "README.md",
            "content": "# New"
        })))
        .mount(&mock_server)
        .await;

    let readme = ReadmeClient::new(api_for(&mock_server));
    assert_eq!(readme.get_readme("c1").await, None);
    assert_eq!(
        readme
            .wait_for_readme("c1", Duration::from_millis(5), 2)
            .await,
        None
    );

    let updated = readme.update_readme("c1", "# New").await.unwrap();
    assert_eq!(updated.path, "README.md");
    assert_eq!(updated.content.as_deref(), Some("# New"));
}
