mod common;

use std::sync::Arc;

use api_client::mock::{MockReply, MockResponse, MockService};
use blob_storage::{BlobStorage, BlobStorageErrorKind, CancellationToken, Digest, ObjectKey};
use cos_client::{CdnConfig, NonceSource, Secret, COS_STORAGE_NAME};
use http::{Method, StatusCode};
use tokio::io::AsyncReadExt as _;

use common::*;

const HEX: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

fn digest() -> Digest {
    Digest::parse(&format!("sha256:{HEX}")).unwrap()
}

fn location() -> ObjectKey {
    ObjectKey::new(format!("sha256/e3/{HEX}"))
}

fn status(status: StatusCode) -> MockReply {
    MockReply::Respond(MockResponse::new(status))
}

#[tokio::test]
async fn existing_blob_is_located() {
    let mock = MockService::new(|_| status(StatusCode::OK));
    let storage = storage(&mock, no_backoff());

    let found = storage.try_locate_existing(&digest()).await.unwrap();
    assert_eq!(found, Some(location()));

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::HEAD);
    assert_eq!(requests[0].uri.to_string(), format!("{SERVICE_URL}/{}", location()));
    assert!(requests[0].header("authorization").is_some());
}

#[tokio::test]
async fn missing_blob_is_not_an_error() {
    let mock = MockService::new(|_| status(StatusCode::NOT_FOUND));
    let storage = storage(&mock, no_backoff());

    assert_eq!(storage.try_locate_existing(&digest()).await.unwrap(), None);
}

#[tokio::test]
async fn locate_uses_the_accelerated_endpoint() {
    let mock = MockService::new(|_| status(StatusCode::OK));
    let mut config = config(no_backoff());
    config.accelerated_upload_url = Some(ACCELERATED_URL.into());
    let storage = storage_with(&mock, config);

    storage.try_locate_existing(&digest()).await.unwrap();
    assert_eq!(
        mock.requests()[0].uri.to_string(),
        format!("{ACCELERATED_URL}/{}", location())
    );
}

#[tokio::test]
async fn failed_locate_is_an_error() {
    let mock = MockService::new(|_| status(StatusCode::FORBIDDEN));
    let denied = storage(&mock, no_backoff());

    let error = denied.try_locate_existing(&digest()).await.unwrap_err();
    assert_eq!(error.kind(), BlobStorageErrorKind::PermissionDenied);
    assert_eq!(error.engine(), COS_STORAGE_NAME);
    assert_eq!(error.location(), Some(location().as_str()));

    let mock = MockService::new(|_| MockReply::Fail);
    let unreachable = storage(&mock, no_backoff());
    let error = unreachable.try_locate_existing(&digest()).await.unwrap_err();
    assert_eq!(error.kind(), BlobStorageErrorKind::Transport);
}

#[tokio::test]
async fn read_streams_the_blob() {
    let mock = MockService::new(|_| {
        MockReply::Respond(MockResponse::ok().body(&b"layer content"[..]))
    });
    let storage = storage(&mock, no_backoff());

    let mut reader = storage
        .read(&location(), &CancellationToken::new())
        .await
        .unwrap();
    let mut content = Vec::new();
    reader.read_to_end(&mut content).await.unwrap();
    assert_eq!(content, b"layer content");

    let requests = mock.requests();
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].uri.path(), format!("/{}", location()));
    assert!(requests[0]
        .uri
        .query()
        .unwrap()
        .starts_with("q-sign-algorithm=sha1&q-ak="));
    assert!(requests[0].header("authorization").is_none());
}

#[tokio::test]
async fn read_of_missing_blob_is_not_found() {
    let mock = MockService::new(|_| {
        MockReply::Respond(
            MockResponse::new(StatusCode::NOT_FOUND).body(error_body("NoSuchKey")),
        )
    });
    let storage = storage(&mock, no_backoff());

    let error = match storage.read(&location(), &CancellationToken::new()).await {
        Ok(_) => panic!("read of a missing blob succeeded"),
        Err(error) => error,
    };
    assert_eq!(error.kind(), BlobStorageErrorKind::NotFound);
    assert!(error.to_string().contains("NoSuchKey"));
}

#[tokio::test]
async fn cancelled_read_sends_nothing() {
    let mock = MockService::new(|_| status(StatusCode::OK));
    let storage = storage(&mock, no_backoff());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = match storage.read(&location(), &cancel).await {
        Ok(_) => panic!("cancelled read succeeded"),
        Err(error) => error,
    };
    assert_eq!(error.kind(), BlobStorageErrorKind::Cancelled);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn delete_removes_the_object() {
    let mock = MockService::new(|_| status(StatusCode::NO_CONTENT));
    let mut config = config(no_backoff());
    config.accelerated_upload_url = Some(ACCELERATED_URL.into());
    let storage = storage_with(&mock, config);

    storage.delete(&location()).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::DELETE);
    assert_eq!(requests[0].uri.to_string(), format!("{SERVICE_URL}/{}", location()));
    assert!(requests[0].header("authorization").is_some());
}

#[tokio::test]
async fn delete_of_missing_blob_is_not_found() {
    let mock = MockService::new(|_| {
        MockReply::Respond(
            MockResponse::new(StatusCode::NOT_FOUND).body(error_body("NoSuchKey")),
        )
    });
    let storage = storage(&mock, no_backoff());

    let error = storage.delete(&location()).await.unwrap_err();
    assert_eq!(error.kind(), BlobStorageErrorKind::NotFound);
    assert_eq!(error.context(), Some("delete"));
}

#[tokio::test]
async fn direct_download_url_is_presigned() {
    let mock = MockService::new(|_| status(StatusCode::OK));
    let storage = storage(&mock, no_backoff());

    assert!(storage.supports_downloading());
    let url = storage.download_url(&location()).unwrap().to_string();
    assert!(url.starts_with(&format!(
        "{SERVICE_URL}/{}?q-sign-algorithm=sha1&q-ak=AKIDQjz3ltompVjBni5LitkWHFlFpwkn9U5q",
        location()
    )));
    assert!(url.contains("&q-header-list=&q-url-param-list=&q-signature="));
    assert!(mock.requests().is_empty());
}

#[derive(Debug)]
struct FixedNonce;

impl NonceSource for FixedNonce {
    fn nonce(&self) -> String {
        "0123456789abcdef0123456789abcdef".into()
    }
}

#[tokio::test]
async fn cdn_download_url_is_signed_for_the_cdn() {
    let mock = MockService::new(|_| status(StatusCode::OK));
    let mut config = config(no_backoff());
    config.cdn = Some(CdnConfig {
        base_url: "https://cdn.example.com/".into(),
        auth_key_type_a: Some(Secret::from("cdnkey")),
    });
    let storage = storage_with(&mock, config).with_nonce_source(Arc::new(FixedNonce));

    let url = storage.download_url(&location()).unwrap();
    assert_eq!(url.host(), Some("cdn.example.com"));
    assert_eq!(url.path(), format!("/{}", location()));

    let sign = url.query().unwrap().strip_prefix("sign=").unwrap();
    let fields: Vec<_> = sign.split('-').collect();
    assert_eq!(fields.len(), 4);
    assert!(fields[0].parse::<i64>().is_ok());
    assert_eq!(fields[1], "0123456789abcdef0123456789abcdef");
    assert_eq!(fields[2], "0");
    assert_eq!(fields[3].len(), 32);
}

#[tokio::test]
async fn incomplete_cdn_falls_back_to_direct_urls() {
    let mock = MockService::new(|_| status(StatusCode::OK));
    let mut config = config(no_backoff());
    config.cdn = Some(CdnConfig {
        base_url: "https://cdn.example.com".into(),
        auth_key_type_a: None,
    });
    let storage = storage_with(&mock, config);

    let url = storage.download_url(&location()).unwrap();
    assert_eq!(url.host(), Some("bucket-1250000000.cos.ap-beijing.myqcloud.com"));
}

#[test]
fn invalid_configuration_is_rejected() {
    let mock = MockService::new(|_| status(StatusCode::OK));
    let client = api_client::ApiClient::new_with_inner_service(
        mock,
        std::time::Duration::from_secs(60),
    );

    let mut config = config(no_backoff());
    config.service_url = "not a url".into();

    let error = cos_client::CosClient::with_client(config, client).unwrap_err();
    assert_eq!(error.kind(), BlobStorageErrorKind::Configuration);
}
