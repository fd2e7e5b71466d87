#![allow(dead_code)]

use std::time::Duration;

use api_client::mock::{MockReply, MockResponse, MockService, RecordedRequest};
use api_client::ApiClient;
use cos_client::{CosClient, CosConfig, Credentials, UploadSettings};
use http::{Method, StatusCode};

pub const SERVICE_URL: &str = "https://bucket-1250000000.cos.ap-beijing.myqcloud.com";
pub const ACCELERATED_URL: &str = "https://bucket-1250000000.cos.accelerate.myqcloud.com";
pub const UPLOAD_ID: &str =
    "1585130821cbb7df1d11846c073ad648e8f33b087cec2381df437acdc833cf654b9ecc6361";

pub fn config(upload: UploadSettings) -> CosConfig {
    let mut config = CosConfig::new(
        Credentials::new(
            "AKIDQjz3ltompVjBni5LitkWHFlFpwkn9U5q",
            "BQYIM75p8x0iWVFSIgqEKwFprpRSVHlz",
        ),
        SERVICE_URL,
    );
    config.upload = upload;
    config
}

/// Default settings without the pause between attempts.
pub fn no_backoff() -> UploadSettings {
    UploadSettings {
        backoff_seconds: 0,
        ..Default::default()
    }
}

pub fn storage_with(mock: &MockService, config: CosConfig) -> CosClient {
    let client = ApiClient::new_with_inner_service(mock.clone(), Duration::from_secs(60));
    CosClient::with_client(config, client).unwrap()
}

pub fn storage(mock: &MockService, upload: UploadSettings) -> CosClient {
    storage_with(mock, config(upload))
}

pub fn query_param<'r>(req: &'r RecordedRequest, name: &str) -> Option<&'r str> {
    req.uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then_some(value)
    })
}

pub fn part_number(req: &RecordedRequest) -> Option<usize> {
    query_param(req, "partNumber").and_then(|n| n.parse().ok())
}

pub fn is_initiate(req: &RecordedRequest) -> bool {
    req.method == Method::POST && req.uri.query() == Some("uploads")
}

pub fn is_part(req: &RecordedRequest) -> bool {
    req.method == Method::PUT && part_number(req).is_some()
}

pub fn is_complete(req: &RecordedRequest) -> bool {
    req.method == Method::POST && query_param(req, "uploadId").is_some()
}

pub fn is_abort(req: &RecordedRequest) -> bool {
    req.method == Method::DELETE && query_param(req, "uploadId").is_some()
}

/// Answers the multipart protocol like a healthy bucket.
pub fn bucket(req: &RecordedRequest) -> MockReply {
    if is_initiate(req) {
        return MockReply::Respond(MockResponse::ok().body(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <InitiateMultipartUploadResult>\
             <Bucket>bucket-1250000000</Bucket>\
             <Key>{}</Key>\
             <UploadId>{UPLOAD_ID}</UploadId>\
             </InitiateMultipartUploadResult>",
            req.uri.path().trim_start_matches('/')
        )));
    }

    if let Some(number) = part_number(req) {
        return MockReply::Respond(
            MockResponse::ok().header("etag", &format!("\"etag-{number}\"")),
        );
    }

    match req.method {
        Method::DELETE => MockReply::Respond(MockResponse::new(StatusCode::NO_CONTENT)),
        _ => MockReply::Respond(MockResponse::ok()),
    }
}

pub fn error_body(code: &str) -> String {
    format!(
        "<?xml version='1.0' encoding='utf-8' ?>\n\
         <Error><Code>{code}</Code><Message>simulated</Message>\
         <RequestId>NjA3ZDNhYTlfOTE5YjAzMDlfOWY0Nl8xMA==</RequestId></Error>"
    )
}

pub fn internal_error() -> MockReply {
    MockReply::Respond(
        MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR).body(error_body("InternalError")),
    )
}
