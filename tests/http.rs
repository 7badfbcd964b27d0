mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{ORDER_ID, TestEnv, env, env_with};
use filestore::{
    models::digest::ContentDigest, routes::routes::routes,
    services::storage_service::ServiceSettings,
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

const BOUNDARY: &str = "filestore-test-boundary";

fn app(env: &TestEnv) -> Router {
    routes(env.service.settings()).with_state(env.service.clone())
}

fn multipart_body(meta: &Value, files: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"meta\"\r\n\r\n{meta}\r\n"
        )
        .as_bytes(),
    );
    for (name, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(app: Router, meta: Value, files: &[(&str, &str)]) -> Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/api/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(&meta, files)))
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn order_meta() -> Value {
    json!({"ownerType": "order", "item": "files", "linkID": ORDER_ID})
}

#[tokio::test]
async fn healthz_is_ok() {
    let env = env().await;
    let response = app(&env)
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readyz_checks_database_and_disk() {
    let env = env().await;
    let response = app(&env)
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["disk"]["ok"], true);
}

#[tokio::test]
async fn upload_list_download_delete() {
    let env = env().await;

    let response = upload(
        app(&env),
        order_meta(),
        &[("a.pdf", "alpha"), ("b.pdf", "beta")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
    assert_eq!(listed[0]["SN"], 0);
    assert_eq!(listed[0]["name"], "a.pdf");
    assert_eq!(listed[0]["new"], true);
    assert_eq!(listed[0]["ownerType"], "order");
    assert_eq!(listed[1]["SN"], 1);

    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri(format!("/api/files?ownerType=order&item=files&linkID={ORDER_ID}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = json_body(response).await;
    assert_eq!(list[1]["name"], "b.pdf");
    assert!(list[1].get("new").is_none());

    let digest = ContentDigest::compute(b"alpha");
    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri(format!("/api/files/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("filename*=UTF-8''a.pdf"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"alpha");

    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/files")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"ownerType": "order", "item": "files", "linkID": ORDER_ID, "SN": 0})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert_eq!(outcome["rowsAffected"], 1);
    assert_eq!(outcome["removed"], 1);
    assert_eq!(outcome["purged"][0], digest.to_hex());
}

#[tokio::test]
async fn head_returns_headers_only() {
    let env = env().await;
    upload(app(&env), order_meta(), &[("a.pdf", "alpha")]).await;

    let digest = ContentDigest::compute(b"alpha");
    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/api/files/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn errors_map_to_statuses() {
    let env = env().await;

    let response = upload(app(&env), order_meta(), &[("empty.txt", "")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], 400);

    let missing_row = json!({"ownerType": "order", "item": "files", "linkID": 999});
    let response = upload(app(&env), missing_row, &[("a", "1")]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri("/api/files/not-a-digest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unknown = ContentDigest::compute(b"never stored");
    let response = app(&env)
        .oneshot(
            Request::builder()
                .uri(format!("/api/files/{unknown}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_meta_is_rejected() {
    let env = env().await;
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a\"\r\n\r\nabc\r\n--{BOUNDARY}--\r\n"
    );
    let response = app(&env)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/files")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_request_is_refused_before_storing() {
    let env = env_with(ServiceSettings {
        max_upload_size: 1024,
        max_request_size: 2048,
        ..ServiceSettings::default()
    })
    .await;

    let part = "x".repeat(1000);
    let part = part.as_str();
    let response = upload(
        app(&env),
        order_meta(),
        &[("a.bin", part), ("b.bin", part), ("c.bin", part)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(env.count("SELECT COUNT(*) FROM blobs").await, 0);
    assert_eq!(env.count("SELECT COUNT(*) FROM file_records").await, 0);
    assert!(env.blob_files().is_empty());

    // Each part alone still fits.
    let response = upload(app(&env), order_meta(), &[("a.bin", part)]).await;
    assert_eq!(response.status(), StatusCode::OK);
}
