//! Body parsing through `parse_body` with in-memory and file-backed streams.

use std::io;

use axum::http::StatusCode;
use switchyard::body::{parse_body, FileStream};
use switchyard::{parse_body_in_memory, ArgMap, HttpError, Router};

mod common;

const SIMPLE_BODY: &str = "--B\r\n\
    Content-Disposition: form-data; name=\"a\"\r\n\r\n\
    1\r\n--B\r\n\
    Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\
    Content-Type: text/plain\r\n\r\n\
    hello\r\n--B--\r\n";

fn multipart(body: impl Into<axum::body::Body>) -> switchyard::HttpRequest {
    common::request(
        "POST",
        "/upload/",
        &[("content-type", "multipart/form-data; boundary=B")],
        body,
    )
}

#[tokio::test]
async fn test_field_and_file_in_memory() {
    let mut request = multipart(SIMPLE_BODY);
    let mut args = ArgMap::new();
    let mut files = parse_body_in_memory(&mut request, &mut args).await.unwrap();

    assert_eq!(args.len(), 1);
    assert_eq!(args.get("a"), Some("1"));

    let file = files.get_mut("f").unwrap();
    assert_eq!(file.field_name(), "f");
    assert_eq!(file.file_name(), "x.txt");
    assert_eq!(file.content_type(), "text/plain");
    assert_eq!(file.read_all().await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_files_written_through_factory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let factory = move |_field: &str, file_name: &str, _content_type: &str| -> io::Result<Box<dyn FileStream>> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(root.join(file_name))?;
        Ok(Box::new(tokio::fs::File::from_std(file)))
    };

    let mut request = multipart(SIMPLE_BODY);
    let mut args = ArgMap::new();
    let mut files = parse_body(&mut request, &mut args, &factory).await.unwrap();

    let file = files.get_mut("f").unwrap();
    assert_eq!(file.read_all().await.unwrap(), b"hello");
    drop(files);
    assert_eq!(std::fs::read(dir.path().join("x.txt")).unwrap(), b"hello");
}

#[tokio::test]
async fn test_binary_file_survives_unchanged() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(20_000).chain(b"\r\n--".iter().copied()).collect();
    let mut body = b"--B\r\nContent-Disposition: form-data; name=\"bin\"; filename=\"blob.bin\"\r\n\
Content-Type: application/octet-stream\r\n\r\n"
        .to_vec();
    body.extend_from_slice(&payload);
    body.extend_from_slice(b"\r\n--B--\r\n");

    let mut request = multipart(body);
    let mut args = ArgMap::new();
    let mut files = parse_body_in_memory(&mut request, &mut args).await.unwrap();
    assert_eq!(files.get_mut("bin").unwrap().read_all().await.unwrap(), payload);
}

#[tokio::test]
async fn test_extended_file_name_is_decoded() {
    let body = "--B\r\n\
        Content-Disposition: form-data; name=\"f\"; filename*=utf-8''r%C3%A9sum%C3%A9.txt\r\n\
        Content-Type: text/plain\r\n\r\n\
        cv\r\n--B--\r\n";
    let mut request = multipart(body);
    let mut args = ArgMap::new();
    let files = parse_body_in_memory(&mut request, &mut args).await.unwrap();
    assert_eq!(files["f"].file_name(), "résumé.txt");
}

#[tokio::test]
async fn test_duplicate_file_field_is_rejected() {
    let body = "--B\r\n\
        Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\nA\r\n--B\r\n\
        Content-Disposition: form-data; name=\"f\"; filename=\"b.txt\"\r\n\r\nB\r\n--B--\r\n";
    let mut request = multipart(body);
    let mut args = ArgMap::new();
    let err = parse_body_in_memory(&mut request, &mut args).await.unwrap_err();
    assert!(matches!(err, HttpError::DuplicateKey(ref key) if key == "f"));
}

#[tokio::test]
async fn test_plain_text_is_unsupported_and_args_untouched() {
    let mut request = common::request("POST", "/upload/", &[("content-type", "text/plain")], "a=1");
    let mut args = ArgMap::new();
    let err = parse_body_in_memory(&mut request, &mut args).await.unwrap_err();
    assert!(matches!(err, HttpError::UnsupportedContentType(_)));
    assert!(args.is_empty());
}

#[tokio::test]
async fn test_urlencoded_form() {
    let mut request = common::request(
        "POST",
        "/login",
        &[("content-type", "application/x-www-form-urlencoded; charset=utf-8")],
        "user=ada+lovelace&note=100%25",
    );
    let mut args = ArgMap::new();
    let files = parse_body_in_memory(&mut request, &mut args).await.unwrap();
    assert!(files.is_empty());
    assert_eq!(args.get("user"), Some("ada lovelace"));
    assert_eq!(args.get("note"), Some("100%"));
}

#[tokio::test]
async fn test_unsupported_body_reaches_error_callback() {
    let mut router = Router::new();
    router
        .post("/upload/", |rq, rp, args| {
            Box::pin(async move {
                parse_body_in_memory(rq, args).await?;
                rp.send_text("parsed", "text/plain").await
            })
        })
        .unwrap();

    let request = common::request("POST", "/upload/", &[("content-type", "text/plain")], "hello");
    let (head, body) = common::dispatch(&router, request).await;
    assert_eq!(head.status, StatusCode::BAD_REQUEST);
    assert!(common::text(&body).contains("text/plain"));
}
