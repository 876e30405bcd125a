// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Cursor;

use super::*;

#[yare::parameterized(
    get    = { Method::GET, false },
    head   = { Method::HEAD, false },
    post   = { Method::POST, true },
    put    = { Method::PUT, true },
    patch  = { Method::PATCH, true },
    delete = { Method::DELETE, true },
)]
fn csrf_follows_method(method: Method, expected: bool) {
    assert_eq!(Request::new(method, "x").is_mutating(), expected);
}

#[test]
fn json_body_sets_content_type() -> anyhow::Result<()> {
    let mut req = Request::post_json("projects", json!({ "name": "p" }));
    req.validate()?;
    assert_eq!(req.content_type(), Some("application/json"));
    assert_eq!(req.request_data(), Some(json!({ "name": "p" })));
    match req.materialize(false)? {
        TransportBody::Bytes(b) => assert_eq!(&b[..], br#"{"name":"p"}"#),
        other => anyhow::bail!("unexpected body {other:?}"),
    }
    Ok(())
}

#[test]
fn empty_post_has_no_content_type() -> anyhow::Result<()> {
    let req = Request::new(Method::POST, "jobs/1:cancel");
    req.validate()?;
    assert_eq!(req.content_type(), None);
    assert_eq!(req.request_data(), None);
    Ok(())
}

#[test]
fn bytes_body_reports_size() -> anyhow::Result<()> {
    let req = Request::post_bytes("images", ContentKind::Jpeg, vec![0xff, 0xd8, 0xff]);
    req.validate()?;
    assert_eq!(req.content_type(), Some("image/jpeg"));
    assert_eq!(req.request_data(), Some(json!({ "bytes": 3 })));
    Ok(())
}

#[yare::parameterized(
    get_with_body  = { Request::get("x").body(ContentKind::Json, RequestBody::Json(json!({}))), "GET" },
    jpeg_from_json = { Request::new(Method::POST, "x").body(ContentKind::Jpeg, RequestBody::Json(json!({}))), "jpeg" },
    zip_empty      = { Request::new(Method::PUT, "x").body(ContentKind::Zip, RequestBody::Empty), "zip" },
    multipart_raw  = { Request::new(Method::POST, "x").body(ContentKind::Multipart, RequestBody::Bytes(Bytes::new())), "multipart" },
    json_as_bytes  = { Request::new(Method::PATCH, "x").body(ContentKind::Json, RequestBody::Bytes(Bytes::new())), "json" },
)]
fn unsupported_combinations_rejected(req: Request, expected_substr: &str) {
    crate::assert_err_contains!(req.validate(), expected_substr);
}

#[test]
fn multipart_rewinds_readers_on_retry() -> anyhow::Result<()> {
    let parts = vec![
        MultipartPart::reader("file", Cursor::new(b"payload".to_vec())).file_name("a.bin"),
        MultipartPart::bytes("meta", "{}").content_type("application/json"),
    ];
    let mut req = Request::post_multipart("datasets:upload", parts);
    req.validate()?;
    assert_eq!(req.content_type(), None);
    assert_eq!(req.request_data(), Some(json!({ "parts": ["file", "meta"] })));

    let first = req.materialize(false)?;
    let drained = req.materialize(false)?;
    let rewound = req.materialize(true)?;

    let data = |body: &TransportBody| match body {
        TransportBody::Multipart(parts) => parts.iter().map(|p| p.data.clone()).collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    assert_eq!(data(&first), vec![Bytes::from("payload"), Bytes::from("{}")]);
    assert_eq!(data(&drained), vec![Bytes::new(), Bytes::from("{}")]);
    assert_eq!(data(&rewound), data(&first));

    if let TransportBody::Multipart(parts) = rewound {
        assert_eq!(parts[0].file_name.as_deref(), Some("a.bin"));
        assert_eq!(parts[1].content_type.as_deref(), Some("application/json"));
    }
    Ok(())
}

#[test]
fn file_part_is_named_after_the_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("image.jpg");
    std::fs::write(&path, b"jpeg-bytes")?;

    let mut req = Request::post_multipart("media:upload", vec![MultipartPart::file("file", &path)?]);
    let TransportBody::Multipart(parts) = req.materialize(false)? else {
        anyhow::bail!("expected a multipart body");
    };
    assert_eq!(parts[0].file_name.as_deref(), Some("image.jpg"));
    assert_eq!(parts[0].data, Bytes::from("jpeg-bytes"));

    crate::assert_err_contains!(MultipartPart::file("file", dir.path().join("missing.jpg")), "I/O error");
    Ok(())
}

#[test]
fn raw_payload_does_not_deserialize() -> anyhow::Result<()> {
    let url = url::Url::parse("https://geti.test/api/v1/x")?;
    let payload = Payload::Raw(HttpResponse::new(200, url).with_header("content-type", "text/plain"));
    assert!(payload.as_json().is_none());
    crate::assert_err_contains!(payload.deserialize::<Value>(), "expected a JSON response");
    Ok(())
}
