//! Request dispatch
//!
//! Wraps every request in a [`RequestContext`], routes it, calls the matching
//! service and turns its result into a response.
//!
//! # Endpoints
//!
//! * `POST /upload` - store the body, answer `{"filePath": "..."}`
//! * `GET /download?filePath=...` - stream a stored file
//! * `GET /files/in/...`, `GET /files/out/...` - read-only mirrors
//! * `GET /health` - liveness check (returns "ok")
//! * All other requests return 404 Not Found

use bytes::Bytes;
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS};
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::fmt::Display;

use super::body::{self, ResponseBody};
use super::AppState;
use crate::correlation::RequestContext;
use crate::download::{Download, DownloadError};
use crate::mirror::{MirrorEntry, MirrorError};
use crate::router::Route;
use crate::storage::UploadResponse;
use crate::upload::UploadError;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Handle one HTTP request
pub async fn handle_request<B>(
    req: Request<B>,
    state: &AppState,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let ctx = RequestContext::begin(req.method(), &target);

    let response = dispatch(req, state, &ctx).await;

    ctx.finish(response.status());
    Ok(response)
}

async fn dispatch<B>(
    req: Request<B>,
    state: &AppState,
    ctx: &RequestContext,
) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let method = req.method().clone();
    let route = Route::parse(&method, req.uri().path(), req.uri().query());

    match route {
        Route::Health => text(StatusCode::OK, "ok"),
        Route::Upload => {
            let (parts, body) = req.into_parts();
            match state
                .uploads
                .upload(ctx, &parts.method, &parts.headers, body)
                .await
            {
                Ok(reference) => json(&UploadResponse::from(&reference)),
                Err(e) => upload_error(&e),
            }
        }
        Route::Download { file_path } => {
            match state
                .downloads
                .download(ctx, &method, file_path.as_deref())
                .await
            {
                Ok(download) => download_response(download, method == Method::HEAD),
                Err(e) => download_error(&e),
            }
        }
        Route::Mirror { root, path } => match &state.mirrors {
            Some(mirrors) => {
                match mirrors
                    .serve(ctx, &method, root, &path, req.uri().path())
                    .await
                {
                    Ok(entry) => mirror_response(entry, method == Method::HEAD),
                    Err(e) => mirror_error(&e),
                }
            }
            None => text(StatusCode::NOT_FOUND, "Not Found"),
        },
        Route::NotFound => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn upload_error(e: &UploadError) -> Response<ResponseBody> {
    text(e.status(), &e.to_string())
}

fn download_error(e: &DownloadError) -> Response<ResponseBody> {
    text(e.status(), &e.to_string())
}

fn mirror_error(e: &MirrorError) -> Response<ResponseBody> {
    text(e.status(), &e.to_string())
}

fn download_response(download: Download, head: bool) -> Response<ResponseBody> {
    let disposition = download.content_disposition();
    let Download { file, len, .. } = download;

    let mut response = respond(
        StatusCode::OK,
        OCTET_STREAM,
        if head { body::empty() } else { body::file_stream(file) },
    );
    let headers = response.headers_mut();
    headers.insert(hyper::header::CONTENT_DISPOSITION, disposition);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    response
}

fn mirror_response(entry: MirrorEntry, head: bool) -> Response<ResponseBody> {
    match entry {
        MirrorEntry::File {
            file,
            len,
            content_type,
        } => {
            let mut response = respond(
                StatusCode::OK,
                &content_type,
                if head { body::empty() } else { body::file_stream(file) },
            );
            response
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(len));
            response
        }
        MirrorEntry::Listing(html) => respond(
            StatusCode::OK,
            "text/html; charset=utf-8",
            if head { body::empty() } else { body::full(html) },
        ),
        MirrorEntry::Redirect(location) => {
            let mut response = respond(StatusCode::MOVED_PERMANENTLY, TEXT_PLAIN, body::empty());
            if let Ok(value) = HeaderValue::from_str(&location) {
                response.headers_mut().insert(LOCATION, value);
            }
            response
        }
    }
}

fn json(payload: &UploadResponse) -> Response<ResponseBody> {
    match serde_json::to_vec(payload) {
        Ok(bytes) => respond(StatusCode::OK, "application/json", body::full(bytes)),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// Plain-text response; error responses also carry `nosniff`
fn text(status: StatusCode, message: &str) -> Response<ResponseBody> {
    let mut response = respond(status, TEXT_PLAIN, body::full(message.to_string()));
    if !status.is_success() {
        response
            .headers_mut()
            .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    }
    response
}

fn respond(status: StatusCode, content_type: &str, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}
