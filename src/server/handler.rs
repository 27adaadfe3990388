//! HTTP request handling
//!
//! [`BrokerHandler`] maps plain `http` requests onto broker operations. It is
//! independent of the server framework; the listener only adapts bodies.
//!
//! Routes, relative to `ServerConfig::base_path`:
//! ```text
//! POST|PUT  /{channel}             publish a JPEG             202
//! GET       /{channel}             latest frame               200 / 204 / 304 / 404
//! GET       /{channel}/annotation  latest annotation (JSON)   200 / 204 / 404
//! DELETE    /{channel}             remove the channel         200 / 404
//! HEAD|OPTIONS                     probe                      200
//! GET       {status_path}          channel statistics (JSON)  200
//! ```

use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use serde::Deserialize;

use crate::broker::{Broker, FetchedFrame};
use crate::error::Error;
use crate::media::probe_dimensions;
use crate::registry::RegistryError;

use super::config::ServerConfig;

/// Sequence number of the returned frame
pub const X_FRAME_NUMBER: HeaderName = HeaderName::from_static("x-frame-number");
/// Capture wall-clock time of the returned frame, in milliseconds
pub const X_TIMESTAMP: HeaderName = HeaderName::from_static("x-timestamp");

const ANNOTATION_SUFFIX: &str = "/annotation";
const ALLOW_CHANNEL: &str = "GET, HEAD, POST, PUT, DELETE, OPTIONS";
const ALLOW_READ_ONLY: &str = "GET, HEAD, OPTIONS";

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Status,
    Frame(String),
    Annotation(String),
}

/// Maps HTTP requests to broker operations
#[derive(Debug, Clone)]
pub struct BrokerHandler {
    broker: Arc<Broker>,
    config: ServerConfig,
}

impl BrokerHandler {
    pub fn new(broker: Arc<Broker>, config: ServerConfig) -> Self {
        Self { broker, config }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle one request. Never fails: errors become JSON error responses.
    pub fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let mut response = match self.route(&path) {
            Some(route) => self.dispatch(route, request),
            None => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "No such route"),
        };
        self.add_common_headers(response.headers_mut());

        tracing::debug!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            "Request handled"
        );
        response
    }

    fn route(&self, path: &str) -> Option<Route> {
        if path == self.config.status_path {
            return Some(Route::Status);
        }

        let rest = path.strip_prefix(self.config.mount_prefix())?;
        let rest = match rest {
            "" => "",
            _ => rest.strip_prefix('/')?,
        };

        let (name, annotation) = match rest.strip_suffix(ANNOTATION_SUFFIX) {
            Some(name) => (name, true),
            None => (rest, false),
        };
        if name.contains('/') {
            return None;
        }

        let name = if name.is_empty() {
            self.config.default_channel.clone()
        } else {
            name.to_string()
        };

        Some(if annotation {
            Route::Annotation(name)
        } else {
            Route::Frame(name)
        })
    }

    fn dispatch(&self, route: Route, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        match route {
            Route::Status => match method {
                Method::GET => self.status(),
                Method::HEAD | Method::OPTIONS => probe_response(ALLOW_READ_ONLY),
                _ => method_not_allowed(ALLOW_READ_ONLY),
            },
            Route::Annotation(name) => match method {
                Method::GET => self.annotation(&name),
                Method::HEAD | Method::OPTIONS => probe_response(ALLOW_READ_ONLY),
                _ => method_not_allowed(ALLOW_READ_ONLY),
            },
            Route::Frame(name) => match method {
                Method::GET => self.fetch(&name, request.headers()),
                Method::POST | Method::PUT => self.publish(&name, request),
                Method::DELETE => self.remove(&name),
                Method::HEAD | Method::OPTIONS => probe_response(ALLOW_CHANNEL),
                _ => method_not_allowed(ALLOW_CHANNEL),
            },
        }
    }

    fn publish(&self, name: &str, request: Request<Bytes>) -> Response<Bytes> {
        if !is_jpeg(request.headers()) {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                "Content-Type must be image/jpeg",
            );
        }

        let body = request.body();
        if body.len() > self.config.max_body_size {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                &format!("Body exceeds {} bytes", self.config.max_body_size),
            );
        }

        let (width, height) = match frame_size(request.uri().query(), body) {
            Ok(size) => size,
            Err(e) => return from_error(&e),
        };

        match self.broker.publish(name, body.clone(), width, height) {
            Ok(sequence) => Response::builder()
                .status(StatusCode::ACCEPTED)
                .header(X_FRAME_NUMBER, sequence)
                .body(Bytes::new())
                .unwrap_or_else(|_| internal_error()),
            Err(e) => {
                if matches!(e, Error::Registry(RegistryError::RegistrationRace(_))) {
                    tracing::error!(channel = name, error = %e, "Publish failed");
                }
                from_error(&e)
            }
        }
    }

    fn fetch(&self, name: &str, headers: &HeaderMap) -> Response<Bytes> {
        let fetched = match if_none_match(headers) {
            Some((channel_id, sequence)) => match self.broker.fetch_if_newer(name, sequence) {
                Err(Error::NotModified) if !self.is_same_channel(name, channel_id) => {
                    self.broker.fetch(name)
                }
                other => other,
            },
            None => self.broker.fetch(name),
        };

        match fetched {
            Ok(frame) => frame_response(frame),
            Err(e) => from_error(&e),
        }
    }

    /// Whether `name` still refers to the channel an ETag was issued for
    fn is_same_channel(&self, name: &str, channel_id: u64) -> bool {
        self.broker
            .registry()
            .find_by_name(name)
            .map(|c| c.id() == channel_id)
            .unwrap_or(false)
    }

    fn annotation(&self, name: &str) -> Response<Bytes> {
        match self.broker.annotation(name) {
            Ok(Some(doc)) => json_response(StatusCode::OK, &doc),
            Ok(None) => empty_response(StatusCode::NO_CONTENT),
            Err(e) => from_error(&e),
        }
    }

    fn remove(&self, name: &str) -> Response<Bytes> {
        match self.broker.remove(name) {
            Ok(()) => empty_response(StatusCode::OK),
            Err(e) => from_error(&e),
        }
    }

    fn status(&self) -> Response<Bytes> {
        json_response(StatusCode::OK, &self.broker.channels())
    }

    fn add_common_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        if let Ok(origin) = HeaderValue::from_str(&self.config.allow_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
    }
}

/// Entity tag for a frame: channel id and sequence
fn etag(frame: &FetchedFrame) -> String {
    format!("\"{}.{}\"", frame.channel_id, frame.sequence)
}

/// Parse `If-None-Match` as one of our entity tags
fn if_none_match(headers: &HeaderMap) -> Option<(u64, u64)> {
    let value = headers.get(header::IF_NONE_MATCH)?.to_str().ok()?.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    let tag = value.strip_prefix('"')?.strip_suffix('"')?;
    let (channel_id, sequence) = tag.split_once('.')?;
    Some((channel_id.parse().ok()?, sequence.parse().ok()?))
}

fn is_jpeg(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("image/jpeg"))
        .unwrap_or(false)
}

/// Optional `?width=..&height=..` publish parameters
#[derive(Debug, Default, Deserialize)]
struct FrameSize {
    width: Option<u32>,
    height: Option<u32>,
}

/// Frame dimensions from the `width`/`height` query parameters, else from
/// the JPEG header.
fn frame_size(query: Option<&str>, body: &[u8]) -> Result<(u32, u32), Error> {
    let size: FrameSize = serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| Error::InvalidArgument(format!("invalid width/height: {}", e)))?;

    match (size.width, size.height) {
        (Some(width), Some(height)) => Ok((width, height)),
        (None, None) => probe_dimensions(body)
            .map(|d| (d.width, d.height))
            .ok_or_else(|| {
                Error::InvalidArgument("cannot determine frame dimensions".into())
            }),
        _ => Err(Error::InvalidArgument(
            "width and height must be given together".into(),
        )),
    }
}

fn frame_response(frame: FetchedFrame) -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, frame.content_type)
        .header(header::ETAG, etag(&frame))
        .header(X_FRAME_NUMBER, frame.sequence)
        .header(X_TIMESTAMP, frame.timestamp_ms)
        .body(frame.bytes)
        .unwrap_or_else(|_| internal_error())
}

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<Bytes> {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))
            .unwrap_or_else(|_| internal_error()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            internal_error()
        }
    }
}

fn empty_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

fn probe_response(allow: &'static str) -> Response<Bytes> {
    let mut response = empty_response(StatusCode::OK);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(allow));
    response
}

fn method_not_allowed(allow: &'static str) -> Response<Bytes> {
    let mut response = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        "Method not allowed",
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

fn from_error(err: &Error) -> Response<Bytes> {
    let status = err.status_code();
    match status {
        StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED => empty_response(status),
        _ => error_response(status, err.error_code(), &err.to_string()),
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Bytes> {
    json_response(
        status,
        &serde_json::json!({ "error_code": code, "message": message }),
    )
}

fn internal_error() -> Response<Bytes> {
    empty_response(StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::jpeg::tests::jpeg_header;

    fn handler() -> BrokerHandler {
        BrokerHandler::new(Arc::new(Broker::new()), ServerConfig::default())
    }

    /// 100-byte JPEG: a real SOF header padded with filler
    fn jpeg(fill: u8) -> Bytes {
        let mut data = jpeg_header(640, 480);
        data.resize(100, fill);
        Bytes::from(data)
    }

    fn request(method: Method, uri: &str, body: Bytes) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .unwrap()
    }

    fn get(handler: &BrokerHandler, uri: &str) -> Response<Bytes> {
        handler.handle(request(Method::GET, uri, Bytes::new()))
    }

    fn header_str<'a>(response: &'a Response<Bytes>, name: &str) -> &'a str {
        response.headers()[name].to_str().unwrap()
    }

    #[test]
    fn test_publish_and_fetch_sequence() {
        let handler = handler();

        let response = handler.handle(request(Method::POST, "/cam1", jpeg(1)));
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.body().is_empty());

        let response = get(&handler, "/cam1");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &jpeg(1));
        assert_eq!(header_str(&response, "content-type"), "image/jpeg");
        assert_eq!(header_str(&response, "x-frame-number"), "1");

        let response = handler.handle(request(Method::PUT, "/cam1", jpeg(2)));
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = get(&handler, "/cam1");
        assert_eq!(response.body(), &jpeg(2));
        assert_eq!(header_str(&response, "x-frame-number"), "2");
    }

    #[test]
    fn test_unknown_and_empty_channels() {
        let handler = handler();

        let response = get(&handler, "/unknown");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error_code"], "NOT_FOUND");

        handler.broker().register("cam1").unwrap();
        let response = get(&handler, "/cam1");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_cache_headers() {
        let handler = handler();
        handler.handle(request(Method::POST, "/cam1", jpeg(1)));

        let response = get(&handler, "/cam1");
        assert_eq!(
            header_str(&response, "cache-control"),
            "no-store, no-cache, must-revalidate"
        );
        assert_eq!(header_str(&response, "pragma"), "no-cache");
        assert_eq!(header_str(&response, "access-control-allow-origin"), "*");
        assert!(header_str(&response, "x-timestamp").parse::<u64>().unwrap() > 0);
    }

    #[test]
    fn test_conditional_get() {
        let handler = handler();
        handler.handle(request(Method::POST, "/cam1", jpeg(1)));

        let response = get(&handler, "/cam1");
        let etag = header_str(&response, "etag").to_string();

        let mut conditional = request(Method::GET, "/cam1", Bytes::new());
        conditional
            .headers_mut()
            .insert(header::IF_NONE_MATCH, etag.parse().unwrap());
        let response = handler.handle(conditional);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        handler.handle(request(Method::POST, "/cam1", jpeg(2)));
        let mut conditional = request(Method::GET, "/cam1", Bytes::new());
        conditional
            .headers_mut()
            .insert(header::IF_NONE_MATCH, etag.parse().unwrap());
        let response = handler.handle(conditional);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "x-frame-number"), "2");
    }

    #[test]
    fn test_conditional_get_after_recreate() {
        let handler = handler();
        handler.handle(request(Method::POST, "/cam1", jpeg(1)));
        handler.handle(request(Method::POST, "/cam1", jpeg(2)));
        let etag = header_str(&get(&handler, "/cam1"), "etag").to_string();

        handler.handle(request(Method::DELETE, "/cam1", Bytes::new()));
        handler.handle(request(Method::POST, "/cam1", jpeg(3)));

        // Sequence restarted at 1, below the stale tag's 2
        let mut conditional = request(Method::GET, "/cam1", Bytes::new());
        conditional
            .headers_mut()
            .insert(header::IF_NONE_MATCH, etag.parse().unwrap());
        let response = handler.handle(conditional);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &jpeg(3));
    }

    #[test]
    fn test_publish_rejections() {
        let handler = handler();

        let mut wrong_type = request(Method::POST, "/cam1", jpeg(1));
        wrong_type
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(handler.handle(wrong_type).status(), StatusCode::BAD_REQUEST);

        let response = handler.handle(request(Method::POST, "/cam1", Bytes::new()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Not a JPEG and no explicit size
        let response = handler.handle(request(Method::POST, "/cam1", Bytes::from(vec![0u8; 100])));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(handler.broker().registry().is_empty());
    }

    #[test]
    fn test_publish_with_query_dimensions() {
        let handler = handler();

        let mut typed = request(
            Method::POST,
            "/cam1?width=320&height=240",
            Bytes::from(vec![0u8; 100]),
        );
        typed.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Image/JPEG; charset=binary"),
        );
        assert_eq!(handler.handle(typed).status(), StatusCode::ACCEPTED);

        let fetched = handler.broker().fetch("cam1").unwrap();
        assert_eq!((fetched.width, fetched.height), (320, 240));

        let response = handler.handle(request(
            Method::POST,
            "/cam1?width=320",
            Bytes::from(vec![0u8; 100]),
        ));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handler.handle(request(
            Method::POST,
            "/cam1?width=wide&height=240",
            Bytes::from(vec![0u8; 100]),
        ));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_publish_with_encoded_query_dimensions() {
        let handler = handler();

        let response = handler.handle(request(
            Method::POST,
            "/cam1?width=%33%32%30&height=240&source=lobby%20cam",
            Bytes::from(vec![0u8; 100]),
        ));
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let fetched = handler.broker().fetch("cam1").unwrap();
        assert_eq!((fetched.width, fetched.height), (320, 240));
    }

    #[test]
    fn test_publish_over_limit_is_server_error() {
        let broker = Broker::with_config(
            crate::registry::RegistryConfig::default().max_channels(1),
            crate::pipeline::PipelineConfig::default(),
        );
        let handler = BrokerHandler::new(Arc::new(broker), ServerConfig::default());

        handler.handle(request(Method::POST, "/a", jpeg(1)));
        let response = handler.handle(request(Method::POST, "/b", jpeg(1)));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_body_too_large() {
        let handler = BrokerHandler::new(
            Arc::new(Broker::new()),
            ServerConfig::default().max_body_size(50),
        );

        let response = handler.handle(request(Method::POST, "/cam1", jpeg(1)));
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_default_channel() {
        let handler = handler();

        handler.handle(request(Method::POST, "/", jpeg(1)));
        assert!(handler.broker().fetch("channel0").is_ok());
        assert_eq!(get(&handler, "/").status(), StatusCode::OK);
    }

    #[test]
    fn test_base_path() {
        let handler = BrokerHandler::new(
            Arc::new(Broker::new()),
            ServerConfig::default().base_path("/frames"),
        );

        let response = handler.handle(request(Method::POST, "/frames/cam1", jpeg(1)));
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(get(&handler, "/frames/cam1").status(), StatusCode::OK);
        assert_eq!(get(&handler, "/cam1").status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&handler, "/framescam1").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_nested_path_not_found() {
        let handler = handler();

        assert_eq!(get(&handler, "/a/b").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_annotation() {
        let handler = handler();

        assert_eq!(get(&handler, "/cam1/annotation").status(), StatusCode::NOT_FOUND);

        handler.handle(request(Method::POST, "/cam1", jpeg(1)));
        // Published over HTTP: no annotation
        assert_eq!(get(&handler, "/cam1/annotation").status(), StatusCode::NO_CONTENT);

        let channel = handler.broker().registry().find_by_name("cam1").unwrap();
        let frame = crate::registry::Frame::builder(
            1,
            1,
            crate::registry::Encoding::Jpeg,
            Bytes::from_static(b"x"),
        )
        .annotation(Some(serde_json::json!({"objects": ["person"]})))
        .build()
        .unwrap();
        channel.update(frame).unwrap();

        let response = get(&handler, "/cam1/annotation");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "content-type"), "application/json");
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["objects"][0], "person");
    }

    #[test]
    fn test_head_options_delete() {
        let handler = handler();

        let response = handler.handle(request(Method::HEAD, "/cam1", Bytes::new()));
        assert_eq!(response.status(), StatusCode::OK);
        let response = handler.handle(request(Method::OPTIONS, "/cam1", Bytes::new()));
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header_str(&response, "allow").contains("POST"));

        let response = handler.handle(request(Method::DELETE, "/cam1", Bytes::new()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        handler.handle(request(Method::POST, "/cam1", jpeg(1)));
        let response = handler.handle(request(Method::DELETE, "/cam1", Bytes::new()));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(get(&handler, "/cam1").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_method_not_allowed() {
        let handler = handler();

        let response = handler.handle(request(Method::PATCH, "/cam1", Bytes::new()));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let response = handler.handle(request(Method::POST, "/cam1/annotation", jpeg(1)));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_status_endpoint() {
        let handler = handler();
        handler.handle(request(Method::POST, "/cam1", jpeg(1)));
        handler.broker().register("cam2").unwrap();

        let response = get(&handler, "/_status");
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        let channels = body.as_array().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0]["name"], "cam1");
        assert_eq!(channels[0]["sequence"], 1);
        assert_eq!(channels[0]["width"], 640);
        assert_eq!(channels[1]["has_frame"], false);
    }

    #[test]
    fn test_if_none_match_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(if_none_match(&headers), None);

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"3.7\""));
        assert_eq!(if_none_match(&headers), Some((3, 7)));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("W/\"3.7\""));
        assert_eq!(if_none_match(&headers), Some((3, 7)));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert_eq!(if_none_match(&headers), None);
    }
}
