//! Extractors whose rejections use the standard error envelope.

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request};
use axum::http::{header, request::Parts};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::error::ApiError;

#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// Caller address: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn from_parts(parts: &Parts) -> Self {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = || {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        if let Some(ip) = forwarded.or_else(real_ip) {
            return Self(ip.to_string());
        }
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| Self(addr.ip().to_string()))
            .unwrap_or_else(|| Self("127.0.0.1".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Lower-cased extension of the client filename
    pub fn extension(&self) -> Option<String> {
        self.filename
            .as_deref()
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Request body accepted either as JSON or as `multipart/form-data`.
/// Scalars land in `fields`, arrays (`tags[]` or JSON arrays) in `lists`.
#[derive(Debug, Default)]
pub struct FormInput {
    pub fields: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
    pub objects: HashMap<String, Value>,
    pub files: HashMap<String, UploadedFile>,
}

impl FormInput {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.lists.get(key).map(Vec::as_slice)
    }

    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.get(key)
    }

    fn from_json(body: Value) -> Result<Self, ApiError> {
        let Value::Object(map) = body else {
            return Err(ApiError::invalid_json("The request body must be a JSON object."));
        };
        let mut input = Self::default();
        for (key, value) in map {
            match value {
                Value::Null => {}
                Value::String(s) => {
                    input.fields.insert(key, s);
                }
                Value::Bool(_) | Value::Number(_) => {
                    input.fields.insert(key, value.to_string());
                }
                Value::Array(items) => {
                    let items = items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .collect();
                    input.lists.insert(key, items);
                }
                Value::Object(_) => {
                    input.objects.insert(key, value);
                }
            }
        }
        Ok(input)
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut input = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if field.file_name().is_some() {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                input.files.insert(
                    name,
                    UploadedFile {
                        filename,
                        content_type,
                        data,
                    },
                );
                continue;
            }

            let text = field.text().await?;
            match name.strip_suffix("[]") {
                Some(list) => input.lists.entry(list.to_string()).or_default().push(text),
                None => {
                    input.fields.insert(name, text);
                }
            }
        }
        Ok(input)
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_multipart {
            let multipart = Multipart::from_request(req, state).await?;
            Self::from_multipart(multipart).await
        } else {
            let axum::Json(body) = axum::Json::<Value>::from_request(req, state).await?;
            Self::from_json(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use serde_json::json;

    fn parts(req: HttpRequest<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn forwarded_for_wins() {
        let p = parts(
            HttpRequest::builder()
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                .header("x-real-ip", "198.51.100.1")
                .body(())
                .unwrap(),
        );
        assert_eq!(ClientIp::from_parts(&p).0, "203.0.113.9");
    }

    #[test]
    fn real_ip_then_socket_then_loopback() {
        let p = parts(HttpRequest::builder().header("x-real-ip", "198.51.100.1").body(()).unwrap());
        assert_eq!(ClientIp::from_parts(&p).0, "198.51.100.1");

        let mut req = HttpRequest::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.7:5555".parse::<SocketAddr>().unwrap()));
        assert_eq!(ClientIp::from_parts(&parts(req)).0, "192.0.2.7");

        let p = parts(HttpRequest::builder().body(()).unwrap());
        assert_eq!(ClientIp::from_parts(&p).0, "127.0.0.1");
    }

    #[test]
    fn json_bodies_split_into_fields_and_lists() {
        let input = FormInput::from_json(json!({
            "name": "John",
            "is_public": true,
            "tags": ["a", "b"],
            "data": { "k": "v" },
            "missing": null
        }))
        .unwrap();
        assert_eq!(input.get("name"), Some("John"));
        assert_eq!(input.get("is_public"), Some("true"));
        assert_eq!(input.list("tags").unwrap(), ["a".to_string(), "b".to_string()]);
        assert!(input.objects.contains_key("data"));
        assert!(input.get("missing").is_none());
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(FormInput::from_json(json!([1, 2])).is_err());
    }
}
