use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Form as UrlEncoded, Json,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request},
    http::{HeaderMap, header, request::Parts},
};
use serde_json::Value;

use super::AppState;
use super::response::ApiError;
use crate::forms::UploadedFile;

/// Request details used for auditing and for building redirects.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub client_ip: Option<String>,
    pub referer: Option<String>,
    /// Set for `X-Requested-With: XMLHttpRequest` requests.
    pub is_xhr: bool,
    /// Scheme and host that external links should use.
    pub base_url: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[must_use]
fn get_host_from_headers(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let scheme = header_str(headers, "x-forwarded-proto").unwrap_or("http");

    format!("{scheme}://{host}")
}

/// Client address for auditing. Forwarding headers count only when the peer
/// is a trusted proxy; otherwise the peer address itself is used.
fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted: &[IpAddr]) -> Option<String> {
    if peer.is_some_and(|ip| trusted.contains(&ip)) {
        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .or_else(|| header_str(headers, "x-real-ip"))
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }
    peer.map(|ip| ip.to_string())
}

impl FromRequestParts<Arc<AppState>> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let client_ip = client_ip(headers, peer, &state.config.trusted_proxies);

        let base_url = match &state.config.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => get_host_from_headers(headers),
        };

        Ok(RequestMeta {
            client_ip,
            referer: header_str(headers, header::REFERER.as_str()).map(str::to_string),
            is_xhr: header_str(headers, "x-requested-with")
                .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest")),
            base_url,
        })
    }
}

/// Fields and files of a form POST. Accepts multipart, urlencoded and flat
/// JSON object bodies.
#[derive(Debug, Default)]
pub struct FormFields {
    pub fields: HashMap<String, String>,
    pub files: Vec<(String, UploadedFile)>,
}

impl FormFields {
    /// A non-empty text field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> {
        self.files.iter().filter(move |(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        let idx = self.files.iter().position(|(n, _)| n == name)?;
        Some(self.files.remove(idx).1)
    }
}

impl FromRequest<Arc<AppState>> for FormFields {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            return read_multipart(multipart).await;
        }

        if content_type.starts_with("application/json") {
            let Json(map) = Json::<serde_json::Map<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            let fields = map
                .into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, v)
                })
                .collect();
            return Ok(FormFields {
                fields,
                files: Vec::new(),
            });
        }

        let UrlEncoded(fields) = UrlEncoded::<HashMap<String, String>>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(FormFields {
            fields,
            files: Vec::new(),
        })
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<FormFields, ApiError> {
    let mut out = FormFields::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError {
        status: e.status(),
        message: e.body_text(),
    })? {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| ApiError {
                    status: e.status(),
                    message: e.body_text(),
                })?;
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                out.files.push((
                    name,
                    UploadedFile {
                        file_name,
                        content_type,
                        data,
                    },
                ));
            }
            None => {
                let text = field.text().await.map_err(|e| ApiError {
                    status: e.status(),
                    message: e.body_text(),
                })?;
                out.fields.insert(name, text);
            }
        }
    }

    Ok(out)
}
