//! Classification of finished network requests
//!
//! The transport itself lives elsewhere. This module only turns a completed
//! response into a [`ResponseResultCode`] that retry logic can branch on, and
//! stamps the headers every request to the service carries.

use serde::{Deserialize, Serialize};

/// Header names applied by [`set_common_headers`]
pub mod common_headers {
    pub const ACCEPT_LANGUAGE: &str = "Accept-Language";
    pub const AUTHORIZATION: &str = "Authorization";
}

/// Transport-level outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportError {
    NoError,
    BadUrl,
    ConnectionFailed,
    ConnectionRefused,
    RemoteHostClosed,
    HostNotFound,
    Timeout,
    OperationCancelled,
    SslHandshakeFailed,
    TooManyRedirects,
    ProxyConnectionFailed,
    ProxyNotFound,
    UnknownError,
    /// The server answered with a non-success HTTP status
    HttpError,
}

impl TransportError {
    /// Failures meaning the service could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed
                | TransportError::ConnectionRefused
                | TransportError::HostNotFound
                | TransportError::ProxyConnectionFailed
                | TransportError::ProxyNotFound
                | TransportError::RemoteHostClosed
        )
    }
}

/// Decision-relevant outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResultCode {
    Success,
    Cancelled,
    Expired,
    Conflict,
    ConnectionFailed,
    PaymentRequired,
    TooLarge,
    Unauthorized,
    Forbidden,
    NotFound,
    /// Set by callers when a successful response cannot be parsed
    UnexpectedResponse,
    /// Set by callers for local failures while preparing a request
    InternalClientError,
    InternalServerError,
    UnknownError,
}

impl ResponseResultCode {
    /// Codes worth retrying later without further information
    ///
    /// `UnknownError` is deliberately excluded: it is neither known transient
    /// nor known permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResponseResultCode::ConnectionFailed | ResponseResultCode::InternalServerError
        )
    }
}

/// Outcome of a request plus a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseResult {
    pub code: ResponseResultCode,
    pub message: String,
}

impl ResponseResult {
    pub fn is_success(&self) -> bool {
        self.code == ResponseResultCode::Success
    }
}

/// A response whose transfer has finished
pub trait CompletedResponse {
    fn transport_error(&self) -> TransportError;

    /// HTTP status, meaningful when the server answered
    fn http_code(&self) -> u16;

    /// Transport's own description of the failure
    fn error_string(&self) -> String;

    /// Read the whole body. Only called when the message needs it.
    fn read_body(&mut self) -> String;
}

/// Map an HTTP status to a result code
pub fn result_code_from_http_code(code: u16) -> ResponseResultCode {
    match code {
        409 | 422 => ResponseResultCode::Conflict,
        402 => ResponseResultCode::PaymentRequired,
        401 => ResponseResultCode::Unauthorized,
        403 => ResponseResultCode::Forbidden,
        404 => ResponseResultCode::NotFound,
        413 => ResponseResultCode::TooLarge,
        410 => ResponseResultCode::Expired,
        code if code > 500 => ResponseResultCode::InternalServerError,
        _ => ResponseResultCode::UnknownError,
    }
}

/// Classify a response. First match wins.
pub fn guess_result_code<R: CompletedResponse + ?Sized>(response: &R) -> ResponseResultCode {
    match response.transport_error() {
        TransportError::NoError => ResponseResultCode::Success,
        TransportError::OperationCancelled => ResponseResultCode::Cancelled,
        err if err.is_connectivity() => ResponseResultCode::ConnectionFailed,
        TransportError::HttpError => result_code_from_http_code(response.http_code()),
        _ => ResponseResultCode::UnknownError,
    }
}

/// Classify a response and build its message
///
/// On success the body becomes the message only if `read_body` is set. HTTP
/// failures read as `"HTTP <status>\n<body>"`; other failures carry the
/// transport's error string.
pub fn get_response_result<R: CompletedResponse + ?Sized>(
    response: &mut R,
    read_body: bool,
) -> ResponseResult {
    let code = guess_result_code(&*response);

    let message = if code == ResponseResultCode::Success {
        if read_body {
            response.read_body()
        } else {
            String::new()
        }
    } else if response.transport_error() != TransportError::HttpError {
        response.error_string()
    } else {
        format!("HTTP {}\n{}", response.http_code(), response.read_body())
    };

    if code != ResponseResultCode::Success {
        tracing::debug!(?code, status = response.http_code(), "Request failed");
    }

    ResponseResult { code, message }
}

/// A finished response held entirely in memory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferedResponse {
    pub error: Option<TransportError>,
    pub status: u16,
    pub error_string: String,
    pub body: String,
}

impl BufferedResponse {
    pub fn ok(status: u16, body: impl Into<String>) -> Self {
        Self {
            error: None,
            status,
            error_string: String::new(),
            body: body.into(),
        }
    }

    pub fn http_error(status: u16, body: impl Into<String>) -> Self {
        Self {
            error: Some(TransportError::HttpError),
            status,
            error_string: String::new(),
            body: body.into(),
        }
    }

    pub fn transport_failure(error: TransportError, description: impl Into<String>) -> Self {
        Self {
            error: Some(error),
            status: 0,
            error_string: description.into(),
            body: String::new(),
        }
    }
}

impl CompletedResponse for BufferedResponse {
    fn transport_error(&self) -> TransportError {
        self.error.unwrap_or(TransportError::NoError)
    }

    fn http_code(&self) -> u16 {
        self.status
    }

    fn error_string(&self) -> String {
        self.error_string.clone()
    }

    fn read_body(&mut self) -> String {
        std::mem::take(&mut self.body)
    }
}

/// A request that has not been sent yet
pub trait OutgoingRequest {
    fn set_header(&mut self, name: &str, value: &str);
}

/// Source of the `Accept-Language` value, empty when none is configured
pub trait LanguageProvider {
    fn accept_language(&self) -> String;
}

/// Source of the current access token
pub trait AccessTokenProvider {
    fn access_token(&self) -> Option<String>;
}

/// Apply the headers every request to the service carries
pub fn set_common_headers<R: OutgoingRequest + ?Sized>(
    request: &mut R,
    language: &dyn LanguageProvider,
    tokens: &dyn AccessTokenProvider,
) {
    let accept_language = language.accept_language();
    if !accept_language.is_empty() {
        request.set_header(common_headers::ACCEPT_LANGUAGE, &accept_language);
    }

    if let Some(token) = tokens.access_token() {
        request.set_header(common_headers::AUTHORIZATION, &token);
    }
}

#[cfg(feature = "http")]
mod reqwest_adapter {
    use reqwest::header::{HeaderName, HeaderValue};

    use super::{BufferedResponse, OutgoingRequest, TransportError};

    impl From<&reqwest::Error> for TransportError {
        fn from(e: &reqwest::Error) -> Self {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_connect() {
                TransportError::ConnectionFailed
            } else if e.is_redirect() {
                TransportError::TooManyRedirects
            } else if e.is_builder() {
                TransportError::BadUrl
            } else if e.is_status() {
                TransportError::HttpError
            } else {
                TransportError::UnknownError
            }
        }
    }

    impl BufferedResponse {
        /// Drain a finished reqwest call into a classifiable response
        pub async fn from_reqwest(result: reqwest::Result<reqwest::Response>) -> Self {
            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = match response.text().await {
                        Ok(body) => body,
                        Err(e) => {
                            return Self {
                                error: Some(TransportError::from(&e)),
                                status: status.as_u16(),
                                error_string: e.to_string(),
                                body: String::new(),
                            }
                        }
                    };
                    if status.is_success() {
                        Self::ok(status.as_u16(), body)
                    } else {
                        Self::http_error(status.as_u16(), body)
                    }
                }
                Err(e) => Self {
                    error: Some(TransportError::from(&e)),
                    status: e.status().map(|s| s.as_u16()).unwrap_or_default(),
                    error_string: e.to_string(),
                    body: String::new(),
                },
            }
        }
    }

    impl OutgoingRequest for reqwest::Request {
        fn set_header(&mut self, name: &str, value: &str) {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    self.headers_mut().insert(name, value);
                }
                _ => tracing::warn!(header = name, "Skipping invalid request header"),
            }
        }
    }
}
