//! Per-request options.

use std::time::Duration;

use reqwest::Method;
use reqwest::multipart::{Form, Part};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;

/// Which backend service a request is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Service {
    /// Core business service.
    #[default]
    Core,
    /// Identity service.
    Identity,
}

/// Request body.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Multipart(MultipartBody),
}

/// A multipart body kept as plain data so a retry can rebuild the form.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

#[derive(Debug, Clone)]
struct MultipartPart {
    name: String,
    content: PartContent,
}

#[derive(Debug, Clone)]
enum PartContent {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

impl MultipartBody {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            content: PartContent::Text(value.into()),
        });
        self
    }

    /// Add a file field.
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            content: PartContent::File {
                file_name: file_name.into(),
                mime: mime.map(str::to_string),
                bytes,
            },
        });
        self
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the body has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Build a fresh `reqwest` form.
    ///
    /// # Errors
    ///
    /// Returns an error if a part carries an invalid MIME type.
    pub fn to_form(&self) -> Result<Form, reqwest::Error> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match &part.content {
                PartContent::Text(value) => form.text(part.name.clone(), value.clone()),
                PartContent::File {
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime)?;
                    }
                    form.part(part.name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

/// Options for a single request.
///
/// ```
/// use shopfront_client::RequestOptions;
///
/// let options = RequestOptions::post(&serde_json::json!({"name": "Tee"}))
///     .auth_required()
///     .query("draft", "true");
/// assert!(options.is_auth_required());
/// ```
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub(crate) method: Method,
    pub(crate) body: Option<RequestBody>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) auth_required: bool,
    pub(crate) service: Service,
    pub(crate) credential: Option<SecretString>,
    pub(crate) anonymous: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) suppress_errors: bool,
}

impl RequestOptions {
    /// A `GET` request.
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post(body: &impl Serialize) -> Self {
        Self::default().method(Method::POST).json(body)
    }

    /// A `PUT` request with a JSON body.
    #[must_use]
    pub fn put(body: &impl Serialize) -> Self {
        Self::default().method(Method::PUT).json(body)
    }

    /// A `PATCH` request with a JSON body.
    #[must_use]
    pub fn patch(body: &impl Serialize) -> Self {
        Self::default().method(Method::PATCH).json(body)
    }

    /// A `DELETE` request.
    #[must_use]
    pub fn delete() -> Self {
        Self::default().method(Method::DELETE)
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set a JSON body. Values that fail to serialize are sent as `null`.
    #[must_use]
    pub fn json(mut self, body: &impl Serialize) -> Self {
        let value = serde_json::to_value(body).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Request body could not be serialized");
            Value::Null
        });
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Set a multipart body.
    #[must_use]
    pub fn multipart(mut self, body: MultipartBody) -> Self {
        self.body = Some(RequestBody::Multipart(body));
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append an extra header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Fail with an auth error instead of silently going anonymous.
    #[must_use]
    pub const fn auth_required(mut self) -> Self {
        self.auth_required = true;
        self
    }

    /// Address the identity service instead of the core service.
    #[must_use]
    pub const fn service(mut self, service: Service) -> Self {
        self.service = service;
        self
    }

    /// Authenticate with this token verbatim instead of a stored identity.
    #[must_use]
    pub fn credential(mut self, token: SecretString) -> Self {
        self.credential = Some(token);
        self
    }

    /// Send without any credential. A 401 is final: no refresh and no
    /// guest retry. Used for credential exchanges such as login.
    #[must_use]
    pub const fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Override the client's default timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Skip notifications and redirects for this request's errors.
    #[must_use]
    pub const fn suppress_errors(mut self) -> Self {
        self.suppress_errors = true;
        self
    }

    #[must_use]
    pub const fn is_auth_required(&self) -> bool {
        self.auth_required
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("service", &self.service)
            .field("auth_required", &self.auth_required)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("anonymous", &self.anonymous)
            .field("timeout", &self.timeout)
            .field("suppress_errors", &self.suppress_errors)
            .finish_non_exhaustive()
    }
}
