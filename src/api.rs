// API client module: a small blocking HTTP client for the product audit
// API. It submits an audit (JSON metadata plus images, as multipart form
// data) and probes the health endpoint. The client keeps no state between
// calls besides its immutable configuration, so it can be cloned and shared
// across threads freely.

use crate::error::{AuditError, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_AUDIT_PATH: &str = "/api/v1/auditoria/produtos";
pub const DEFAULT_HEALTH_PATH: &str = "/api/v1/auditoria/health";
/// Audits run a vision model server-side, so a generous default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Multipart field carrying the JSON-encoded [`AuditRequest`].
pub const DATA_FIELD: &str = "dados";
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

pub const BASE_URL_ENV: &str = "AUDITORIA_API_URL";
pub const TIMEOUT_ENV: &str = "AUDITORIA_TIMEOUT_SECS";
const SETTINGS_FILE: &str = ".auditoria_api_url";

// Cap on up-front buffer reservation; a bogus declared length must not
// trigger a huge allocation before any byte is read.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Where the audit API lives and how long a single call may take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub audit_path: String,
    pub health_path: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.into(),
            audit_path: DEFAULT_AUDIT_PATH.into(),
            health_path: DEFAULT_HEALTH_PATH.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Resolve the configuration: defaults, then the base URL persisted by
    /// the CLI (if any), then `AUDITORIA_API_URL` / `AUDITORIA_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = ClientConfig::default();
        if let Some(url) = load_persisted_base_url() {
            config = config.with_base_url(url);
        }
        config.apply_overrides(
            std::env::var(BASE_URL_ENV).ok(),
            std::env::var(TIMEOUT_ENV).ok(),
        )
    }

    /// Replace the base URL. Trailing slashes are dropped so paths join
    /// cleanly.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn audit_url(&self) -> String {
        format!("{}{}", self.base_url, self.audit_path)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }

    fn apply_overrides(mut self, base_url: Option<String>, timeout_secs: Option<String>) -> Result<Self> {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self = self.with_base_url(url);
        }
        if let Some(raw) = timeout_secs {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AuditError::Config(format!("{} must be a whole number of seconds, got '{}'", TIMEOUT_ENV, raw))
            })?;
            if secs == 0 {
                return Err(AuditError::Config(format!("{} must be greater than zero", TIMEOUT_ENV)));
            }
            self.timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }
}

/// File in the user's home directory holding the base URL chosen through
/// the CLI's "Change API URL" entry.
pub fn settings_path() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(SETTINGS_FILE)
}

pub fn persist_base_url(url: &str) -> io::Result<()> {
    std::fs::write(settings_path(), url.trim())
}

pub fn load_persisted_base_url() -> Option<String> {
    let data = std::fs::read_to_string(settings_path()).ok()?;
    let url = data.trim();
    (!url.is_empty()).then(|| url.to_string())
}

/// One barcode entry of the `codigosDeBarras` list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    #[serde(rename = "codigoBarras")]
    pub barcode: String,
}

/// Product metadata sent as the `dados` field. Field names on the wire
/// mirror what the audit backend expects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuditRequest {
    #[serde(rename = "IdSolicitacao")]
    pub request_id: i64,
    #[serde(rename = "DescricaoProduto")]
    pub product_description: String,
    #[serde(rename = "codigosDeBarras", default)]
    pub barcodes: Vec<Barcode>,
}

impl AuditRequest {
    pub fn new(request_id: i64, product_description: impl Into<String>) -> Self {
        AuditRequest {
            request_id,
            product_description: product_description.into(),
            barcodes: Vec::new(),
        }
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcodes.push(Barcode { barcode: barcode.into() });
        self
    }

    /// Check the payload invariants: a positive id and a non-blank
    /// description. Barcodes may be empty.
    pub fn validate(&self) -> Result<()> {
        if self.request_id <= 0 {
            return Err(AuditError::InvalidRequest(format!(
                "IdSolicitacao must be positive, got {}",
                self.request_id
            )));
        }
        if self.product_description.trim().is_empty() {
            return Err(AuditError::InvalidRequest("DescricaoProduto must not be blank".into()));
        }
        Ok(())
    }
}

/// An image to upload under the `imagens` field.
///
/// The attachment owns its reader. The reader is consumed exactly once when
/// the request is built and is dropped (closing any file handle) as soon as
/// its bytes are buffered, or when the attachment itself is dropped on an
/// error path.
pub struct ImageAttachment {
    file_name: String,
    mime_type: String,
    len: u64,
    content: Box<dyn Read + Send>,
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl ImageAttachment {
    /// Multipart field name shared by every image part.
    pub const FIELD_NAME: &'static str = "imagens";

    /// Wrap a reader that will yield exactly `len` bytes.
    pub fn new<R>(file_name: impl Into<String>, content: R, len: u64) -> Self
    where
        R: Read + Send + 'static,
    {
        ImageAttachment {
            file_name: file_name.into(),
            mime_type: DEFAULT_IMAGE_MIME.into(),
            len,
            content: Box::new(content),
        }
    }

    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        ImageAttachment::new(file_name, Cursor::new(bytes), len)
    }

    /// Open an image on disk. The length comes from file metadata and the
    /// MIME type is guessed from the extension, falling back to
    /// `image/jpeg`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        let open = || -> io::Result<(File, u64)> {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            Ok((file, len))
        };
        let (file, len) = open().map_err(|source| AuditError::Attachment {
            file_name: file_name.clone(),
            source,
        })?;
        let mime = mime_guess::from_path(path)
            .first()
            .filter(|m| m.type_() == mime_guess::mime::IMAGE)
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.into());
        Ok(ImageAttachment::new(file_name, file, len).with_mime_type(mime))
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drain the reader and turn it into a multipart part. Fails if the
    /// reader yields fewer or more bytes than declared.
    fn into_part(self) -> Result<multipart::Part> {
        let ImageAttachment {
            file_name,
            mime_type,
            len,
            mut content,
        } = self;

        let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOC) as usize);
        let read = content
            .by_ref()
            .take(len.saturating_add(1))
            .read_to_end(&mut bytes);
        drop(content);

        let attachment_error = |source| AuditError::Attachment {
            file_name: file_name.clone(),
            source,
        };
        read.map_err(attachment_error)?;
        let got = bytes.len() as u64;
        if got < len {
            return Err(attachment_error(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, stream ended after {}", len, got),
            )));
        }
        if got > len {
            return Err(attachment_error(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("stream is longer than the declared {} bytes", len),
            )));
        }

        multipart::Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(&mime_type)
            .map_err(|_| AuditError::InvalidRequest(format!("invalid MIME type '{}' for '{}'", mime_type, file_name)))
    }
}

/// The server's answer to an audit. The client hands it back untouched;
/// [`AuditResponse::summary`] offers a typed view of the usual fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct AuditResponse(pub serde_json::Value);

/// Verdict block (`resultado`) of an audit response.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditVerdict {
    pub status: Option<String>,
    #[serde(rename = "motivo")]
    pub reason: Option<String>,
}

/// Known fields of a successful audit response. Everything is optional
/// because the backend omits fields depending on the outcome.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AuditSummary {
    #[serde(rename = "idSolicitacao")]
    pub request_id: Option<i64>,
    #[serde(rename = "resultado")]
    pub verdict: Option<AuditVerdict>,
    // LocalDateTime on the backend; string or array depending on its mapper.
    #[serde(rename = "dataAuditoria")]
    pub audited_at: Option<serde_json::Value>,
    #[serde(rename = "mensagem")]
    pub message: Option<String>,
    /// Only present for approved products.
    #[serde(rename = "jsonAprovacao")]
    pub approval_payload: Option<serde_json::Value>,
}

impl AuditResponse {
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }

    /// Best-effort typed view. `None` when the body is not an object of the
    /// expected shape.
    pub fn summary(&self) -> Option<AuditSummary> {
        if !self.0.is_object() {
            return None;
        }
        serde_json::from_value(self.0.clone()).ok()
    }
}

/// Outcome of a health probe. Any HTTP answer counts as reachable; only a
/// failed connection is unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Reachable {
        status: u16,
        body: String,
        /// Set when the status line arrived but the body could not be read
        /// (stalled or dropped connection); `body` is empty then.
        body_error: Option<String>,
    },
    Unreachable { error: String },
}

impl HealthStatus {
    pub fn is_reachable(&self) -> bool {
        matches!(self, HealthStatus::Reachable { .. })
    }

    /// Reachable, answering with a 2xx status, and the body was read in full.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            HealthStatus::Reachable { status, body_error: None, .. } if (200..300).contains(status)
        )
    }
}

/// Blocking client for the audit API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuditError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(ApiClient { client, config })
    }

    /// Build a client from [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        ApiClient::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submit an audit: one POST carrying the `dados` JSON field followed by
    /// one `imagens` part per attachment, in the order given. A single
    /// attempt is made.
    ///
    /// Attachments are taken by value; each reader is released before this
    /// returns, whatever the outcome.
    pub fn send_audit<I>(&self, request: &AuditRequest, attachments: I) -> Result<AuditResponse>
    where
        I: IntoIterator<Item = ImageAttachment>,
    {
        request.validate()?;
        let dados = serde_json::to_string(request).map_err(AuditError::Serialization)?;

        let mut form = multipart::Form::new().text(DATA_FIELD, dados);
        let mut images = 0usize;
        for attachment in attachments {
            form = form.part(ImageAttachment::FIELD_NAME, attachment.into_part()?);
            images += 1;
        }

        let url = self.config.audit_url();
        debug!(url = %url, request_id = request.request_id, images, "Sending audit request");
        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(AuditError::Transport)?;

        let status = res.status();
        let body = res.text().map_err(AuditError::Transport)?;
        debug!(status = status.as_u16(), bytes = body.len(), "Audit response received");
        if status != StatusCode::OK {
            return Err(AuditError::AuditRequestFailed {
                status: status.as_u16(),
                body,
            });
        }
        let value = serde_json::from_str(&body).map_err(AuditError::InvalidResponse)?;
        Ok(AuditResponse(value))
    }

    /// GET the health endpoint. Never fails: connection problems are
    /// reported as [`HealthStatus::Unreachable`].
    pub fn check_health(&self) -> HealthStatus {
        let url = self.config.health_url();
        debug!(url = %url, "Probing audit API health");
        match self.client.get(&url).send() {
            Ok(res) => {
                let status = res.status().as_u16();
                let (body, body_error) = match res.text() {
                    Ok(body) => (body, None),
                    Err(e) => (String::new(), Some(e.to_string())),
                };
                HealthStatus::Reachable {
                    status,
                    body,
                    body_error,
                }
            }
            Err(e) => HealthStatus::Unreachable { error: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn request_serializes_with_backend_field_names() {
        let req = AuditRequest::new(30470331, "Xeque mate energetico").with_barcode("121313");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "IdSolicitacao": 30470331,
                "DescricaoProduto": "Xeque mate energetico",
                "codigosDeBarras": [{ "codigoBarras": "121313" }]
            })
        );
    }

    #[test]
    fn request_without_barcodes_still_sends_empty_list() {
        let value = serde_json::to_value(AuditRequest::new(1, "x")).unwrap();
        assert_eq!(value["codigosDeBarras"], json!([]));
    }

    #[test]
    fn validate_rejects_non_positive_id_and_blank_description() {
        assert!(matches!(
            AuditRequest::new(0, "produto").validate(),
            Err(AuditError::InvalidRequest(_))
        ));
        assert!(matches!(
            AuditRequest::new(-5, "produto").validate(),
            Err(AuditError::InvalidRequest(_))
        ));
        assert!(matches!(
            AuditRequest::new(7, "   ").validate(),
            Err(AuditError::InvalidRequest(_))
        ));
        assert!(AuditRequest::new(7, "produto").validate().is_ok());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ClientConfig::default().with_base_url("http://audit.local:9000/ ");
        assert_eq!(config.audit_url(), "http://audit.local:9000/api/v1/auditoria/produtos");
        assert_eq!(config.health_url(), "http://audit.local:9000/api/v1/auditoria/health");
    }

    #[test]
    fn overrides_replace_url_and_timeout() {
        let config = ClientConfig::default()
            .apply_overrides(Some("http://10.0.0.2:8080/".into()), Some("15".into()))
            .unwrap();
        assert_eq!(config.base_url, "http://10.0.0.2:8080");
        assert_eq!(config.timeout, Duration::from_secs(15));
    }

    #[test]
    fn blank_url_override_keeps_default() {
        let config = ClientConfig::default().apply_overrides(Some("  ".into()), None).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn bad_timeout_override_is_a_config_error() {
        for raw in ["soon", "0", "-3"] {
            let err = ClientConfig::default()
                .apply_overrides(None, Some(raw.into()))
                .unwrap_err();
            assert!(matches!(err, AuditError::Config(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn attachment_defaults_to_jpeg() {
        let att = ImageAttachment::from_bytes("frente.jpg", vec![1, 2, 3]);
        assert_eq!(att.mime_type(), "image/jpeg");
        assert_eq!(att.len(), 3);
        assert!(att.into_part().is_ok());
    }

    #[test]
    fn short_reader_is_rejected() {
        let att = ImageAttachment::new("verso.jpg", Cursor::new(vec![0u8; 4]), 10);
        match att.into_part() {
            Err(AuditError::Attachment { file_name, source }) => {
                assert_eq!(file_name, "verso.jpg");
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn long_reader_is_rejected() {
        let att = ImageAttachment::new("verso.jpg", Cursor::new(vec![0u8; 12]), 10);
        match att.into_part() {
            Err(AuditError::Attachment { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidData)
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn invalid_mime_type_is_rejected() {
        let att = ImageAttachment::from_bytes("a.jpg", vec![1]).with_mime_type("not a mime");
        assert!(matches!(att.into_part(), Err(AuditError::InvalidRequest(_))));
    }

    #[test]
    fn from_path_guesses_mime_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lateral1.png");
        std::fs::File::create(&path).unwrap().write_all(&[9u8; 32]).unwrap();

        let att = ImageAttachment::from_path(&path).unwrap();
        assert_eq!(att.file_name(), "lateral1.png");
        assert_eq!(att.mime_type(), "image/png");
        assert_eq!(att.len(), 32);
    }

    #[test]
    fn from_path_falls_back_to_jpeg_for_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codigo-barras.bin");
        std::fs::write(&path, b"raw").unwrap();

        let att = ImageAttachment::from_path(&path).unwrap();
        assert_eq!(att.mime_type(), "image/jpeg");
    }

    #[test]
    fn from_path_reports_missing_file() {
        let err = ImageAttachment::from_path(Path::new("/definitely/not/here.jpg")).unwrap_err();
        assert!(matches!(err, AuditError::Attachment { ref file_name, .. } if file_name == "here.jpg"));
    }

    #[test]
    fn summary_reads_known_fields() {
        let resp = AuditResponse(json!({
            "idSolicitacao": 30470331,
            "resultado": { "status": "APROVADO", "motivo": "Imagens conferem" },
            "dataAuditoria": "2024-05-02T10:15:00",
            "mensagem": "Auditoria concluída",
            "jsonAprovacao": { "ok": true }
        }));
        let summary = resp.summary().unwrap();
        assert_eq!(summary.request_id, Some(30470331));
        assert_eq!(summary.verdict.unwrap().status.as_deref(), Some("APROVADO"));
        assert_eq!(summary.message.as_deref(), Some("Auditoria concluída"));
        assert_eq!(summary.approval_payload, Some(json!({ "ok": true })));
    }

    #[test]
    fn summary_is_none_for_non_object_bodies() {
        assert!(AuditResponse(json!("boom")).summary().is_none());
        assert!(AuditResponse(json!([1, 2])).summary().is_none());
    }

    #[test]
    fn health_status_helpers() {
        let ok = HealthStatus::Reachable {
            status: 200,
            body: "up".into(),
            body_error: None,
        };
        let down = HealthStatus::Reachable {
            status: 503,
            body: "".into(),
            body_error: None,
        };
        let cut = HealthStatus::Reachable {
            status: 200,
            body: "".into(),
            body_error: Some("operation timed out".into()),
        };
        let gone = HealthStatus::Unreachable { error: "refused".into() };
        assert!(ok.is_reachable() && ok.is_healthy());
        assert!(down.is_reachable() && !down.is_healthy());
        assert!(cut.is_reachable() && !cut.is_healthy());
        assert!(!gone.is_reachable() && !gone.is_healthy());
    }
}
