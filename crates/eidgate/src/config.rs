use eidgate_protocol::ServiceConfig;
use eidgate_signer::DigestAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GatewayError, GatewayResult};

/// Document signing. Signing is offered only when `document_path` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Container presented for signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,

    /// Where the signed container is written. Defaults to
    /// `<document>.signed.<ext>` next to the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(default)]
    pub digest_algorithm: DigestAlgorithm,

    #[serde(default = "default_description")]
    pub description: String,

    /// Ask the client to digest local files first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_digest_algorithm: Option<DigestAlgorithm>,

    /// Ask the client for its signing chain before computing the digest.
    #[serde(default)]
    pub require_signing_certificates: bool,
}

fn default_description() -> String {
    "ODF Signature".to_string()
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            document_path: None,
            output_path: None,
            digest_algorithm: DigestAlgorithm::default(),
            description: default_description(),
            files_digest_algorithm: None,
            require_signing_certificates: false,
        }
    }
}

impl SignerConfig {
    pub fn resolved_output_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.output_path {
            return Some(path.clone());
        }
        let document = self.document_path.as_ref()?;
        let stem = document.file_stem()?.to_string_lossy().into_owned();
        let name = match document.extension() {
            Some(ext) => format!("{}.signed.{}", stem, ext.to_string_lossy()),
            None => format!("{}.signed", stem),
        };
        Some(document.with_file_name(name))
    }
}

/// Authentication. Offered only when `enabled`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Issuers whose authentication certificates are accepted. Empty
    /// accepts any issuer.
    #[serde(default)]
    pub trusted_issuers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

fn default_server_name() -> String {
    "eidgate".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
        }
    }
}

/// Top-level configuration of the gateway binary.
///
/// Loaded from a TOML file (typically `~/.eidgate/config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub protocol: ServiceConfig,

    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub authentication: AuthenticationConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl GatewayConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> GatewayResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> GatewayResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| GatewayError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> GatewayResult<()> {
        self.protocol
            .validate()
            .map_err(|e| GatewayError::Config(format!("[protocol] {}", e)))?;
        if self.signer.output_path.is_some() && self.signer.document_path.is_none() {
            return Err(GatewayError::Config(
                "[signer] output_path is set without document_path".into(),
            ));
        }
        if self.signer.document_path.is_some()
            && self.signer.resolved_output_path() == self.signer.document_path
        {
            return Err(GatewayError::Config(
                "[signer] output_path must differ from document_path".into(),
            ));
        }
        if self.signer.description.trim().is_empty() {
            return Err(GatewayError::Config("[signer] description must not be empty".into()));
        }
        if self.server.server_name.trim().is_empty() {
            return Err(GatewayError::Config("[server] server_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".eidgate/config.toml")
    }
}
