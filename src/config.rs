use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::client::ClientIdentity;
use crate::crypto::{self, Certificate, rsa::RsaPrivateKey};
use crate::dsig::SigningIdentity;
use crate::message::{Merchant, Variant};
use crate::transport::{HttpTransport, TransportError};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub acquirer: AcquirerConfig,
    pub merchant: MerchantConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquirerConfig {
    pub variant: Variant,
    pub endpoint: String,
    /// PEM file with the certificate the acquirer signs responses with
    pub certificate: PathBuf,
    pub timeout_secs: u64,
    /// Present the merchant certificate as TLS client certificate
    pub tls_client_auth: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantConfig {
    pub id: String,
    pub sub_id: String,
    pub return_url: String,
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    #[serde(default)]
    pub key_passphrase: Option<SecretString>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key material: {0}")]
    Crypto(#[from] crypto::Error),

    #[error("Failed to set up transport: {0}")]
    Transport(#[from] TransportError),
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("acquirer.variant", "ideal")?
            .set_default("acquirer.timeout_secs", 30)?
            .set_default("acquirer.tls_client_auth", false)?
            .set_default("merchant.sub_id", "0")?
            .add_source(File::with_name("config/settings").required(false));

        // An explicit map replaces the process environment so tests stay isolated
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // e.g. IDX_MERCHANT__ID or IDX_ACQUIRER__ENDPOINT
            builder = builder.add_source(
                Environment::with_prefix("IDX")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }

    /// Read the merchant key pair and the pinned acquirer certificate.
    pub fn client_identity(&self) -> Result<ClientIdentity, LoadError> {
        let merchant = &self.merchant;
        let key_pem = read(&merchant.private_key)?;
        let private_key = match &merchant.key_passphrase {
            Some(passphrase) => RsaPrivateKey::from_pem_with_passphrase(
                &key_pem,
                passphrase.expose_secret().as_bytes(),
            )?,
            None => RsaPrivateKey::from_pem(&key_pem)?,
        };

        Ok(ClientIdentity {
            merchant: Merchant {
                id: merchant.id.clone(),
                sub_id: merchant.sub_id.clone(),
                return_url: merchant.return_url.clone(),
            },
            signing: SigningIdentity {
                private_key,
                certificate: Certificate::from_pem(read(&merchant.certificate)?)?,
            },
            acquirer_certificate: Certificate::from_pem(read(&self.acquirer.certificate)?)?,
        })
    }

    /// HTTP transport towards the configured acquirer endpoint.
    pub fn transport(&self, identity: &ClientIdentity) -> Result<HttpTransport, LoadError> {
        let timeout = Duration::from_secs(self.acquirer.timeout_secs);
        let endpoint = self.acquirer.endpoint.clone();

        if !self.acquirer.tls_client_auth {
            return Ok(HttpTransport::new(endpoint, timeout)?);
        }

        let mut pem = identity.signing.certificate.to_pem()?;
        pem.extend_from_slice(identity.signing.private_key.to_pem()?.as_bytes());
        Ok(HttpTransport::with_client_identity(endpoint, timeout, &pem)?)
    }
}

fn read(path: &PathBuf) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })
}
