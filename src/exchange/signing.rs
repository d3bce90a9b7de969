//! Wallet signing for CLOB authentication.

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as _;
use tracing::debug;

use crate::error::ExchangeError;

/// Local wallet used to sign orders and auth headers.
#[derive(Debug, Clone)]
pub struct Signer {
    inner: PrivateKeySigner,
    signature_type: u8,
}

impl Signer {
    /// Build a signer from a hex private key, with or without `0x`.
    ///
    /// Signature types: 0 = EOA, 1 = Magic.link proxy, 2 = Gnosis Safe.
    pub fn from_private_key(private_key: &str, signature_type: u8) -> Result<Self, ExchangeError> {
        let key = private_key.strip_prefix("0x").unwrap_or(private_key);
        let bytes = hex::decode(key)
            .map_err(|e| ExchangeError::Rejected(format!("invalid private key hex: {}", e)))?;

        if bytes.len() != 32 {
            return Err(ExchangeError::Rejected(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes);

        let inner = PrivateKeySigner::from_bytes(&key_bytes.into())
            .map_err(|e| ExchangeError::Rejected(format!("failed to create signer: {}", e)))?;

        Ok(Self {
            inner,
            signature_type,
        })
    }

    /// Checksummed wallet address.
    pub fn address(&self) -> String {
        format!("{:?}", self.inner.address())
    }

    /// Signature type sent with orders.
    pub fn signature_type(&self) -> u8 {
        self.signature_type
    }

    /// Sign `message`, returning a `0x`-prefixed hex signature.
    pub async fn sign(&self, message: &[u8]) -> Result<String, ExchangeError> {
        let signature = self
            .inner
            .sign_message(message)
            .await
            .map_err(|e| ExchangeError::Rejected(format!("failed to sign message: {}", e)))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    /// CLOB authentication headers for one request.
    pub async fn auth_headers(&self) -> Result<Vec<(String, String)>, ExchangeError> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = self
            .sign(format!("polymarket:{}", timestamp).as_bytes())
            .await?;
        let address = self.address();

        debug!(address = %address, "Generated auth headers");

        Ok(vec![
            ("POLY_ADDRESS".to_string(), address),
            ("POLY_SIGNATURE".to_string(), signature),
            ("POLY_TIMESTAMP".to_string(), timestamp),
            ("POLY_NONCE".to_string(), "0".to_string()),
        ])
    }
}
