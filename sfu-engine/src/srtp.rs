//! The boundary to SRTP/SRTCP cryptography. The ciphers themselves live
//! outside the engine behind [`PacketTransformer`]; this module carries the
//! profile table, the DTLS keying-material layout, and the swappable slots
//! the pipeline nodes read transformers from.

use bytes::BytesMut;
use shared::error::{Error, Result};
use std::sync::{Arc, Mutex};

/// Label handed to the DTLS exporter, RFC 5764 section 4.2.
pub const SRTP_EXPORTER_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// A unidirectional SRTP or SRTCP transform. `transform` protects,
/// `reverse_transform` authenticates and decrypts; both return `None` to
/// drop (auth failure, replay). One transformer is only ever driven from
/// one direction's thread.
pub trait PacketTransformer: Send {
    fn transform(&mut self, buf: BytesMut) -> Option<BytesMut>;
    fn reverse_transform(&mut self, buf: BytesMut) -> Option<BytesMut>;
}

/// Passthrough transformer, for loopback wiring and tests.
pub struct IdentityTransformer;

impl PacketTransformer for IdentityTransformer {
    fn transform(&mut self, buf: BytesMut) -> Option<BytesMut> {
        Some(buf)
    }

    fn reverse_transform(&mut self, buf: BytesMut) -> Option<BytesMut> {
        Some(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SrtpProfile {
    Aes128CmHmacSha1_80,
    Aes128CmHmacSha1_32,
    AeadAes128Gcm,
    AeadAes256Gcm,
}

impl SrtpProfile {
    pub fn key_len(&self) -> usize {
        match self {
            Self::Aes128CmHmacSha1_80 | Self::Aes128CmHmacSha1_32 | Self::AeadAes128Gcm => 16,
            Self::AeadAes256Gcm => 32,
        }
    }

    pub fn salt_len(&self) -> usize {
        match self {
            Self::Aes128CmHmacSha1_80 | Self::Aes128CmHmacSha1_32 => 14,
            Self::AeadAes128Gcm | Self::AeadAes256Gcm => 12,
        }
    }

    /// Bytes of exporter output this profile consumes.
    pub fn keying_material_len(&self) -> usize {
        2 * (self.key_len() + self.salt_len())
    }
}

/// Which side of the DTLS handshake this endpoint played; decides which
/// half of the keying material is ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    Client,
    Server,
}

/// Supplies DTLS exporter output. Implemented by the hosting stack's TLS
/// context; sits here so the engine has no dependency on any particular
/// DTLS implementation.
pub trait KeyingMaterialExporter {
    fn export_keying_material(&self, label: &str, length: usize) -> Result<Vec<u8>>;
}

/// Key and salt halves split out of the exporter output, RFC 5764
/// section 4.2: client key, server key, client salt, server salt.
#[derive(Clone)]
pub struct SrtpKeys {
    pub local_key: Vec<u8>,
    pub local_salt: Vec<u8>,
    pub remote_key: Vec<u8>,
    pub remote_salt: Vec<u8>,
}

impl SrtpKeys {
    pub fn derive(
        profile: SrtpProfile,
        role: DtlsRole,
        exporter: &dyn KeyingMaterialExporter,
    ) -> Result<Self> {
        let material =
            exporter.export_keying_material(SRTP_EXPORTER_LABEL, profile.keying_material_len())?;
        Self::split(profile, role, &material)
    }

    pub fn split(profile: SrtpProfile, role: DtlsRole, material: &[u8]) -> Result<Self> {
        let key_len = profile.key_len();
        let salt_len = profile.salt_len();
        if material.len() < profile.keying_material_len() {
            return Err(Error::ErrKeyingMaterialTooShort);
        }

        let client_key = material[..key_len].to_vec();
        let server_key = material[key_len..2 * key_len].to_vec();
        let salts = &material[2 * key_len..];
        let client_salt = salts[..salt_len].to_vec();
        let server_salt = salts[salt_len..2 * salt_len].to_vec();

        Ok(match role {
            DtlsRole::Client => Self {
                local_key: client_key,
                local_salt: client_salt,
                remote_key: server_key,
                remote_salt: server_salt,
            },
            DtlsRole::Server => Self {
                local_key: server_key,
                local_salt: server_salt,
                remote_key: client_key,
                remote_salt: client_salt,
            },
        })
    }
}

/// The four transformer instances one peer needs: each protocol in each
/// direction, with no state shared between them.
pub struct SrtpTransformers {
    pub rtp_decrypt: Box<dyn PacketTransformer>,
    pub rtcp_decrypt: Box<dyn PacketTransformer>,
    pub rtp_encrypt: Box<dyn PacketTransformer>,
    pub rtcp_encrypt: Box<dyn PacketTransformer>,
}

impl SrtpTransformers {
    /// All-identity set, for loopback wiring and tests.
    pub fn identity() -> Self {
        Self {
            rtp_decrypt: Box::new(IdentityTransformer),
            rtcp_decrypt: Box::new(IdentityTransformer),
            rtp_encrypt: Box::new(IdentityTransformer),
            rtcp_encrypt: Box::new(IdentityTransformer),
        }
    }
}

/// Builds the transformer set for a profile and derived keys. Implemented
/// by the hosting SFU's crypto layer.
pub trait SrtpTransformerFactory: Send + Sync {
    fn initialize(&self, profile: SrtpProfile, keys: &SrtpKeys) -> Result<SrtpTransformers>;
}

/// Outcome of driving a transformer slot.
pub(crate) enum TransformOutcome {
    Transformed(BytesMut),
    /// Expected transiently while the DTLS handshake is still running.
    NotInstalled,
    /// Authentication or transform failure; the packet is gone.
    Failed,
}

/// A transformer handle written by the control path and read by the packet
/// path. Swapping the boxed transformer under a mutex keeps installation
/// atomic with respect to in-flight packets.
#[derive(Clone, Default)]
pub(crate) struct TransformerSlot(Arc<Mutex<Option<Box<dyn PacketTransformer>>>>);

impl TransformerSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn install(&self, transformer: Box<dyn PacketTransformer>) {
        *self.0.lock().unwrap() = Some(transformer);
    }

    pub(crate) fn clear(&self) {
        *self.0.lock().unwrap() = None;
    }

    pub(crate) fn forward(&self, buf: BytesMut) -> TransformOutcome {
        match self.0.lock().unwrap().as_mut() {
            Some(t) => match t.transform(buf) {
                Some(out) => TransformOutcome::Transformed(out),
                None => TransformOutcome::Failed,
            },
            None => TransformOutcome::NotInstalled,
        }
    }

    pub(crate) fn reverse(&self, buf: BytesMut) -> TransformOutcome {
        match self.0.lock().unwrap().as_mut() {
            Some(t) => match t.reverse_transform(buf) {
                Some(out) => TransformOutcome::Transformed(out),
                None => TransformOutcome::Failed,
            },
            None => TransformOutcome::NotInstalled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keying_material_split_roles() {
        let profile = SrtpProfile::Aes128CmHmacSha1_80;
        let material: Vec<u8> = (0..profile.keying_material_len() as u8).collect();

        let client = SrtpKeys::split(profile, DtlsRole::Client, &material).unwrap();
        let server = SrtpKeys::split(profile, DtlsRole::Server, &material).unwrap();

        assert_eq!(client.local_key, server.remote_key);
        assert_eq!(client.remote_key, server.local_key);
        assert_eq!(client.local_salt, server.remote_salt);
        assert_eq!(client.local_key.len(), 16);
        assert_eq!(client.local_salt.len(), 14);
        assert_eq!(client.local_key, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_keying_material_too_short() {
        let profile = SrtpProfile::AeadAes256Gcm;
        let material = vec![0u8; 10];
        assert_eq!(
            SrtpKeys::split(profile, DtlsRole::Client, &material).err(),
            Some(Error::ErrKeyingMaterialTooShort)
        );
    }

    #[test]
    fn test_slot_states() {
        let slot = TransformerSlot::new();
        assert!(matches!(
            slot.reverse(BytesMut::new()),
            TransformOutcome::NotInstalled
        ));

        slot.install(Box::new(IdentityTransformer));
        assert!(matches!(
            slot.reverse(BytesMut::from(&b"x"[..])),
            TransformOutcome::Transformed(_)
        ));

        struct Rejecting;
        impl PacketTransformer for Rejecting {
            fn transform(&mut self, _: BytesMut) -> Option<BytesMut> {
                None
            }
            fn reverse_transform(&mut self, _: BytesMut) -> Option<BytesMut> {
                None
            }
        }
        slot.install(Box::new(Rejecting));
        assert!(matches!(
            slot.forward(BytesMut::new()),
            TransformOutcome::Failed
        ));

        slot.clear();
        assert!(matches!(
            slot.forward(BytesMut::new()),
            TransformOutcome::NotInstalled
        ));
    }
}
