//! Key transparency service client
//!
//! The service exposes two RPCs: `Audit` returns a page of updates starting
//! at a given log index, and `SetAuditorHead` accepts a countersigned tree
//! head. Messages are bincode frames behind a u32 big-endian length prefix.
//!
//! Wire types carry variable-length byte fields; they are validated into the
//! fixed-size core types at the client boundary so the rest of the auditor
//! never sees a mis-sized value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use ktwitness_core::{AuditorProof, AuditorTreeHead, AuditorUpdate, Signature};

use crate::error::{Error, Result};

/// Upper bound on the `limit` parameter of an `Audit` request.
pub const MAX_BATCH_SIZE: u64 = 1000;

/// Largest frame the client will accept from the service.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One decoded page of the update stream.
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub updates: Vec<AuditorUpdate>,
    /// Whether more updates are available past this page.
    pub more: bool,
}

/// Client half of the auditor protocol.
#[async_trait]
pub trait KeyTransparencyClient: Send + Sync {
    /// Fetch up to `limit` updates starting at log index `start`.
    async fn audit(&self, start: u64, limit: u64) -> Result<AuditPage>;

    /// Deliver a signed tree head to the service.
    async fn set_auditor_head(&self, tree_head: AuditorTreeHead) -> Result<()>;
}

#[async_trait]
impl<T: KeyTransparencyClient + ?Sized> KeyTransparencyClient for std::sync::Arc<T> {
    async fn audit(&self, start: u64, limit: u64) -> Result<AuditPage> {
        (**self).audit(start, limit).await
    }

    async fn set_auditor_head(&self, tree_head: AuditorTreeHead) -> Result<()> {
        (**self).set_auditor_head(tree_head).await
    }
}

// Wire messages

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub start: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResponse {
    pub updates: Vec<WireAuditorUpdate>,
    pub more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAuditorUpdate {
    pub real: bool,
    pub index: Vec<u8>,
    pub seed: Vec<u8>,
    pub commitment: Vec<u8>,
    pub proof: Option<WireProof>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireProof {
    NewTree,
    DifferentKey {
        copath: Vec<Vec<u8>>,
        old_seed: Vec<u8>,
    },
    SameKey {
        copath: Vec<Vec<u8>>,
        counter: u32,
        position: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTreeHead {
    pub tree_size: u64,
    pub timestamp_ms: i64,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Audit(AuditRequest),
    SetAuditorHead(WireTreeHead),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Audit(AuditResponse),
    SetAuditorHead,
}

impl From<AuditorTreeHead> for WireTreeHead {
    fn from(tree_head: AuditorTreeHead) -> Self {
        Self {
            tree_size: tree_head.tree_size,
            timestamp_ms: tree_head.timestamp_ms,
            signature: tree_head.signature.as_bytes().to_vec(),
        }
    }
}

impl TryFrom<WireTreeHead> for AuditorTreeHead {
    type Error = Error;

    fn try_from(wire: WireTreeHead) -> Result<Self> {
        Ok(Self {
            tree_size: wire.tree_size,
            timestamp_ms: wire.timestamp_ms,
            signature: Signature::try_from_slice(&wire.signature)
                .map_err(|_| Error::Decode("tree head signature must be 64 bytes".into()))?,
        })
    }
}

impl TryFrom<WireAuditorUpdate> for AuditorUpdate {
    type Error = Error;

    fn try_from(wire: WireAuditorUpdate) -> Result<Self> {
        let proof = match wire.proof {
            None => return Err(Error::Decode("update is missing a proof".into())),
            Some(WireProof::NewTree) => AuditorProof::NewTree,
            Some(WireProof::DifferentKey { copath, old_seed }) => AuditorProof::DifferentKey {
                old_seed: fixed(&old_seed, "old stand-in seed")?,
                copath: fixed_copath(copath)?,
            },
            Some(WireProof::SameKey {
                copath,
                counter,
                position,
            }) => AuditorProof::SameKey {
                counter,
                first_log_position: position,
                copath: fixed_copath(copath)?,
            },
        };

        Ok(Self {
            real: wire.real,
            commitment_index: fixed(&wire.index, "commitment index")?,
            stand_in_seed: fixed(&wire.seed, "stand-in seed")?,
            commitment: fixed(&wire.commitment, "commitment")?,
            proof,
        })
    }
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        Error::Decode(format!("{what} must be {N} bytes, got {}", bytes.len()))
    })
}

fn fixed_copath(copath: Vec<Vec<u8>>) -> Result<Vec<[u8; 32]>> {
    copath
        .iter()
        .map(|entry| fixed(entry, "copath entry"))
        .collect()
}

/// A client speaking the framed protocol over TCP.
///
/// Connects lazily and drops the connection on any error so the next request
/// starts clean.
pub struct TcpClient {
    addr: String,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: Mutex::new(None),
        }
    }

    async fn request(&self, request: &Request) -> Result<Response> {
        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
                Error::transport(format!("connect to {} failed: {e}", self.addr))
            })?;
            debug!(addr = %self.addr, "connected to key transparency service");
            *guard = Some(stream);
        }

        let Some(stream) = guard.as_mut() else {
            return Err(Error::transport("connection unavailable"));
        };

        let result = Self::exchange(stream, request).await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    async fn exchange(stream: &mut TcpStream, request: &Request) -> Result<Response> {
        let serialized = bincode::serialize(request)
            .map_err(|e| Error::transport(format!("request serialization failed: {e}")))?;

        let length = (serialized.len() as u32).to_be_bytes();
        stream
            .write_all(&length)
            .await
            .map_err(|e| Error::transport(format!("write length failed: {e}")))?;
        stream
            .write_all(&serialized)
            .await
            .map_err(|e| Error::transport(format!("write request failed: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::transport(format!("flush failed: {e}")))?;

        let mut length_bytes = [0u8; 4];
        stream
            .read_exact(&mut length_bytes)
            .await
            .map_err(|e| Error::transport(format!("read length failed: {e}")))?;

        let length = u32::from_be_bytes(length_bytes) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(Error::transport(format!(
                "response too large: {length} > {MAX_FRAME_SIZE}"
            )));
        }

        let mut buffer = vec![0u8; length];
        stream
            .read_exact(&mut buffer)
            .await
            .map_err(|e| Error::transport(format!("read response failed: {e}")))?;

        bincode::deserialize(&buffer)
            .map_err(|e| Error::transport(format!("response deserialization failed: {e}")))
    }
}

#[async_trait]
impl KeyTransparencyClient for TcpClient {
    async fn audit(&self, start: u64, limit: u64) -> Result<AuditPage> {
        let response = self
            .request(&Request::Audit(AuditRequest { start, limit }))
            .await?;

        let Response::Audit(page) = response else {
            return Err(Error::transport("unexpected response to Audit request"));
        };

        let updates = page
            .updates
            .into_iter()
            .map(AuditorUpdate::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(AuditPage {
            updates,
            more: page.more,
        })
    }

    async fn set_auditor_head(&self, tree_head: AuditorTreeHead) -> Result<()> {
        let response = self
            .request(&Request::SetAuditorHead(tree_head.into()))
            .await?;

        match response {
            Response::SetAuditorHead => Ok(()),
            Response::Audit(_) => Err(Error::transport(
                "unexpected response to SetAuditorHead request",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn wire_update(proof: Option<WireProof>) -> WireAuditorUpdate {
        WireAuditorUpdate {
            real: true,
            index: vec![0xAA; 32],
            seed: vec![0xBB; 16],
            commitment: vec![0xCC; 32],
            proof,
        }
    }

    #[test]
    fn update_conversion_validates_lengths() {
        let decoded = AuditorUpdate::try_from(wire_update(Some(WireProof::NewTree))).unwrap();
        assert_eq!(decoded.commitment_index, [0xAA; 32]);
        assert_eq!(decoded.stand_in_seed, [0xBB; 16]);
        assert!(matches!(decoded.proof, AuditorProof::NewTree));

        let mut short_index = wire_update(Some(WireProof::NewTree));
        short_index.index = vec![0xAA; 31];
        assert!(matches!(
            AuditorUpdate::try_from(short_index),
            Err(Error::Decode(_))
        ));

        let bad_copath = wire_update(Some(WireProof::DifferentKey {
            copath: vec![vec![0x01; 33]],
            old_seed: vec![0x02; 16],
        }));
        assert!(matches!(
            AuditorUpdate::try_from(bad_copath),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn missing_proof_is_a_decode_error() {
        let err = AuditorUpdate::try_from(wire_update(None)).unwrap_err();
        assert!(err.to_string().contains("missing a proof"));
    }

    async fn read_frame(stream: &mut TcpStream) -> Request {
        let mut length_bytes = [0u8; 4];
        stream.read_exact(&mut length_bytes).await.unwrap();
        let mut buffer = vec![0u8; u32::from_be_bytes(length_bytes) as usize];
        stream.read_exact(&mut buffer).await.unwrap();
        bincode::deserialize(&buffer).unwrap()
    }

    async fn write_frame(stream: &mut TcpStream, response: &Response) {
        let serialized = bincode::serialize(response).unwrap();
        stream
            .write_all(&(serialized.len() as u32).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&serialized).await.unwrap();
    }

    #[tokio::test]
    async fn audit_roundtrips_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let request = read_frame(&mut stream).await;
            let Request::Audit(audit) = request else {
                panic!("expected an Audit request");
            };
            assert_eq!(audit.start, 5);
            assert_eq!(audit.limit, 100);

            let response = Response::Audit(AuditResponse {
                updates: vec![wire_update(Some(WireProof::NewTree))],
                more: false,
            });
            write_frame(&mut stream, &response).await;

            let request = read_frame(&mut stream).await;
            let Request::SetAuditorHead(head) = request else {
                panic!("expected a SetAuditorHead request");
            };
            assert_eq!(head.tree_size, 1);
            assert_eq!(head.signature.len(), 64);
            write_frame(&mut stream, &Response::SetAuditorHead).await;
        });

        let client = TcpClient::new(addr.to_string());
        let page = client.audit(5, 100).await.unwrap();
        assert_eq!(page.updates.len(), 1);
        assert!(!page.more);

        client
            .set_auditor_head(AuditorTreeHead {
                tree_size: 1,
                timestamp_ms: 1_000,
                signature: Signature::from_bytes([0x55; 64]),
            })
            .await
            .unwrap();

        server.await.unwrap();
    }
}
