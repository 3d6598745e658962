//! TCP links between two endpoints.
//!
//! The advertiser runs an accept loop; a requester dials and sends `Hello`.
//! The advertiser answers `Accept` or `Reject` once its session decides.
//! After that either side may stream payloads over the same link.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use handoff_core::{
    ConnectionInfo, ConnectionStatus, Endpoint, IncomingPayload, PayloadTransferUpdate,
    TransferStatus, TransportError, TransportEvent, TransportEvents,
};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use storage::{IncomingFile, PayloadFile, Storage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::frame::{read_frame, write_frame, Frame, FrameError};

/// How long an accepted socket may stay silent before sending `Hello`.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a dial may wait for the peer's listener.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Writer = Arc<AsyncMutex<OwnedWriteHalf>>;

struct Link {
    writer: Writer,
    incoming: bool,
    connected: bool,
    /// Set when this side tears the link down, so the reader stays quiet.
    closed: Arc<AtomicBool>,
    events: TransportEvents,
}

/// A payload being written to local storage.
struct Receiving {
    payload_id: i64,
    total: u64,
    file: IncomingFile,
    hasher: Sha256,
}

/// Owns every live link of the local endpoint.
pub(crate) struct Hub {
    local_id: String,
    storage: Arc<dyn Storage>,
    chunk_size: usize,
    links: Mutex<HashMap<String, Link>>,
}

impl Hub {
    pub(crate) fn new(local_id: String, storage: Arc<dyn Storage>, chunk_size: usize) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            storage,
            chunk_size: chunk_size.max(1),
            links: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn local_id(&self) -> &str {
        &self.local_id
    }

    fn links(&self) -> MutexGuard<'_, HashMap<String, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn has_link(&self) -> bool {
        !self.links().is_empty()
    }

    /// Accept incoming links on `listener` until the returned task is aborted.
    pub(crate) fn serve(
        self: &Arc<Self>,
        listener: TcpListener,
        service_id: String,
        events: TransportEvents,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("Inbound link from {}", peer);
                        tokio::spawn(hub.clone().handle_incoming(
                            stream,
                            service_id.clone(),
                            events.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        })
    }

    async fn handle_incoming(
        self: Arc<Self>,
        stream: TcpStream,
        service_id: String,
        events: TransportEvents,
    ) {
        let (mut reader, mut writer) = stream.into_split();

        let hello = match tokio::time::timeout(HELLO_TIMEOUT, read_frame(&mut reader)).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                debug!("Bad hello: {}", e);
                return;
            }
            Err(_) => {
                debug!("Peer never sent hello");
                return;
            }
        };

        let (endpoint_id, name, peer_service) = match hello {
            Frame::Hello {
                endpoint_id,
                name,
                service_id,
            } => (endpoint_id, name, service_id),
            other => {
                debug!("Expected hello, got {:?}", other);
                return;
            }
        };

        if peer_service != service_id {
            debug!("Ignoring {} from service {}", endpoint_id, peer_service);
            return;
        }

        if self.has_link() {
            debug!("Link busy, turning away {}", endpoint_id);
            if let Err(e) = write_frame(&mut writer, &Frame::Reject).await {
                debug!("Reject to {} failed: {}", endpoint_id, e);
            }
            return;
        }

        let closed = Arc::new(AtomicBool::new(false));
        self.links().insert(
            endpoint_id.clone(),
            Link {
                writer: Arc::new(AsyncMutex::new(writer)),
                incoming: true,
                connected: false,
                closed: closed.clone(),
                events: events.clone(),
            },
        );

        info!("Connection requested by {} ({})", name, endpoint_id);
        events.emit(TransportEvent::ConnectionInitiated {
            endpoint: Endpoint::new(endpoint_id.clone(), name.clone()),
            info: ConnectionInfo {
                endpoint_name: name,
                is_incoming: true,
            },
        });

        self.read_loop(endpoint_id, reader, events, closed, true).await;
    }

    /// Open a link to `endpoint` at `addr` and request a connection.
    pub(crate) async fn dial(
        self: &Arc<Self>,
        addr: SocketAddr,
        endpoint: Endpoint,
        local_name: &str,
        service_id: &str,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        if self.has_link() {
            return Err(TransportError::LinkBusy);
        }

        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(connected) => {
                connected.map_err(|e| TransportError::Failed(format!("connect to {}: {}", addr, e)))?
            }
            Err(_) => return Err(TransportError::Failed(format!("connect to {}: timed out", addr))),
        };
        stream.set_nodelay(true).ok();
        let (reader, mut writer) = stream.into_split();

        let hello = Frame::Hello {
            endpoint_id: self.local_id.clone(),
            name: local_name.to_string(),
            service_id: service_id.to_string(),
        };
        write_frame(&mut writer, &hello)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        {
            let mut links = self.links();
            if !links.is_empty() {
                return Err(TransportError::LinkBusy);
            }
            links.insert(
                endpoint.id.clone(),
                Link {
                    writer: Arc::new(AsyncMutex::new(writer)),
                    incoming: false,
                    connected: false,
                    closed: closed.clone(),
                    events: events.clone(),
                },
            );
        }

        debug!("Requested connection to {} at {}", endpoint, addr);
        tokio::spawn(self.clone().read_loop(endpoint.id, reader, events, closed, false));
        Ok(())
    }

    /// Answer a pending incoming request with `Accept`.
    pub(crate) async fn accept(
        &self,
        endpoint_id: &str,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        let writer = {
            let links = self.links();
            let link = links
                .get(endpoint_id)
                .ok_or_else(|| TransportError::UnknownEndpoint(endpoint_id.to_string()))?;
            if !link.incoming || link.connected {
                return Err(TransportError::Failed(format!(
                    "no pending request from {}",
                    endpoint_id
                )));
            }
            link.writer.clone()
        };

        write_frame(&mut *writer.lock().await, &Frame::Accept)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        if let Some(link) = self.links().get_mut(endpoint_id) {
            link.connected = true;
        }
        events.emit(TransportEvent::ConnectionResult {
            endpoint_id: endpoint_id.to_string(),
            status: ConnectionStatus::Ok,
        });
        Ok(())
    }

    /// Answer a pending incoming request with `Reject` and drop the link.
    pub(crate) async fn reject(&self, endpoint_id: &str) -> Result<(), TransportError> {
        let link = {
            let mut links = self.links();
            let pending = match links.get(endpoint_id) {
                Some(link) => link.incoming && !link.connected,
                None => return Err(TransportError::UnknownEndpoint(endpoint_id.to_string())),
            };
            if !pending {
                return Err(TransportError::Failed(format!(
                    "no pending request from {}",
                    endpoint_id
                )));
            }
            links.remove(endpoint_id)
        };

        if let Some(link) = link {
            link.closed.store(true, Ordering::SeqCst);
            let mut writer = link.writer.lock().await;
            if let Err(e) = write_frame(&mut *writer, &Frame::Reject).await {
                debug!("Reject to {} failed: {}", endpoint_id, e);
            }
            writer.shutdown().await.ok();
        }
        Ok(())
    }

    /// Start streaming `payload` to a connected endpoint. Returns at once with
    /// the payload id; progress arrives as transfer updates.
    pub(crate) fn send(&self, endpoint_id: &str, payload: PayloadFile) -> Result<i64, TransportError> {
        let (writer, events) = {
            let links = self.links();
            let link = links
                .get(endpoint_id)
                .ok_or_else(|| TransportError::UnknownEndpoint(endpoint_id.to_string()))?;
            if !link.connected {
                return Err(TransportError::Failed(format!(
                    "not connected to {}",
                    endpoint_id
                )));
            }
            (link.writer.clone(), link.events.clone())
        };

        let payload_id = next_payload_id();
        let endpoint_id = endpoint_id.to_string();
        let chunk_size = self.chunk_size;
        tokio::spawn(async move {
            let total = payload.size;
            let name = payload.name.clone();
            let result = {
                let mut writer = writer.lock().await;
                stream_payload(&mut writer, payload_id, payload, chunk_size, |sent| {
                    events.emit(transfer_update(
                        &endpoint_id,
                        payload_id,
                        sent,
                        total,
                        TransferStatus::InProgress,
                    ));
                })
                .await
            };

            let (sent, status) = match result {
                Ok(sent) => {
                    info!("Sent {} ({} bytes) to {}", name, sent, endpoint_id);
                    (sent, TransferStatus::Success)
                }
                Err(e) => {
                    warn!("Sending {} to {} failed: {}", name, endpoint_id, e);
                    (0, TransferStatus::Failure)
                }
            };
            events.emit(transfer_update(&endpoint_id, payload_id, sent, total.max(sent), status));
        });

        Ok(payload_id)
    }

    /// Tear down the link to `endpoint_id`. No event is reported locally.
    pub(crate) async fn disconnect(&self, endpoint_id: &str) {
        let Some(link) = self.links().remove(endpoint_id) else {
            return;
        };
        link.closed.store(true, Ordering::SeqCst);
        if let Err(e) = link.writer.lock().await.shutdown().await {
            debug!("Shutdown of link to {}: {}", endpoint_id, e);
        }
        debug!("Disconnected from {}", endpoint_id);
    }

    /// Drop every link, e.g. when the transport shuts down.
    pub(crate) async fn disconnect_all(&self) {
        let ids: Vec<String> = self.links().keys().cloned().collect();
        for id in ids {
            self.disconnect(&id).await;
        }
    }

    /// Remove the link for `endpoint_id` if it is still the one flagged by
    /// `closed`; a newer link under the same id is left alone.
    fn forget(&self, endpoint_id: &str, closed: &Arc<AtomicBool>) {
        let mut links = self.links();
        if links
            .get(endpoint_id)
            .is_some_and(|link| Arc::ptr_eq(&link.closed, closed))
        {
            links.remove(endpoint_id);
        }
    }

    fn mark_connected(&self, endpoint_id: &str) {
        if let Some(link) = self.links().get_mut(endpoint_id) {
            link.connected = true;
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        endpoint_id: String,
        mut reader: OwnedReadHalf,
        events: TransportEvents,
        closed: Arc<AtomicBool>,
        incoming: bool,
    ) {
        // The advertiser answers locally; the requester waits for the answer.
        let mut answered = incoming;
        let mut receiving: Option<Receiving> = None;

        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    if !closed.load(Ordering::SeqCst) {
                        debug!("Link to {} failed: {}", endpoint_id, e);
                    }
                    break;
                }
            };

            match frame {
                Frame::Accept if !answered => {
                    answered = true;
                    self.mark_connected(&endpoint_id);
                    events.emit(TransportEvent::ConnectionResult {
                        endpoint_id: endpoint_id.clone(),
                        status: ConnectionStatus::Ok,
                    });
                }
                Frame::Reject if !answered => {
                    closed.store(true, Ordering::SeqCst);
                    events.emit(TransportEvent::ConnectionResult {
                        endpoint_id: endpoint_id.clone(),
                        status: ConnectionStatus::Rejected,
                    });
                    break;
                }
                Frame::PayloadHeader {
                    payload_id,
                    name,
                    size,
                } => match self.storage.create_incoming(&name).await {
                    Ok(file) => {
                        events.emit(TransportEvent::PayloadReceived {
                            endpoint_id: endpoint_id.clone(),
                            payload: IncomingPayload {
                                payload_id,
                                name,
                                total_bytes: size,
                                path: file.path.clone(),
                            },
                        });
                        events.emit(transfer_update(
                            &endpoint_id,
                            payload_id,
                            0,
                            size,
                            TransferStatus::InProgress,
                        ));
                        receiving = Some(Receiving {
                            payload_id,
                            total: size,
                            file,
                            hasher: Sha256::new(),
                        });
                    }
                    Err(e) => {
                        warn!("Cannot store {} from {}: {:#}", name, endpoint_id, e);
                        events.emit(transfer_update(
                            &endpoint_id,
                            payload_id,
                            0,
                            size,
                            TransferStatus::Failure,
                        ));
                        receiving = None;
                    }
                },
                Frame::Chunk { payload_id, data } => {
                    let Some(rx) = receiving.as_mut() else {
                        continue;
                    };
                    if rx.payload_id != payload_id {
                        continue;
                    }
                    match rx.file.write_chunk(&data).await {
                        Ok(()) => {
                            rx.hasher.update(&data);
                            events.emit(transfer_update(
                                &endpoint_id,
                                payload_id,
                                rx.file.written(),
                                rx.total,
                                TransferStatus::InProgress,
                            ));
                        }
                        Err(e) => {
                            warn!("Write failed for payload {}: {:#}", payload_id, e);
                            let (written, total) = (rx.file.written(), rx.total);
                            events.emit(transfer_update(
                                &endpoint_id,
                                payload_id,
                                written,
                                total,
                                TransferStatus::Failure,
                            ));
                            receiving = None;
                        }
                    }
                }
                Frame::PayloadEnd { payload_id, sha256 } => {
                    let Some(rx) = receiving.take() else {
                        continue;
                    };
                    if rx.payload_id != payload_id {
                        receiving = Some(rx);
                        continue;
                    }
                    let update = finish_receiving(rx, &sha256).await;
                    events.emit(TransportEvent::PayloadTransferUpdate {
                        endpoint_id: endpoint_id.clone(),
                        update,
                    });
                }
                other => debug!("Unexpected frame from {}: {:?}", endpoint_id, other),
            }
        }

        self.forget(&endpoint_id, &closed);
        if closed.load(Ordering::SeqCst) {
            return;
        }

        if answered {
            info!("Link to {} closed", endpoint_id);
            events.emit(TransportEvent::Disconnected { endpoint_id });
        } else {
            events.emit(TransportEvent::ConnectionResult {
                endpoint_id,
                status: ConnectionStatus::Error {
                    message: Some("connection closed by peer".to_string()),
                },
            });
        }
    }
}

async fn finish_receiving(rx: Receiving, expected: &str) -> PayloadTransferUpdate {
    let digest = hex::encode(rx.hasher.finalize());
    let received = rx.file.written();
    let status = match rx.file.finish().await {
        Ok(path) if received == rx.total && digest == expected => {
            info!("Received {} ({} bytes)", path.display(), received);
            TransferStatus::Success
        }
        Ok(path) => {
            warn!(
                "Payload {} at {} does not match its digest ({} of {} bytes)",
                rx.payload_id,
                path.display(),
                received,
                rx.total
            );
            TransferStatus::Failure
        }
        Err(e) => {
            warn!("Finishing payload {} failed: {:#}", rx.payload_id, e);
            TransferStatus::Failure
        }
    };

    PayloadTransferUpdate {
        payload_id: rx.payload_id,
        bytes_transferred: received,
        total_bytes: rx.total,
        status,
    }
}

/// Header, chunks, then the digest trailer. Returns the bytes sent.
async fn stream_payload<F>(
    writer: &mut OwnedWriteHalf,
    payload_id: i64,
    mut payload: PayloadFile,
    chunk_size: usize,
    mut on_progress: F,
) -> Result<u64, FrameError>
where
    F: FnMut(u64) + Send,
{
    let header = Frame::PayloadHeader {
        payload_id,
        name: payload.name.clone(),
        size: payload.size,
    };
    write_frame(writer, &header).await?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size];
    let mut sent = 0u64;
    loop {
        let n = payload.file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        let chunk = Frame::Chunk {
            payload_id,
            data: buf[..n].to_vec(),
        };
        write_frame(writer, &chunk).await?;
        sent += n as u64;
        on_progress(sent);
    }

    let end = Frame::PayloadEnd {
        payload_id,
        sha256: hex::encode(hasher.finalize()),
    };
    write_frame(writer, &end).await?;
    Ok(sent)
}

fn transfer_update(
    endpoint_id: &str,
    payload_id: i64,
    bytes_transferred: u64,
    total_bytes: u64,
    status: TransferStatus,
) -> TransportEvent {
    TransportEvent::PayloadTransferUpdate {
        endpoint_id: endpoint_id.to_string(),
        update: PayloadTransferUpdate {
            payload_id,
            bytes_transferred,
            total_bytes,
            status,
        },
    }
}

/// Random positive payload id.
fn next_payload_id() -> i64 {
    (OsRng.next_u64() & i64::MAX as u64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::LocalStorage;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    const SERVICE: &str = "dev.handoff.test";

    struct Pair {
        advertiser: Arc<Hub>,
        requester: Arc<Hub>,
        adv_events: TransportEvents,
        adv_rx: UnboundedReceiver<TransportEvent>,
        req_rx: UnboundedReceiver<TransportEvent>,
        addr: SocketAddr,
        _accept: JoinHandle<()>,
    }

    async fn pair(temp: &TempDir) -> anyhow::Result<Pair> {
        let adv_store = LocalStorage::new(temp.path().join("adv"))?;
        let req_store = LocalStorage::new(temp.path().join("req"))?;
        let advertiser = Hub::new("AAAA".into(), Arc::new(adv_store), 16 * 1024);
        let requester = Hub::new("BBBB".into(), Arc::new(req_store), 16 * 1024);

        let (adv_events, adv_rx) = TransportEvents::channel();
        let (req_events, req_rx) = TransportEvents::channel();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accept = advertiser.serve(listener, SERVICE.into(), adv_events.clone());

        requester
            .dial(addr, Endpoint::new("AAAA", "Pixel: 7a"), "Galaxy: S9", SERVICE, req_events)
            .await?;

        Ok(Pair {
            advertiser,
            requester,
            adv_events,
            adv_rx,
            req_rx,
            addr,
            _accept: accept,
        })
    }

    async fn final_update(rx: &mut UnboundedReceiver<TransportEvent>) -> PayloadTransferUpdate {
        while let Some(event) = rx.recv().await {
            if let TransportEvent::PayloadTransferUpdate { update, .. } = event {
                if update.status != TransferStatus::InProgress {
                    return update;
                }
            }
        }
        panic!("event channel closed before the transfer finished");
    }

    #[tokio::test]
    async fn test_negotiate_and_stream_file() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut p = pair(&temp).await?;

        match p.adv_rx.recv().await {
            Some(TransportEvent::ConnectionInitiated { endpoint, info }) => {
                assert_eq!(endpoint.id, "BBBB");
                assert_eq!(info.endpoint_name, "Galaxy: S9");
                assert!(info.is_incoming);
            }
            other => panic!("expected ConnectionInitiated, got {:?}", other),
        }

        p.advertiser.accept("BBBB", p.adv_events.clone()).await?;
        let ok = |id: &str| TransportEvent::ConnectionResult {
            endpoint_id: id.into(),
            status: ConnectionStatus::Ok,
        };
        assert_eq!(p.adv_rx.recv().await, Some(ok("BBBB")));
        assert_eq!(p.req_rx.recv().await, Some(ok("AAAA")));

        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let src = temp.path().join("clip.mp4");
        std::fs::write(&src, &data)?;
        let sender_store = LocalStorage::new(temp.path().join("out"))?;
        let payload = sender_store.open_payload(&src).await?;

        let payload_id = p.advertiser.send("BBBB", payload)?;
        assert!(payload_id >= 0);

        let sent = final_update(&mut p.adv_rx).await;
        assert_eq!(sent.status, TransferStatus::Success);
        assert_eq!(sent.bytes_transferred, 200_000);

        let path = match p.req_rx.recv().await {
            Some(TransportEvent::PayloadReceived { endpoint_id, payload }) => {
                assert_eq!(endpoint_id, "AAAA");
                assert_eq!(payload.payload_id, payload_id);
                assert_eq!(payload.name, "clip.mp4");
                assert_eq!(payload.total_bytes, 200_000);
                payload.path
            }
            other => panic!("expected PayloadReceived, got {:?}", other),
        };
        let received = final_update(&mut p.req_rx).await;
        assert_eq!(received.status, TransferStatus::Success);
        assert_eq!(received.bytes_transferred, 200_000);
        assert_eq!(std::fs::read(&path)?, data);

        p.advertiser.disconnect("BBBB").await;
        assert_eq!(
            p.req_rx.recv().await,
            Some(TransportEvent::Disconnected {
                endpoint_id: "AAAA".into()
            })
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(p.adv_rx.try_recv().is_err());
        assert!(!p.advertiser.has_link());
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_reaches_requester_only() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut p = pair(&temp).await?;
        assert!(matches!(
            p.adv_rx.recv().await,
            Some(TransportEvent::ConnectionInitiated { .. })
        ));

        p.advertiser.reject("BBBB").await?;

        assert_eq!(
            p.req_rx.recv().await,
            Some(TransportEvent::ConnectionResult {
                endpoint_id: "AAAA".into(),
                status: ConnectionStatus::Rejected,
            })
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(p.adv_rx.try_recv().is_err());
        assert!(!p.advertiser.has_link());
        assert!(!p.requester.has_link());
        Ok(())
    }

    #[tokio::test]
    async fn test_one_link_at_a_time() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let p = pair(&temp).await?;
        let (events, _rx) = TransportEvents::channel();

        let again = p
            .requester
            .dial(p.addr, Endpoint::new("AAAA", "Pixel: 7a"), "Galaxy: S9", SERVICE, events)
            .await;

        assert_eq!(again, Err(TransportError::LinkBusy));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_no_link() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = LocalStorage::new(temp.path().join("req"))?;
        let requester = Hub::new("BBBB".into(), Arc::new(store), 16 * 1024);
        let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
        let (events, _rx) = TransportEvents::channel();

        let dialed = tokio::time::timeout(
            CONNECT_TIMEOUT + Duration::from_secs(1),
            requester.dial(addr, Endpoint::new("AAAA", "Pixel: 7a"), "Galaxy: S9", SERVICE, events),
        )
        .await?;

        assert!(matches!(dialed, Err(TransportError::Failed(_))));
        assert!(!requester.has_link());
        Ok(())
    }

    #[tokio::test]
    async fn test_send_requires_connected_link() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let p = pair(&temp).await?;
        let src = temp.path().join("a.txt");
        std::fs::write(&src, b"hello")?;
        let store = LocalStorage::new(temp.path().join("out"))?;

        let unknown = p.requester.send("ZZZZ", store.open_payload(&src).await?);
        assert_eq!(unknown, Err(TransportError::UnknownEndpoint("ZZZZ".into())));

        let pending = p.requester.send("AAAA", store.open_payload(&src).await?);
        assert!(matches!(pending, Err(TransportError::Failed(_))));
        Ok(())
    }

    #[test]
    fn test_payload_ids_are_positive() {
        for _ in 0..64 {
            assert!(next_payload_id() >= 0);
        }
    }
}
