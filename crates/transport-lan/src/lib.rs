//! LAN transport: mDNS for advertise/discover, TCP links for negotiation and
//! payload streaming.

pub mod frame;
mod link;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use handoff_core::{
    Endpoint, HandoffConfig, Strategy, TransportAdapter, TransportError, TransportEvent,
    TransportEvents,
};
use mdns_core::announce::Announcer;
use mdns_core::discover::{BrowseEvent, Browser};
use mdns_core::model::{DiscoveredService, ServiceAnnouncement, TxtRecord};
use mdns_core::net::pick_interface_ip;
use mdns_core::SERVICE_TYPE;
use rand_core::{OsRng, RngCore};
use storage::{PayloadFile, Storage};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::link::Hub;

/// TXT keys carried by every announcement.
pub const TXT_ENDPOINT_ID: &str = "eid";
pub const TXT_NAME: &str = "name";
pub const TXT_SERVICE_ID: &str = "sid";
pub const TXT_STRATEGY: &str = "strategy";

#[derive(Debug, Clone)]
pub struct LanConfig {
    /// Interface whose address is announced (None = first non-loopback IPv4)
    pub interface: Option<String>,
    pub listen_port: u16,
    pub chunk_size: usize,
}

impl LanConfig {
    pub fn from_handoff(config: &HandoffConfig, interface: Option<String>) -> Self {
        Self {
            interface,
            listen_port: config.listen_port,
            chunk_size: config.chunk_size,
        }
    }
}

struct Advertising {
    announcer: Announcer,
    accept_task: JoinHandle<()>,
}

/// A peer seen through mDNS and where to dial it.
struct Discovered {
    name: String,
    fullname: String,
    addr: SocketAddr,
}

#[derive(Default)]
struct LanState {
    service_id: Option<String>,
    advertising: Option<Advertising>,
    browser: Option<Browser>,
    discovered: HashMap<String, Discovered>,
}

pub struct LanTransport {
    config: LanConfig,
    hub: Arc<Hub>,
    state: Arc<Mutex<LanState>>,
}

impl LanTransport {
    pub fn new(config: LanConfig, storage: Arc<dyn Storage>) -> Self {
        let hub = Hub::new(new_endpoint_id(), storage, config.chunk_size);
        info!("Local endpoint id {}", hub.local_id());
        Self {
            config,
            hub,
            state: Arc::new(Mutex::new(LanState::default())),
        }
    }

    /// The 4-character id peers see for this endpoint.
    pub fn endpoint_id(&self) -> &str {
        self.hub.local_id()
    }

    fn state(&self) -> MutexGuard<'_, LanState> {
        lock(&self.state)
    }

    /// Stop advertising and discovery and drop every link.
    pub async fn shutdown(&self) {
        self.stop_advertising().await;
        self.stop_discovery().await;
        self.hub.disconnect_all().await;
    }
}

fn lock(state: &Mutex<LanState>) -> MutexGuard<'_, LanState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Four uppercase hex characters, e.g. "3F2A".
pub fn new_endpoint_id() -> String {
    let mut bytes = [0u8; 2];
    OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

/// Whether `svc` is a peer we may connect to: same service id and strategy,
/// and not ourselves.
fn matching_peer<'a>(
    svc: &'a DiscoveredService,
    local_id: &str,
    service_id: &str,
    strategy: Strategy,
) -> Option<(&'a str, &'a str)> {
    let eid = svc.txt_value(TXT_ENDPOINT_ID)?;
    if eid == local_id
        || svc.txt_value(TXT_SERVICE_ID) != Some(service_id)
        || svc.txt_value(TXT_STRATEGY) != Some(strategy.as_str())
    {
        return None;
    }
    Some((eid, svc.txt_value(TXT_NAME).unwrap_or(eid)))
}

#[async_trait]
impl TransportAdapter for LanTransport {
    async fn start_advertising(
        &self,
        name: &str,
        service_id: &str,
        strategy: Strategy,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        if self.state().advertising.is_some() {
            return Err(TransportError::Failed("already advertising".into()));
        }

        let ip = pick_interface_ip(self.config.interface.as_deref())
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        let listener = TcpListener::bind((ip, self.config.listen_port))
            .await
            .map_err(|e| TransportError::Unavailable(format!("bind {}: {}", ip, e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?
            .port();

        let local_id = self.hub.local_id();
        let announcement = ServiceAnnouncement {
            service_type: SERVICE_TYPE.to_string(),
            instance_name: local_id.to_string(),
            host_name: format!("handoff-{}.local.", local_id.to_lowercase()),
            ip_addr: ip.to_string(),
            port,
            txt: Some(TxtRecord(vec![
                (TXT_ENDPOINT_ID.into(), local_id.to_string()),
                (TXT_NAME.into(), name.to_string()),
                (TXT_SERVICE_ID.into(), service_id.to_string()),
                (TXT_STRATEGY.into(), strategy.as_str().to_string()),
            ])),
        };
        let announcer = Announcer::register(announcement)
            .map_err(|e| TransportError::Unavailable(format!("{:#}", e)))?;

        let accept_task = self.hub.serve(listener, service_id.to_string(), events);
        info!("Advertising {} as {} on {}:{}", name, announcer.fullname(), ip, port);

        let mut state = self.state();
        state.service_id = Some(service_id.to_string());
        state.advertising = Some(Advertising {
            announcer,
            accept_task,
        });
        Ok(())
    }

    async fn start_discovery(
        &self,
        service_id: &str,
        strategy: Strategy,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        if self.state().browser.is_some() {
            return Err(TransportError::Failed("already discovering".into()));
        }

        let shared = self.state.clone();
        let local_id = self.hub.local_id().to_string();
        let wanted = service_id.to_string();

        let browser = Browser::start(SERVICE_TYPE, move |event| match event {
            BrowseEvent::Resolved(svc) => {
                let Some((eid, name)) = matching_peer(&svc, &local_id, &wanted, strategy) else {
                    debug!("Skipping {}", svc.fullname);
                    return;
                };
                let Some(ip) = svc.dial_addr() else {
                    debug!("{} resolved without an address", svc.fullname);
                    return;
                };

                let fresh = lock(&shared)
                    .discovered
                    .insert(
                        eid.to_string(),
                        Discovered {
                            name: name.to_string(),
                            fullname: svc.fullname.clone(),
                            addr: SocketAddr::new(ip, svc.port),
                        },
                    )
                    .is_none();
                if fresh {
                    events.emit(TransportEvent::EndpointFound {
                        endpoint: Endpoint::new(eid, name),
                    });
                }
            }
            BrowseEvent::Removed { fullname } => {
                let lost = {
                    let mut state = lock(&shared);
                    let id = state
                        .discovered
                        .iter()
                        .find(|(_, d)| d.fullname == fullname)
                        .map(|(id, _)| id.clone());
                    if let Some(id) = &id {
                        state.discovered.remove(id);
                    }
                    id
                };
                if let Some(endpoint_id) = lost {
                    events.emit(TransportEvent::EndpointLost { endpoint_id });
                }
            }
        })
        .map_err(|e| TransportError::Unavailable(format!("{:#}", e)))?;

        let mut state = self.state();
        state.service_id = Some(service_id.to_string());
        state.browser = Some(browser);
        debug!("Discovering peers for {}", service_id);
        Ok(())
    }

    async fn stop_advertising(&self) {
        let advertising = self.state().advertising.take();
        if let Some(adv) = advertising {
            adv.accept_task.abort();
            adv.announcer.unregister();
            debug!("Stopped advertising");
        }
    }

    async fn stop_discovery(&self) {
        let browser = {
            let mut state = self.state();
            state.discovered.clear();
            state.browser.take()
        };
        if let Some(browser) = browser {
            browser.stop();
            debug!("Stopped discovery");
        }
    }

    async fn request_connection(
        &self,
        name: &str,
        endpoint_id: &str,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        let (endpoint, addr, service_id) = {
            let state = self.state();
            let peer = state
                .discovered
                .get(endpoint_id)
                .ok_or_else(|| TransportError::UnknownEndpoint(endpoint_id.to_string()))?;
            (
                Endpoint::new(endpoint_id, peer.name.clone()),
                peer.addr,
                state.service_id.clone().unwrap_or_default(),
            )
        };

        self.hub
            .dial(addr, endpoint, name, &service_id, events)
            .await
    }

    async fn accept_connection(
        &self,
        endpoint_id: &str,
        events: TransportEvents,
    ) -> Result<(), TransportError> {
        self.hub.accept(endpoint_id, events).await
    }

    async fn reject_connection(&self, endpoint_id: &str) -> Result<(), TransportError> {
        self.hub.reject(endpoint_id).await
    }

    async fn send_payload(
        &self,
        endpoint_id: &str,
        payload: PayloadFile,
    ) -> Result<i64, TransportError> {
        self.hub.send(endpoint_id, payload)
    }

    async fn disconnect_from_endpoint(&self, endpoint_id: &str) {
        self.hub.disconnect(endpoint_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use storage::LocalStorage;
    use tempfile::TempDir;

    fn announced(txt: &[(&str, &str)]) -> DiscoveredService {
        DiscoveredService {
            fullname: "3F2A._handoff._tcp.local.".into(),
            instance_name: "3F2A".into(),
            service_type: SERVICE_TYPE.into(),
            host_name: "handoff-3f2a.local.".into(),
            port: 40123,
            addresses: vec!["192.168.1.20".parse::<IpAddr>().unwrap()],
            txt: txt.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_endpoint_id_format() {
        let id = new_endpoint_id();
        assert_eq!(id.len(), 4);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_matching_peer_filters() {
        let strategy = Strategy::PointToPoint.as_str();
        let good = announced(&[
            ("eid", "3F2A"),
            ("name", "Pixel: 7a"),
            ("sid", "dev.handoff.relay"),
            ("strategy", strategy),
        ]);
        assert_eq!(
            matching_peer(&good, "BBBB", "dev.handoff.relay", Strategy::PointToPoint),
            Some(("3F2A", "Pixel: 7a"))
        );

        // Ourselves
        assert_eq!(
            matching_peer(&good, "3F2A", "dev.handoff.relay", Strategy::PointToPoint),
            None
        );
        // Other application
        assert_eq!(
            matching_peer(&good, "BBBB", "org.other", Strategy::PointToPoint),
            None
        );

        let other_strategy = announced(&[
            ("eid", "3F2A"),
            ("sid", "dev.handoff.relay"),
            ("strategy", "p2p_star"),
        ]);
        assert_eq!(
            matching_peer(&other_strategy, "BBBB", "dev.handoff.relay", Strategy::PointToPoint),
            None
        );

        let unnamed = announced(&[("eid", "3F2A"), ("sid", "dev.handoff.relay"), ("strategy", strategy)]);
        assert_eq!(
            matching_peer(&unnamed, "BBBB", "dev.handoff.relay", Strategy::PointToPoint),
            Some(("3F2A", "3F2A"))
        );
    }

    #[tokio::test]
    async fn test_request_unknown_endpoint_fails() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let storage = Arc::new(LocalStorage::new(temp.path().to_path_buf())?);
        let transport = LanTransport::new(
            LanConfig {
                interface: None,
                listen_port: 0,
                chunk_size: 1024,
            },
            storage,
        );
        let (events, _rx) = TransportEvents::channel();

        let result = transport.request_connection("Galaxy: S9", "ZZZZ", events).await;

        assert_eq!(result, Err(TransportError::UnknownEndpoint("ZZZZ".into())));
        assert!(transport.reject_connection("ZZZZ").await.is_err());
        transport.disconnect_from_endpoint("ZZZZ").await;
        Ok(())
    }
}
