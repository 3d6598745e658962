use crate::ensure_dot;
use crate::model::DiscoveredService;
use anyhow::Result;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum BrowseEvent {
    Resolved(DiscoveredService),
    Removed { fullname: String },
}

fn to_discovered(info: &ServiceInfo, service_type: &str) -> DiscoveredService {
    let txt = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect::<Vec<_>>();

    DiscoveredService {
        fullname: info.get_fullname().to_string(),
        instance_name: info
            .get_fullname()
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string(),
        service_type: service_type.to_string(),
        host_name: info.get_hostname().to_string(),
        port: info.get_port(),
        addresses: info.get_addresses().iter().copied().collect(),
        txt,
    }
}

/// Collect every service resolved within `timeout`.
pub fn browse_blocking(service_type: &str, timeout: Duration) -> Result<Vec<DiscoveredService>> {
    let daemon = ServiceDaemon::new()?;
    let service_type = ensure_dot(service_type);

    let receiver = daemon.browse(&service_type)?;
    let mut out = Vec::new();

    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Ok(event) = receiver.recv_timeout(POLL_INTERVAL) {
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    out.push(to_discovered(&info, &service_type));
                }
                ServiceEvent::ServiceFound(ty, fullname) => {
                    tracing::debug!("Found {} ({})", fullname, ty);
                }
                _ => {}
            }
        }
    }

    if let Err(e) = daemon.shutdown() {
        tracing::debug!("mDNS daemon shutdown: {}", e);
    }
    Ok(out)
}

/// Background browse that reports services until stopped.
pub struct Browser {
    daemon: ServiceDaemon,
    service_type: String,
    stop: Arc<AtomicBool>,
}

impl Browser {
    /// Start browsing; `on_event` runs on a dedicated thread.
    pub fn start<F>(service_type: &str, mut on_event: F) -> Result<Self>
    where
        F: FnMut(BrowseEvent) + Send + 'static,
    {
        let daemon = ServiceDaemon::new()?;
        let service_type = ensure_dot(service_type);
        let receiver = daemon.browse(&service_type)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let ty = service_type.clone();

        std::thread::Builder::new()
            .name("mdns-browse".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    let event = match receiver.recv_timeout(POLL_INTERVAL) {
                        Ok(event) => event,
                        Err(_) if receiver.is_disconnected() => break,
                        Err(_) => continue,
                    };
                    match event {
                        ServiceEvent::ServiceResolved(info) => {
                            on_event(BrowseEvent::Resolved(to_discovered(&info, &ty)));
                        }
                        ServiceEvent::ServiceRemoved(_, fullname) => {
                            on_event(BrowseEvent::Removed { fullname });
                        }
                        _ => {}
                    }
                }
                tracing::debug!("Browse of {} stopped", ty);
            })?;

        Ok(Self {
            daemon,
            service_type,
            stop,
        })
    }

    /// Stop browsing. The worker thread exits within one poll interval.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            tracing::debug!("stop_browse: {}", e);
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!("mDNS daemon shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNUSED_TYPE: &str = "_handoff-unused._tcp.local.";

    #[test]
    fn test_zero_timeout_browse_shuts_down_empty() {
        // Hosts without a multicast-capable interface cannot start a daemon.
        let Ok(found) = browse_blocking(UNUSED_TYPE, Duration::ZERO) else {
            return;
        };
        assert!(found.is_empty());
    }

    #[test]
    fn test_browser_stop_returns() {
        let Ok(browser) = Browser::start(UNUSED_TYPE, |_| {}) else {
            return;
        };
        browser.stop();
    }
}
