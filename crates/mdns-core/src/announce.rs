use crate::ensure_dot;
use crate::model::{ServiceAnnouncement, TxtRecord};
use anyhow::Result;
use mdns_sd::{ServiceDaemon, ServiceInfo};

/// Handle so the service stays registered while this is alive.
pub struct Announcer {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Announcer {
    pub fn register(ann: ServiceAnnouncement) -> Result<Self> {
        let daemon = ServiceDaemon::new()?;

        let txt_kv = ann.txt.unwrap_or(TxtRecord(vec![])).0;

        // Ensure trailing dots as mdns-sd expects FQDNs.
        let service_type = ensure_dot(&ann.service_type);
        let host_name = ensure_dot(&ann.host_name);

        let info = ServiceInfo::new(
            &service_type,
            &ann.instance_name,
            &host_name,
            &ann.ip_addr,
            ann.port,
            &*txt_kv,
        )?;

        daemon.register(info.clone())?;
        tracing::debug!("Registered {}", info.get_fullname());
        Ok(Self {
            daemon,
            fullname: info.get_fullname().to_string(),
        })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Withdraw the record and stop the daemon.
    pub fn unregister(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            tracing::warn!("Failed to unregister {}: {}", self.fullname, e);
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!("mDNS daemon shutdown: {}", e);
        }
        tracing::debug!("Unregistered {}", self.fullname);
    }
}
