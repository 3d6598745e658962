use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxtRecord(pub Vec<(String, String)>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAnnouncement {
    /// e.g. "_handoff._tcp.local."
    pub service_type: String,
    /// Unique per device, e.g. the endpoint id
    pub instance_name: String,
    /// e.g. "handoff-3f2a.local."
    pub host_name: String,
    pub ip_addr: String,
    pub port: u16,
    pub txt: Option<TxtRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub fullname: String,
    pub instance_name: String,
    pub service_type: String,
    pub host_name: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    pub txt: Vec<(String, String)>,
}

impl DiscoveredService {
    pub fn txt_value(&self, key: &str) -> Option<&str> {
        self.txt
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Preferred address to dial: IPv4 first.
    pub fn dial_addr(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| self.addresses.first())
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceIp {
    pub name: String,
    pub ip: IpAddr,
    pub family: &'static str,  //ipv4 or ipv6
    pub is_loopback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(addresses: Vec<IpAddr>) -> DiscoveredService {
        DiscoveredService {
            fullname: "3F2A._handoff._tcp.local.".into(),
            instance_name: "3F2A".into(),
            service_type: "_handoff._tcp.local.".into(),
            host_name: "handoff-3f2a.local.".into(),
            port: 40123,
            addresses,
            txt: vec![("eid".into(), "3F2A".into()), ("name".into(), "Pixel: 7a".into())],
        }
    }

    #[test]
    fn test_txt_lookup() {
        let svc = service(vec![]);
        assert_eq!(svc.txt_value("name"), Some("Pixel: 7a"));
        assert_eq!(svc.txt_value("sid"), None);
    }

    #[test]
    fn test_dial_addr_prefers_ipv4() {
        let v6: IpAddr = "fe80::1".parse().unwrap();
        let v4: IpAddr = "192.168.1.20".parse().unwrap();
        assert_eq!(service(vec![v6, v4]).dial_addr(), Some(v4));
        assert_eq!(service(vec![v6]).dial_addr(), Some(v6));
        assert_eq!(service(vec![]).dial_addr(), None);
    }
}
