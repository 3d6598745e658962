use std::io::{Error, ErrorKind};
use std::net::IpAddr;
use crate::model::InterfaceIp;

pub fn list_interface_ips_result() -> Result<Vec<InterfaceIp>, Error> {
    let ifs = if_addrs::get_if_addrs()?;

    let mut out: Vec<InterfaceIp> = ifs
        .into_iter()
        .map(|ifa| {
            let ip = ifa.ip();
            let family = if ip.is_ipv4() {"ipv4"} else {"ipv6"};
            let is_loopback = ip.is_loopback();

            InterfaceIp {
                name: ifa.name,
                ip,
                family,
                is_loopback,
            }
        }).collect();

    out.sort_by(|a, b| (&a.name, &a.ip).cmp(&(&b.name, &b.ip)));
    out.dedup_by(|a, b| a.name == b.name && a.ip == b.ip);
    Ok(out)
}

/// Address to announce: the named interface's first IPv4 (falling back to
/// any of its addresses), or without a name the first non-loopback IPv4.
pub fn pick_interface_ip(interface: Option<&str>) -> Result<IpAddr, Error> {
    select_ip(&list_interface_ips_result()?, interface)
}

fn select_ip(ips: &[InterfaceIp], interface: Option<&str>) -> Result<IpAddr, Error> {
    let chosen = match interface {
        Some(name) => {
            let own: Vec<&InterfaceIp> = ips.iter().filter(|i| i.name == name).collect();
            own.iter()
                .find(|i| i.family == "ipv4")
                .or_else(|| own.first())
                .map(|i| i.ip)
        }
        None => ips
            .iter()
            .find(|i| !i.is_loopback && i.family == "ipv4")
            .map(|i| i.ip),
    };

    chosen.ok_or_else(|| {
        Error::new(
            ErrorKind::NotFound,
            format!("No usable address on interface {}", interface.unwrap_or("(any)")),
        )
    })
}
