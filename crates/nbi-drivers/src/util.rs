//! Path and address helpers shared by the vendor drivers

use ipnetwork::Ipv4Network;
use lazy_static::lazy_static;
use regex::Regex;
use std::net::Ipv4Addr;

use nbi_core::{Error, Result};

use crate::params::{Params, ParamsExt};

pub const NETCONF_TOPOLOGY: &str = "/network-topology:network-topology/topology=topology-netconf";

lazy_static! {
    // alphabetic (or dash) prefix, then everything from the first digit on
    static ref INTERFACE_NAME: Regex =
        Regex::new(r"^([A-Za-z\-]+?)(\d.*)$").expect("interface name regex");
}

/// Topology node path for a NETCONF node
pub fn node_path(node_id: &str) -> String {
    format!("{}/node={}", NETCONF_TOPOLOGY, encode_key(node_id))
}

/// Root of the device's proxied YANG tree
pub fn mount_base(node_id: &str) -> String {
    format!("{}/yang-ext:mount", node_path(node_id))
}

/// Percent-encode one list-key value so `/`, `,` and friends cannot split
/// the path segment
pub fn encode_key(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// `GigabitEthernet0/0/1` -> (`GigabitEthernet`, `0/0/1`)
pub fn split_interface_name(name: &str) -> Result<(String, String)> {
    let caps = INTERFACE_NAME
        .captures(name.trim())
        .ok_or_else(|| Error::build(format!("Invalid interface name: {}", name)))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

pub fn parse_ipv4(value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| Error::build(format!("Invalid IPv4 address: {}", value)))
}

pub fn prefix_to_netmask(prefix: u8) -> Result<String> {
    let net = Ipv4Network::new(Ipv4Addr::UNSPECIFIED, prefix)
        .map_err(|e| Error::build(format!("Invalid prefix length {}: {}", prefix, e)))?;
    Ok(net.mask().to_string())
}

/// Rejects non-contiguous masks
pub fn netmask_to_prefix(mask: &str) -> Result<u8> {
    let mask = parse_ipv4(mask)?;
    let net = Ipv4Network::with_netmask(Ipv4Addr::UNSPECIFIED, mask)
        .map_err(|e| Error::build(format!("Invalid netmask {}: {}", mask, e)))?;
    Ok(net.prefix())
}

fn invert(addr: &str) -> Result<String> {
    let bits = u32::from(parse_ipv4(addr)?);
    Ok(Ipv4Addr::from(!bits).to_string())
}

pub fn netmask_to_wildcard(mask: &str) -> Result<String> {
    invert(mask)
}

pub fn wildcard_to_netmask(wildcard: &str) -> Result<String> {
    invert(wildcard)
}

pub fn wildcard_to_prefix(wildcard: &str) -> Result<u8> {
    netmask_to_prefix(&wildcard_to_netmask(wildcard)?)
}

/// OSPF area as dotted quad. Integers are treated as the 32-bit area id,
/// so `0` -> `0.0.0.0` and `256` -> `0.0.1.0`.
pub fn area_to_dotted(area: &str) -> Result<String> {
    let area = area.trim();
    if area.contains('.') {
        return Ok(parse_ipv4(area)?.to_string());
    }
    let id: u32 = area
        .parse()
        .map_err(|_| Error::build(format!("Invalid OSPF area: {}", area)))?;
    Ok(Ipv4Addr::from(id).to_string())
}

/// Address plus prefix length from `10.0.0.0/24`, or from a bare address and
/// a separate prefix/mask value
pub fn resolve_prefix(
    address: &str,
    prefix: Option<&str>,
    mask: Option<&str>,
) -> Result<(Ipv4Addr, u8)> {
    if let Some((ip, len)) = address.split_once('/') {
        let len = len
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::build(format!("Invalid prefix in {}", address)))?;
        return checked(parse_ipv4(ip)?, len);
    }
    let ip = parse_ipv4(address)?;
    match (prefix, mask) {
        (Some(p), _) if p.contains('.') => checked(ip, netmask_to_prefix(p)?),
        (Some(p), _) => {
            let len = p
                .trim()
                .parse::<u8>()
                .map_err(|_| Error::build(format!("Invalid prefix length: {}", p)))?;
            checked(ip, len)
        }
        (None, Some(m)) => checked(ip, netmask_to_prefix(m)?),
        (None, None) => Err(Error::build("params require prefix or mask")),
    }
}

fn checked(ip: Ipv4Addr, len: u8) -> Result<(Ipv4Addr, u8)> {
    if len > 32 {
        return Err(Error::build(format!("Invalid prefix length: {}", len)));
    }
    Ok((ip, len))
}

/// 802.1Q id from `vlan_id`, range checked
pub fn vlan_id(params: &Params) -> Result<u32> {
    let id = params.required_u32("vlan_id")?;
    if !(1..=4094).contains(&id) {
        return Err(Error::build(format!("vlan_id must be 1-4094, got {}", id)));
    }
    Ok(id)
}

/// Network address of `ip/len`
pub fn network_of(ip: Ipv4Addr, len: u8) -> Result<Ipv4Addr> {
    let net = Ipv4Network::new(ip, len)
        .map_err(|e| Error::build(format!("Invalid network {}/{}: {}", ip, len, e)))?;
    Ok(net.network())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_interface_name() {
        assert_eq!(
            split_interface_name("GigabitEthernet0/0/1").unwrap(),
            ("GigabitEthernet".to_string(), "0/0/1".to_string())
        );
        assert_eq!(
            split_interface_name("Port-channel10").unwrap(),
            ("Port-channel".to_string(), "10".to_string())
        );
        assert_eq!(
            split_interface_name("Loopback0").unwrap(),
            ("Loopback".to_string(), "0".to_string())
        );
        assert!(split_interface_name("eth").is_err());
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("0/0/1"), "0%2F0%2F1");
        assert_eq!(encode_key("GE1/0/0.100"), "GE1%2F0%2F0.100");
        assert_eq!(encode_key("0.0.0.0/0"), "0.0.0.0%2F0");
    }

    #[test]
    fn test_mount_base() {
        assert_eq!(
            mount_base("CSR1"),
            "/network-topology:network-topology/topology=topology-netconf/node=CSR1/yang-ext:mount"
        );
    }

    #[test]
    fn test_masks() {
        assert_eq!(prefix_to_netmask(24).unwrap(), "255.255.255.0");
        assert_eq!(prefix_to_netmask(0).unwrap(), "0.0.0.0");
        assert_eq!(prefix_to_netmask(32).unwrap(), "255.255.255.255");
        assert!(prefix_to_netmask(33).is_err());
        assert_eq!(netmask_to_prefix("255.255.252.0").unwrap(), 22);
        assert!(netmask_to_prefix("255.0.255.0").is_err());
        assert_eq!(netmask_to_wildcard("255.255.255.0").unwrap(), "0.0.0.255");
        assert_eq!(wildcard_to_prefix("0.0.0.255").unwrap(), 24);
    }

    #[test]
    fn test_area_to_dotted() {
        assert_eq!(area_to_dotted("0").unwrap(), "0.0.0.0");
        assert_eq!(area_to_dotted("10").unwrap(), "0.0.0.10");
        assert_eq!(area_to_dotted("256").unwrap(), "0.0.1.0");
        assert_eq!(area_to_dotted("0.0.0.1").unwrap(), "0.0.0.1");
        assert!(area_to_dotted("backbone").is_err());
    }

    #[test]
    fn test_resolve_prefix() {
        let (ip, len) = resolve_prefix("10.0.0.0/8", None, None).unwrap();
        assert_eq!((ip.to_string(), len), ("10.0.0.0".to_string(), 8));
        let (_, len) = resolve_prefix("10.1.1.1", Some("24"), None).unwrap();
        assert_eq!(len, 24);
        let (_, len) = resolve_prefix("10.1.1.1", None, Some("255.255.0.0")).unwrap();
        assert_eq!(len, 16);
        let (_, len) = resolve_prefix("10.1.1.1", Some("255.255.255.128"), None).unwrap();
        assert_eq!(len, 25);
        assert!(resolve_prefix("10.1.1.1", None, None).is_err());
        assert!(resolve_prefix("10.1.1.1/40", None, None).is_err());
    }

    #[test]
    fn test_network_of() {
        let ip: Ipv4Addr = "192.168.10.77".parse().unwrap();
        assert_eq!(network_of(ip, 24).unwrap().to_string(), "192.168.10.0");
    }
}
