use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{CredentialError, Result};

/// An IP network in CIDR notation, normalized to its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    network: IpAddr,
    prefix_len: u8,
}

impl IpNetwork {
    /// Parses `addr/prefix`, masking off host bits.
    ///
    /// # Errors
    /// Returns a validation error naming `field` when the input is not a CIDR.
    pub fn parse(field: &str, cidr: &str) -> Result<Self> {
        let invalid = |message: String| CredentialError::validation(field, message);
        let (addr, prefix) = cidr
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid(format!("{cidr:?} is not in CIDR notation")))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|e| invalid(format!("{cidr:?} has an invalid address: {e}")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|e| invalid(format!("{cidr:?} has an invalid prefix length: {e}")))?;

        let network = match addr {
            IpAddr::V4(v4) => {
                if prefix_len > 32 {
                    return Err(invalid(format!("{cidr:?} prefix length exceeds 32")));
                }
                let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
            }
            IpAddr::V6(v6) => {
                if prefix_len > 128 {
                    return Err(invalid(format!("{cidr:?} prefix length exceeds 128")));
                }
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(prefix_len))
                    .unwrap_or(0);
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
            }
        };
        Ok(Self {
            network,
            prefix_len,
        })
    }

    #[must_use]
    pub fn network(&self) -> IpAddr {
        self.network
    }

    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }
}

/// Returns the address following `ip`, wrapping at the top of the space.
#[must_use]
pub fn increment_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4).wrapping_add(1))),
        IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6).wrapping_add(1))),
    }
}

/// Cluster IP of the `kubernetes` service: the first host of the service CIDR.
///
/// # Errors
/// Returns a validation error if `service_cidr` is malformed.
pub fn kubernetes_service_ip(service_cidr: &str) -> Result<IpAddr> {
    let network = IpNetwork::parse("network.service_cidr", service_cidr)?;
    Ok(increment_ip(network.network()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubernetes_service_ip_default_cidr() {
        let ip = kubernetes_service_ip("10.3.0.0/24").unwrap();
        assert_eq!(ip, "10.3.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_kubernetes_service_ip_masks_host_bits() {
        let ip = kubernetes_service_ip("10.100.7.9/16").unwrap();
        assert_eq!(ip, "10.100.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_kubernetes_service_ip_ipv6() {
        let ip = kubernetes_service_ip("fd00:10:96::/112").unwrap();
        assert_eq!(ip, "fd00:10:96::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        let err = IpNetwork::parse("network.service_cidr", "10.3.0.0").unwrap_err();
        assert!(err.to_string().contains("network.service_cidr"));
    }

    #[test]
    fn test_parse_rejects_oversized_prefix() {
        assert!(IpNetwork::parse("network.service_cidr", "10.3.0.0/33").is_err());
        assert!(IpNetwork::parse("network.service_cidr", "not-an-ip/24").is_err());
    }

    #[test]
    fn test_prefix_zero_covers_everything() {
        let network = IpNetwork::parse("cidr", "192.168.1.1/0").unwrap();
        assert_eq!(network.network(), "0.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(network.prefix_len(), 0);
    }
}
