//! Host network membership checks

use std::net::Ipv4Addr;

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};

use hmdmon_core::prelude::*;

/// Tests whether `other` is reachable from one of the host's interfaces.
///
/// For simplicity's sake the configured netmask of each interface is taken
/// at face value.
pub fn ensure_same_network(other: Ipv4Addr) -> Result<()> {
    let interfaces = NetworkInterface::show().map_err(|e| Error::other(e.to_string()))?;

    let shared = interfaces
        .into_iter()
        .flat_map(|interface| interface.addr)
        .any(|addr| match addr {
            Addr::V4(v4) => v4
                .netmask
                .map(|netmask| same_subnet(v4.ip, other, netmask))
                .unwrap_or(false),
            Addr::V6(_) => false,
        });

    if !shared {
        return Err(Error::NotInSameNetwork);
    }

    Ok(())
}

/// Whether two addresses fall into the same subnet under `netmask`.
pub fn same_subnet(lhs: Ipv4Addr, rhs: Ipv4Addr, netmask: Ipv4Addr) -> bool {
    netmask
        .octets()
        .into_iter()
        .enumerate()
        .all(|(pos, mask)| lhs.octets()[pos] & mask == rhs.octets()[pos] & mask)
}
