// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Compile the declared underlay and VNIs into an [`FrrConfig`].
//!
//! Compilation is a pure function of its inputs: the hostname, the log level and the secrets are
//! handed in by the caller.

use config::ConfigError;
use config::external::{Neighbor, Underlay, Vni, validate_vnis};
use config::internal::{
    FrrConfig, IpFamily, NeighborConfig, RemoteAs, UnderlayConfig, VniConfig,
};
use ipam::NodeIndex;
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, warn};

/// Hold times below this, other than zero, are rejected.
const MIN_HOLD_TIME: Duration = Duration::from_secs(3);

/// What compilation needs besides the declared objects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileContext {
    /// Log level, in the vocabulary of the routing daemon.
    pub log_level: String,
    pub hostname: String,
    /// Neighbor passwords, by secret name.
    pub secrets: BTreeMap<String, String>,
}

/// Validate the BGP timers of a neighbor and convert them to whole seconds.
fn parse_timers(
    name: &str,
    hold: Option<Duration>,
    keepalive: Option<Duration>,
) -> Result<(Option<u64>, Option<u64>), ConfigError> {
    let (hold, keepalive) = match (hold, keepalive) {
        (None, None) => return Ok((None, None)),
        (Some(hold), Some(keepalive)) => (hold, keepalive),
        _ => return Err(ConfigError::TimersMismatch(name.to_owned())),
    };
    let rounded = Duration::from_secs(hold.as_secs());
    if !rounded.is_zero() && rounded < MIN_HOLD_TIME {
        return Err(ConfigError::InvalidHoldTime(name.to_owned(), hold));
    }
    if keepalive > hold {
        return Err(ConfigError::KeepaliveExceedsHold(
            name.to_owned(),
            keepalive,
            hold,
        ));
    }
    Ok((Some(hold.as_secs()), Some(keepalive.as_secs())))
}

fn resolve_password(
    neighbor: &Neighbor,
    secrets: &BTreeMap<String, String>,
) -> Result<Option<String>, ConfigError> {
    match (&neighbor.password, &neighbor.password_secret) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingPassword(neighbor.name())),
        (Some(password), None) => Ok(Some(password.clone())),
        (None, Some(secret)) => secrets
            .get(secret)
            .cloned()
            .map(Some)
            .ok_or_else(|| ConfigError::MissingSecret(neighbor.name(), secret.clone())),
        (None, None) => Ok(None),
    }
}

/// Translate a declared neighbor into a BGP session.
///
/// # Errors
///
/// Fails if the address is not an IP address, if the ASN is not set exactly once, on
/// inconsistent timers and on password issues.
pub fn neighbor_config(
    neighbor: &Neighbor,
    secrets: &BTreeMap<String, String>,
) -> Result<NeighborConfig, ConfigError> {
    let addr: IpAddr = neighbor
        .address
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(neighbor.address.clone()))?;
    neighbor.validate_asn()?;
    let remote_as = match neighbor.dynamic_asn {
        Some(mode) if neighbor.asn == 0 => RemoteAs::from(mode),
        _ => RemoteAs::Number(neighbor.asn),
    };
    let name = neighbor.name();
    let (hold_time, keepalive_time) =
        parse_timers(&name, neighbor.hold_time, neighbor.keepalive_time)?;
    Ok(NeighborConfig {
        remote_as,
        ip_family: IpFamily::from(&addr),
        addr,
        port: neighbor.port,
        hold_time,
        keepalive_time,
        connect_time: neighbor.connect_time.map(|t| t.as_secs()),
        password: resolve_password(neighbor, secrets)?,
        bfd_profile: neighbor.bfd_profile.clone(),
        ebgp_multihop: neighbor.ebgp_multi_hop,
        name,
    })
}

fn vni_config(vni: &Vni, node_index: NodeIndex) -> Result<VniConfig, ConfigError> {
    let veths = ipam::veth_addresses(&vni.local_cidr, node_index)
        .map_err(|e| ConfigError::Ipam(vni.name.clone(), e))?;
    let local = veths.ns_side.addr();
    Ok(VniConfig {
        asn: vni.asn,
        vni: vni.vni,
        vrf: vni.vrf.clone(),
        local_neighbor: NeighborConfig::plain(vni.asn, local),
        to_advertise: vec![IpNet::from(local)],
    })
}

/// Compile the configuration of the routing daemon of node `node_index`.
///
/// # Errors
///
/// Fails unless there is exactly one underlay and at least one VNI, and on the first invalid
/// neighbor or address pool.
pub fn compile(
    node_index: NodeIndex,
    underlays: &[Underlay],
    vnis: &[Vni],
    ctx: &CompileContext,
) -> Result<FrrConfig, ConfigError> {
    let underlay = match underlays {
        [] => return Err(ConfigError::NoUnderlay),
        [underlay] => underlay,
        _ => return Err(ConfigError::TooManyInstances("Underlay", underlays.len())),
    };
    if vnis.is_empty() {
        return Err(ConfigError::NoVnis);
    }
    validate_vnis(vnis)?;

    let vtep = ipam::vtep_address(&underlay.vtep_cidr, node_index)
        .map_err(|e| ConfigError::Ipam(underlay.name.clone(), e))?;
    let neighbors = underlay
        .neighbors
        .iter()
        .map(|n| neighbor_config(n, &ctx.secrets))
        .collect::<Result<Vec<_>, _>>()?;
    let vnis = vnis
        .iter()
        .map(|vni| vni_config(vni, node_index))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "Compiled frr config for node {node_index}: {} neighbors, {} vnis",
        neighbors.len(),
        vnis.len()
    );

    Ok(FrrConfig {
        log_level: ctx.log_level.clone(),
        hostname: ctx.hostname.clone(),
        underlay: UnderlayConfig {
            asn: underlay.asn,
            vtep,
            neighbors,
        },
        vnis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::external::{
        DynamicAsnMode, NeighborBuilder, UnderlayBuilder, VniBuilder,
    };
    use pretty_assertions::assert_eq;

    fn ctx() -> CompileContext {
        CompileContext {
            log_level: "informational".to_string(),
            hostname: "node-0".to_string(),
            secrets: BTreeMap::from([("bgp-pass".to_string(), "s3cr3t".to_string())]),
        }
    }

    fn neighbor(asn: u32, address: &str) -> NeighborBuilder {
        let mut builder = NeighborBuilder::default();
        builder.asn(asn).address(address);
        builder
    }

    fn underlay(neighbors: Vec<Neighbor>) -> Underlay {
        UnderlayBuilder::default()
            .name("underlay")
            .asn(64514u32)
            .vtep_cidr("100.65.0.0/24")
            .nic("eth1")
            .neighbors(neighbors)
            .build()
            .unwrap()
    }

    fn vni(name: &str, vni: u32, cidr: &str) -> Vni {
        VniBuilder::default()
            .name(name)
            .asn(64514u32)
            .vni(vni)
            .vrf(name)
            .local_cidr(cidr)
            .vxlan_port(4789u16)
            .build()
            .unwrap()
    }

    fn plain_underlay() -> Underlay {
        underlay(vec![neighbor(64512, "192.168.11.2").build().unwrap()])
    }

    #[test]
    fn test_compile() {
        let config = compile(
            2,
            &[plain_underlay()],
            &[vni("red", 100, "192.169.10.0/24")],
            &ctx(),
        )
        .unwrap();
        assert_eq!(config.hostname, "node-0");
        assert_eq!(config.log_level, "informational");
        assert_eq!(config.underlay.asn, 64514);
        assert_eq!(config.underlay.vtep, "100.65.0.2/32".parse::<IpNet>().unwrap());
        assert_eq!(
            config.underlay.neighbors,
            [NeighborConfig::plain(64512, "192.168.11.2".parse().unwrap())]
        );
        assert_eq!(
            config.vnis,
            [VniConfig {
                asn: 64514,
                vni: 100,
                vrf: "red".to_string(),
                local_neighbor: NeighborConfig::plain(64514, "192.169.10.0".parse().unwrap()),
                to_advertise: vec!["192.169.10.0/32".parse().unwrap()],
            }]
        );
    }

    #[test]
    fn test_cardinality() {
        let vnis = [vni("red", 100, "192.169.10.0/24")];
        assert_eq!(
            compile(0, &[], &vnis, &ctx()),
            Err(ConfigError::NoUnderlay)
        );
        assert_eq!(
            ConfigError::NoUnderlay.to_string(),
            "Expected exactly one underlay, found 0"
        );
        assert_eq!(
            compile(0, &[plain_underlay(), plain_underlay()], &vnis, &ctx()),
            Err(ConfigError::TooManyInstances("Underlay", 2))
        );
        assert_eq!(
            compile(0, &[plain_underlay()], &[], &ctx()),
            Err(ConfigError::NoVnis)
        );
    }

    #[test]
    fn test_vnis_that_cannot_coexist() {
        let compile_vnis = |vnis: &[Vni]| compile(0, &[plain_underlay()], vnis, &ctx());
        assert_eq!(
            compile_vnis(&[
                vni("red", 100, "192.169.10.0/24"),
                vni("red", 200, "192.169.20.0/24")
            ]),
            Err(ConfigError::DuplicateVrf("red".to_string()))
        );
        assert_eq!(
            compile_vnis(&[
                vni("red", 100, "192.169.10.0/24"),
                vni("blue", 100, "192.169.20.0/24")
            ]),
            Err(ConfigError::DuplicateVni(100))
        );
        assert_eq!(
            compile_vnis(&[vni("red", 1 << 24, "192.169.10.0/24")]),
            Err(ConfigError::VniOutOfRange(1 << 24))
        );
        assert!(matches!(
            compile_vnis(&[vni("a-very-long-vrf", 100, "192.169.10.0/24")]),
            Err(ConfigError::VrfNameTooLong(name, _)) if name == "a-very-long-vrf"
        ));
    }

    #[test]
    fn test_neighbor_without_asn() {
        let n = neighbor(0, "192.168.11.2").build().unwrap();
        let result = compile(
            0,
            &[underlay(vec![n])],
            &[vni("red", 100, "192.169.10.0/24")],
            &ctx(),
        );
        assert_eq!(
            result,
            Err(ConfigError::MissingAsn("0@192.168.11.2".to_string()))
        );
    }

    #[test]
    fn test_dynamic_asn() {
        let n = neighbor(0, "192.168.11.2")
            .dynamic_asn(DynamicAsnMode::External)
            .build()
            .unwrap();
        let config = neighbor_config(&n, &BTreeMap::new()).unwrap();
        assert_eq!(config.remote_as, RemoteAs::External);
        assert_eq!(config.name, "external@192.168.11.2");

        let both = neighbor(64512, "192.168.11.2")
            .dynamic_asn(DynamicAsnMode::Internal)
            .build()
            .unwrap();
        assert!(matches!(
            neighbor_config(&both, &BTreeMap::new()),
            Err(ConfigError::ConflictingAsn(_))
        ));
    }

    #[test]
    fn test_invalid_address() {
        let n = neighbor(64512, "not-an-ip").build().unwrap();
        assert_eq!(
            neighbor_config(&n, &BTreeMap::new()),
            Err(ConfigError::InvalidAddress("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_timers() {
        let secs = Duration::from_secs;
        let name = "64512@10.0.0.1";
        assert_eq!(parse_timers(name, None, None), Ok((None, None)));
        assert_eq!(
            parse_timers(name, Some(secs(9)), None),
            Err(ConfigError::TimersMismatch(name.to_string()))
        );
        assert_eq!(
            parse_timers(name, None, Some(secs(3))),
            Err(ConfigError::TimersMismatch(name.to_string()))
        );
        assert_eq!(
            parse_timers(name, Some(secs(9)), Some(secs(10))),
            Err(ConfigError::KeepaliveExceedsHold(
                name.to_string(),
                secs(10),
                secs(9)
            ))
        );
        assert_eq!(
            parse_timers(name, Some(Duration::from_millis(2500)), Some(secs(1))),
            Err(ConfigError::InvalidHoldTime(
                name.to_string(),
                Duration::from_millis(2500)
            ))
        );
        /* below one second rounds down to zero, which disables keepalives */
        assert_eq!(
            parse_timers(
                name,
                Some(Duration::from_millis(900)),
                Some(Duration::from_millis(300))
            ),
            Ok((Some(0), Some(0)))
        );
        assert_eq!(
            parse_timers(name, Some(Duration::from_millis(9500)), Some(secs(3))),
            Ok((Some(9), Some(3)))
        );
    }

    #[test]
    fn test_neighbor_options_pass_through() {
        let n = neighbor(64512, "fd00::2")
            .port(Some(1790u16))
            .hold_time(Some(Duration::from_secs(90)))
            .keepalive_time(Some(Duration::from_secs(30)))
            .connect_time(Some(Duration::from_millis(5500)))
            .ebgp_multi_hop(true)
            .bfd_profile(Some("fast".to_string()))
            .password_secret(Some("bgp-pass".to_string()))
            .build()
            .unwrap();
        let config = neighbor_config(&n, &ctx().secrets).unwrap();
        assert_eq!(config.ip_family, IpFamily::Ipv6);
        assert_eq!(config.port, Some(1790));
        assert_eq!(config.hold_time, Some(90));
        assert_eq!(config.keepalive_time, Some(30));
        assert_eq!(config.connect_time, Some(5));
        assert!(config.ebgp_multihop);
        assert_eq!(config.bfd_profile.as_deref(), Some("fast"));
        assert_eq!(config.password.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_passwords() {
        let secrets = ctx().secrets;
        let literal = neighbor(64512, "10.0.0.1")
            .password(Some("plain".to_string()))
            .build()
            .unwrap();
        assert_eq!(
            neighbor_config(&literal, &secrets).unwrap().password.as_deref(),
            Some("plain")
        );

        let both = neighbor(64512, "10.0.0.1")
            .password(Some("plain".to_string()))
            .password_secret(Some("bgp-pass".to_string()))
            .build()
            .unwrap();
        assert_eq!(
            neighbor_config(&both, &secrets),
            Err(ConfigError::ConflictingPassword("64512@10.0.0.1".to_string()))
        );

        let missing = neighbor(64512, "10.0.0.1")
            .password_secret(Some("nope".to_string()))
            .build()
            .unwrap();
        assert_eq!(
            neighbor_config(&missing, &secrets),
            Err(ConfigError::MissingSecret(
                "64512@10.0.0.1".to_string(),
                "nope".to_string()
            ))
        );
    }

    #[test]
    fn test_bad_pool() {
        let result = compile(
            0,
            &[plain_underlay()],
            &[vni("red", 100, "not-a-cidr")],
            &ctx(),
        );
        assert!(matches!(result, Err(ConfigError::Ipam(name, _)) if name == "red"));
    }
}
