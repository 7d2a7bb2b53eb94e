//! Allocator behaviour seen from outside the crate

use super::common::*;
use cluster_assistant::allocator::{allocate, Subnet};
use cluster_assistant_sdk::{NodeRole, StageError};
use proptest::prelude::*;
use std::collections::HashSet;
use std::net::IpAddr;

// ============================================================================
// Fixed cases
// ============================================================================

#[test]
fn test_five_nodes_in_slash_16() {
    let allocations = allocate(&console_ips(5), "10.0.0.0/16", "ocp.example.com").unwrap();

    let addresses: Vec<&str> = allocations.iter().map(|a| a.allocated_ip.as_str()).collect();
    assert_eq!(
        addresses,
        vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]
    );

    let hostnames: Vec<&str> = allocations.iter().map(|a| a.hostname.as_str()).collect();
    assert_eq!(
        hostnames,
        vec!["master-00", "master-01", "master-02", "worker-00", "worker-01"]
    );
    assert_eq!(allocations[3].fqdn, "worker-00.ocp.example.com");
    assert_eq!(allocations[4].console_ip, "192.168.100.14");
}

#[test]
fn test_slash_30_cannot_hold_four_nodes() {
    let err = allocate(&console_ips(4), "10.0.0.0/30", "ocp.example.com").unwrap_err();
    assert_eq!(err.kind(), "allocation_error");
    assert_eq!(
        err,
        StageError::Allocation {
            subnet: "10.0.0.0/30".to_string(),
            requested: 4,
            available: 2,
        }
    );
}

#[test]
fn test_malformed_subnet() {
    let err = allocate(&console_ips(1), "not-a-subnet", "ocp.example.com").unwrap_err();
    assert_eq!(err.kind(), "subnet_error");
}

#[test]
fn test_ipv6_subnet() {
    let allocations = allocate(&console_ips(2), "fd00::/120", "v6.example.com").unwrap();
    assert_eq!(allocations[0].allocated_ip, "fd00::1");
    assert_eq!(allocations[1].allocated_ip, "fd00::2");
}

#[test]
fn test_small_cluster_is_all_masters() {
    let allocations = allocate(&console_ips(2), "172.16.0.0/24", "c.example.com").unwrap();
    assert!(allocations.iter().all(|a| a.role == NodeRole::Master));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn allocation_fits_or_fails_cleanly(
        second_octet in 0u8..=255,
        prefix in 20u8..=29,
        count in 1usize..=40,
    ) {
        let cidr = format!("10.{}.0.0/{}", second_octet, prefix);
        let usable = (1usize << (32 - prefix)) - 2;
        let result = allocate(&console_ips(count), &cidr, "prop.example.com");

        if count > usable {
            prop_assert_eq!(result.unwrap_err().kind(), "allocation_error");
        } else {
            let allocations = result.unwrap();
            let subnet = Subnet::parse(&cidr).unwrap();
            prop_assert_eq!(allocations.len(), count);

            let mut seen = HashSet::new();
            for (index, allocation) in allocations.iter().enumerate() {
                let address: IpAddr = allocation.allocated_ip.parse().unwrap();
                prop_assert_eq!(Some(address), subnet.host(index as u128));
                prop_assert!(address != subnet.network());
                prop_assert!(seen.insert(address));

                let (expected_role, expected_ordinal) = if index < 3 {
                    (NodeRole::Master, index)
                } else {
                    (NodeRole::Worker, index - 3)
                };
                prop_assert_eq!(allocation.role, expected_role);
                prop_assert_eq!(allocation.ordinal, expected_ordinal);
                prop_assert_eq!(
                    &allocation.hostname,
                    &format!("{}-{:02}", allocation.role, allocation.ordinal)
                );
                prop_assert!(allocation.fqdn.ends_with(".prop.example.com"));
            }
        }
    }

    #[test]
    fn allocation_is_deterministic(count in 1usize..=20) {
        let first = allocate(&console_ips(count), "192.168.0.0/24", "d.example.com").unwrap();
        let second = allocate(&console_ips(count), "192.168.0.0/24", "d.example.com").unwrap();
        prop_assert_eq!(first, second);
    }
}
