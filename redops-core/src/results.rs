//! Read-side projections over finished scans.
//!
//! Pure functions: the HTTP layer fetches the rows and aggregates, these
//! shape them. Grouping and relevance rules live here so they can be tested
//! without a database.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use redops_model::{HostSummary, ResultEntry, ResultsTree, ScanRef, Severity};

use crate::db::{CompletedTaskRow, SeverityCount};

/// Catch-all bucket for workflow runs and non-address targets.
pub const GLOBAL_GROUP: &str = "Global / Workflows";
/// Bucket for IPv6 targets, which are not folded into /24 groups.
pub const IPV6_GROUP: &str = "IPv6";

/// Group key for a task target: IPv4 addresses fold into their /24, CIDR
/// targets group under the literal network, IPv6 and everything else land
/// in fixed buckets.
pub fn group_for_target(target: &str) -> String {
    if let Ok(addr) = target.parse::<IpAddr>() {
        return match addr {
            IpAddr::V4(v4) => {
                let [a, b, c, _] = v4.octets();
                format!("{a}.{b}.{c}.0/24")
            }
            IpAddr::V6(_) => IPV6_GROUP.to_string(),
        };
    }
    if target.contains('/') && target.parse::<IpNetwork>().is_ok() {
        return target.to_string();
    }
    GLOBAL_GROUP.to_string()
}

/// Arrange completed tasks as group → target → entries, preserving the
/// newest-first row order within each target.
pub fn results_tree(rows: &[CompletedTaskRow]) -> ResultsTree {
    let mut tree = ResultsTree::new();
    for row in rows {
        tree.entry(group_for_target(&row.target))
            .or_default()
            .entry(row.target.clone())
            .or_default()
            .push(ResultEntry {
                id: row.id,
                module: row.module_name.clone(),
                date: row.date.clone(),
                has_log: row.has_content,
            });
    }
    tree
}

/// Whether a scan of `target` is relevant to `host`: exact address match or
/// a CIDR target containing the host.
fn scan_covers(target: &str, host: IpAddr) -> bool {
    if let Ok(addr) = target.parse::<IpAddr>() {
        return addr == host;
    }
    if let Ok(network) = target.parse::<IpNetwork>() {
        return network.contains(host);
    }
    false
}

/// Per-host rollups: severity counts, the highest severity present, and the
/// scans that covered the host. Hosts sort by address.
pub fn host_summaries(
    ips: &[String],
    counts: &[SeverityCount],
    rows: &[CompletedTaskRow],
) -> Vec<HostSummary> {
    let mut by_host: BTreeMap<&str, (BTreeMap<String, i64>, Option<Severity>)> =
        BTreeMap::new();
    for count in counts {
        let entry = by_host.entry(count.host_ip.as_str()).or_default();
        *entry.0.entry(count.severity.as_str().to_string()).or_insert(0) +=
            count.count;
        entry.1 = entry.1.max(Some(count.severity));
    }

    let mut summaries: Vec<HostSummary> = ips
        .iter()
        .map(|ip| {
            let (counts, highest) =
                by_host.get(ip.as_str()).cloned().unwrap_or_default();
            let scans = match ip.parse::<IpAddr>() {
                Ok(addr) => rows
                    .iter()
                    .filter(|row| scan_covers(&row.target, addr))
                    .map(|row| ScanRef {
                        task_id: row.id,
                        module: row.module_name.clone(),
                        date: row.date.clone(),
                    })
                    .collect(),
                Err(_) => Vec::new(),
            };
            HostSummary {
                ip: ip.clone(),
                counts,
                highest,
                scans,
            }
        })
        .collect();

    summaries.sort_by_key(|s| s.ip.parse::<IpAddr>().ok());
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i32, target: &str) -> CompletedTaskRow {
        CompletedTaskRow {
            id,
            module_name: "Nmap Full".into(),
            target: target.into(),
            date: "2026-08-30 10:00".into(),
            has_content: true,
        }
    }

    #[test]
    fn addresses_fold_into_their_slash24() {
        assert_eq!(group_for_target("192.168.1.5"), "192.168.1.0/24");
        assert_eq!(group_for_target("192.168.1.9"), "192.168.1.0/24");
        assert_eq!(group_for_target("10.0.0.0/24"), "10.0.0.0/24");
        assert_eq!(group_for_target("2001:db8::1"), IPV6_GROUP);
        assert_eq!(group_for_target("Workflow"), GLOBAL_GROUP);
        assert_eq!(group_for_target("dc01.corp.local"), GLOBAL_GROUP);
    }

    #[test]
    fn tree_groups_targets_and_keeps_row_order() {
        let rows = vec![
            row(3, "192.168.1.5"),
            row(2, "192.168.1.5"),
            row(1, "192.168.1.9"),
            row(4, "Workflow"),
        ];

        let tree = results_tree(&rows);
        let subnet = &tree["192.168.1.0/24"];
        assert_eq!(subnet.len(), 2);
        let entries: Vec<i32> = subnet["192.168.1.5"].iter().map(|e| e.id).collect();
        assert_eq!(entries, vec![3, 2]);
        assert!(tree[GLOBAL_GROUP].contains_key("Workflow"));
    }

    #[test]
    fn host_summary_picks_highest_and_covering_scans() {
        let ips = vec!["192.168.1.5".to_string(), "192.168.1.200".to_string()];
        let counts = vec![
            SeverityCount {
                host_ip: "192.168.1.5".into(),
                severity: Severity::Medium,
                count: 2,
            },
            SeverityCount {
                host_ip: "192.168.1.5".into(),
                severity: Severity::Critical,
                count: 1,
            },
        ];
        let rows = vec![row(1, "192.168.1.5"), row(2, "192.168.1.0/24"), row(3, "10.0.0.1")];

        let summaries = host_summaries(&ips, &counts, &rows);
        assert_eq!(summaries.len(), 2);

        let first = &summaries[0];
        assert_eq!(first.ip, "192.168.1.5");
        assert_eq!(first.highest, Some(Severity::Critical));
        assert_eq!(first.counts["MEDIUM"], 2);
        assert_eq!(first.scans.len(), 2);

        let second = &summaries[1];
        assert_eq!(second.highest, None);
        assert_eq!(second.scans.len(), 1);
        assert_eq!(second.scans[0].task_id, 2);
    }
}
