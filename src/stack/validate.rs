//! Whole-graph invariant checks.
//!
//! Violations are collected and reported together rather than one at a
//! time, so a single run shows everything a bad topology got wrong.

use std::collections::{BTreeMap, BTreeSet};

use super::graph::ResourceGraph;
use super::resources::{Resource, Subnet};
use super::{StackError, StackResult};

/// Validate a finished graph against the topology invariants:
///
/// - every encrypted resource references the stack's single encryption key;
/// - database and shared filesystem live in private subnets only;
/// - subnet blocks are disjoint and inside the parent network range;
/// - the listener is closed by default and carries at least one explicit
///   ingress rule before it may forward to compute;
/// - at most one administrative ingress CIDR, and it is a single host;
/// - dependency edges point at existing nodes and form no cycle;
/// - grants and forwarding targets reference existing nodes.
pub fn validate_graph(graph: &ResourceGraph) -> StackResult<()> {
    let mut violations = Vec::new();

    let key_id = graph.encryption_key_id();
    let networks: BTreeMap<&str, &super::resources::Network> = graph
        .nodes()
        .filter_map(|(id, node)| match &node.resource {
            Resource::Network(n) => Some((id.as_str(), n)),
            _ => None,
        })
        .collect();
    let mut subnet_index: BTreeMap<&str, &Subnet> = BTreeMap::new();
    for subnet in networks.values().flat_map(|n| n.subnets.iter()) {
        if subnet_index.insert(subnet.id.as_str(), subnet).is_some() {
            violations.push(format!("duplicate subnet id '{}'", subnet.id));
        }
    }

    for (id, node) in graph.nodes() {
        if let Some(key_ref) = node.resource.encryption_key_ref() {
            match key_id {
                Some(key) if key_ref == key => {}
                Some(key) => violations.push(format!(
                    "resource '{}' references encryption key '{}', stack key is '{}'",
                    id, key_ref, key
                )),
                None => violations.push(format!(
                    "resource '{}' references encryption key '{}' but the stack has none",
                    id, key_ref
                )),
            }
        }

        for subnet_ref in node.resource.subnet_refs() {
            match subnet_index.get(subnet_ref.as_str()) {
                Some(subnet) if subnet.public => violations.push(format!(
                    "resource '{}' must live in private subnets, '{}' is public",
                    id, subnet_ref
                )),
                Some(_) => {}
                None => violations.push(format!(
                    "resource '{}' references unknown subnet '{}'",
                    id, subnet_ref
                )),
            }
        }

        match &node.resource {
            Resource::Network(network) => {
                for subnet in &network.subnets {
                    if !network.cidr.contains(&subnet.cidr) {
                        violations.push(format!(
                            "subnet '{}' ({}) is outside the network range {}",
                            subnet.id, subnet.cidr, network.cidr
                        ));
                    }
                }
                for (i, a) in network.subnets.iter().enumerate() {
                    for b in network.subnets.iter().skip(i + 1) {
                        if a.cidr.overlaps(&b.cidr) {
                            violations.push(format!(
                                "subnet '{}' ({}) overlaps subnet '{}' ({})",
                                a.id, a.cidr, b.id, b.cidr
                            ));
                        }
                    }
                }
            }
            Resource::LoadBalancer(lb) => {
                let listener = &lb.listener;
                if listener.open {
                    violations.push(format!(
                        "listener on '{}' is open; traffic must only be admitted through explicit ingress rules",
                        id
                    ));
                }
                if listener.ingress.is_empty() {
                    violations.push(format!(
                        "listener on '{}' forwards to '{}' without any ingress rule attached",
                        id, listener.forward_to
                    ));
                }
                let admin_rules: Vec<_> = listener
                    .ingress
                    .iter()
                    .filter(|r| r.source_cidr.prefix() == 32)
                    .collect();
                if admin_rules.len() > 1 {
                    violations.push(format!(
                        "listener on '{}' has {} administrative ingress CIDRs, at most one is permitted",
                        id,
                        admin_rules.len()
                    ));
                }
                for rule in &listener.ingress {
                    if rule.source_cidr.prefix() != 32 {
                        violations.push(format!(
                            "listener on '{}' admits '{}'; only single-host (/32) ingress is permitted",
                            id, rule.source_cidr
                        ));
                    }
                }
                match graph.get(&listener.forward_to) {
                    Some(target) => {
                        if !matches!(target.resource, Resource::ComputeService(_)) {
                            violations.push(format!(
                                "listener on '{}' forwards to '{}' which is a {}, not a compute service",
                                id,
                                listener.forward_to,
                                target.resource.kind()
                            ));
                        }
                    }
                    None => violations.push(format!(
                        "listener on '{}' forwards to unknown resource '{}'",
                        id, listener.forward_to
                    )),
                }
            }
            Resource::ComputeService(service) => {
                for volume in &service.volumes {
                    if graph.get(&volume.filesystem).is_none() {
                        violations.push(format!(
                            "volume '{}' on '{}' references unknown filesystem '{}'",
                            volume.name, id, volume.filesystem
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    for grant in graph.grants() {
        if graph.get(&grant.grantee).is_none() {
            violations.push(format!("grant names unknown grantee '{}'", grant.grantee));
        }
        if graph.get(&grant.resource).is_none() {
            violations.push(format!("grant names unknown resource '{}'", grant.resource));
        }
    }

    if let Some(cycle) = find_cycle(graph) {
        violations.push(format!("dependency cycle through '{}'", cycle));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(StackError::Validation { violations })
    }
}

fn find_cycle(graph: &ResourceGraph) -> Option<String> {
    let mut done: BTreeSet<&str> = BTreeSet::new();
    for (id, _) in graph.nodes() {
        let mut path: Vec<&str> = Vec::new();
        if visit(graph, id, &mut path, &mut done) {
            return path.last().map(|s| s.to_string());
        }
    }
    None
}

fn visit<'a>(
    graph: &'a ResourceGraph,
    id: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> bool {
    if done.contains(id) {
        return false;
    }
    if path.contains(&id) {
        path.push(id);
        return true;
    }
    path.push(id);
    if let Some(node) = graph.get(id) {
        for dep in &node.depends_on {
            if visit(graph, dep, path, done) {
                return true;
            }
        }
    }
    path.pop();
    done.insert(id);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::cidr::CidrBlock;
    use crate::stack::graph::GrantAction;
    use crate::stack::resources::*;

    fn base_graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new("t");
        graph
            .add(
                "key",
                Resource::EncryptionKey(EncryptionKey {
                    alias: "t".into(),
                    description: "test".into(),
                    rotation_enabled: true,
                    deletion_grace_days: 7,
                }),
            )
            .unwrap();
        graph
            .add(
                "net",
                Resource::Network(Network {
                    cidr: CidrBlock::parse("172.31.0.0/16").unwrap(),
                    subnets: vec![
                        Subnet {
                            id: "priv-a".into(),
                            availability_zone: "a".into(),
                            cidr: CidrBlock::parse("172.31.255.0/24").unwrap(),
                            public: false,
                        },
                        Subnet {
                            id: "pub-a".into(),
                            availability_zone: "a".into(),
                            cidr: CidrBlock::parse("172.31.0.0/24").unwrap(),
                            public: true,
                        },
                    ],
                }),
            )
            .unwrap();
        graph
    }

    fn database(subnets: Vec<String>, key: &str) -> Resource {
        Resource::Database(Database {
            engine: "aurora-mysql".into(),
            cluster_identifier: "db".into(),
            default_database: "app".into(),
            credentials_secret: "db-secret".into(),
            username: "admin".into(),
            scaling: DatabaseScaling {
                min_capacity: 1,
                max_capacity: 4,
                auto_pause_minutes: 10,
            },
            backup_retention_days: 7,
            deletion_protection: true,
            subnets,
            encryption_key: key.into(),
        })
    }

    #[test]
    fn valid_graph_passes() {
        let mut graph = base_graph();
        graph.add("db", database(vec!["priv-a".into()], "key")).unwrap();
        graph.validate().unwrap();
    }

    #[test]
    fn foreign_key_reference_is_a_violation() {
        let mut graph = base_graph();
        graph
            .add("db", database(vec!["priv-a".into()], "other-key"))
            .unwrap();
        let err = graph.validate().unwrap_err();
        match err {
            StackError::Validation { violations } => {
                assert!(violations.iter().any(|v| v.contains("other-key")));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn database_in_public_subnet_is_a_violation() {
        let mut graph = base_graph();
        graph.add("db", database(vec!["pub-a".into()], "key")).unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn overlapping_subnets_are_a_violation() {
        let mut graph = ResourceGraph::new("t");
        graph
            .add(
                "net",
                Resource::Network(Network {
                    cidr: CidrBlock::parse("10.0.0.0/16").unwrap(),
                    subnets: vec![
                        Subnet {
                            id: "a".into(),
                            availability_zone: "a".into(),
                            cidr: CidrBlock::parse("10.0.1.0/24").unwrap(),
                            public: false,
                        },
                        Subnet {
                            id: "b".into(),
                            availability_zone: "b".into(),
                            cidr: CidrBlock::parse("10.0.1.0/25").unwrap(),
                            public: false,
                        },
                    ],
                }),
            )
            .unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn duplicate_subnet_ids_are_a_violation() {
        let mut graph = ResourceGraph::new("t");
        graph
            .add(
                "net",
                Resource::Network(Network {
                    cidr: CidrBlock::parse("10.0.0.0/16").unwrap(),
                    subnets: vec![
                        Subnet {
                            id: "a".into(),
                            availability_zone: "a".into(),
                            cidr: CidrBlock::parse("10.0.1.0/24").unwrap(),
                            public: false,
                        },
                        Subnet {
                            id: "a".into(),
                            availability_zone: "b".into(),
                            cidr: CidrBlock::parse("10.0.2.0/24").unwrap(),
                            public: false,
                        },
                    ],
                }),
            )
            .unwrap();
        let err = graph.validate().unwrap_err();
        match err {
            StackError::Validation { violations } => {
                assert!(violations.iter().any(|v| v.contains("duplicate subnet id")));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn subnet_outside_network_range_is_a_violation() {
        let mut graph = ResourceGraph::new("t");
        graph
            .add(
                "net",
                Resource::Network(Network {
                    cidr: CidrBlock::parse("10.0.0.0/16").unwrap(),
                    subnets: vec![Subnet {
                        id: "a".into(),
                        availability_zone: "a".into(),
                        cidr: CidrBlock::parse("192.168.0.0/24").unwrap(),
                        public: false,
                    }],
                }),
            )
            .unwrap();
        assert!(graph.validate().is_err());
    }

    fn listener(open: bool, ingress: Vec<IngressRule>) -> Resource {
        Resource::LoadBalancer(LoadBalancer {
            internet_facing: true,
            listener: Listener {
                port: 80,
                open,
                health_check: HealthCheck {
                    healthy_http_codes: "200,301,302".into(),
                },
                ingress,
                forward_to: "svc".into(),
            },
        })
    }

    fn service() -> Resource {
        Resource::ComputeService(ComputeService {
            cluster_name: "c".into(),
            task_role: "role".into(),
            exec_log_group: "exec".into(),
            app_log_group: "app".into(),
            containers: vec![],
            volumes: vec![],
            autoscaling: AutoScaling {
                min_capacity: 1,
                max_capacity: 5,
                target_cpu_percent: 85,
                scale_in_cooldown_secs: 120,
                scale_out_cooldown_secs: 30,
            },
            assign_public_ip: true,
        })
    }

    fn admin_rule(cidr: &str) -> IngressRule {
        IngressRule {
            description: "operator".into(),
            source_cidr: CidrBlock::parse(cidr).unwrap(),
            port: 80,
        }
    }

    #[test]
    fn closed_listener_with_one_admin_rule_passes() {
        let mut graph = base_graph();
        graph.add("svc", service()).unwrap();
        graph
            .add("lb", listener(false, vec![admin_rule("203.0.113.7/32")]))
            .unwrap();
        graph.validate().unwrap();
    }

    #[test]
    fn open_listener_is_a_violation() {
        let mut graph = base_graph();
        graph.add("svc", service()).unwrap();
        graph
            .add("lb", listener(true, vec![admin_rule("203.0.113.7/32")]))
            .unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn listener_without_ingress_rule_is_a_violation() {
        let mut graph = base_graph();
        graph.add("svc", service()).unwrap();
        graph.add("lb", listener(false, vec![])).unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn two_admin_cidrs_are_a_violation() {
        let mut graph = base_graph();
        graph.add("svc", service()).unwrap();
        graph
            .add(
                "lb",
                listener(
                    false,
                    vec![admin_rule("203.0.113.7/32"), admin_rule("203.0.113.8/32")],
                ),
            )
            .unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn wide_ingress_cidr_is_a_violation() {
        let mut graph = base_graph();
        graph.add("svc", service()).unwrap();
        graph
            .add("lb", listener(false, vec![admin_rule("203.0.113.0/24")]))
            .unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn dependency_cycle_is_a_violation() {
        let mut graph = base_graph();
        graph
            .add(
                "logs-a",
                Resource::LogGroup(LogGroup {
                    name: "a".into(),
                    retention_days: 7,
                    encryption_key: "key".into(),
                }),
            )
            .unwrap();
        graph
            .add(
                "logs-b",
                Resource::LogGroup(LogGroup {
                    name: "b".into(),
                    retention_days: 7,
                    encryption_key: "key".into(),
                }),
            )
            .unwrap();
        graph.depends_on("logs-a", "logs-b").unwrap();
        graph.depends_on("logs-b", "logs-a").unwrap();
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn grant_to_unknown_node_is_a_violation() {
        let mut graph = base_graph();
        graph.grant("ghost", "key", &[GrantAction::Decrypt]);
        assert!(graph.validate().is_err());
    }
}
