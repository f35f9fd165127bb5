//! The multi-tier containerized content-management stack.
//!
//! Encryption key, asset bucket, network with one private subnet per zone,
//! serverless SQL cluster behind its log destination, shared filesystem,
//! web + app containers with autoscaling, a closed load-balancer listener
//! admitting only the operator's address, and a bastion host peered with
//! the private tiers.

use std::collections::BTreeMap;

use crate::config::StackParams;

use super::cidr::{allocate_per_zone, CidrBlock};
use super::graph::{Bootstrap, GrantAction, Output, ResourceGraph};
use super::resources::*;
use super::StackResult;

/// Extra bits carved off the network prefix for each zone subnet, giving
/// one /24 per zone out of a /16 parent.
const SUBNET_NEW_BITS: u8 = 8;
const LOG_RETENTION_DAYS: u32 = 7;

/// Assemble the full content-management topology for the given zones.
pub fn content_stack(params: &StackParams, zones: &[String]) -> StackResult<ResourceGraph> {
    let q = &params.qualifier;
    let mut graph = ResourceGraph::new(format!("{}-content", q));
    graph.set_bootstrap(Bootstrap {
        qualifier: params.deploy_qualifier.clone(),
        bucket: params.deploy_bucket.clone(),
    });

    let key_id = format!("{}-key", q);
    graph.add(
        &key_id,
        Resource::EncryptionKey(EncryptionKey {
            alias: q.clone(),
            description: format!("Content stack {}", q),
            rotation_enabled: true,
            deletion_grace_days: 7,
        }),
    )?;
    graph.output(Output::attr("KeyArn", "Encryption key ARN", &key_id, "arn"));

    let bucket_id = format!("{}-assets", q);
    graph.add(
        &bucket_id,
        Resource::ObjectStore(ObjectStore {
            name: q.clone(),
            access_policy: AccessPolicy::Private,
            encryption_key: key_id.clone(),
            enforce_ssl: true,
            versioned: false,
        }),
    )?;
    graph.output(Output::attr("AssetBucket", "Asset bucket name", &bucket_id, "name"));

    let network_id = format!("{}-network", q);
    let subnets: Vec<Subnet> = allocate_per_zone(&params.network_cidr, SUBNET_NEW_BITS, zones)?
        .into_iter()
        .map(|(zone, cidr)| Subnet {
            id: format!("{}-private-{}", q, zone),
            availability_zone: zone,
            cidr,
            public: false,
        })
        .collect();
    let private_subnet_ids: Vec<String> = subnets.iter().map(|s| s.id.clone()).collect();
    graph.add(
        &network_id,
        Resource::Network(Network {
            cidr: params.network_cidr,
            subnets,
        }),
    )?;
    graph.output(Output::attr("NetworkId", "Network identifier", &network_id, "id"));

    let db_logs_id = format!("{}-db-logs", q);
    graph.add(
        &db_logs_id,
        Resource::LogGroup(LogGroup {
            name: format!("/managed/db/{}/error", q),
            retention_days: LOG_RETENTION_DAYS,
            encryption_key: key_id.clone(),
        }),
    )?;

    let db_id = format!("{}-db", q);
    let db_secret = format!("{}DbSecret", q);
    graph.add(
        &db_id,
        Resource::Database(Database {
            engine: "aurora-mysql".to_string(),
            cluster_identifier: format!("{}-serverless-db", q),
            default_database: format!("{}DB", q),
            credentials_secret: db_secret.clone(),
            username: params.db_user.clone(),
            scaling: DatabaseScaling {
                min_capacity: 1,
                max_capacity: 4,
                auto_pause_minutes: 10,
            },
            backup_retention_days: 7,
            deletion_protection: true,
            subnets: private_subnet_ids.clone(),
            encryption_key: key_id.clone(),
        }),
    )?;
    // The engine cannot infer that the cluster's error log destination has
    // to exist before the cluster does.
    graph.depends_on(&db_id, &db_logs_id)?;
    graph.output(Output::attr("DbClusterName", "Database cluster name", &db_id, "cluster_identifier"));
    graph.output(Output::attr("DbEndpoint", "Database endpoint hostname", &db_id, "endpoint"));
    graph.output(Output::attr("DbSecretPath", "Database credentials secret", &db_id, "secret_name"));

    let fs_id = format!("{}-fs", q);
    graph.add(
        &fs_id,
        Resource::SharedFilesystem(SharedFilesystem {
            performance_mode: PerformanceMode::GeneralPurpose,
            throughput_mode: ThroughputMode::Bursting,
            access_point: format!("{}-content-root", q),
            mount_policy: MountPolicy {
                actions: vec![
                    "filesystem:ClientWrite".to_string(),
                    "filesystem:ClientMount".to_string(),
                    "filesystem:DescribeMountTargets".to_string(),
                ],
                require_mount_target: true,
                source_account: params.account_id.clone(),
            },
            subnets: private_subnet_ids,
            encryption_key: key_id.clone(),
        }),
    )?;

    let exec_logs_id = format!("{}-exec-logs", q);
    graph.add(
        &exec_logs_id,
        Resource::LogGroup(LogGroup {
            name: format!("{}-cluster-exec", q),
            retention_days: LOG_RETENTION_DAYS,
            encryption_key: key_id.clone(),
        }),
    )?;
    let app_logs_id = format!("{}-app-logs", q);
    graph.add(
        &app_logs_id,
        Resource::LogGroup(LogGroup {
            name: q.clone(),
            retention_days: LOG_RETENTION_DAYS,
            encryption_key: key_id.clone(),
        }),
    )?;

    let volume_name = format!("{}-content-root", q);
    let service_id = format!("{}-service", q);
    graph.add(
        &service_id,
        Resource::ComputeService(ComputeService {
            cluster_name: format!("{}-compute", q),
            task_role: format!("{}ContentTaskRole", q),
            exec_log_group: exec_logs_id.clone(),
            app_log_group: app_logs_id.clone(),
            containers: vec![
                Container {
                    name: "web".to_string(),
                    image: format!("{}-web", q),
                    port_mappings: vec![PortMapping { container_port: 80 }],
                    environment: BTreeMap::new(),
                    secrets: Vec::new(),
                    mount_points: vec![MountPoint {
                        container_path: "/var/www/html".to_string(),
                        source_volume: volume_name.clone(),
                        read_only: true,
                    }],
                    log_stream_prefix: "web".to_string(),
                },
                Container {
                    name: "app".to_string(),
                    image: format!("{}-app", q),
                    port_mappings: vec![PortMapping {
                        container_port: 9000,
                    }],
                    environment: BTreeMap::from([
                        ("DB_HOST".to_string(), format!("${{{}.endpoint}}", db_id)),
                        ("TABLE_PREFIX".to_string(), "app_".to_string()),
                    ]),
                    secrets: vec![
                        SecretRef {
                            env_name: "DB_USER".to_string(),
                            secret_name: db_secret.clone(),
                            field: "username".to_string(),
                        },
                        SecretRef {
                            env_name: "DB_PASSWORD".to_string(),
                            secret_name: db_secret.clone(),
                            field: "password".to_string(),
                        },
                        SecretRef {
                            env_name: "DB_NAME".to_string(),
                            secret_name: db_secret,
                            field: "dbname".to_string(),
                        },
                    ],
                    mount_points: vec![MountPoint {
                        container_path: "/var/www/html".to_string(),
                        source_volume: volume_name.clone(),
                        read_only: false,
                    }],
                    log_stream_prefix: "app".to_string(),
                },
            ],
            volumes: vec![Volume {
                name: volume_name,
                filesystem: fs_id.clone(),
                transit_encryption: true,
                iam_auth: true,
            }],
            autoscaling: AutoScaling {
                min_capacity: 1,
                max_capacity: 5,
                target_cpu_percent: 85,
                scale_in_cooldown_secs: 120,
                scale_out_cooldown_secs: 30,
            },
            assign_public_ip: true,
        }),
    )?;
    graph.depends_on(&service_id, &db_id)?;
    graph.depends_on(&service_id, &fs_id)?;

    let lb_id = format!("{}-lb", q);
    graph.add(
        &lb_id,
        Resource::LoadBalancer(LoadBalancer {
            internet_facing: true,
            listener: Listener {
                port: 80,
                open: false,
                health_check: HealthCheck {
                    healthy_http_codes: "200,301,302".to_string(),
                },
                ingress: vec![IngressRule {
                    description: "Internet access from the operator address".to_string(),
                    source_cidr: CidrBlock::host(params.operator_ipv4),
                    port: 80,
                }],
                forward_to: service_id.clone(),
            },
        }),
    )?;
    graph.output(Output::attr("ExternalDnsName", "Public entry point DNS name", &lb_id, "dns_name"));

    let bastion_id = format!("{}-bastion", q);
    graph.add(
        &bastion_id,
        Resource::BastionHost(BastionHost {
            instance_type: "t3.micro".to_string(),
            attached_policies: vec![
                "ManagedInstanceCore".to_string(),
                "PatchAssociation".to_string(),
            ],
            user_data: vec![
                "yum install -y filesystem-utils nfs-utils".to_string(),
                "mkdir -p /mnt/fs1".to_string(),
                format!("mount -t fs ${{{}.id}}:/ /mnt/fs1", fs_id),
            ],
        }),
    )?;

    // Cross-resource grants: who may read, write and decrypt what.
    graph.grant(&service_id, &key_id, &[GrantAction::Encrypt, GrantAction::Decrypt]);
    graph.grant(&service_id, &bucket_id, &[GrantAction::Read, GrantAction::Write]);
    graph.grant(&service_id, &fs_id, &[GrantAction::Read, GrantAction::Write, GrantAction::Mount]);
    graph.grant(&service_id, &db_id, &[GrantAction::Read, GrantAction::Write]);
    graph.grant(&bastion_id, &key_id, &[GrantAction::Encrypt, GrantAction::Decrypt]);
    graph.grant(&bastion_id, &bucket_id, &[GrantAction::Read, GrantAction::Write]);
    graph.grant(&bastion_id, &fs_id, &[GrantAction::Read, GrantAction::Write, GrantAction::Mount]);
    graph.grant(&bastion_id, &db_id, &[GrantAction::Read, GrantAction::Write]);

    Ok(graph)
}
