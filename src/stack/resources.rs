//! Typed resource descriptors for the deployment topology.
//!
//! These are pure data: the provisioning engine gives them meaning. Every
//! encrypted resource carries a reference to the logical id of the stack's
//! single encryption key; subnet and volume references are logical ids too,
//! resolved and checked by [`crate::stack::validate`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cidr::CidrBlock;

/// One resource descriptor. Serialized adjacently tagged so the deployment
/// template reads as `{"type": "...", "properties": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum Resource {
    Network(Network),
    EncryptionKey(EncryptionKey),
    ObjectStore(ObjectStore),
    LogGroup(LogGroup),
    Database(Database),
    SharedFilesystem(SharedFilesystem),
    ComputeService(ComputeService),
    LoadBalancer(LoadBalancer),
    BastionHost(BastionHost),
    Function(FunctionResource),
    HttpApi(HttpApi),
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Network(_) => "Network",
            Resource::EncryptionKey(_) => "EncryptionKey",
            Resource::ObjectStore(_) => "ObjectStore",
            Resource::LogGroup(_) => "LogGroup",
            Resource::Database(_) => "Database",
            Resource::SharedFilesystem(_) => "SharedFilesystem",
            Resource::ComputeService(_) => "ComputeService",
            Resource::LoadBalancer(_) => "LoadBalancer",
            Resource::BastionHost(_) => "BastionHost",
            Resource::Function(_) => "Function",
            Resource::HttpApi(_) => "HttpApi",
        }
    }

    /// The encryption-key reference this resource carries, if it is an
    /// encrypted resource.
    pub fn encryption_key_ref(&self) -> Option<&str> {
        match self {
            Resource::ObjectStore(s) => Some(&s.encryption_key),
            Resource::LogGroup(l) => Some(&l.encryption_key),
            Resource::Database(d) => Some(&d.encryption_key),
            Resource::SharedFilesystem(f) => Some(&f.encryption_key),
            _ => None,
        }
    }

    /// Logical subnet ids this resource must be placed in, if any.
    pub fn subnet_refs(&self) -> &[String] {
        match self {
            Resource::Database(d) => &d.subnets,
            Resource::SharedFilesystem(f) => &f.subnets,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub availability_zone: String,
    pub cidr: CidrBlock,
    pub public: bool,
}

/// Virtual network with its subnets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub cidr: CidrBlock,
    pub subnets: Vec<Subnet>,
}

impl Network {
    pub fn subnet(&self, id: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.id == id)
    }
}

/// Symmetric key for data at rest. One per stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionKey {
    pub alias: String,
    pub description: String,
    pub rotation_enabled: bool,
    pub deletion_grace_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    Private,
    PublicRead,
}

/// Bucket for static and media assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStore {
    pub name: String,
    pub access_policy: AccessPolicy,
    pub encryption_key: String,
    pub enforce_ssl: bool,
    pub versioned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogGroup {
    pub name: String,
    pub retention_days: u32,
    pub encryption_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseScaling {
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// Pause the cluster after this many idle minutes.
    pub auto_pause_minutes: u64,
}

/// Managed elastic SQL cluster. Lives in private subnets only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub engine: String,
    pub cluster_identifier: String,
    pub default_database: String,
    /// Name of the generated credentials secret; the username inside it.
    pub credentials_secret: String,
    pub username: String,
    pub scaling: DatabaseScaling,
    pub backup_retention_days: u32,
    pub deletion_protection: bool,
    pub subnets: Vec<String>,
    pub encryption_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    GeneralPurpose,
    MaxIo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThroughputMode {
    Bursting,
    Provisioned,
}

/// Policy attached to the filesystem: which actions are allowed, and only
/// through a mount target owned by the stack's account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountPolicy {
    pub actions: Vec<String>,
    pub require_mount_target: bool,
    pub source_account: String,
}

/// Network-attached POSIX volume, mounted by compute through an access point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedFilesystem {
    pub performance_mode: PerformanceMode,
    pub throughput_mode: ThroughputMode,
    pub access_point: String,
    pub mount_policy: MountPolicy,
    pub subnets: Vec<String>,
    pub encryption_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountPoint {
    pub container_path: String,
    pub source_volume: String,
    pub read_only: bool,
}

/// A container environment value sourced from a secret field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRef {
    pub env_name: String,
    pub secret_name: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<MountPoint>,
    pub log_stream_prefix: String,
}

/// A task volume backed by the shared filesystem's access point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub filesystem: String,
    pub transit_encryption: bool,
    pub iam_auth: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoScaling {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub target_cpu_percent: u32,
    pub scale_in_cooldown_secs: u64,
    pub scale_out_cooldown_secs: u64,
}

/// Containerized workload: cluster, task definition and service in one
/// descriptor, scaled by policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeService {
    pub cluster_name: String,
    pub task_role: String,
    pub exec_log_group: String,
    pub app_log_group: String,
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    pub autoscaling: AutoScaling,
    pub assign_public_ip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub healthy_http_codes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRule {
    pub description: String,
    pub source_cidr: CidrBlock,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub port: u16,
    /// When false the listener admits no traffic until an explicit ingress
    /// rule is attached.
    pub open: bool,
    pub health_check: HealthCheck,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<IngressRule>,
    /// Logical id of the compute service targets are forwarded to.
    pub forward_to: String,
}

/// Public entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub internet_facing: bool,
    pub listener: Listener,
}

/// Administrative access point, network peer of the private tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BastionHost {
    pub instance_type: String,
    pub attached_policies: Vec<String>,
    /// Boot commands, used to mount the shared filesystem.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_data: Vec<String>,
}

/// Serverless function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResource {
    pub function_name: String,
    pub runtime: String,
    pub handler: String,
    pub code_path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsPreflight {
    pub allow_methods: Vec<String>,
    pub allow_origins: Vec<String>,
    pub max_age_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRoute {
    pub path: String,
    pub method: String,
    /// Logical id of the function handling the route.
    pub integration: String,
}

/// HTTP API front for a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpApi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsPreflight>,
    pub routes: Vec<HttpRoute>,
}
