//! Shared value types for the construct domain.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry values
//! with invariants (ports are non-zero, capacity bounds are ordered, percentages
//! are in `(0, 100]`). They deserialize through `TryFrom`, so an out-of-range
//! value in a configuration file is rejected while parsing rather than when
//! a resource is declared.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Networking
// ---------------------------------------------------------------------------

/// A TCP port in `1..=65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Creates a [`Port`], returning `None` for port zero.
    pub fn new(port: u16) -> Option<Self> {
        if port == 0 {
            None
        } else {
            Some(Self(port))
        }
    }

    /// Returns the port number.
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Port {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "port must be in 1..=65535".to_owned())
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport/application protocol used by listeners and health probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Http,
    Https,
}

impl Protocol {
    /// Returns the canonical upper-case name (`"HTTP"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }
}

/// Kind of DNS record published for the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    #[default]
    Cname,
}

impl DnsRecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Cname => "CNAME",
        }
    }
}

// ---------------------------------------------------------------------------
// Health probing
// ---------------------------------------------------------------------------

/// Port a health probe connects to.
///
/// `TrafficPort` follows the service's published port. `Fixed` pins a
/// separate port, for example a sidecar health endpoint. There is no default:
/// every configuration names one or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePort {
    TrafficPort,
    Fixed(Port),
}

impl ProbePort {
    /// Resolves the probe port against the service's published port.
    pub fn resolve(self, traffic: Port) -> Port {
        match self {
            Self::TrafficPort => traffic,
            Self::Fixed(port) => port,
        }
    }
}

/// Health probe configured on the service's traffic target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHealthProbe")]
pub struct HealthProbe {
    path: String,
    protocol: Protocol,
    port: ProbePort,
    unhealthy_threshold: u32,
}

#[derive(Deserialize)]
struct RawHealthProbe {
    #[serde(default = "default_probe_path")]
    path: String,
    #[serde(default = "default_probe_protocol")]
    protocol: Protocol,
    port: ProbePort,
    #[serde(default = "default_unhealthy_threshold")]
    unhealthy_threshold: u32,
}

fn default_probe_path() -> String {
    "/".to_owned()
}

fn default_probe_protocol() -> Protocol {
    Protocol::Http
}

fn default_unhealthy_threshold() -> u32 {
    5
}

impl HealthProbe {
    /// Creates a probe. The path must be absolute and the threshold at least one.
    pub fn new(
        path: impl Into<String>,
        protocol: Protocol,
        port: ProbePort,
        unhealthy_threshold: u32,
    ) -> Result<Self, String> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(format!("health probe path '{path}' must start with '/'"));
        }
        if unhealthy_threshold == 0 {
            return Err("unhealthy threshold must be at least 1".to_owned());
        }
        Ok(Self {
            path,
            protocol,
            port,
            unhealthy_threshold,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn port(&self) -> ProbePort {
        self.port
    }

    pub fn unhealthy_threshold(&self) -> u32 {
        self.unhealthy_threshold
    }

    /// Probe on `/` over HTTP, unhealthy after five failures.
    pub fn root(port: ProbePort) -> Self {
        Self {
            path: default_probe_path(),
            protocol: default_probe_protocol(),
            port,
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

impl TryFrom<RawHealthProbe> for HealthProbe {
    type Error = String;

    fn try_from(raw: RawHealthProbe) -> Result<Self, Self::Error> {
        Self::new(raw.path, raw.protocol, raw.port, raw.unhealthy_threshold)
    }
}

// ---------------------------------------------------------------------------
// Autoscaling
// ---------------------------------------------------------------------------

/// Task-count bounds for autoscaling. Invariant: `1 <= min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCapacityBounds")]
pub struct CapacityBounds {
    min: u32,
    max: u32,
}

#[derive(Deserialize)]
struct RawCapacityBounds {
    min: u32,
    max: u32,
}

impl CapacityBounds {
    pub fn new(min: u32, max: u32) -> Option<Self> {
        if min >= 1 && min <= max {
            Some(Self { min, max })
        } else {
            None
        }
    }

    pub fn min(self) -> u32 {
        self.min
    }

    pub fn max(self) -> u32 {
        self.max
    }
}

impl Default for CapacityBounds {
    fn default() -> Self {
        Self { min: 1, max: 3 }
    }
}

impl TryFrom<RawCapacityBounds> for CapacityBounds {
    type Error = String;

    fn try_from(raw: RawCapacityBounds) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
            .ok_or_else(|| format!("capacity bounds [{}, {}] must satisfy 1 <= min <= max", raw.min, raw.max))
    }
}

/// A utilisation target in `(0, 100]` percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub fn new(value: u8) -> Option<Self> {
        if (1..=100).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Percent {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("percentage {value} must be in 1..=100"))
    }
}

impl From<Percent> for u8 {
    fn from(p: Percent) -> Self {
        p.0
    }
}

impl std::fmt::Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// CPU-utilisation target tracking with separate cooldowns for each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CpuScaling {
    pub target: Percent,
    #[serde(with = "seconds")]
    pub scale_in_cooldown: Duration,
    #[serde(with = "seconds")]
    pub scale_out_cooldown: Duration,
}

impl Default for CpuScaling {
    fn default() -> Self {
        Self {
            target: Percent(50),
            scale_in_cooldown: Duration::from_secs(60),
            scale_out_cooldown: Duration::from_secs(60),
        }
    }
}

/// Serde adapter for durations expressed as whole seconds.
pub mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Build settings
// ---------------------------------------------------------------------------

/// Local cache mode for the build project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalCacheMode {
    #[default]
    DockerLayer,
    Source,
    Custom,
}

impl LocalCacheMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DockerLayer => "LOCAL_DOCKER_LAYER_CACHE",
            Self::Source => "LOCAL_SOURCE_CACHE",
            Self::Custom => "LOCAL_CUSTOM_CACHE",
        }
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

/// Reference to a pre-issued TLS certificate.
///
/// Accepted shape: `arn:<partition>:acm:<region>:<account>:certificate/<id>`.
/// Only the shape is checked; the certificate itself is never looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertificateArn(String);

impl CertificateArn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CertificateArn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("malformed certificate ARN '{s}'");
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        let [prefix, partition, service, region, account, resource] = parts.as_slice() else {
            return Err(malformed());
        };
        let id = resource.strip_prefix("certificate/").unwrap_or_default();
        if *prefix != "arn"
            || partition.is_empty()
            || *service != "acm"
            || region.is_empty()
            || account.is_empty()
            || id.is_empty()
        {
            return Err(malformed());
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for CertificateArn {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CertificateArn> for String {
    fn from(arn: CertificateArn) -> Self {
        arn.0
    }
}

// ---------------------------------------------------------------------------
// Registry permissions
// ---------------------------------------------------------------------------

/// Level of access a principal is granted on an image registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryAccess {
    Pull,
    Push,
}

impl RegistryAccess {
    /// Registry API actions this access level permits.
    pub fn actions(self) -> &'static [&'static str] {
        match self {
            Self::Pull => &[
                "ecr:BatchCheckLayerAvailability",
                "ecr:GetDownloadUrlForLayer",
                "ecr:BatchGetImage",
            ],
            Self::Push => &[
                "ecr:PutImage",
                "ecr:InitiateLayerUpload",
                "ecr:UploadLayerPart",
                "ecr:CompleteLayerUpload",
            ],
        }
    }
}
