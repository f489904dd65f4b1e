//! Scenario file parser.
//!
//! A scenario bundles everything one solve needs: the provisioner's base
//! constraints and daemon overhead, the instance catalog, and the pending
//! pods. It is plain TOML:
//!
//! ```toml
//! [provisioner]
//! name = "default"
//! daemon_overhead = { cpu = "100m", memory = "128Mi" }
//!
//! [[provisioner.requirements]]
//! key = "kubernetes.io/arch"
//! operator = "In"
//! values = ["amd64"]
//!
//! [[instance_types]]
//! name = "m5.large"
//! price = 0.096
//! capacity = { cpu = "2", memory = "8Gi", pods = "29" }
//! labels = { "topology.kubernetes.io/zone" = ["us-east-1a"] }
//!
//! [[pods]]
//! name = "web-0"
//! requests = { cpu = "1", memory = "1Gi" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RequirementError};
use crate::instance::{InstanceType, LABEL_ARCH, LABEL_CAPACITY_TYPE, LABEL_ZONE, SharedShape, StaticCatalog};
use crate::pod::{PodId, PodRequest};
use crate::requirements::{Operator, Requirement, Requirements};
use crate::resources::ResourceList;

fn default_namespace() -> String {
    "default".to_string()
}

fn is_default_namespace(ns: &str) -> bool {
    ns == "default"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub provisioner: ProvisionerConfig,
    #[serde(default)]
    pub instance_types: Vec<InstanceTypeConfig>,
    #[serde(default)]
    pub pods: Vec<PodConfig>,
}

/// Base constraints and per-node reservations of one provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    pub name: String,
    /// Resources every node reserves for daemon workloads.
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub daemon_overhead: ResourceList,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<RequirementSpec>,
}

/// One `key operator values` term, as written in a node affinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub key: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTypeConfig {
    pub name: String,
    pub price: f64,
    pub capacity: ResourceList,
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub overhead: ResourceList,
    /// Label → values a node of this type may carry (e.g. every zone it is
    /// offered in).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<RequirementSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodConfig {
    #[serde(default = "default_namespace", skip_serializing_if = "is_default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub requests: ResourceList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Required node-affinity terms, plus any injected by topology spread.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affinity: Vec<RequirementSpec>,
}

impl RequirementSpec {
    pub fn new(key: impl Into<String>, operator: Operator, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn to_requirement(&self) -> Result<Requirement, RequirementError> {
        Requirement::new(self.key.clone(), self.operator, self.values.iter().cloned())
    }
}

fn to_requirements(specs: &[RequirementSpec]) -> Result<Vec<Requirement>, RequirementError> {
    specs.iter().map(RequirementSpec::to_requirement).collect()
}

impl ProvisionerConfig {
    /// The provisioner's base requirement set.
    pub fn constraints(&self) -> Result<Requirements, ConfigError> {
        to_requirements(&self.requirements)
            .and_then(Requirements::new)
            .map_err(|source| ConfigError::Requirement {
                context: format!("provisioner {}", self.name),
                source,
            })
    }
}

impl InstanceTypeConfig {
    pub fn to_instance_type(&self) -> Result<InstanceType, ConfigError> {
        let context = || format!("instance type {}", self.name);
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ConfigError::InvalidPrice {
                name: self.name.clone(),
                price: self.price,
            });
        }

        let mut requirements = Vec::with_capacity(self.labels.len() + self.requirements.len());
        for (key, values) in &self.labels {
            let requirement = Requirement::in_values(key.clone(), values.iter().cloned())
                .map_err(|source| ConfigError::Requirement { context: context(), source })?;
            requirements.push(requirement);
        }
        requirements.extend(
            to_requirements(&self.requirements)
                .map_err(|source| ConfigError::Requirement { context: context(), source })?,
        );

        InstanceType::new(self.name.clone(), self.capacity.clone(), self.price)
            .with_overhead(self.overhead.clone())
            .with_requirements(requirements)
            .map_err(|source| ConfigError::Requirement { context: context(), source })
    }
}

impl PodConfig {
    pub fn id(&self) -> PodId {
        PodId::new(self.namespace.clone(), self.name.clone())
    }

    pub fn to_pod_request(&self) -> Result<PodRequest, ConfigError> {
        let context = || format!("pod {}", self.id());
        let affinity = to_requirements(&self.affinity)
            .map_err(|source| ConfigError::Requirement { context: context(), source })?;
        PodRequest::from_selectors(self.id(), self.requests.clone(), &self.node_selector, affinity)
            .map_err(|source| ConfigError::Requirement { context: context(), source })
    }
}

impl ScenarioConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check names are unique and every requirement, price and label
    /// converts cleanly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for it in &self.instance_types {
            if !seen.insert(it.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "instance type",
                    name: it.name.clone(),
                });
            }
        }
        let mut seen = BTreeSet::new();
        for pod in &self.pods {
            if !seen.insert(pod.id()) {
                return Err(ConfigError::Duplicate {
                    kind: "pod",
                    name: pod.id().to_string(),
                });
            }
        }

        self.provisioner.constraints()?;
        self.instance_types()?;
        self.pod_requests()?;
        Ok(())
    }

    pub fn instance_types(&self) -> Result<Vec<SharedShape>, ConfigError> {
        self.instance_types
            .iter()
            .map(|it| it.to_instance_type().map(InstanceType::into_shared))
            .collect()
    }

    pub fn catalog(&self) -> Result<StaticCatalog, ConfigError> {
        Ok(StaticCatalog::new(self.instance_types()?))
    }

    pub fn pod_requests(&self) -> Result<Vec<PodRequest>, ConfigError> {
        self.pods.iter().map(PodConfig::to_pod_request).collect()
    }

    /// A small, self-contained scenario to start from.
    pub fn scaffold(provisioner: &str) -> Self {
        let resources = |pairs: &[(&str, &str)]| -> ResourceList {
            ResourceList::parse(pairs.iter().copied()).unwrap_or_default()
        };
        let instance_type = |name: &str, price: f64, cpu: &str, memory: &str, pods: &str| InstanceTypeConfig {
            name: name.to_string(),
            price,
            capacity: resources(&[("cpu", cpu), ("memory", memory), ("pods", pods)]),
            overhead: resources(&[("cpu", "80m"), ("memory", "512Mi")]),
            labels: BTreeMap::from([
                (LABEL_ARCH.to_string(), vec!["amd64".to_string()]),
                (LABEL_CAPACITY_TYPE.to_string(), vec!["on-demand".to_string()]),
                (LABEL_ZONE.to_string(), vec!["zone-a".to_string(), "zone-b".to_string()]),
            ]),
            requirements: Vec::new(),
        };

        ScenarioConfig {
            provisioner: ProvisionerConfig {
                name: provisioner.to_string(),
                daemon_overhead: resources(&[("cpu", "100m"), ("memory", "128Mi")]),
                requirements: vec![RequirementSpec::new(LABEL_ARCH, Operator::In, &["amd64"])],
            },
            instance_types: vec![
                instance_type("standard-2", 0.096, "2", "8Gi", "29"),
                instance_type("standard-4", 0.192, "4", "16Gi", "58"),
            ],
            pods: vec![PodConfig {
                namespace: default_namespace(),
                name: "web-0".to_string(),
                requests: resources(&[("cpu", "1"), ("memory", "1Gi")]),
                node_selector: BTreeMap::new(),
                affinity: Vec::new(),
            }],
        }
    }
}
