//! The resource graph: nodes, explicit ordering edges, grants and outputs.
//!
//! The graph is assembled once per deployment invocation and handed,
//! immutable, to the provisioning engine as a template document. The only
//! engine surface this code relies on afterwards is the named text outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resources::Resource;
use super::{StackError, StackResult};

/// What a grantee may do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantAction {
    Read,
    Write,
    Encrypt,
    Decrypt,
    Mount,
}

/// A cross-resource permission: `grantee` (a compute or bastion node) may
/// perform `actions` on `resource`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: String,
    pub resource: String,
    pub actions: Vec<GrantAction>,
}

/// A named value the engine materializes after provisioning and this code
/// reads back as text. The value is a `${node.attribute}` reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: String,
}

impl Output {
    /// An output referencing an attribute of a provisioned resource.
    pub fn attr(id: &str, description: &str, resource_id: &str, attribute: &str) -> Self {
        Self {
            id: id.to_string(),
            description: Some(description.to_string()),
            value: format!("${{{}.{}}}", resource_id, attribute),
        }
    }
}

/// The provisioning engine's own bootstrap: the qualifier and asset bucket
/// it stages deployment artifacts through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bootstrap {
    pub qualifier: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// In-memory tree of resource descriptors and their dependency edges.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    name: String,
    nodes: BTreeMap<String, Node>,
    grants: Vec<Grant>,
    outputs: Vec<Output>,
    encryption_key: Option<String>,
    bootstrap: Option<Bootstrap>,
}

impl ResourceGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: BTreeMap::new(),
            grants: Vec::new(),
            outputs: Vec::new(),
            encryption_key: None,
            bootstrap: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a resource under a logical id.
    ///
    /// A graph carries at most one encryption key; registering a second is
    /// an error, so every encrypted resource can only ever reference the one
    /// process-wide key.
    pub fn add(&mut self, id: impl Into<String>, resource: Resource) -> StackResult<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(StackError::DuplicateResource(id));
        }
        if matches!(resource, Resource::EncryptionKey(_)) {
            if let Some(existing) = &self.encryption_key {
                return Err(StackError::SecondEncryptionKey {
                    existing: existing.clone(),
                });
            }
            self.encryption_key = Some(id.clone());
        }
        self.nodes.insert(
            id,
            Node {
                resource,
                depends_on: Vec::new(),
            },
        );
        Ok(())
    }

    /// Add an explicit ordering edge the engine cannot infer (for example
    /// the database waiting for its log destination). Both ends must
    /// already be registered.
    pub fn depends_on(&mut self, from: &str, to: &str) -> StackResult<()> {
        if !self.nodes.contains_key(to) {
            return Err(StackError::UnknownDependency {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| StackError::UnknownDependency {
                from: from.to_string(),
                to: to.to_string(),
            })?;
        if !node.depends_on.iter().any(|d| d == to) {
            node.depends_on.push(to.to_string());
        }
        Ok(())
    }

    pub fn grant(&mut self, grantee: &str, resource: &str, actions: &[GrantAction]) {
        self.grants.push(Grant {
            grantee: grantee.to_string(),
            resource: resource.to_string(),
            actions: actions.to_vec(),
        });
    }

    pub fn output(&mut self, output: Output) {
        self.outputs.push(output);
    }

    pub fn set_bootstrap(&mut self, bootstrap: Bootstrap) {
        self.bootstrap = Some(bootstrap);
    }

    pub fn bootstrap(&self) -> Option<&Bootstrap> {
        self.bootstrap.as_ref()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.nodes.iter()
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Logical id of the stack's single encryption key, if one exists.
    pub fn encryption_key_id(&self) -> Option<&str> {
        self.encryption_key.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check every topology invariant. See [`crate::stack::validate`].
    pub fn validate(&self) -> StackResult<()> {
        super::validate::validate_graph(self)
    }

    pub(super) fn from_parts(
        name: String,
        nodes: BTreeMap<String, Node>,
        grants: Vec<Grant>,
        outputs: Vec<Output>,
        bootstrap: Option<Bootstrap>,
    ) -> StackResult<Self> {
        let mut graph = ResourceGraph::new(name);
        // Nodes first, then edges: a loaded document may declare an edge
        // before the node it points at.
        let mut edges = Vec::new();
        for (id, node) in nodes {
            graph.add(id.clone(), node.resource)?;
            for dep in node.depends_on {
                edges.push((id.clone(), dep));
            }
        }
        for (from, to) in edges {
            graph.depends_on(&from, &to)?;
        }
        graph.grants = grants;
        graph.outputs = outputs;
        graph.bootstrap = bootstrap;
        Ok(graph)
    }
}
