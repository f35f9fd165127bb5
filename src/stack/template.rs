//! The deployment template: the data-driven configuration document the
//! provisioning engine consumes.
//!
//! A template is the serialized form of a validated resource graph. Loading
//! one re-checks the document: parse errors and invariant violations are
//! both rejected, so a template in hand is always a deployable topology.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::graph::{Bootstrap, Grant, Node, Output, ResourceGraph};
use super::StackResult;

pub const TEMPLATE_FORMAT_VERSION: &str = "2024-10";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub format_version: String,
    pub stack: String,
    /// The engine's own staging qualifier and bucket, when the assembling
    /// environment names them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<Bootstrap>,
    pub resources: BTreeMap<String, Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<Grant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Output>,
}

impl Template {
    /// Render a validated graph into its template document.
    pub fn from_graph(graph: &ResourceGraph) -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            stack: graph.name().to_string(),
            bootstrap: graph.bootstrap().cloned(),
            resources: graph
                .nodes()
                .map(|(id, node)| (id.clone(), node.clone()))
                .collect(),
            grants: graph.grants().to_vec(),
            outputs: graph.outputs().to_vec(),
        }
    }

    /// Parse and schema-check a template document, rebuilding the graph and
    /// re-running every topology invariant.
    pub fn from_json(text: &str) -> StackResult<Template> {
        let template: Template = serde_json::from_str(text)?;
        template.to_graph()?.validate()?;
        Ok(template)
    }

    /// Rebuild the resource graph this template describes.
    pub fn to_graph(&self) -> StackResult<ResourceGraph> {
        ResourceGraph::from_parts(
            self.stack.clone(),
            self.resources.clone(),
            self.grants.clone(),
            self.outputs.clone(),
            self.bootstrap.clone(),
        )
    }

    pub fn to_json_pretty(&self) -> StackResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::cidr::CidrBlock;
    use crate::stack::resources::*;
    use crate::stack::StackError;

    fn small_graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new("demo");
        graph
            .add(
                "key",
                Resource::EncryptionKey(EncryptionKey {
                    alias: "demo".into(),
                    description: "demo key".into(),
                    rotation_enabled: true,
                    deletion_grace_days: 7,
                }),
            )
            .unwrap();
        graph
            .add(
                "db-logs",
                Resource::LogGroup(LogGroup {
                    name: "/db/error".into(),
                    retention_days: 7,
                    encryption_key: "key".into(),
                }),
            )
            .unwrap();
        graph
            .add(
                "net",
                Resource::Network(Network {
                    cidr: CidrBlock::parse("172.31.0.0/16").unwrap(),
                    subnets: vec![Subnet {
                        id: "priv-a".into(),
                        availability_zone: "a".into(),
                        cidr: CidrBlock::parse("172.31.255.0/24").unwrap(),
                        public: false,
                    }],
                }),
            )
            .unwrap();
        graph.depends_on("db-logs", "key").unwrap();
        graph.output(Output::attr("KeyArn", "key identifier", "key", "arn"));
        graph
    }

    #[test]
    fn template_round_trips_through_the_loader() {
        let graph = small_graph();
        let template = Template::from_graph(&graph);
        let text = template.to_json_pretty().unwrap();

        let loaded = Template::from_json(&text).unwrap();
        assert_eq!(loaded.format_version, TEMPLATE_FORMAT_VERSION);
        assert_eq!(loaded.stack, "demo");
        assert_eq!(loaded.resources.len(), 3);
        assert_eq!(
            loaded.resources["db-logs"].depends_on,
            vec!["key".to_string()]
        );
        assert_eq!(loaded.outputs[0].value, "${key.arn}");
    }

    #[test]
    fn loader_rejects_malformed_documents() {
        assert!(matches!(
            Template::from_json("{\"not\": \"a template\"}"),
            Err(StackError::MalformedTemplate(_))
        ));
        assert!(Template::from_json("not json at all").is_err());
    }

    #[test]
    fn loader_rejects_invariant_violations() {
        let graph = small_graph();
        let mut template = Template::from_graph(&graph);
        // Point the log group at a key the stack does not carry.
        if let Resource::LogGroup(ref mut lg) =
            template.resources.get_mut("db-logs").unwrap().resource
        {
            lg.encryption_key = "rogue-key".into();
        }
        let text = template.to_json_pretty().unwrap();
        assert!(matches!(
            Template::from_json(&text),
            Err(StackError::Validation { .. })
        ));
    }

    #[test]
    fn serialized_resources_are_type_tagged() {
        let template = Template::from_graph(&small_graph());
        let value: serde_json::Value =
            serde_json::from_str(&template.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["resources"]["key"]["type"], "EncryptionKey");
        assert_eq!(
            value["resources"]["net"]["properties"]["cidr"],
            "172.31.0.0/16"
        );
    }
}
