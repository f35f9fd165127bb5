//! The simplest stack variant: one serverless function.

use std::collections::BTreeMap;

use crate::config::StackParams;

use super::graph::{Bootstrap, Output, ResourceGraph};
use super::resources::{FunctionResource, Resource};
use super::StackResult;

/// Assemble a stack holding a single function and its identifier output.
pub fn function_stack(params: &StackParams) -> StackResult<ResourceGraph> {
    let q = &params.qualifier;
    let mut graph = ResourceGraph::new(format!("{}-function", q));
    graph.set_bootstrap(Bootstrap {
        qualifier: params.deploy_qualifier.clone(),
        bucket: params.deploy_bucket.clone(),
    });

    let function_id = format!("{}-fn", q);
    graph.add(
        &function_id,
        Resource::Function(FunctionResource {
            function_name: format!("{}Function", q),
            runtime: "python3.11".to_string(),
            handler: "index.handler".to_string(),
            code_path: format!("functions/{}Function/src", q),
            environment: BTreeMap::new(),
        }),
    )?;

    graph.output(Output::attr(
        "FunctionArn",
        "Function ARN",
        &function_id,
        "arn",
    ));

    Ok(graph)
}
