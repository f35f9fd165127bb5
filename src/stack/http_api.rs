//! Function fronted by an HTTP API.

use std::collections::BTreeMap;

use crate::config::StackParams;

use super::graph::{Bootstrap, Output, ResourceGraph};
use super::resources::{CorsPreflight, FunctionResource, HttpApi, HttpRoute, Resource};
use super::StackResult;

/// Assemble a function plus an HTTP endpoint with CORS and a GET `/` route.
pub fn http_api_stack(params: &StackParams) -> StackResult<ResourceGraph> {
    let q = &params.qualifier;
    let mut graph = ResourceGraph::new(format!("{}-http-api", q));
    graph.set_bootstrap(Bootstrap {
        qualifier: params.deploy_qualifier.clone(),
        bucket: params.deploy_bucket.clone(),
    });

    let function_id = format!("{}-fn", q);
    let mut environment = BTreeMap::new();
    environment.insert("TABLENAME".to_string(), format!("{}-requests", q));
    graph.add(
        &function_id,
        Resource::Function(FunctionResource {
            function_name: format!("{}Handler", q),
            runtime: "python3.11".to_string(),
            handler: "index.handler".to_string(),
            code_path: "src".to_string(),
            environment,
        }),
    )?;

    let api_id = format!("{}-api", q);
    graph.add(
        &api_id,
        Resource::HttpApi(HttpApi {
            cors: Some(CorsPreflight {
                allow_methods: vec!["GET".to_string()],
                allow_origins: vec!["*".to_string()],
                max_age_days: 10,
            }),
            routes: vec![HttpRoute {
                path: "/".to_string(),
                method: "GET".to_string(),
                integration: function_id.clone(),
            }],
        }),
    )?;
    graph.depends_on(&api_id, &function_id)?;

    graph.output(Output::attr(
        "ApiEndpoint",
        "API Endpoint",
        &api_id,
        "endpoint",
    ));

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::function::tests::test_params;
    use crate::stack::resources::Resource;

    #[test]
    fn http_api_stack_routes_to_its_function() {
        let graph = http_api_stack(&test_params()).unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.len(), 2);

        let api = graph.get("wp-api").unwrap();
        assert_eq!(api.depends_on, vec!["wp-fn".to_string()]);
        match &api.resource {
            Resource::HttpApi(api) => {
                assert_eq!(api.routes[0].integration, "wp-fn");
                assert_eq!(api.cors.as_ref().unwrap().allow_methods, vec!["GET"]);
            }
            other => panic!("unexpected resource: {}", other.kind()),
        }
        assert_eq!(graph.outputs()[0].value, "${wp-api.endpoint}");
    }
}
