//! Tool Definitions
//!
//! The Clockchain tools exposed over `tools/list`.

use super::protocol::{PropertySchema, Tool, ToolInputSchema};
use std::collections::HashMap;

/// Get all available Clockchain tools
pub fn get_all_tools() -> Vec<Tool> {
    vec![
        // Moments (6)
        create_node_tool(),
        update_node_tool(),
        get_node_tool(),
        publish_tool(),
        add_edge_tool(),
        neighbors_tool(),
        // Discovery (5)
        browse_tool(),
        search_tool(),
        today_tool(),
        random_tool(),
        stats_tool(),
        // Rendering and growth (6)
        generate_tool(),
        bulk_generate_tool(),
        submit_job_tool(),
        get_job_tool(),
        index_moment_tool(),
        expand_tool(),
    ]
}

fn string_prop(description: &str) -> PropertySchema {
    PropertySchema {
        property_type: "string".to_string(),
        description: Some(description.to_string()),
        default: None,
        enum_values: None,
        items: None,
        minimum: None,
        maximum: None,
    }
}

fn integer_prop(description: &str, minimum: Option<f64>, maximum: Option<f64>) -> PropertySchema {
    PropertySchema {
        property_type: "integer".to_string(),
        description: Some(description.to_string()),
        default: None,
        enum_values: None,
        items: None,
        minimum,
        maximum,
    }
}

fn number_prop(description: &str, default: Option<f64>) -> PropertySchema {
    PropertySchema {
        property_type: "number".to_string(),
        description: Some(description.to_string()),
        default: default.map(|v| serde_json::json!(v)),
        enum_values: None,
        items: None,
        minimum: None,
        maximum: None,
    }
}

fn enum_prop(description: &str, values: Vec<&str>, default: Option<&str>) -> PropertySchema {
    PropertySchema {
        property_type: "string".to_string(),
        description: Some(description.to_string()),
        default: default.map(|v| serde_json::json!(v)),
        enum_values: Some(values.into_iter().map(|s| s.to_string()).collect()),
        items: None,
        minimum: None,
        maximum: None,
    }
}

fn array_prop(description: &str, item_type: &str) -> PropertySchema {
    PropertySchema {
        property_type: "array".to_string(),
        description: Some(description.to_string()),
        default: None,
        enum_values: None,
        items: Some(Box::new(PropertySchema {
            property_type: item_type.to_string(),
            description: None,
            default: None,
            enum_values: None,
            items: None,
            minimum: None,
            maximum: None,
        })),
        minimum: None,
        maximum: None,
    }
}

fn tool(name: &str, description: &str, properties: HashMap<String, PropertySchema>, required: &[&str]) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: if required.is_empty() {
                None
            } else {
                Some(required.iter().map(|s| s.to_string()).collect())
            },
        },
    }
}

fn path_prop() -> PropertySchema {
    string_prop(
        "Canonical path, e.g. /1969/july/20/2056/united-states/florida/cape-canaveral/apollo-11",
    )
}

fn caller_prop() -> PropertySchema {
    string_prop("Identity of the requesting user; drafts are only visible to their creator")
}

fn visibility_prop(default: &str) -> PropertySchema {
    enum_prop("Who can see the moment", vec!["draft", "public"], Some(default))
}

/// Mutable attributes shared by create and update
fn attribute_props(properties: &mut HashMap<String, PropertySchema>) {
    properties.insert("name".to_string(), string_prop("Display name"));
    properties.insert(
        "description".to_string(),
        string_prop("One-sentence description"),
    );
    properties.insert("tags".to_string(), array_prop("Lowercase tags", "string"));
    properties.insert(
        "figures".to_string(),
        array_prop("Historical figures involved", "string"),
    );
    properties.insert(
        "layer".to_string(),
        integer_prop(
            "Completeness: 0 skeleton, 1 enriched, 2 rendered",
            Some(0.0),
            Some(2.0),
        ),
    );
    properties.insert("visibility".to_string(), visibility_prop("draft"));
    properties.insert("era".to_string(), string_prop("Era label"));
    properties.insert("caller".to_string(), caller_prop());
}

// === Moments ===

fn create_node_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "path".to_string(),
        string_prop("Canonical path; individual fields below take precedence"),
    );
    properties.insert(
        "year".to_string(),
        integer_prop("Signed year, negative for BCE", None, None),
    );
    properties.insert(
        "month".to_string(),
        string_prop("Month name or number 1-12"),
    );
    properties.insert("day".to_string(), integer_prop("Day of month", Some(1.0), Some(31.0)));
    properties.insert(
        "time".to_string(),
        string_prop("24-hour HHMM, default 1200"),
    );
    properties.insert("country".to_string(), string_prop("Kebab-case country"));
    properties.insert("region".to_string(), string_prop("Kebab-case region"));
    properties.insert("city".to_string(), string_prop("Kebab-case city"));
    properties.insert(
        "slug".to_string(),
        string_prop("Kebab-case slug, derived from the name when omitted"),
    );
    attribute_props(&mut properties);

    tool(
        "clockchain_create_node",
        "Create a moment, or merge fields into the one at the same path. New moments are linked to contemporaneous, same-location and same-tag moments automatically.",
        properties,
        &["name"],
    )
}

fn update_node_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), path_prop());
    attribute_props(&mut properties);

    tool(
        "clockchain_update_node",
        "Update attributes of an existing moment. Only supplied fields change; the path never does.",
        properties,
        &["path"],
    )
}

fn get_node_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), path_prop());
    properties.insert("caller".to_string(), caller_prop());

    tool(
        "clockchain_get_node",
        "Fetch a moment by canonical path.",
        properties,
        &["path"],
    )
}

fn publish_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), path_prop());
    properties.insert(
        "visibility".to_string(),
        enum_prop(
            "Visibility to set; draft hides the moment again",
            vec!["draft", "public"],
            Some("public"),
        ),
    );

    tool(
        "clockchain_publish",
        "Set a moment's visibility, public by default.",
        properties,
        &["path"],
    )
}

fn add_edge_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("source".to_string(), path_prop());
    properties.insert("target".to_string(), path_prop());
    properties.insert(
        "type".to_string(),
        enum_prop(
            "Relationship type",
            vec!["causes", "contemporaneous", "same_location", "thematic"],
            None,
        ),
    );
    properties.insert(
        "weight".to_string(),
        number_prop("Edge weight (default: 1.0)", Some(1.0)),
    );
    properties.insert("theme".to_string(), string_prop("Optional theme label"));

    tool(
        "clockchain_add_edge",
        "Connect two existing moments. Adding an existing (source, target, type) is a no-op.",
        properties,
        &["source", "target", "type"],
    )
}

fn neighbors_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), path_prop());

    tool(
        "clockchain_neighbors",
        "List the moments directly connected to a moment, outgoing then incoming.",
        properties,
        &["path"],
    )
}

// === Discovery ===

fn browse_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "prefix".to_string(),
        string_prop("Path prefix such as /1969/july (default: /)"),
    );

    tool(
        "clockchain_browse",
        "List the next path segments under a prefix with public moment counts.",
        properties,
        &[],
    )
}

fn search_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("query".to_string(), string_prop("Text to match"));
    properties.insert(
        "limit".to_string(),
        number_prop("Maximum results (default: 20)", Some(20.0)),
    );

    tool(
        "clockchain_search",
        "Search public moments by name, description, tag or figure.",
        properties,
        &["query"],
    )
}

fn today_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "month".to_string(),
        integer_prop("Month 1-12 (default: current UTC month)", Some(1.0), Some(12.0)),
    );
    properties.insert(
        "day".to_string(),
        integer_prop("Day of month (default: current UTC day)", Some(1.0), Some(31.0)),
    );

    tool(
        "clockchain_today",
        "Public moments that happened on this month and day in any year.",
        properties,
        &[],
    )
}

fn random_tool() -> Tool {
    tool(
        "clockchain_random",
        "A random public moment that is at least enriched.",
        HashMap::new(),
        &[],
    )
}

fn stats_tool() -> Tool {
    tool(
        "clockchain_stats",
        "Node and edge counts by layer, edge type and visibility.",
        HashMap::new(),
        &[],
    )
}

// === Rendering and growth ===

fn generate_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "query".to_string(),
        string_prop("Free-text description of the moment to render"),
    );
    properties.insert(
        "preset".to_string(),
        string_prop("Render preset (default: balanced)"),
    );
    properties.insert("visibility".to_string(), visibility_prop("draft"));
    properties.insert("caller".to_string(), caller_prop());

    tool(
        "clockchain_generate",
        "Screen a query through moderation, then render it into a new moment. Returns a job id to poll.",
        properties,
        &["query"],
    )
}

fn bulk_generate_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert(
        "queries".to_string(),
        PropertySchema {
            property_type: "array".to_string(),
            description: Some(
                "Objects of {query, preset?, visibility?}; each is screened and rendered independently"
                    .to_string(),
            ),
            default: None,
            enum_values: None,
            items: Some(Box::new(PropertySchema {
                property_type: "object".to_string(),
                description: None,
                default: None,
                enum_values: None,
                items: None,
                minimum: None,
                maximum: None,
            })),
            minimum: None,
            maximum: None,
        },
    );
    properties.insert(
        "admin_key".to_string(),
        string_prop("Administrator key configured on the server"),
    );

    tool(
        "clockchain_bulk_generate",
        "Submit a batch of render queries. Requires the admin key. Returns one job id or error per query.",
        properties,
        &["queries", "admin_key"],
    )
}

fn submit_job_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), path_prop());
    properties.insert(
        "query".to_string(),
        string_prop("Render query (default: \"<name> (<year>)\")"),
    );
    properties.insert(
        "preset".to_string(),
        string_prop("Render preset (default: balanced)"),
    );
    properties.insert("caller".to_string(), caller_prop());

    tool(
        "clockchain_submit_job",
        "Render content for an existing moment. Returns a job id to poll.",
        properties,
        &["path"],
    )
}

fn get_job_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("job_id".to_string(), string_prop("Job id from a submission"));

    tool(
        "clockchain_get_job",
        "Poll a render job.",
        properties,
        &["job_id"],
    )
}

fn index_moment_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("path".to_string(), path_prop());
    properties.insert(
        "render_id".to_string(),
        string_prop("Id of the already-rendered content"),
    );
    properties.insert(
        "render_slug".to_string(),
        string_prop("Slug of the rendered content"),
    );
    properties.insert(
        "share_url".to_string(),
        string_prop("Public URL of the rendered content"),
    );
    attribute_props(&mut properties);

    tool(
        "clockchain_index_moment",
        "Register content rendered elsewhere as a rendered (layer 2) moment at the given path.",
        properties,
        &["path", "render_id"],
    )
}

fn expand_tool() -> Tool {
    tool(
        "clockchain_expand",
        "Run one frontier expansion cycle now. Returns in_flight if a cycle is already running.",
        HashMap::new(),
        &[],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tools_listed_once() {
        let tools = get_all_tools();
        assert_eq!(tools.len(), 17);
        let mut names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 17);
        assert!(names.iter().all(|n| n.starts_with("clockchain_")));
    }

    #[test]
    fn test_required_fields_exist_in_properties() {
        for tool in get_all_tools() {
            let properties = tool.input_schema.properties.clone().unwrap_or_default();
            for required in tool.input_schema.required.clone().unwrap_or_default() {
                assert!(
                    properties.contains_key(&required),
                    "{} requires undeclared {}",
                    tool.name,
                    required
                );
            }
        }
    }

    #[test]
    fn test_bulk_generate_requires_admin_key() {
        let tool = bulk_generate_tool();
        let required = tool.input_schema.required.unwrap();
        assert!(required.contains(&"admin_key".to_string()));
        assert!(required.contains(&"queries".to_string()));
    }

    #[test]
    fn test_edge_types_enumerated() {
        let tool = add_edge_tool();
        let props = tool.input_schema.properties.unwrap();
        assert_eq!(props["type"].enum_values.as_ref().unwrap().len(), 4);
    }
}
