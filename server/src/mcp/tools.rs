//! Tool definitions and dispatch
//!
//! Three tools: `search_listings`, `collect_user_info` and `index_stats`.

use super::protocol::{PropertySchema, Tool, ToolInputSchema};
use crate::backend::{ListingBackend, SearchRequest, UserProfile};
use crate::error::{ServerError, ServerResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

pub const SEARCH_LISTINGS: &str = "search_listings";
pub const COLLECT_USER_INFO: &str = "collect_user_info";
pub const INDEX_STATS: &str = "index_stats";

/// Get all available tools
pub fn get_all_tools() -> Vec<Tool> {
    vec![search_listings_tool(), collect_user_info_tool(), index_stats_tool()]
}

fn prop(property_type: &str, description: &str) -> PropertySchema {
    PropertySchema {
        property_type: property_type.to_string(),
        description: Some(description.to_string()),
        default: None,
        items: None,
        minimum: None,
    }
}

fn string_prop(description: &str) -> PropertySchema {
    prop("string", description)
}

fn number_prop(description: &str, minimum: Option<f64>) -> PropertySchema {
    PropertySchema {
        minimum,
        ..prop("number", description)
    }
}

fn integer_prop(description: &str, default: Option<u64>, minimum: Option<f64>) -> PropertySchema {
    PropertySchema {
        default: default.map(Value::from),
        minimum,
        ..prop("integer", description)
    }
}

fn string_array_prop(description: &str) -> PropertySchema {
    PropertySchema {
        items: Some(Box::new(PropertySchema {
            property_type: "string".to_string(),
            description: None,
            default: None,
            items: None,
            minimum: None,
        })),
        ..prop("array", description)
    }
}

fn object_schema(properties: BTreeMap<String, PropertySchema>, required: &[&str]) -> ToolInputSchema {
    ToolInputSchema {
        schema_type: "object".to_string(),
        properties,
        required: required.iter().map(|s| s.to_string()).collect(),
    }
}

fn search_listings_tool() -> Tool {
    let mut properties = BTreeMap::new();
    properties.insert(
        "query".to_string(),
        string_prop("What the guest is looking for, in free text"),
    );
    properties.insert(
        "max_price".to_string(),
        number_prop("Highest acceptable nightly price", Some(0.0)),
    );
    properties.insert(
        "num_guests".to_string(),
        integer_prop("Number of guests the listing must accommodate", None, Some(1.0)),
    );
    properties.insert(
        "accessibility_amenities".to_string(),
        string_array_prop("Amenities every result must have, e.g. \"Elevator\""),
    );
    properties.insert(
        "k".to_string(),
        integer_prop("Maximum number of results", Some(5), Some(1.0)),
    );
    properties.insert(
        "preferences".to_string(),
        string_array_prop("Words to favour when ordering results, e.g. \"wheelchair\""),
    );

    Tool {
        name: SEARCH_LISTINGS.to_string(),
        description: "Finds listings matching a free-text request under price, guest and \
                      amenity constraints. Omitted constraints fall back to the collected \
                      user profile."
            .to_string(),
        input_schema: object_schema(properties, &["query"]),
    }
}

fn collect_user_info_tool() -> Tool {
    let mut properties = BTreeMap::new();
    properties.insert("first_name".to_string(), string_prop("Guest first name"));
    properties.insert("last_name".to_string(), string_prop("Guest last name"));
    properties.insert(
        "max_price".to_string(),
        number_prop("Highest acceptable nightly price", Some(0.0)),
    );
    properties.insert(
        "num_guests".to_string(),
        integer_prop("Number of guests", None, Some(1.0)),
    );
    properties.insert(
        "accessibility_amenities".to_string(),
        string_array_prop("Required accessibility amenities"),
    );

    Tool {
        name: COLLECT_USER_INFO.to_string(),
        description: "Stores the guest's details and requirements for this session. Later \
                      searches use them as default constraints."
            .to_string(),
        input_schema: object_schema(properties, &[]),
    }
}

fn index_stats_tool() -> Tool {
    Tool {
        name: INDEX_STATS.to_string(),
        description: "Reports the number of indexed listings, the embedding dimension, the \
                      distance metric and the embedding model."
            .to_string(),
        input_schema: object_schema(BTreeMap::new(), &[]),
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> ServerResult<T> {
    serde_json::from_value(args).map_err(|e| ServerError::InvalidParams(e.to_string()))
}

/// Execute a tool by name
pub async fn execute_tool(
    backend: &ListingBackend,
    name: &str,
    args: Option<Value>,
) -> ServerResult<Value> {
    let args = args.unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    match name {
        SEARCH_LISTINGS => {
            let request: SearchRequest = parse_args(args)?;
            let response = backend.search(request).await?;
            Ok(serde_json::to_value(response)?)
        }
        COLLECT_USER_INFO => {
            let profile: UserProfile = parse_args(args)?;
            let stored = backend.collect_user_info(profile);
            Ok(serde_json::json!({
                "status": "stored",
                "profile": stored,
            }))
        }
        INDEX_STATS => Ok(serde_json::to_value(backend.stats())?),
        _ => Err(ServerError::UnknownTool(name.to_string())),
    }
}
