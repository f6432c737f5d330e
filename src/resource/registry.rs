//! Data Source Registry - Load data source definitions from JSON
//!
//! Every read-only data source is declared in an embedded JSON file: where to
//! send the request, which attributes become query or body parameters, how to
//! page through the results and how to flatten each returned item.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded data source JSON files (compiled into the binary)
const DATA_SOURCE_FILES: &[&str] = &[
    include_str!("../resources/cbr.json"),
    include_str!("../resources/swr.json"),
];

/// A request parameter taken from an attribute.
/// Either the attribute name itself, or an attribute sent under another key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ParamDef {
    Same(String),
    Renamed { attribute: String, key: String },
}

impl ParamDef {
    pub fn attribute(&self) -> &str {
        match self {
            ParamDef::Same(name) => name,
            ParamDef::Renamed { attribute, .. } => attribute,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ParamDef::Same(name) => name,
            ParamDef::Renamed { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// A single request
    #[default]
    None,
    /// `offset` (and optional `limit`) in the query string
    QueryOffset,
    /// `offset` and `limit` in the JSON body
    BodyOffset,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationDef {
    #[serde(default)]
    pub mode: PaginationMode,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Send limit/offset as JSON strings (body mode)
    #[serde(default)]
    pub limit_as_string: bool,
    /// Path of the reported total; without it paging stops on an empty page
    #[serde(default)]
    pub total_path: Option<String>,
    /// Only paginate when these attributes hold these values
    #[serde(default)]
    pub when: BTreeMap<String, String>,
}

/// A top-level attribute read from the raw response rather than from the items
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseAttributeDef {
    pub name: String,
    pub path: String,
}

/// How one attribute of a flattened record is produced
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AttributeDef {
    /// Path expression evaluated against the item
    Path(String),
    Nested(NestedAttributeDef),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestedAttributeDef {
    pub path: String,
    /// Flatten each element (or the single object) with these attributes
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, AttributeDef>>,
    /// Store the value as a JSON-encoded string
    #[serde(default)]
    pub as_json: bool,
}

/// Data source definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceDef {
    pub display_name: String,
    pub service: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub http_url: String,
    /// Required attributes substituted into `http_url`
    #[serde(default)]
    pub path_params: Vec<String>,
    #[serde(default)]
    pub query_params: Vec<ParamDef>,
    /// Boolean attributes sent as `key=true` when set
    #[serde(default)]
    pub flag_params: Vec<String>,
    /// Comma-separated attributes sent as repeated keys
    #[serde(default)]
    pub multi_params: Vec<String>,
    /// Query parameters sent with every request
    #[serde(default)]
    pub static_query: BTreeMap<String, String>,
    #[serde(default)]
    pub body_params: Vec<ParamDef>,
    #[serde(default)]
    pub pagination: PaginationDef,
    /// Path of the item list in each response
    pub response_path: String,
    /// Attribute receiving the flattened items
    pub result_attribute: String,
    #[serde(default)]
    pub response_attributes: Vec<ResponseAttributeDef>,
    pub attributes: BTreeMap<String, AttributeDef>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<RegistryConfig> = OnceLock::new();

/// Get the data source registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static RegistryConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = RegistryConfig {
            data_sources: BTreeMap::new(),
        };

        for content in DATA_SOURCE_FILES {
            let partial: RegistryConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded data source JSON: {}", e));
            final_config.data_sources.extend(partial.data_sources);
        }

        final_config
    })
}

/// Get a data source definition by key
pub fn get_data_source(key: &str) -> Option<&'static DataSourceDef> {
    get_registry().data_sources.get(key)
}

/// Get all data source keys, sorted
pub fn get_all_data_source_keys() -> Vec<&'static str> {
    get_registry()
        .data_sources
        .keys()
        .map(|s| s.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(
            !registry.data_sources.is_empty(),
            "Registry should have data sources"
        );
    }

    #[test]
    fn test_backups_data_source() {
        let def = get_data_source("cbr_backups").expect("cbr_backups should exist");
        assert_eq!(def.service, "cbr");
        assert_eq!(def.method, "GET");
        assert_eq!(def.http_url, "v3/{project_id}/backups");
        assert_eq!(def.pagination.mode, PaginationMode::QueryOffset);
        assert!(def.pagination.total_path.is_none());
        assert_eq!(def.multi_params, vec!["status".to_string()]);
        assert!(matches!(
            def.attributes.get("extend_info"),
            Some(AttributeDef::Nested(NestedAttributeDef {
                attributes: Some(_),
                ..
            }))
        ));
    }

    #[test]
    fn test_vaults_by_tags_pages_in_body() {
        let def = get_data_source("cbr_vaults_by_tags").unwrap();
        assert_eq!(def.method, "POST");
        assert_eq!(def.pagination.mode, PaginationMode::BodyOffset);
        assert!(def.pagination.limit_as_string);
        assert_eq!(def.pagination.limit, Some(1000));
        assert_eq!(
            def.pagination.when.get("action").map(String::as_str),
            Some("filter")
        );
        assert_eq!(def.response_attributes[0].name, "total_count");
    }

    #[test]
    fn test_renamed_query_param() {
        let def = get_data_source("cbr_protectable_instances").unwrap();
        let renamed = def
            .query_params
            .iter()
            .find(|p| p.attribute() == "resource_id")
            .unwrap();
        assert_eq!(renamed.key(), "id");
        assert_eq!(def.pagination.mode, PaginationMode::None);
    }

    #[test]
    fn test_swr_namespaces_use_reported_total() {
        let def = get_data_source("swr_enterprise_namespaces").unwrap();
        assert_eq!(def.service, "swr");
        assert_eq!(def.path_params, vec!["instance_id".to_string()]);
        assert_eq!(def.pagination.limit, Some(100));
        assert_eq!(def.pagination.total_path.as_deref(), Some("total"));
    }

    #[test]
    fn test_get_all_data_source_keys() {
        let keys = get_all_data_source_keys();
        for key in [
            "cbr_backups",
            "cbr_operation_logs",
            "cbr_protectable_instances",
            "cbr_vaults_by_tags",
            "swr_enterprise_instances",
            "swr_enterprise_namespaces",
        ] {
            assert!(keys.contains(&key), "missing {}", key);
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_param_def_forms() {
        let params: Vec<ParamDef> =
            serde_json::from_str(r#"["name", {"attribute": "resource_id", "key": "id"}]"#).unwrap();
        assert_eq!(params[0].key(), "name");
        assert_eq!(params[1].attribute(), "resource_id");
        assert_eq!(params[1].key(), "id");
    }
}
