//! Request Dispatch
//!
//! Maps a data source definition plus attribute data to a concrete REST call.

use super::query::{remove_nil, QueryParams};
use super::registry::{DataSourceDef, PaginationMode};
use super::state::ResourceData;
use crate::cloud::client::CloudClient;
use anyhow::{Context, Result};
use serde_json::{Map, Value};

/// Whether the definition pages for this particular input
pub fn paginates(def: &DataSourceDef, data: &ResourceData) -> bool {
    if def.pagination.mode == PaginationMode::None {
        return false;
    }
    def.pagination
        .when
        .iter()
        .all(|(attribute, expected)| data.get_str(attribute) == expected)
}

/// Resolve the request URL (endpoint, path parameters, query string) for one page
pub fn build_url(
    client: &CloudClient,
    def: &DataSourceDef,
    data: &ResourceData,
    offset: usize,
) -> Result<String> {
    let mut resolved = Vec::with_capacity(def.path_params.len());
    for param in &def.path_params {
        let value = get_param_str(data, param)?;
        resolved.push((param.as_str(), value));
    }
    let path_params: Vec<(&str, &str)> = resolved.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let url = client.url(&def.service, &def.http_url, &path_params);

    let mut query = QueryParams::new();
    for (key, value) in &def.static_query {
        query.push(key, value.as_str());
    }
    for param in &def.query_params {
        let attribute = param.attribute();
        match data.get_ok(attribute) {
            Some(value) => {
                query.push_value(param.key(), value);
            },
            // The provider-level enterprise project applies when none is given
            None if attribute == "enterprise_project_id" => {
                let eps = client.enterprise_project_id.as_deref().unwrap_or_default();
                if !eps.is_empty() {
                    query.push(param.key(), eps);
                }
            },
            None => {},
        }
    }
    for flag in &def.flag_params {
        query.flag(data, flag);
    }
    for multi in &def.multi_params {
        query.multi(data, multi);
    }

    if def.pagination.mode == PaginationMode::QueryOffset && paginates(def, data) {
        if let Some(limit) = def.pagination.limit {
            query.push("limit", limit.to_string());
        }
        query.offset(offset);
    }

    Ok(query.apply_to(&url))
}

/// Build the JSON body, if the definition sends one
pub fn build_body(def: &DataSourceDef, data: &ResourceData, offset: usize) -> Option<Value> {
    let body_offset = def.pagination.mode == PaginationMode::BodyOffset && paginates(def, data);
    if def.body_params.is_empty() && !body_offset {
        return None;
    }

    let mut body = Map::new();
    for param in &def.body_params {
        if let Some(value) = data.get_ok(param.attribute()) {
            body.insert(param.key().to_string(), value.clone());
        }
    }

    if body_offset {
        let as_string = def.pagination.limit_as_string;
        let number = |n: usize| {
            if as_string {
                Value::String(n.to_string())
            } else {
                Value::from(n)
            }
        };
        if let Some(limit) = def.pagination.limit {
            body.insert("limit".to_string(), number(limit));
        }
        body.insert("offset".to_string(), number(offset));
    }

    Some(remove_nil(Value::Object(body)))
}

/// Issue the request for one page of a data source
pub async fn invoke_data_source(
    client: &CloudClient,
    def: &DataSourceDef,
    data: &ResourceData,
    offset: usize,
) -> Result<Value> {
    tracing::debug!(
        "invoke_data_source: service={}, url={}, offset={}",
        def.service,
        def.http_url,
        offset
    );

    let url = build_url(client, def, data, offset)?;
    let body = build_body(def, data, offset);

    match def.method.to_ascii_uppercase().as_str() {
        "GET" => client.get(&url).await,
        "POST" => client.post(&url, body.as_ref()).await,
        other => Err(anyhow::anyhow!("Unsupported method for a data source: {}", other)),
    }
}

fn get_param_str(data: &ResourceData, key: &str) -> Result<String> {
    data.get_ok(key)
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .context(format!("Missing required parameter: {}", key))
}
