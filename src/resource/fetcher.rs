//! Resource Fetcher
//!
//! Pages through list APIs and flattens the collected items into attributes
//! according to a data source definition.

use super::dispatch;
use super::path::{path_search, path_search_array, path_search_i64};
use super::registry::{get_data_source, AttributeDef, DataSourceDef};
use super::state::ResourceData;
use crate::cloud::client::CloudClient;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;

/// One page of a list response
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total reported by the server, when it reports one
    pub total: Option<usize>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<usize>) -> Self {
        Self { items, total }
    }
}

/// Fetch every page of an offset-paginated list.
///
/// `fetch` receives the offset of the next page. Collection stops on an empty
/// page or once the collected count reaches the reported total; the offset
/// advances by the number of items actually returned. The first error aborts
/// the whole collection.
pub async fn collect_offset_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut all_items = Vec::new();
    let mut offset = 0;

    loop {
        let page = fetch(offset).await?;
        if page.items.is_empty() {
            break;
        }

        offset += page.items.len();
        all_items.extend(page.items);

        if let Some(total) = page.total {
            if all_items.len() >= total {
                break;
            }
        }
    }

    Ok(all_items)
}

/// Read a registry-defined data source.
///
/// `data` carries the user's arguments; the returned data has the flattened
/// result list, any top-level response attributes, `region` and a fresh id.
pub async fn fetch_data_source(
    client: &CloudClient,
    key: &str,
    data: &ResourceData,
) -> Result<ResourceData> {
    let Some(def) = get_data_source(key) else {
        return Err(anyhow::anyhow!("Unknown data source: {}", key));
    };

    let (items, last_response) = fetch_items(client, def, data)
        .await
        .with_context(|| format!("error querying {}", def.display_name))?;

    let records: Vec<Value> = items
        .iter()
        .map(|item| Value::Object(flatten_record(item, &def.attributes)))
        .collect();

    let mut result = data.clone();
    result.set_id(uuid::Uuid::new_v4().to_string());
    result.set("region", Value::String(client.region.clone()));
    result.set(&def.result_attribute, Value::Array(records));
    for attribute in &def.response_attributes {
        result.set(&attribute.name, path_search(&attribute.path, &last_response, Value::Null));
    }

    tracing::info!("{}: read {} item(s)", key, items.len());
    Ok(result)
}

/// Collect the raw items of a data source along with the last response seen
async fn fetch_items(
    client: &CloudClient,
    def: &DataSourceDef,
    data: &ResourceData,
) -> Result<(Vec<Value>, Value)> {
    if !dispatch::paginates(def, data) {
        let response = dispatch::invoke_data_source(client, def, data, 0).await?;
        let items = path_search_array(&def.response_path, &response);
        return Ok((items, response));
    }

    let last_response = Mutex::new(Value::Null);
    let items = collect_offset_pages(|offset| {
        let last_response = &last_response;
        async move {
            let response = dispatch::invoke_data_source(client, def, data, offset).await?;
            let items = path_search_array(&def.response_path, &response);
            let total = def
                .pagination
                .total_path
                .as_deref()
                .map(|path| path_search_i64(path, &response, -1))
                .and_then(|t| usize::try_from(t).ok());

            if let Ok(mut slot) = last_response.lock() {
                *slot = response;
            }
            Ok(Page::new(items, total))
        }
    })
    .await?;

    let last_response = last_response.into_inner().unwrap_or_default();
    Ok((items, last_response))
}

/// Flatten one item into a record; missing fields become null
pub fn flatten_record(
    item: &Value,
    attributes: &BTreeMap<String, AttributeDef>,
) -> Map<String, Value> {
    attributes
        .iter()
        .map(|(name, attribute)| (name.clone(), flatten_attribute(item, attribute)))
        .collect()
}

fn flatten_attribute(item: &Value, attribute: &AttributeDef) -> Value {
    match attribute {
        AttributeDef::Path(path) => path_search(path, item, Value::Null),
        AttributeDef::Nested(nested) => {
            let value = path_search(&nested.path, item, Value::Null);
            if nested.as_json {
                return match value {
                    Value::Null => Value::Null,
                    other => Value::String(other.to_string()),
                };
            }

            let Some(attributes) = &nested.attributes else {
                return value;
            };

            // Objects become a one-element list, the way nested blocks are stored
            match value {
                Value::Array(items) if !items.is_empty() => Value::Array(
                    items
                        .iter()
                        .map(|v| Value::Object(flatten_record(v, attributes)))
                        .collect(),
                ),
                Value::Object(_) => {
                    Value::Array(vec![Value::Object(flatten_record(&value, attributes))])
                },
                _ => Value::Null,
            }
        },
    }
}
