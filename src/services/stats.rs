use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
    HookflowError, Result,
    services::{AccessOptions, ItemStore},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsAggregate {
    /// count | countDistinct | sum | avg | min | max
    pub op: String,
    /// field name, `*` for count
    #[serde(default = "default_field")]
    pub field: String,
}

fn default_field() -> String {
    "*".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub collection: String,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregate: Vec<StatsAggregate>,
    #[serde(default)]
    pub filter: Value,
}

/// Grouped aggregation capability of the host.
#[async_trait]
pub trait StatsAggregator: Send + Sync {
    async fn get_stats(
        &self,
        query: &StatsQuery,
    ) -> Result<Value>;
}

/// Aggregates in process over the rows returned by an [`ItemStore`].
///
/// Each result row carries the group-by fields plus one object per operation,
/// e.g. `{"status": "draft", "count": {"*": 2}, "sum": {"price": 30}}`.
pub struct ItemStatsAggregator {
    items: Arc<dyn ItemStore>,
}

impl ItemStatsAggregator {
    pub fn new(items: Arc<dyn ItemStore>) -> Self {
        Self {
            items,
        }
    }
}

fn aggregate_rows(
    rows: &[&Value],
    agg: &StatsAggregate,
) -> Result<Value> {
    let numbers = || rows.iter().filter_map(|r| r.get(&agg.field).and_then(|v| v.as_f64())).collect::<Vec<f64>>();
    let value = match agg.op.as_str() {
        "count" if agg.field == "*" => json!(rows.len()),
        "count" => json!(rows.iter().filter(|r| r.get(&agg.field).map(|v| !v.is_null()).unwrap_or(false)).count()),
        "countDistinct" => {
            let mut seen: Vec<&Value> = Vec::new();
            for v in rows.iter().filter_map(|r| r.get(&agg.field)) {
                if !seen.contains(&v) {
                    seen.push(v);
                }
            }
            json!(seen.len())
        }
        "sum" => json!(numbers().iter().sum::<f64>()),
        "avg" => {
            let nums = numbers();
            if nums.is_empty() { Value::Null } else { json!(nums.iter().sum::<f64>() / nums.len() as f64) }
        }
        "min" => numbers().into_iter().reduce(f64::min).map(|v| json!(v)).unwrap_or(Value::Null),
        "max" => numbers().into_iter().reduce(f64::max).map(|v| json!(v)).unwrap_or(Value::Null),
        other => return Err(HookflowError::Action(format!("unsupported stats aggregate '{}'", other))),
    };
    Ok(value)
}

#[async_trait]
impl StatsAggregator for ItemStatsAggregator {
    async fn get_stats(
        &self,
        query: &StatsQuery,
    ) -> Result<Value> {
        let opts = AccessOptions {
            bypass_permissions: true,
            identity: None,
        };
        let rows = self.items.read_by_query(&query.collection, &json!({ "filter": query.filter }), &opts).await?;

        // groups keep first-seen order
        let mut groups: Vec<(Vec<Value>, Vec<&Value>)> = Vec::new();
        for row in &rows {
            let key: Vec<Value> = query.group_by.iter().map(|f| row.get(f).cloned().unwrap_or(Value::Null)).collect();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        if groups.is_empty() && query.group_by.is_empty() {
            groups.push((Vec::new(), Vec::new()));
        }

        let mut result = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut out = Map::new();
            for (field, value) in query.group_by.iter().zip(key) {
                out.insert(field.clone(), value);
            }
            for agg in &query.aggregate {
                let value = aggregate_rows(&members, agg)?;
                let entry = out.entry(agg.op.clone()).or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(fields) = entry {
                    fields.insert(agg.field.clone(), value);
                }
            }
            result.push(Value::Object(out));
        }
        Ok(Value::Array(result))
    }
}
