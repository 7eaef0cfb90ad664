use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, RwLock},
};

use serde_json::Value as JsonValue;
use tracing::trace;

use super::DbDocument;
use crate::{
    HookflowError, Result, ShareLock,
    store::{DbCollection, PageData, query::Query},
};

/// Insertion-ordered collection of documents.
///
/// Rows are keyed by an insertion sequence. Ids and the document's index field map
/// to sequences, so id lookups and indexed equality filters skip the full scan.
pub struct Collect<T> {
    name: String,
    rows: ShareLock<Rows<T>>,
}

struct Rows<T> {
    next: u64,
    items: BTreeMap<u64, T>,
    ids: HashMap<String, u64>,
    index: HashMap<String, Vec<u64>>,
}

impl<T: DbDocument> Rows<T> {
    fn get(
        &self,
        id: &str,
    ) -> Option<&T> {
        self.ids.get(id).and_then(|seq| self.items.get(seq))
    }

    fn insert(
        &mut self,
        item: T,
    ) {
        let seq = self.next;
        self.next += 1;
        self.ids.insert(item.id().to_string(), seq);
        if let Some(key) = item.index_value() {
            self.index.entry(key.to_string()).or_default().push(seq);
        }
        self.items.insert(seq, item);
    }

    fn unindex(
        &mut self,
        key: &str,
        seq: u64,
    ) {
        if let Some(seqs) = self.index.get_mut(key) {
            seqs.retain(|s| *s != seq);
            if seqs.is_empty() {
                self.index.remove(key);
            }
        }
    }

    fn replace(
        &mut self,
        item: T,
    ) -> bool {
        let Some(&seq) = self.ids.get(item.id()) else {
            return false;
        };
        let old_key = self.items.get(&seq).and_then(|old| old.index_value()).map(str::to_string);
        let new_key = item.index_value().map(str::to_string);
        if old_key != new_key {
            if let Some(key) = &old_key {
                self.unindex(key, seq);
            }
            if let Some(key) = new_key {
                let seqs = self.index.entry(key).or_default();
                seqs.push(seq);
                seqs.sort_unstable();
            }
        }
        self.items.insert(seq, item);
        true
    }

    fn remove(
        &mut self,
        id: &str,
    ) -> bool {
        let Some(seq) = self.ids.remove(id) else {
            return false;
        };
        if let Some(item) = self.items.remove(&seq)
            && let Some(key) = item.index_value()
        {
            self.unindex(key, seq);
        }
        true
    }

    /// Rows that can match `query`, in insertion order.
    fn candidates<'a>(
        &'a self,
        query: &Query,
    ) -> Box<dyn Iterator<Item = &'a T> + 'a> {
        let indexed = T::INDEX.and_then(|field| query.filters().iter().find(|(key, _)| key == field)).and_then(|(_, value)| value.as_str());
        match indexed {
            Some(key) => Box::new(self.index.get(key).into_iter().flatten().filter_map(|seq| self.items.get(seq))),
            None => Box::new(self.items.values()),
        }
    }
}

impl<T> fmt::Debug for Collect<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Collect").field("name", &self.name).finish()
    }
}

impl<T> Collect<T>
where
    T: DbDocument + Clone,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Arc::new(RwLock::new(Rows {
                next: 0,
                items: BTreeMap::new(),
                ids: HashMap::new(),
                index: HashMap::new(),
            })),
        }
    }

    fn matches(
        item: &T,
        query: &Query,
    ) -> Result<bool> {
        if query.filters().is_empty() {
            return Ok(true);
        }
        let doc = item.doc()?;
        Ok(query.filters().iter().all(|(key, value)| doc.get(key) == Some(value)))
    }
}

fn compare(
    a: Option<&JsonValue>,
    b: Option<&JsonValue>,
) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(a)), Some(JsonValue::Number(b))) => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(a)), Some(JsonValue::String(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let rows = self.rows.read().map_err(|e| HookflowError::Store(e.to_string()))?;
        Ok(rows.ids.contains_key(id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        trace!("{}::find({})", self.name, id);
        let rows = self.rows.read().map_err(|e| HookflowError::Store(e.to_string()))?;
        rows.get(id).cloned().ok_or_else(|| HookflowError::NotFound(format!("{} '{}'", self.name, id)))
    }

    fn query(
        &self,
        query: &Query,
    ) -> Result<PageData<Self::Item>> {
        trace!("{}::query({:?})", self.name, query);
        let rows = self.rows.read().map_err(|e| HookflowError::Store(e.to_string()))?;
        let mut matched = Vec::new();
        for item in rows.candidates(query) {
            if Self::matches(item, query)? {
                matched.push(item.clone());
            }
        }
        drop(rows);

        if !query.order_by().is_empty() {
            let mut keyed = matched.into_iter().map(|item| -> Result<_> { Ok((item.doc()?, item)) }).collect::<Result<Vec<_>>>()?;
            for (key, desc) in query.order_by().iter().rev() {
                keyed.sort_by(|(a, _), (b, _)| {
                    let ord = compare(a.get(key), b.get(key));
                    if *desc { ord.reverse() } else { ord }
                });
            }
            matched = keyed.into_iter().map(|(_, item)| item).collect();
        }

        let count = matched.len();
        let page_size = query.limit().min(count.max(1));
        let rows = matched.into_iter().skip(query.offset()).take(query.limit()).collect::<Vec<_>>();
        Ok(PageData {
            count,
            page_num: query.offset() / page_size + 1,
            page_count: count.div_ceil(page_size),
            page_size,
            rows,
        })
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::create({})", self.name, data.id());
        let mut rows = self.rows.write().map_err(|e| HookflowError::Store(e.to_string()))?;
        if rows.ids.contains_key(data.id()) {
            return Err(HookflowError::Store(format!("{} '{}' already exists", self.name, data.id())));
        }
        rows.insert(data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::update({})", self.name, data.id());
        let mut rows = self.rows.write().map_err(|e| HookflowError::Store(e.to_string()))?;
        Ok(rows.replace(data.clone()))
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        trace!("{}::delete({})", self.name, id);
        let mut rows = self.rows.write().map_err(|e| HookflowError::Store(e.to_string()))?;
        Ok(rows.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::store::data::{ExecutionLog, LogStatus};

    fn log(
        id: &str,
        execution_id: &str,
        start_time: i64,
    ) -> ExecutionLog {
        ExecutionLog {
            id: id.to_string(),
            execution_id: execution_id.to_string(),
            node_id: format!("n-{}", id),
            node_type: "variable".to_string(),
            status: LogStatus::Running,
            input_data: Value::Null,
            output_data: Value::Null,
            error_message: None,
            duration_ms: 0,
            start_time,
            timestamp: start_time,
        }
    }

    #[test]
    fn test_indexed_filter_keeps_insertion_order() {
        let logs = Collect::<ExecutionLog>::new("logs");
        logs.create(&log("a", "e1", 3)).unwrap();
        logs.create(&log("b", "e2", 1)).unwrap();
        logs.create(&log("c", "e1", 2)).unwrap();

        let rows = logs.query(&Query::new().filter("execution_id", "e1")).unwrap().rows;
        assert_eq!(rows.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);

        let rows = logs.query(&Query::new().filter("execution_id", "e1").order("start_time", false)).unwrap().rows;
        assert_eq!(rows.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(), vec!["c", "a"]);

        let rows = logs.query(&Query::new().filter("execution_id", "e1").filter("node_id", "n-c")).unwrap().rows;
        assert_eq!(rows.len(), 1);
        assert!(logs.query(&Query::new().filter("execution_id", "missing")).unwrap().rows.is_empty());
    }

    #[test]
    fn test_update_and_delete_maintain_index() {
        let logs = Collect::<ExecutionLog>::new("logs");
        logs.create(&log("a", "e1", 1)).unwrap();
        logs.create(&log("b", "e1", 2)).unwrap();
        assert!(logs.create(&log("a", "e9", 1)).is_err());

        let mut moved = log("a", "e2", 1);
        moved.output_data = json!({"ok": true});
        assert!(logs.update(&moved).unwrap());
        assert!(!logs.update(&log("ghost", "e1", 1)).unwrap());
        assert_eq!(logs.query(&Query::new().filter("execution_id", "e1")).unwrap().count, 1);
        assert_eq!(logs.find("a").unwrap().output_data, json!({"ok": true}));

        assert!(logs.delete("b").unwrap());
        assert!(!logs.delete("b").unwrap());
        assert!(!logs.exists("b").unwrap());
        assert!(logs.query(&Query::new().filter("execution_id", "e1")).unwrap().rows.is_empty());
        assert_eq!(logs.query(&Query::new()).unwrap().count, 1);
    }
}
