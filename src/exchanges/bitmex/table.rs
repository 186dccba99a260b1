//! Keyed table store for stateful realtime tables
//!
//! BitMEX sends `partial` (full image plus the key columns), then `insert`,
//! `update` (changed fields only) and `delete`. Tables whose updates are
//! partial rows must be merged locally before a record is usable.

use serde_json::{Map, Value};

/// Rows kept per table
pub const MAX_TABLE_LEN: usize = 10_000;

/// Table action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Partial,
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "partial" => Some(Action::Partial),
            "insert" => Some(Action::Insert),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

/// One table image
#[derive(Debug, Clone, Default)]
pub struct Table {
    keys: Vec<String>,
    rows: Vec<Value>,
    max_len: usize,
}

impl Table {
    pub fn new(max_len: usize) -> Self {
        Self {
            keys: Vec::new(),
            rows: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Apply one frame; returns the number of rows it touched
    pub fn apply(&mut self, action: Action, keys: Option<Vec<String>>, data: Vec<Value>) -> usize {
        match action {
            Action::Partial => {
                if let Some(keys) = keys {
                    self.keys = keys;
                }
                let touched = data.len();
                self.rows = data;
                self.trim();
                touched
            }
            Action::Insert => {
                let touched = data.len();
                self.rows.extend(data);
                self.trim();
                touched
            }
            Action::Update => {
                let mut touched = 0;
                for item in data {
                    let Some(position) = self.find(&item) else {
                        continue;
                    };
                    if let (Some(row), Value::Object(fields)) = (self.rows[position].as_object_mut(), item) {
                        merge(row, fields);
                        touched += 1;
                    }
                }
                touched
            }
            Action::Delete => {
                let before = self.rows.len();
                for item in &data {
                    if let Some(position) = self.find(item) {
                        self.rows.remove(position);
                    }
                }
                before - self.rows.len()
            }
        }
    }

    /// Index of the row with the same key columns as `item`
    fn find(&self, item: &Value) -> Option<usize> {
        if self.keys.is_empty() {
            return None;
        }
        self.rows.iter().position(|row| {
            self.keys
                .iter()
                .all(|k| row.get(k).is_some() && row.get(k) == item.get(k))
        })
    }

    fn trim(&mut self) {
        if self.rows.len() > self.max_len {
            let excess = self.rows.len() - self.max_len;
            self.rows.drain(..excess);
        }
    }
}

fn merge(row: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (k, v) in fields {
        row.insert(k, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys() -> Option<Vec<String>> {
        Some(vec!["account".to_string(), "symbol".to_string()])
    }

    fn seeded() -> Table {
        let mut table = Table::new(MAX_TABLE_LEN);
        table.apply(
            Action::Partial,
            keys(),
            vec![
                json!({"account": 1, "symbol": "XBTUSD", "currentQty": 10, "avgEntryPrice": 9500.0}),
                json!({"account": 1, "symbol": "ETHUSD", "currentQty": 0, "avgEntryPrice": null}),
            ],
        );
        table
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("partial"), Some(Action::Partial));
        assert_eq!(Action::parse("delete"), Some(Action::Delete));
        assert_eq!(Action::parse("upsert"), None);
    }

    #[test]
    fn test_update_merges_changed_fields() {
        let mut table = seeded();
        let touched = table.apply(
            Action::Update,
            None,
            vec![json!({"account": 1, "symbol": "XBTUSD", "currentQty": 20})],
        );
        assert_eq!(touched, 1);
        let row = &table.rows()[0];
        assert_eq!(row["currentQty"], json!(20));
        assert_eq!(row["avgEntryPrice"], json!(9500.0));
    }

    #[test]
    fn test_update_unknown_row_is_ignored() {
        let mut table = seeded();
        let touched = table.apply(
            Action::Update,
            None,
            vec![json!({"account": 2, "symbol": "XBTUSD", "currentQty": 5})],
        );
        assert_eq!(touched, 0);
        assert_eq!(table.rows().len(), 2);
    }

    #[test]
    fn test_insert_and_delete() {
        let mut table = seeded();
        table.apply(
            Action::Insert,
            None,
            vec![json!({"account": 1, "symbol": "XBTUSDT", "currentQty": 1})],
        );
        assert_eq!(table.rows().len(), 3);

        let removed = table.apply(
            Action::Delete,
            None,
            vec![json!({"account": 1, "symbol": "ETHUSD"})],
        );
        assert_eq!(removed, 1);
        assert!(table.rows().iter().all(|r| r["symbol"] != json!("ETHUSD")));
    }

    #[test]
    fn test_update_before_partial_has_no_keys() {
        let mut table = Table::new(10);
        let touched = table.apply(
            Action::Update,
            None,
            vec![json!({"account": 1, "symbol": "XBTUSD", "currentQty": 1})],
        );
        assert_eq!(touched, 0);
        assert!(table.keys().is_empty());
    }

    #[test]
    fn test_insert_trims_oldest() {
        let mut table = Table::new(2);
        table.apply(Action::Insert, None, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
        assert_eq!(table.rows(), &[json!({"n": 2}), json!({"n": 3})]);
    }
}
