use crate::query::{Range, SelectQuery, SortDirection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Column matched by the free-text `search` parameter.
pub const SEARCH_FIELD: &str = "name";

/// Options accepted by `get_all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListParams {
    /// Scalars become equality filters, arrays become inclusion filters,
    /// nulls are ignored.
    pub filters: BTreeMap<String, Value>,
    pub search: Option<String>,
    /// 1-based page number; only applied together with `limit`.
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<SortDirection>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(column.into(), value.into());
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = Some(column.into());
        self.sort_direction = Some(direction);
        self
    }

    /// Row window implied by `page` and `limit`, if both are set.
    pub fn range(&self) -> Option<Range> {
        match (self.page, self.limit) {
            (Some(page), Some(limit)) => Range::page(page, limit),
            _ => None,
        }
    }

    /// Applies filters, search, ordering and paging to `query`.
    ///
    /// Sorting falls back to `default_order_by`, descending.
    pub fn apply(&self, mut query: SelectQuery, default_order_by: &str) -> SelectQuery {
        for (column, value) in &self.filters {
            query = match value {
                Value::Null => query,
                Value::Array(values) => query.in_(column.clone(), values.iter().cloned()),
                scalar => query.eq(column.clone(), scalar.clone()),
            };
        }

        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.ilike(SEARCH_FIELD, contains_pattern(term));
        }

        let sort_by = self.sort_by.as_deref().unwrap_or(default_order_by);
        query = query.order(sort_by, self.sort_direction.unwrap_or_default());

        match self.range() {
            Some(range) => query.range(range.from, range.to),
            None => query,
        }
    }
}

/// Exact match on one column, as used by `find_by`.
///
/// `null` selects rows where the column is null or missing. Any other value,
/// arrays included, must equal the stored value.
pub(crate) fn match_column(query: SelectQuery, column: &str, value: Value) -> SelectQuery {
    match value {
        Value::Null => query.is_null(column),
        value => query.eq(column, value),
    }
}

/// Escapes LIKE wildcards so user input matches literally.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%term%` with the term escaped.
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::client::Client;
    use crate::query::{Filter, OrderBy};
    use serde_json::json;
    use std::sync::Arc;

    fn query() -> SelectQuery {
        Client::production(Arc::new(InMemoryBackend::new()))
            .from_table("people")
            .select("*")
    }

    #[test]
    fn scalars_and_arrays_become_eq_and_in() {
        let params = ListParams::new()
            .filter("status", "active")
            .filter("city", json!(["Oslo", "Bergen"]))
            .filter("ignored", Value::Null);
        let built = params.apply(query(), "created_at");
        let filters = &built.request().filters;

        assert_eq!(filters.len(), 2);
        assert!(filters.contains(&Filter::in_list("city", ["Oslo", "Bergen"])));
        assert!(filters.contains(&Filter::eq("status", "active")));
    }

    #[test]
    fn defaults_to_configured_order_descending() {
        let built = ListParams::new().apply(query(), "created_at");
        assert_eq!(
            built.request().order,
            vec![OrderBy::new("created_at", SortDirection::Desc)]
        );
        assert_eq!(built.request().range, None);
    }

    #[test]
    fn paging_needs_both_page_and_limit() {
        let only_limit = ListParams {
            limit: Some(10),
            ..ListParams::default()
        };
        assert_eq!(only_limit.range(), None);
        assert_eq!(
            ListParams::new().page(2, 10).range(),
            Some(Range { from: 10, to: 19 })
        );
    }

    #[test]
    fn search_escapes_wildcards() {
        let built = ListParams::new().search(" 50%_off ").apply(query(), "created_at");
        assert_eq!(
            built.request().filters,
            vec![Filter::ilike(SEARCH_FIELD, r"%50\%\_off%")]
        );
    }

    #[test]
    fn deserializes_camel_case_params() {
        let params: ListParams = serde_json::from_value(json!({
            "filters": { "kind": "meetup" },
            "sortBy": "name",
            "sortDirection": "asc",
            "page": 1,
            "limit": 20
        }))
        .unwrap();
        assert_eq!(params.sort_direction, Some(SortDirection::Asc));
        assert_eq!(params.range(), Some(Range { from: 0, to: 19 }));
    }
}
