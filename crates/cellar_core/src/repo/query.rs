//! Parameterized predicate builder for filtered, paginated selects.
//!
//! Clause fragments are fixed strings chosen by the repositories; every
//! user-supplied value is carried as a bound parameter.

use crate::model::filters::{FullDomain, RangeFilter};
use rusqlite::types::Value;

/// Rewrites a contains-filter input into a `LIKE` pattern. Empty input
/// matches everything.
pub(crate) fn contains_pattern(needle: &str) -> String {
    if needle.is_empty() {
        "%".to_string()
    } else {
        format!("%{needle}%")
    }
}

#[derive(Debug, Clone)]
pub(crate) struct QueryBuilder {
    base: String,
    predicates: Vec<String>,
    params: Vec<Value>,
    order_by: Option<&'static str>,
    window: Option<(i64, i64)>,
}

impl QueryBuilder {
    /// Starts from a statement without a `WHERE` clause.
    pub(crate) fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            predicates: Vec::new(),
            params: Vec::new(),
            order_by: None,
            window: None,
        }
    }

    /// `column` case-insensitively contains `needle`.
    pub(crate) fn contains(&mut self, column: &'static str, needle: &str) -> &mut Self {
        self.predicates.push(format!("{column} LIKE ?"));
        self.params.push(Value::Text(contains_pattern(needle)));
        self
    }

    pub(crate) fn equals(&mut self, column: &'static str, value: impl Into<Value>) -> &mut Self {
        self.predicates.push(format!("{column} = ?"));
        self.params.push(value.into());
        self
    }

    pub(crate) fn between<T>(&mut self, column: &'static str, range: &RangeFilter<T>) -> &mut Self
    where
        T: FullDomain + Into<Value>,
    {
        let (low, high) = range.bounds();
        self.predicates.push(format!("{column} BETWEEN ? AND ?"));
        self.params.push(low.into());
        self.params.push(high.into());
        self
    }

    pub(crate) fn order_by(&mut self, column: &'static str) -> &mut Self {
        self.order_by = Some(column);
        self
    }

    /// Restricts the result to rows `begin..end`. An inverted range selects
    /// nothing.
    pub(crate) fn range(&mut self, begin: usize, end: usize) -> &mut Self {
        let limit = end.saturating_sub(begin);
        self.window = Some((to_i64(limit), to_i64(begin)));
        self
    }

    /// Final SQL text and its parameters in placeholder order.
    pub(crate) fn build(&self) -> (String, Vec<Value>) {
        let mut sql = self.base.clone();
        let mut params = self.params.clone();

        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }

        if let Some(column) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(column);
            sql.push_str(" ASC");
        }

        if let Some((limit, offset)) = self.window {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(limit));
            params.push(Value::Integer(offset));
        }

        (sql, params)
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{contains_pattern, QueryBuilder};
    use crate::model::filters::RangeFilter;
    use rusqlite::types::Value;

    #[test]
    fn empty_contains_input_matches_everything() {
        assert_eq!(contains_pattern(""), "%");
        assert_eq!(contains_pattern("noir"), "%noir%");
    }

    #[test]
    fn no_predicates_means_no_where_clause() {
        let (sql, params) = QueryBuilder::new("SELECT * FROM WINE").build();
        assert_eq!(sql, "SELECT * FROM WINE");
        assert!(params.is_empty());
    }

    #[test]
    fn predicates_are_joined_in_order_with_bound_values() {
        let mut builder = QueryBuilder::new("SELECT * FROM WINE");
        builder
            .contains("WINE.COUNTRY", "France")
            .between("WINE.VINTAGE", &RangeFilter::at_least(2000_i64))
            .order_by("WINE.ID")
            .range(20, 30);
        let (sql, params) = builder.build();

        assert_eq!(
            sql,
            "SELECT * FROM WINE WHERE WINE.COUNTRY LIKE ? AND WINE.VINTAGE BETWEEN ? AND ? \
             ORDER BY WINE.ID ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("%France%".to_string()),
                Value::Integer(2000),
                Value::Integer(i64::MAX),
                Value::Integer(10),
                Value::Integer(20),
            ]
        );
    }

    #[test]
    fn inverted_range_has_zero_limit() {
        let mut builder = QueryBuilder::new("SELECT ID FROM WINE");
        builder.range(10, 5);
        let (_, params) = builder.build();
        assert_eq!(params, vec![Value::Integer(0), Value::Integer(10)]);
    }
}
