//! # Query Composition
//!
//! Builds the WHERE clause of a repository SELECT from three independent
//! lists, all ANDed together:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Criteria → SELECT                                    │
//! │                                                                         │
//! │  equals   [("title", "a")]          → title = $1                       │
//! │  filters  [Filter::gt("views", 3)]  → views > $2                       │
//! │  clauses  [Clause("a OR b = ?")]    → (a OR b = $3)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT * FROM notes WHERE title = $1 AND views > $2 AND (a OR b = $3) │
//! │                                                                         │
//! │  No ordering or LIMIT is ever added unless the caller asks for one.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{QueryError, QueryResult};
use crate::statement::{validate_identifier, Placeholders, Statement};
use crate::value::Value;

// =============================================================================
// Filters
// =============================================================================

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl Operator {
    fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: String,
    operator: Operator,
    operands: Vec<Value>,
}

impl Filter {
    fn binary(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Filter {
            column: column.into(),
            operator,
            operands: vec![value.into()],
        }
    }

    fn unary(column: impl Into<String>, operator: Operator) -> Self {
        Filter {
            column: column.into(),
            operator,
            operands: Vec::new(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, Operator::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, Operator::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, Operator::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, Operator::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, Operator::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::binary(column, Operator::Ge, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Self::binary(column, Operator::Like, pattern)
    }

    /// `column IN (..)`. An empty list matches nothing.
    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter {
            column: column.into(),
            operator: Operator::In,
            operands: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::unary(column, Operator::IsNull)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::unary(column, Operator::IsNotNull)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    fn render(
        &self,
        placeholders: &mut Placeholders,
        params: &mut Vec<Value>,
    ) -> QueryResult<String> {
        let column = validate_identifier(&self.column)?;

        // `= NULL` never matches in SQL; compare with IS [NOT] NULL instead.
        let operator = match (self.operator, self.operands.first()) {
            (Operator::Eq, Some(Value::Null)) => Operator::IsNull,
            (Operator::Ne, Some(Value::Null)) => Operator::IsNotNull,
            (operator, _) => operator,
        };

        let sql = match operator {
            Operator::IsNull | Operator::IsNotNull => {
                format!("{} {}", column, operator.as_sql())
            }
            Operator::In if self.operands.is_empty() => "1 = 0".to_string(),
            Operator::In => {
                let markers: Vec<String> = self
                    .operands
                    .iter()
                    .map(|value| {
                        params.push(value.clone());
                        placeholders.next_marker()
                    })
                    .collect();
                format!("{} IN ({})", column, markers.join(", "))
            }
            operator => {
                let value = self.operands.first().cloned().unwrap_or(Value::Null);
                params.push(value);
                format!("{} {} {}", column, operator.as_sql(), placeholders.next_marker())
            }
        };

        Ok(sql)
    }
}

// =============================================================================
// Raw Clauses
// =============================================================================

/// A raw boolean SQL expression with `?` parameter markers.
///
/// A `?` inside a single-quoted literal or a double-quoted identifier is
/// text, not a marker. Write `??` for an operator such as PostgreSQL's
/// jsonb `?`.
///
/// ## Example
/// ```rust
/// use strata_core::Clause;
///
/// let clause = Clause::new("views > ? OR title = ?", [3.into(), "pinned".into()]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    sql: String,
    params: Vec<Value>,
}

impl Clause {
    pub fn new(sql: impl Into<String>, params: impl IntoIterator<Item = Value>) -> Self {
        Clause {
            sql: sql.into(),
            params: params.into_iter().collect(),
        }
    }

    /// A clause without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, [])
    }

    fn render(
        &self,
        placeholders: &mut Placeholders,
        params: &mut Vec<Value>,
    ) -> QueryResult<String> {
        let pieces = split_markers(&self.sql);
        let markers = pieces.len() - 1;
        if markers != self.params.len() {
            return Err(QueryError::ParameterCount {
                sql: self.sql.clone(),
                placeholders: markers,
                params: self.params.len(),
            });
        }

        let mut rendered = String::with_capacity(self.sql.len() + 2);
        rendered.push('(');
        for (index, piece) in pieces.iter().enumerate() {
            rendered.push_str(piece);
            if index < markers {
                rendered.push_str(&placeholders.next_marker());
            }
        }
        rendered.push(')');

        params.extend(self.params.iter().cloned());
        Ok(rendered)
    }
}

/// Splits raw SQL at its `?` markers, skipping quoted text and turning `??`
/// into a literal `?`. There is always one more piece than markers.
fn split_markers(sql: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::with_capacity(sql.len());
    let mut quote = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(open) => {
                current.push(c);
                if c == open {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '?' if chars.peek() == Some(&'?') => {
                    chars.next();
                    current.push('?');
                }
                '?' => pieces.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }

    pieces.push(current);
    pieces
}

// =============================================================================
// Criteria
// =============================================================================

/// Sort direction for an explicit ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// The filtering part of a repository SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    equals: Vec<(String, Value)>,
    filters: Vec<Filter>,
    clauses: Vec<Clause>,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
}

impl Criteria {
    /// Adds `column = value` (keyword-style equality).
    pub fn filter_by(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((column.into(), value.into()));
        self
    }

    /// Adds a predicate filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a raw where clause.
    pub fn where_clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Adds an explicit ORDER BY term.
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    /// Caps the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when no condition of any kind has been added.
    pub fn is_unfiltered(&self) -> bool {
        self.equals.is_empty() && self.filters.is_empty() && self.clauses.is_empty()
    }

    /// Renders `SELECT * FROM table [WHERE ..] [ORDER BY ..] [LIMIT ..]`.
    pub fn to_select(&self, table: &str) -> QueryResult<Statement> {
        validate_identifier(table)?;

        let mut placeholders = Placeholders::default();
        let mut params = Vec::new();
        let mut conditions = Vec::new();

        for (column, value) in &self.equals {
            let filter = Filter::eq(column.clone(), value.clone());
            conditions.push(filter.render(&mut placeholders, &mut params)?);
        }
        for filter in &self.filters {
            conditions.push(filter.render(&mut placeholders, &mut params)?);
        }
        for clause in &self.clauses {
            conditions.push(clause.render(&mut placeholders, &mut params)?);
        }

        let mut sql = format!("SELECT * FROM {}", table);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|(column, order)| {
                    let direction = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    validate_identifier(column).map(|column| format!("{} {}", column, direction))
                })
                .collect::<QueryResult<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok(Statement::with_params(sql, params))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_criteria_selects_everything() {
        let stmt = Criteria::default().to_select("notes").unwrap();

        assert_eq!(stmt.sql(), "SELECT * FROM notes");
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_all_three_lists_are_anded_in_order() {
        let stmt = Criteria::default()
            .filter_by("title", "a")
            .filter(Filter::gt("views", 3))
            .where_clause(Clause::new("body LIKE ? OR views = ?", ["%x%".into(), 0.into()]))
            .to_select("notes")
            .unwrap();

        assert_eq!(
            stmt.sql(),
            "SELECT * FROM notes WHERE title = $1 AND views > $2 AND (body LIKE $3 OR views = $4)"
        );
        assert_eq!(
            stmt.params(),
            &[
                Value::from("a"),
                Value::from(3),
                Value::from("%x%"),
                Value::from(0)
            ]
        );
    }

    #[test]
    fn test_null_equality_becomes_is_null() {
        let none: Option<String> = None;
        let stmt = Criteria::default()
            .filter_by("archived_at", none)
            .filter(Filter::ne("deleted_at", Value::Null))
            .to_select("notes")
            .unwrap();

        assert_eq!(
            stmt.sql(),
            "SELECT * FROM notes WHERE archived_at IS NULL AND deleted_at IS NOT NULL"
        );
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_in_list() {
        let stmt = Criteria::default()
            .filter(Filter::in_list("id", [1, 2, 3]))
            .to_select("notes")
            .unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM notes WHERE id IN ($1, $2, $3)");

        let empty: Vec<i64> = Vec::new();
        let stmt = Criteria::default()
            .filter(Filter::in_list("id", empty))
            .to_select("notes")
            .unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM notes WHERE 1 = 0");
    }

    #[test]
    fn test_clause_parameter_mismatch_is_rejected() {
        let err = Criteria::default()
            .where_clause(Clause::raw("views > ?"))
            .to_select("notes")
            .unwrap_err();

        assert!(matches!(
            err,
            QueryError::ParameterCount {
                placeholders: 1,
                params: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_quoted_question_marks_are_text() {
        let stmt = Criteria::default()
            .where_clause(Clause::raw("title = '?' OR \"odd?\" = 1"))
            .where_clause(Clause::new("body = 'it''s ?' AND views = ?", [2.into()]))
            .to_select("notes")
            .unwrap();

        assert_eq!(
            stmt.sql(),
            "SELECT * FROM notes WHERE (title = '?' OR \"odd?\" = 1) AND (body = 'it''s ?' AND views = $1)"
        );
        assert_eq!(stmt.params(), &[Value::from(2)]);
    }

    #[test]
    fn test_doubled_marker_is_a_literal_operator() {
        let stmt = Criteria::default()
            .where_clause(Clause::new("tags ?? ? AND id = ?", ["urgent".into(), 1.into()]))
            .to_select("notes")
            .unwrap();

        assert_eq!(stmt.sql(), "SELECT * FROM notes WHERE (tags ? $1 AND id = $2)");
        assert_eq!(stmt.params().len(), 2);
    }

    #[test]
    fn test_order_and_limit_only_when_requested() {
        let stmt = Criteria::default()
            .order_by("views", Order::Desc)
            .order_by("id", Order::Asc)
            .limit(10)
            .to_select("notes")
            .unwrap();

        assert_eq!(
            stmt.sql(),
            "SELECT * FROM notes ORDER BY views DESC, id ASC LIMIT 10"
        );
    }

    #[test]
    fn test_invalid_column_is_rejected() {
        let err = Criteria::default()
            .filter_by("title = 1 OR 1", "x")
            .to_select("notes")
            .unwrap_err();

        assert!(matches!(err, QueryError::InvalidIdentifier(_)));
    }
}
