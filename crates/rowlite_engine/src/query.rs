//! Select execution: projections, aggregates and the raw statement form.

use crate::cursor::Rows;
use crate::error::{EngineError, EngineResult};
use crate::predicate::Predicate;
use crate::row::ColumnMap;
use crate::table::Table;
use crate::value::Value;
use std::cmp::Ordering;

/// One parsed projection.
#[derive(Debug, Clone, PartialEq)]
enum Projection {
    /// `*`, meaning every declared column.
    All,
    /// A plain column reference.
    Column(String),
    /// An aggregate expression, keyed in the result by its original text.
    Aggregate {
        op: AggregateOp,
        column: Option<String>,
        label: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateOp {
    Count,
    Sum,
    Max,
    Min,
}

fn parse_projection(text: &str) -> Projection {
    let trimmed = text.trim();
    if trimmed == "*" {
        return Projection::All;
    }
    if let Some(open) = trimmed.find('(') {
        if trimmed.ends_with(')') {
            let head = trimmed[..open].trim();
            let inner = trimmed[open + 1..trimmed.len() - 1].trim();
            let op = match head.to_ascii_uppercase().as_str() {
                "COUNT" => Some(AggregateOp::Count),
                "SUM" => Some(AggregateOp::Sum),
                "MAX" => Some(AggregateOp::Max),
                "MIN" => Some(AggregateOp::Min),
                _ => None,
            };
            if let Some(op) = op {
                let column = match (op, inner) {
                    (AggregateOp::Count, "*" | "1") => None,
                    _ => Some(inner.to_string()),
                };
                return Projection::Aggregate {
                    op,
                    column,
                    label: trimmed.to_string(),
                };
            }
        }
    }
    Projection::Column(trimmed.to_string())
}

/// Runs a select over one table's rows.
///
/// Any aggregate projection collapses the result to a single row and the
/// clause's ordering/limit tail is ignored; otherwise matched rows are
/// sorted, limited and projected in clause order.
pub(crate) fn run_select(
    table: &Table,
    projections: &[&str],
    predicate: &Predicate,
    args: &[Value],
) -> EngineResult<Rows> {
    let parsed: Vec<Projection> = projections.iter().map(|p| parse_projection(p)).collect();
    if parsed.is_empty() {
        return Err(EngineError::parse("select needs at least one projection"));
    }
    for projection in &parsed {
        let referenced = match projection {
            Projection::All => None,
            Projection::Column(name) => Some(name),
            Projection::Aggregate { column, .. } => column.as_ref(),
        };
        if let Some(name) = referenced {
            if !table.has_column(name) {
                return Err(EngineError::column_not_found(&table.name, name));
            }
        }
    }

    let mut matched: Vec<&ColumnMap> = Vec::new();
    for row in table.row_values() {
        if predicate.matches(row, args)? {
            matched.push(row);
        }
    }

    let mut names = Vec::new();
    for projection in &parsed {
        match projection {
            Projection::All => names.extend(table.column_names()),
            Projection::Column(name) => names.push(name.clone()),
            Projection::Aggregate { label, .. } => names.push(label.clone()),
        }
    }

    if parsed
        .iter()
        .any(|p| matches!(p, Projection::Aggregate { .. }))
    {
        let mut out = ColumnMap::new();
        for projection in &parsed {
            match projection {
                Projection::All => {
                    for name in table.column_names() {
                        out.put(name.clone(), first_value(&matched, &name));
                    }
                }
                Projection::Column(name) => {
                    out.put(name.clone(), first_value(&matched, name));
                }
                Projection::Aggregate { op, column, label } => {
                    out.put(label.clone(), aggregate(*op, column.as_deref(), &matched));
                }
            }
        }
        return Ok(Rows::new(names, vec![out]));
    }

    let keys = predicate.order_keys();
    if !keys.is_empty() {
        matched.sort_by(|a, b| {
            for key in keys {
                let ord = key.compare(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    if let Some(limit) = predicate.limit() {
        let start = limit.offset.min(matched.len());
        let end = start.saturating_add(limit.count).min(matched.len());
        matched = matched[start..end].to_vec();
    }

    let rows = matched
        .into_iter()
        .map(|row| {
            let mut out = ColumnMap::new();
            for projection in &parsed {
                match projection {
                    Projection::All => {
                        for name in table.column_names() {
                            out.put(
                                name.clone(),
                                row.get(&name).cloned().unwrap_or(Value::Null),
                            );
                        }
                    }
                    Projection::Column(name) => {
                        out.put(
                            name.clone(),
                            row.get(name).cloned().unwrap_or(Value::Null),
                        );
                    }
                    Projection::Aggregate { .. } => {}
                }
            }
            out
        })
        .collect();

    Ok(Rows::new(names, rows))
}

/// First matched row's value for a plain column mixed into an aggregate
/// select; null when nothing matched.
fn first_value(matched: &[&ColumnMap], column: &str) -> Value {
    matched
        .first()
        .and_then(|row| row.get(column))
        .cloned()
        .unwrap_or(Value::Null)
}

fn aggregate<'a>(op: AggregateOp, column: Option<&'a str>, matched: &[&ColumnMap]) -> Value {
    let non_null = |column: &'a str| {
        matched
            .iter()
            .filter_map(move |row| row.get(column))
            .filter(|v| !v.is_null())
    };
    match (op, column) {
        (AggregateOp::Count, None) => Value::Integer(matched.len() as i64),
        (AggregateOp::Count, Some(column)) => Value::Integer(non_null(column).count() as i64),
        (AggregateOp::Sum, Some(column)) => {
            let values: Vec<&Value> = non_null(column).collect();
            if values.is_empty() {
                return Value::Null;
            }
            if values.iter().all(|v| matches!(v, Value::Integer(_))) {
                let mut total = 0i64;
                for value in &values {
                    total = total.wrapping_add(value.coerce_i64().unwrap_or(0));
                }
                Value::Integer(total)
            } else {
                let total: f64 = values.iter().filter_map(|v| v.coerce_f64()).sum();
                Value::Real(total)
            }
        }
        (AggregateOp::Max, Some(column)) => fold_extreme(non_null(column), Ordering::Greater),
        (AggregateOp::Min, Some(column)) => fold_extreme(non_null(column), Ordering::Less),
        // SUM/MAX/MIN always carry a column; COUNT is the only bare form.
        _ => Value::Null,
    }
}

fn fold_extreme<'a>(values: impl Iterator<Item = &'a Value>, keep: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in values {
        best = match best {
            None => Some(value),
            Some(current) => {
                if value.loose_cmp(current) == Some(keep) {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

/// A parsed raw statement: `SELECT <projections> FROM <table> [WHERE ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawSelect {
    pub(crate) table: String,
    pub(crate) projections: Vec<String>,
    pub(crate) clause: Option<String>,
}

/// Parses the minimal raw statement form.
///
/// Keywords are case-insensitive. Everything after `WHERE` (or directly
/// after the table name, for bare `ORDER BY`/`LIMIT` tails) is handed to
/// the clause parser untouched.
pub(crate) fn parse_raw_select(statement: &str) -> EngineResult<RawSelect> {
    let trimmed = statement.trim();
    let rest = strip_keyword(trimmed, "SELECT")
        .ok_or_else(|| EngineError::parse("only SELECT statements are supported"))?;

    let (from_start, from_end) = find_keyword(rest, "FROM")
        .ok_or_else(|| EngineError::parse("SELECT statement is missing FROM"))?;

    let projections: Vec<String> = rest[..from_start]
        .split(',')
        .map(|p| p.trim().to_string())
        .collect();
    if projections.iter().any(String::is_empty) {
        return Err(EngineError::parse("SELECT statement has an empty projection"));
    }

    let after_from = rest[from_end..].trim_start();
    let mut parts = after_from.splitn(2, char::is_whitespace);
    let table = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| EngineError::parse("SELECT statement is missing a table name"))?
        .to_string();

    let remainder = parts.next().map(str::trim).unwrap_or("");
    let clause = if remainder.is_empty() {
        None
    } else if let Some(filter) = strip_keyword(remainder, "WHERE") {
        Some(filter.trim().to_string())
    } else {
        Some(remainder.to_string())
    };

    Ok(RawSelect {
        table,
        projections,
        clause,
    })
}

/// Strips a leading keyword (case-insensitive, whitespace-delimited).
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    if rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_whitespace()) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Finds a whitespace-delimited keyword, case-insensitively.
fn find_keyword(text: &str, keyword: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let len = keyword.len();
    if bytes.len() < len {
        return None;
    }
    for start in 0..=bytes.len() - len {
        let Some(candidate) = text.get(start..start + len) else {
            continue;
        };
        if !candidate.eq_ignore_ascii_case(keyword) {
            continue;
        }
        let before_ok = start == 0 || bytes[start - 1].is_ascii_whitespace();
        let end = start + len;
        let after_ok = end == bytes.len() || bytes[end].is_ascii_whitespace();
        if before_ok && after_ok {
            return Some((start, end));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnDef;

    fn sample_table() -> Table {
        let columns = vec![
            ColumnDef::new("id").auto_increment(),
            ColumnDef::new("name"),
            ColumnDef::new("age"),
        ];
        let mut table = Table::new("users", &columns).unwrap();
        for (name, age) in [("Ann", 30), ("Bob", 40), ("Cay", 50)] {
            table
                .insert(&ColumnMap::new().with("name", name).with("age", age))
                .unwrap();
        }
        table
    }

    fn select(table: &Table, projections: &[&str], clause: Option<&str>) -> Rows {
        let predicate = Predicate::parse(clause).unwrap();
        run_select(table, projections, &predicate, &[]).unwrap()
    }

    #[test]
    fn star_projects_all_columns() {
        let table = sample_table();
        let rows = select(&table, &["*"], None);
        assert_eq!(rows.columns(), &["id", "name", "age"]);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn named_projection_drops_other_columns() {
        let table = sample_table();
        let rows = select(&table, &["name"], Some("age > 35"));
        assert_eq!(rows.len(), 2);
        assert!(rows.first().unwrap().get("age").is_none());
    }

    #[test]
    fn unknown_projection_column_is_an_error() {
        let table = sample_table();
        let predicate = Predicate::parse(None).unwrap();
        let result = run_select(&table, &["ghost"], &predicate, &[]);
        assert!(matches!(result, Err(EngineError::ColumnNotFound { .. })));
    }

    #[test]
    fn order_and_limit_shape_plain_selects() {
        let table = sample_table();
        let rows = select(&table, &["name"], Some("ORDER BY age DESC LIMIT 2"));
        let names: Vec<_> = rows.iter().filter_map(|r| r.get_text("name")).collect();
        assert_eq!(names, vec!["Cay", "Bob"]);
    }

    #[test]
    fn count_star_counts_matches() {
        let table = sample_table();
        let rows = select(&table, &["COUNT(1)"], Some("age < 45"));
        assert_eq!(rows.scalar_i64("COUNT(1)"), Some(2));
    }

    #[test]
    fn count_column_skips_nulls() {
        let mut table = sample_table();
        table.insert(&ColumnMap::new().with("name", "Dee")).unwrap();
        let rows = select(&table, &["COUNT(age)"], None);
        assert_eq!(rows.scalar_i64("COUNT(age)"), Some(3));
    }

    #[test]
    fn sum_max_min_over_integers() {
        let table = sample_table();
        let rows = select(&table, &["SUM(age)", "MAX(age)", "MIN(age)"], None);
        let row = rows.first().unwrap();
        assert_eq!(row.get_i64("SUM(age)"), Some(120));
        assert_eq!(row.get_i64("MAX(age)"), Some(50));
        assert_eq!(row.get_i64("MIN(age)"), Some(30));
    }

    #[test]
    fn sum_of_empty_match_is_null() {
        let table = sample_table();
        let rows = select(&table, &["SUM(age)"], Some("age > 100"));
        assert!(rows.first().unwrap().get("SUM(age)").unwrap().is_null());
    }

    #[test]
    fn aggregate_select_ignores_tail() {
        let table = sample_table();
        let rows = select(&table, &["COUNT(1)"], Some("ORDER BY age LIMIT 1"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.scalar_i64("COUNT(1)"), Some(3));
    }

    #[test]
    fn raw_select_with_where() {
        let parsed = parse_raw_select("SELECT name, age FROM users WHERE age > ?").unwrap();
        assert_eq!(parsed.table, "users");
        assert_eq!(parsed.projections, vec!["name", "age"]);
        assert_eq!(parsed.clause.as_deref(), Some("age > ?"));
    }

    #[test]
    fn raw_select_lowercase_keywords() {
        let parsed = parse_raw_select("select * from users where id = 1").unwrap();
        assert_eq!(parsed.table, "users");
        assert_eq!(parsed.projections, vec!["*"]);
        assert_eq!(parsed.clause.as_deref(), Some("id = 1"));
    }

    #[test]
    fn raw_select_bare_tail() {
        let parsed = parse_raw_select("SELECT name FROM users ORDER BY age DESC").unwrap();
        assert_eq!(parsed.clause.as_deref(), Some("ORDER BY age DESC"));
    }

    #[test]
    fn raw_select_without_clause() {
        let parsed = parse_raw_select("SELECT COUNT(1) FROM users").unwrap();
        assert_eq!(parsed.projections, vec!["COUNT(1)"]);
        assert_eq!(parsed.clause, None);
    }

    #[test]
    fn raw_select_rejects_other_statements() {
        assert!(parse_raw_select("DELETE FROM users").is_err());
        assert!(parse_raw_select("SELECT name users").is_err());
        assert!(parse_raw_select("SELECT , FROM users").is_err());
        assert!(parse_raw_select("SELECTX name FROM users").is_err());
    }
}
