//! Helpers for building predicate and projection text.
//!
//! Everything here produces plain strings for the `clause`/`projection`
//! parameters of the store surface. Arguments stay positional `?`
//! placeholders; values are always bound separately.

/// `column = ?`
#[must_use]
pub fn eq(column: &str) -> String {
    format!("{column} = ?")
}

/// `column != ?`
#[must_use]
pub fn ne(column: &str) -> String {
    format!("{column} != ?")
}

/// `column < ?`
#[must_use]
pub fn lt(column: &str) -> String {
    format!("{column} < ?")
}

/// `column <= ?`
#[must_use]
pub fn le(column: &str) -> String {
    format!("{column} <= ?")
}

/// `column > ?`
#[must_use]
pub fn gt(column: &str) -> String {
    format!("{column} > ?")
}

/// `column >= ?`
#[must_use]
pub fn ge(column: &str) -> String {
    format!("{column} >= ?")
}

/// `column LIKE ?`
#[must_use]
pub fn like(column: &str) -> String {
    format!("{column} LIKE ?")
}

/// `column IS NULL`
#[must_use]
pub fn is_null(column: &str) -> String {
    format!("{column} IS NULL")
}

/// `column IS NOT NULL`
#[must_use]
pub fn is_not_null(column: &str) -> String {
    format!("{column} IS NOT NULL")
}

/// `column IN (?, ?, ...)` with `count` placeholders.
#[must_use]
pub fn in_params(column: &str, count: usize) -> String {
    let mut out = format!("{column} IN (");
    for index in 0..count {
        if index > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out.push(')');
    out
}

/// `(left) AND (right)`
#[must_use]
pub fn and(left: &str, right: &str) -> String {
    format!("({left}) AND ({right})")
}

/// `(left) OR (right)`
#[must_use]
pub fn or(left: &str, right: &str) -> String {
    format!("({left}) OR ({right})")
}

/// Appends `ORDER BY column` to a clause, which may be empty.
#[must_use]
pub fn order_by(clause: &str, column: &str) -> String {
    append(clause, &format!("ORDER BY {column}"))
}

/// Appends `ORDER BY column DESC` to a clause, which may be empty.
#[must_use]
pub fn order_by_desc(clause: &str, column: &str) -> String {
    append(clause, &format!("ORDER BY {column} DESC"))
}

/// Appends `LIMIT count` to a clause, which may be empty.
#[must_use]
pub fn limit(clause: &str, count: usize) -> String {
    append(clause, &format!("LIMIT {count}"))
}

/// Appends `LIMIT count OFFSET skip` to a clause, which may be empty.
#[must_use]
pub fn limit_offset(clause: &str, count: usize, skip: usize) -> String {
    append(clause, &format!("LIMIT {count} OFFSET {skip}"))
}

fn append(clause: &str, tail: &str) -> String {
    if clause.is_empty() {
        tail.to_string()
    } else {
        format!("{clause} {tail}")
    }
}

/// `COUNT(1)`
#[must_use]
pub fn count() -> String {
    "COUNT(1)".to_string()
}

/// `COUNT(column)`, counting non-null values.
#[must_use]
pub fn count_column(column: &str) -> String {
    format!("COUNT({column})")
}

/// `SUM(column)`
#[must_use]
pub fn sum(column: &str) -> String {
    format!("SUM({column})")
}

/// `MAX(column)`
#[must_use]
pub fn max(column: &str) -> String {
    format!("MAX({column})")
}

/// `MIN(column)`
#[must_use]
pub fn min(column: &str) -> String {
    format!("MIN({column})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_helpers() {
        assert_eq!(eq("name"), "name = ?");
        assert_eq!(ge("age"), "age >= ?");
        assert_eq!(like("name"), "name LIKE ?");
        assert_eq!(is_null("deleted_at"), "deleted_at IS NULL");
    }

    #[test]
    fn in_params_counts_placeholders() {
        assert_eq!(in_params("id", 3), "id IN (?, ?, ?)");
        assert_eq!(in_params("id", 1), "id IN (?)");
        assert_eq!(in_params("id", 0), "id IN ()");
    }

    #[test]
    fn combinators_parenthesize() {
        assert_eq!(
            and(&eq("name"), &gt("age")),
            "(name = ?) AND (age > ?)"
        );
        assert_eq!(or("a = ?", "b = ?"), "(a = ?) OR (b = ?)");
    }

    #[test]
    fn tails_append_to_clauses() {
        assert_eq!(order_by("age > ?", "name"), "age > ? ORDER BY name");
        assert_eq!(order_by_desc("", "age"), "ORDER BY age DESC");
        assert_eq!(limit_offset("age > ?", 10, 5), "age > ? LIMIT 10 OFFSET 5");
    }

    #[test]
    fn aggregate_projections() {
        assert_eq!(count(), "COUNT(1)");
        assert_eq!(sum("age"), "SUM(age)");
        assert_eq!(min("age"), "MIN(age)");
    }
}
