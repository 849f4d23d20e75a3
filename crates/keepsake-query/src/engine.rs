use crate::predicate::{Clause, Match, Query};

/// Something whose fields can be read by name for query evaluation.
pub trait Queryable {
    type Value: PartialEq;
    type Error;

    /// Read a field, resolving it first if it is stored lazily.
    fn field_value(&self, field: &str) -> Result<Self::Value, Self::Error>;
}

fn clause_holds<T: Queryable>(item: &T, clause: &Clause<T::Value>) -> Result<bool, T::Error> {
    let value = item.field_value(&clause.field)?;
    Ok(clause.predicate.holds(&value))
}

/// Whether `item` satisfies the query: every clause, or at least one in
/// [`Match::Any`] mode. An empty query matches in `All` mode only.
pub fn matches<T: Queryable>(item: &T, query: &Query<T::Value>) -> Result<bool, T::Error> {
    match query.mode() {
        Match::All => {
            for clause in query.clauses() {
                if !clause_holds(item, clause)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Match::Any => {
            for clause in query.clauses() {
                if clause_holds(item, clause)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Whether every clause of the query is false for `item`.
pub fn rejects<T: Queryable>(item: &T, query: &Query<T::Value>) -> Result<bool, T::Error> {
    for clause in query.clauses() {
        if clause_holds(item, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Keep the items that match the query.
pub fn filter<T, I>(items: I, query: &Query<T::Value>) -> Result<Vec<T>, T::Error>
where
    T: Queryable,
    I: IntoIterator<Item = T>,
{
    select(items, |item| matches(item, query), "filter")
}

/// Keep the items for which every clause is false.
pub fn exclude<T, I>(items: I, query: &Query<T::Value>) -> Result<Vec<T>, T::Error>
where
    T: Queryable,
    I: IntoIterator<Item = T>,
{
    select(items, |item| rejects(item, query), "exclude")
}

fn select<T, I, F>(items: I, mut keep: F, op: &'static str) -> Result<Vec<T>, T::Error>
where
    T: Queryable,
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> Result<bool, T::Error>,
{
    let mut kept = Vec::new();
    let mut seen = 0usize;
    for item in items {
        seen += 1;
        if keep(&item)? {
            kept.push(item);
        }
    }
    tracing::trace!(op, seen, kept = kept.len(), "query evaluated");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: &'static str,
        level: i64,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Cell {
        Text(&'static str),
        Num(i64),
    }

    impl From<i64> for Cell {
        fn from(n: i64) -> Self {
            Cell::Num(n)
        }
    }

    impl From<&'static str> for Cell {
        fn from(s: &'static str) -> Self {
            Cell::Text(s)
        }
    }

    impl Queryable for Row {
        type Value = Cell;
        type Error = String;

        fn field_value(&self, field: &str) -> Result<Cell, String> {
            match field {
                "name" => Ok(Cell::Text(self.name)),
                "level" => Ok(Cell::Num(self.level)),
                other => Err(format!("no field {other}")),
            }
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "ada", level: 3 },
            Row { name: "bob", level: 1 },
            Row { name: "cy", level: 3 },
        ]
    }

    fn level(cell: &Cell) -> i64 {
        match cell {
            Cell::Num(n) => *n,
            Cell::Text(_) => 0,
        }
    }

    #[test]
    fn test_filter_all_clauses() {
        let query = Query::<Cell>::new()
            .eq("level", 3i64)
            .test("name", |c| c != &Cell::Text("cy"));
        let kept = filter(rows(), &query).unwrap();
        assert_eq!(kept, vec![Row { name: "ada", level: 3 }]);
    }

    #[test]
    fn test_filter_any_clause() {
        let query = Query::new().eq("name", "bob").eq("name", "cy").any();
        let kept = filter(rows(), &query).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_exclude_requires_every_clause_false() {
        // ada: level 3 holds -> kept out; bob: both false -> kept; cy: level holds.
        let query = Query::new().eq("level", 3i64).eq("name", "zed");
        let kept = exclude(rows(), &query).unwrap();
        assert_eq!(kept, vec![Row { name: "bob", level: 1 }]);

        // One clause true is enough to drop an element.
        let query = Query::new().eq("level", 1i64).eq("name", "ada");
        let kept = exclude(rows(), &query).unwrap();
        assert_eq!(kept, vec![Row { name: "cy", level: 3 }]);
    }

    #[test]
    fn test_single_predicate_partitions() {
        let query = Query::<Cell>::new().test("level", |c| level(c) > 2);
        let kept = filter(rows(), &query).unwrap();
        let dropped = exclude(rows(), &query).unwrap();
        assert_eq!(kept.len() + dropped.len(), rows().len());
        assert!(kept.iter().all(|r| !dropped.contains(r)));
    }

    #[test]
    fn test_empty_query() {
        let query: Query<Cell> = Query::new();
        assert_eq!(filter(rows(), &query).unwrap().len(), 3);
        assert_eq!(exclude(rows(), &query).unwrap().len(), 3);
        assert!(filter(rows(), &Query::new().any()).unwrap().is_empty());
    }

    #[test]
    fn test_field_errors_propagate() {
        let query = Query::new().eq("missing", 1i64);
        assert_eq!(filter(rows(), &query).unwrap_err(), "no field missing");
    }
}
