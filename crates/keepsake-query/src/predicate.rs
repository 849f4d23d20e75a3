use std::fmt;

/// A test applied to one field value: a literal to compare against, or an
/// arbitrary boolean function.
pub enum Predicate<V> {
    Equals(V),
    Test(Box<dyn Fn(&V) -> bool>),
}

impl<V: PartialEq> Predicate<V> {
    pub fn holds(&self, value: &V) -> bool {
        match self {
            Predicate::Equals(expected) => value == expected,
            Predicate::Test(test) => test(value),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Predicate<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Predicate::Test(_) => f.write_str("Test(..)"),
        }
    }
}

/// A predicate bound to the field it reads.
#[derive(Debug)]
pub struct Clause<V> {
    pub field: String,
    pub predicate: Predicate<V>,
}

/// How `filter` combines clause results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Match {
    /// Every clause must hold.
    #[default]
    All,
    /// At least one clause must hold.
    Any,
}

/// A set of field predicates.
///
/// ```
/// use keepsake_query::Query;
///
/// let query = Query::<i64>::new()
///     .eq("level", 3)
///     .test("score", |s| *s > 100);
/// assert_eq!(query.fields().collect::<Vec<_>>(), ["level", "score"]);
/// ```
#[derive(Debug)]
pub struct Query<V> {
    clauses: Vec<Clause<V>>,
    mode: Match,
}

impl<V> Query<V> {
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
            mode: Match::All,
        }
    }

    /// Require `field` to equal `value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<V>) -> Self {
        self.clauses.push(Clause {
            field: field.into(),
            predicate: Predicate::Equals(value.into()),
        });
        self
    }

    /// Require `test` to return true for `field`.
    pub fn test(mut self, field: impl Into<String>, test: impl Fn(&V) -> bool + 'static) -> Self {
        self.clauses.push(Clause {
            field: field.into(),
            predicate: Predicate::Test(Box::new(test)),
        });
        self
    }

    /// Match elements satisfying at least one clause instead of all.
    pub fn any(mut self) -> Self {
        self.mode = Match::Any;
        self
    }

    pub fn mode(&self) -> Match {
        self.mode
    }

    pub fn clauses(&self) -> &[Clause<V>] {
        &self.clauses
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|c| c.field.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl<V> Default for Query<V> {
    fn default() -> Self {
        Self::new()
    }
}
