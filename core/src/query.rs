//! Query model for the entity store.
//!
//! A [`Query`] selects documents of one kind, optionally restricted to the
//! descendants of an ancestor key, filtered by a conjunction of
//! [`Predicate`]s, ordered by a list of [`SortKey`]s, and optionally
//! projected onto a subset of properties.
//!
//! # Repeated Properties
//!
//! A property holding a JSON array matches a predicate if *any* element
//! matches, and sorts by its smallest element.
//! This is how document stores treat multi-valued properties such as a
//! conference's topic list.
//!
//! # Missing Properties
//!
//! A document without the filtered property never matches, and a document
//! without a sorted property is excluded from ordered results.

use crate::entity::Document;
use crate::key::EntityKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `!=`
    Ne,
}

impl Operator {
    /// Symbolic form of the operator.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Ne => "!=",
        }
    }

    /// Every operator except `=` needs a range scan.
    #[must_use]
    pub const fn is_inequality(self) -> bool {
        !matches!(self, Self::Eq)
    }

    /// Apply the operator to the result of comparing a property to a value.
    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Ge => !matches!(ordering, Ordering::Less),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Le => !matches!(ordering, Ordering::Greater),
            Self::Ne => !matches!(ordering, Ordering::Equal),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A typed comparison value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Integer property
    Int(i64),
    /// String property (also dates and times in ISO form)
    Text(String),
    /// Key-valued property
    Key(EntityKey),
}

impl FieldValue {
    /// The JSON form this value takes inside a stored document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
            Self::Key(key) => serde_json::to_value(key).unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Key(key) => write!(f, "{key}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<EntityKey> for FieldValue {
    fn from(key: EntityKey) -> Self {
        Self::Key(key)
    }
}

/// A single filter condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Serialized property name
    pub field: String,
    /// Comparison operator
    pub operator: Operator,
    /// Value to compare against
    pub value: FieldValue,
}

impl Predicate {
    /// Create a predicate.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// True if `document` satisfies this predicate.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        let Some(property) = document.property(&self.field) else {
            return false;
        };
        let expected = self.value.to_json();
        let test = |candidate: &Value| {
            compare_values(candidate, &expected).is_some_and(|ord| self.operator.accepts(ord))
        };
        match property {
            Value::Array(items) => items.iter().any(test),
            scalar => test(scalar),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// One component of a sort order. Sorts are ascending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Serialized property name
    pub field: String,
}

impl SortKey {
    /// Ascending sort on `field`.
    #[must_use]
    pub fn ascending(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    fn sort_value<'a>(&self, document: &'a Document) -> Option<&'a Value> {
        match document.property(&self.field)? {
            Value::Array(items) => items.iter().reduce(|best, item| {
                if compare_values(item, best) == Some(Ordering::Less) {
                    item
                } else {
                    best
                }
            }),
            scalar => Some(scalar),
        }
    }
}

/// A query over one entity kind.
///
/// # Example
///
/// ```
/// use conference_core::query::{Operator, Query};
///
/// let query = Query::new("Conference")
///     .filter("city", Operator::Eq, "Paris")
///     .filter("maxAttendees", Operator::Gt, 50_i64)
///     .order_by("maxAttendees")
///     .order_by("name");
///
/// assert_eq!(query.predicates.len(), 2);
/// assert_eq!(query.order.len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Entity kind to scan
    pub kind: String,
    /// Restrict results to descendants of this key
    pub ancestor: Option<EntityKey>,
    /// Conjunction of filters, in the order they were added
    pub predicates: Vec<Predicate>,
    /// Sort order, most significant first
    pub order: Vec<SortKey>,
    /// Properties to keep in the results (`None` keeps everything)
    pub projection: Option<Vec<String>>,
}

impl Query {
    /// Query every entity of `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestor: None,
            predicates: Vec::new(),
            order: Vec::new(),
            projection: None,
        }
    }

    /// Restrict to descendants of `ancestor`.
    #[must_use]
    pub fn ancestor(mut self, ancestor: EntityKey) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    /// Add a filter.
    #[must_use]
    pub fn filter(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.predicates.push(Predicate::new(field, operator, value));
        self
    }

    /// Add a prebuilt predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Append an ascending sort key.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order.push(SortKey::ascending(field));
        self
    }

    /// Keep only the named properties in results.
    #[must_use]
    pub fn project(mut self, fields: &[&str]) -> Self {
        self.projection = Some(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    /// True if `document` is selected by kind, ancestor, and every predicate.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        document.key().kind() == self.kind
            && self
                .ancestor
                .as_ref()
                .is_none_or(|ancestor| document.key().is_descendant_of(ancestor))
            && self.predicates.iter().all(|p| p.matches(document))
            && self
                .order
                .iter()
                .all(|sort| document.property(&sort.field).is_some())
    }

    /// Order `documents` by this query's sort keys, then by key.
    pub fn sort(&self, documents: &mut [Document]) {
        documents.sort_by(|a, b| {
            for sort in &self.order {
                let ordering = match (sort.sort_value(a), sort.sort_value(b)) {
                    (Some(x), Some(y)) => total_compare(x, y),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.key().cmp(b.key())
        });
    }

    /// Select, order and project `documents`.
    #[must_use]
    pub fn apply<I>(&self, documents: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut selected: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.matches(doc))
            .collect();
        self.sort(&mut selected);
        if let Some(fields) = &self.projection {
            selected = selected.iter().map(|doc| doc.project(fields)).collect();
        }
        selected
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {}", self.kind)?;
        if let Some(ancestor) = &self.ancestor {
            write!(f, " ANCESTOR {ancestor}")?;
        }
        for (i, predicate) in self.predicates.iter().enumerate() {
            let joiner = if i == 0 { " WHERE" } else { " AND" };
            write!(f, "{joiner} {predicate}")?;
        }
        if !self.order.is_empty() {
            let fields: Vec<&str> = self.order.iter().map(|s| s.field.as_str()).collect();
            write!(f, " ORDER BY {}", fields.join(", "))?;
        }
        Ok(())
    }
}

/// Compare two JSON values of the same type.
///
/// Returns `None` for values of different types, which never match a
/// predicate.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => {
            Some(a.to_string().cmp(&b.to_string()))
        }
        _ => None,
    }
}

/// Total order over JSON values for sorting: null < bool < number < string <
/// everything else, then by value within a type.
fn total_compare(a: &Value, b: &Value) -> Ordering {
    const fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    compare_values(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}
