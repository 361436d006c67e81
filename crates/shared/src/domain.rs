use std::collections::{btree_set, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable identifier of a record. Ids are independent of dataset
/// identity: a starred id may reference a record that is not currently
/// loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

/// A single row of the dataset: a unique id plus an opaque attribute
/// bag. Attributes are keyed by the fixed names the table knows about
/// (`name`, `date`, `title`, `field`, `old_value`, `new_value`), but
/// nothing prevents a source from shipping extra keys or non-string
/// values; consumers read attributes through [`Record::text_attr`] and
/// treat anything that is not text as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Record {
    pub fn new(id: i64) -> Self {
        Self {
            id: RecordId(id),
            attrs: Map::new(),
        }
    }

    pub fn with_text(mut self, attr: &str, value: &str) -> Self {
        self.attrs
            .insert(attr.to_string(), Value::String(value.to_string()));
        self
    }

    /// Reads an attribute as text. Missing attributes and non-string
    /// values both read as `None`.
    pub fn text_attr(&self, attr: &str) -> Option<&str> {
        self.attrs.get(attr).and_then(Value::as_str)
    }
}

/// Attributes a user can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    Name,
    Date,
    Title,
    Field,
}

impl FilterKey {
    pub const ALL: [FilterKey; 4] = [
        FilterKey::Name,
        FilterKey::Date,
        FilterKey::Title,
        FilterKey::Field,
    ];

    /// The record attribute this filter reads.
    pub fn attr_name(self) -> &'static str {
        match self {
            FilterKey::Name => "name",
            FilterKey::Date => "date",
            FilterKey::Title => "title",
            FilterKey::Field => "field",
        }
    }

    /// The `<attr>` part of the external `filter_<attr>` query key.
    pub fn query_key(self) -> &'static str {
        self.attr_name()
    }

    pub fn from_query_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.query_key() == key)
    }
}

/// Attributes a user can sort by. Declaration order is the pass order
/// the engine applies when several sorts are active at once, matching
/// the column order of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortKey {
    Name,
    Date,
    Title,
    Field,
    OldValue,
    NewValue,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::Name,
        SortKey::Date,
        SortKey::Title,
        SortKey::Field,
        SortKey::OldValue,
        SortKey::NewValue,
    ];

    /// The record attribute this sort compares. Note the snake_case
    /// names for the value columns.
    pub fn attr_name(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Date => "date",
            SortKey::Title => "title",
            SortKey::Field => "field",
            SortKey::OldValue => "old_value",
            SortKey::NewValue => "new_value",
        }
    }

    /// The `<attr>` part of the external `sort_<attr>` query key. The
    /// external representation uses camelCase for the value columns
    /// (`sort_oldValue`), while the record attribute is `old_value`;
    /// both spellings are kept deliberately so existing shared links
    /// stay valid.
    pub fn query_key(self) -> &'static str {
        match self {
            SortKey::OldValue => "oldValue",
            SortKey::NewValue => "newValue",
            other => other.attr_name(),
        }
    }

    pub fn from_query_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.query_key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// External query value (`ASC`/`DESC`).
    pub fn as_query_value(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }

    /// Parses an external direction value. Anything unrecognized is
    /// `None`, which callers treat as "no sort".
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ASC" => Some(SortDirection::Ascending),
            "DESC" => Some(SortDirection::Descending),
            _ => None,
        }
    }
}

/// Per-attribute substring patterns. An absent key means "no constraint
/// on this attribute".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    patterns: BTreeMap<FilterKey, String>,
}

impl FilterSet {
    /// Sets or clears the pattern for one attribute. `None` removes the
    /// constraint entirely.
    pub fn set(&mut self, key: FilterKey, pattern: Option<String>) {
        match pattern {
            Some(pattern) => {
                self.patterns.insert(key, pattern);
            }
            None => {
                self.patterns.remove(&key);
            }
        }
    }

    pub fn pattern(&self, key: FilterKey) -> Option<&str> {
        self.patterns.get(&key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &str)> {
        self.patterns.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Active sort directions. An absent key means direction "none". The
/// map structurally admits several simultaneous entries; the engine
/// applies them as sequential passes (see `view_core::engine`), so only
/// single-key sorts produce a meaningful total order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    directions: BTreeMap<SortKey, SortDirection>,
}

impl SortSpec {
    pub fn set(&mut self, key: SortKey, direction: Option<SortDirection>) {
        match direction {
            Some(direction) => {
                self.directions.insert(key, direction);
            }
            None => {
                self.directions.remove(&key);
            }
        }
    }

    /// Applies a sort request: asking for the direction that is already
    /// active cancels the sort on that attribute. Other attributes are
    /// left untouched.
    pub fn toggle(&mut self, key: SortKey, direction: SortDirection) {
        if self.directions.get(&key) == Some(&direction) {
            self.directions.remove(&key);
        } else {
            self.directions.insert(key, direction);
        }
    }

    pub fn direction(&self, key: SortKey) -> Option<SortDirection> {
        self.directions.get(&key).copied()
    }

    /// Entries in fixed pass order (the `SortKey` declaration order).
    pub fn iter(&self) -> impl Iterator<Item = (SortKey, SortDirection)> + '_ {
        self.directions.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }
}

/// The externally-serializable part of the table state: what the query
/// codec mirrors into a shareable representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub filters: FilterSet,
    pub sorts: SortSpec,
}

/// Record ids the user has starred. Serialized as a plain JSON id
/// array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StarredSet {
    ids: BTreeSet<RecordId>,
}

impl StarredSet {
    /// Removes the id if present, inserts it otherwise. Toggling twice
    /// restores the original set.
    pub fn toggle(&mut self, id: RecordId) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, RecordId> {
        self.ids.iter()
    }
}
