use std::sync::{Mutex, MutexGuard};

use shared::domain::{ControlState, FilterKey, SortDirection, SortKey};
use url::form_urlencoded;

/// Converts between the typed control state and the flat key/value
/// representation used for shareable links.
///
/// The scheme is one `filter_<attr>=<pattern>` entry per active filter
/// and one `sort_<attr>=<ASC|DESC>` entry per active sort, using the
/// external attribute casing (`sort_oldValue`). Inactive entries are
/// omitted entirely.
pub fn encode(state: &ControlState) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for (key, pattern) in state.filters.iter() {
        entries.push((format!("filter_{}", key.query_key()), pattern.to_string()));
    }
    for (key, direction) in state.sorts.iter() {
        entries.push((
            format!("sort_{}", key.query_key()),
            direction.as_query_value().to_string(),
        ));
    }
    entries
}

/// Rebuilds control state from flat entries. Never fails: unknown keys
/// are skipped, an unparseable direction decodes as "no sort", and an
/// empty pattern decodes as "no constraint".
pub fn decode(entries: &[(String, String)]) -> ControlState {
    let mut state = ControlState::default();
    for (key, value) in entries {
        let Some((kind, attr)) = key.split_once('_') else {
            continue;
        };
        match kind {
            "filter" => {
                if let Some(key) = FilterKey::from_query_key(attr) {
                    if !value.is_empty() {
                        state.filters.set(key, Some(value.clone()));
                    }
                }
            }
            "sort" => {
                if let Some(key) = SortKey::from_query_key(attr) {
                    state.sorts.set(key, SortDirection::parse(value));
                }
            }
            _ => {}
        }
    }
    state
}

/// Renders control state as a percent-encoded query string (no leading
/// `?`).
pub fn encode_query_string(state: &ControlState) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in encode(state) {
        serializer.append_pair(&key, &value);
    }
    serializer.finish()
}

/// Parses a query string (with or without a leading `?`) into flat
/// entries, percent-decoding as it goes.
pub fn parse_query_string(raw: &str) -> Vec<(String, String)> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Parses a query string into control state, with the same fail-open
/// rules as [`decode`].
pub fn decode_query_string(raw: &str) -> ControlState {
    decode(&parse_query_string(raw))
}

/// The external query representation: a flat string-keyed store read
/// once at startup and rewritten wholesale on every control-state
/// change. The codec owns the entire representation, so `replace`
/// drops whatever was there before, related or not.
pub trait QueryStateStore: Send + Sync {
    fn read(&self) -> Vec<(String, String)>;
    fn replace(&self, entries: Vec<(String, String)>);
}

/// In-process query representation, used by the CLI and tests in place
/// of a real address bar.
#[derive(Default)]
pub struct MemoryQueryStore {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(entries: Vec<(String, String)>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn from_query_string(raw: &str) -> Self {
        Self::seeded(parse_query_string(raw))
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, String)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueryStateStore for MemoryQueryStore {
    fn read(&self) -> Vec<(String, String)> {
        self.lock().clone()
    }

    fn replace(&self, entries: Vec<(String, String)>) {
        *self.lock() = entries;
    }
}
