//! Partitioning of entry fields into special attributes and extra data.

use crate::domain::FieldValue;
use crate::normalize::normalize;
use crate::packet::{HttpRequest, Tags, User};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const LOGGER_KEY: &str = "logger";
pub const SERVER_NAME_KEY: &str = "server_name";
pub const HTTP_REQUEST_KEY: &str = "http_request";
pub const FINGERPRINT_KEY: &str = "fingerprint";
pub const EVENT_ID_KEY: &str = "event_id";
pub const TAGS_KEY: &str = "tags";
pub const USER_KEY: &str = "user";
pub const USER_ID_KEY: &str = "user_id";
pub const USER_EMAIL_KEY: &str = "user_email";
pub const USER_NAME_KEY: &str = "user_name";
pub const USER_IP_KEY: &str = "user_ip";

/// Transform applied to a field instead of normal normalization.
pub type ExtraFilter = Arc<dyn Fn(&FieldValue) -> FieldValue + Send + Sync>;

pub type IgnoreSet = HashSet<String>;

/// Fields routed to first-class packet attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialAttributes {
    pub logger: Option<String>,
    pub server_name: Option<String>,
    pub request: Option<HttpRequest>,
    pub fingerprint: Option<Vec<String>>,
    pub event_id: Option<String>,
    pub tags: Option<Tags>,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classified {
    pub special: SpecialAttributes,
    pub extra: BTreeMap<String, FieldValue>,
}

#[derive(Clone, Default)]
pub struct FieldClassifier {
    ignore: IgnoreSet,
    filters: HashMap<String, ExtraFilter>,
}

impl fmt::Debug for FieldClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldClassifier")
            .field("ignore", &self.ignore)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FieldClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ignore(&mut self, key: impl Into<String>) {
        self.ignore.insert(key.into());
    }

    pub fn add_extra_filter<F>(&mut self, key: impl Into<String>, filter: F)
    where
        F: Fn(&FieldValue) -> FieldValue + Send + Sync + 'static,
    {
        self.filters.insert(key.into(), Arc::new(filter));
    }

    pub fn ignored(&self) -> &IgnoreSet {
        &self.ignore
    }

    pub fn filter_keys(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn classify(&self, fields: &BTreeMap<String, FieldValue>) -> Classified {
        let mut out = Classified::default();
        let mut flat_user = User::default();

        for (key, value) in fields {
            let filter = self.filters.get(key);
            if filter.is_none() && self.ignore.contains(key) {
                continue;
            }
            if let Some(filter) = filter {
                out.extra.insert(key.clone(), filter(value));
                continue;
            }
            if route_special(&mut out.special, &mut flat_user, key, value) {
                continue;
            }
            out.extra.insert(key.clone(), normalize(value));
        }

        if !flat_user.is_empty() {
            let user = out.special.user.get_or_insert_with(User::default);
            user.id = user.id.take().or(flat_user.id);
            user.email = user.email.take().or(flat_user.email);
            user.username = user.username.take().or(flat_user.username);
            user.ip_address = user.ip_address.take().or(flat_user.ip_address);
        }

        out
    }
}

// Returns false when `key` is not reserved or its value has the wrong shape.
fn route_special(
    special: &mut SpecialAttributes,
    flat_user: &mut User,
    key: &str,
    value: &FieldValue,
) -> bool {
    let routed = match key {
        LOGGER_KEY => set(&mut special.logger, value.as_str().map(str::to_string)),
        SERVER_NAME_KEY => set(&mut special.server_name, value.as_str().map(str::to_string)),
        HTTP_REQUEST_KEY => match value {
            FieldValue::Request(req) => set(&mut special.request, Some(req.clone())),
            _ => false,
        },
        FINGERPRINT_KEY => set(&mut special.fingerprint, string_sequence(value)),
        EVENT_ID_KEY => set(&mut special.event_id, value.as_str().and_then(event_id)),
        TAGS_KEY => match value {
            FieldValue::Tags(tags) => set(&mut special.tags, Some(tags.clone())),
            _ => false,
        },
        USER_KEY => match value {
            FieldValue::User(user) => set(&mut special.user, Some(user.clone())),
            _ => false,
        },
        USER_ID_KEY => set(&mut flat_user.id, scalar_string(value)),
        USER_EMAIL_KEY => set(&mut flat_user.email, value.as_str().map(str::to_string)),
        USER_NAME_KEY => set(&mut flat_user.username, value.as_str().map(str::to_string)),
        USER_IP_KEY => set(&mut flat_user.ip_address, value.as_str().map(str::to_string)),
        _ => return false,
    };

    if !routed {
        debug!(
            "Reserved field '{}' has unexpected {} value, keeping it as extra data",
            key,
            value.kind()
        );
    }
    routed
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

fn string_sequence(value: &FieldValue) -> Option<Vec<String>> {
    match value {
        FieldValue::Strings(v) => Some(v.clone()),
        FieldValue::Json(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn scalar_string(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::String(s) => Some(s.clone()),
        FieldValue::I64(n) => Some(n.to_string()),
        FieldValue::U64(n) => Some(n.to_string()),
        _ => None,
    }
}

// Event ids are 32 hex chars; dashed UUIDs are accepted.
fn event_id(raw: &str) -> Option<String> {
    let id: String = raw.chars().filter(|c| *c != '-').collect();
    (id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit())).then(|| id.to_ascii_lowercase())
}
