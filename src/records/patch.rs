use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One field of a sparse update.
///
/// `Unset` (key absent) keeps the stored value, `Null` clears it and `Value`
/// replaces it. Fields must carry `#[serde(default)]` so an absent key
/// deserializes to `Unset` rather than `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Unset,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T> Patch<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Patch<U> {
        match self {
            Patch::Unset => Patch::Unset,
            Patch::Null => Patch::Null,
            Patch::Value(v) => Patch::Value(f(v)),
        }
    }
}

impl<T: Into<Value>> Patch<T> {
    pub fn into_json(self) -> Patch<Value> {
        self.map(Into::into)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}
