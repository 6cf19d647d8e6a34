//! Explicit presence/absence for normalized record fields.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A normalized field value.
///
/// `Missing` is distinct from an empty string: blank input is normalized to
/// `Missing`, so presence is always decidable without inspecting the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Field<T> {
    #[default]
    Missing,
    Present(T),
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Missing => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Missing => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Present(v) => Field::Present(f(v)),
            Field::Missing => Field::Missing,
        }
    }
}

impl<T: Clone> Field<T> {
    /// Copy `donor` into `self` if `self` is missing. Never overwrites.
    ///
    /// Returns `true` when a value was filled in.
    pub fn fill_from(&mut self, donor: &Field<T>) -> bool {
        if self.is_missing() {
            if let Field::Present(v) = donor {
                *self = Field::Present(v.clone());
                return true;
            }
        }
        false
    }
}

impl Field<String> {
    /// Normalize free text: trims, and maps blank input to `Missing`.
    pub fn text(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Field::Present(v.to_string()),
            _ => Field::Missing,
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.get().map(String::as_str)
    }
}

impl<T> Field<Vec<T>> {
    /// An empty list is treated as missing.
    pub fn list(values: Vec<T>) -> Self {
        if values.is_empty() {
            Field::Missing
        } else {
            Field::Present(values)
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Present(v),
            None => Field::Missing,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}
