use std::any::{Any, type_name};
use std::fmt;

/// Type-erased (key, value) pair attached by `Context::with_value`.
///
/// Keys compare equal only when they have the same concrete type and `==`
/// holds, so two libraries using different key types can never collide.
pub(crate) struct Entry {
    key: Box<dyn Any + Send + Sync>,
    value: Box<dyn Any + Send + Sync>,
    key_repr: String,
    value_type: &'static str,
}

impl Entry {
    pub(crate) fn new<K, V>(key: K, value: V) -> Self
    where
        K: Any + Eq + fmt::Debug + Send + Sync,
        V: Any + Send + Sync,
    {
        Self {
            key_repr: format!("{key:?}"),
            value_type: type_name::<V>(),
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub(crate) fn matches<K: Any + Eq>(&self, key: &K) -> bool {
        self.key.downcast_ref::<K>().is_some_and(|k| k == key)
    }

    pub(crate) fn value<V: Any>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.key_repr, self.value_type)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key_repr)
            .field("value_type", &self.value_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct RequestId;

    #[test]
    fn matches_same_type_and_value() {
        let e = Entry::new("user", "alice");
        assert!(e.matches(&"user"));
        assert!(!e.matches(&"other"));
    }

    #[test]
    fn different_key_types_never_match() {
        let e = Entry::new(RequestId, 42u32);
        assert!(e.matches(&RequestId));
        assert!(!e.matches(&"RequestId"));
        assert!(!e.matches(&0u8));
    }

    #[test]
    fn value_downcast_requires_exact_type() {
        let e = Entry::new(1u8, String::from("x"));
        assert_eq!(e.value::<String>().map(String::as_str), Some("x"));
        assert!(e.value::<&str>().is_none());
    }

    #[test]
    fn display_shows_key_and_value_type() {
        let e = Entry::new("b", "B");
        assert_eq!(e.to_string(), "\"b\", &str");
    }
}
