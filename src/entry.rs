//! Time-keyed entries.
//!
//! An [`Entry`] pairs a [`TimeKey`](crate::traits::TimeKey) with an optional
//! value. `None` is an explicit null: the source knows the key exists but has
//! no value for it (yet). Range operations ending in `*_values` skip nulls;
//! `*_entries` operations keep them.

/// Immutable `(key, value)` pair within a series.
///
/// # Example
///
/// ```
/// use histkit::entry::Entry;
///
/// let entry = Entry::new(10u64, "ten");
/// assert_eq!(entry.key(), 10);
/// assert_eq!(entry.value(), Some(&"ten"));
///
/// let null: Entry<u64, &str> = Entry::null(11);
/// assert!(null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry<K, V> {
    key: K,
    value: Option<V>,
}

impl<K: Copy, V> Entry<K, V> {
    /// Creates an entry holding `value`.
    #[inline]
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value: Some(value),
        }
    }

    /// Creates an explicit null entry.
    #[inline]
    pub fn null(key: K) -> Self {
        Self { key, value: None }
    }

    /// Creates an entry from an optional value.
    #[inline]
    pub fn from_parts(key: K, value: Option<V>) -> Self {
        Self { key, value }
    }

    #[inline]
    pub fn key(&self) -> K {
        self.key
    }

    #[inline]
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Consumes the entry, returning its value.
    #[inline]
    pub fn into_value(self) -> Option<V> {
        self.value
    }

    /// Consumes the entry, returning key and value.
    #[inline]
    pub fn into_parts(self) -> (K, Option<V>) {
        (self.key, self.value)
    }

    pub(crate) fn set_value(&mut self, value: Option<V>) {
        self.value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_entry_has_no_value() {
        let entry: Entry<u32, String> = Entry::null(3);
        assert_eq!(entry.key(), 3);
        assert!(entry.is_null());
        assert_eq!(entry.into_value(), None);
    }

    #[test]
    fn from_parts_round_trips_into_parts() {
        let entry = Entry::from_parts(5u8, Some('x'));
        assert_eq!(entry.into_parts(), (5, Some('x')));
    }

    #[test]
    fn set_value_replaces_in_place() {
        let mut entry = Entry::null(1u64);
        entry.set_value(Some(9));
        assert_eq!(entry.value(), Some(&9));
    }
}
