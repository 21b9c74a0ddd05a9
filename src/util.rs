//! Small helpers shared by the protocol and connection layers.

/// Check whether `value` is one of `values`.
#[inline]
pub fn has_value(values: &[&str], value: &str) -> bool {
    values.iter().any(|v| *v == value)
}

/// Larger of two values.
#[inline]
pub fn max<T: PartialOrd>(a: T, b: T) -> T {
    if a >= b {
        a
    } else {
        b
    }
}

/// Generate a random identifier in canonical 36-character UUID form.
pub fn uuid() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_has_value() {
        let values = ["a", "b"];
        for _ in 0..3 {
            assert!(has_value(&values, "a"));
            assert!(!has_value(&values, "z"));
        }
    }

    #[test]
    fn test_has_value_empty_set() {
        assert!(!has_value(&[], "a"));
    }

    #[test]
    fn test_max() {
        assert_eq!(max(1i64, 2i64), 2);
        assert_eq!(max(2i64, 1i64), 2);
        assert_eq!(max(7u64, 7u64), 7);
    }

    #[test]
    fn test_uuid_shape() {
        let id = uuid();
        assert!(!id.is_empty());
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn test_uuid_no_collisions() {
        let ids: HashSet<String> = (0..10_000).map(|_| uuid()).collect();
        assert_eq!(ids.len(), 10_000);
        assert!(ids.iter().all(|id| id.len() == 36));
    }
}
