//! Multi-valued attribute deduplication.
//!
//! Source systems routinely emit the same value more than once for a
//! multi-valued field. Each incoming value list is reduced to its unique
//! subset before it is compared against anything persisted.

use std::collections::HashSet;
use std::hash::Hash;

/// Return the unique values of `values`, keeping first-occurrence order.
///
/// Equality is the type's own `Eq`; for [`AttributeValue`](crate::value::AttributeValue)
/// that means byte-for-byte text comparison with no case folding.
#[must_use]
pub fn deduplicate<T>(values: &[T]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut seen = HashSet::with_capacity(values.len());
    values
        .iter()
        .filter(|value| seen.insert(*value))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeValue;
    use uuid::Uuid;

    fn texts(values: &[&str]) -> Vec<AttributeValue> {
        values.iter().map(|v| AttributeValue::from(*v)).collect()
    }

    #[test]
    fn test_case_variants_are_distinct() {
        let result = deduplicate(&texts(&["cert-a", "CERT-A", "Cert-A"]));
        assert_eq!(result, texts(&["cert-a", "CERT-A", "Cert-A"]));
    }

    #[test]
    fn test_repeated_values_collapse() {
        let result = deduplicate(&texts(&["CERT-A", "CERT-B", "CERT-A", "CERT-C", "CERT-B"]));
        assert_eq!(result, texts(&["CERT-A", "CERT-B", "CERT-C"]));

        let result = deduplicate(&texts(&["A", "B", "A", "C", "B", "A"]));
        assert_eq!(result, texts(&["A", "B", "C"]));
    }

    #[test]
    fn test_single_and_empty_pass_through() {
        assert_eq!(deduplicate(&texts(&["only"])), texts(&["only"]));
        assert!(deduplicate::<AttributeValue>(&[]).is_empty());
    }

    #[test]
    fn test_idempotent() {
        let input = texts(&["x", "y", "x", "Y", "y"]);
        let once = deduplicate(&input);
        assert_eq!(deduplicate(&once), once);
    }

    #[test]
    fn test_typed_values() {
        let guid = Uuid::new_v4();
        let input = vec![
            AttributeValue::Integer(1),
            AttributeValue::Guid(guid),
            AttributeValue::Integer(1),
            AttributeValue::Boolean(false),
            AttributeValue::Guid(guid),
        ];
        assert_eq!(
            deduplicate(&input),
            vec![
                AttributeValue::Integer(1),
                AttributeValue::Guid(guid),
                AttributeValue::Boolean(false),
            ]
        );
    }
}
