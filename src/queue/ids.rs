use serde::{Deserialize, Serialize};
use crate::error::{CommitError, CommitResult};

/// Id argument accepted by `commit` and `CommitEvent::new`.
///
/// Hosts pass either a single id or a collection; both normalize to the same
/// ordered list, so `"42"`, `42` and `[42]` name the same objects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectIds(Vec<String>);

impl ObjectIds {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<&str> for ObjectIds {
    fn from(id: &str) -> Self {
        ObjectIds(vec![id.to_string()])
    }
}

impl From<String> for ObjectIds {
    fn from(id: String) -> Self {
        ObjectIds(vec![id])
    }
}

impl From<&String> for ObjectIds {
    fn from(id: &String) -> Self {
        ObjectIds(vec![id.clone()])
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ObjectIds {
                fn from(id: $t) -> Self {
                    ObjectIds(vec![id.to_string()])
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl<T: ToString> From<Vec<T>> for ObjectIds {
    fn from(ids: Vec<T>) -> Self {
        ObjectIds(ids.iter().map(ToString::to_string).collect())
    }
}

impl<T: ToString> From<&[T]> for ObjectIds {
    fn from(ids: &[T]) -> Self {
        ObjectIds(ids.iter().map(ToString::to_string).collect())
    }
}

impl<T: ToString, const N: usize> From<[T; N]> for ObjectIds {
    fn from(ids: [T; N]) -> Self {
        ObjectIds(ids.iter().map(ToString::to_string).collect())
    }
}

/// Normalize an id argument into an ordered list of distinct ids.
///
/// First occurrence wins; the order of the input is otherwise kept.
pub fn to_object_ids(ids: impl Into<ObjectIds>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into()
        .into_vec()
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Normalize and validate; an empty result or a blank id is an error
pub fn normalize_object_ids(object_type: &str, ids: impl Into<ObjectIds>) -> CommitResult<Vec<String>> {
    let ids = to_object_ids(ids);

    if ids.is_empty() {
        return Err(CommitError::InvalidObjectIds {
            object_type: object_type.to_string(),
            reason: "At least one object id is required".to_string(),
        });
    }

    for id in &ids {
        crate::validation::validate_object_id(id, object_type)?;
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_code;

    #[test]
    fn test_scalar_and_list_normalize_equal() {
        assert_eq!(to_object_ids("42"), to_object_ids(vec![42]));
        assert_eq!(to_object_ids("42"), vec!["42".to_string()]);
        assert_eq!(to_object_ids(42_i64), to_object_ids([42_u32]));
    }

    #[test]
    fn test_order_kept_and_duplicates_dropped() {
        assert_eq!(
            to_object_ids(vec!["7", "3", "7", "1", "3"]),
            vec!["7".to_string(), "3".to_string(), "1".to_string()]
        );
    }

    #[test]
    fn test_slice_input() {
        let ids = ["a".to_string(), "b".to_string()];
        assert_eq!(to_object_ids(&ids[..]), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert_error_code(normalize_object_ids("contact", Vec::<String>::new()), "V002");
        assert_error_code(normalize_object_ids("contact", vec!["1", ""]), "V002");
    }
}
