//! Ordered-list deltas
//!
//! Positional edits shared by every list-valued property: material override
//! slots, group members, polyline vertices. Applying a delta never fails; an
//! index outside the list leaves it untouched and logs a warning.

/// One positional edit of an ordered list
#[derive(Clone, Debug, PartialEq)]
pub enum ListDelta<T> {
    /// Insert before `index`; `index == len` appends
    AddAt(usize, T),
    RemoveAt(usize),
    SetAt(usize, T),
    ReplaceAll(Vec<T>),
}

impl<T> ListDelta<T> {
    /// Convert the carried values, keeping the position
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<ListDelta<U>, E> {
        Ok(match self {
            Self::AddAt(index, value) => ListDelta::AddAt(index, f(value)?),
            Self::RemoveAt(index) => ListDelta::RemoveAt(index),
            Self::SetAt(index, value) => ListDelta::SetAt(index, f(value)?),
            Self::ReplaceAll(values) => {
                ListDelta::ReplaceAll(values.into_iter().map(f).collect::<Result<_, _>>()?)
            }
        })
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::AddAt(index, _) | Self::RemoveAt(index) | Self::SetAt(index, _) => Some(*index),
            Self::ReplaceAll(_) => None,
        }
    }
}

/// Apply `delta` to `list`. Returns false when the index was out of range.
pub fn apply_list_delta<T>(list: &mut Vec<T>, delta: ListDelta<T>) -> bool {
    let len = list.len();
    match delta {
        ListDelta::AddAt(index, value) if index <= len => list.insert(index, value),
        ListDelta::RemoveAt(index) if index < len => {
            list.remove(index);
        }
        ListDelta::SetAt(index, value) if index < len => list[index] = value,
        ListDelta::ReplaceAll(values) => *list = values,
        other => {
            log::warn!(
                "List delta index {:?} out of range for length {}, ignored",
                other.index(),
                len
            );
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_at_end_appends() {
        let mut list = vec![1, 2, 3];
        assert!(apply_list_delta(&mut list, ListDelta::AddAt(3, 4)));
        assert_eq!(list, vec![1, 2, 3, 4]);
        assert!(apply_list_delta(&mut list, ListDelta::AddAt(0, 0)));
        assert_eq!(list, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let mut list = vec![1, 2, 3];
        assert!(!apply_list_delta(&mut list, ListDelta::AddAt(10, 9)));
        assert!(!apply_list_delta(&mut list, ListDelta::RemoveAt(10)));
        assert!(!apply_list_delta(&mut list, ListDelta::RemoveAt(3)));
        assert!(!apply_list_delta(&mut list, ListDelta::SetAt(3, 9)));
        assert_eq!(list, vec![1, 2, 3]);
    }

    #[test]
    fn test_set_remove_replace() {
        let mut list = vec!['a', 'b', 'c'];
        apply_list_delta(&mut list, ListDelta::SetAt(1, 'x'));
        apply_list_delta(&mut list, ListDelta::RemoveAt(0));
        assert_eq!(list, vec!['x', 'c']);
        apply_list_delta(&mut list, ListDelta::ReplaceAll(vec![]));
        assert!(list.is_empty());
        // Appending to an empty list
        assert!(apply_list_delta(&mut list, ListDelta::AddAt(0, 'z')));
        assert_eq!(list, vec!['z']);
    }

    #[test]
    fn test_try_map() {
        let delta = ListDelta::ReplaceAll(vec!["1", "2"]);
        let mapped = delta.try_map(|s| s.parse::<u32>());
        assert_eq!(mapped, Ok(ListDelta::ReplaceAll(vec![1, 2])));

        let bad = ListDelta::SetAt(0, "x").try_map(|s| s.parse::<u32>());
        assert!(bad.is_err());
    }
}
