//! One-position reordering for the prioritization list.
//!
//! Both moves are a single swap with the neighbour. Multi-position jumps are
//! built from repeated calls.

/// Swap `list[index]` with the item above it.
///
/// Returns false and leaves the list untouched when `index` is the first
/// position or out of range.
pub fn move_up<T>(list: &mut [T], index: usize) -> bool {
    if index == 0 || index >= list.len() {
        return false;
    }
    list.swap(index, index - 1);
    true
}

/// Swap `list[index]` with the item below it.
///
/// Returns false and leaves the list untouched when `index` is the last
/// position or out of range.
pub fn move_down<T>(list: &mut [T], index: usize) -> bool {
    if index + 1 >= list.len() {
        return false;
    }
    list.swap(index, index + 1);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> Vec<String> {
        ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn move_up_swaps_with_previous() {
        let mut l = list();
        assert!(move_up(&mut l, 2));
        assert_eq!(l, ["a", "c", "b", "d"]);
    }

    #[test]
    fn move_down_swaps_with_next() {
        let mut l = list();
        assert!(move_down(&mut l, 1));
        assert_eq!(l, ["a", "c", "b", "d"]);
    }

    #[test]
    fn boundaries_are_no_ops() {
        let mut l = list();
        assert!(!move_up(&mut l, 0));
        assert!(!move_down(&mut l, 3));
        assert_eq!(l, list());
    }

    #[test]
    fn out_of_range_is_a_no_op() {
        let mut l = list();
        assert!(!move_up(&mut l, 4));
        assert!(!move_down(&mut l, 99));
        assert_eq!(l, list());

        let mut empty: Vec<String> = Vec::new();
        assert!(!move_up(&mut empty, 0));
        assert!(!move_down(&mut empty, 0));
    }

    #[test]
    fn repeated_moves_keep_the_same_items() {
        let mut l = list();
        // Walk "a" to the bottom, then "d" (now at index 2) to the top.
        for i in 0..3 {
            assert!(move_down(&mut l, i));
        }
        assert_eq!(l, ["b", "c", "d", "a"]);
        assert!(move_up(&mut l, 2));
        assert!(move_up(&mut l, 1));
        assert_eq!(l, ["d", "b", "c", "a"]);

        let mut sorted = l.clone();
        sorted.sort();
        assert_eq!(sorted, list());
    }
}
