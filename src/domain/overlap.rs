use crate::domain::models::Block;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Half-open intersection of `[a_start, a_end)` and `[b_start, b_end)`.
/// Touching endpoints do not overlap.
pub fn intervals_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && b_start < a_end
}

/// The single overlap rule shared by conflict rendering and gap finding.
/// A block never conflicts with itself.
pub fn overlaps(a: &Block, b: &Block) -> bool {
    if a.id == b.id {
        return false;
    }
    a.date == b.date
        && intervals_overlap(a.start_minute, a.end_minute(), b.start_minute, b.end_minute())
}

/// Ids of every block on `date` that overlaps at least one other block.
pub fn conflicting_block_ids(blocks: &[Block], date: NaiveDate) -> BTreeSet<String> {
    let mut day = blocks
        .iter()
        .filter(|block| block.date == date)
        .collect::<Vec<_>>();
    day.sort_by_key(|block| block.start_minute);

    let mut conflicts = BTreeSet::new();
    for (index, block) in day.iter().enumerate() {
        for other in &day[index + 1..] {
            if other.start_minute >= block.end_minute() {
                break;
            }
            if overlaps(block, other) {
                conflicts.insert(block.id.clone());
                conflicts.insert(other.id.clone());
            }
        }
    }
    conflicts
}

/// Whether a live preview would land on top of any committed block.
pub fn preview_conflicts(preview: &Block, blocks: &[Block]) -> bool {
    blocks.iter().any(|other| overlaps(preview, other))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BlockContent;
    use proptest::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 24).expect("valid date")
    }

    fn block(id: &str, start_minute: u32, length_minutes: u32) -> Block {
        Block {
            id: id.to_string(),
            date: day(),
            start_minute,
            length_minutes,
            content: BlockContent::Atomic {
                task_id: Some(format!("task-{id}")),
            },
        }
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        assert!(!overlaps(&block("a", 0, 30), &block("b", 30, 30)));
        assert!(overlaps(&block("a", 0, 31), &block("b", 30, 30)));
    }

    #[test]
    fn blocks_on_other_dates_never_overlap() {
        let mut tomorrow = block("b", 0, 60);
        tomorrow.date = day().succ_opt().expect("next day");
        assert!(!overlaps(&block("a", 0, 60), &tomorrow));
    }

    #[test]
    fn conflicting_ids_cover_both_sides_and_nested_blocks() {
        let blocks = vec![
            block("a", 540, 120),
            block("b", 560, 15),
            block("c", 600, 15),
            block("d", 660, 30),
            block("e", 690, 30),
        ];
        let conflicts = conflicting_block_ids(&blocks, day());
        assert_eq!(
            conflicts.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn preview_ignores_the_block_being_dragged() {
        let committed = vec![block("a", 540, 60), block("b", 600, 60)];
        let mut preview = committed[0].clone();
        preview.start_minute = 550;
        assert!(!preview_conflicts(&preview, &committed[..1]));
        assert!(preview_conflicts(&preview, &committed));
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric_and_irreflexive(
            a_start in 0u32..1440, a_len in 1u32..240,
            b_start in 0u32..1440, b_len in 1u32..240
        ) {
            let a = block("a", a_start, a_len);
            let b = block("b", b_start, b_len);
            prop_assert_eq!(overlaps(&a, &b), overlaps(&b, &a));
            prop_assert!(!overlaps(&a, &a));
        }
    }
}
