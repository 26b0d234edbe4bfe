/*!
Sanity checks on projected sentences.
*/
use crate::entity::{inside_of, segment, Entities, TagId};
use itertools::Itertools;
use tracing::warn;

/// Returns true if every entity type of the origin side appears as many times among the
/// destination tags. Types absent from the origin side are not checked.
///
/// ```rust
/// use bioproj::validate_instance;
///
/// assert!(validate_instance(&[1, 3], &[1, 2, 0, 3]));
/// assert!(!validate_instance(&[1, 1], &[1, 2, 2, 0]));
/// ```
pub fn validate_instance(origin_types: &[TagId], destination_tags: &[TagId]) -> bool {
    let origin_counts = origin_types.iter().counts();
    let destination_counts = destination_tags.iter().counts();
    origin_counts
        .iter()
        .all(|(tag, count)| destination_counts.get(tag) == Some(count))
}

/// Copies the tags found at entity positions and writes `0` everywhere else.
pub fn reconstruct(tags: &[TagId], entities: &Entities) -> Vec<TagId> {
    let positions = entities.positions();
    tags.iter()
        .enumerate()
        .map(|(i, &t)| if positions.contains(&i) { t } else { 0 })
        .collect()
}

/// Returns true if `tags` is well formed BIO: every entity starts with a begin tag and continues
/// with its own inside tag.
pub fn is_well_formed(tags: &[TagId]) -> bool {
    segment(tags).iter().all(|entity| {
        entity.tag() % 2 == 1
            && entity
                .indices()
                .iter()
                .skip(1)
                .all(|&i| Some(tags[i]) == inside_of(entity.tag()))
    })
}

/// Checks that the entities of `tags` rebuild it exactly. Logs a warning on mismatch; never
/// fails.
pub fn check_reconstruction(tags: &[TagId], entities: &Entities) -> bool {
    let reconstructed = reconstruct(tags, entities);
    let ok = reconstructed == tags;
    if !ok {
        warn!("Entity extraction validation failed - some entities may be missed");
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{tests::WellFormedTags, Entity};
    use quickcheck::QuickCheck;
    use rstest::rstest;

    #[rstest]
    #[case(vec![1, 3], vec![1, 2, 0, 3], true)]
    #[case(vec![1, 1], vec![1, 2, 0, 1], true)]
    #[case(vec![1, 1], vec![1, 2, 2, 0], false)]
    #[case(vec![], vec![1, 2], true)]
    #[case(vec![1], vec![1, 3], true)]
    #[case(vec![3], vec![0, 0], false)]
    fn test_validate_instance(
        #[case] origin: Vec<TagId>,
        #[case] destination: Vec<TagId>,
        #[case] expected: bool,
    ) {
        assert_eq!(validate_instance(&origin, &destination), expected)
    }

    #[test]
    fn test_reconstruct_drops_positions_outside_entities() {
        let tags = vec![1, 2, 0, 3];
        let entities = Entities::new(vec![Entity::new(vec![0, 1], 1)]);
        assert_eq!(reconstruct(&tags, &entities), vec![1, 2, 0, 0]);
        assert!(!check_reconstruction(&tags, &entities));
        assert!(check_reconstruction(&tags, &segment(&tags)));
    }

    #[rstest]
    #[case(vec![0, 1, 2, 0, 3], true)]
    #[case(vec![], true)]
    #[case(vec![2, 2], false)]
    #[case(vec![1, 4], false)]
    fn test_is_well_formed(#[case] tags: Vec<TagId>, #[case] expected: bool) {
        assert_eq!(is_well_formed(&tags), expected)
    }

    #[test]
    fn test_propertie_generated_tags_are_well_formed() {
        fn well_formed(tags: WellFormedTags) -> bool {
            is_well_formed(&tags.0) && check_reconstruction(&tags.0, &segment(&tags.0))
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(well_formed as fn(WellFormedTags) -> bool)
    }
}
