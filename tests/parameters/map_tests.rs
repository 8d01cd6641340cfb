//! Tests for mixed-radix maps and the grouping-aware builder

use std::collections::BTreeSet;

use relaxfit::error::RelaxError;
use relaxfit::parameters::{make_group_map, make_map, map_index, ParameterMapBuilder, SlotSharing};

#[test]
fn test_mixed_radix_covers_every_state_once() {
    let counts = [3, 2];
    let mut seen = BTreeSet::new();
    for a in 0..3 {
        for b in 0..2 {
            assert!(seen.insert(map_index(&[a, b], &counts, &[0, 1])));
        }
    }
    assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_masked_axes_collapse() {
    let counts = [3, 2];
    for a in 0..3 {
        assert_eq!(map_index(&[a, 0], &counts, &[0]), map_index(&[a, 1], &counts, &[0]));
    }
    assert_eq!(map_index(&[2, 1], &counts, &[]), 0);
}

#[test]
fn test_unshared_and_group_maps() {
    let map = make_map(3, 4);
    assert_eq!(map.n_pars(), 12);
    assert_eq!(map.curve(2), &[8, 9, 10, 11]);

    let map = make_group_map(3, 4, 2);
    assert_eq!(map.n_pars(), 8);
    for id in 0..3 {
        assert_eq!(&map.curve(id)[..2], &[0, 1]);
    }
    assert_eq!(map.curve(2), &[0, 1, 6, 7]);
}

#[test]
fn test_builder_compacts_unused_indices() {
    // residue 1 is absent, so its mixed-radix slot must not leave a hole
    let counts = vec![3, 1, 1, 1];
    let states = vec![vec![0, 0, 0, 0], vec![2, 0, 0, 0]];
    let map = ParameterMapBuilder::new(&counts, &states)
        .unwrap()
        .build(&[SlotSharing::Shared, SlotSharing::Masked(vec![0])])
        .unwrap();
    assert_eq!(map.n_pars(), 3);
    let used: BTreeSet<usize> = map.iter().flatten().copied().collect();
    assert_eq!(used, (0..3).collect());
}

#[test]
fn test_malformed_grouping_rejected() {
    let counts = vec![2, 2];
    let empty: Vec<Vec<usize>> = Vec::new();
    assert!(matches!(
        ParameterMapBuilder::new(&counts, &empty),
        Err(RelaxError::MalformedGrouping(_))
    ));

    let zero_axis = vec![2, 0];
    let states = vec![vec![0, 0]];
    assert!(matches!(
        ParameterMapBuilder::new(&zero_axis, &states),
        Err(RelaxError::MalformedGrouping(_))
    ));

    let short = vec![vec![1]];
    assert!(matches!(
        ParameterMapBuilder::new(&counts, &short),
        Err(RelaxError::MalformedGrouping(_))
    ));

    let builder = ParameterMapBuilder::new(&counts, &states).unwrap();
    assert!(matches!(
        builder.build(&[SlotSharing::Masked(vec![5])]),
        Err(RelaxError::MalformedGrouping(_))
    ));
    assert!(matches!(builder.build(&[]), Err(RelaxError::MalformedGrouping(_))));
}
