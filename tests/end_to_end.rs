//! End-to-end scenarios driving the public API the way a host program
//! would: build an `Iteration`, seed base facts, apply rules to a fixed
//! point, and read off the result.

use std::io::Cursor;

use zoddrel::{
    aggregate, extend_into, join_anti, join_into, Context, Error, ExtendWith, Index, Iteration,
    Leaper, Relation, Variable,
};

/// `edge` mapped to `(target, source)`, so it can be joined keyed on the
/// target side without re-deriving the swap every round.
fn by_target(ctx: &Context, edge: &Relation<(u32, u32)>) -> Relation<(u32, u32)> {
    Relation::from_sequence(ctx, edge.iter().map(|&(x, y)| (y, x))).unwrap()
}

#[test]
fn transitive_closure_over_a_linear_chain() {
    let ctx = Context::sequential();
    let edge = Relation::from_sequence(&ctx, vec![(1u32, 2u32), (2, 3), (3, 4)]).unwrap();
    let edge_by_target = by_target(&ctx, &edge);

    let mut it = Iteration::new(&ctx);
    let reachable: Variable<(u32, u32)> = it.variable("reachable");
    reachable.insert_relation(edge.clone()).unwrap();

    while it.changed().unwrap() {
        // reachable(x, z) :- edge(x, y), reachable(y, z).
        join_into(&ctx, &edge_by_target, &reachable, &reachable, |_y, &x, &z| (x, z)).unwrap();
    }

    let result = reachable.complete().unwrap();
    assert_eq!(
        result.elements,
        vec![(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4)]
    );
}

#[test]
fn transitive_closure_over_a_cycle() {
    let ctx = Context::sequential();
    let edge = Relation::from_sequence(&ctx, vec![(1u32, 2u32), (2, 3), (3, 1)]).unwrap();
    let edge_by_target = by_target(&ctx, &edge);

    let mut it = Iteration::new(&ctx);
    let reachable: Variable<(u32, u32)> = it.variable("reachable");
    reachable.insert_relation(edge.clone()).unwrap();

    while it.changed().unwrap() {
        join_into(&ctx, &edge_by_target, &reachable, &reachable, |_y, &x, &z| (x, z)).unwrap();
    }

    let result = reachable.complete().unwrap();
    assert_eq!(result.len(), 9);
    for x in 1..=3u32 {
        for z in 1..=3u32 {
            assert!(result.elements.contains(&(x, z)));
        }
    }
}

#[test]
fn same_generation_over_a_small_tree() {
    let ctx = Context::sequential();
    // parent(parent_id, child_id)
    let parent = Relation::from_sequence(&ctx, vec![(1u32, 2u32), (1, 3), (2, 4), (2, 5)]).unwrap();

    let mut it = Iteration::new(&ctx);
    let same_gen: Variable<(u32, u32)> = it.variable("same_gen");
    let step: Variable<(u32, u32)> = it.variable("step");
    same_gen.insert_sequence((1..=5u32).map(|i| (i, i))).unwrap();

    while it.changed().unwrap() {
        // step(py, x) :- parent(px, x), same_gen(px, py).
        join_into(&ctx, &parent, &same_gen, &step, |_px, &x, &py| (py, x)).unwrap();
        // same_gen(x, y) :- step(py, x), parent(py, y).
        join_into(&ctx, &step, &parent, &same_gen, |_py, &x, &y| (x, y)).unwrap();
    }

    let result = same_gen.complete().unwrap();
    assert_eq!(result.len(), 9);
    for i in 1..=5u32 {
        assert!(result.elements.contains(&(i, i)));
    }
    assert!(result.elements.contains(&(2, 3)));
    assert!(result.elements.contains(&(4, 5)));
}

#[test]
fn group_sum_aggregate_matches_expected_totals() {
    let ctx = Context::sequential();
    let input = Relation::from_sequence(&ctx, vec![(1u32, 10u32), (1, 20), (2, 5)]).unwrap();
    let result = aggregate(&ctx, &input, |(k, _)| *k, || 0u32, |acc, (_, v)| acc + v).unwrap();
    assert_eq!(result.elements, vec![(1, 30), (2, 5)]);
}

#[test]
fn multiway_intersection_via_extend_into() {
    let ctx = Context::sequential();
    let mut it = Iteration::new(&ctx);
    let source: Variable<u32> = it.variable("source");
    source.insert_sequence(vec![1u32, 2, 3, 4]).unwrap();
    it.changed().unwrap();

    let r1 = Relation::from_sequence(&ctx, vec![(1u32, 100u32), (2, 200), (3, 300), (4, 400)]).unwrap();
    let r2 = Relation::from_sequence(&ctx, vec![(1u32, 100u32), (2, 200), (4, 999)]).unwrap();
    let r3 = Relation::from_sequence(&ctx, vec![(2u32, 200u32), (3, 300)]).unwrap();

    let mut leapers: Vec<Box<dyn Leaper<u32, u32> + Send>> = vec![
        Box::new(ExtendWith::new(&r1, |p: &u32| *p)),
        Box::new(ExtendWith::new(&r2, |p: &u32| *p)),
        Box::new(ExtendWith::new(&r3, |p: &u32| *p)),
    ];

    let out: Variable<(u32, u32)> = it.variable("out");
    extend_into(&ctx, &source, &mut leapers, &out, |&p, &v| (p, v)).unwrap();
    assert_eq!(out.complete().unwrap().elements, vec![(2, 200)]);
}

#[test]
fn persistence_round_trip_and_rejections() {
    let ctx = Context::sequential();
    let relation = Relation::from_sequence(&ctx, vec![(2u32, 20u32), (1, 10), (3, 30)]).unwrap();

    let mut buf = Vec::new();
    relation.save(&mut buf).unwrap();
    let loaded: Relation<(u32, u32)> = Relation::load(&ctx, &mut Cursor::new(&buf)).unwrap();
    assert_eq!(loaded.elements, vec![(1, 10), (2, 20), (3, 30)]);

    let mut bad_magic = buf.clone();
    bad_magic[..7].copy_from_slice(b"BADMAGC");
    let err = Relation::<(u32, u32)>::load(&ctx, &mut Cursor::new(&bad_magic)).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat));

    let mut bad_version = buf.clone();
    bad_version[7] = 2;
    let err = Relation::<(u32, u32)>::load(&ctx, &mut Cursor::new(&bad_version)).unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion));

    let mut oversized_header = buf.clone();
    oversized_header[8..16].copy_from_slice(&2u64.to_le_bytes());
    let err = Relation::<(u32, u32)>::load_with_limit(&ctx, &mut Cursor::new(&oversized_header), 1)
        .unwrap_err();
    assert!(matches!(err, Error::TooLarge { len: 2, limit: 1 }));
}

#[test]
fn incremental_maintenance_after_reset() {
    let ctx = Context::sequential();
    let mut it = Iteration::new(&ctx);
    let edge: Variable<(u32, u32)> = it.variable("edge");
    let reachable: Variable<(u32, u32)> = it.variable("reachable");

    edge.insert_sequence(vec![(1u32, 2u32), (2, 3)]).unwrap();
    reachable.insert_sequence(vec![(1u32, 2u32), (2, 3)]).unwrap();

    loop {
        let changed = it.changed().unwrap();
        let edge_by_target = Relation::from_sequence(
            &ctx,
            edge.stable()
                .iter()
                .flat_map(|batch| batch.elements.iter().cloned())
                .chain(edge.recent().iter().cloned())
                .map(|(x, y)| (y, x)),
        )
        .unwrap();
        join_into(&ctx, &edge_by_target, &reachable, &reachable, |_y, &x, &z| (x, z)).unwrap();
        if !changed && reachable.recent().is_empty() {
            break;
        }
    }
    assert_eq!(reachable.total_len(), 3);

    edge.insert_sequence(vec![(3u32, 4u32)]).unwrap();
    it.reset();
    loop {
        let changed = it.changed().unwrap();
        let edge_by_target = Relation::from_sequence(
            &ctx,
            edge.stable()
                .iter()
                .flat_map(|batch| batch.elements.iter().cloned())
                .chain(edge.recent().iter().cloned())
                .map(|(x, y)| (y, x)),
        )
        .unwrap();
        join_into(&ctx, &edge_by_target, &reachable, &reachable, |_y, &x, &z| (x, z)).unwrap();
        if !changed && reachable.recent().is_empty() {
            break;
        }
    }

    let result = reachable.complete().unwrap();
    assert_eq!(result.len(), 6);
}

#[test]
fn anti_join_keeps_only_unfiltered_keys() {
    let ctx = Context::sequential();
    let mut it = Iteration::new(&ctx);
    let input: Variable<(u32, u32)> = it.variable("input");
    let filter: Variable<(u32, u32)> = it.variable("filter");
    input.insert_sequence(vec![(1u32, 10u32), (2, 20), (3, 30)]).unwrap();
    filter.insert_sequence(vec![(1u32, 100u32), (3, 300)]).unwrap();
    it.changed().unwrap();

    let out: Variable<(u32, u32)> = it.variable("out");
    join_anti(&ctx, &input, &filter, &out, |&k, &v| (k, v)).unwrap();
    assert_eq!(out.complete().unwrap().elements, vec![(2, 20)]);
}

#[test]
fn secondary_index_point_and_range_agree_with_the_source_relation() {
    let ctx = Context::sequential();
    let relation = Relation::from_sequence(
        &ctx,
        vec![(1u32, 10u32), (1, 11), (2, 20), (3, 30), (4, 40)],
    )
    .unwrap();

    let mut index: Index<u32, (u32, u32), _> = Index::new(&ctx, |(k, _)| *k);
    index.insert_relation(relation.clone()).unwrap();

    assert_eq!(index.get(&1).unwrap().elements, vec![(1, 10), (1, 11)]);
    let ranged = index.get_range(&2, &3).unwrap();
    assert_eq!(ranged.elements, vec![(2, 20), (3, 30)]);
}
