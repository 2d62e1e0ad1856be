use super::*;
use pretty_assertions::assert_eq;

fn id(raw: i64) -> ExprId {
    ExprId::new(raw)
}

#[test]
fn test_monotonic_starts_above_seed() {
    let mut generator = MonotonicIdGenerator::new(10).unwrap();
    assert_eq!(generator.next_id(), id(11));
    assert_eq!(generator.next_id(), id(12));
    assert_eq!(generator.generate(id(500)), id(13));
    assert_eq!(generator.last_id(), id(13));
}

#[test]
fn test_negative_seeds_rejected() {
    assert_eq!(
        MonotonicIdGenerator::new(-1).map(|_| ()),
        Err(AstError::NegativeSeed(-1))
    );
    assert_eq!(
        StableIdGenerator::new(-5).map(|_| ()),
        Err(AstError::NegativeSeed(-5))
    );
}

#[test]
fn test_stable_generator_from_zero() {
    let mut generator = IdGeneratorFactory::new_stable_id_generator(0).unwrap();
    assert_eq!(generator.renumber_id(id(2)), id(1));
    assert_eq!(generator.renumber_id(id(2)), id(1));
    assert_eq!(generator.renumber_id(id(1)), id(2));
    assert_eq!(generator.renumber_id(id(3)), id(3));
}

#[test]
fn test_stable_generator_passes_through_floor() {
    let mut generator = StableIdGenerator::new(5).unwrap();
    assert_eq!(generator.renumber_id(id(0)), id(0));
    assert_eq!(generator.renumber_id(id(5)), id(5));
    assert_eq!(generator.renumber_id(id(42)), id(6));
    assert_eq!(generator.renumber_id(id(7)), id(7));
    assert_eq!(generator.renumber_id(id(6)), id(8));
}

#[test]
fn test_memoize_forces_mapping() {
    let mut generator = StableIdGenerator::new(0).unwrap();
    assert!(!generator.has_id(id(9)));
    generator.memoize(id(9), id(100));
    assert!(generator.has_id(id(9)));
    assert_eq!(generator.renumber_id(id(9)), id(100));
    assert_eq!(generator.lookup(id(9)), Some(id(100)));
    assert_eq!(generator.lookup(id(10)), None);
}

#[test]
fn test_next_expr_id_skips_memo() {
    let mut generator = StableIdGenerator::new(3).unwrap();
    assert_eq!(generator.next_expr_id(), id(4));
    assert_eq!(generator.renumber_id(id(50)), id(5));
    assert_eq!(generator.last_id(), id(5));
}

#[test]
fn test_noop_and_clear() {
    assert_eq!(NoOpIdGenerator.generate(id(7)), id(7));
    assert_eq!(ClearIdGenerator.generate(id(7)), ExprId::UNSET);
}

#[test]
fn test_closure_generator() {
    let mut shift = |old: ExprId| ExprId::new(old.raw() + 10);
    assert_eq!(shift.generate(id(1)), id(11));
}

#[test]
fn test_memoize_overrides_floor() {
    let mut generator = StableIdGenerator::new(10).unwrap();
    generator.memoize(id(4), id(2));
    assert_eq!(generator.renumber_id(id(4)), id(2));
    assert_eq!(generator.lookup(id(4)), Some(id(2)));
    assert_eq!(generator.lookup(id(3)), Some(id(3)));
}
