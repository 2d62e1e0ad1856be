use super::*;
use cel_ast::factory::macros;
use cel_ast::operators::{ADD, EQUALS, GREATER, LOGICAL_AND, LOGICAL_OR, MULTIPLY};
use cel_ast::{unparse, CelType, ExprKindTag};
use pretty_assertions::assert_eq;

fn mutator() -> AstMutator {
    AstMutator::new(1000).unwrap()
}

fn id(raw: i64) -> ExprId {
    ExprId::new(raw)
}

fn literal(value: i64) -> Ast {
    Ast::new(Expr::new_constant(ExprId::UNSET, value), SourceInfo::default())
}

fn pre_order_ids(expr: &Expr) -> Vec<i64> {
    NavigableExpr::new(expr)
        .all_nodes(TraversalOrder::PreOrder)
        .map(|node| node.id().raw())
        .collect()
}

/// Idents are ints, comprehensions bools, everything else dyn.
fn with_types(ast: Ast) -> Ast {
    let types = NavigableExpr::new(&ast.expr)
        .all_nodes(TraversalOrder::PreOrder)
        .map(|node| {
            let ty = match node.kind_tag() {
                ExprKindTag::Ident => CelType::Int,
                ExprKindTag::Comprehension => CelType::Bool,
                _ => CelType::Dyn,
            };
            (node.id(), ty)
        })
        .collect();
    ast.with_types(types)
}

/// `[1, 2, 3].exists(x, x > 0)`
fn exists_ast(f: &mut ExprFactory) -> Ast {
    let elements = vec![f.new_int(1), f.new_int(2), f.new_int(3)];
    let range = f.new_list(elements);
    let x = f.new_ident("x");
    let zero = f.new_int(0);
    let predicate = f.new_global_call(GREATER, vec![x, zero]);
    let exists = f.expand_exists(range, "x", predicate);
    f.build_ast(exists)
}

/// `[1].map(x, x * (2 + 3))`, returning the id of `2 + 3`.
fn map_ast() -> (Ast, ExprId) {
    let mut f = ExprFactory::new();
    let one = f.new_int(1);
    let range = f.new_list(vec![one]);
    let x = f.new_ident("x");
    let two = f.new_int(2);
    let three = f.new_int(3);
    let sum = f.new_global_call(ADD, vec![two, three]);
    let sum_id = sum.id();
    let product = f.new_global_call(MULTIPLY, vec![x, sum]);
    let map = f.expand_map(range, "x", None, product);
    (f.build_ast(map), sum_id)
}

/// `xs.filter(x, x > 0)`
fn filter_ast() -> Ast {
    let mut f = ExprFactory::new();
    let xs = f.new_ident("xs");
    let x = f.new_ident("x");
    let zero = f.new_int(0);
    let predicate = f.new_global_call(GREATER, vec![x, zero]);
    let filter = f.expand_filter(xs, "x", predicate);
    f.build_ast(filter)
}

fn filter_wrapper_id(ast: &Ast) -> ExprId {
    let step = &ast.expr.comprehension().unwrap().loop_step;
    let appended = &step.call().unwrap().args[1];
    appended.call().unwrap().args[1].id()
}

fn wrapper_list_id(ast: &Ast) -> ExprId {
    let step = &ast.expr.comprehension().unwrap().loop_step;
    step.call().unwrap().args[1].id()
}

#[test]
fn test_iteration_limit_must_be_positive() {
    assert_eq!(AstMutator::new(0), Err(MutatorError::InvalidIterationLimit(0)));
    assert_eq!(AstMutator::new(-3), Err(MutatorError::InvalidIterationLimit(-3)));
    assert_eq!(AstMutator::new(7).unwrap().iteration_limit(), 7);
}

#[test]
fn test_replace_literal_keeps_ids() {
    let mut f = ExprFactory::new();
    let one = f.new_int(1);
    let two = f.new_int(2);
    let sum = f.new_global_call(ADD, vec![one, two]);
    let ast = f.build_ast(sum);

    let replaced = mutator()
        .replace_subtree_ast(&ast, &literal(5), id(2))
        .unwrap();

    assert_eq!(unparse(&replaced).unwrap(), "1 + 5");
    assert_eq!(pre_order_ids(&replaced.expr), vec![3, 1, 2]);
    assert!(!replaced.is_checked());
}

#[test]
fn test_replace_root_keeps_root_id() {
    let mut f = ExprFactory::new();
    let x = f.new_ident("x");
    let y = f.new_ident("y");
    let and = f.new_global_call(LOGICAL_AND, vec![x, y]);
    let ast = f.build_ast(and);

    let replaced = mutator()
        .replace_subtree_ast(&ast, &literal(1), ast.expr.id())
        .unwrap();
    assert_eq!(replaced.expr, Expr::new_constant(id(3), 1i64));
}

#[test]
fn test_replacement_root_position_moves_to_target() {
    let mut f = ExprFactory::new();
    let x = f.new_ident("x");
    let y = f.new_ident("y");
    let and = f.new_global_call(LOGICAL_AND, vec![x, y]);
    let mut ast = f.build_ast(and);
    ast.source.positions.insert(id(1), 0);
    ast.source.positions.insert(id(2), 5);
    ast.source.positions.insert(id(3), 2);

    let mut source = SourceInfo::default();
    source.positions.insert(id(1), 9);
    let incoming = Ast::new(Expr::new_constant(id(1), true), source);

    let replaced = mutator()
        .replace_subtree_ast(&ast, &incoming, id(2))
        .unwrap();
    assert_eq!(replaced.source.position(id(2)), Some(9));
    assert_eq!(replaced.source.position(id(1)), Some(0));
    assert_eq!(replaced.source.position(id(3)), Some(2));
    assert_eq!(replaced.source.positions.len(), 3);

    let root = mutator()
        .replace_subtree_ast(&ast, &incoming, id(3))
        .unwrap();
    assert_eq!(root.source.position(id(3)), Some(9));
    assert_eq!(root.source.positions.len(), 1);
}

#[test]
fn test_replace_missing_target_fails() {
    let ast = literal(1);
    let ast = mutator().renumber_ids_consecutively(&ast).unwrap();
    assert_eq!(
        mutator().replace_subtree_ast(&ast, &literal(2), id(42)),
        Err(MutatorError::TargetNotFound(id(42)))
    );
}

#[test]
fn test_expr_level_replace_is_id_neutral() {
    let mut f = ExprFactory::new();
    let a = f.new_ident("a");
    let b = f.new_ident("b");
    let call = f.new_global_call(ADD, vec![a, b]);

    let c = Expr::new_ident(id(99), "c");
    let replaced = mutator().replace_subtree(&call, &c, id(2)).unwrap();
    assert_eq!(replaced.call().unwrap().args[1], Expr::new_ident(id(2), "c"));
    assert_eq!(replaced.id(), id(3));

    let untouched = mutator().replace_subtree(&call, &c, id(50)).unwrap();
    assert_eq!(untouched, call);
}

#[test]
fn test_walk_stops_at_iteration_limit() {
    let mut f = ExprFactory::new();
    let a = f.new_ident("a");
    let b = f.new_ident("b");
    let call = f.new_global_call(ADD, vec![a, b]);

    let tight = AstMutator::new(2).unwrap();
    assert_eq!(
        tight.clear_expr_ids(&call),
        Err(MutatorError::IterationLimitExceeded { limit: 2 })
    );
}

#[test]
fn test_clear_expr_ids_includes_entries() {
    let mut f = ExprFactory::new();
    let key = f.new_string("k");
    let value = f.new_int(1);
    let map = f.new_map(vec![(key, value)]).unwrap();

    let cleared = mutator().clear_expr_ids(&map).unwrap();
    assert_eq!(pre_order_ids(&cleared), vec![0, 0, 0]);
    assert_eq!(cleared.map().unwrap().entries[0].id(), ExprId::UNSET);
}

#[test]
fn test_renumber_consecutively_rekeys_source() {
    let mut f = ExprFactory::new();
    let mut ast = exists_ast(&mut f);
    // The `x` in the predicate.
    ast.source.positions.insert(id(5), 17);

    let renumbered = mutator().renumber_ids_consecutively(&ast).unwrap();

    assert_eq!(pre_order_ids(&renumbered.expr), (1..=15).collect::<Vec<_>>());
    let keys: Vec<_> = renumbered.source.macro_calls.keys().copied().collect();
    assert_eq!(keys, vec![id(1)]);
    let record = renumbered.source.macro_call(id(1)).unwrap().call().unwrap();
    assert_eq!(record.target.as_ref().map(Expr::id), Some(id(2)));
    assert_eq!(record.args[0].id(), id(16));
    assert_eq!(record.args[1].id(), id(12));
    assert_eq!(renumbered.source.position(id(13)), Some(17));
    assert_eq!(unparse(&renumbered).unwrap(), unparse(&ast).unwrap());
}

#[test]
fn test_stabilize_above_seed_rekeys_types() {
    let mut f = ExprFactory::new();
    let x = f.new_ident("x");
    let one = f.new_int(1);
    let sum = f.new_global_call(ADD, vec![x, one]);
    let mut types = rustc_hash::FxHashMap::default();
    types.insert(id(3), CelType::Int);
    let ast = f.build_ast(sum).with_types(types);

    let stable = mutator().stabilize_ast(&ast, 100).unwrap();
    assert_eq!(pre_order_ids(&stable.expr), vec![101, 102, 103]);
    assert_eq!(stable.types.get(&id(101)), Some(&CelType::Int));
    assert_eq!(
        mutator().stabilize_ast(&ast, -1),
        Err(MutatorError::Ast(AstError::NegativeSeed(-1)))
    );
}

#[test]
fn test_stabilize_assigns_unset_ids() {
    let call = AstMutator::new_global_call(
        "size",
        vec![Expr::new_ident(ExprId::UNSET, "xs")],
    );
    let ast = Ast::new(call, SourceInfo::default());
    let stable = mutator().stabilize_ast(&ast, 4).unwrap();
    assert_eq!(pre_order_ids(&stable.expr), vec![5, 6]);
}

#[test]
fn test_replace_inside_macro_refreshes_record() {
    let (ast, sum_id) = map_ast();
    assert_eq!(unparse(&ast).unwrap(), "[1].map(x, x * (2 + 3))");

    let folded = mutator()
        .replace_subtree_ast(&ast, &literal(5), sum_id)
        .unwrap();
    assert_eq!(unparse(&folded).unwrap(), "[1].map(x, x * 5)");
    assert_eq!(folded.source.macro_calls.len(), 1);
}

#[test]
fn test_replacing_enclosing_node_drops_macro_record() {
    let mut f = ExprFactory::new();
    let exists = exists_ast(&mut f).expr;
    let flag = f.new_ident("flag");
    let or = f.new_global_call(LOGICAL_OR, vec![exists, flag]);
    let ast = f.build_ast(or);
    assert_eq!(ast.source.macro_calls.len(), 1);

    let replaced = mutator()
        .replace_subtree_ast(&ast, &literal(1), ast.expr.id())
        .unwrap();
    assert!(replaced.source.macro_calls.is_empty());
}

#[test]
fn test_replacing_map_wrapper_unwraps_record_args() {
    let (ast, _) = map_ast();
    let wrapper = wrapper_list_id(&ast);
    let doubled = AstMutator::new_global_call(
        MULTIPLY,
        vec![
            Expr::new_ident(ExprId::UNSET, "x"),
            Expr::new_constant(ExprId::UNSET, 2i64),
        ],
    );
    let new_list = Ast::new(
        Expr::new_list(ExprId::UNSET, CreateList::new(vec![doubled])),
        SourceInfo::default(),
    );

    let replaced = mutator()
        .replace_subtree_ast(&ast, &new_list, wrapper)
        .unwrap();
    assert_eq!(unparse(&replaced).unwrap(), "[1].map(x, x * 2)");
}

#[test]
fn test_unwrap_rejects_unknown_macro_shape() {
    let (mut ast, _) = map_ast();
    let key = ast.expr.id();
    let record = ast.source.macro_calls.get(&key).unwrap();
    let mut call = record.call().unwrap().clone();
    call.function = macros::EXISTS.to_owned();
    ast.source
        .macro_calls
        .insert(key, Expr::new_call(ExprId::UNSET, call));

    let wrapper = wrapper_list_id(&ast);
    let empty = Ast::new(
        Expr::new_list(ExprId::UNSET, CreateList::default()),
        SourceInfo::default(),
    );
    assert_eq!(
        mutator().replace_subtree_ast(&ast, &empty, wrapper),
        Err(MutatorError::UnsupportedMacroShape {
            id: key,
            function: macros::EXISTS.to_owned(),
        })
    );
}

#[test]
fn test_replacing_filter_wrapper_keeps_iteration_variable() {
    let ast = filter_ast();
    assert_eq!(unparse(&ast).unwrap(), "xs.filter(x, x > 0)");
    let wrapper = filter_wrapper_id(&ast);

    let same = Ast::new(
        Expr::new_list(
            ExprId::UNSET,
            CreateList::new(vec![Expr::new_ident(ExprId::UNSET, "x")]),
        ),
        SourceInfo::default(),
    );
    let replaced = mutator()
        .replace_subtree_ast(&ast, &same, wrapper)
        .unwrap();
    assert_eq!(unparse(&replaced).unwrap(), "xs.filter(x, x > 0)");

    let constant = Ast::new(
        Expr::new_list(
            ExprId::UNSET,
            CreateList::new(vec![Expr::new_constant(ExprId::UNSET, 5i64)]),
        ),
        SourceInfo::default(),
    );
    assert_eq!(
        mutator().replace_subtree_ast(&ast, &constant, wrapper),
        Err(MutatorError::UnsupportedMacroShape {
            id: ast.expr.id(),
            function: macros::FILTER.to_owned(),
        })
    );
}

#[test]
fn test_mangle_renames_loop_variables() {
    let mut f = ExprFactory::new();
    let ast = with_types(exists_ast(&mut f));

    let mangled = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
        .unwrap();

    let comprehension = mangled.ast.expr.comprehension().unwrap();
    assert_eq!(comprehension.iter_var, "@c0:0");
    assert_eq!(comprehension.accu_var, "@r0:0");
    assert_eq!(comprehension.iter_range, ast.expr.comprehension().unwrap().iter_range);
    assert_eq!(
        unparse(&mangled.ast).unwrap(),
        "[1, 2, 3].exists(@c0:0, @c0:0 > 0)"
    );

    let name = MangledComprehensionName {
        iter_var: "@c0:0".to_owned(),
        iter_var2: None,
        result: "@r0:0".to_owned(),
    };
    assert_eq!(
        mangled.mangled_comprehension_map.get(&name),
        Some(&MangledComprehensionType {
            iter_var_type: CelType::Int,
            iter_var2_type: None,
            result_type: CelType::Bool,
        })
    );
    assert!(mangled.ast.is_checked());
}

#[test]
fn test_mangle_nested_comprehensions() {
    let mut f = ExprFactory::new();
    let ys = f.new_ident("ys");
    let y = f.new_ident("y");
    let x = f.new_ident("x");
    let eq = f.new_global_call(EQUALS, vec![y, x]);
    let inner = f.expand_exists(ys, "y", eq);
    let xs = f.new_ident("xs");
    let outer = f.expand_all(xs, "x", inner);
    let ast = with_types(f.build_ast(outer));

    let mangled = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
        .unwrap();
    assert_eq!(
        unparse(&mangled.ast).unwrap(),
        "xs.all(@c0:0, ys.exists(@c1:0, @c1:0 == @c0:0))"
    );
    assert_eq!(mangled.mangled_comprehension_map.len(), 2);
}

#[test]
fn test_mangle_renames_when_only_accumulator_is_read() {
    let mut f = ExprFactory::new();
    let elements = vec![f.new_int(1), f.new_int(2), f.new_int(3)];
    let range = f.new_list(elements);
    let always = f.new_bool(true);
    let all = f.expand_all(range, "x", always);
    let ast = with_types(f.build_ast(all));

    let mangled = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
        .unwrap();
    let comprehension = mangled.ast.expr.comprehension().unwrap();
    assert_eq!(comprehension.iter_var, "@c0:0");
    assert_eq!(comprehension.accu_var, "@r0:0");
    assert_eq!(unparse(&mangled.ast).unwrap(), "[1, 2, 3].all(@c0:0, true)");

    let name = MangledComprehensionName {
        iter_var: "@c0:0".to_owned(),
        iter_var2: None,
        result: "@r0:0".to_owned(),
    };
    assert_eq!(
        mangled.mangled_comprehension_map.get(&name),
        Some(&MangledComprehensionType {
            iter_var_type: CelType::Dyn,
            iter_var2_type: None,
            result_type: CelType::Bool,
        })
    );
}

#[test]
fn test_mangle_renames_bind_variable() {
    let mut f = ExprFactory::new();
    let one = f.new_int(1);
    let left = f.new_ident("y");
    let right = f.new_ident("y");
    let sum = f.new_global_call(ADD, vec![left, right]);
    let bind = f.expand_bind("y", one, sum);
    let ast = with_types(f.build_ast(bind));
    assert_eq!(unparse(&ast).unwrap(), "cel.bind(y, 1, y + y)");

    let mangled = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
        .unwrap();
    assert_eq!(
        mangled.ast.expr.comprehension().unwrap().accu_var,
        "@r0:0"
    );
    assert_eq!(
        unparse(&mangled.ast).unwrap(),
        "cel.bind(@r0:0, 1, @r0:0 + @r0:0)"
    );
}

#[test]
fn test_mangle_requires_types() {
    let mut f = ExprFactory::new();
    let ast = exists_ast(&mut f);
    assert_eq!(
        mutator()
            .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
            .map(|_| ()),
        Err(MutatorError::MissingType(id(5)))
    );
}

#[test]
fn test_mangle_is_idempotent() {
    let mut f = ExprFactory::new();
    let ast = with_types(exists_ast(&mut f));
    let once = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
        .unwrap();
    let twice = mutator()
        .mangle_comprehension_identifier_names(&once.ast, "@c", "@r", false)
        .unwrap();
    assert_eq!(twice.ast, once.ast);
    assert!(twice.mangled_comprehension_map.is_empty());
}

#[test]
fn test_mangle_reuses_names_per_depth_and_type() {
    let mut f = ExprFactory::new();
    let left = exists_ast(&mut f).expr;
    let right = exists_ast(&mut f).expr;
    let and = f.new_global_call(LOGICAL_AND, vec![left, right]);
    let ast = with_types(f.build_ast(and));

    let shared = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
        .unwrap();
    assert_eq!(
        unparse(&shared.ast).unwrap(),
        "[1, 2, 3].exists(@c0:0, @c0:0 > 0) && [1, 2, 3].exists(@c0:0, @c0:0 > 0)"
    );
    assert_eq!(shared.mangled_comprehension_map.len(), 1);

    let serial = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", true)
        .unwrap();
    assert_eq!(
        unparse(&serial.ast).unwrap(),
        "[1, 2, 3].exists(@c0:0, @c0:0 > 0) && [1, 2, 3].exists(@c0:1, @c0:1 > 0)"
    );
    assert_eq!(serial.mangled_comprehension_map.len(), 2);
}

#[test]
fn test_mangle_distinguishes_types() {
    let mut f = ExprFactory::new();
    let ints = exists_ast(&mut f).expr;
    let a = f.new_string("a");
    let range = f.new_list(vec![a]);
    let s = f.new_ident("s");
    let b = f.new_string("b");
    let predicate = f.new_global_call(EQUALS, vec![s, b]);
    let strings = f.expand_exists(range, "s", predicate);
    let and = f.new_global_call(LOGICAL_AND, vec![ints, strings]);
    let mut ast = with_types(f.build_ast(and));
    for node in NavigableExpr::new(&ast.expr.clone()).all_nodes(TraversalOrder::PreOrder) {
        if node.expr().ident().is_ok_and(|ident| ident.name == "s") {
            ast.types.insert(node.id(), CelType::String);
        }
    }

    let mangled = mutator()
        .mangle_comprehension_identifier_names(&ast, "@c", "@r", false)
        .unwrap();
    assert_eq!(
        unparse(&mangled.ast).unwrap(),
        "[1, 2, 3].exists(@c0:0, @c0:0 > 0) && [\"a\"].exists(@c0:1, @c0:1 == \"b\")"
    );
}

#[test]
fn test_wrap_with_cel_block() {
    let ast = Ast::new(Expr::new_ident(id(1), "x"), SourceInfo::default());
    let block = mutator().wrap_ast_with_new_cel_block(&ast, vec![Expr::new_constant(id(5), 1i64)]);
    assert_eq!(block.expr.id(), id(6));
    assert_eq!(block.expr.call().unwrap().args[0].id(), id(7));
    assert_eq!(unparse(&block).unwrap(), "cel.@block([1], x)");
}

#[test]
fn test_bind_macro_replaces_target() {
    let mut f = ExprFactory::new();
    let a = f.new_ident("a");
    let b = f.new_ident("a");
    let sum = f.new_global_call(ADD, vec![a, b]);
    let ast = f.build_ast(sum.clone());
    let init = Ast::new(Expr::new_constant(id(10), 1i64), SourceInfo::default());

    let bound = mutator()
        .replace_subtree_with_new_bind_macro(&ast, "@r0", &init, &sum, sum.id(), true)
        .unwrap();
    assert_eq!(bound.expr.id(), sum.id());
    assert_eq!(bound.expr.comprehension().unwrap().accu_var, "@r0");
    assert_eq!(unparse(&bound).unwrap(), "cel.bind(@r0, 1, a + a)");

    let bare = mutator()
        .replace_subtree_with_new_bind_macro(&ast, "@r0", &init, &sum, sum.id(), false)
        .unwrap();
    assert!(bare.source.macro_calls.is_empty());
}

#[test]
fn test_subtree_ast_carries_nested_records() {
    let mut f = ExprFactory::new();
    let exists = exists_ast(&mut f).expr;
    let flag = f.new_ident("flag");
    let or = f.new_global_call(LOGICAL_OR, vec![exists.clone(), flag.clone()]);
    let ast = f.build_ast(or);

    assert_eq!(AstMutator::subtree_ast(&ast, &exists).source.macro_calls.len(), 1);
    assert!(AstMutator::subtree_ast(&ast, &flag).source.macro_calls.is_empty());
}

#[test]
fn test_member_call_has_unset_ids() {
    let call = AstMutator::new_member_call(Expr::new_ident(ExprId::UNSET, "xs"), "size", vec![]);
    assert_eq!(pre_order_ids(&call), vec![0, 0]);
    assert!(call.call().unwrap().target.is_some());
}
