//! End-to-end inference scenarios: facts in, solved qualifiers out.

use ptrqual_common::{DeclKey, SourceLoc};
use ptrqual_infer::facts::{DeclFact, Expr, Fact, ParamShape, TypeShape};
use ptrqual_infer::{Options, Qualifier, Retraction, Session};

// ── Helpers ────────────────────────────────────────────────────────────

fn key(file: &str, line: u32, name: &str) -> DeclKey {
    DeclKey::new(file, line, 1, name)
}

fn ptr_var(k: &DeclKey) -> Fact {
    Fact::Declare(DeclFact::variable(k.clone(), TypeShape::pointer("int", 1)))
}

fn assign(lhs: &DeclKey, rhs: &DeclKey) -> Fact {
    Fact::Assign {
        lhs: Expr::decl(lhs.clone()),
        rhs: Expr::decl(rhs.clone()),
        loc: Some(lhs.loc()),
    }
}

fn bad_cast(k: &DeclKey) -> Fact {
    Fact::Cast {
        expr: Expr::decl(k.clone()),
        from: TypeShape::pointer("int", 1),
        to: TypeShape::pointer("char", 1),
        loc: Some(SourceLoc::new(&k.file, k.line, 5)),
    }
}

fn solved(facts: &[Fact]) -> Session {
    let session = Session::default();
    session.build(facts).unwrap();
    session.solve().unwrap();
    session
}

fn outer(session: &Session, k: &DeclKey) -> Qualifier {
    session.solution(k).unwrap()[0][0]
}

// ── Scenarios ──────────────────────────────────────────────────────────

#[test]
fn address_of_local_int_is_ptr() {
    let x = key("a.c", 1, "x");
    let p = key("a.c", 2, "p");
    let session = solved(&[
        Fact::Declare(DeclFact::variable(x.clone(), TypeShape::scalar("int"))),
        ptr_var(&p),
        Fact::Assign {
            lhs: Expr::decl(p.clone()),
            rhs: Expr::addr_of(Expr::decl(x)),
            loc: None,
        },
    ]);
    assert_eq!(session.solution(&p).unwrap(), vec![vec![Qualifier::Ptr]]);
}

#[test]
fn unsafe_cast_taints_everything_equated() {
    let p = key("a.c", 1, "p");
    let q = key("a.c", 2, "q");
    let r = key("a.c", 3, "r");
    let s = key("a.c", 4, "s");
    let session = solved(&[
        ptr_var(&p),
        ptr_var(&q),
        ptr_var(&r),
        ptr_var(&s),
        assign(&q, &p),
        assign(&r, &q),
        bad_cast(&p),
    ]);
    assert_eq!(outer(&session, &p), Qualifier::Wild);
    assert_eq!(outer(&session, &q), Qualifier::Wild);
    assert_eq!(outer(&session, &r), Qualifier::Wild);
    assert_eq!(outer(&session, &s), Qualifier::Ptr);
}

#[test]
fn extern_global_declarations_agree() {
    let g_a = key("a.c", 1, "g");
    let g_b = key("b.c", 1, "g");
    let malloc = key("stdlib.h", 10, "malloc");
    let malloc_ty = TypeShape::function(
        TypeShape::pointer("void", 1),
        vec![ParamShape::new("n", TypeShape::scalar("size_t"))],
    );
    let session = solved(&[
        Fact::Declare(DeclFact::variable(g_a.clone(), TypeShape::pointer("int", 1)).global()),
        Fact::Declare(DeclFact::variable(g_b.clone(), TypeShape::pointer("int", 1)).global()),
        Fact::Declare(DeclFact::function(malloc.clone(), malloc_ty).global()),
        Fact::Call {
            callee: Expr::decl(malloc),
            args: vec![Expr::Other],
            result: Some(Expr::decl(g_b.clone())),
            loc: None,
        },
    ]);
    assert_eq!(session.solution(&g_a).unwrap(), session.solution(&g_b).unwrap());
    assert_eq!(outer(&session, &g_a), Qualifier::Ptr);
}

#[test]
fn arity_mismatch_across_files_makes_returns_wild() {
    let proto = key("a.h", 1, "f");
    let def = key("b.c", 3, "f");
    let one = TypeShape::function(
        TypeShape::pointer("int", 1),
        vec![ParamShape::new("a", TypeShape::scalar("int"))],
    );
    let two = TypeShape::function(
        TypeShape::pointer("int", 1),
        vec![
            ParamShape::new("a", TypeShape::scalar("int")),
            ParamShape::new("b", TypeShape::scalar("int")),
        ],
    );
    let session = solved(&[
        Fact::Declare(DeclFact::function(proto.clone(), one).global()),
        Fact::Declare(DeclFact::function(def.clone(), two).global().definition()),
    ]);
    session.with_program(|info| {
        let cs = info.constraints();
        let arena = info.arena();
        let proto_fn = info.function_decl(&proto).unwrap().cvar;
        let synth = info.synthesized(&def).expect("definition gets a declaration");
        for f in [proto_fn, synth] {
            let ret = *arena.function(f).unwrap().returns.iter().next().unwrap();
            assert_eq!(arena.outermost(ret, cs), Some(Qualifier::Wild));
        }
    });
}

#[test]
fn retracting_root_cause_frees_its_cluster() {
    let p = key("a.c", 1, "p");
    let q = key("a.c", 2, "q");
    let r = key("a.c", 3, "r");
    let t = key("a.c", 4, "t");
    let session = solved(&[
        ptr_var(&p),
        ptr_var(&q),
        ptr_var(&r),
        ptr_var(&t),
        assign(&q, &p),
        assign(&r, &q),
        bad_cast(&p),
        bad_cast(&t),
    ]);
    let ds = session.disjoint().unwrap();
    assert_eq!(ds.all_wild().len(), 4);
    assert!(ds.valid_files().contains("a.c"));

    let p_slot = session.with_program(|info| {
        let cv = *info.variables()[&p].iter().next().unwrap();
        info.arena().pointer(cv).unwrap().slots[0]
    });
    let leader = ds.leader_of(p_slot).unwrap();
    let cluster = ds.group(leader).unwrap().len();
    assert_eq!(cluster, 3);

    let trial = session.speculate(p_slot, Retraction::Single).unwrap();
    assert_eq!(trial.wild_before - trial.wild_after, cluster);
    assert_eq!(trial.removed.len(), 1);

    session.commit(trial);
    assert_eq!(outer(&session, &q), Qualifier::Ptr);
    assert_eq!(outer(&session, &t), Qualifier::Wild);
    assert_eq!(session.disjoint().unwrap().all_wild().len(), 1);
}

#[test]
fn retracting_by_reason_clears_every_sharing_constraint() {
    let p = key("a.c", 1, "p");
    let t = key("a.c", 4, "t");
    let session = solved(&[ptr_var(&p), ptr_var(&t), bad_cast(&p), bad_cast(&t)]);
    let p_slot = session.with_program(|info| {
        let cv = *info.variables()[&p].iter().next().unwrap();
        info.arena().pointer(cv).unwrap().slots[0]
    });
    let trial = session.speculate(p_slot, Retraction::SameReason).unwrap();
    assert_eq!(trial.removed.len(), 2);
    assert_eq!(trial.wild_after, 0);
    assert_eq!(trial.now_checked.len(), 2);
}

// ── Properties ─────────────────────────────────────────────────────────

#[test]
fn wild_outer_level_makes_inner_levels_wild() {
    let pp = key("a.c", 1, "pp");
    let session = solved(&[
        Fact::Declare(DeclFact::variable(pp.clone(), TypeShape::pointer("int", 2))),
        Fact::Cast {
            expr: Expr::decl(pp.clone()),
            from: TypeShape::pointer("int", 2),
            to: TypeShape::pointer("float", 2),
            loc: None,
        },
    ]);
    assert_eq!(
        session.solution(&pp).unwrap(),
        vec![vec![Qualifier::Wild, Qualifier::Wild]]
    );
}

#[test]
fn linking_does_not_depend_on_file_order() {
    let g_a = key("a.c", 1, "g");
    let g_b = key("b.c", 1, "g");
    let h = key("b.c", 2, "h");
    let unit_a = vec![
        Fact::Declare(DeclFact::variable(g_a.clone(), TypeShape::pointer("int", 1)).global()),
        Fact::Arithmetic {
            expr: Expr::decl(g_a.clone()),
            loc: None,
        },
    ];
    let unit_b = vec![
        Fact::Declare(DeclFact::variable(g_b.clone(), TypeShape::pointer("int", 1)).global()),
        ptr_var(&h),
        assign(&h, &g_b),
    ];
    let ab: Vec<Fact> = unit_a.iter().chain(&unit_b).cloned().collect();
    let ba: Vec<Fact> = unit_b.iter().chain(&unit_a).cloned().collect();
    let s1 = solved(&ab);
    let s2 = solved(&ba);
    for k in [&g_a, &g_b, &h] {
        assert_eq!(s1.solution(k).unwrap(), s2.solution(k).unwrap());
        assert_eq!(outer(&s1, k), Qualifier::Arr);
    }
}

#[test]
fn solving_twice_changes_nothing() {
    let p = key("a.c", 1, "p");
    let q = key("a.c", 2, "q");
    let session = solved(&[ptr_var(&p), ptr_var(&q), assign(&q, &p), bad_cast(&q)]);
    let first = session.solve().unwrap();
    let second = session.solve().unwrap();
    assert_eq!(first.wild, second.wild);
    assert_eq!(first.constraints, second.constraints);
    assert_eq!(session.solution(&p).unwrap(), vec![vec![Qualifier::Wild]]);
}

#[test]
fn every_member_of_a_wild_cluster_is_wild() {
    let keys: Vec<DeclKey> = (1..=6).map(|i| key("a.c", i, &format!("v{}", i))).collect();
    let mut facts: Vec<Fact> = keys.iter().map(ptr_var).collect();
    facts.push(assign(&keys[0], &keys[1]));
    facts.push(assign(&keys[1], &keys[2]));
    facts.push(assign(&keys[3], &keys[4]));
    facts.push(bad_cast(&keys[2]));
    let session = solved(&facts);
    let ds = session.disjoint().unwrap();
    let mut grouped = 0;
    for (root, members) in ds.unsafe_groups() {
        assert!(ds.all_wild().contains(&root.var));
        for m in members {
            assert!(ds.all_wild().contains(m));
            grouped += 1;
        }
    }
    assert_eq!(grouped, 3);
    assert_eq!(ds.all_wild().len(), 3);
}

#[test]
fn facts_from_json() {
    let json = r#"[
        {"fact": "declare", "key": {"file": "m.c", "line": 1, "name": "buf"},
         "kind": "variable", "ty": {"base": "char", "levels": ["pointer"]}},
        {"fact": "assign",
         "lhs": {"expr": "decl", "key": {"file": "m.c", "line": 1, "name": "buf"}},
         "rhs": {"expr": "string_literal"}}
    ]"#;
    let facts = ptrqual_infer::parse_facts(json).unwrap();
    let session = solved(&facts);
    let buf = DeclKey::new("m.c", 1, 0, "buf");
    assert_eq!(outer(&session, &buf), Qualifier::NtArr);
}

#[test]
fn separate_declarations_option_is_honoured() {
    let options = Options {
        separate_multiple_func_decls: true,
        ..Options::default()
    };
    let session = Session::new(options);
    let a = key("a.c", 1, "f");
    let b = key("b.c", 1, "f");
    let one = TypeShape::function(
        TypeShape::pointer("int", 1),
        vec![ParamShape::new("x", TypeShape::pointer("int", 1))],
    );
    let zero = TypeShape::function(TypeShape::pointer("int", 1), vec![]);
    session
        .build(&[
            Fact::Declare(DeclFact::function(a.clone(), one).global().definition()),
            Fact::Declare(DeclFact::function(b.clone(), zero).global().definition()),
        ])
        .unwrap();
    let summary = session.solve().unwrap();
    assert_eq!(summary.wild, 0);
}
