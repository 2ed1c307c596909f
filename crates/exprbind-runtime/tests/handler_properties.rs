#![forbid(unsafe_code)]

//! Behavioral properties of the four standard handlers.

use std::cell::RefCell;
use std::rc::Rc;

use exprbind_runtime::{
    BindError, ChangeKind, ChangeRecord, Declarative, ExprFunction, Handler, HandlerKind,
    InvertTarget, ModuleEnv, Namespace, Object, ObjectRef, Operator, ScopeKey, TargetBase, Tracer,
    Value,
};
use proptest::prelude::*;

fn globals(entries: &[(&str, Value)]) -> ModuleEnv {
    let mut ns = Namespace::new();
    for (k, v) in entries {
        ns.insert((*k).to_owned(), v.clone());
    }
    ModuleEnv::with_globals(ns)
}

fn handler(kind: HandlerKind, func: ExprFunction) -> Handler {
    Handler::new(kind, func, ScopeKey::fresh())
}

fn int(value: &Value) -> i64 {
    value.as_int().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Purity and write-then-read
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn standard_read_is_pure(a in -1000i64..1000, b in -1000i64..1000) {
        let owner: ObjectRef = Declarative::new("Item")
            .attr("a", Value::Int(a))
            .attr("b", Value::Int(b))
            .build();
        let read = handler(
            HandlerKind::StandardRead,
            ExprFunction::new("a_minus_b", ModuleEnv::default(), |scope, _| {
                Ok(Value::Int(int(&scope.get_name("a")?) - int(&scope.get_name("b")?)))
            }),
        );
        let first = read.read(&owner, "out").unwrap();
        let second = read.read(&owner, "out").unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, Value::Int(a - b));
    }

    #[test]
    fn write_then_read_passthrough(v in any::<i64>()) {
        let owner: ObjectRef = Declarative::new("Item").attr("x", Value::None).build();
        let write = handler(
            HandlerKind::StandardWrite,
            ExprFunction::new("store", ModuleEnv::default(), |scope, _| {
                let change = scope.get_name("change")?;
                scope.set_name("x", change.get_attr("value")?)?;
                Ok(Value::None)
            }),
        );
        let read = handler(
            HandlerKind::StandardRead,
            ExprFunction::new("x", ModuleEnv::default(), |scope, _| scope.get_name("x")),
        );
        let change = Rc::new(ChangeRecord::new(
            ChangeKind::Update,
            ObjectRef::clone(&owner),
            "value",
            Value::None,
            Value::Int(v),
        ));
        write.write(&owner, "value", &change).unwrap();
        prop_assert_eq!(read.read(&owner, "x").unwrap(), Value::Int(v));
    }

    /// Whichever layers define `name`, the highest-priority one wins:
    /// locals, then attributes, then globals, then builtins.
    #[test]
    fn scope_precedence(in_locals: bool, in_attrs: bool, in_globals: bool) {
        let key = ScopeKey::fresh();
        let mut builder = Declarative::new("Item");
        if in_locals {
            let mut locals = Namespace::new();
            locals.insert("len".into(), Value::str("local"));
            builder = builder.storage(key, locals);
        }
        if in_attrs {
            builder = builder.attr("len", Value::str("attribute"));
        }
        let owner: ObjectRef = builder.build();
        let env = if in_globals {
            globals(&[("len", Value::str("global"))])
        } else {
            ModuleEnv::default()
        };
        let read = Handler::new(
            HandlerKind::StandardRead,
            ExprFunction::new("len", env, |scope, _| scope.get_name("len")),
            key,
        );
        let value = read.read(&owner, "out").unwrap();
        let expected = if in_locals {
            Some("local")
        } else if in_attrs {
            Some("attribute")
        } else if in_globals {
            Some("global")
        } else {
            None
        };
        match expected {
            Some(layer) => prop_assert_eq!(value, Value::str(layer)),
            None => prop_assert!(value.as_native().is_some_and(|f| f.name() == "len")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

#[test]
fn tracer_records_exactly_owner_attributes() {
    let owner: ObjectRef = Declarative::new("Item")
        .attr("a", Value::Int(1))
        .attr("b", Value::Int(2))
        .build();
    let traced = handler(
        HandlerKind::TracedRead,
        ExprFunction::new("a_b_c", globals(&[("c", Value::Int(3))]), |scope, _| {
            let a = int(&scope.get_name("a")?);
            let b = int(&scope.get_name("b")?);
            let c = int(&scope.get_name("c")?);
            Ok(Value::Int(a + b + c))
        }),
    );
    let (value, tracer) = traced.read_traced(&owner, "sum").unwrap();
    assert_eq!(value, Value::Int(6));

    let deps: Vec<(String, String)> = tracer
        .dependencies()
        .iter()
        .map(|d| (d.object.type_name().to_owned(), d.name.clone()))
        .collect();
    assert_eq!(
        deps,
        vec![
            ("Item".to_owned(), "a".to_owned()),
            ("Item".to_owned(), "b".to_owned())
        ]
    );
    assert!(!tracer.contains(&owner, "c"));
}

#[test]
fn nested_traced_reads_keep_separate_dependencies() {
    let inner = Declarative::new("Inner").attr("b", Value::Int(10)).build();
    let outer: ObjectRef = Declarative::new("Outer")
        .attr("a", Value::Int(1))
        .attr("child", Value::Object(inner.clone()))
        .build();
    let inner_obj: ObjectRef = inner.clone();

    let inner_handler = Rc::new(handler(
        HandlerKind::TracedRead,
        ExprFunction::new("b", ModuleEnv::default(), |scope, _| scope.get_name("b")),
    ));
    let inner_tracer: Rc<RefCell<Option<Rc<Tracer>>>> = Rc::new(RefCell::new(None));

    let nested = Rc::clone(&inner_handler);
    let captured = Rc::clone(&inner_tracer);
    let outer_handler = handler(
        HandlerKind::TracedRead,
        ExprFunction::new("a_plus_child", ModuleEnv::default(), move |scope, args| {
            let a = scope.get_name("a")?;
            let child = scope.get_name("child")?;
            let Some(child_obj) = child.as_object() else {
                return Err(BindError::evaluation("child is not an object"));
            };
            let (b, tracer) = nested.read_traced(child_obj, "value")?;
            *captured.borrow_mut() = Some(tracer);
            // the outer evaluation's own tracer is still the one in scope
            assert!(args.tracer().is_some_and(|t| Rc::ptr_eq(t, scope.tracer().unwrap())));
            Ok(Value::Int(int(&a) + int(&b)))
        }),
    );

    let (value, outer_tracer) = outer_handler.read_traced(&outer, "total").unwrap();
    assert_eq!(value, Value::Int(11));

    assert_eq!(outer_tracer.len(), 2);
    assert!(outer_tracer.contains(&outer, "a"));
    assert!(outer_tracer.contains(&outer, "child"));
    assert!(!outer_tracer.contains(&inner_obj, "b"));

    let inner_tracer = inner_tracer.borrow().clone().unwrap();
    assert_eq!(inner_tracer.len(), 1);
    assert!(inner_tracer.contains(&inner_obj, "b"));
    assert!(!inner_tracer.contains(&outer, "a"));
}

#[test]
fn nested_bindings_through_lazy_defaults() {
    let inner = Declarative::new("Inner").attr("b", Value::Int(5)).build();
    inner.bind(
        "value",
        Operator::Subscribe,
        ExprFunction::new("b_times_two", ModuleEnv::default(), |scope, _| {
            Ok(Value::Int(int(&scope.get_name("b")?) * 2))
        }),
        ScopeKey::fresh(),
    );
    let outer = Declarative::new("Outer")
        .attr("a", Value::Int(1))
        .attr("child", Value::Object(inner.clone()))
        .build();
    outer.bind(
        "total",
        Operator::Subscribe,
        ExprFunction::new("a_plus_child_value", ModuleEnv::default(), |scope, args| {
            let a = scope.get_name("a")?;
            let child = scope.get_name("child")?;
            let tracer = args
                .tracer()
                .ok_or_else(|| BindError::evaluation("expected a tracer"))?;
            let value = tracer.load_attr(&child, "value")?;
            Ok(Value::Int(int(&a) + int(&value)))
        }),
        ScopeKey::fresh(),
    );
    outer.initialize().unwrap();
    assert_eq!(outer.value("total"), Some(Value::Int(11)));

    let inner_engine = inner.engine().unwrap();
    let outer_engine = outer.engine().unwrap();
    assert_eq!(inner_engine.subscription_count("value"), 1);
    assert_eq!(outer_engine.subscription_count("total"), 3);

    // b -> inner.value -> outer.total
    inner.set_attr("b", Value::Int(7)).unwrap();
    assert_eq!(inner.value("value"), Some(Value::Int(14)));
    assert_eq!(outer.value("total"), Some(Value::Int(15)));
}

// ---------------------------------------------------------------------------
// Inversion
// ---------------------------------------------------------------------------

fn inverted(target: InvertTarget, env: ModuleEnv) -> Handler {
    handler(
        HandlerKind::InvertedWrite,
        ExprFunction::new("inverse", env, move |_, args| {
            let (inverter, value) = args.inversion()?;
            inverter.invert(&target, value.clone())?;
            Ok(Value::None)
        }),
    )
}

proptest! {
    #[test]
    fn inversion_round_trip(v in any::<i64>()) {
        let foo = Declarative::new("Foo").attr("x", Value::Int(0)).build();
        let owner: ObjectRef = Declarative::new("Item").build();
        let write = inverted(
            InvertTarget::attribute(TargetBase::name("foo"), "x"),
            globals(&[("foo", Value::Object(foo.clone()))]),
        );
        let change = Rc::new(ChangeRecord::update(
            ObjectRef::clone(&owner),
            "value",
            Value::None,
            Value::Int(v),
        ));
        write.write(&owner, "value", &change).unwrap();
        prop_assert_eq!(foo.value("x"), Some(Value::Int(v)));
    }
}

#[test]
fn arithmetic_shape_is_not_invertible() {
    let foo = Declarative::new("Foo")
        .attr("x", Value::Int(1))
        .attr("y", Value::Int(2))
        .build();
    let owner: ObjectRef = Declarative::new("Item").build();
    let write = inverted(
        InvertTarget::unsupported("foo.x + foo.y"),
        globals(&[("foo", Value::Object(foo.clone()))]),
    );
    let change = Rc::new(ChangeRecord::update(
        ObjectRef::clone(&owner),
        "value",
        Value::None,
        Value::Int(9),
    ));
    let err = write.write(&owner, "value", &change).unwrap_err();
    assert!(err.is_inversion());
    assert_eq!(foo.value("x"), Some(Value::Int(1)));
    assert_eq!(foo.value("y"), Some(Value::Int(2)));
}

#[test]
fn read_only_target_refuses_inversion() {
    let foo = Declarative::new("Foo").constant("x", Value::Int(1)).build();
    let owner: ObjectRef = Declarative::new("Item").build();
    let write = inverted(
        InvertTarget::attribute(TargetBase::name("foo"), "x"),
        globals(&[("foo", Value::Object(foo.clone()))]),
    );
    let change = Rc::new(ChangeRecord::update(
        ObjectRef::clone(&owner),
        "value",
        Value::None,
        Value::Int(2),
    ));
    let err = write.write(&owner, "value", &change).unwrap_err();
    assert!(err.is_inversion());
    assert_eq!(
        err.to_string(),
        "can't assign to expression: attribute 'x' of 'Foo' object is read-only"
    );
}

#[test]
fn bare_name_targets_refuse_with_inversion_errors() {
    let owner: ObjectRef = Declarative::new("Item").constant("x", Value::Int(1)).build();
    let change = Rc::new(ChangeRecord::update(
        ObjectRef::clone(&owner),
        "value",
        Value::None,
        Value::Int(2),
    ));

    let constant = inverted(InvertTarget::name("x"), ModuleEnv::default());
    let err = constant.write(&owner, "value", &change).unwrap_err();
    assert!(err.is_inversion());
    assert_eq!(
        err.to_string(),
        "can't assign to expression: attribute 'x' of 'Item' object is read-only"
    );
    assert_eq!(owner.get_attr("x").unwrap(), Some(Value::Int(1)));

    let reserved = inverted(InvertTarget::name("self"), ModuleEnv::default());
    let err = reserved.write(&owner, "value", &change).unwrap_err();
    assert!(err.is_inversion());
    assert!(err.to_string().contains("reserved name 'self'"));
}

// ---------------------------------------------------------------------------
// Name resolution
// ---------------------------------------------------------------------------

#[test]
fn missing_name_is_identified() {
    let owner: ObjectRef = Declarative::new("Item").build();
    for kind in [HandlerKind::StandardRead, HandlerKind::TracedRead] {
        let read = handler(
            kind,
            ExprFunction::new("zzz", ModuleEnv::default(), |scope, _| scope.get_name("zzz")),
        );
        let err = read.read(&owner, "out").unwrap_err();
        assert_eq!(err.unresolved_name(), Some("zzz"));
        assert_eq!(err.to_string(), "name 'zzz' is not defined");
    }
}
