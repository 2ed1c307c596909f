#![forbid(unsafe_code)]

//! The default builtin layer.
//!
//! Builtins are the last layer consulted by [`DynamicScope`](crate::DynamicScope).
//! The layer is built once per thread and shared by every module environment
//! that asks for the defaults.

use std::rc::Rc;

use exprbind_core::{BindError, Namespace, NativeFn, Result, Value};

/// Name of the builtin the inverter treats as invertible (`getattr` → `setattr`).
pub const GETATTR: &str = "getattr";

thread_local! {
    static DEFAULT_BUILTINS: Rc<Namespace> = Rc::new(build());
}

/// Shared handle to the default builtin layer.
#[must_use]
pub fn default_builtins() -> Rc<Namespace> {
    DEFAULT_BUILTINS.with(Rc::clone)
}

fn build() -> Namespace {
    let mut ns = Namespace::new();
    ns.insert("None".into(), Value::None);
    ns.insert("True".into(), Value::Bool(true));
    ns.insert("False".into(), Value::Bool(false));
    for native in [
        NativeFn::new(GETATTR, getattr),
        NativeFn::new("setattr", setattr),
        NativeFn::new("hasattr", hasattr),
        NativeFn::new("len", len),
        NativeFn::new("str", to_str),
        NativeFn::new("int", to_int),
        NativeFn::new("float", to_float),
        NativeFn::new("bool", to_bool),
        NativeFn::new("abs", abs),
        NativeFn::new("min", |args| extremum("min", args, |a, b| a < b)),
        NativeFn::new("max", |args| extremum("max", args, |a, b| a > b)),
    ] {
        ns.insert(native.name().to_owned(), Value::Native(native));
    }
    ns
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else if min == max {
        Err(BindError::evaluation(format!(
            "{name}() takes exactly {min} argument(s) ({} given)",
            args.len()
        )))
    } else {
        Err(BindError::evaluation(format!(
            "{name}() takes {min} to {max} arguments ({} given)",
            args.len()
        )))
    }
}

fn attr_name<'a>(func: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        BindError::evaluation(format!(
            "{func}(): attribute name must be str, not {}",
            value.type_name()
        ))
    })
}

fn getattr(args: &[Value]) -> Result<Value> {
    arity(GETATTR, args, 2, 3)?;
    let name = attr_name(GETATTR, &args[1])?;
    match args[0].get_attr(name) {
        Err(BindError::Access(_)) if args.len() == 3 => Ok(args[2].clone()),
        other => other,
    }
}

fn setattr(args: &[Value]) -> Result<Value> {
    arity("setattr", args, 3, 3)?;
    let name = attr_name("setattr", &args[1])?;
    args[0].set_attr(name, args[2].clone())?;
    Ok(Value::None)
}

fn hasattr(args: &[Value]) -> Result<Value> {
    arity("hasattr", args, 2, 2)?;
    let name = attr_name("hasattr", &args[1])?;
    Ok(Value::Bool(
        args[0].as_object().is_some_and(|obj| obj.has_attr(name)),
    ))
}

fn len(args: &[Value]) -> Result<Value> {
    arity("len", args, 1, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(l) => l.borrow().len(),
        Value::Map(m) => m.borrow().len(),
        other => {
            return Err(BindError::evaluation(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

fn to_str(args: &[Value]) -> Result<Value> {
    arity("str", args, 0, 1)?;
    Ok(match args.first() {
        None => Value::str(""),
        Some(Value::Str(s)) => Value::Str(Rc::clone(s)),
        Some(Value::None) => Value::str("None"),
        Some(Value::Bool(true)) => Value::str("True"),
        Some(Value::Bool(false)) => Value::str("False"),
        Some(Value::Int(i)) => Value::str(i.to_string()),
        Some(Value::Float(x)) => Value::str(format!("{x:?}")),
        Some(other) => Value::str(format!("{other:?}")),
    })
}

fn to_int(args: &[Value]) -> Result<Value> {
    arity("int", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Float(x)) => Ok(Value::Int(x.trunc() as i64)),
        Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            BindError::evaluation(format!("invalid literal for int(): {s:?}"))
        }),
        Some(v) => v.as_int().map(Value::Int).ok_or_else(|| {
            BindError::evaluation(format!(
                "int() argument must be a string or a number, not '{}'",
                v.type_name()
            ))
        }),
    }
}

fn to_float(args: &[Value]) -> Result<Value> {
    arity("float", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            BindError::evaluation(format!("could not convert string to float: {s:?}"))
        }),
        Some(Value::Bool(b)) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Some(v) => v.as_float().map(Value::Float).ok_or_else(|| {
            BindError::evaluation(format!(
                "float() argument must be a string or a number, not '{}'",
                v.type_name()
            ))
        }),
    }
}

fn to_bool(args: &[Value]) -> Result<Value> {
    arity("bool", args, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
}

fn abs(args: &[Value]) -> Result<Value> {
    arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| BindError::evaluation("integer overflow in abs()")),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(BindError::evaluation(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn extremum(name: &str, args: &[Value], better: fn(f64, f64) -> bool) -> Result<Value> {
    let items: Vec<Value> = match args {
        [Value::List(list)] => list.borrow().clone(),
        _ => args.to_vec(),
    };
    let mut best: Option<(f64, Value)> = None;
    for item in items {
        let key = item.as_float().ok_or_else(|| {
            BindError::evaluation(format!(
                "{name}() arguments must be numbers, not '{}'",
                item.type_name()
            ))
        })?;
        if best.as_ref().is_none_or(|(b, _)| better(key, *b)) {
            best = Some((key, item));
        }
    }
    best.map(|(_, v)| v)
        .ok_or_else(|| BindError::evaluation(format!("{name}() arg is an empty sequence")))
}
