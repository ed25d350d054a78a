//! Bounded structural rendering of runtime values
//!
//! Used for log lines and failure messages only. Rendering never fails: deep
//! containers collapse to a type tag, long containers and strings are elided,
//! and a pointer that is already being rendered (a cycle) shows as locked.

use std::fmt::Write;
use std::sync::TryLockError;

use super::value::Value;
use crate::config::DumpLimits;

/// Render `value` within `limits`
pub fn dump(value: &Value, limits: &DumpLimits) -> String {
    let mut out = String::new();
    dump_into(&mut out, value, limits, 0);
    out
}

fn dump_into(out: &mut String, value: &Value, limits: &DumpLimits, depth: usize) {
    // writing into a String is infallible
    if depth >= limits.max_depth && matches!(value, Value::List(_) | Value::Table(_)) {
        let _ = write!(out, "<{}>", value.type_name());
        return;
    }
    match value {
        Value::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::Float(fl) => {
            let _ = write!(out, "{}", fl);
        }
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Nil => out.push_str("nil"),
        Value::String(s) => dump_string(out, s, limits),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if i == limits.max_items {
                    out.push_str("...");
                    break;
                }
                dump_into(out, item, limits, depth + 1);
            }
            out.push(']');
        }
        Value::Table(fields) => {
            out.push('{');
            for (i, (key, field)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if i == limits.max_items {
                    out.push_str("...");
                    break;
                }
                let _ = write!(out, "{}: ", key);
                dump_into(out, field, limits, depth + 1);
            }
            out.push('}');
        }
        Value::Pointer(ptr) => match ptr.try_lock() {
            Ok(guard) => {
                out.push('&');
                dump_into(out, &guard, limits, depth + 1);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                out.push('&');
                dump_into(out, &poisoned.into_inner(), limits, depth + 1);
            }
            Err(TryLockError::WouldBlock) => out.push_str("<pointer (locked)>"),
        },
    }
}

fn dump_string(out: &mut String, s: &str, limits: &DumpLimits) {
    out.push('"');
    let mut chars = s.chars();
    out.extend(chars.by_ref().take(limits.max_string_len));
    if chars.next().is_some() {
        out.push_str("...");
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limits(max_depth: usize, max_items: usize, max_string_len: usize) -> DumpLimits {
        DumpLimits {
            max_depth,
            max_items,
            max_string_len,
        }
    }

    #[test]
    fn test_scalars() {
        let l = DumpLimits::default();
        assert_eq!(dump(&Value::Int(42), &l), "42");
        assert_eq!(dump(&Value::Nil, &l), "nil");
        assert_eq!(dump(&Value::Bool(false), &l), "false");
        assert_eq!(dump(&Value::from("x"), &l), "\"x\"");
    }

    #[test]
    fn test_depth_collapses_to_type_tag() {
        let nested = Value::List(vec![Value::List(vec![Value::List(vec![Value::Int(1)])])]);
        assert_eq!(dump(&nested, &limits(2, 16, 16)), "[[<list>]]");

        let table = Value::table([("inner", Value::table([("k", Value::Int(1))]))]);
        assert_eq!(dump(&table, &limits(1, 16, 16)), "{inner: <table>}");
    }

    #[test]
    fn test_items_and_strings_are_elided() {
        let list = Value::List((1..=5).map(Value::Int).collect());
        assert_eq!(dump(&list, &limits(3, 2, 16)), "[1, 2, ...]");
        assert_eq!(dump(&Value::from("abcdef"), &limits(3, 2, 3)), "\"abc...\"");
    }

    #[test]
    fn test_cycle_does_not_recurse() {
        let ptr = Value::pointer(Value::Nil);
        if let Value::Pointer(cell) = &ptr {
            *cell.lock().unwrap() = Value::List(vec![Value::Int(1), ptr.clone()]);
        }

        let rendered = dump(&ptr, &DumpLimits::default());
        assert_eq!(rendered, "&[1, <pointer (locked)>]");
    }
}
