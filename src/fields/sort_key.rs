// src/fields/sort_key.rs
//
// A single comparable key type spanning every field datatype, so the
// view's multisort (spec section 4.4) never has to special-case a
// column's underlying type. `f64::total_cmp` gives float fields a total
// order without pulling in an ordered-float crate.

use crate::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Empty,
    Int(i64),
    Float(f64),
    Str(String),
    Tristate(u8),
    Multi(Vec<SortKey>),
}

impl SortKey {
    pub fn from_value(value: &Value) -> SortKey {
        match value {
            crate::value::Value::Text(s) => SortKey::Str(s.to_lowercase()),
            crate::value::Value::Int(i) => SortKey::Int(*i),
            crate::value::Value::Rating(r) => SortKey::Int(*r as i64),
            crate::value::Value::File(f) => SortKey::Str(f.filename.to_lowercase()),
            crate::value::Value::Cover(c) => SortKey::Str(c.location.to_lowercase()),
        }
    }

    pub fn from_bool(value: Option<bool>, tristate: bool) -> SortKey {
        if tristate {
            SortKey::Tristate(match value {
                Some(true) => 1,
                Some(false) => 2,
                None => 3,
            })
        } else {
            SortKey::Tristate(if value.unwrap_or(false) { 1 } else { 2 })
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Empty => 0,
            SortKey::Int(_) => 1,
            SortKey::Float(_) => 1,
            SortKey::Str(_) => 1,
            SortKey::Tristate(_) => 1,
            SortKey::Multi(_) => 1,
        }
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Empty, SortKey::Empty) => Ordering::Equal,
            (SortKey::Int(a), SortKey::Int(b)) => a.cmp(b),
            (SortKey::Float(a), SortKey::Float(b)) => a.total_cmp(b),
            (SortKey::Str(a), SortKey::Str(b)) => a.cmp(b),
            (SortKey::Tristate(a), SortKey::Tristate(b)) => a.cmp(b),
            (SortKey::Multi(a), SortKey::Multi(b)) => a.cmp(b),
            (SortKey::Int(a), SortKey::Float(b)) => (*a as f64).total_cmp(b),
            (SortKey::Float(a), SortKey::Int(b)) => a.total_cmp(&(*b as f64)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sorts_before_everything() {
        let mut keys = vec![SortKey::Str("b".into()), SortKey::Empty, SortKey::Str("a".into())];
        keys.sort();
        assert_eq!(keys, vec![SortKey::Empty, SortKey::Str("a".into()), SortKey::Str("b".into())]);
    }

    #[test]
    fn float_total_order_handles_equal_values() {
        let mut keys = vec![SortKey::Float(2.5), SortKey::Float(1.0)];
        keys.sort();
        assert_eq!(keys, vec![SortKey::Float(1.0), SortKey::Float(2.5)]);
    }
}
