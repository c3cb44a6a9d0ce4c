//! Pagination/cursor resolver: translates `cursor` + signed `take` + `skip`
//! into a concrete ordered window over an ascending-sorted candidate set.

use crate::error::{Error, Result};
use crate::schema::EntityDescriptor;
use crate::types::{NullsOrder, OrderBy, Record, SortOrder};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Resolved window over an ordered candidate set.
///
/// `cursor` names the primary-key value of the anchor record. `skip` offsets
/// from the anchor: the anchor row itself is the first candidate at
/// `skip = 0` and excluded once `skip >= 1`. `take` is signed: positive
/// takes forward from the window start, negative takes backward (the window
/// is selected from the tail), with ascending result ordering preserved
/// either way.
///
/// Pure offset pagination (`skip` without `cursor`) is supported but weaker
/// under concurrent writes; that is a documented caveat of the contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowPlan {
    pub order: Vec<OrderBy>,
    pub cursor: Option<Value>,
    pub skip: u64,
    pub take: Option<i64>,
}

impl WindowPlan {
    pub fn unbounded() -> Self {
        WindowPlan {
            order: Vec::new(),
            cursor: None,
            skip: 0,
            take: None,
        }
    }

    pub fn is_trivial(&self) -> bool {
        self.order.is_empty() && self.cursor.is_none() && self.skip == 0 && self.take.is_none()
    }
}

/// Validate order fields and normalize the window. A cursor without an
/// explicit orderBy deterministically falls back to primary-key order.
pub fn resolve(
    desc: &EntityDescriptor,
    order: Vec<OrderBy>,
    cursor: Option<Value>,
    take: Option<i64>,
    skip: Option<i64>,
) -> Result<WindowPlan> {
    for ob in &order {
        if desc.field(&ob.field).is_none() {
            return Err(Error::UnknownField {
                entity: desc.name.clone(),
                field: ob.field.clone(),
            });
        }
    }
    let skip = match skip {
        Some(n) if n < 0 => {
            return Err(Error::QueryValidation {
                entity: desc.name.clone(),
                message: "skip must be >= 0".into(),
            })
        }
        Some(n) => n as u64,
        None => 0,
    };
    let mut order = order;
    if order.is_empty() && cursor.is_some() {
        order.push(OrderBy::asc(desc.primary_key.clone()));
    }
    Ok(WindowPlan {
        order,
        cursor,
        skip,
        take,
    })
}

/// Sort rows by the order keys with a primary-key tiebreak, honoring the
/// optional nulls hint on the primary key.
pub fn sort_records(rows: &mut [Record], order: &[OrderBy], primary_key: &str) {
    rows.sort_by(|a, b| {
        for (i, ob) in order.iter().enumerate() {
            let va = a.get(&ob.field);
            let vb = b.get(&ob.field);
            // Nulls hint applies to the primary order key only.
            if i == 0 {
                if let Some(nulls) = ob.nulls {
                    match (va.is_null(), vb.is_null()) {
                        (true, false) => {
                            return match nulls {
                                NullsOrder::First => Ordering::Less,
                                NullsOrder::Last => Ordering::Greater,
                            }
                        }
                        (false, true) => {
                            return match nulls {
                                NullsOrder::First => Ordering::Greater,
                                NullsOrder::Last => Ordering::Less,
                            }
                        }
                        _ => {}
                    }
                }
            }
            let cmp = va.compare(vb);
            let cmp = match ob.order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        a.get(primary_key).compare(b.get(primary_key))
    });
}

/// Apply the window to an already-sorted candidate set. An anchor that no
/// longer exists yields an empty window rather than an error: cursors refer
/// to live records by identity.
pub fn apply_window(rows: Vec<Record>, plan: &WindowPlan, primary_key: &str) -> Vec<Record> {
    let skip = plan.skip as usize;
    let take = plan.take;

    let anchor = match &plan.cursor {
        Some(cursor) => {
            match rows
                .iter()
                .position(|r| r.get(primary_key).compare(cursor) == Ordering::Equal)
            {
                Some(idx) => Some(idx),
                None => return Vec::new(),
            }
        }
        None => None,
    };

    match take {
        Some(n) if n < 0 => {
            let n = n.unsigned_abs() as usize;
            // Backward window: end at the anchor (inclusive at skip = 0),
            // stepping further back as skip grows; without a cursor the
            // window is the tail of the candidate set.
            let end = match anchor {
                Some(idx) => (idx + 1).saturating_sub(skip),
                None => rows.len().saturating_sub(skip),
            };
            let start = end.saturating_sub(n);
            rows[start..end].to_vec()
        }
        _ => {
            let start = match anchor {
                Some(idx) => idx + skip,
                None => skip,
            };
            if start >= rows.len() {
                return Vec::new();
            }
            let end = match take {
                Some(n) => (start + n as usize).min(rows.len()),
                None => rows.len(),
            };
            rows[start..end].to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_schema::library;

    fn rows(ids: &[i64]) -> Vec<Record> {
        ids.iter()
            .map(|&id| Record::new().with("id", id))
            .collect()
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter().map(|r| r.get("id").as_i64().unwrap()).collect()
    }

    fn plan(cursor: Option<i64>, take: Option<i64>, skip: u64) -> WindowPlan {
        WindowPlan {
            order: vec![OrderBy::asc("id")],
            cursor: cursor.map(Value::Int),
            skip,
            take,
        }
    }

    #[test]
    fn cursor_included_at_skip_zero_excluded_at_skip_one() {
        let data = rows(&[1, 2, 3, 4, 5]);
        assert_eq!(ids(&apply_window(data.clone(), &plan(Some(3), Some(2), 0), "id")), vec![3, 4]);
        assert_eq!(ids(&apply_window(data, &plan(Some(3), Some(2), 1), "id")), vec![4, 5]);
    }

    #[test]
    fn negative_take_selects_tail_in_ascending_order() {
        let data = rows(&[1, 2, 3, 4, 5]);
        // Last two up to and including the anchor.
        assert_eq!(ids(&apply_window(data.clone(), &plan(Some(4), Some(-2), 0), "id")), vec![3, 4]);
        // skip steps the backward window off the anchor first.
        assert_eq!(ids(&apply_window(data.clone(), &plan(Some(4), Some(-2), 1), "id")), vec![2, 3]);
        // No cursor: last N of the whole candidate set.
        assert_eq!(ids(&apply_window(data, &plan(None, Some(-2), 0), "id")), vec![4, 5]);
    }

    #[test]
    fn missing_anchor_yields_empty_window() {
        let data = rows(&[1, 2, 3]);
        assert!(apply_window(data, &plan(Some(99), Some(2), 0), "id").is_empty());
    }

    #[test]
    fn offset_pagination_without_cursor() {
        let data = rows(&[1, 2, 3, 4, 5]);
        assert_eq!(ids(&apply_window(data.clone(), &plan(None, Some(2), 2), "id")), vec![3, 4]);
        assert_eq!(ids(&apply_window(data, &plan(None, None, 4), "id")), vec![5]);
    }

    #[test]
    fn resolve_rejects_negative_skip_and_defaults_cursor_order() {
        let reg = library();
        let desc = reg.describe("Author").unwrap();
        assert!(matches!(
            resolve(desc, vec![], None, None, Some(-1)),
            Err(Error::QueryValidation { .. })
        ));
        let plan = resolve(desc, vec![], Some(Value::Int(7)), Some(10), None).unwrap();
        assert_eq!(plan.order, vec![OrderBy::asc("id")]);
    }

    #[test]
    fn sort_honors_desc_and_nulls_hint() {
        let mut data = vec![
            Record::new().with("id", 1).with("born", Value::Null),
            Record::new().with("id", 2).with("born", 1950),
            Record::new().with("id", 3).with("born", 1920),
        ];
        let mut order = vec![OrderBy::desc("born")];
        order[0].nulls = Some(NullsOrder::Last);
        sort_records(&mut data, &order, "id");
        assert_eq!(ids(&data), vec![2, 3, 1]);
    }
}
