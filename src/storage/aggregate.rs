// Aggregation
// Count, First, Min/Max and the numeric aggregates over a subset of rows

use super::bitmap::NullBitmap;
use super::native::{NativeItem, NativeKind, Number};
use super::AggregateKind;
use crate::error::{Result, StorageError};
use crate::registry::StorageType;
use crate::storage::table::ColumnMeta;
use crate::value::{text, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Number of rows in `rows` holding a value. Every storage supports this.
pub fn count(nulls: &NullBitmap, rows: &[usize]) -> Value {
    Value::Int64(nulls.count_not_null(rows) as i64)
}

/// Aggregate over a native backing array.
///
/// Returns `Ok(None)` when the storage's type does not support `kind`, and the
/// storage's null value when there is nothing to aggregate.
pub(crate) fn native<K: NativeKind>(
    values: &[K::Item],
    nulls: &NullBitmap,
    rows: &[usize],
    kind: AggregateKind,
    column: &ColumnMeta,
) -> Result<Option<Value>> {
    let present = || rows.iter().filter(|&&row| !nulls.get(row)).map(|&row| &values[row]);

    let result = match kind {
        AggregateKind::Count => count(nulls, rows),
        AggregateKind::First => match rows.first() {
            Some(&row) if !nulls.get(row) => K::wrap(values[row].clone()),
            _ => K::null_value(),
        },
        AggregateKind::Min | AggregateKind::Max => {
            if !<K::Item as NativeItem>::ORDERED {
                return Ok(None);
            }
            let wanted = if kind == AggregateKind::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let best = present().fold(None::<&K::Item>, |best, item| match best {
                Some(current) if item.natural_cmp(current, column) != Some(wanted) => Some(current),
                _ => Some(item),
            });
            best.map_or_else(K::null_value, |item| K::wrap(item.clone()))
        }
        AggregateKind::Sum | AggregateKind::Mean | AggregateKind::Var | AggregateKind::StDev => {
            if !<K::Item as NativeItem>::NUMERIC {
                return Ok(None);
            }
            let numbers: Vec<Number> = present().filter_map(NativeItem::to_number).collect();
            match kind {
                AggregateKind::Sum if numbers.is_empty() => K::null_value(),
                AggregateKind::Sum => widen(sum(&numbers, K::CODE)?),
                AggregateKind::Mean if numbers.is_empty() => K::null_value(),
                AggregateKind::Mean => {
                    let mean = mean(&numbers, K::CODE)?;
                    let item = <K::Item as NativeItem>::from_number(mean)
                        .ok_or_else(|| overflow("mean", K::CODE))?;
                    K::wrap(item)
                }
                _ => {
                    if K::CODE == StorageType::TimeSpan {
                        return Ok(None);
                    }
                    match variance(&numbers) {
                        None => K::null_value(),
                        Some(var) if kind == AggregateKind::Var => Value::Double(var),
                        Some(var) => Value::Double(var.sqrt()),
                    }
                }
            }
        }
    };
    Ok(Some(result))
}

fn overflow(what: &str, code: StorageType) -> StorageError {
    StorageError::Overflow(format!("{} of {} values", what, code))
}

/// Widened total: signed integers to Int64, unsigned to UInt64, floats to Double.
fn widen(number: Number) -> Value {
    match number {
        Number::Signed(v) => Value::Int64(v),
        Number::Unsigned(v) => Value::UInt64(v),
        Number::Float(v) => Value::Double(v),
        Number::Decimal(v) => Value::Decimal(v),
        Number::Span(v) => Value::TimeSpan(v),
    }
}

/// `numbers` must be non-empty and all of one family.
fn sum(numbers: &[Number], code: StorageType) -> Result<Number> {
    let mut iter = numbers.iter().copied();
    let first = iter.next().ok_or_else(|| overflow("sum", code))?;
    iter.try_fold(first, |acc, next| {
        let total = match (acc, next) {
            (Number::Signed(a), Number::Signed(b)) => a.checked_add(b).map(Number::Signed),
            (Number::Unsigned(a), Number::Unsigned(b)) => a.checked_add(b).map(Number::Unsigned),
            (Number::Float(a), Number::Float(b)) => Some(Number::Float(a + b)),
            (Number::Decimal(a), Number::Decimal(b)) => a.checked_add(b).map(Number::Decimal),
            (Number::Span(a), Number::Span(b)) => a.checked_add(b).map(Number::Span),
            _ => None,
        };
        total.ok_or_else(|| overflow("sum", code))
    })
}

/// Mean in the family of the inputs; integer means truncate toward zero.
fn mean(numbers: &[Number], code: StorageType) -> Result<Number> {
    let n = numbers.len();
    let mean = match numbers.first() {
        Some(Number::Signed(_)) => {
            let total: i128 = numbers
                .iter()
                .filter_map(|x| match x {
                    Number::Signed(v) => Some(i128::from(*v)),
                    _ => None,
                })
                .sum();
            i64::try_from(total / n as i128).ok().map(Number::Signed)
        }
        Some(Number::Unsigned(_)) => {
            let total: u128 = numbers
                .iter()
                .filter_map(|x| match x {
                    Number::Unsigned(v) => Some(u128::from(*v)),
                    _ => None,
                })
                .sum();
            u64::try_from(total / n as u128).ok().map(Number::Unsigned)
        }
        Some(Number::Float(_)) => {
            let total: f64 = numbers
                .iter()
                .filter_map(|x| match x {
                    Number::Float(v) => Some(*v),
                    _ => None,
                })
                .sum();
            Some(Number::Float(total / n as f64))
        }
        Some(Number::Decimal(_)) => match sum(numbers, code)? {
            Number::Decimal(total) => total.checked_div(Decimal::from(n)).map(Number::Decimal),
            _ => None,
        },
        Some(Number::Span(_)) => {
            let total: i128 = numbers
                .iter()
                .filter_map(|x| match x {
                    Number::Span(v) => Some(v.whole_nanoseconds()),
                    _ => None,
                })
                .sum();
            text::duration_from_nanos(total / n as i128).map(Number::Span)
        }
        None => None,
    };
    mean.ok_or_else(|| overflow("mean", code))
}

/// Sample variance, or `None` for fewer than two values.
fn variance(numbers: &[Number]) -> Option<f64> {
    if numbers.len() < 2 {
        return None;
    }
    let xs: Vec<f64> = numbers
        .iter()
        .filter_map(|x| match *x {
            Number::Signed(v) => Some(v as f64),
            Number::Unsigned(v) => Some(v as f64),
            Number::Float(v) => Some(v),
            Number::Decimal(v) => v.to_f64(),
            Number::Span(_) => None,
        })
        .collect();
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let squares: f64 = xs.iter().map(|x| (x - mean).powi(2)).sum();
    Some(squares / (n - 1.0))
}
