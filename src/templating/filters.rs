//! Custom Tera filters available to formulas and marking templates.
//!
//! | Filter | Arguments | Result |
//! |---|---|---|
//! | `zfill` | `width` | number left-padded with zeros, sign kept in front |
//! | `round_up` | `precision` (default 0) | ceiling at the given decimal places |
//! | `round_down` | `precision` (default 0) | floor at the given decimal places |
//! | `to_int` | | integer, fractional part dropped |
//! | `to_float` | | floating-point number |
//! | `dmy` | | date as `dd.mm.YYYY` |
//! | `dmyt` | | date and time as `dd.mm.YYYY HH:MM:SS` |
//!
//! Tera filters only take named arguments, so zero padding is written
//! `{{ inner_id|zfill(width=8) }}`.
//!
//! Numeric filters reject non-numeric input; the date filters pass values they
//! cannot parse through unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tera::{Tera, Value};

use crate::models::attribute::plain_text;

/// Register every custom filter on a Tera instance.
pub fn register_filters(tera: &mut Tera) {
    tera.register_filter("zfill", zfill);
    tera.register_filter("round_up", round_up);
    tera.register_filter("round_down", round_down);
    tera.register_filter("to_int", to_int);
    tera.register_filter("to_float", to_float);
    tera.register_filter("dmy", dmy);
    tera.register_filter("dmyt", dmyt);
}

fn numeric_input(filter: &str, value: &Value) -> tera::Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite()).ok_or_else(|| {
        tera::Error::msg(format!("Filter `{filter}` received a non-numeric value: {value}"))
    })
}

fn precision_arg(filter: &str, args: &HashMap<String, Value>) -> tera::Result<i32> {
    match args.get("precision") {
        None => Ok(0),
        Some(v) => v
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .filter(|p| (0..=12).contains(p))
            .ok_or_else(|| {
                tera::Error::msg(format!("Filter `{filter}` expects `precision` between 0 and 12"))
            }),
    }
}

fn float_value(filter: &str, number: f64) -> tera::Result<Value> {
    serde_json::Number::from_f64(number)
        .map(Value::Number)
        .ok_or_else(|| tera::Error::msg(format!("Filter `{filter}` produced a non-finite number")))
}

/// Pad with leading zeros up to `width`, keeping a leading sign in front.
///
/// Only numbers and numeric strings are accepted.
pub fn zfill(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let width = args
        .get("width")
        .and_then(Value::as_u64)
        .ok_or_else(|| tera::Error::msg("Filter `zfill` expected an arg called `width`"))?;
    let width = usize::try_from(width).unwrap_or(usize::MAX);

    numeric_input("zfill", value)?;
    let text = plain_text(value).trim().to_string();
    let len = text.chars().count();
    if len >= width {
        return Ok(Value::String(text));
    }

    let zeros = "0".repeat(width - len);
    let padded = match text.chars().next() {
        Some(sign @ ('+' | '-')) => format!("{sign}{zeros}{}", &text[1..]),
        _ => format!("{zeros}{text}"),
    };
    Ok(Value::String(padded))
}

/// Round towards positive infinity at `precision` decimal places.
pub fn round_up(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let number = numeric_input("round_up", value)?;
    let factor = 10f64.powi(precision_arg("round_up", args)?);
    float_value("round_up", (number * factor).ceil() / factor)
}

/// Round towards negative infinity at `precision` decimal places.
pub fn round_down(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let number = numeric_input("round_down", value)?;
    let factor = 10f64.powi(precision_arg("round_down", args)?);
    float_value("round_down", (number * factor).floor() / factor)
}

pub fn to_int(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let number = numeric_input("to_int", value)?;
    Ok(Value::from(number.trunc() as i64))
}

pub fn to_float(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let number = numeric_input("to_float", value)?;
    float_value("to_float", number)
}

enum Temporal {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

fn parse_temporal(value: &Value) -> Option<Temporal> {
    let text = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Temporal::DateTime(dt.naive_local()));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Temporal::DateTime(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Temporal::Date)
}

/// Format a date or datetime as `dd.mm.YYYY`.
pub fn dmy(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(match parse_temporal(value) {
        Some(Temporal::Date(d)) => Value::String(d.format("%d.%m.%Y").to_string()),
        Some(Temporal::DateTime(dt)) => Value::String(dt.format("%d.%m.%Y").to_string()),
        None => value.clone(),
    })
}

/// Format a date or datetime as `dd.mm.YYYY HH:MM:SS`.
pub fn dmyt(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(match parse_temporal(value) {
        Some(Temporal::Date(d)) => Value::String(d.format("%d.%m.%Y 00:00:00").to_string()),
        Some(Temporal::DateTime(dt)) => Value::String(dt.format("%d.%m.%Y %H:%M:%S").to_string()),
        None => value.clone(),
    })
}
