//! Recover typed values from dialog results that were flattened to strings.

use serde_json::{Number, Value};

/// Coerce a dialog result value.
///
/// Non-string values pass through. Strings lose one layer of matching
/// surrounding quotes, then `true`/`false`/`null` become literals, then
/// numbers that print back to exactly the same text become numbers.
pub fn coerce_dialog_value(value: Value) -> Value {
    let Value::String(raw) = value else {
        return value;
    };

    let text = strip_matching_quotes(&raw);
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => parse_exact_number(text).unwrap_or_else(|| Value::String(text.to_string())),
    }
}

fn strip_matching_quotes(text: &str) -> &str {
    if text.len() < 2 {
        return text;
    }
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

/// Parse `text` as a number only if formatting the number reproduces `text`.
///
/// This keeps `"007"`, `"1.50"` and `"+3"` as strings. Page numbers are
/// doubles, so integers a double cannot hold exactly stay strings, as do
/// fractions small enough that a page would print them with an exponent.
fn parse_exact_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        if int.to_string() == text && fits_in_double(int) {
            return Some(Value::Number(int.into()));
        }
        return None;
    }

    if !text.contains('.') {
        return None;
    }
    let float = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if float != 0.0 && float.abs() < MIN_PLAIN_FRACTION {
        return None;
    }
    if float.to_string() != text {
        return None;
    }
    Number::from_f64(float).map(Value::Number)
}

/// Below this magnitude a page prints numbers as `1e-7`.
const MIN_PLAIN_FRACTION: f64 = 1e-6;

fn fits_in_double(int: i64) -> bool {
    int as f64 as i128 == int as i128
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coerce(text: &str) -> Value {
        coerce_dialog_value(json!(text))
    }

    #[test]
    fn strips_one_layer_of_matching_quotes() {
        assert_eq!(coerce("'Alice'"), json!("Alice"));
        assert_eq!(coerce("\"Bob\""), json!("Bob"));
        assert_eq!(coerce("''x''"), json!("'x'"));
    }

    #[test]
    fn mismatched_or_short_quotes_are_kept() {
        assert_eq!(coerce("'Alice\""), json!("'Alice\""));
        assert_eq!(coerce("'"), json!("'"));
        assert_eq!(coerce(""), json!(""));
    }

    #[test]
    fn literals_become_typed() {
        assert_eq!(coerce("true"), json!(true));
        assert_eq!(coerce("false"), json!(false));
        assert_eq!(coerce("null"), Value::Null);
        assert_eq!(coerce("'true'"), json!(true));
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(coerce("42"), json!(42));
        assert_eq!(coerce("-7"), json!(-7));
        assert_eq!(coerce("0"), json!(0));
        assert!(coerce("42").is_i64());

        let pi = coerce("3.14");
        assert!(pi.is_f64());
        assert_eq!(pi.as_f64(), Some(3.14));
        assert!(coerce("0.5").is_f64());
    }

    #[test]
    fn numbers_that_do_not_round_trip_stay_strings() {
        assert_eq!(coerce("007"), json!("007"));
        assert_eq!(coerce("1.50"), json!("1.50"));
        assert_eq!(coerce("+3"), json!("+3"));
        assert_eq!(coerce("1e5"), json!("1e5"));
        assert_eq!(coerce("-0"), json!("-0"));
        assert_eq!(coerce("NaN"), json!("NaN"));
        assert_eq!(coerce("12abc"), json!("12abc"));
    }

    #[test]
    fn numbers_a_page_would_print_differently_stay_strings() {
        assert_eq!(coerce("0.0000001"), json!("0.0000001"));
        assert_eq!(coerce("0.000001"), json!(0.000001));
        assert_eq!(coerce("9007199254740993"), json!("9007199254740993"));
        assert_eq!(coerce("9007199254740992"), json!(9007199254740992_i64));
        assert_eq!(coerce("-9007199254740993"), json!("-9007199254740993"));
        assert_eq!(coerce("9223372036854775807"), json!("9223372036854775807"));
    }

    #[test]
    fn non_strings_pass_through() {
        assert_eq!(coerce_dialog_value(json!(1)), json!(1));
        assert_eq!(coerce_dialog_value(json!(true)), json!(true));
        assert_eq!(coerce_dialog_value(Value::Null), Value::Null);
    }
}
