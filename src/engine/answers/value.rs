// SPDX-License-Identifier: MIT

//! Typed answer values

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::engine::question::{Scalar, ScalarType};

/// Calendar-date wire format for answers and predicate literals
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A typed value stored under one scalar path
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalarValue {
    String(String),
    Long(i64),
    Date(NaiveDate),
    /// Multi-valued answers are sets: order is irrelevant and duplicates collapse
    ListOfStrings(BTreeSet<String>),
    ListOfLongs(BTreeSet<i64>),
}

impl ScalarValue {
    pub fn string(s: impl Into<String>) -> Self {
        ScalarValue::String(s.into())
    }

    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScalarValue::ListOfStrings(items.into_iter().map(Into::into).collect())
    }

    pub fn longs<I: IntoIterator<Item = i64>>(items: I) -> Self {
        ScalarValue::ListOfLongs(items.into_iter().collect())
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::String(_) => ScalarType::String,
            ScalarValue::Long(_) => ScalarType::Long,
            ScalarValue::Date(_) => ScalarType::Date,
            ScalarValue::ListOfStrings(_) => ScalarType::ListOfStrings,
            ScalarValue::ListOfLongs(_) => ScalarType::ListOfLongs,
        }
    }

    /// Parse applicant input for a scalar of the given type.
    ///
    /// Dates must be real calendar dates (`2021-04-31` is rejected). Lists
    /// are comma separated; blank items are ignored.
    pub fn parse(scalar_type: ScalarType, raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        match scalar_type {
            ScalarType::String => Ok(ScalarValue::String(raw.to_string())),
            ScalarType::Long => raw
                .parse::<i64>()
                .map(ScalarValue::Long)
                .map_err(|_| format!("'{}' is not a whole number", raw)),
            ScalarType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(ScalarValue::Date)
                .map_err(|_| format!("'{}' is not a valid date (YYYY-MM-DD)", raw)),
            ScalarType::ListOfStrings => Ok(ScalarValue::ListOfStrings(
                split_list(raw).map(str::to_string).collect(),
            )),
            ScalarType::ListOfLongs => {
                let mut items = BTreeSet::new();
                for item in split_list(raw) {
                    let n = item
                        .parse::<i64>()
                        .map_err(|_| format!("'{}' is not a whole number", item))?;
                    items.insert(n);
                }
                Ok(ScalarValue::ListOfLongs(items))
            }
        }
    }

    /// Parse applicant input for a specific scalar. Currency is entered in
    /// dollars and stored in cents; every other scalar parses by its type.
    pub fn parse_answer(scalar: Scalar, scalar_type: ScalarType, raw: &str) -> Result<Self, String> {
        match scalar {
            Scalar::CurrencyCents => parse_dollars(raw).map(ScalarValue::Long),
            _ => Self::parse(scalar_type, raw),
        }
    }
}

/// `$2,500.5` is 250050 cents. At most two decimal places; no negatives.
fn parse_dollars(raw: &str) -> Result<i64, String> {
    let invalid = || format!("'{}' is not a dollar amount", raw.trim());

    let amount = raw.trim();
    let amount = amount.strip_prefix('$').unwrap_or(amount).replace(',', "");
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount.as_str(), ""),
    };

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty())
        || !is_digits(whole)
        || !is_digits(fraction)
        || fraction.len() > 2
    {
        return Err(invalid());
    }

    let dollars: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };
    dollars
        .checked_mul(100)
        .and_then(|c| c.checked_add(cents))
        .ok_or_else(invalid)
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => write!(f, "{}", s),
            ScalarValue::Long(n) => write!(f, "{}", n),
            ScalarValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            ScalarValue::ListOfStrings(items) => {
                let items: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "[{}]", items.join(", "))
            }
            ScalarValue::ListOfLongs(items) => {
                let items: Vec<String> = items.iter().map(i64::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_long() {
        assert_eq!(
            ScalarValue::parse(ScalarType::Long, " 42 "),
            Ok(ScalarValue::Long(42))
        );
        assert!(ScalarValue::parse(ScalarType::Long, "4.2").is_err());
    }

    #[test]
    fn test_parse_currency_in_dollars() {
        let cents = |raw: &str| ScalarValue::parse_answer(Scalar::CurrencyCents, ScalarType::Long, raw);
        assert_eq!(cents("2500.00"), Ok(ScalarValue::Long(250000)));
        assert_eq!(cents("$2,500"), Ok(ScalarValue::Long(250000)));
        assert_eq!(cents(" 12.5 "), Ok(ScalarValue::Long(1250)));
        assert_eq!(cents(".99"), Ok(ScalarValue::Long(99)));
        assert_eq!(cents("0"), Ok(ScalarValue::Long(0)));
        assert!(cents("12.345").is_err());
        assert!(cents("-5").is_err());
        assert!(cents("five").is_err());
        assert!(cents("$").is_err());
        assert!(cents("1.2.3").is_err());
        assert!(cents("99999999999999999999").is_err());
    }

    #[test]
    fn test_parse_answer_other_scalars_use_their_type() {
        assert_eq!(
            ScalarValue::parse_answer(Scalar::Number, ScalarType::Long, "2500"),
            Ok(ScalarValue::Long(2500))
        );
        assert!(ScalarValue::parse_answer(Scalar::Number, ScalarType::Long, "2500.00").is_err());
    }

    #[test]
    fn test_parse_date_rejects_impossible_day() {
        let ok = ScalarValue::parse(ScalarType::Date, "2021-04-30").unwrap();
        assert_eq!(
            ok,
            ScalarValue::Date(NaiveDate::from_ymd_opt(2021, 4, 30).unwrap())
        );
        assert!(ScalarValue::parse(ScalarType::Date, "2021-04-31").is_err());
        assert!(ScalarValue::parse(ScalarType::Date, "04/30/2021").is_err());
    }

    #[test]
    fn test_parse_list_dedups() {
        let v = ScalarValue::parse(ScalarType::ListOfStrings, "b, a, b,").unwrap();
        assert_eq!(v, ScalarValue::strings(["a", "b"]));
        assert_eq!(v.to_string(), "[a, b]");

        let v = ScalarValue::parse(ScalarType::ListOfLongs, "3,1,3").unwrap();
        assert_eq!(v, ScalarValue::longs([1, 3]));
        assert!(ScalarValue::parse(ScalarType::ListOfLongs, "1,x").is_err());
    }

    #[test]
    fn test_serde_shape() {
        let v = ScalarValue::Long(5);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            json!({"type": "LONG", "value": 5})
        );

        let d: ScalarValue =
            serde_json::from_value(json!({"type": "DATE", "value": "2020-02-29"})).unwrap();
        assert_eq!(
            d,
            ScalarValue::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap())
        );
    }
}
