//! Request field validation.
//!
//! Every check runs against the raw JSON object so all problems are reported
//! at once, keyed by field. Messages are worded the way the rider and driver
//! apps already display them ("The lat field is required.").

use ridecast_core::events::Numeric;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Validation failures per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single error for a single field.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// `passengerId` -> `passenger id`, `ride_id` -> `ride id`.
#[must_use]
pub fn display_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for (i, c) in field.chars().enumerate() {
        if c == '_' {
            out.push(' ');
        } else if c.is_ascii_uppercase() {
            if i > 0 {
                out.push(' ');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Null or a whitespace-only string.
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Collects typed field values and their errors from a JSON body.
pub struct Fields<'a> {
    body: &'a Map<String, Value>,
    errors: FieldErrors,
}

impl<'a> Fields<'a> {
    #[must_use]
    pub fn new(body: &'a Map<String, Value>) -> Self {
        Self {
            body,
            errors: FieldErrors::new(),
        }
    }

    /// The field, or `None` when missing, null, or a blank string.
    fn present(&self, name: &str) -> Option<&'a Value> {
        self.body.get(name).filter(|v| !is_absent(v))
    }

    fn require(&mut self, name: &str) -> Option<&'a Value> {
        match self.body.get(name) {
            Some(value) if !is_blank(value) => Some(value),
            _ => {
                self.errors
                    .add(name, format!("The {} field is required.", display_name(name)));
                None
            }
        }
    }

    fn typed<T>(&mut self, name: &str, value: &Value, convert: fn(&Value) -> Option<T>, what: &str) -> Option<T> {
        let converted = convert(value);
        if converted.is_none() {
            self.errors
                .add(name, format!("The {} field must be {what}.", display_name(name)));
        }
        converted
    }

    /// Any non-blank value.
    pub fn required_any(&mut self, name: &str) -> Option<Value> {
        self.require(name).cloned()
    }

    pub fn optional_any(&mut self, name: &str) -> Option<Value> {
        self.present(name).cloned()
    }

    pub fn required_string(&mut self, name: &str) -> Option<String> {
        let value = self.require(name)?;
        self.typed(name, value, |v| v.as_str().map(str::to_string), "a string")
    }

    pub fn optional_string(&mut self, name: &str) -> Option<String> {
        let value = self.present(name)?;
        self.typed(name, value, |v| v.as_str().map(str::to_string), "a string")
    }

    /// A number or numeric string, kept as sent.
    pub fn required_number(&mut self, name: &str) -> Option<Numeric> {
        let value = self.require(name)?;
        self.typed(name, value, Numeric::parse, "a number")
    }

    pub fn optional_number(&mut self, name: &str) -> Option<Numeric> {
        let value = self.present(name)?;
        self.typed(name, value, Numeric::parse, "a number")
    }

    pub fn required_integer(&mut self, name: &str) -> Option<i64> {
        let value = self.require(name)?;
        self.typed(name, value, as_integer, "an integer")
    }

    pub fn optional_integer(&mut self, name: &str) -> Option<i64> {
        let value = self.present(name)?;
        self.typed(name, value, as_integer, "an integer")
    }

    /// An array or object.
    pub fn optional_list(&mut self, name: &str) -> Option<Value> {
        let value = self.present(name)?;
        self.typed(
            name,
            value,
            |v| matches!(v, Value::Array(_) | Value::Object(_)).then(|| v.clone()),
            "an array",
        )
    }

    /// A required string that must be one of `allowed`.
    pub fn required_choice(&mut self, name: &str, allowed: &[&str]) -> Option<String> {
        let value = self.required_string(name)?;
        if allowed.contains(&value.as_str()) {
            Some(value)
        } else {
            self.errors
                .add(name, format!("The selected {} is invalid.", display_name(name)));
            None
        }
    }

    /// A required string of at most `max` characters.
    pub fn required_text(&mut self, name: &str, max: usize) -> Option<String> {
        let value = self.required_string(name)?;
        if value.chars().count() > max {
            self.errors.add(
                name,
                format!(
                    "The {} field must not be greater than {max} characters.",
                    display_name(name)
                ),
            );
            return None;
        }
        Some(value)
    }

    /// Give up and return whatever was collected.
    #[must_use]
    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }

    /// Finish validation.
    ///
    /// # Errors
    ///
    /// Returns the collected errors if any check failed.
    pub fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test body must be an object"),
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("lat"), "lat");
        assert_eq!(display_name("passengerId"), "passenger id");
        assert_eq!(display_name("vehicleType"), "vehicle type");
        assert_eq!(display_name("price_breakdown"), "price breakdown");
    }

    #[test]
    fn test_required_fields() {
        let body = body(json!({"lat": null, "name": "  "}));
        let mut fields = Fields::new(&body);
        assert!(fields.required_number("lat").is_none());
        assert!(fields.required_string("name").is_none());
        assert!(fields.required_any("driverId").is_none());

        let errors = fields.finish().unwrap_err();
        assert_eq!(errors.get("lat").unwrap(), ["The lat field is required."]);
        assert_eq!(errors.get("name").unwrap(), ["The name field is required."]);
        assert_eq!(errors.get("driverId").unwrap(), ["The driver id field is required."]);
    }

    #[test]
    fn test_numbers_keep_their_form() {
        let body = body(json!({"price": "25.50", "distance": 12.5, "duration": "30", "speed": "fast"}));
        let mut fields = Fields::new(&body);
        let number = |n: Option<Numeric>| n.map(|n| n.as_value().clone());
        assert_eq!(number(fields.required_number("price")), Some(json!("25.50")));
        assert_eq!(number(fields.required_number("distance")), Some(json!(12.5)));
        assert_eq!(number(fields.required_number("duration")), Some(json!("30")));
        assert_eq!(fields.optional_number("speed"), None);

        let errors = fields.finish().unwrap_err();
        assert_eq!(errors.get("speed").unwrap(), ["The speed field must be a number."]);
    }

    #[test]
    fn test_optional_fields_accept_null_and_absence() {
        let body = body(json!({"bearing": null, "driverPhone": "", "passengerPhone": "  ", "speed": " "}));
        let mut fields = Fields::new(&body);
        assert_eq!(fields.optional_number("bearing"), None);
        assert_eq!(fields.optional_string("driverPhone"), None);
        assert_eq!(fields.optional_string("passengerPhone"), None);
        assert_eq!(fields.optional_number("speed"), None);
        assert_eq!(fields.optional_any("driverId"), None);
        assert!(fields.finish().is_ok());
    }

    #[test]
    fn test_integer_rule() {
        let body = body(json!({"a": 42, "b": "7", "c": 4.5, "d": "x"}));
        let mut fields = Fields::new(&body);
        assert_eq!(fields.required_integer("a"), Some(42));
        assert_eq!(fields.required_integer("b"), Some(7));
        assert_eq!(fields.required_integer("c"), None);
        assert_eq!(fields.optional_integer("d"), None);

        let errors = fields.finish().unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), ["c", "d"]);
        assert_eq!(errors.get("c").unwrap(), ["The c field must be an integer."]);
    }

    #[test]
    fn test_choice_and_length() {
        let body = body(json!({"vehicleType": "truck", "username": "x".repeat(51)}));
        let mut fields = Fields::new(&body);
        assert!(fields.required_choice("vehicleType", &["sedan", "suv", "bike"]).is_none());
        assert!(fields.required_text("username", 50).is_none());

        let errors = fields.finish().unwrap_err();
        assert_eq!(errors.get("vehicleType").unwrap(), ["The selected vehicle type is invalid."]);
        assert_eq!(
            errors.get("username").unwrap(),
            ["The username field must not be greater than 50 characters."]
        );
    }

    #[test]
    fn test_list_rule() {
        let body = body(json!({"priceBreakdown": {"base": 5}, "tags": 3}));
        let mut fields = Fields::new(&body);
        assert_eq!(fields.optional_list("priceBreakdown"), Some(json!({"base": 5})));
        assert_eq!(fields.optional_list("tags"), None);
        assert!(fields.finish().is_err());
    }

    #[test]
    fn test_errors_serialize_as_object() {
        let errors = FieldErrors::single("lat", "The lat field is required.");
        assert_eq!(serde_json::to_value(&errors).unwrap(), json!({"lat": ["The lat field is required."]}));
    }
}
