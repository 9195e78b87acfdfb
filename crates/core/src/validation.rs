//! Boundary validation of JSON write bodies into typed drafts and changes.
//!
//! Every field is checked before any error is returned so callers receive the
//! complete set of per-field messages in one response.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{
    BreedChanges, DogChanges, Gender, NewBreed, NewDog, Rating, Size, AGE_MAX, DEFAULT_COLOR,
    TEXT_MAX_LEN,
};

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const MSG_REQUIRED: &str = "This field is required.";
const MSG_NULL: &str = "This field may not be null.";
const MSG_BLANK: &str = "This field may not be blank.";
const MSG_NOT_STRING: &str = "Not a valid string.";
const MSG_NOT_INTEGER: &str = "A valid integer is required.";

/// Ordered map of field name to validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an error set holding a single message for `field`.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the messages recorded for `field`.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Iterates over the names of fields that failed.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

impl std::error::Error for FieldErrors {}

/// Message reported when a foreign key names a row that does not exist.
pub fn unknown_reference_message(id: i64) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

/// How a write body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Required fields must be present; omitted fields take their defaults.
    Create,
    /// Required fields must be present; omitted fields stay unchanged.
    Replace,
    /// Nothing is required; omitted fields stay unchanged.
    Partial,
}

impl WriteMode {
    fn requires_mandatory(self) -> bool {
        !matches!(self, Self::Partial)
    }
}

/// Validates a breed creation body, applying defaults to omitted fields.
pub fn parse_new_breed(body: &Value) -> Result<NewBreed, FieldErrors> {
    let changes = parse_breed_changes(body, WriteMode::Create)?;
    let Some(name) = changes.name else {
        return Err(FieldErrors::single("name", MSG_REQUIRED));
    };
    Ok(NewBreed {
        name,
        size: changes.size.unwrap_or_default(),
        friendliness: changes.friendliness.unwrap_or_default(),
        trainability: changes.trainability.unwrap_or_default(),
        shedding_amount: changes.shedding_amount.unwrap_or_default(),
        exercise_needs: changes.exercise_needs.unwrap_or_default(),
    })
}

/// Validates a breed update body.
pub fn parse_breed_changes(body: &Value, mode: WriteMode) -> Result<BreedChanges, FieldErrors> {
    let mut reader = FieldReader::new(body, mode)?;
    let changes = BreedChanges {
        name: reader.required_text("name"),
        size: reader.choice("size"),
        friendliness: reader.rating("friendliness"),
        trainability: reader.rating("trainability"),
        shedding_amount: reader.rating("shedding_amount"),
        exercise_needs: reader.rating("exercise_needs"),
    };
    reader.finish(changes)
}

/// Validates a dog creation body, applying defaults to omitted fields.
pub fn parse_new_dog(body: &Value) -> Result<NewDog, FieldErrors> {
    let changes = parse_dog_changes(body, WriteMode::Create)?;
    let (Some(name), Some(age)) = (changes.name, changes.age) else {
        let mut errors = FieldErrors::new();
        errors.add(NON_FIELD_ERRORS, "Both name and age are required.");
        return Err(errors);
    };
    Ok(NewDog {
        name,
        age,
        gender: changes.gender.unwrap_or_default(),
        breed: changes.breed.flatten(),
        color: changes.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        favorite_food: changes.favorite_food.flatten(),
        favorite_toy: changes.favorite_toy.flatten(),
    })
}

/// Validates a dog update body.
pub fn parse_dog_changes(body: &Value, mode: WriteMode) -> Result<DogChanges, FieldErrors> {
    let mut reader = FieldReader::new(body, mode)?;
    let changes = DogChanges {
        name: reader.required_text("name"),
        age: reader.age("age"),
        gender: reader.choice("gender"),
        breed: reader.reference("breed"),
        color: reader.optional_text("color"),
        favorite_food: reader.nullable_text("favorite_food"),
        favorite_toy: reader.nullable_text("favorite_toy"),
    };
    reader.finish(changes)
}

/// Walks the fields of one JSON object and accumulates their errors.
struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    mode: WriteMode,
    errors: FieldErrors,
}

impl<'a> FieldReader<'a> {
    fn new(body: &'a Value, mode: WriteMode) -> Result<Self, FieldErrors> {
        let Value::Object(fields) = body else {
            return Err(FieldErrors::single(
                NON_FIELD_ERRORS,
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    json_type_name(body)
                ),
            ));
        };
        Ok(Self {
            fields,
            mode,
            errors: FieldErrors::new(),
        })
    }

    fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.errors)
        }
    }

    /// Mandatory non-null text. Missing is an error unless the mode is partial.
    fn required_text(&mut self, field: &str) -> Option<String> {
        match self.fields.get(field) {
            None => {
                if self.mode.requires_mandatory() {
                    self.errors.add(field, MSG_REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                self.errors.add(field, MSG_NULL);
                None
            }
            Some(value) => self.text(field, value),
        }
    }

    /// Optional non-null text.
    fn optional_text(&mut self, field: &str) -> Option<String> {
        match self.fields.get(field) {
            None => None,
            Some(Value::Null) => {
                self.errors.add(field, MSG_NULL);
                None
            }
            Some(value) => self.text(field, value),
        }
    }

    /// Optional text that may be cleared with `null`.
    fn nullable_text(&mut self, field: &str) -> Option<Option<String>> {
        match self.fields.get(field) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(value) => self.text(field, value).map(Some),
        }
    }

    fn text(&mut self, field: &str, value: &Value) -> Option<String> {
        let Some(raw) = value.as_str() else {
            self.errors.add(field, MSG_NOT_STRING);
            return None;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            self.errors.add(field, MSG_BLANK);
            return None;
        }
        if raw.chars().count() > TEXT_MAX_LEN {
            self.errors.add(
                field,
                format!("Ensure this field has no more than {TEXT_MAX_LEN} characters."),
            );
            return None;
        }
        Some(raw.to_string())
    }

    /// Mandatory age within the small integer range.
    fn age(&mut self, field: &str) -> Option<u16> {
        let value = match self.fields.get(field) {
            None => {
                if self.mode.requires_mandatory() {
                    self.errors.add(field, MSG_REQUIRED);
                }
                return None;
            }
            Some(Value::Null) => {
                self.errors.add(field, MSG_NULL);
                return None;
            }
            Some(value) => value,
        };
        let Some(number) = integer(value) else {
            self.errors.add(field, MSG_NOT_INTEGER);
            return None;
        };
        if number < 0 {
            self.errors
                .add(field, "Ensure this value is greater than or equal to 0.");
            return None;
        }
        if number > i64::from(AGE_MAX) {
            self.errors.add(
                field,
                format!("Ensure this value is less than or equal to {AGE_MAX}."),
            );
            return None;
        }
        u16::try_from(number).ok()
    }

    /// Optional member of a closed string choice set.
    fn choice<T>(&mut self, field: &str) -> Option<T>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.fields.get(field) {
            None => None,
            Some(Value::Null) => {
                self.errors.add(field, MSG_NULL);
                None
            }
            Some(Value::String(raw)) => match raw.parse::<T>() {
                Ok(choice) => Some(choice),
                Err(err) => {
                    self.errors.add(field, err.to_string());
                    None
                }
            },
            Some(other) => {
                self.errors
                    .add(field, format!("\"{other}\" is not a valid choice."));
                None
            }
        }
    }

    /// Optional 1 to 5 rating.
    fn rating(&mut self, field: &str) -> Option<Rating> {
        match self.fields.get(field) {
            None => None,
            Some(Value::Null) => {
                self.errors.add(field, MSG_NULL);
                None
            }
            Some(value) => {
                let parsed = integer(value).map(Rating::try_from);
                match parsed {
                    Some(Ok(rating)) => Some(rating),
                    _ => {
                        self.errors
                            .add(field, format!("\"{}\" is not a valid choice.", display(value)));
                        None
                    }
                }
            }
        }
    }

    /// Optional foreign key; `null` clears the reference.
    fn reference(&mut self, field: &str) -> Option<Option<i64>> {
        match self.fields.get(field) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(value) => match integer(value) {
                Some(id) if id > 0 => Some(Some(id)),
                Some(id) => {
                    self.errors.add(field, unknown_reference_message(id));
                    None
                }
                None => {
                    self.errors.add(
                        field,
                        format!(
                            "Incorrect type. Expected pk value, received {}.",
                            json_type_name(value)
                        ),
                    );
                    None
                }
            },
        }
    }
}

/// Accepts JSON integers, integral floats such as `3.0`, and strings holding either.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(raw) => {
            let raw = raw.trim();
            let digits = match raw.split_once('.') {
                Some((whole, zeros)) if zeros.bytes().all(|b| b == b'0') => whole,
                Some(_) => return None,
                None => raw,
            };
            digits.parse().ok()
        }
        _ => None,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
