use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of characters accepted by every text column.
pub const TEXT_MAX_LEN: usize = 255;
/// Upper bound of a dog's age (small integer column).
pub const AGE_MAX: u16 = 32767;
/// Color stored when a dog is created without one.
pub const DEFAULT_COLOR: &str = "other";

/// Raised when a stored or submitted value is outside a closed choice set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("\"{value}\" is not a valid choice.")]
pub struct InvalidChoice {
    pub value: String,
}

impl InvalidChoice {
    fn new(value: impl fmt::Display) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

/// Gender of a dog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    /// Returns the canonical database and wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = InvalidChoice;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(InvalidChoice::new(other)),
        }
    }
}

/// Size class of a breed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Size {
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
}

impl Size {
    /// Returns the canonical database and wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl FromStr for Size {
    type Err = InvalidChoice;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tiny" => Ok(Self::Tiny),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(InvalidChoice::new(other)),
        }
    }
}

/// Breed trait score on a closed 1 to 5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Returns the numeric score.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<i64> for Rating {
    type Error = InvalidChoice;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(InvalidChoice::new(value))
        }
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

/// Persisted breed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breed {
    pub id: i64,
    pub name: String,
    pub size: Size,
    pub friendliness: Rating,
    pub trainability: Rating,
    pub shedding_amount: Rating,
    pub exercise_needs: Rating,
}

impl fmt::Display for Breed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> '{}'", self.id, self.name)
    }
}

/// Persisted dog record. `breed` holds the referenced breed id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dog {
    pub id: i64,
    pub name: String,
    pub age: u16,
    pub gender: Gender,
    pub breed: Option<i64>,
    pub color: String,
    pub favorite_food: Option<String>,
    pub favorite_toy: Option<String>,
}

impl fmt::Display for Dog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> '{}'", self.id, self.name)
    }
}

/// Breed fields accepted on creation, defaults already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBreed {
    pub name: String,
    pub size: Size,
    pub friendliness: Rating,
    pub trainability: Rating,
    pub shedding_amount: Rating,
    pub exercise_needs: Rating,
}

impl NewBreed {
    /// Creates a breed draft with every optional field at its default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: Size::default(),
            friendliness: Rating::default(),
            trainability: Rating::default(),
            shedding_amount: Rating::default(),
            exercise_needs: Rating::default(),
        }
    }
}

/// Dog fields accepted on creation, defaults already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDog {
    pub name: String,
    pub age: u16,
    pub gender: Gender,
    pub breed: Option<i64>,
    pub color: String,
    pub favorite_food: Option<String>,
    pub favorite_toy: Option<String>,
}

impl NewDog {
    /// Creates a dog draft with every optional field at its default.
    pub fn new(name: impl Into<String>, age: u16) -> Self {
        Self {
            name: name.into(),
            age,
            gender: Gender::default(),
            breed: None,
            color: DEFAULT_COLOR.to_string(),
            favorite_food: None,
            favorite_toy: None,
        }
    }
}

/// Subset of breed fields supplied by an update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreedChanges {
    pub name: Option<String>,
    pub size: Option<Size>,
    pub friendliness: Option<Rating>,
    pub trainability: Option<Rating>,
    pub shedding_amount: Option<Rating>,
    pub exercise_needs: Option<Rating>,
}

impl BreedChanges {
    /// Writes the supplied fields onto `breed`.
    pub fn apply(&self, breed: &mut Breed) {
        if let Some(name) = &self.name {
            breed.name = name.clone();
        }
        if let Some(size) = self.size {
            breed.size = size;
        }
        if let Some(value) = self.friendliness {
            breed.friendliness = value;
        }
        if let Some(value) = self.trainability {
            breed.trainability = value;
        }
        if let Some(value) = self.shedding_amount {
            breed.shedding_amount = value;
        }
        if let Some(value) = self.exercise_needs {
            breed.exercise_needs = value;
        }
    }
}

/// Subset of dog fields supplied by an update.
///
/// Nullable columns use a nested option: `Some(None)` clears the value while
/// `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DogChanges {
    pub name: Option<String>,
    pub age: Option<u16>,
    pub gender: Option<Gender>,
    pub breed: Option<Option<i64>>,
    pub color: Option<String>,
    pub favorite_food: Option<Option<String>>,
    pub favorite_toy: Option<Option<String>>,
}

impl DogChanges {
    /// Writes the supplied fields onto `dog`.
    pub fn apply(&self, dog: &mut Dog) {
        if let Some(name) = &self.name {
            dog.name = name.clone();
        }
        if let Some(age) = self.age {
            dog.age = age;
        }
        if let Some(gender) = self.gender {
            dog.gender = gender;
        }
        if let Some(breed) = self.breed {
            dog.breed = breed;
        }
        if let Some(color) = &self.color {
            dog.color = color.clone();
        }
        if let Some(food) = &self.favorite_food {
            dog.favorite_food = food.clone();
        }
        if let Some(toy) = &self.favorite_toy {
            dog.favorite_toy = toy.clone();
        }
    }

    /// Returns the breed id this update points the dog at, if it sets one.
    pub fn target_breed(&self) -> Option<i64> {
        self.breed.flatten()
    }
}

/// Dog annotated with the average age of every dog sharing its breed.
#[derive(Debug, Clone, PartialEq)]
pub struct DogWithBreedAverage {
    pub dog: Dog,
    pub breed_avg_age: Option<f64>,
}

/// Dog annotated with the number of dogs sharing its breed, itself included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DogWithSameBreedCount {
    pub dog: Dog,
    pub same_breed_count: Option<i64>,
}

/// Breed annotated with the number of dogs referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreedWithDogCount {
    pub breed: Breed,
    pub dog_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dog() -> Dog {
        Dog {
            id: 2,
            name: "Bryee".into(),
            age: 2,
            gender: Gender::Female,
            breed: Some(7),
            color: "black".into(),
            favorite_food: Some("beef".into()),
            favorite_toy: Some("ball".into()),
        }
    }

    #[test]
    fn labels_use_id_and_quoted_name() {
        let breed = Breed {
            id: 4,
            name: "pitbull".into(),
            size: Size::Medium,
            friendliness: Rating::default(),
            trainability: Rating::default(),
            shedding_amount: Rating::default(),
            exercise_needs: Rating::default(),
        };
        assert_eq!(breed.to_string(), "<4> 'pitbull'");
        assert_eq!(sample_dog().to_string(), "<2> 'Bryee'");
    }

    #[test]
    fn choices_reject_unknown_values() {
        assert_eq!("female".parse::<Gender>(), Ok(Gender::Female));
        assert_eq!("large".parse::<Size>(), Ok(Size::Large));
        let err = "huge".parse::<Size>().unwrap_err();
        assert_eq!(err.to_string(), "\"huge\" is not a valid choice.");
        assert!(Rating::try_from(0).is_err());
        assert!(Rating::try_from(6).is_err());
        assert_eq!(Rating::try_from(5).map(Rating::get), Ok(5));
    }

    #[test]
    fn defaults_match_documented_values() {
        let breed = NewBreed::named("bandog");
        assert_eq!(breed.size, Size::Medium);
        assert_eq!(breed.exercise_needs.get(), 3);

        let dog = NewDog::new("Lucia", 3);
        assert_eq!(dog.gender, Gender::Male);
        assert_eq!(dog.color, "other");
        assert_eq!(dog.breed, None);
        assert_eq!(dog.favorite_food, None);
    }

    #[test]
    fn dog_changes_only_touch_supplied_fields() {
        let mut dog = sample_dog();
        let changes = DogChanges {
            age: Some(3),
            color: Some("dark gray".into()),
            favorite_toy: Some(None),
            ..DogChanges::default()
        };
        changes.apply(&mut dog);

        assert_eq!(dog.age, 3);
        assert_eq!(dog.color, "dark gray");
        assert_eq!(dog.favorite_toy, None);
        assert_eq!(dog.gender, Gender::Female);
        assert_eq!(dog.breed, Some(7));
        assert_eq!(dog.favorite_food.as_deref(), Some("beef"));
    }

    #[test]
    fn rating_serializes_as_plain_number() {
        let value = serde_json::to_value(Rating::default()).expect("serialize");
        assert_eq!(value, serde_json::json!(3));
    }
}
