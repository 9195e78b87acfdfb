//! Read shapes per action and the wire projections built from them.

use serde::Serialize;

use crate::types::{
    Breed, BreedWithDogCount, DogWithBreedAverage, DogWithSameBreedCount, Gender, Rating, Size,
};

/// Managed resource, addressed by its collection path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Dogs,
    Breeds,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dogs => "dogs",
            Self::Breeds => "breeds",
        }
    }

    /// Absolute URL of the collection.
    pub fn collection_url(self, base_url: &str) -> String {
        format!("{}/api/{}", base_url.trim_end_matches('/'), self.as_str())
    }

    /// Absolute URL of one item.
    pub fn detail_url(self, base_url: &str, id: i64) -> String {
        format!("{}/{id}", self.collection_url(base_url))
    }
}

/// CRUD action selected by the HTTP verb and path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
}

impl Action {
    /// Canonical action name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Retrieve => "retrieve",
            Self::Update => "update",
            Self::PartialUpdate => "partial_update",
            Self::Destroy => "destroy",
        }
    }
}

/// Which annotated query feeds the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    List,
    Detail,
    None,
}

/// Which wire projection the response is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferShape {
    List,
    Detail,
    None,
}

/// Query and transfer shapes plus the success status for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub query: QueryShape,
    pub transfer: TransferShape,
    pub success_status: u16,
}

/// Maps an action to the shapes it reads and renders.
///
/// Writes re-read the stored row through the detail query so their responses
/// carry the same read-only aggregates as a retrieve.
pub fn projection_for(action: Action) -> Projection {
    let (query, transfer, success_status) = match action {
        Action::List => (QueryShape::List, TransferShape::List, 200),
        Action::Create => (QueryShape::Detail, TransferShape::Detail, 201),
        Action::Retrieve | Action::Update | Action::PartialUpdate => {
            (QueryShape::Detail, TransferShape::Detail, 200)
        }
        Action::Destroy => (QueryShape::None, TransferShape::None, 204),
    };
    Projection {
        query,
        transfer,
        success_status,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DogListItem {
    pub id: i64,
    pub name: String,
    pub age: u16,
    pub gender: Gender,
    pub detail_url: String,
    pub breed_avg_age: Option<f64>,
}

impl DogListItem {
    pub fn new(row: DogWithBreedAverage, base_url: &str) -> Self {
        let dog = row.dog;
        Self {
            detail_url: Resource::Dogs.detail_url(base_url, dog.id),
            id: dog.id,
            name: dog.name,
            age: dog.age,
            gender: dog.gender,
            breed_avg_age: row.breed_avg_age,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DogDetail {
    pub id: i64,
    pub name: String,
    pub age: u16,
    pub gender: Gender,
    pub breed: Option<i64>,
    pub color: String,
    pub favorite_food: Option<String>,
    pub favorite_toy: Option<String>,
    pub same_breed_count: Option<i64>,
}

impl From<DogWithSameBreedCount> for DogDetail {
    fn from(row: DogWithSameBreedCount) -> Self {
        let dog = row.dog;
        Self {
            id: dog.id,
            name: dog.name,
            age: dog.age,
            gender: dog.gender,
            breed: dog.breed,
            color: dog.color,
            favorite_food: dog.favorite_food,
            favorite_toy: dog.favorite_toy,
            same_breed_count: row.same_breed_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreedListItem {
    pub id: i64,
    pub name: String,
    pub size: Size,
    pub friendliness: Rating,
    pub trainability: Rating,
    pub shedding_amount: Rating,
    pub exercise_needs: Rating,
    pub detail_url: String,
    pub dog_count: i64,
}

impl BreedListItem {
    pub fn new(row: BreedWithDogCount, base_url: &str) -> Self {
        let breed = row.breed;
        Self {
            detail_url: Resource::Breeds.detail_url(base_url, breed.id),
            id: breed.id,
            name: breed.name,
            size: breed.size,
            friendliness: breed.friendliness,
            trainability: breed.trainability,
            shedding_amount: breed.shedding_amount,
            exercise_needs: breed.exercise_needs,
            dog_count: row.dog_count,
        }
    }
}

/// The breed detail projection is the breed's own fields.
pub type BreedDetail = Breed;
