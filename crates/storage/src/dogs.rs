use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};
use thiserror::Error;

use kennel_core::types::{
    Dog, DogChanges, DogWithBreedAverage, DogWithSameBreedCount, Gender, NewDog,
};

use crate::is_foreign_key_violation;

const DOG_COLUMNS: &str = "d.id, d.name, d.age, d.gender, d.breed_id, d.color, d.favorite_food, d.favorite_toy";

/// Repository responsible for the `dogs` table.
#[derive(Clone)]
pub struct DogRepository {
    pool: SqlitePool,
}

impl DogRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, id: i64) -> Result<bool, DogError> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM dogs WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// Counts every stored dog.
    pub async fn count(&self) -> Result<u64, DogError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dogs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Lists dogs ordered by id, each annotated with the average age of the
    /// dogs sharing its breed. Breedless dogs carry no average.
    pub async fn list_with_breed_average(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DogWithBreedAverage>, DogError> {
        let sql = format!(
            r#"
SELECT {DOG_COLUMNS},
       (SELECT AVG(o.age)
          FROM dogs AS o
         WHERE o.breed_id = d.breed_id) AS breed_avg_age
  FROM dogs AS d
 ORDER BY d.id
 LIMIT ? OFFSET ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<DogWithBreedAverage, DogError> {
                Ok(DogWithBreedAverage {
                    dog: DogRow::from_row(row)?.into_domain()?,
                    breed_avg_age: row.try_get("breed_avg_age")?,
                })
            })
            .collect()
    }

    /// Loads one dog annotated with the number of dogs sharing its breed,
    /// itself included.
    pub async fn fetch_with_same_breed_count(
        &self,
        id: i64,
    ) -> Result<DogWithSameBreedCount, DogError> {
        let sql = format!(
            r#"
SELECT {DOG_COLUMNS},
       CASE
           WHEN d.breed_id IS NULL THEN NULL
           ELSE (SELECT COUNT(*) FROM dogs AS o WHERE o.breed_id = d.breed_id)
       END AS same_breed_count
  FROM dogs AS d
 WHERE d.id = ?
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DogError::NotFound)?;

        Ok(DogWithSameBreedCount {
            dog: DogRow::from_row(&row)?.into_domain()?,
            same_breed_count: row.try_get("same_breed_count")?,
        })
    }

    /// Lists every dog ordered by id without annotations.
    pub async fn list_all(&self) -> Result<Vec<Dog>, DogError> {
        let sql = format!("SELECT {DOG_COLUMNS} FROM dogs AS d ORDER BY d.id");
        let rows = sqlx::query_as::<_, DogRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(DogRow::into_domain).collect()
    }

    /// Inserts a new dog and returns the stored record.
    pub async fn insert(&self, dog: &NewDog) -> Result<Dog, DogError> {
        let mut tx = self.pool.begin().await?;
        if let Some(breed_id) = dog.breed {
            ensure_breed_exists(&mut tx, breed_id).await?;
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO dogs (name, age, gender, breed_id, color, favorite_food, favorite_toy) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&dog.name)
        .bind(i64::from(dog.age))
        .bind(dog.gender.as_str())
        .bind(dog.breed)
        .bind(&dog.color)
        .bind(&dog.favorite_food)
        .bind(&dog.favorite_toy)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| write_error(err, dog.breed))?;

        tx.commit().await?;

        Ok(Dog {
            id,
            name: dog.name.clone(),
            age: dog.age,
            gender: dog.gender,
            breed: dog.breed,
            color: dog.color.clone(),
            favorite_food: dog.favorite_food.clone(),
            favorite_toy: dog.favorite_toy.clone(),
        })
    }

    /// Applies the supplied changes to an existing dog inside one transaction.
    pub async fn update(&self, id: i64, changes: &DogChanges) -> Result<Dog, DogError> {
        let mut tx = self.pool.begin().await?;
        let mut dog = fetch_plain(&mut tx, id).await?.ok_or(DogError::NotFound)?;
        changes.apply(&mut dog);
        if let Some(breed_id) = changes.target_breed() {
            ensure_breed_exists(&mut tx, breed_id).await?;
        }

        sqlx::query(
            "UPDATE dogs \
             SET name = ?, age = ?, gender = ?, breed_id = ?, color = ?, \
                 favorite_food = ?, favorite_toy = ? \
             WHERE id = ?",
        )
        .bind(&dog.name)
        .bind(i64::from(dog.age))
        .bind(dog.gender.as_str())
        .bind(dog.breed)
        .bind(&dog.color)
        .bind(&dog.favorite_food)
        .bind(&dog.favorite_toy)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|err| write_error(err, dog.breed))?;

        tx.commit().await?;
        Ok(dog)
    }

    /// Deletes one dog.
    pub async fn delete(&self, id: i64) -> Result<(), DogError> {
        let result = sqlx::query("DELETE FROM dogs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DogError::NotFound);
        }
        Ok(())
    }
}

async fn fetch_plain(conn: &mut SqliteConnection, id: i64) -> Result<Option<Dog>, DogError> {
    let sql = format!("SELECT {DOG_COLUMNS} FROM dogs AS d WHERE d.id = ?");
    let row = sqlx::query_as::<_, DogRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(DogRow::into_domain).transpose()
}

async fn ensure_breed_exists(conn: &mut SqliteConnection, breed_id: i64) -> Result<(), DogError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM breeds WHERE id = ?")
        .bind(breed_id)
        .fetch_optional(&mut *conn)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(DogError::UnknownBreed(breed_id)),
    }
}

fn write_error(err: sqlx::Error, breed: Option<i64>) -> DogError {
    match breed {
        Some(breed_id) if is_foreign_key_violation(&err) => DogError::UnknownBreed(breed_id),
        _ => DogError::Database(err),
    }
}

/// Raw `dogs` row as stored.
#[derive(Debug, FromRow)]
struct DogRow {
    id: i64,
    name: String,
    age: i64,
    gender: String,
    breed_id: Option<i64>,
    color: String,
    favorite_food: Option<String>,
    favorite_toy: Option<String>,
}

impl DogRow {
    fn into_domain(self) -> Result<Dog, DogError> {
        let age = u16::try_from(self.age)
            .map_err(|_| DogError::Decode(format!("dog {} has invalid age {}", self.id, self.age)))?;
        let gender = self
            .gender
            .parse::<Gender>()
            .map_err(|err| DogError::Decode(format!("dog {} gender: {err}", self.id)))?;
        Ok(Dog {
            id: self.id,
            name: self.name,
            age,
            gender,
            breed: self.breed_id,
            color: self.color,
            favorite_food: self.favorite_food,
            favorite_toy: self.favorite_toy,
        })
    }
}

/// Errors that can occur while reading or mutating dogs.
#[derive(Debug, Error)]
pub enum DogError {
    #[error("dog not found")]
    NotFound,
    #[error("breed {0} does not exist")]
    UnknownBreed(i64),
    #[error("stored dog is malformed: {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use kennel_core::types::NewBreed;

    async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    async fn insert_breed(db: &Database, name: &str) -> i64 {
        db.breeds()
            .insert(&NewBreed::named(name))
            .await
            .expect("insert breed")
            .id
    }

    async fn insert_dog(db: &Database, name: &str, age: u16, breed: Option<i64>) -> Dog {
        let mut dog = NewDog::new(name, age);
        dog.breed = breed;
        db.dogs().insert(&dog).await.expect("insert dog")
    }

    #[tokio::test]
    async fn insert_applies_stored_values() {
        let db = setup_db().await;
        let mut new_dog = NewDog::new("Lucia", 3);
        new_dog.gender = Gender::Female;

        let dog = db.dogs().insert(&new_dog).await.expect("insert");
        let stored = db
            .dogs()
            .fetch_with_same_breed_count(dog.id)
            .await
            .expect("fetch");

        assert_eq!(stored.dog, dog);
        assert_eq!(stored.dog.color, "other");
        assert_eq!(stored.dog.favorite_food, None);
        assert_eq!(stored.same_breed_count, None);
    }

    #[tokio::test]
    async fn insert_rejects_unknown_breed() {
        let db = setup_db().await;
        let mut new_dog = NewDog::new("Ghost", 1);
        new_dog.breed = Some(42);

        let err = db.dogs().insert(&new_dog).await.unwrap_err();
        assert!(matches!(err, DogError::UnknownBreed(42)));
        assert_eq!(db.dogs().count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn breed_average_is_correlated_per_breed() {
        let db = setup_db().await;
        let pitbull = insert_breed(&db, "pitbull").await;
        let bandog = insert_breed(&db, "bandog").await;
        insert_dog(&db, "Axe", 3, Some(pitbull)).await;
        insert_dog(&db, "Bryee", 2, Some(bandog)).await;
        insert_dog(&db, "Dutty", 5, Some(bandog)).await;
        insert_dog(&db, "Stray", 9, None).await;

        let rows = db
            .dogs()
            .list_with_breed_average(10, 0)
            .await
            .expect("list");
        let averages: Vec<(&str, Option<f64>)> = rows
            .iter()
            .map(|row| (row.dog.name.as_str(), row.breed_avg_age))
            .collect();

        assert_eq!(
            averages,
            vec![
                ("Axe", Some(3.0)),
                ("Bryee", Some(3.5)),
                ("Dutty", Some(3.5)),
                ("Stray", None),
            ]
        );
    }

    #[tokio::test]
    async fn list_respects_limit_and_offset() {
        let db = setup_db().await;
        for (name, age) in [("A", 1), ("B", 2), ("C", 3)] {
            insert_dog(&db, name, age, None).await;
        }

        let rows = db
            .dogs()
            .list_with_breed_average(2, 1)
            .await
            .expect("list");
        let names: Vec<&str> = rows.iter().map(|row| row.dog.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C"]);
        assert_eq!(db.dogs().count().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn same_breed_count_includes_self() {
        let db = setup_db().await;
        let bandog = insert_breed(&db, "bandog").await;
        let first = insert_dog(&db, "Bryee", 2, Some(bandog)).await;
        insert_dog(&db, "Dutty", 4, Some(bandog)).await;

        let row = db
            .dogs()
            .fetch_with_same_breed_count(first.id)
            .await
            .expect("fetch");
        assert_eq!(row.same_breed_count, Some(2));
    }

    #[tokio::test]
    async fn update_changes_only_supplied_fields() {
        let db = setup_db().await;
        let breed = insert_breed(&db, "bandog").await;
        let dog = insert_dog(&db, "Bryee", 2, Some(breed)).await;

        let changes = DogChanges {
            age: Some(3),
            color: Some("dark gray".into()),
            ..DogChanges::default()
        };
        let updated = db.dogs().update(dog.id, &changes).await.expect("update");

        assert_eq!(updated.age, 3);
        assert_eq!(updated.color, "dark gray");
        assert_eq!(updated.name, "Bryee");
        assert_eq!(updated.breed, Some(breed));

        let cleared = db
            .dogs()
            .update(
                dog.id,
                &DogChanges {
                    breed: Some(None),
                    ..DogChanges::default()
                },
            )
            .await
            .expect("clear breed");
        assert_eq!(cleared.breed, None);
    }

    #[tokio::test]
    async fn update_reports_missing_dog_and_unknown_breed() {
        let db = setup_db().await;
        let err = db
            .dogs()
            .update(7, &DogChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DogError::NotFound));

        let dog = insert_dog(&db, "Axe", 3, None).await;
        let err = db
            .dogs()
            .update(
                dog.id,
                &DogChanges {
                    breed: Some(Some(99)),
                    ..DogChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DogError::UnknownBreed(99)));
    }

    #[tokio::test]
    async fn delete_removes_row_once() {
        let db = setup_db().await;
        let dog = insert_dog(&db, "Axe", 3, None).await;

        assert!(db.dogs().exists(dog.id).await.expect("exists"));
        db.dogs().delete(dog.id).await.expect("delete");
        assert!(!db.dogs().exists(dog.id).await.expect("exists"));
        let err = db.dogs().delete(dog.id).await.unwrap_err();
        assert!(matches!(err, DogError::NotFound));
    }
}
