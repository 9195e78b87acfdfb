use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};
use thiserror::Error;

use kennel_core::types::{Breed, BreedChanges, BreedWithDogCount, NewBreed, Rating, Size};

use crate::is_foreign_key_violation;

const BREED_COLUMNS: &str =
    "b.id, b.name, b.size, b.friendliness, b.trainability, b.shedding_amount, b.exercise_needs";

/// Repository responsible for the `breeds` table.
#[derive(Clone)]
pub struct BreedRepository {
    pool: SqlitePool,
}

impl BreedRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, id: i64) -> Result<bool, BreedError> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM breeds WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// Counts every stored breed.
    pub async fn count(&self) -> Result<u64, BreedError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM breeds")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Lists breeds ordered by id, each annotated with the number of dogs
    /// referencing it.
    pub async fn list_with_dog_count(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BreedWithDogCount>, BreedError> {
        let sql = format!(
            r#"
SELECT {BREED_COLUMNS},
       (SELECT COUNT(*) FROM dogs AS d WHERE d.breed_id = b.id) AS dog_count
  FROM breeds AS b
 ORDER BY b.id
 LIMIT ? OFFSET ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<BreedWithDogCount, BreedError> {
                Ok(BreedWithDogCount {
                    breed: BreedRow::from_row(row)?.into_domain()?,
                    dog_count: row.try_get("dog_count")?,
                })
            })
            .collect()
    }

    /// Loads one breed by id.
    pub async fn fetch(&self, id: i64) -> Result<Breed, BreedError> {
        let mut conn = self.pool.acquire().await?;
        fetch_plain(&mut conn, id).await?.ok_or(BreedError::NotFound)
    }

    /// Lists every breed ordered by id without annotations.
    pub async fn list_all(&self) -> Result<Vec<Breed>, BreedError> {
        let sql = format!("SELECT {BREED_COLUMNS} FROM breeds AS b ORDER BY b.id");
        let rows = sqlx::query_as::<_, BreedRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(BreedRow::into_domain).collect()
    }

    /// Inserts a new breed and returns the stored record.
    pub async fn insert(&self, breed: &NewBreed) -> Result<Breed, BreedError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO breeds \
             (name, size, friendliness, trainability, shedding_amount, exercise_needs) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&breed.name)
        .bind(breed.size.as_str())
        .bind(i64::from(breed.friendliness.get()))
        .bind(i64::from(breed.trainability.get()))
        .bind(i64::from(breed.shedding_amount.get()))
        .bind(i64::from(breed.exercise_needs.get()))
        .fetch_one(&self.pool)
        .await?;

        Ok(Breed {
            id,
            name: breed.name.clone(),
            size: breed.size,
            friendliness: breed.friendliness,
            trainability: breed.trainability,
            shedding_amount: breed.shedding_amount,
            exercise_needs: breed.exercise_needs,
        })
    }

    /// Applies the supplied changes to an existing breed inside one transaction.
    pub async fn update(&self, id: i64, changes: &BreedChanges) -> Result<Breed, BreedError> {
        let mut tx = self.pool.begin().await?;
        let mut breed = fetch_plain(&mut tx, id).await?.ok_or(BreedError::NotFound)?;
        changes.apply(&mut breed);

        sqlx::query(
            "UPDATE breeds \
             SET name = ?, size = ?, friendliness = ?, trainability = ?, \
                 shedding_amount = ?, exercise_needs = ? \
             WHERE id = ?",
        )
        .bind(&breed.name)
        .bind(breed.size.as_str())
        .bind(i64::from(breed.friendliness.get()))
        .bind(i64::from(breed.trainability.get()))
        .bind(i64::from(breed.shedding_amount.get()))
        .bind(i64::from(breed.exercise_needs.get()))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(breed)
    }

    /// Deletes a breed unless dogs still reference it.
    pub async fn delete(&self, id: i64) -> Result<(), BreedError> {
        let mut tx = self.pool.begin().await?;
        let breed = fetch_plain(&mut tx, id).await?.ok_or(BreedError::NotFound)?;

        let dog_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dogs WHERE breed_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if dog_count > 0 {
            return Err(BreedError::Protected {
                breed: breed.to_string(),
                dog_count,
            });
        }

        sqlx::query("DELETE FROM breeds WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    BreedError::Protected {
                        breed: breed.to_string(),
                        dog_count: 1,
                    }
                } else {
                    BreedError::Database(err)
                }
            })?;

        tx.commit().await?;
        Ok(())
    }
}

async fn fetch_plain(conn: &mut SqliteConnection, id: i64) -> Result<Option<Breed>, BreedError> {
    let sql = format!("SELECT {BREED_COLUMNS} FROM breeds AS b WHERE b.id = ?");
    let row = sqlx::query_as::<_, BreedRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(BreedRow::into_domain).transpose()
}

/// Raw `breeds` row as stored.
#[derive(Debug, FromRow)]
struct BreedRow {
    id: i64,
    name: String,
    size: String,
    friendliness: i64,
    trainability: i64,
    shedding_amount: i64,
    exercise_needs: i64,
}

impl BreedRow {
    fn into_domain(self) -> Result<Breed, BreedError> {
        let id = self.id;
        let rating = |column: &str, value: i64| {
            Rating::try_from(value)
                .map_err(|err| BreedError::Decode(format!("breed {id} {column}: {err}")))
        };
        Ok(Breed {
            size: self
                .size
                .parse::<Size>()
                .map_err(|err| BreedError::Decode(format!("breed {id} size: {err}")))?,
            friendliness: rating("friendliness", self.friendliness)?,
            trainability: rating("trainability", self.trainability)?,
            shedding_amount: rating("shedding_amount", self.shedding_amount)?,
            exercise_needs: rating("exercise_needs", self.exercise_needs)?,
            id,
            name: self.name,
        })
    }
}

/// Errors that can occur while reading or mutating breeds.
#[derive(Debug, Error)]
pub enum BreedError {
    #[error("breed not found")]
    NotFound,
    #[error("breed {breed} is still referenced by {dog_count} dog(s)")]
    Protected { breed: String, dog_count: i64 },
    #[error("stored breed is malformed: {0}")]
    Decode(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use kennel_core::types::NewDog;

    async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    fn pitbull() -> NewBreed {
        NewBreed {
            friendliness: Rating::try_from(5).expect("rating"),
            trainability: Rating::try_from(5).expect("rating"),
            shedding_amount: Rating::try_from(1).expect("rating"),
            ..NewBreed::named("pitbull")
        }
    }

    #[tokio::test]
    async fn insert_keeps_default_ratings() {
        let db = setup_db().await;
        let breed = db.breeds().insert(&pitbull()).await.expect("insert");
        let stored = db.breeds().fetch(breed.id).await.expect("fetch");

        assert_eq!(stored, breed);
        assert_eq!(stored.size, Size::Medium);
        assert_eq!(stored.exercise_needs.get(), 3);
    }

    #[tokio::test]
    async fn dog_count_tracks_references() {
        let db = setup_db().await;
        let pitbull = db.breeds().insert(&pitbull()).await.expect("insert");
        let bandog = db
            .breeds()
            .insert(&NewBreed::named("bandog"))
            .await
            .expect("insert");
        db.breeds()
            .insert(&NewBreed::named("bull terrier"))
            .await
            .expect("insert");

        for (name, breed) in [("Axe", pitbull.id), ("Bryee", bandog.id), ("Dutty", bandog.id)] {
            let mut dog = NewDog::new(name, 3);
            dog.breed = Some(breed);
            db.dogs().insert(&dog).await.expect("insert dog");
        }

        let rows = db
            .breeds()
            .list_with_dog_count(10, 0)
            .await
            .expect("list");
        let counts: Vec<(&str, i64)> = rows
            .iter()
            .map(|row| (row.breed.name.as_str(), row.dog_count))
            .collect();
        assert_eq!(
            counts,
            vec![("pitbull", 1), ("bandog", 2), ("bull terrier", 0)]
        );
    }

    #[tokio::test]
    async fn update_changes_only_supplied_fields() {
        let db = setup_db().await;
        let breed = db.breeds().insert(&pitbull()).await.expect("insert");

        let changes = BreedChanges {
            name: Some("bulldog".into()),
            shedding_amount: Some(Rating::try_from(3).expect("rating")),
            ..BreedChanges::default()
        };
        let updated = db.breeds().update(breed.id, &changes).await.expect("update");

        assert_eq!(updated.name, "bulldog");
        assert_eq!(updated.shedding_amount.get(), 3);
        assert_eq!(updated.friendliness.get(), 5);
        assert_eq!(db.breeds().fetch(breed.id).await.expect("fetch"), updated);
    }

    #[tokio::test]
    async fn delete_is_blocked_while_dogs_reference_breed() {
        let db = setup_db().await;
        let breed = db.breeds().insert(&pitbull()).await.expect("insert");
        let mut new_dog = NewDog::new("Axe", 3);
        new_dog.breed = Some(breed.id);
        let dog = db.dogs().insert(&new_dog).await.expect("insert dog");

        let err = db.breeds().delete(breed.id).await.unwrap_err();
        assert!(matches!(err, BreedError::Protected { dog_count: 1, .. }));
        assert_eq!(db.breeds().count().await.expect("count"), 1);
        assert_eq!(db.dogs().count().await.expect("count"), 1);

        db.dogs().delete(dog.id).await.expect("delete dog");
        db.breeds().delete(breed.id).await.expect("delete breed");
        assert_eq!(db.breeds().count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn foreign_key_blocks_raw_delete() {
        let db = setup_db().await;
        let breed = db.breeds().insert(&pitbull()).await.expect("insert");
        let mut new_dog = NewDog::new("Axe", 3);
        new_dog.breed = Some(breed.id);
        db.dogs().insert(&new_dog).await.expect("insert dog");

        let err = sqlx::query("DELETE FROM breeds WHERE id = ?")
            .bind(breed.id)
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(is_foreign_key_violation(&err));
    }

    #[tokio::test]
    async fn missing_breed_is_reported() {
        let db = setup_db().await;
        assert!(!db.breeds().exists(5).await.expect("exists"));
        assert!(matches!(
            db.breeds().fetch(5).await,
            Err(BreedError::NotFound)
        ));
        assert!(matches!(
            db.breeds().delete(5).await,
            Err(BreedError::NotFound)
        ));
    }
}
