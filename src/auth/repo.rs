use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{PasswordReset, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The unique-email constraint rejected an insert.
    #[error("email already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn insert(&self, user: &User) -> Result<(), StoreError>;
    /// Returns the number of rows touched.
    async fn update_approved(&self, email: &str, approved: bool) -> Result<u64, StoreError>;
    async fn update_pass_hash(&self, email: &str, pass_hash: &str) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ResetStore: Send + Sync {
    async fn insert_reset(&self, reset: &PasswordReset) -> Result<(), StoreError>;
    async fn find_reset(&self, email: &str, token: &str)
        -> Result<Option<PasswordReset>, StoreError>;
    async fn delete_reset(&self, id: Uuid) -> Result<(), StoreError>;
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, pass_hash, approved, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, pass_hash, approved, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, pass_hash, approved, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.pass_hash)
        .bind(user.approved)
        .bind(user.created_at)
        .execute(&self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Duplicate
            } else {
                StoreError::Database(err)
            }
        })?;
        Ok(())
    }

    async fn update_approved(&self, email: &str, approved: bool) -> Result<u64, StoreError> {
        let done = sqlx::query("UPDATE users SET approved = $1 WHERE email = $2")
            .bind(approved)
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(done.rows_affected())
    }

    async fn update_pass_hash(&self, email: &str, pass_hash: &str) -> Result<u64, StoreError> {
        let done = sqlx::query("UPDATE users SET pass_hash = $1 WHERE email = $2")
            .bind(pass_hash)
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(done.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgResetStore {
    db: PgPool,
}

impl PgResetStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResetStore for PgResetStore {
    async fn insert_reset(&self, reset: &PasswordReset) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resets (id, email, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reset.id)
        .bind(&reset.email)
        .bind(&reset.token)
        .bind(reset.expires_at)
        .bind(reset.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_reset(
        &self,
        email: &str,
        token: &str,
    ) -> Result<Option<PasswordReset>, StoreError> {
        let reset = sqlx::query_as::<_, PasswordReset>(
            r#"
            SELECT id, email, token, expires_at, created_at
            FROM resets
            WHERE email = $1 AND token = $2
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(reset)
    }

    async fn delete_reset(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM resets WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug)]
    struct FakeDbError {
        code: &'static str,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake db error {}", self.code)
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "fake"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn unique_violation_is_detected_by_sqlstate() {
        let dup = sqlx::Error::Database(Box::new(FakeDbError { code: "23505" }));
        assert!(is_unique_violation(&dup));

        let other = sqlx::Error::Database(Box::new(FakeDbError { code: "40001" }));
        assert!(!is_unique_violation(&other));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
