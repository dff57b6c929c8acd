use crate::{is_unique_violation, storage, PostgresStore};
use grocery_core::users::{StoredCredentials, User, UserRepository};
use grocery_core::{BoxFuture, DateTime, DomainError, Result, UserId, Utc};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    wallet_balance_cents: i64,
    created_at: DateTime<Utc>,
    password_hash: String,
}

impl UserRow {
    fn into_credentials(self) -> Result<StoredCredentials> {
        Ok(StoredCredentials {
            user: User {
                id: UserId::from_uuid(self.id),
                email: self.email,
                name: self.name,
                role: self.role.parse()?,
                wallet_balance_cents: self.wallet_balance_cents,
                created_at: self.created_at,
            },
            password_hash: self.password_hash,
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, name, role, wallet_balance_cents, created_at, password_hash";

impl UserRepository for PostgresStore {
    #[tracing::instrument(skip(self, name, password_hash))]
    fn create_user(
        &self,
        email: String,
        name: String,
        password_hash: String,
    ) -> BoxFuture<'_, Result<User>> {
        Box::pin(async move {
            let inserted: std::result::Result<UserRow, sqlx::Error> = sqlx::query_as(&format!(
                "INSERT INTO users (id, email, name, password_hash, role, created_at)
                 VALUES ($1, $2, $3, $4, 'customer', $5)
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(UserId::new().as_uuid())
            .bind(&email)
            .bind(&name)
            .bind(&password_hash)
            .bind(self.now())
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(row) => {
                    let user = row.into_credentials()?.user;
                    tracing::info!(user_id = %user.id, "User registered");
                    Ok(user)
                }
                Err(e) if is_unique_violation(&e) => Err(DomainError::conflict(
                    "An account with this email already exists",
                )),
                Err(e) => Err(storage("create user")(e)),
            }
        })
    }

    fn find_credentials(&self, email: String) -> BoxFuture<'_, Result<Option<StoredCredentials>>> {
        Box::pin(async move {
            let row: Option<UserRow> = sqlx::query_as(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
            ))
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("find user"))?;
            row.map(UserRow::into_credentials).transpose()
        })
    }

    fn get_user(&self, id: UserId) -> BoxFuture<'_, Result<User>> {
        Box::pin(async move {
            let row: Option<UserRow> = sqlx::query_as(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("get user"))?;
            row.map(|row| row.into_credentials().map(|credentials| credentials.user))
                .transpose()?
                .ok_or_else(|| DomainError::not_found("User", id))
        })
    }
}
