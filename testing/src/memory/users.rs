use super::InMemoryStore;
use grocery_core::users::{Role, StoredCredentials, User, UserRepository};
use grocery_core::{BoxFuture, DomainError, Result, UserId};

impl UserRepository for InMemoryStore {
    fn create_user(
        &self,
        email: String,
        name: String,
        password_hash: String,
    ) -> BoxFuture<'_, Result<User>> {
        Box::pin(async move {
            let now = self.now();
            let mut state = self.lock();
            if state
                .users
                .iter()
                .any(|credentials| credentials.user.email == email)
            {
                return Err(DomainError::conflict(
                    "An account with this email already exists",
                ));
            }
            let user = User {
                id: UserId::new(),
                email,
                name,
                role: Role::Customer,
                wallet_balance_cents: 0,
                created_at: now,
            };
            state.users.push(StoredCredentials {
                user: user.clone(),
                password_hash,
            });
            Ok(user)
        })
    }

    fn find_credentials(&self, email: String) -> BoxFuture<'_, Result<Option<StoredCredentials>>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .users
                .iter()
                .find(|credentials| credentials.user.email == email)
                .cloned())
        })
    }

    fn get_user(&self, id: UserId) -> BoxFuture<'_, Result<User>> {
        Box::pin(async move {
            self.lock()
                .users
                .iter()
                .find(|credentials| credentials.user.id == id)
                .map(|credentials| credentials.user.clone())
                .ok_or_else(|| DomainError::not_found("User", id))
        })
    }
}
