use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use super::model::{CurrentUser, UserCredentials, UserRole};

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Clone)]
pub struct UserRepository {
    pub pool: Arc<SqlitePool>,
}

impl UserRepository {
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
    ) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, password, role, created_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
    }

    pub async fn find_credentials(&self, email: &str) -> sqlx::Result<Option<UserCredentials>> {
        sqlx::query_as::<_, UserCredentials>("SELECT id, password FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
    }

    #[cfg(test)]
    pub async fn delete_user(&self, user_id: i64) -> sqlx::Result<u64> {
        let rows_affected = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&*self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected)
    }

    /// Opens a session and returns its cookie token.
    pub async fn create_session(&self, user_id: i64) -> sqlx::Result<String> {
        let token = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO sessions (token, user_id, csrf_token, created_at) VALUES (?, ?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(Uuid::new_v4().to_string())
            .bind(Utc::now())
            .execute(&*self.pool)
            .await?;
        Ok(token)
    }

    pub async fn session_user(&self, token: &str) -> sqlx::Result<Option<CurrentUser>> {
        sqlx::query_as::<_, CurrentUser>(
            r#"
            SELECT users.id, users.email, users.role, sessions.csrf_token
            FROM sessions JOIN users ON users.id = sessions.user_id
            WHERE sessions.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&*self.pool)
        .await
    }

    pub async fn delete_session(&self, token: &str) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::data::{repository::ConversationRepository, test_pool};

    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_session_resolves_user() {
        let pool = test_pool().await;
        let repo = UserRepository { pool };
        let user_id = repo
            .create_user("admin@test.com", "hash", UserRole::Admin)
            .await
            .unwrap();

        let token = repo.create_session(user_id).await.unwrap();
        let user = repo.session_user(&token).await.unwrap().unwrap();
        assert_eq!(user.id, user_id);
        assert!(user.is_admin());
        assert!(!user.csrf_token.is_empty());

        repo.delete_session(&token).await.unwrap();
        assert!(repo.session_user(&token).await.unwrap().is_none());
        assert!(repo.session_user("bogus").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let pool = test_pool().await;
        let repo = UserRepository { pool };
        repo.create_user("kid@test.com", "hash", UserRole::Child)
            .await
            .unwrap();
        assert!(repo
            .create_user("kid@test.com", "hash", UserRole::Child)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_conversations() {
        let pool = test_pool().await;
        let users = UserRepository { pool: pool.clone() };
        let conversations = ConversationRepository { pool: pool.clone() };
        let user_id = users
            .create_user("kid@test.com", "hash", UserRole::Child)
            .await
            .unwrap();
        let conversation = conversations.create(user_id, "chat").await.unwrap();
        conversations
            .add_message(user_id, conversation.id, crate::data::model::MessageRole::User, "hi")
            .await
            .unwrap();

        assert_eq!(users.delete_user(user_id).await.unwrap(), 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&*pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&*pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
