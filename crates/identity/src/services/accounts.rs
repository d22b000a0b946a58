//! User accounts and their service agreements.

use tracing::{info, instrument};

use likeness_core::{NewUser, ServiceAgreement, ServiceAgreementRecord, User, UserId, UserProfileUpdate};

use super::IdentityError;
use crate::db::IdentityStore;

/// Account operations.
pub struct AccountService<'a> {
    store: &'a dyn IdentityStore,
}

impl<'a> AccountService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn IdentityStore) -> Self {
        Self { store }
    }

    /// Create a user together with their service agreement.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Conflict` if the username is taken.
    #[instrument(skip(self, user, agreement), fields(username = %user.username))]
    pub async fn create_user(
        &self,
        user: &NewUser,
        agreement: ServiceAgreement,
    ) -> Result<User, IdentityError> {
        let created = self.store.create_user(user, agreement).await?;
        info!(user_id = %created.id, "User created");
        Ok(created)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the user doesn't exist.
    pub async fn user(&self, id: UserId) -> Result<User, IdentityError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| IdentityError::not_found("user", id))
    }

    /// Apply an owner-initiated profile change.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the user doesn't exist.
    /// Returns `IdentityError::Conflict` if the new username is taken.
    #[instrument(skip(self, update), fields(user_id = %id))]
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
    ) -> Result<User, IdentityError> {
        Ok(self.store.update_user(id, update).await?)
    }

    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the user has no agreement on file.
    pub async fn service_agreement(
        &self,
        user_id: UserId,
    ) -> Result<ServiceAgreementRecord, IdentityError> {
        self.store
            .get_service_agreement(user_id)
            .await?
            .ok_or_else(|| IdentityError::not_found("service agreement", user_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::testing;

    #[tokio::test]
    async fn test_create_and_read_back() {
        let env = testing::Env::new();
        let accounts = env.accounts();

        let user = env.user("ada").await;
        assert_eq!(accounts.user(user.id).await.unwrap(), user);

        let agreement = accounts.service_agreement(user.id).await.unwrap();
        assert!(agreement.agreement.agreed_to_tos());
        assert!(agreement.agreement.agreed_to_privacy_policy());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let env = testing::Env::new();
        env.user("ada").await;

        let err = env
            .accounts()
            .create_user(
                &NewUser::new("Other", "Person", "ada").unwrap(),
                ServiceAgreement::accept(true, true).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let env = testing::Env::new();
        let user = env.user("ada").await;

        let update = UserProfileUpdate::new(Some("Augusta"), None, Some("countess")).unwrap();
        let updated = env.accounts().update_profile(user.id, &update).await.unwrap();
        assert_eq!(updated.first_name, "Augusta");
        assert_eq!(updated.last_name, user.last_name);
        assert_eq!(updated.username.as_str(), "countess");
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let env = testing::Env::new();
        let accounts = env.accounts();

        let err = accounts.user(UserId::new(404)).await.unwrap_err();
        assert!(matches!(err, IdentityError::NotFound { entity: "user", .. }));

        let update = UserProfileUpdate::new(Some("Nobody"), None, None).unwrap();
        let err = accounts.update_profile(UserId::new(404), &update).await.unwrap_err();
        assert_eq!(err.to_string(), "user 404 not found");
    }
}
