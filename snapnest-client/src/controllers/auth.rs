use crate::{
    error::{ClientError, Result},
    mutations::{CreateUserAccount, SignInAccount, SignOutAccount},
    queries::CurrentUser,
    query::{QueryClient, QueryKey},
};
use snapnest_backend::ErrorReason;
use snapnest_common::model::{
    auth::Credentials,
    user::{NewUser, User},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Who is signed in, shared by every screen.
#[derive(Debug)]
pub struct AuthContext {
    queries: Arc<QueryClient>,
    user: Option<User>,
}

impl AuthContext {
    #[must_use]
    pub fn new(queries: Arc<QueryClient>) -> Self {
        Self {
            queries,
            user: None,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn require_user(&self) -> Result<&User> {
        self.user.as_ref().ok_or(ClientError::NotSignedIn)
    }

    /// Loads the signed-in user through the `CurrentUser` query, never from a
    /// cached answer. Having no session, or a session without a user
    /// document, counts as signed out rather than as a failure.
    pub async fn check_auth_user(&mut self) -> Result<bool> {
        self.queries.invalidate(&QueryKey::CurrentUser.into()).await;

        match self.queries.fetch(&CurrentUser).await {
            Ok(user) => {
                self.user = user;
                Ok(self.user.is_some())
            }
            Err(err)
                if matches!(
                    err.reason(),
                    ErrorReason::Unauthenticated | ErrorReason::NotFound
                ) =>
            {
                debug!(error = %err, "Not signed in");
                self.user = None;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn sign_in(&mut self, credentials: Credentials) -> Result<&User> {
        self.queries.mutate(SignInAccount(credentials)).await?;

        if !self.check_auth_user().await? {
            return Err(ClientError::NotSignedIn);
        }
        let user = self.require_user()?;
        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    /// Creates the account and its user document, then signs in with the
    /// new credentials.
    pub async fn sign_up(&mut self, new_user: NewUser) -> Result<&User> {
        let credentials = Credentials {
            email: new_user.email.clone(),
            password: new_user.password.clone(),
        };

        self.queries.mutate(CreateUserAccount(new_user)).await?;
        self.sign_in(credentials).await
    }

    /// Ends the session and forgets everything cached for it.
    pub async fn sign_out(&mut self) -> Result<()> {
        self.queries.mutate(SignOutAccount).await?;
        self.queries.clear().await;
        self.user = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        controllers::auth::AuthContext,
        queries::{CurrentUser, RecentPosts},
        query::{QueryConfig, QueryKey},
        testing::{setup, setup_with},
    };
    use std::time::Duration;
    use snapnest_backend::{ErrorReason, memory::Operation, service::Accounts};
    use snapnest_common::model::{
        auth::Credentials,
        post::Post,
        user::{NewUser, User, Username},
    };

    fn new_user() -> NewUser {
        NewUser {
            name: "Mira Kova".to_owned(),
            username: Username::new("mira".to_owned()).unwrap(),
            email: "mira@example.com".to_owned(),
            password: "secret-pass".to_owned(),
        }
    }

    #[tokio::test]
    async fn sign_up_signs_in() {
        let (_backend, queries) = setup();
        let mut auth = AuthContext::new(queries.clone());

        let user = auth.sign_up(new_user()).await.unwrap().clone();

        assert_eq!(user.username.get(), "mira");
        assert!(auth.is_authenticated());
        assert_eq!(
            queries.get_query_data::<User>(&QueryKey::CurrentUser).await,
            Some(user)
        );
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let (_backend, queries) = setup();
        let mut auth = AuthContext::new(queries);
        auth.sign_up(new_user()).await.unwrap();
        auth.sign_out().await.unwrap();

        let err = auth
            .sign_in(Credentials {
                email: "mira@example.com".to_owned(),
                password: "wrong".to_owned(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.reason(), ErrorReason::Unauthenticated);
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn account_without_user_document_counts_as_signed_out() {
        let (backend, queries) = setup();
        backend
            .create_account("9", "ghost@example.com", "secret-pass", "Ghost")
            .await
            .unwrap();
        let mut auth = AuthContext::new(queries);

        let err = auth
            .sign_in(Credentials {
                email: "ghost@example.com".to_owned(),
                password: "secret-pass".to_owned(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.reason(), ErrorReason::Unauthenticated);
        assert!(auth.require_user().is_err());
    }

    #[tokio::test]
    async fn check_propagates_outages() {
        let (backend, queries) = setup();
        let mut auth = AuthContext::new(queries);
        backend.fail_next(Operation::GetAccount, ErrorReason::Unavailable);

        let err = auth.check_auth_user().await.unwrap_err();

        assert_eq!(err.reason(), ErrorReason::Unavailable);
        assert!(!auth.check_auth_user().await.unwrap());
    }

    #[tokio::test]
    async fn check_goes_through_the_current_user_query() {
        let (backend, queries) = setup_with(QueryConfig {
            stale_time: Duration::from_secs(3600),
            ..QueryConfig::default()
        });
        let mut auth = AuthContext::new(queries.clone());
        let user = auth.sign_up(new_user()).await.unwrap().clone();
        let lookups = backend.calls(Operation::GetAccount);

        assert_eq!(queries.fetch(&CurrentUser).await.unwrap(), Some(user.clone()));
        assert_eq!(backend.calls(Operation::GetAccount), lookups);

        assert!(auth.check_auth_user().await.unwrap());
        assert_eq!(backend.calls(Operation::GetAccount), lookups + 1);
        assert_eq!(auth.user(), Some(&user));
        assert_eq!(
            queries.get_query_data::<User>(&QueryKey::CurrentUser).await,
            Some(user)
        );
    }

    #[tokio::test]
    async fn sign_out_clears_the_cache() {
        let (_backend, queries) = setup();
        let mut auth = AuthContext::new(queries.clone());
        auth.sign_up(new_user()).await.unwrap();
        queries.fetch(&RecentPosts).await.unwrap();

        auth.sign_out().await.unwrap();

        assert!(!auth.is_authenticated());
        assert_eq!(
            queries.get_query_data::<Vec<Post>>(&QueryKey::RecentPosts).await,
            None
        );
        assert_eq!(
            queries.get_query_data::<User>(&QueryKey::CurrentUser).await,
            None
        );
    }
}
