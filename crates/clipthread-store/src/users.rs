//! User directory: accounts, password checks and QR-code login tokens.

use std::sync::Arc;

use async_trait::async_trait;
use clipthread_shared::{generate_login_token, CredentialHasher, RecordId};
use serde_json::Value;
use tracing::{debug, info};

use crate::collaborators::ProfileLookup;
use crate::database::Database;
use crate::error::Result;
use crate::models::{NewUser, Profile, PublicProfile, User};
use crate::record::{Collection, Filter};

pub struct Users {
    collection: Collection<User>,
    hasher: Arc<dyn CredentialHasher>,
}

impl Users {
    pub fn new(db: Database, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            collection: Collection::new(db),
            hasher,
        }
    }

    /// Create an account.  Returns `None` when the e-mail is already taken.
    pub async fn add(
        &self,
        email: &str,
        password: &str,
        profile: NewUser,
    ) -> Result<Option<RecordId>> {
        // Skip the hashing cost for an obvious duplicate; the unique index
        // still decides concurrent sign-ups.
        if self.collection.count(Filter::new().eq("email", email)).await? > 0 {
            debug!(email, "e-mail already registered");
            return Ok(None);
        }

        let user = User {
            id: RecordId::new(),
            email: email.to_string(),
            password_hash: self.hash_password(password).await?,
            name: profile.name,
            picture: profile.picture,
            login_token: Some(generate_login_token()),
            origin: profile.origin,
        };

        let id = self.collection.insert(&user).await?;
        match id {
            Some(id) => info!(user_id = %id, "user created"),
            None => debug!(email, "e-mail already registered"),
        }
        Ok(id)
    }

    /// Fetch a profile, backfilling a login token for legacy records.
    pub async fn get(&self, id: RecordId) -> Result<Option<Profile>> {
        let Some(mut profile) = self.collection.get_as::<Profile>(id).await? else {
            return Ok(None);
        };

        if profile.login_token.is_none() {
            let token = generate_login_token();
            let updated = self
                .collection
                .set_fields(
                    Filter::by_id(id).eq("login_token", Value::Null),
                    vec![("login_token", Value::String(token.clone()))],
                )
                .await?;

            if updated > 0 {
                debug!(user_id = %id, "backfilled login token");
                profile.login_token = Some(token);
            } else {
                // A concurrent read won the backfill; use its token.
                return self.collection.get_as::<Profile>(id).await;
            }
        }

        Ok(Some(profile))
    }

    /// Profiles for every existing id, ordered by id.
    pub async fn get_many(&self, ids: &[RecordId]) -> Result<Vec<Profile>> {
        self.collection.get_many_as(ids).await
    }

    /// Replace the password after checking the old one.  Also rotates the
    /// login token so previously issued QR codes stop working.
    pub async fn change_password(
        &self,
        id: RecordId,
        old_password: &str,
        new_password: &str,
    ) -> Result<bool> {
        let Some(user) = self.collection.get(id).await? else {
            return Ok(false);
        };
        if !self.verify_password(old_password, user.password_hash).await? {
            debug!(user_id = %id, "password change refused");
            return Ok(false);
        }

        let password_hash = self.hash_password(new_password).await?;
        let updated = self
            .collection
            .set_fields(
                Filter::by_id(id),
                vec![
                    ("password_hash", Value::String(password_hash)),
                    ("login_token", Value::String(generate_login_token())),
                ],
            )
            .await?;
        Ok(updated > 0)
    }

    pub async fn change_picture(&self, id: RecordId, picture: &str) -> Result<bool> {
        let updated = self
            .collection
            .set_fields(
                Filter::by_id(id),
                vec![("picture", Value::String(picture.to_string()))],
            )
            .await?;
        Ok(updated > 0)
    }

    /// Id of the account matching the credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<RecordId>> {
        let Some(user) = self.collection.find(Filter::new().eq("email", email)).await? else {
            return Ok(None);
        };
        let id = user.id;
        let verified = self.verify_password(password, user.password_hash).await?;
        Ok(verified.then_some(id))
    }

    pub async fn login_from_token(&self, token: &str) -> Result<Option<RecordId>> {
        let user = self
            .collection
            .find_as::<Profile>(Filter::new().eq("login_token", token))
            .await?;
        Ok(user.map(|user| user.id))
    }

    // Key stretching is CPU-bound; keep it off the async workers.
    async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        Ok(tokio::task::spawn_blocking(move || hasher.hash(&password)).await??)
    }

    async fn verify_password(&self, password: &str, stored: String) -> Result<bool> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&password, &stored)).await?)
    }
}

#[async_trait]
impl ProfileLookup for Users {
    async fn profiles(&self, ids: &[RecordId]) -> Result<Vec<PublicProfile>> {
        self.collection.get_many_as(ids).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    use clipthread_shared::{CredentialError, Pbkdf2Hasher};
    use tokio::sync::mpsc::UnboundedSender;

    use super::*;

    fn users() -> Users {
        Users::new(
            Database::open_in_memory().unwrap(),
            Arc::new(Pbkdf2Hasher::new(1_000)),
        )
    }

    #[tokio::test]
    async fn test_email_is_unique() {
        let users = users();
        let first = users
            .add("ann@example.org", "pw", NewUser::default())
            .await
            .unwrap();
        assert!(first.is_some());

        let again = users
            .add("ann@example.org", "other", NewUser::default())
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_get_hides_password_and_sets_origin() {
        let users = users();
        let id = users
            .add(
                "ann@example.org",
                "pw",
                NewUser {
                    name: "Ann".to_string(),
                    ..NewUser::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        let profile = users.get(id).await.unwrap().unwrap();
        assert_eq!(profile.name, "Ann");
        assert_eq!(profile.origin, "genuine");
        assert!(profile.login_token.is_some());
        assert!(users.get(RecordId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_legacy_record_gets_login_token() {
        let users = users();
        let legacy = User {
            id: RecordId::new(),
            email: "old@example.org".to_string(),
            password_hash: Pbkdf2Hasher::new(1_000).hash("pw").unwrap(),
            name: String::new(),
            picture: String::new(),
            login_token: None,
            origin: "import".to_string(),
        };
        users.collection.insert(&legacy).await.unwrap();

        let first = users.get(legacy.id).await.unwrap().unwrap();
        let token = first.login_token.expect("token backfilled");

        let second = users.get(legacy.id).await.unwrap().unwrap();
        assert_eq!(second.login_token.as_deref(), Some(token.as_str()));
        assert_eq!(users.login_from_token(&token).await.unwrap(), Some(legacy.id));
    }

    #[tokio::test]
    async fn test_login_and_password_change() {
        let users = users();
        let id = users
            .add("ann@example.org", "old", NewUser::default())
            .await
            .unwrap()
            .unwrap();
        let token = users.get(id).await.unwrap().unwrap().login_token.unwrap();

        assert_eq!(users.login("ann@example.org", "old").await.unwrap(), Some(id));
        assert_eq!(users.login("ann@example.org", "bad").await.unwrap(), None);
        assert_eq!(users.login("nobody@example.org", "old").await.unwrap(), None);

        assert!(!users.change_password(id, "wrong", "new").await.unwrap());
        assert!(users.change_password(id, "old", "new").await.unwrap());

        assert_eq!(users.login("ann@example.org", "new").await.unwrap(), Some(id));
        assert_eq!(users.login_from_token(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_change_picture() {
        let users = users();
        let id = users
            .add("ann@example.org", "pw", NewUser::default())
            .await
            .unwrap()
            .unwrap();

        assert!(users.change_picture(id, "ann.png").await.unwrap());
        assert_eq!(users.get(id).await.unwrap().unwrap().picture, "ann.png");
        assert!(!users.change_picture(RecordId::new(), "x.png").await.unwrap());
    }

    /// Hasher that announces each call, then blocks its thread until it is
    /// released.
    struct GatedHasher {
        inner: Pbkdf2Hasher,
        started: UnboundedSender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl GatedHasher {
        fn wait(&self) -> bool {
            let _ = self.started.send(());
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .is_ok()
        }
    }

    impl CredentialHasher for GatedHasher {
        fn hash(&self, password: &str) -> std::result::Result<String, CredentialError> {
            if !self.wait() {
                return Err(CredentialError::Rng("hasher never released".to_string()));
            }
            self.inner.hash(password)
        }

        fn verify(&self, password: &str, stored: &str) -> bool {
            self.wait() && self.inner.verify(password, stored)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_password_work_leaves_the_runtime_free() {
        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
        let (release_tx, release_rx) = mpsc::channel();
        let users = Users::new(
            Database::open_in_memory().unwrap(),
            Arc::new(GatedHasher {
                inner: Pbkdf2Hasher::new(1_000),
                started: started_tx,
                release: Mutex::new(release_rx),
            }),
        );

        // Only a task on this same single-threaded runtime can release the
        // hasher, so it must not be running on the runtime's thread.
        tokio::spawn(async move {
            while started_rx.recv().await.is_some() {
                if release_tx.send(()).is_err() {
                    break;
                }
            }
        });

        let id = users
            .add("ann@example.org", "pw", NewUser::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(users.login("ann@example.org", "pw").await.unwrap(), Some(id));
        assert!(users.change_password(id, "pw", "new").await.unwrap());
        assert_eq!(users.login("ann@example.org", "new").await.unwrap(), Some(id));
    }
}
