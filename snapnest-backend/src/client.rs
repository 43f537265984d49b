use crate::{
    error::{BackendError, Result},
    record::{
        ACCOUNT_ID_ATTRIBUTE, CAPTION_ATTRIBUTE, CREATOR_ATTRIBUTE, FOLLOWERS_ATTRIBUTE,
        FOLLOWING_ATTRIBUTE, LIKES_ATTRIBUTE, PostData, PostPatch, PostRecord,
        SAVED_POST_ATTRIBUTE, SAVED_USER_ATTRIBUTE, SavedPostData, SavedPostRecord, UserData,
        UserPatch, UserRecord,
    },
    service::{
        Accounts, CREATED_AT_ATTRIBUTE, Collection, Databases, Document, ListQuery, Permission,
        Storage, UPDATED_AT_ATTRIBUTE,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use snapnest_common::{
    model::{
        Id, ModelValidationError, SnapnestSnowflakeGenerator,
        auth::{Account, AccountMarker, Credentials, Session},
        file::{FileMarker, ImageRef, NewFile, StoredFile},
        post::{NewPost, Post, PostMarker, UpdatePost},
        saved::{SavedPost, SavedPostMarker},
        user::{NewUser, NewUserDocument, UpdateUser, User, UserMarker},
    },
    util::parse_tags,
};
use std::{
    collections::BTreeSet,
    fmt::{Debug, Display, Formatter},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, error, info, warn};
use url::Url;

pub const RECENT_POSTS_LIMIT: u32 = 20;
pub const INFINITE_POSTS_PAGE_SIZE: u32 = 9;

/// Both sides of a follow toggle, as written.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FollowOutcome {
    /// Whether the acting user follows the target afterwards.
    pub following: bool,
    pub target: User,
    pub acting: User,
}

pub struct BackendClient {
    databases: Arc<dyn Databases>,
    storage: Arc<dyn Storage>,
    accounts: Arc<dyn Accounts>,
    snowflake_generator: Mutex<SnapnestSnowflakeGenerator>,
}

impl Debug for BackendClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}

fn to_map<T: Serialize + ?Sized>(value: &T) -> Result<Map<String, Value>> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}

fn decode<R, T>(document: &Document) -> Result<T>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = ModelValidationError>,
{
    let record: R = document.decode()?;
    Ok(T::try_from(record)?)
}

/// Decodes a listing. Documents that are not in this client's shape, such as
/// ones written with service-generated ids, are logged and left out so one of
/// them cannot hide the rest.
fn decode_all<R, T>(documents: &[Document]) -> Vec<T>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = ModelValidationError>,
{
    documents
        .iter()
        .filter_map(|document| {
            decode::<R, T>(document)
                .inspect_err(|err| {
                    warn!(
                        error = %err,
                        document_id = %document.id,
                        "Skipping undecodable document"
                    );
                })
                .ok()
        })
        .collect()
}

impl BackendClient {
    #[must_use]
    pub fn new(
        databases: Arc<dyn Databases>,
        storage: Arc<dyn Storage>,
        accounts: Arc<dyn Accounts>,
    ) -> Self {
        Self {
            databases,
            storage,
            accounts,
            snowflake_generator: Mutex::new(SnapnestSnowflakeGenerator::with_random_origin()),
        }
    }

    /// Uses one backend for documents, files and accounts alike.
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: Databases + Storage + Accounts + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend)
    }

    fn next_id<Marker>(&self) -> Id<Marker> {
        self.snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()
            .into()
    }

    async fn create<T>(
        &self,
        collection: Collection,
        document_id: impl Display,
        data: &T,
    ) -> Result<Document>
    where
        T: Serialize + Sync + ?Sized,
    {
        let data = to_map(data)?;
        self.databases
            .create_document(collection, &document_id.to_string(), data)
            .await
    }

    async fn update<T>(
        &self,
        collection: Collection,
        document_id: impl Display,
        data: &T,
    ) -> Result<Document>
    where
        T: Serialize + Sync + ?Sized,
    {
        let data = to_map(data)?;
        self.databases
            .update_document(collection, &document_id.to_string(), data)
            .await
    }

    // Accounts

    pub async fn create_user_account(&self, new_user: NewUser) -> Result<User> {
        let account_id: Id<AccountMarker> = self.next_id();
        let account = self
            .accounts
            .create_account(
                &account_id.to_string(),
                &new_user.email,
                &new_user.password,
                &new_user.name,
            )
            .await
            .inspect_err(|err| warn!(error = %err, "Could not create account"))?;
        let account = Account::try_from(account)?;

        let image_url = self.accounts.avatar_initials_url(&account.name)?;

        let user = self
            .save_user_to_db(NewUserDocument {
                account_id: account.id,
                name: account.name,
                username: new_user.username,
                email: account.email,
                image_url,
            })
            .await?;
        info!(user_id = %user.id, account_id = %user.account_id, "Created user account");
        Ok(user)
    }

    pub async fn save_user_to_db(&self, new_user: NewUserDocument) -> Result<User> {
        let user_id: Id<UserMarker> = self.next_id();
        let data = UserData {
            account_id: new_user.account_id.to_string(),
            name: &new_user.name,
            username: new_user.username.get(),
            email: &new_user.email,
            image_url: new_user.image_url.as_str(),
        };

        let document = self
            .create(Collection::Users, user_id, &data)
            .await
            .inspect_err(|err| error!(error = %err, "Could not save user document"))?;
        decode::<UserRecord, _>(&document)
    }

    pub async fn sign_in_account(&self, credentials: &Credentials) -> Result<Session> {
        let session = self
            .accounts
            .create_email_password_session(&credentials.email, &credentials.password)
            .await
            .inspect_err(|err| debug!(error = %err, "Sign in rejected"))?;
        Ok(Session::try_from(session)?)
    }

    pub async fn get_current_account(&self) -> Result<Account> {
        let account = self.accounts.get_account().await?;
        Ok(Account::try_from(account)?)
    }

    /// The user document belonging to the signed-in account.
    pub async fn get_current_user(&self) -> Result<User> {
        let account = self.get_current_account().await?;

        let list = self
            .databases
            .list_documents(
                Collection::Users,
                &[ListQuery::equal(ACCOUNT_ID_ATTRIBUTE, account.id)],
            )
            .await?;

        let document = list.documents.first().ok_or_else(|| {
            BackendError::NotFound(format!("user document for account {}", account.id))
        })?;
        decode::<UserRecord, _>(document)
    }

    pub async fn sign_out_account(&self) -> Result<()> {
        self.accounts.delete_session("current").await?;
        debug!("Signed out");
        Ok(())
    }

    // Files

    pub async fn upload_file(&self, file: NewFile) -> Result<StoredFile> {
        let file_id: Id<FileMarker> = self.next_id();
        let record = self
            .storage
            .create_file(&file_id.to_string(), file, &[Permission::ReadAny])
            .await
            .inspect_err(|err| error!(error = %err, "Could not upload file"))?;
        Ok(StoredFile::try_from(record)?)
    }

    pub fn get_file_preview(&self, file_id: Id<FileMarker>) -> Result<Url> {
        self.storage.file_view_url(&file_id.to_string())
    }

    pub async fn delete_file(&self, file_id: Id<FileMarker>) -> Result<()> {
        self.storage.delete_file(&file_id.to_string()).await
    }

    /// Deletes a file whose owning write failed or was superseded. Failures
    /// only leave an orphaned file behind, so they are logged.
    async fn discard_file(&self, file_id: Id<FileMarker>) {
        if let Err(err) = self.delete_file(file_id).await {
            warn!(error = %err, %file_id, "Could not delete orphaned file");
        }
    }

    /// Uploads an image and resolves the URL it is displayed from.
    async fn upload_image(&self, file: NewFile) -> Result<ImageRef> {
        let stored = self.upload_file(file).await?;

        match self.get_file_preview(stored.id) {
            Ok(url) => Ok(ImageRef {
                url,
                file_id: stored.id,
            }),
            Err(err) => {
                self.discard_file(stored.id).await;
                Err(err)
            }
        }
    }

    // Posts

    pub async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        let image = self.upload_image(new_post.file).await?;

        let post_id: Id<PostMarker> = self.next_id();
        let tags = parse_tags(&new_post.tags);
        let data = PostData {
            creator: new_post.creator.to_string(),
            caption: &new_post.caption,
            image_url: image.url.as_str(),
            image_id: image.file_id.to_string(),
            location: new_post.location.as_deref(),
            tags: &tags,
            likes: Vec::new(),
        };

        let document = match self.create(Collection::Posts, post_id, &data).await {
            Ok(document) => document,
            Err(err) => {
                error!(error = %err, "Could not create post, removing its image");
                self.discard_file(image.file_id).await;
                return Err(err);
            }
        };

        info!(%post_id, creator = %new_post.creator, "Created post");
        decode::<PostRecord, _>(&document)
    }

    /// Replaces the post's fields. A new image is uploaded first; the old one
    /// is deleted once the document points at the new one, and the new one is
    /// deleted if the document write fails.
    pub async fn update_post(&self, update: UpdatePost) -> Result<Post> {
        let replacement = match update.file {
            Some(file) => Some(self.upload_image(file).await?),
            None => None,
        };
        let image = replacement.as_ref().unwrap_or(&update.image);

        let tags = parse_tags(&update.tags);
        let patch = PostPatch {
            caption: &update.caption,
            image_url: image.url.as_str(),
            image_id: image.file_id.to_string(),
            location: update.location.as_deref(),
            tags: &tags,
        };

        let document = match self.update(Collection::Posts, update.post_id, &patch).await {
            Ok(document) => document,
            Err(err) => {
                error!(error = %err, post_id = %update.post_id, "Could not update post");
                if let Some(replacement) = &replacement {
                    self.discard_file(replacement.file_id).await;
                }
                return Err(err);
            }
        };

        if replacement.is_some() {
            self.discard_file(update.image.file_id).await;
        }
        decode::<PostRecord, _>(&document)
    }

    pub async fn delete_post(
        &self,
        post_id: Id<PostMarker>,
        image_id: Id<FileMarker>,
    ) -> Result<()> {
        self.databases
            .delete_document(Collection::Posts, &post_id.to_string())
            .await
            .inspect_err(|err| error!(error = %err, %post_id, "Could not delete post"))?;
        self.discard_file(image_id).await;

        info!(%post_id, "Deleted post");
        Ok(())
    }

    async fn list_posts(&self, queries: &[ListQuery]) -> Result<Vec<Post>> {
        let list = self
            .databases
            .list_documents(Collection::Posts, queries)
            .await?;
        Ok(decode_all::<PostRecord, _>(&list.documents))
    }

    pub async fn get_recent_posts(&self) -> Result<Vec<Post>> {
        self.list_posts(&[
            ListQuery::order_desc(CREATED_AT_ATTRIBUTE),
            ListQuery::Limit(RECENT_POSTS_LIMIT),
        ])
        .await
    }

    /// One page of the explore feed, most recently updated first. `cursor` is
    /// the last post of the previous page.
    pub async fn get_infinite_posts(&self, cursor: Option<Id<PostMarker>>) -> Result<Vec<Post>> {
        let mut queries = vec![
            ListQuery::order_desc(UPDATED_AT_ATTRIBUTE),
            ListQuery::Limit(INFINITE_POSTS_PAGE_SIZE),
        ];
        if let Some(cursor) = cursor {
            queries.push(ListQuery::cursor_after(cursor));
        }

        self.list_posts(&queries).await
    }

    pub async fn search_posts(&self, term: &str) -> Result<Vec<Post>> {
        self.list_posts(&[ListQuery::search(CAPTION_ATTRIBUTE, term)])
            .await
    }

    /// Replaces the post's set of likers.
    pub async fn like_post(
        &self,
        post_id: Id<PostMarker>,
        likes: &BTreeSet<Id<UserMarker>>,
    ) -> Result<Post> {
        let mut patch = Map::new();
        patch.insert(LIKES_ATTRIBUTE.to_owned(), serde_json::to_value(likes)?);

        let document = self.update(Collection::Posts, post_id, &patch).await?;
        decode::<PostRecord, _>(&document)
    }

    pub async fn get_post_by_id(&self, post_id: Id<PostMarker>) -> Result<Post> {
        let document = self
            .databases
            .get_document(Collection::Posts, &post_id.to_string())
            .await?;
        decode::<PostRecord, _>(&document)
    }

    pub async fn get_user_posts(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        self.list_posts(&[
            ListQuery::equal(CREATOR_ATTRIBUTE, user_id),
            ListQuery::order_desc(CREATED_AT_ATTRIBUTE),
        ])
        .await
    }

    pub async fn get_liked_posts(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        self.list_posts(&[
            ListQuery::contains(LIKES_ATTRIBUTE, user_id),
            ListQuery::order_desc(CREATED_AT_ATTRIBUTE),
        ])
        .await
    }

    // Saves

    pub async fn save_post(
        &self,
        user_id: Id<UserMarker>,
        post_id: Id<PostMarker>,
    ) -> Result<SavedPost> {
        let saved_id: Id<SavedPostMarker> = self.next_id();
        let data = SavedPostData {
            user: user_id.to_string(),
            post: post_id.to_string(),
        };

        let document = self.create(Collection::Saves, saved_id, &data).await?;
        decode::<SavedPostRecord, _>(&document)
    }

    pub async fn delete_saved_post(&self, saved_id: Id<SavedPostMarker>) -> Result<()> {
        self.databases
            .delete_document(Collection::Saves, &saved_id.to_string())
            .await
    }

    pub async fn find_saved_post(
        &self,
        user_id: Id<UserMarker>,
        post_id: Id<PostMarker>,
    ) -> Result<Option<SavedPost>> {
        let list = self
            .databases
            .list_documents(
                Collection::Saves,
                &[
                    ListQuery::equal(SAVED_USER_ATTRIBUTE, user_id),
                    ListQuery::equal(SAVED_POST_ATTRIBUTE, post_id),
                    ListQuery::Limit(1),
                ],
            )
            .await?;

        list.documents
            .first()
            .map(decode::<SavedPostRecord, _>)
            .transpose()
    }

    /// Posts saved by the user, most recently saved first. Saves pointing at
    /// deleted posts are skipped.
    pub async fn get_saved_posts(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        let list = self
            .databases
            .list_documents(
                Collection::Saves,
                &[
                    ListQuery::equal(SAVED_USER_ATTRIBUTE, user_id),
                    ListQuery::order_desc(CREATED_AT_ATTRIBUTE),
                ],
            )
            .await?;
        let saves: Vec<SavedPost> = decode_all::<SavedPostRecord, _>(&list.documents);

        let mut posts = Vec::with_capacity(saves.len());
        for save in saves {
            match self.get_post_by_id(save.post).await {
                Ok(post) => posts.push(post),
                Err(BackendError::NotFound(_)) => {
                    debug!(saved_id = %save.id, post_id = %save.post, "Skipping save of deleted post");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(posts)
    }

    // Users

    pub async fn get_users(&self, limit: Option<u32>) -> Result<Vec<User>> {
        let mut queries = vec![ListQuery::order_desc(CREATED_AT_ATTRIBUTE)];
        if let Some(limit) = limit {
            queries.push(ListQuery::Limit(limit));
        }

        let list = self
            .databases
            .list_documents(Collection::Users, &queries)
            .await?;
        Ok(decode_all::<UserRecord, _>(&list.documents))
    }

    pub async fn get_user_by_id(&self, user_id: Id<UserMarker>) -> Result<User> {
        let document = self
            .databases
            .get_document(Collection::Users, &user_id.to_string())
            .await?;
        decode::<UserRecord, _>(&document)
    }

    /// Same image handling as [`Self::update_post`]. A previous image is only
    /// deleted when the user had an uploaded one rather than a generated
    /// avatar.
    pub async fn update_user(&self, update: UpdateUser) -> Result<User> {
        let replacement = match update.file {
            Some(file) => Some(self.upload_image(file).await?),
            None => None,
        };
        let (image_url, image_id) = match &replacement {
            Some(image) => (&image.url, Some(image.file_id)),
            None => (&update.image_url, update.image_id),
        };

        let patch = UserPatch {
            name: &update.name,
            bio: update.bio.as_deref(),
            image_url: image_url.as_str(),
            image_id: image_id.map(|id| id.to_string()),
        };

        let document = match self.update(Collection::Users, update.user_id, &patch).await {
            Ok(document) => document,
            Err(err) => {
                error!(error = %err, user_id = %update.user_id, "Could not update user");
                if let Some(replacement) = &replacement {
                    self.discard_file(replacement.file_id).await;
                }
                return Err(err);
            }
        };

        if let (Some(_), Some(previous)) = (&replacement, update.image_id) {
            self.discard_file(previous).await;
        }
        decode::<UserRecord, _>(&document)
    }

    /// Toggles whether `acting_id` follows `target_id`. Both documents are read
    /// fresh, then the target's followers and the acting user's following are
    /// written one after the other. A failure of the second write leaves the
    /// first one in place. The direction is taken from the target's followers
    /// alone, and both sets are moved to match it.
    pub async fn follow_user(
        &self,
        target_id: Id<UserMarker>,
        acting_id: Id<UserMarker>,
    ) -> Result<FollowOutcome> {
        if target_id == acting_id {
            return Err(BackendError::InvalidInput(
                "users cannot follow themselves".to_owned(),
            ));
        }

        let mut target = self.get_user_by_id(target_id).await?;
        let mut acting = self.get_user_by_id(acting_id).await?;

        // Both sets move in the direction the target's followers dictate.
        let following = !target.followers.contains(&acting_id);
        if following {
            target.followers.insert(acting_id);
            acting.following.insert(target_id);
        } else {
            target.followers.remove(&acting_id);
            acting.following.remove(&target_id);
        }

        let mut followers_patch = Map::new();
        followers_patch.insert(
            FOLLOWERS_ATTRIBUTE.to_owned(),
            serde_json::to_value(&target.followers)?,
        );
        let target_document = self
            .update(Collection::Users, target_id, &followers_patch)
            .await?;

        let mut following_patch = Map::new();
        following_patch.insert(
            FOLLOWING_ATTRIBUTE.to_owned(),
            serde_json::to_value(&acting.following)?,
        );
        let acting_document = self
            .update(Collection::Users, acting_id, &following_patch)
            .await
            .inspect_err(|err| {
                error!(
                    error = %err,
                    %target_id,
                    %acting_id,
                    "Follow half-applied: followers written, following not"
                );
            })?;

        info!(%target_id, %acting_id, following, "Toggled follow");
        Ok(FollowOutcome {
            following,
            target: decode::<UserRecord, _>(&target_document)?,
            acting: decode::<UserRecord, _>(&acting_document)?,
        })
    }
}
