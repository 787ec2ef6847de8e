use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    api::{
        self, Author, Comment, CommentId, Error, Page, PostId, UserId, ValidationError,
        DEFAULT_PAGE_SIZE,
    },
    Identity, TokenStore, Transport,
};

/// Username shown on optimistic comments when the token carries none
pub const SELF_USERNAME: &str = "You";

/// Username shown on optimistic comments when the acting user is unknown
pub const UNKNOWN_USERNAME: &str = "Someone";

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Number of comments requested when (re)loading a post
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> StoreConfig {
        StoreConfig {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// What observers of a post see
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentsState {
    /// Display order: newest optimistic additions first, then server order
    pub comments: Vec<Comment>,
    pub loading: bool,

    /// Error of the last fetch, displayed alongside the last known good comments
    pub error: Option<Error>,
}

struct Entry {
    state: watch::Sender<CommentsState>,

    // Each fetch gets a new generation, and a response is only applied if its
    // generation is still the one in `fetching`
    generation: u64,
    fetching: Option<u64>,

    fetched: bool,
}

impl Entry {
    fn new() -> Entry {
        let (state, _) = watch::channel(CommentsState::default());
        Entry {
            state,
            generation: 0,
            fetching: None,
            fetched: false,
        }
    }

    fn start_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.fetching = Some(self.generation);
        self.state.send_modify(|s| s.loading = true);
        self.generation
    }
}

struct Shared {
    transport: Box<dyn Transport>,
    identity: Box<dyn Identity>,
    tokens: Box<dyn TokenStore>,
    config: StoreConfig,
    cache: Mutex<HashMap<PostId, Entry>>,
}

/// Process-wide comment cache, shared by every view of a post
///
/// Cloning a `Store` is cheap and gives another handle to the same cache. All
/// cache updates happen synchronously between network calls, under a lock that
/// is never held across an `.await`.
///
/// Network calls run on tasks owned by the store: a caller that stops waiting
/// for a fetch or a mutation does not cancel it, and its answer still lands in
/// the cache. This needs a tokio runtime.
///
/// Mutations are applied optimistically before their network call and rolled
/// back if it fails. Mutations on the same post are not serialized: rollbacks
/// are expressed as inverse operations on the current comment list (remove the
/// placeholder, re-insert the deleted comment next to its old neighbours,
/// restore the edited comment) so that they do not clobber what a concurrent
/// mutation did in the meantime.
#[derive(Clone)]
pub struct Store(Arc<Shared>);

/// Waits for a store-owned task, turning its abandonment into an error
async fn join<T>(task: JoinHandle<Result<T, Error>>) -> Result<T, Error> {
    match task.await {
        Ok(res) => res,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(Error::Network(format!("request abandoned: {err}"))),
    }
}

impl Store {
    pub fn new<T, I, S>(transport: T, identity: I, tokens: S, config: StoreConfig) -> Store
    where
        T: 'static + Transport,
        I: 'static + Identity,
        S: 'static + TokenStore,
    {
        Store(Arc::new(Shared {
            transport: Box::new(transport),
            identity: Box::new(identity),
            tokens: Box::new(tokens),
            config,
            cache: Mutex::new(HashMap::new()),
        }))
    }

    /// Returns a live view of the comments of `post`, right away
    ///
    /// Only the first subscription to a post fetches its comments, in the
    /// background: its view starts out `loading`. Later subscriptions share
    /// the cached state, even if that fetch is still in flight.
    pub fn subscribe(&self, post: &PostId) -> Subscription {
        let (receiver, fetch) = {
            let mut cache = self.0.cache.lock();
            let entry = cache.entry(post.clone()).or_insert_with(Entry::new);
            let fetch = (!entry.fetched && entry.fetching.is_none()).then(|| entry.start_fetch());
            (entry.state.subscribe(), fetch)
        };
        if let Some(generation) = fetch {
            tracing::debug!(%post, "first subscription to post, fetching comments");
            // a failure is reported through the subscription's state
            drop(self.spawn_fetch(post, generation));
        }
        Subscription {
            store: self.clone(),
            post: post.clone(),
            receiver,
        }
    }

    /// Reloads the comments of `post`, replacing the cached list wholesale
    ///
    /// On failure the cached list is kept and the error is both returned and
    /// published to the observers.
    pub async fn refetch(&self, post: &PostId) -> Result<(), Error> {
        let generation = self
            .0
            .cache
            .lock()
            .entry(post.clone())
            .or_insert_with(Entry::new)
            .start_fetch();
        tracing::debug!(%post, generation, "refetching comments");
        join(self.spawn_fetch(post, generation)).await
    }

    /// Current cached state of `post`, if it was ever loaded or mutated
    pub fn snapshot(&self, post: &PostId) -> Option<CommentsState> {
        self.0
            .cache
            .lock()
            .get(post)
            .map(|e| e.state.borrow().clone())
    }

    fn spawn_fetch(&self, post: &PostId, generation: u64) -> JoinHandle<Result<(), Error>> {
        let store = self.clone();
        let post = post.clone();
        tokio::spawn(async move { store.fetch(&post, generation).await })
    }

    async fn fetch(&self, post: &PostId, generation: u64) -> Result<(), Error> {
        let page = Page::first(self.0.config.page_size);
        let res = self.0.transport.list_comments(post, page).await;

        let mut cache = self.0.cache.lock();
        let entry = match cache.get_mut(post) {
            Some(entry) if entry.fetching == Some(generation) => entry,
            _ => {
                tracing::debug!(%post, generation, "discarding superseded comment list");
                return res.map(|_| ());
            }
        };
        entry.fetching = None;
        entry.fetched = true;
        match res {
            Ok(comments) => {
                tracing::debug!(%post, num_comments = comments.len(), "fetched comments");
                entry.state.send_modify(|s| {
                    s.comments = comments;
                    s.loading = false;
                    s.error = None;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%post, %err, "failed fetching comments, keeping cached ones");
                entry.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(err.clone());
                });
                Err(err)
            }
        }
    }

    fn modify(&self, post: &PostId, f: impl FnOnce(&mut Vec<Comment>)) {
        let mut cache = self.0.cache.lock();
        let entry = cache.entry(post.clone()).or_insert_with(|| {
            // mutating a post that was never loaded makes its list the known state
            let mut e = Entry::new();
            e.fetched = true;
            e
        });
        entry.state.send_modify(|s| f(&mut s.comments));
    }

    fn acting_author(&self) -> Author {
        match self.0.identity.current_user_id() {
            Some(id) => Author {
                id,
                username: self
                    .0
                    .identity
                    .current_username()
                    .unwrap_or_else(|| String::from(SELF_USERNAME)),
                profile_pic: None,
            },
            None => Author {
                id: UserId::unknown(),
                username: String::from(UNKNOWN_USERNAME),
                profile_pic: None,
            },
        }
    }

    /// Posts a new comment on `post`, showing it at the top of the list right away
    pub async fn add(&self, post: &PostId, content: &str) -> Result<Comment, Error> {
        let content = api::validate_content(content)?;
        let token = self.0.tokens.access_token().ok_or(Error::AuthRequired)?;

        let placeholder = Comment::placeholder(
            post.clone(),
            content.clone(),
            self.acting_author(),
            Utc::now(),
        );
        let temp_id = placeholder.id.clone();
        self.modify(post, |comments| comments.insert(0, placeholder));
        let rollback = {
            let temp_id = temp_id.clone();
            move |comments: &mut Vec<Comment>| comments.retain(|c| c.id != temp_id)
        };
        let pending = Pending::new(self, post, "comment creation", rollback);

        let store = self.clone();
        let post = post.clone();
        join(tokio::spawn(async move {
            let res = store
                .0
                .transport
                .create_comment(&post, &content, Some(&token))
                .await;
            match res {
                Ok(created) => {
                    tracing::info!(%post, comment = %created.id, "comment created");
                    let confirmed = created.clone();
                    pending.confirm(move |comments| {
                        match comments.iter_mut().find(|c| c.id == temp_id) {
                            Some(slot) => *slot = confirmed,
                            None => tracing::debug!(
                                placeholder = %temp_id,
                                "placeholder was dropped by a refetch before confirmation"
                            ),
                        }
                    });
                    Ok(created)
                }
                Err(err) => {
                    pending.fail(&err);
                    Err(err)
                }
            }
        }))
        .await
    }

    /// Changes the content of one of the comments of `post`
    pub async fn edit(
        &self,
        post: &PostId,
        comment: &CommentId,
        content: &str,
    ) -> Result<Comment, Error> {
        let content = api::validate_content(content)?;
        if comment.is_temporary() {
            return Err(ValidationError::Unconfirmed.into());
        }
        let token = self.0.tokens.access_token().ok_or(Error::AuthRequired)?;

        let mut previous = None;
        let now = Utc::now();
        self.modify(post, |comments| {
            if let Some(c) = comments.iter_mut().find(|c| c.id == *comment) {
                previous = Some(c.clone());
                c.content = content.clone();
                c.updated_at = now;
            }
        });
        let rollback = move |comments: &mut Vec<Comment>| {
            let Some(previous) = previous else { return };
            if let Some(c) = comments.iter_mut().find(|c| c.id == previous.id) {
                *c = previous;
            }
        };
        let pending = Pending::new(self, post, "comment edition", rollback);

        let store = self.clone();
        let post = post.clone();
        let comment = comment.clone();
        join(tokio::spawn(async move {
            let res = store
                .0
                .transport
                .update_comment(&comment, &content, Some(&token))
                .await;
            match res {
                Ok(updated) => {
                    tracing::info!(%post, %comment, "comment edited");
                    let confirmed = updated.clone();
                    pending.confirm(move |comments| {
                        if let Some(c) = comments.iter_mut().find(|c| c.id == confirmed.id) {
                            *c = confirmed;
                        }
                    });
                    Ok(updated)
                }
                Err(err) => {
                    pending.fail(&err);
                    Err(err)
                }
            }
        }))
        .await
    }

    /// Deletes one of the comments of `post`, hiding it right away
    ///
    /// A comment the server no longer knows about counts as deleted.
    pub async fn delete(&self, post: &PostId, comment: &CommentId) -> Result<(), Error> {
        if comment.is_temporary() {
            return Err(ValidationError::Unconfirmed.into());
        }
        let token = self.0.tokens.access_token().ok_or(Error::AuthRequired)?;

        let mut removed = None;
        self.modify(post, |comments| {
            if let Some(idx) = comments.iter().position(|c| c.id == *comment) {
                let before = idx.checked_sub(1).map(|i| comments[i].id.clone());
                let after = comments.get(idx + 1).map(|c| c.id.clone());
                removed = Some((comments.remove(idx), before, after));
            }
        });
        let rollback = move |comments: &mut Vec<Comment>| {
            let Some((removed, before, after)) = removed else { return };
            if comments.iter().any(|c| c.id == removed.id) {
                return;
            }
            let position = |id: &Option<CommentId>| {
                let id = id.as_ref()?;
                comments.iter().position(|c| c.id == *id)
            };
            let idx = match (position(&before), position(&after)) {
                (Some(before), _) => before + 1,
                (None, Some(after)) => after,
                (None, None) => comments.len(),
            };
            comments.insert(idx, removed);
        };
        let pending = Pending::new(self, post, "comment deletion", rollback);

        let store = self.clone();
        let post = post.clone();
        let comment = comment.clone();
        join(tokio::spawn(async move {
            match store.0.transport.delete_comment(&comment, Some(&token)).await {
                Ok(()) => {
                    tracing::info!(%post, %comment, "comment deleted");
                    pending.done();
                    Ok(())
                }
                Err(err) if err.status() == Some(404) => {
                    tracing::info!(%post, %comment, "comment was already deleted");
                    pending.done();
                    Ok(())
                }
                Err(err) => {
                    pending.fail(&err);
                    Err(err)
                }
            }
        }))
        .await
    }
}

type Rollback = Box<dyn FnOnce(&mut Vec<Comment>) + Send>;

/// An optimistic mutation waiting for the server's answer
///
/// It must be resolved exactly once: confirmed, failed, or rolled back when
/// dropped unresolved (ie. its task was torn down with the runtime).
struct Pending {
    store: Store,
    post: PostId,
    what: &'static str,
    rollback: Option<Rollback>,
}

impl Pending {
    fn new(
        store: &Store,
        post: &PostId,
        what: &'static str,
        rollback: impl 'static + Send + FnOnce(&mut Vec<Comment>),
    ) -> Pending {
        Pending {
            store: store.clone(),
            post: post.clone(),
            what,
            rollback: Some(Box::new(rollback)),
        }
    }

    fn done(mut self) {
        self.rollback = None;
    }

    fn confirm(mut self, f: impl FnOnce(&mut Vec<Comment>)) {
        self.rollback = None;
        self.store.modify(&self.post, f);
    }

    fn fail(mut self, err: &Error) {
        tracing::warn!(post = %self.post, %err, "{} failed, rolling back", self.what);
        if let Some(rollback) = self.rollback.take() {
            self.store.modify(&self.post, rollback);
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(rollback) = self.rollback.take() {
            tracing::warn!(post = %self.post, "{} abandoned, rolling back", self.what);
            self.store.modify(&self.post, rollback);
        }
    }
}

/// Live view of the comments of one post
pub struct Subscription {
    store: Store,
    post: PostId,
    receiver: watch::Receiver<CommentsState>,
}

impl Subscription {
    pub fn post(&self) -> &PostId {
        &self.post
    }

    pub fn current(&self) -> CommentsState {
        self.receiver.borrow().clone()
    }

    /// Waits for the next change to the post's comments and returns the new state
    pub async fn changed(&mut self) -> CommentsState {
        if self.receiver.changed().await.is_err() {
            // cache entries are never evicted while a store handle is alive
            tracing::error!(post = %self.post, "comment cache entry vanished");
        }
        self.current()
    }

    /// Waits until the post's comments are not loading anymore
    pub async fn ready(&mut self) -> CommentsState {
        loop {
            let state = self.receiver.borrow_and_update().clone();
            if !state.loading {
                return state;
            }
            if self.receiver.changed().await.is_err() {
                tracing::error!(post = %self.post, "comment cache entry vanished");
                return self.current();
            }
        }
    }

    /// Makes this view follow `post` instead, right away
    ///
    /// Any fetch still running for the previous post keeps updating that
    /// post's cache entry only, so its answer never shows up here.
    pub fn switch_to(&mut self, post: &PostId) {
        *self = self.store.subscribe(post);
    }
}
