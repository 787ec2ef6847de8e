use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use futures::channel::oneshot;
use parking_lot::{Mutex, MutexGuard};
use snapshare_client::{
    api::{AuthToken, Comment, CommentId, Error, Page, PostId},
    Transport,
};

use crate::MockServer;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Op {
    List,
    Create,
    Update,
    Delete,
}

/// Number of requests that reached the transport, per operation
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Calls {
    pub list: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.list + self.create + self.update + self.delete
    }
}

#[derive(Default)]
struct Control {
    calls: Calls,
    failures: HashMap<Op, VecDeque<Error>>,
    paused: bool,
    held: VecDeque<(Op, oneshot::Sender<()>)>,
}

/// `Transport` backed by a `MockServer`, whose requests can be held back and
/// released one by one or made to fail
///
/// Clones share both the server and the request control.
#[derive(Clone)]
pub struct MockTransport {
    server: Arc<Mutex<MockServer>>,
    control: Arc<Mutex<Control>>,
}

impl MockTransport {
    pub fn new(server: MockServer) -> MockTransport {
        MockTransport {
            server: Arc::new(Mutex::new(server)),
            control: Arc::new(Mutex::new(Control::default())),
        }
    }

    /// Direct access to the server, bypassing pausing and injected failures
    pub fn server(&self) -> MutexGuard<'_, MockServer> {
        self.server.lock()
    }

    pub fn calls(&self) -> Calls {
        self.control.lock().calls
    }

    /// Makes the next request of kind `op` fail with `err` once it is released
    pub fn fail_next(&self, op: Op, err: Error) {
        self.control
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Holds every subsequent request until it gets released
    pub fn pause(&self) {
        self.control.lock().paused = true;
    }

    /// Stops holding requests and releases the held ones
    pub fn resume(&self) {
        self.control.lock().paused = false;
        self.release_all();
    }

    pub fn held(&self) -> Vec<Op> {
        self.control.lock().held.iter().map(|(op, _)| *op).collect()
    }

    /// Lets the oldest held request through, returning its kind
    pub fn release_first(&self) -> Option<Op> {
        let (op, tx) = self.control.lock().held.pop_front()?;
        let _ = tx.send(());
        Some(op)
    }

    /// Lets the most recent held request through, returning its kind
    pub fn release_last(&self) -> Option<Op> {
        let (op, tx) = self.control.lock().held.pop_back()?;
        let _ = tx.send(());
        Some(op)
    }

    pub fn release_all(&self) {
        let held = std::mem::take(&mut self.control.lock().held);
        for (_, tx) in held {
            let _ = tx.send(());
        }
    }

    /// Yields to the runtime until at least `n` requests are held
    pub async fn wait_until_held(&self, n: usize) {
        while self.control.lock().held.len() < n {
            tokio::task::yield_now().await;
        }
    }

    async fn gate(&self, op: Op) -> Result<(), Error> {
        let wait = {
            let mut control = self.control.lock();
            match op {
                Op::List => control.calls.list += 1,
                Op::Create => control.calls.create += 1,
                Op::Update => control.calls.update += 1,
                Op::Delete => control.calls.delete += 1,
            }
            control.paused.then(|| {
                let (tx, rx) = oneshot::channel();
                control.held.push_back((op, tx));
                rx
            })
        };
        if let Some(rx) = wait {
            // a dropped sender counts as a release
            let _ = rx.await;
        }
        let failure = self
            .control
            .lock()
            .failures
            .get_mut(&op)
            .and_then(|f| f.pop_front());
        match failure {
            Some(err) => {
                tracing::debug!(?op, %err, "mock transport failing request on purpose");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn list_comments(&self, post: &PostId, page: Page) -> Result<Vec<Comment>, Error> {
        self.gate(Op::List).await?;
        self.server.lock().list_comments(post, page)
    }

    async fn create_comment(
        &self,
        post: &PostId,
        content: &str,
        token: Option<&AuthToken>,
    ) -> Result<Comment, Error> {
        self.gate(Op::Create).await?;
        let token = token.ok_or(Error::AuthRequired)?;
        self.server.lock().create_comment(post, content, token)
    }

    async fn update_comment(
        &self,
        comment: &CommentId,
        content: &str,
        token: Option<&AuthToken>,
    ) -> Result<Comment, Error> {
        self.gate(Op::Update).await?;
        let token = token.ok_or(Error::AuthRequired)?;
        self.server.lock().update_comment(comment, content, token)
    }

    async fn delete_comment(
        &self,
        comment: &CommentId,
        token: Option<&AuthToken>,
    ) -> Result<(), Error> {
        self.gate(Op::Delete).await?;
        let token = token.ok_or(Error::AuthRequired)?;
        self.server.lock().delete_comment(comment, token)
    }
}
