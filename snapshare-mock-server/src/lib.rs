use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde_json::json;
use snapshare_client::api::{
    self, AuthToken, Author, Comment, CommentId, Error, Page, PostId, Time, UserId, Uuid,
    MAX_COMMENT_CHARS,
};

mod transport;
pub use transport::{Calls, MockTransport, Op};

/// In-memory model of the backend's comment endpoints
pub struct MockServer {
    users: BTreeMap<UserId, MockUser>,
    sessions: HashMap<String, UserId>,
    posts: BTreeMap<PostId, Vec<StoredComment>>,
}

#[derive(Debug)]
struct MockUser {
    name: String,
    profile_pic: Option<String>,
}

#[derive(Debug)]
struct StoredComment {
    comment: Comment,
    deleted_at: Option<Time>,
}

fn reject(status: u16, detail: serde_json::Value) -> Error {
    let body = json!({ "detail": detail }).to_string();
    Error::from_response(status, None, body.as_bytes())
}

fn not_found(what: &str, id: &str) -> Error {
    reject(404, json!(format!("{what} with ID {id} not found")))
}

fn invalid_content(msg: &str) -> Error {
    reject(
        422,
        json!([{ "loc": ["body", "content"], "msg": msg, "type": "value_error" }]),
    )
}

/// Encodes `claims` the way the auth service does, signature excluded
pub fn fake_jwt(claims: &serde_json::Value) -> AuthToken {
    let enc = |s: &[u8]| base64::encode_config(s, base64::URL_SAFE_NO_PAD);
    AuthToken(format!(
        "{}.{}.{}",
        enc(br#"{"alg":"HS256","typ":"JWT"}"#),
        enc(claims.to_string().as_bytes()),
        enc(b"mock-signature"),
    ))
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            sessions: HashMap::new(),
            posts: BTreeMap::new(),
        }
    }

    /// Creates a user and logs them in, returning their id and access token
    pub fn create_user(&mut self, name: &str) -> (UserId, AuthToken) {
        let id = UserId(Uuid::new_v4().to_string());
        self.users.insert(
            id.clone(),
            MockUser {
                name: String::from(name),
                profile_pic: Some(format!("https://media.example.org/avatars/{}.png", id)),
            },
        );
        let tok = fake_jwt(&json!({
            "sub": id.0,
            "username": name,
            "aud": "authenticated",
            "iss": "supabase",
            "jti": Uuid::new_v4().to_string(),
        }));
        self.sessions.insert(tok.0.clone(), id.clone());
        (id, tok)
    }

    pub fn revoke(&mut self, tok: &AuthToken) {
        self.sessions.remove(tok.as_str());
    }

    pub fn create_post(&mut self) -> PostId {
        let id = PostId(Uuid::new_v4().to_string());
        self.posts.insert(id.clone(), Vec::new());
        id
    }

    /// Comments of `post` that are not deleted, oldest first
    pub fn visible_comments(&self, post: &PostId) -> Vec<Comment> {
        self.posts
            .get(post)
            .map(|comments| {
                comments
                    .iter()
                    .filter(|c| c.deleted_at.is_none())
                    .map(|c| c.comment.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn resolve(&self, tok: &AuthToken) -> Result<UserId, Error> {
        self.sessions
            .get(tok.as_str())
            .cloned()
            .ok_or_else(|| reject(401, json!("Invalid token")))
    }

    fn author(&self, id: &UserId) -> Author {
        let user = self.users.get(id);
        Author {
            id: id.clone(),
            username: user.map(|u| u.name.clone()).unwrap_or_default(),
            profile_pic: user.and_then(|u| u.profile_pic.clone()),
        }
    }

    fn validate(content: &str) -> Result<String, Error> {
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Err(invalid_content(&format!(
                "ensure this value has at most {} characters",
                MAX_COMMENT_CHARS
            )));
        }
        api::validate_content(content)
            .map_err(|_| invalid_content("Comment content cannot be empty or just whitespace"))
    }

    fn find_mut(&mut self, comment: &CommentId) -> Result<&mut StoredComment, Error> {
        self.posts
            .values_mut()
            .flat_map(|comments| comments.iter_mut())
            .find(|c| c.comment.id == *comment && c.deleted_at.is_none())
            .ok_or_else(|| not_found("Comment", &comment.0))
    }

    pub fn list_comments(&self, post: &PostId, page: Page) -> Result<Vec<Comment>, Error> {
        if !self.posts.contains_key(post) {
            return Err(not_found("Post", &post.0));
        }
        let page = Page::new(page.page, page.page_size);
        Ok(self
            .visible_comments(post)
            .into_iter()
            .skip(page.offset())
            .take(page.page_size as usize)
            .collect())
    }

    pub fn create_comment(
        &mut self,
        post: &PostId,
        content: &str,
        tok: &AuthToken,
    ) -> Result<Comment, Error> {
        let user = self.resolve(tok)?;
        let content = MockServer::validate(content)?;
        let author = self.author(&user);
        let comments = self
            .posts
            .get_mut(post)
            .ok_or_else(|| not_found("Post", &post.0))?;
        let now = Utc::now();
        let comment = Comment {
            id: CommentId(Uuid::new_v4().to_string()),
            post_id: post.clone(),
            content,
            author,
            created_at: now,
            updated_at: now,
        };
        comments.push(StoredComment {
            comment: comment.clone(),
            deleted_at: None,
        });
        Ok(comment)
    }

    pub fn update_comment(
        &mut self,
        comment: &CommentId,
        content: &str,
        tok: &AuthToken,
    ) -> Result<Comment, Error> {
        let user = self.resolve(tok)?;
        let content = MockServer::validate(content)?;
        let stored = self.find_mut(comment)?;
        if stored.comment.author.id != user {
            return Err(reject(403, json!("You can only edit your own comments")));
        }
        stored.comment.content = content;
        stored.comment.updated_at = Utc::now();
        Ok(stored.comment.clone())
    }

    pub fn delete_comment(&mut self, comment: &CommentId, tok: &AuthToken) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        let stored = self.find_mut(comment)?;
        if stored.comment.author.id != user {
            return Err(reject(403, json!("You can only delete your own comments")));
        }
        stored.deleted_at = Some(Utc::now());
        Ok(())
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}
