use chrono::Utc;

pub use uuid::Uuid;
pub type Time = chrono::DateTime<Utc>;

mod auth;
pub use auth::{AuthToken, ACCESS_TOKEN_KEY};

mod comment;
pub use comment::{
    validate_content, Comment, CommentId, CreatedEnvelope, ListEnvelope, NewComment,
    MAX_COMMENT_CHARS, TEMPORARY_ID_PREFIX,
};

mod error;
pub use error::{error_message, Error, ValidationError};

mod page;
pub use page::{Page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

mod time;
pub use time::parse_timestamp;

mod user;
pub use user::{Author, PostId, UserId};

pub const API_PREFIX: &str = "/api/v1";

/// Path of the comment collection of a post, relative to the host
pub fn post_comments_path(post: &PostId) -> String {
    format!("{}/comments/posts/{}/comments", API_PREFIX, post.0)
}

/// Path of a single comment, relative to the host
pub fn comment_path(comment: &CommentId) -> String {
    format!("{}/comments/{}", API_PREFIX, comment.0)
}
