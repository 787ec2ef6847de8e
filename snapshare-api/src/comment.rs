use std::fmt;

use crate::{Author, PostId, Time, Uuid, ValidationError};

pub const MAX_COMMENT_CHARS: usize = 500;

/// Prefix of the ids given to comments the server has not confirmed yet
pub const TEMPORARY_ID_PREFIX: &str = "temp-";

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct CommentId(pub String);

impl CommentId {
    pub fn temporary() -> CommentId {
        CommentId(format!("{}{}", TEMPORARY_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }
}

impl From<&str> for CommentId {
    fn from(s: &str) -> CommentId {
        CommentId(String::from(s))
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(alias = "postId")]
    pub post_id: PostId,
    pub content: String,
    pub author: Author,
    #[serde(alias = "createdAt", deserialize_with = "crate::time::deserialize")]
    pub created_at: Time,
    #[serde(alias = "updatedAt", deserialize_with = "crate::time::deserialize")]
    pub updated_at: Time,
}

impl Comment {
    /// Builds a comment that stands in for `content` until the server confirms it
    pub fn placeholder(post_id: PostId, content: String, author: Author, now: Time) -> Comment {
        Comment {
            id: CommentId::temporary(),
            post_id,
            content,
            author,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_temporary()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub content: String,
}

/// Trims `content` and checks it fits the comment length constraints
pub fn validate_content(content: &str) -> Result<String, ValidationError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::Empty);
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(ValidationError::TooLong);
    }
    Ok(String::from(content))
}

/// List answer, either `{results}` or the paginated `{data, total, has_next, ..}`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListEnvelope {
    #[serde(alias = "data")]
    pub results: Vec<Comment>,
}

/// Creation and edition answer either `{data: Comment}` or the bare comment
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum CreatedEnvelope {
    Wrapped { data: Comment },
    Bare(Comment),
}

impl CreatedEnvelope {
    pub fn into_comment(self) -> Comment {
        match self {
            CreatedEnvelope::Wrapped { data } => data,
            CreatedEnvelope::Bare(c) => c,
        }
    }
}
