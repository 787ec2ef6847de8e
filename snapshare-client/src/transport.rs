use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::api::{
    self, AuthToken, Comment, CommentId, CreatedEnvelope, Error, ListEnvelope, NewComment, Page,
    PostId,
};

// Only reads are retried, a retried creation could post the same comment twice
const READ_RETRIES: u32 = 3;

/// The network operations on comments the synchronization store relies on
#[async_trait]
pub trait Transport: Send + Sync {
    async fn list_comments(&self, post: &PostId, page: Page) -> Result<Vec<Comment>, Error>;

    async fn create_comment(
        &self,
        post: &PostId,
        content: &str,
        token: Option<&AuthToken>,
    ) -> Result<Comment, Error>;

    async fn update_comment(
        &self,
        comment: &CommentId,
        content: &str,
        token: Option<&AuthToken>,
    ) -> Result<Comment, Error>;

    async fn delete_comment(
        &self,
        comment: &CommentId,
        token: Option<&AuthToken>,
    ) -> Result<(), Error>;
}

pub struct HttpTransport {
    host: String,
    reads: ClientWithMiddleware,
    writes: ClientWithMiddleware,
}

impl HttpTransport {
    pub fn new(host: &str) -> HttpTransport {
        HttpTransport::with_client(host, reqwest::Client::new())
    }

    pub fn with_client(host: &str, client: reqwest::Client) -> HttpTransport {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(READ_RETRIES);
        HttpTransport {
            host: String::from(host.trim_end_matches('/')),
            reads: ClientBuilder::new(client.clone())
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build(),
            writes: ClientBuilder::new(client).build(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }
}

fn authed(req: RequestBuilder, token: Option<&AuthToken>) -> Result<RequestBuilder, Error> {
    let token = token.ok_or(Error::AuthRequired)?;
    Ok(req.bearer_auth(token.as_str()))
}

fn with_content(req: RequestBuilder, content: &str) -> Result<RequestBuilder, Error> {
    let body = serde_json::to_vec(&NewComment {
        content: String::from(content),
    })
    .map_err(|e| Error::Network(format!("failed to serialize comment: {e}")))?;
    Ok(req
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body))
}

async fn send(req: RequestBuilder) -> Result<reqwest::Response, Error> {
    let resp = req
        .send()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.bytes().await.unwrap_or_default();
    let err = Error::from_response(status.as_u16(), status.canonical_reason(), &body);
    tracing::debug!(?err, "comment request rejected by server");
    Err(err)
}

async fn parse<R>(resp: reqwest::Response) -> Result<R, Error>
where
    R: for<'de> serde::Deserialize<'de>,
{
    resp.json()
        .await
        .map_err(|e| Error::Network(format!("failed to parse server response: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list_comments(&self, post: &PostId, page: Page) -> Result<Vec<Comment>, Error> {
        let page = Page::new(page.page, page.page_size);
        let req = self
            .reads
            .get(self.url(&api::post_comments_path(post)))
            .query(&[("page", page.page), ("page_size", page.page_size)]);
        let list: ListEnvelope = parse(send(req).await?).await?;
        Ok(list.results)
    }

    async fn create_comment(
        &self,
        post: &PostId,
        content: &str,
        token: Option<&AuthToken>,
    ) -> Result<Comment, Error> {
        let req = self.writes.post(self.url(&api::post_comments_path(post)));
        let req = with_content(req, content)?;
        let created: CreatedEnvelope = parse(send(authed(req, token)?).await?).await?;
        Ok(created.into_comment())
    }

    async fn update_comment(
        &self,
        comment: &CommentId,
        content: &str,
        token: Option<&AuthToken>,
    ) -> Result<Comment, Error> {
        let req = self.writes.put(self.url(&api::comment_path(comment)));
        let req = with_content(req, content)?;
        let updated: CreatedEnvelope = parse(send(authed(req, token)?).await?).await?;
        Ok(updated.into_comment())
    }

    async fn delete_comment(
        &self,
        comment: &CommentId,
        token: Option<&AuthToken>,
    ) -> Result<(), Error> {
        let req = self.writes.delete(self.url(&api::comment_path(comment)));
        send(authed(req, token)?).await?;
        Ok(())
    }
}
