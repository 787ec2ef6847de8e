use std::sync::Arc;

use anyhow::Context;
use snapshare_client::{
    api::{CommentId, PostId, ACCESS_TOKEN_KEY},
    format, HttpTransport, Identity, MemoryTokenStore, Store, StoreConfig, TokenIdentity,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, env = "SNAPSHARE_HOST")]
    host: String,

    /// Access token of the acting user, required for add, edit and delete
    #[structopt(short, long, env = "SNAPSHARE_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Number of comments loaded per post
    #[structopt(long, default_value = "50")]
    page_size: u32,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List the comments of a post, oldest first
    List {
        post: String,

        /// Print the full content instead of a preview
        #[structopt(long)]
        full: bool,
    },

    /// Comment on a post
    Add { post: String, content: String },

    /// Change the content of one of your comments
    Edit {
        post: String,
        comment: String,
        content: String,
    },

    /// Delete one of your comments
    Delete { post: String, comment: String },

    /// Print who the access token says you are
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    tracing::debug!(host = %opt.host, page_size = opt.page_size, "starting");

    let tokens = Arc::new(MemoryTokenStore::new());
    if let Some(tok) = opt.token {
        tokens.set(ACCESS_TOKEN_KEY, tok);
    }
    let store = Store::new(
        HttpTransport::new(&opt.host),
        TokenIdentity::new(tokens.clone()),
        tokens.clone(),
        StoreConfig {
            page_size: opt.page_size,
        },
    );

    match opt.cmd {
        Command::Whoami => whoami(&TokenIdentity::new(tokens))?,
        Command::List { post, full } => list(&store, PostId(post), full).await?,
        Command::Add { post, content } => {
            let c = store
                .add(&PostId(post), &content)
                .await
                .context("posting comment")?;
            println!("{}", c.id);
        }
        Command::Edit {
            post,
            comment,
            content,
        } => {
            store
                .edit(&PostId(post), &CommentId(comment), &content)
                .await
                .context("editing comment")?;
        }
        Command::Delete { post, comment } => {
            store
                .delete(&PostId(post), &CommentId(comment))
                .await
                .context("deleting comment")?;
        }
    }

    Ok(())
}

fn whoami(identity: &dyn Identity) -> anyhow::Result<()> {
    let id = identity
        .current_user_id()
        .context("no usable access token, set SNAPSHARE_ACCESS_TOKEN")?;
    match identity.current_username() {
        Some(name) => println!("{name} ({id})"),
        None => println!("{id}"),
    }
    Ok(())
}

async fn list(store: &Store, post: PostId, full: bool) -> anyhow::Result<()> {
    let state = store.subscribe(&post).ready().await;
    if let Some(err) = state.error {
        return Err(err).with_context(|| format!("listing comments of post {post}"));
    }
    let now = chrono::Utc::now();
    for c in state.comments {
        let content = if full {
            c.content
        } else {
            format::preview(&c.content)
        };
        println!(
            "{} {} ({})\n    {}",
            c.id,
            c.author.username,
            format::relative_to(c.created_at, now),
            content
        );
    }
    Ok(())
}
