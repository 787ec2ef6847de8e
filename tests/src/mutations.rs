#![cfg(test)]

use snapshare_client::{
    api::{Error, ValidationError, ACCESS_TOKEN_KEY, MAX_COMMENT_CHARS},
    Anonymous, Store, StoreConfig, UNKNOWN_USERNAME,
};
use snapshare_mock_server::Op;

use crate::{contents, Fixture};

fn server_error() -> Error {
    Error::Http {
        status: 500,
        message: String::from("Internal Server Error"),
    }
}

#[tokio::test]
async fn added_comment_shows_up_before_the_server_answers() {
    let f = Fixture::new();
    f.seed(&["one"]);
    f.load().await;
    f.mock.pause();

    let add = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        async move { store.add(&post, "  hello there \n").await }
    });
    f.mock.wait_until_held(1).await;

    let cached = f.cached();
    assert_eq!(contents(&cached), vec!["hello there", "one"]);
    let placeholder = &cached[0];
    assert!(placeholder.is_pending());
    assert_eq!(placeholder.post_id, f.post);
    assert_eq!(placeholder.author.id, f.user);
    assert_eq!(placeholder.author.username, "ana");

    f.mock.resume();
    let created = add.await.unwrap().unwrap();
    assert!(!created.is_pending());
    assert_eq!(created.content, "hello there");
    assert_eq!(f.cached()[0], created);
    assert!(f.cached().iter().all(|c| !c.id.is_temporary()));
    assert_eq!(
        contents(&f.mock.server().visible_comments(&f.post)),
        vec!["one", "hello there"]
    );
}

#[tokio::test]
async fn failed_add_restores_the_previous_list() {
    let f = Fixture::new();
    f.seed(&["one", "two"]);
    let sub = f.load().await;
    let before = sub.current();

    f.mock.fail_next(Op::Create, server_error());
    assert_eq!(f.store.add(&f.post, "three").await, Err(server_error()));
    assert_eq!(sub.current(), before);
    assert_eq!(f.mock.calls().create, 1);
}

#[tokio::test]
async fn blank_comments_never_reach_the_server() {
    let f = Fixture::new();
    f.seed(&["one"]);
    f.load().await;
    let before = f.cached();

    for blank in ["", "   ", " \n\t "] {
        assert_eq!(
            f.store.add(&f.post, blank).await,
            Err(Error::Validation(ValidationError::Empty))
        );
    }
    assert_eq!(f.cached(), before);
    assert_eq!(f.mock.calls().create, 0);
}

#[tokio::test]
async fn length_limit_is_inclusive() {
    let f = Fixture::new();
    f.load().await;

    let longest = "a".repeat(MAX_COMMENT_CHARS);
    assert_eq!(f.store.add(&f.post, &longest).await.unwrap().content, longest);

    let too_long = "a".repeat(MAX_COMMENT_CHARS + 1);
    assert_eq!(
        f.store.add(&f.post, &too_long).await,
        Err(Error::Validation(ValidationError::TooLong))
    );
    // multi-byte characters count once
    let accented = "é".repeat(MAX_COMMENT_CHARS);
    f.store.add(&f.post, &accented).await.unwrap();

    assert_eq!(f.mock.calls().create, 2);
    assert_eq!(f.cached().len(), 2);
}

#[tokio::test]
async fn mutations_need_a_token() {
    let f = Fixture::new();
    let seeded = f.seed(&["one"]);
    f.load().await;
    f.tokens.remove(ACCESS_TOKEN_KEY);

    assert_eq!(f.store.add(&f.post, "hi").await, Err(Error::AuthRequired));
    assert_eq!(
        f.store.edit(&f.post, &seeded[0].id, "hi").await,
        Err(Error::AuthRequired)
    );
    assert_eq!(
        f.store.delete(&f.post, &seeded[0].id).await,
        Err(Error::AuthRequired)
    );
    assert_eq!(f.cached(), seeded);
    assert_eq!(f.mock.calls().total(), 1);

    f.tokens.set(ACCESS_TOKEN_KEY, String::from("   "));
    assert_eq!(f.store.add(&f.post, "hi").await, Err(Error::AuthRequired));
}

#[tokio::test]
async fn deleted_comment_disappears_right_away() {
    let f = Fixture::new();
    let seeded = f.seed(&["one", "two", "three"]);
    f.load().await;
    f.mock.pause();

    let delete = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        let id = seeded[1].id.clone();
        async move { store.delete(&post, &id).await }
    });
    f.mock.wait_until_held(1).await;
    assert_eq!(contents(&f.cached()), vec!["one", "three"]);

    f.mock.resume();
    delete.await.unwrap().unwrap();
    assert_eq!(contents(&f.cached()), vec!["one", "three"]);
    assert_eq!(
        contents(&f.mock.server().visible_comments(&f.post)),
        vec!["one", "three"]
    );
}

#[tokio::test]
async fn deleting_twice_is_harmless() {
    let f = Fixture::new();
    let seeded = f.seed(&["one", "two"]);
    f.load().await;
    f.mock
        .server()
        .delete_comment(&seeded[0].id, &f.token)
        .unwrap();

    f.store.delete(&f.post, &seeded[0].id).await.unwrap();
    assert_eq!(contents(&f.cached()), vec!["two"]);
    assert_eq!(f.mock.calls().delete, 1);
}

#[tokio::test]
async fn rejected_delete_puts_the_comment_back_in_place() {
    let f = Fixture::new();
    f.seed(&["one"]);
    let (_, bob) = f.mock.server().create_user("bob");
    f.mock
        .server()
        .create_comment(&f.post, "bob's", &bob)
        .unwrap();
    f.seed(&["three"]);
    let sub = f.load().await;
    let before = sub.current();
    let bobs = before.comments[1].id.clone();

    let err = f.store.delete(&f.post, &bobs).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert_eq!(err.user_message(), "You can only delete your own comments");
    assert_eq!(sub.current(), before);
}

#[tokio::test]
async fn edits_apply_right_away_and_roll_back_on_failure() {
    let f = Fixture::new();
    let seeded = f.seed(&["one", "two"]);
    let sub = f.load().await;
    f.mock.pause();

    let edit = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        let id = seeded[0].id.clone();
        async move { store.edit(&post, &id, " uno ").await }
    });
    f.mock.wait_until_held(1).await;
    assert_eq!(contents(&f.cached()), vec!["uno", "two"]);
    f.mock.resume();
    let edited = edit.await.unwrap().unwrap();
    assert_eq!(f.cached()[0], edited);
    assert_eq!(edited.created_at, seeded[0].created_at);

    let before = sub.current();
    f.mock.fail_next(Op::Update, server_error());
    assert_eq!(
        f.store.edit(&f.post, &seeded[1].id, "dos").await,
        Err(server_error())
    );
    assert_eq!(sub.current(), before);
}

#[tokio::test]
async fn unconfirmed_comments_cannot_be_changed() {
    let f = Fixture::new();
    f.load().await;
    f.mock.pause();

    let add = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        async move { store.add(&post, "hello").await }
    });
    f.mock.wait_until_held(1).await;
    let temp = f.cached()[0].id.clone();
    assert!(temp.is_temporary());

    let unconfirmed = Err(Error::Validation(ValidationError::Unconfirmed));
    assert_eq!(f.store.delete(&f.post, &temp).await, unconfirmed);
    assert_eq!(
        f.store.edit(&f.post, &temp, "hi").await.map(|_| ()),
        unconfirmed
    );
    assert_eq!(f.mock.held(), vec![Op::Create]);

    f.mock.resume();
    add.await.unwrap().unwrap();
}

#[tokio::test]
async fn abandoned_add_still_lands() {
    let f = Fixture::new();
    f.seed(&["one"]);
    f.load().await;
    f.mock.pause();

    let add = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        async move { store.add(&post, "sent").await }
    });
    f.mock.wait_until_held(1).await;
    assert_eq!(contents(&f.cached()), vec!["sent", "one"]);

    // the view that started the addition goes away
    add.abort();
    assert!(add.await.unwrap_err().is_cancelled());
    assert!(f.cached()[0].is_pending());

    f.mock.resume();
    let confirmed = f.confirmed().await;
    assert_eq!(contents(&confirmed), vec!["sent", "one"]);
    assert_eq!(
        confirmed[0],
        f.mock.server().visible_comments(&f.post)[1]
    );
}

#[tokio::test]
async fn abandoned_delete_still_rolls_back() {
    let f = Fixture::new();
    let seeded = f.seed(&["one", "two"]);
    f.load().await;
    f.mock.pause();
    f.mock.fail_next(Op::Delete, server_error());

    let delete = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        let id = seeded[0].id.clone();
        async move { store.delete(&post, &id).await }
    });
    f.mock.wait_until_held(1).await;
    delete.abort();
    assert!(delete.await.unwrap_err().is_cancelled());
    assert_eq!(contents(&f.cached()), vec!["two"]);

    let mut sub = f.store.subscribe(&f.post);
    f.mock.resume();
    assert_eq!(sub.changed().await.comments, seeded);
}

#[tokio::test]
async fn failed_delete_keeps_server_order_around_new_comments() {
    let f = Fixture::new();
    let seeded = f.seed(&["one", "two", "three"]);
    f.load().await;
    f.mock.pause();
    f.mock.fail_next(Op::Delete, server_error());
    f.mock.fail_next(Op::Delete, server_error());

    let delete = |id: usize| {
        let store = f.store.clone();
        let post = f.post.clone();
        let id = seeded[id].id.clone();
        tokio::spawn(async move { store.delete(&post, &id).await })
    };
    let last = delete(2);
    f.mock.wait_until_held(1).await;
    let first = delete(0);
    f.mock.wait_until_held(2).await;
    let add = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        async move { store.add(&post, "new").await }
    });
    f.mock.wait_until_held(3).await;
    assert_eq!(contents(&f.cached()), vec!["new", "two"]);

    assert_eq!(f.mock.release_first(), Some(Op::Delete));
    assert_eq!(last.await.unwrap(), Err(server_error()));
    assert_eq!(contents(&f.cached()), vec!["new", "two", "three"]);

    assert_eq!(f.mock.release_first(), Some(Op::Delete));
    assert_eq!(first.await.unwrap(), Err(server_error()));
    assert_eq!(contents(&f.cached()), vec!["new", "one", "two", "three"]);

    f.mock.resume();
    let created = add.await.unwrap().unwrap();
    assert_eq!(f.cached()[0], created);
    assert_eq!(f.cached()[1..], seeded[..]);
}

#[tokio::test]
async fn interleaved_mutations_roll_back_independently() {
    let f = Fixture::new();
    let seeded = f.seed(&["one", "two"]);
    f.load().await;
    f.mock.pause();
    f.mock.fail_next(Op::Create, server_error());

    let add = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        async move { store.add(&post, "doomed").await }
    });
    f.mock.wait_until_held(1).await;
    let delete = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        let id = seeded[0].id.clone();
        async move { store.delete(&post, &id).await }
    });
    f.mock.wait_until_held(2).await;
    assert_eq!(contents(&f.cached()), vec!["doomed", "two"]);

    // the deletion lands first, then the creation fails
    assert_eq!(f.mock.release_last(), Some(Op::Delete));
    delete.await.unwrap().unwrap();
    assert_eq!(f.mock.release_first(), Some(Op::Create));
    assert_eq!(add.await.unwrap(), Err(server_error()));

    assert_eq!(f.cached(), vec![seeded[1].clone()]);
}

#[tokio::test]
async fn refetch_drops_unconfirmed_placeholders() {
    let f = Fixture::new();
    f.seed(&["one"]);
    f.load().await;
    f.mock.pause();

    let add = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        async move { store.add(&post, "racing").await }
    });
    f.mock.wait_until_held(1).await;
    let refetch = tokio::spawn({
        let store = f.store.clone();
        let post = f.post.clone();
        async move { store.refetch(&post).await }
    });
    f.mock.wait_until_held(2).await;

    assert_eq!(f.mock.release_last(), Some(Op::List));
    refetch.await.unwrap().unwrap();
    assert_eq!(contents(&f.cached()), vec!["one"]);

    // the confirmation has no placeholder left to replace
    f.mock.resume();
    let created = add.await.unwrap().unwrap();
    assert_eq!(contents(&f.cached()), vec!["one"]);

    f.store.refetch(&f.post).await.unwrap();
    assert_eq!(f.cached()[1], created);
}

#[tokio::test]
async fn mutating_an_unloaded_post_does_not_fetch_it() {
    let f = Fixture::new();
    f.seed(&["one"]);

    let created = f.store.add(&f.post, "blind").await.unwrap();
    assert_eq!(f.cached(), vec![created]);

    let sub = f.load().await;
    assert_eq!(contents(&sub.current().comments), vec!["blind"]);
    assert_eq!(f.mock.calls().list, 0);
}

#[tokio::test]
async fn unknown_identity_gets_a_generic_placeholder() {
    let f = Fixture::new();
    let store = Store::new(
        f.mock.clone(),
        Anonymous,
        f.tokens.clone(),
        StoreConfig::default(),
    );
    store.subscribe(&f.post).ready().await;
    f.mock.pause();

    let add = tokio::spawn({
        let store = store.clone();
        let post = f.post.clone();
        async move { store.add(&post, "who am i").await }
    });
    f.mock.wait_until_held(1).await;
    let placeholder = store.snapshot(&f.post).unwrap().comments[0].clone();
    assert_eq!(placeholder.author.id.0, "unknown");
    assert_eq!(placeholder.author.username, UNKNOWN_USERNAME);

    // the server still knows who posted it
    f.mock.resume();
    let created = add.await.unwrap().unwrap();
    assert_eq!(created.author.id, f.user);
    assert_eq!(created.author.username, "ana");
}
