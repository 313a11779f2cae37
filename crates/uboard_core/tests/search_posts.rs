use rusqlite::{params, Connection};
use std::sync::Arc;
use uboard_core::{
    open_db_in_memory, search_posts, FixedClock, PostDraft, PostKind, PostService, SearchError,
    SearchQuery, SqlitePostRepository, UserId,
};
use uuid::Uuid;

fn seed_user(conn: &Connection) -> UserId {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO users (
            id, username, email, first_name, last_name,
            password_hash, password_salt, email_confirmed, created_at, updated_at
        ) VALUES (?1, 'ada', 'ada@utoronto.ca', 'Ada', 'Lovelace', 'hash', 'salt', 1, 0, 0);",
        params![id.to_string()],
    )
    .unwrap();
    id
}

#[test]
fn search_ranks_matches_and_skips_deleted_posts() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(1_700_000_000_000));
    let ada = seed_user(&conn);
    let service = PostService::new(SqlitePostRepository::new(&conn), clock.clone());

    let pizza = service
        .create_post(
            ada,
            &PostDraft::new(PostKind::Event, "Pizza night", "Free pizza and games"),
        )
        .unwrap();
    service
        .create_post(
            ada,
            &PostDraft::new(PostKind::Textbook, "Chemistry book", "Great condition"),
        )
        .unwrap();
    let removed = service
        .create_post(
            ada,
            &PostDraft::new(PostKind::Event, "Pizza lunch", "Cancelled"),
        )
        .unwrap();
    service.delete_post(ada, removed.post.id).unwrap();

    let hits = search_posts(&conn, &SearchQuery::new("pizza")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].post_id, pizza.post.id);
    assert_eq!(hits[0].kind, PostKind::Event);
    assert!(hits[0].snippet.contains("[Pizza]") || hits[0].snippet.contains("[pizza]"));

    let mut textbooks = SearchQuery::new("pizza");
    textbooks.kind = Some(PostKind::Textbook);
    assert!(search_posts(&conn, &textbooks).unwrap().is_empty());
}

#[test]
fn edits_are_reindexed() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(1_700_000_000_000));
    let ada = seed_user(&conn);
    let service = PostService::new(SqlitePostRepository::new(&conn), clock.clone());

    let post = service
        .create_post(
            ada,
            &PostDraft::new(PostKind::Housing, "Sublet available", "Near campus"),
        )
        .unwrap();
    service
        .update_post(
            ada,
            post.post.id,
            &PostDraft::new(PostKind::Housing, "Room taken", "Sorry, gone"),
        )
        .unwrap();

    assert!(search_posts(&conn, &SearchQuery::new("sublet"))
        .unwrap()
        .is_empty());
    assert_eq!(
        search_posts(&conn, &SearchQuery::new("taken")).unwrap().len(),
        1
    );
}

#[test]
fn blank_queries_and_zero_limits_return_nothing() {
    let conn = open_db_in_memory().unwrap();
    assert!(search_posts(&conn, &SearchQuery::new("   ")).unwrap().is_empty());

    let mut zero = SearchQuery::new("anything");
    zero.limit = 0;
    assert!(search_posts(&conn, &zero).unwrap().is_empty());
}

#[test]
fn user_text_is_escaped_unless_raw_syntax_is_requested() {
    let conn = open_db_in_memory().unwrap();

    assert!(search_posts(&conn, &SearchQuery::new("\"unbalanced AND"))
        .unwrap()
        .is_empty());

    let mut raw = SearchQuery::new("\"unbalanced AND");
    raw.raw_fts_syntax = true;
    let err = search_posts(&conn, &raw).unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery { .. }));
}
