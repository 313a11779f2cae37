use rusqlite::{params, Connection};
use std::sync::Arc;
use uboard_core::clock::MINUTE_MS;
use uboard_core::{
    open_db_in_memory, BoundingBox, FixedClock, MapQuery, PostDraft, PostKind, PostListQuery,
    PostService, PostServiceError, SqlitePostRepository, UserId,
};
use uuid::Uuid;

const START_MS: i64 = 1_700_000_000_000;

fn seed_user(conn: &Connection, username: &str) -> UserId {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO users (
            id, username, email, first_name, last_name,
            password_hash, password_salt, email_confirmed, created_at, updated_at
        ) VALUES (?1, ?2, ?3, 'Test', 'User', 'hash', 'salt', 1, 0, 0);",
        params![
            id.to_string(),
            username,
            format!("{username}@utoronto.ca")
        ],
    )
    .unwrap();
    id
}

fn service<'conn>(
    conn: &'conn Connection,
    clock: &Arc<FixedClock>,
) -> PostService<SqlitePostRepository<'conn>> {
    PostService::new(SqlitePostRepository::new(conn), clock.clone())
}

fn draft(kind: PostKind, title: &str) -> PostDraft {
    PostDraft::new(kind, title, format!("{title} body"))
}

#[test]
fn only_the_author_can_update_or_delete() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(START_MS));
    let ada = seed_user(&conn, "ada");
    let grace = seed_user(&conn, "grace");
    let service = service(&conn, &clock);

    let mut input = draft(PostKind::Event, "Pizza night");
    input.location = Some("Bahen Centre".to_string());
    input.tags = vec![
        " Free Food ".to_string(),
        "free food".to_string(),
        "Pizza".to_string(),
    ];
    let created = service.create_post(ada, &input).unwrap();
    assert_eq!(created.post.tags, vec!["free food", "pizza"]);
    assert_eq!(created.author.username, "ada");
    assert_eq!(created.like_count, 0);
    assert_eq!(created.comment_count, 0);

    let id = created.post.id;
    let replacement = draft(PostKind::Club, "Chess club");
    assert!(matches!(
        service.update_post(grace, id, &replacement).unwrap_err(),
        PostServiceError::Forbidden
    ));
    assert!(matches!(
        service.delete_post(grace, id).unwrap_err(),
        PostServiceError::Forbidden
    ));

    clock.advance(MINUTE_MS);
    let updated = service.update_post(ada, id, &replacement).unwrap();
    assert_eq!(updated.post.kind, PostKind::Club);
    assert_eq!(updated.post.title, "Chess club");
    assert_eq!(updated.post.location, None);
    assert!(updated.post.tags.is_empty());
    assert_eq!(updated.post.created_at, START_MS);
    assert_eq!(updated.post.updated_at, START_MS + MINUTE_MS);

    service.delete_post(ada, id).unwrap();
    assert!(matches!(
        service.get_post(ada, id).unwrap_err(),
        PostServiceError::PostNotFound(missing) if missing == id
    ));
    assert!(matches!(
        service.update_post(ada, id, &replacement).unwrap_err(),
        PostServiceError::PostNotFound(_)
    ));
}

#[test]
fn invalid_drafts_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(START_MS));
    let ada = seed_user(&conn, "ada");
    let service = service(&conn, &clock);

    let err = service
        .create_post(ada, &draft(PostKind::Other, "   "))
        .unwrap_err();
    assert!(matches!(err, PostServiceError::Validation(ref e) if e.field == "title"));

    let mut half_located = draft(PostKind::Housing, "Room for rent");
    half_located.latitude = Some(43.66);
    let err = service.create_post(ada, &half_located).unwrap_err();
    assert!(matches!(err, PostServiceError::Validation(_)));

    let mut backwards = draft(PostKind::Event, "Time travel");
    backwards.event_start = Some(START_MS);
    backwards.event_end = Some(START_MS - 1);
    let err = service.create_post(ada, &backwards).unwrap_err();
    assert!(matches!(err, PostServiceError::Validation(ref e) if e.field == "event_end"));
}

#[test]
fn feed_is_newest_first_with_normalized_paging() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(START_MS));
    let ada = seed_user(&conn, "ada");
    let service = service(&conn, &clock);

    let mut ids = Vec::new();
    for index in 0..12 {
        clock.advance(MINUTE_MS);
        let post = service
            .create_post(ada, &draft(PostKind::Other, &format!("Post {index}")))
            .unwrap();
        ids.push(post.post.id);
    }

    let first = service.list_posts(ada, &PostListQuery::default()).unwrap();
    assert_eq!(first.total, 12);
    assert_eq!(first.limit, 10);
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.items[0].post.id, ids[11]);
    assert_eq!(first.items[9].post.id, ids[2]);

    let second = service
        .list_posts(
            ada,
            &PostListQuery {
                offset: 10,
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(second.items.len(), 2);
    assert_eq!(second.items[1].post.id, ids[0]);

    let zero = service
        .list_posts(
            ada,
            &PostListQuery {
                limit: Some(0),
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(zero.limit, 10);

    let capped = service
        .list_posts(
            ada,
            &PostListQuery {
                limit: Some(500),
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(capped.limit, 50);
    assert_eq!(capped.items.len(), 12);
}

#[test]
fn feed_filters_by_kind_tag_author_and_text() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(START_MS));
    let ada = seed_user(&conn, "ada");
    let grace = seed_user(&conn, "grace");
    let service = service(&conn, &clock);

    let mut pizza = draft(PostKind::Event, "Pizza social");
    pizza.body = "Free slices in the lounge".to_string();
    pizza.tags = vec!["food".to_string()];
    let pizza = service.create_post(ada, &pizza).unwrap();

    let mut books = draft(PostKind::Textbook, "Selling calculus textbook");
    books.tags = vec!["Math".to_string()];
    let books = service.create_post(grace, &books).unwrap();

    let deleted = service
        .create_post(ada, &draft(PostKind::Event, "Cancelled pizza party"))
        .unwrap();
    service.delete_post(ada, deleted.post.id).unwrap();

    let by_kind = service
        .list_posts(
            ada,
            &PostListQuery {
                kind: Some(PostKind::Event),
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(by_kind.total, 1);
    assert_eq!(by_kind.items[0].post.id, pizza.post.id);

    let by_tag = service
        .list_posts(
            ada,
            &PostListQuery {
                tag: Some(" MATH ".to_string()),
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(by_tag.total, 1);
    assert_eq!(by_tag.items[0].post.id, books.post.id);

    let by_author = service
        .list_posts(
            ada,
            &PostListQuery {
                author: Some(grace),
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(by_author.total, 1);

    let by_text = service
        .list_posts(
            ada,
            &PostListQuery {
                text: Some("pizza".to_string()),
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(by_text.total, 1);
    assert_eq!(by_text.items[0].post.id, pizza.post.id);

    let blank_text = service
        .list_posts(
            ada,
            &PostListQuery {
                text: Some("   ".to_string()),
                ..PostListQuery::default()
            },
        )
        .unwrap();
    assert_eq!(blank_text.total, 2);
}

#[test]
fn map_pins_respect_bounds_kind_and_deletion() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(START_MS));
    let ada = seed_user(&conn, "ada");
    let service = service(&conn, &clock);

    let located = |title: &str, kind: PostKind, lat: f64, lng: f64| {
        let mut input = draft(kind, title);
        input.latitude = Some(lat);
        input.longitude = Some(lng);
        input
    };

    let campus = service
        .create_post(ada, &located("Campus", PostKind::Event, 43.66, -79.39))
        .unwrap();
    service
        .create_post(ada, &located("Fiji", PostKind::Volunteer, -17.7, 179.5))
        .unwrap();
    service
        .create_post(ada, &draft(PostKind::Event, "No coordinates"))
        .unwrap();
    let gone = service
        .create_post(ada, &located("Gone", PostKind::Event, 43.65, -79.38))
        .unwrap();
    service.delete_post(ada, gone.post.id).unwrap();

    let all = service.map_pins(&MapQuery::default()).unwrap();
    assert_eq!(all.len(), 2);

    let toronto = service
        .map_pins(&MapQuery {
            bounds: Some(BoundingBox {
                min_lat: 43.0,
                max_lat: 44.0,
                min_lng: -80.0,
                max_lng: -79.0,
            }),
            ..MapQuery::default()
        })
        .unwrap();
    assert_eq!(toronto.len(), 1);
    assert_eq!(toronto[0].id, campus.post.id);

    let pacific = service
        .map_pins(&MapQuery {
            bounds: Some(BoundingBox {
                min_lat: -20.0,
                max_lat: -10.0,
                min_lng: 170.0,
                max_lng: -170.0,
            }),
            ..MapQuery::default()
        })
        .unwrap();
    assert_eq!(pacific.len(), 1);
    assert_eq!(pacific[0].title, "Fiji");

    let volunteers = service
        .map_pins(&MapQuery {
            kind: Some(PostKind::Volunteer),
            ..MapQuery::default()
        })
        .unwrap();
    assert_eq!(volunteers.len(), 1);

    let err = service
        .map_pins(&MapQuery {
            bounds: Some(BoundingBox {
                min_lat: 10.0,
                max_lat: 0.0,
                min_lng: 0.0,
                max_lng: 1.0,
            }),
            ..MapQuery::default()
        })
        .unwrap_err();
    assert!(matches!(err, PostServiceError::Validation(_)));
}

#[test]
fn tag_counts_only_include_visible_posts() {
    let conn = open_db_in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(START_MS));
    let ada = seed_user(&conn, "ada");
    let service = service(&conn, &clock);

    let tagged = |title: &str, tags: &[&str]| {
        let mut input = draft(PostKind::Club, title);
        input.tags = tags.iter().map(|tag| tag.to_string()).collect();
        input
    };
    service
        .create_post(ada, &tagged("One", &["music", "jazz"]))
        .unwrap();
    service.create_post(ada, &tagged("Two", &["Music"])).unwrap();
    let hidden = service.create_post(ada, &tagged("Three", &["hidden"])).unwrap();
    service.delete_post(ada, hidden.post.id).unwrap();

    let tags = service.list_tags().unwrap();
    let summary = tags
        .iter()
        .map(|tag| (tag.name.as_str(), tag.post_count))
        .collect::<Vec<_>>();
    assert_eq!(summary, vec![("jazz", 1), ("music", 2)]);
}
