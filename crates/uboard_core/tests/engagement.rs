use rusqlite::{params, Connection};
use std::sync::Arc;
use uboard_core::repo::post_repo::{PostRepository, UpdateOutcome};
use uboard_core::{
    open_db_in_memory, EngagementState, FixedClock, PostDraft, PostId, PostKind, PostService,
    PostServiceError, SqlitePostRepository, UserId,
};
use uuid::Uuid;

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

struct Board {
    conn: Connection,
    clock: Arc<FixedClock>,
}

impl Board {
    fn new() -> Self {
        Self {
            conn: open_db_in_memory().unwrap(),
            clock: Arc::new(FixedClock::new(1_700_000_000_000)),
        }
    }

    fn service(&self) -> PostService<SqlitePostRepository<'_>> {
        PostService::new(SqlitePostRepository::new(&self.conn), self.clock.clone())
    }

    fn event(&self, author: UserId, capacity: u32) -> PostId {
        let mut draft = PostDraft::new(PostKind::Event, "Board games", "Bring snacks");
        draft.capacity = capacity;
        self.service().create_post(author, &draft).unwrap().post.id
    }
}

fn state(count: u64, active: bool) -> EngagementState {
    EngagementState { count, active }
}

#[test]
fn likes_are_idempotent_and_visible_per_viewer() {
    let board = Board::new();
    let ada = seed_user(&board.conn, "ada");
    let grace = seed_user(&board.conn, "grace");
    let post = board.event(ada, 0);
    let service = board.service();

    assert_eq!(service.like(grace, post).unwrap(), state(1, true));
    assert_eq!(service.like(grace, post).unwrap(), state(1, true));
    assert_eq!(service.like(ada, post).unwrap(), state(2, true));

    let seen_by_grace = service.get_post(grace, post).unwrap();
    assert_eq!(seen_by_grace.like_count, 2);
    assert!(seen_by_grace.liked_by_viewer);

    assert_eq!(service.unlike(grace, post).unwrap(), state(1, false));
    assert_eq!(service.unlike(grace, post).unwrap(), state(1, false));
    assert!(!service.get_post(grace, post).unwrap().liked_by_viewer);
    assert!(service.get_post(ada, post).unwrap().liked_by_viewer);
}

#[test]
fn check_in_enforces_capacity() {
    let board = Board::new();
    let ada = seed_user(&board.conn, "ada");
    let grace = seed_user(&board.conn, "grace");
    let linus = seed_user(&board.conn, "linus");
    let post = board.event(ada, 2);
    let service = board.service();

    assert_eq!(service.check_in(ada, post).unwrap(), state(1, true));
    assert_eq!(service.check_in(grace, post).unwrap(), state(2, true));
    assert!(matches!(
        service.check_in(linus, post).unwrap_err(),
        PostServiceError::CapacityReached { capacity: 2 }
    ));

    assert_eq!(service.check_in(ada, post).unwrap(), state(2, true));

    assert_eq!(service.check_out(ada, post).unwrap(), state(1, false));
    assert_eq!(service.check_out(ada, post).unwrap(), state(1, false));
    assert_eq!(service.check_in(linus, post).unwrap(), state(2, true));

    let view = service.get_post(linus, post).unwrap();
    assert_eq!(view.checkin_count, 2);
    assert!(view.checked_in_by_viewer);
}

#[test]
fn zero_capacity_means_unlimited() {
    let board = Board::new();
    let ada = seed_user(&board.conn, "ada");
    let post = board.event(ada, 0);
    let service = board.service();

    for index in 0..5 {
        let user = seed_user(&board.conn, &format!("user{index}"));
        service.check_in(user, post).unwrap();
    }
    assert_eq!(service.get_post(ada, post).unwrap().checkin_count, 5);
}

#[test]
fn capacity_cannot_drop_below_current_check_ins() {
    let board = Board::new();
    let ada = seed_user(&board.conn, "ada");
    let grace = seed_user(&board.conn, "grace");
    let post = board.event(ada, 5);
    let service = board.service();
    service.check_in(ada, post).unwrap();
    service.check_in(grace, post).unwrap();

    let mut draft = PostDraft::new(PostKind::Event, "Board games", "Bring snacks");
    draft.capacity = 1;
    let err = service.update_post(ada, post, &draft).unwrap_err();
    assert!(matches!(err, PostServiceError::Validation(ref e) if e.field == "capacity"));

    draft.capacity = 2;
    service.update_post(ada, post, &draft).unwrap();
    draft.capacity = 0;
    service.update_post(ada, post, &draft).unwrap();
}

#[test]
fn rejected_capacity_update_writes_nothing() {
    let board = Board::new();
    let ada = seed_user(&board.conn, "ada");
    let grace = seed_user(&board.conn, "grace");
    let post = board.event(ada, 3);
    let service = board.service();
    service.check_in(ada, post).unwrap();
    service.check_in(grace, post).unwrap();

    let mut shrunk = service.get_post(ada, post).unwrap().post;
    shrunk.title = "Renamed".to_string();
    shrunk.capacity = 1;
    let repo = SqlitePostRepository::new(&board.conn);
    assert_eq!(
        repo.update_post(&shrunk).unwrap(),
        UpdateOutcome::CapacityBelowCheckIns { checkins: 2 }
    );

    let stored = service.get_post(ada, post).unwrap();
    assert_eq!(stored.post.title, "Board games");
    assert_eq!(stored.post.capacity, 3);

    shrunk.capacity = 2;
    assert_eq!(repo.update_post(&shrunk).unwrap(), UpdateOutcome::Updated);
    assert_eq!(service.get_post(ada, post).unwrap().post.title, "Renamed");
}

#[test]
fn engagement_on_deleted_or_missing_posts_is_not_found() {
    let board = Board::new();
    let ada = seed_user(&board.conn, "ada");
    let post = board.event(ada, 0);
    let service = board.service();
    service.delete_post(ada, post).unwrap();

    assert!(matches!(
        service.like(ada, post).unwrap_err(),
        PostServiceError::PostNotFound(_)
    ));
    assert!(matches!(
        service.check_in(ada, post).unwrap_err(),
        PostServiceError::PostNotFound(_)
    ));
    assert!(matches!(
        service.check_out(ada, Uuid::new_v4()).unwrap_err(),
        PostServiceError::PostNotFound(_)
    ));
}
