//! Typed per-entity modules: field constructors for filters, ordering and
//! set operations, relation constructors for includes and nested writes,
//! and a `Create` payload struct per entity. Required scalars are plain
//! fields; defaulted and nullable ones are `Option`s that fall back to the
//! schema default when absent. Foreign keys may be supplied directly or
//! through a nested `connect`.

use aniql::mutation::{CreateInput, NestedWrite};
use aniql::types::Record;
use aniql::value::Value;

fn opt(record: &mut Record, field: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        record.set(field, value);
    }
}

pub mod user {
    use super::*;

    pub const ENTITY: &str = "User";

    aniql::int_field!(id, "id");
    aniql::string_field!(email, "email");
    aniql::string_field!(username, "username");
    aniql::string_field!(password_hash, "password_hash");
    aniql::string_field!(bio, "bio");
    aniql::string_field!(avatar_url, "avatar_url");
    aniql::string_field!(role, "role");
    aniql::datetime_field!(created_at, "created_at");

    aniql::relation_many!(favorites, "favorites");
    aniql::relation_many!(comments, "comments");
    aniql::relation_many!(comment_likes, "comment_likes");
    aniql::relation_many!(ratings, "ratings");
    aniql::relation_many!(following, "following");
    aniql::relation_many!(followers, "followers");
    aniql::relation_many!(notifications, "notifications");
    aniql::relation_many!(reports, "reports");
    aniql::relation_many!(watchlist, "watchlist");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub email: String,
        pub username: String,
        pub password_hash: String,
        pub bio: Option<String>,
        pub avatar_url: Option<String>,
        pub role: Option<String>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new()
                .with("email", c.email)
                .with("username", c.username)
                .with("password_hash", c.password_hash);
            opt(&mut values, "bio", c.bio);
            opt(&mut values, "avatar_url", c.avatar_url);
            opt(&mut values, "role", c.role);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod anime {
    use super::*;

    pub const ENTITY: &str = "Anime";

    aniql::int_field!(id, "id");
    aniql::string_field!(title, "title");
    aniql::string_field!(synopsis, "synopsis");
    aniql::string_field!(status, "status");
    aniql::int_field!(release_year, "release_year");
    aniql::string_field!(cover_url, "cover_url");
    aniql::datetime_field!(created_at, "created_at");

    aniql::relation_many!(seasons, "seasons");
    aniql::relation_m2m!(genres, "genres");
    aniql::relation_many!(favorites, "favorites");
    aniql::relation_many!(ratings, "ratings");
    aniql::relation_many!(watchlist, "watchlist");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub title: String,
        pub synopsis: Option<String>,
        pub status: Option<String>,
        pub release_year: Option<i64>,
        pub cover_url: Option<String>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new().with("title", c.title);
            opt(&mut values, "synopsis", c.synopsis);
            opt(&mut values, "status", c.status);
            opt(&mut values, "release_year", c.release_year);
            opt(&mut values, "cover_url", c.cover_url);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod season {
    use super::*;

    pub const ENTITY: &str = "Season";

    aniql::int_field!(id, "id");
    aniql::int_field!(anime_id, "anime_id");
    aniql::int_field!(number, "number");
    aniql::string_field!(title, "title");

    aniql::relation_one!(anime, "anime");
    aniql::relation_many!(episodes, "episodes");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub anime_id: Option<i64>,
        pub number: i64,
        pub title: Option<String>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new().with("number", c.number);
            opt(&mut values, "anime_id", c.anime_id);
            opt(&mut values, "title", c.title);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod episode {
    use super::*;
    use chrono::{DateTime, Utc};

    pub const ENTITY: &str = "Episode";

    aniql::int_field!(id, "id");
    aniql::int_field!(season_id, "season_id");
    aniql::int_field!(number, "number");
    aniql::string_field!(title, "title");
    aniql::int_field!(duration_minutes, "duration_minutes");
    aniql::datetime_field!(air_date, "air_date");

    aniql::relation_one!(season, "season");
    aniql::relation_many!(comments, "comments");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub season_id: Option<i64>,
        pub number: i64,
        pub title: String,
        pub duration_minutes: Option<i64>,
        pub air_date: Option<DateTime<Utc>>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new()
                .with("number", c.number)
                .with("title", c.title);
            opt(&mut values, "season_id", c.season_id);
            opt(&mut values, "duration_minutes", c.duration_minutes);
            opt(&mut values, "air_date", c.air_date);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod genre {
    use super::*;

    pub const ENTITY: &str = "Genre";

    aniql::int_field!(id, "id");
    aniql::string_field!(name, "name");

    aniql::relation_m2m!(anime, "anime");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub name: String,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            CreateInput {
                values: Record::new().with("name", c.name),
                nested: c.nested,
            }
        }
    }
}

pub mod favorite {
    use super::*;

    pub const ENTITY: &str = "Favorite";

    aniql::int_field!(id, "id");
    aniql::int_field!(user_id, "user_id");
    aniql::int_field!(anime_id, "anime_id");
    aniql::datetime_field!(created_at, "created_at");

    aniql::relation_one!(user, "user");
    aniql::relation_one!(anime, "anime");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub user_id: Option<i64>,
        pub anime_id: Option<i64>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new();
            opt(&mut values, "user_id", c.user_id);
            opt(&mut values, "anime_id", c.anime_id);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod comment {
    use super::*;

    pub const ENTITY: &str = "Comment";

    aniql::int_field!(id, "id");
    aniql::int_field!(user_id, "user_id");
    aniql::int_field!(episode_id, "episode_id");
    aniql::string_field!(body, "body");
    aniql::bool_field!(edited, "edited");
    aniql::datetime_field!(created_at, "created_at");

    aniql::relation_one!(user, "user");
    aniql::relation_one!(episode, "episode");
    aniql::relation_many!(likes, "likes");
    aniql::relation_many!(reports, "reports");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub user_id: Option<i64>,
        pub episode_id: Option<i64>,
        pub body: String,
        pub edited: Option<bool>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new().with("body", c.body);
            opt(&mut values, "user_id", c.user_id);
            opt(&mut values, "episode_id", c.episode_id);
            opt(&mut values, "edited", c.edited);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod comment_like {
    use super::*;

    pub const ENTITY: &str = "CommentLike";

    aniql::int_field!(id, "id");
    aniql::int_field!(user_id, "user_id");
    aniql::int_field!(comment_id, "comment_id");

    aniql::relation_one!(user, "user");
    aniql::relation_one!(comment, "comment");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub user_id: Option<i64>,
        pub comment_id: Option<i64>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new();
            opt(&mut values, "user_id", c.user_id);
            opt(&mut values, "comment_id", c.comment_id);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod rating {
    use super::*;

    pub const ENTITY: &str = "Rating";

    aniql::int_field!(id, "id");
    aniql::int_field!(user_id, "user_id");
    aniql::int_field!(anime_id, "anime_id");
    aniql::int_field!(score, "score");

    aniql::relation_one!(user, "user");
    aniql::relation_one!(anime, "anime");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub user_id: Option<i64>,
        pub anime_id: Option<i64>,
        pub score: i64,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new().with("score", c.score);
            opt(&mut values, "user_id", c.user_id);
            opt(&mut values, "anime_id", c.anime_id);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod follow {
    use super::*;

    pub const ENTITY: &str = "Follow";

    aniql::int_field!(id, "id");
    aniql::int_field!(follower_id, "follower_id");
    aniql::int_field!(followee_id, "followee_id");
    aniql::datetime_field!(created_at, "created_at");

    aniql::relation_one!(follower, "follower");
    aniql::relation_one!(followee, "followee");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub follower_id: Option<i64>,
        pub followee_id: Option<i64>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new();
            opt(&mut values, "follower_id", c.follower_id);
            opt(&mut values, "followee_id", c.followee_id);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod notification {
    use super::*;

    pub const ENTITY: &str = "Notification";

    aniql::int_field!(id, "id");
    aniql::int_field!(user_id, "user_id");
    aniql::string_field!(kind, "kind");
    aniql::string_field!(body, "body");
    aniql::bool_field!(read, "read");
    aniql::datetime_field!(created_at, "created_at");

    aniql::relation_one!(user, "user");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub user_id: Option<i64>,
        pub kind: String,
        pub body: String,
        pub read: Option<bool>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new().with("kind", c.kind).with("body", c.body);
            opt(&mut values, "user_id", c.user_id);
            opt(&mut values, "read", c.read);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod report {
    use super::*;

    pub const ENTITY: &str = "Report";

    aniql::int_field!(id, "id");
    aniql::int_field!(reporter_id, "reporter_id");
    aniql::int_field!(comment_id, "comment_id");
    aniql::string_field!(reason, "reason");
    aniql::string_field!(status, "status");
    aniql::datetime_field!(created_at, "created_at");

    aniql::relation_one!(reporter, "reporter");
    aniql::relation_one!(comment, "comment");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub reporter_id: Option<i64>,
        pub comment_id: Option<i64>,
        pub reason: String,
        pub status: Option<String>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new().with("reason", c.reason);
            opt(&mut values, "reporter_id", c.reporter_id);
            opt(&mut values, "comment_id", c.comment_id);
            opt(&mut values, "status", c.status);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}

pub mod watchlist {
    use super::*;

    pub const ENTITY: &str = "Watchlist";

    aniql::int_field!(id, "id");
    aniql::int_field!(user_id, "user_id");
    aniql::int_field!(anime_id, "anime_id");
    aniql::string_field!(status, "status");
    aniql::int_field!(progress, "progress");
    aniql::datetime_field!(updated_at, "updated_at");

    aniql::relation_one!(user, "user");
    aniql::relation_one!(anime, "anime");

    #[derive(Clone, Debug, Default)]
    pub struct Create {
        pub user_id: Option<i64>,
        pub anime_id: Option<i64>,
        pub status: Option<String>,
        pub progress: Option<i64>,
        pub nested: Vec<NestedWrite>,
    }

    impl From<Create> for CreateInput {
        fn from(c: Create) -> CreateInput {
            let mut values = Record::new();
            opt(&mut values, "user_id", c.user_id);
            opt(&mut values, "anime_id", c.anime_id);
            opt(&mut values, "status", c.status);
            opt(&mut values, "progress", c.progress);
            CreateInput {
                values,
                nested: c.nested,
            }
        }
    }
}
