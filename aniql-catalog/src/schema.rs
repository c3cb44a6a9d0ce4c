//! The catalog's entity model: thirteen entities, integer surrogate keys,
//! non-cascading foreign keys throughout. Built once into a shared
//! registry on first use.

use aniql::schema::{
    Cardinality, DefaultRule, EntityDescriptor, FieldDescriptor, Registry, RegistryBuilder,
    RelationDescriptor, UniqueConstraint,
};
use aniql::value::{ScalarKind, Value};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Hidden join table carrying the Anime/Genre many-to-many edge.
pub const ANIME_GENRES: &str = "anime_genres";

fn field(name: &str, kind: ScalarKind) -> FieldDescriptor {
    FieldDescriptor {
        name: name.into(),
        kind,
        nullable: false,
        unique: false,
        default: DefaultRule::None,
    }
}

fn id() -> FieldDescriptor {
    FieldDescriptor {
        default: DefaultRule::AutoIncrement,
        ..field("id", ScalarKind::Integer)
    }
}

fn string(name: &str) -> FieldDescriptor {
    field(name, ScalarKind::String)
}

fn string_unique(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        unique: true,
        ..string(name)
    }
}

fn string_opt(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        nullable: true,
        ..string(name)
    }
}

fn string_default(name: &str, value: &str) -> FieldDescriptor {
    FieldDescriptor {
        default: DefaultRule::Literal(Value::from(value)),
        ..string(name)
    }
}

fn int(name: &str) -> FieldDescriptor {
    field(name, ScalarKind::Integer)
}

fn int_opt(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        nullable: true,
        ..int(name)
    }
}

fn int_default(name: &str, value: i64) -> FieldDescriptor {
    FieldDescriptor {
        default: DefaultRule::Literal(Value::Int(value)),
        ..int(name)
    }
}

fn bool_default(name: &str, value: bool) -> FieldDescriptor {
    FieldDescriptor {
        default: DefaultRule::Literal(Value::Bool(value)),
        ..field(name, ScalarKind::Boolean)
    }
}

fn timestamp_now(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        default: DefaultRule::Now,
        ..field(name, ScalarKind::Timestamp)
    }
}

fn timestamp_opt(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        nullable: true,
        ..field(name, ScalarKind::Timestamp)
    }
}

fn one(name: &str, target: &str, fk: &str, inverse: &str) -> RelationDescriptor {
    RelationDescriptor {
        name: name.into(),
        target: target.into(),
        cardinality: Cardinality::One,
        foreign_key: fk.into(),
        join_table: None,
        inverse: Some(inverse.into()),
    }
}

fn many(name: &str, target: &str, fk: &str, inverse: &str) -> RelationDescriptor {
    RelationDescriptor {
        name: name.into(),
        target: target.into(),
        cardinality: Cardinality::Many,
        foreign_key: fk.into(),
        join_table: None,
        inverse: Some(inverse.into()),
    }
}

fn m2m(name: &str, target: &str, inverse: &str) -> RelationDescriptor {
    RelationDescriptor {
        name: name.into(),
        target: target.into(),
        cardinality: Cardinality::ManyToMany,
        foreign_key: String::new(),
        join_table: Some(ANIME_GENRES.into()),
        inverse: Some(inverse.into()),
    }
}

fn unique2(a: &str, b: &str) -> UniqueConstraint {
    UniqueConstraint {
        name: format!("{}_{}", a, b),
        fields: vec![a.into(), b.into()],
    }
}

fn user() -> EntityDescriptor {
    EntityDescriptor {
        name: "User".into(),
        fields: vec![
            id(),
            string_unique("email"),
            string_unique("username"),
            string("password_hash"),
            string_opt("bio"),
            string_opt("avatar_url"),
            string_default("role", "user"),
            timestamp_now("created_at"),
        ],
        relations: vec![
            many("favorites", "Favorite", "user_id", "user"),
            many("comments", "Comment", "user_id", "user"),
            many("comment_likes", "CommentLike", "user_id", "user"),
            many("ratings", "Rating", "user_id", "user"),
            many("following", "Follow", "follower_id", "follower"),
            many("followers", "Follow", "followee_id", "followee"),
            many("notifications", "Notification", "user_id", "user"),
            many("reports", "Report", "reporter_id", "reporter"),
            many("watchlist", "Watchlist", "user_id", "user"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![],
    }
}

fn anime() -> EntityDescriptor {
    EntityDescriptor {
        name: "Anime".into(),
        fields: vec![
            id(),
            string("title"),
            string_opt("synopsis"),
            string_default("status", "ongoing"),
            int_opt("release_year"),
            string_opt("cover_url"),
            timestamp_now("created_at"),
        ],
        relations: vec![
            many("seasons", "Season", "anime_id", "anime"),
            m2m("genres", "Genre", "anime"),
            many("favorites", "Favorite", "anime_id", "anime"),
            many("ratings", "Rating", "anime_id", "anime"),
            many("watchlist", "Watchlist", "anime_id", "anime"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![],
    }
}

fn season() -> EntityDescriptor {
    EntityDescriptor {
        name: "Season".into(),
        fields: vec![id(), int("anime_id"), int("number"), string_opt("title")],
        relations: vec![
            one("anime", "Anime", "anime_id", "seasons"),
            many("episodes", "Episode", "season_id", "season"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![unique2("anime_id", "number")],
    }
}

fn episode() -> EntityDescriptor {
    EntityDescriptor {
        name: "Episode".into(),
        fields: vec![
            id(),
            int("season_id"),
            int("number"),
            string("title"),
            int_opt("duration_minutes"),
            timestamp_opt("air_date"),
        ],
        relations: vec![
            one("season", "Season", "season_id", "episodes"),
            many("comments", "Comment", "episode_id", "episode"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![unique2("season_id", "number")],
    }
}

fn genre() -> EntityDescriptor {
    EntityDescriptor {
        name: "Genre".into(),
        fields: vec![id(), string_unique("name")],
        relations: vec![m2m("anime", "Anime", "genres")],
        primary_key: "id".into(),
        unique_constraints: vec![],
    }
}

fn favorite() -> EntityDescriptor {
    EntityDescriptor {
        name: "Favorite".into(),
        fields: vec![
            id(),
            int("user_id"),
            int("anime_id"),
            timestamp_now("created_at"),
        ],
        relations: vec![
            one("user", "User", "user_id", "favorites"),
            one("anime", "Anime", "anime_id", "favorites"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![unique2("user_id", "anime_id")],
    }
}

fn comment() -> EntityDescriptor {
    EntityDescriptor {
        name: "Comment".into(),
        fields: vec![
            id(),
            int("user_id"),
            int("episode_id"),
            string("body"),
            bool_default("edited", false),
            timestamp_now("created_at"),
        ],
        relations: vec![
            one("user", "User", "user_id", "comments"),
            one("episode", "Episode", "episode_id", "comments"),
            many("likes", "CommentLike", "comment_id", "comment"),
            many("reports", "Report", "comment_id", "comment"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![],
    }
}

fn comment_like() -> EntityDescriptor {
    EntityDescriptor {
        name: "CommentLike".into(),
        fields: vec![id(), int("user_id"), int("comment_id")],
        relations: vec![
            one("user", "User", "user_id", "comment_likes"),
            one("comment", "Comment", "comment_id", "likes"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![unique2("user_id", "comment_id")],
    }
}

fn rating() -> EntityDescriptor {
    EntityDescriptor {
        name: "Rating".into(),
        fields: vec![id(), int("user_id"), int("anime_id"), int("score")],
        relations: vec![
            one("user", "User", "user_id", "ratings"),
            one("anime", "Anime", "anime_id", "ratings"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![unique2("user_id", "anime_id")],
    }
}

fn follow() -> EntityDescriptor {
    EntityDescriptor {
        name: "Follow".into(),
        fields: vec![
            id(),
            int("follower_id"),
            int("followee_id"),
            timestamp_now("created_at"),
        ],
        relations: vec![
            one("follower", "User", "follower_id", "following"),
            one("followee", "User", "followee_id", "followers"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![unique2("follower_id", "followee_id")],
    }
}

fn notification() -> EntityDescriptor {
    EntityDescriptor {
        name: "Notification".into(),
        fields: vec![
            id(),
            int("user_id"),
            string("kind"),
            string("body"),
            bool_default("read", false),
            timestamp_now("created_at"),
        ],
        relations: vec![one("user", "User", "user_id", "notifications")],
        primary_key: "id".into(),
        unique_constraints: vec![],
    }
}

fn report() -> EntityDescriptor {
    EntityDescriptor {
        name: "Report".into(),
        fields: vec![
            id(),
            int("reporter_id"),
            int("comment_id"),
            string("reason"),
            string_default("status", "open"),
            timestamp_now("created_at"),
        ],
        relations: vec![
            one("reporter", "User", "reporter_id", "reports"),
            one("comment", "Comment", "comment_id", "reports"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![],
    }
}

fn watchlist() -> EntityDescriptor {
    EntityDescriptor {
        name: "Watchlist".into(),
        fields: vec![
            id(),
            int("user_id"),
            int("anime_id"),
            string_default("status", "watching"),
            int_default("progress", 0),
            timestamp_now("updated_at"),
        ],
        relations: vec![
            one("user", "User", "user_id", "watchlist"),
            one("anime", "Anime", "anime_id", "watchlist"),
        ],
        primary_key: "id".into(),
        unique_constraints: vec![unique2("user_id", "anime_id")],
    }
}

static REGISTRY: Lazy<Arc<Registry>> = Lazy::new(|| {
    RegistryBuilder::new()
        .entity(user())
        .entity(anime())
        .entity(season())
        .entity(episode())
        .entity(genre())
        .entity(favorite())
        .entity(comment())
        .entity(comment_like())
        .entity(rating())
        .entity(follow())
        .entity(notification())
        .entity(report())
        .entity(watchlist())
        .build()
        .expect("catalog schema is internally consistent")
        .shared()
});

/// Shared catalog registry. The schema is fixed; every client instance
/// points at the same descriptors.
pub fn registry() -> Arc<Registry> {
    REGISTRY.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_thirteen_entities_resolve() {
        let reg = registry();
        for name in [
            "User",
            "Anime",
            "Season",
            "Episode",
            "Genre",
            "Favorite",
            "Comment",
            "CommentLike",
            "Rating",
            "Follow",
            "Notification",
            "Report",
            "Watchlist",
        ] {
            assert!(reg.describe(name).is_ok(), "missing entity {name}");
        }
    }

    #[test]
    fn composite_uniques_are_declared() {
        let reg = registry();
        let fav = reg.describe("Favorite").unwrap();
        let names: Vec<_> = fav
            .all_unique_constraints()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(names.contains(&"user_id_anime_id".to_string()));
    }

    #[test]
    fn genre_edge_rides_the_hidden_join_table() {
        let reg = registry();
        let anime = reg.describe("Anime").unwrap();
        let genres = anime.relation("genres").unwrap();
        assert_eq!(genres.join_table.as_deref(), Some(ANIME_GENRES));
    }
}
