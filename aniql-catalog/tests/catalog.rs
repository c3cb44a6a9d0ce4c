//! End-to-end tests: the typed catalog client over the in-memory backend.

use aniql::aggregate::{AggregateTarget, HavingNode};
use aniql::filter::FieldOp;
use aniql_catalog::{
    anime, favorite, genre, notification, rating, season, user, watchlist, BatchQuery,
    CatalogClient, Error, ErrorKind, FilterNode, TransactionOptions, Value,
};
use std::time::Duration;

fn fresh_client() -> CatalogClient {
    let _ = env_logger::builder().is_test(true).try_init();
    CatalogClient::in_memory()
}

async fn seed_user(client: &CatalogClient, email: &str, username: &str) -> i64 {
    let created = client
        .user()
        .create(
            user::Create {
                email: email.into(),
                username: username.into(),
                password_hash: "hash".into(),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();
    created.get("id").as_i64().unwrap()
}

async fn seed_anime(client: &CatalogClient, title: &str) -> i64 {
    let created = client
        .anime()
        .create(
            anime::Create {
                title: title.into(),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();
    created.get("id").as_i64().unwrap()
}

#[tokio::test]
async fn create_applies_schema_defaults() {
    let client = fresh_client();
    let created = client
        .user()
        .create(
            user::Create {
                email: "a@example.com".into(),
                username: "a".into(),
                password_hash: "hash".into(),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();

    assert_eq!(created.get("role"), &Value::from("user"));
    assert_eq!(created.get("bio"), &Value::Null);
    assert!(matches!(created.get("created_at"), Value::DateTime(_)));
}

#[tokio::test]
async fn unique_constraints_reject_duplicates() {
    let client = fresh_client();
    seed_user(&client, "a@example.com", "a").await;

    let err = client
        .user()
        .create(
            user::Create {
                email: "a@example.com".into(),
                username: "other".into(),
                password_hash: "hash".into(),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::UniqueViolation { ref constraint, .. } if constraint == "email"
    ));
    assert_eq!(err.kind(), ErrorKind::Constraint);
}

#[tokio::test]
async fn find_unique_by_typed_field() {
    let client = fresh_client();
    seed_user(&client, "a@example.com", "a").await;

    let found = client
        .user()
        .find_unique(user::email::equals("a@example.com"))
        .exec()
        .await
        .unwrap();
    assert_eq!(found.unwrap().get("username"), &Value::from("a"));

    let missing = client
        .user()
        .find_unique(user::email::equals("nobody@example.com"))
        .exec()
        .await
        .unwrap();
    assert!(missing.is_none());

    // A non-unique field cannot address find_unique.
    let err = client
        .user()
        .find_unique(user::password_hash::equals("hash"))
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn null_semantics_in_filters() {
    let client = fresh_client();
    seed_user(&client, "a@example.com", "a").await;

    // bio is null: not_equals treats null as "not the value".
    let rows = client
        .user()
        .find_many(Some(user::bio::not_equals("anything")))
        .exec()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    // Ordering comparisons on a string field are rejected outright.
    let err = client
        .user()
        .find_many(Some(FilterNode::leaf(
            "bio",
            FieldOp::Gt(Value::from("a")),
        )))
        .exec()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOperator { .. }));

    // On a nullable numeric field, gt/lt never match null.
    seed_anime(&client, "X").await;
    let rows = client
        .anime()
        .find_many(Some(anime::release_year::gt(1990)))
        .exec()
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = client
        .user()
        .find_many(Some(user::bio::is_null()))
        .exec()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn select_and_include_conflict() {
    let client = fresh_client();
    seed_user(&client, "a@example.com", "a").await;

    let err = client
        .user()
        .find_many(None)
        .select(vec![aniql::Selection::Field("email".into())])
        .with(user::favorites::fetch(None))
        .exec()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingProjection { .. }));
}

#[tokio::test]
async fn select_narrows_output_shape() {
    let client = fresh_client();
    seed_user(&client, "a@example.com", "a").await;

    let rows = client
        .user()
        .find_many(None)
        .select(vec![aniql::Selection::Field("email".into())])
        .exec()
        .await
        .unwrap();
    assert_eq!(rows[0].get("email"), &Value::from("a@example.com"));
    assert_eq!(rows[0].get("username"), &Value::Null);
    assert_eq!(rows[0].fields.len(), 1);
}

#[tokio::test]
async fn nested_include_loads_related_record() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;
    let aid = seed_anime(&client, "X").await;

    client
        .favorite()
        .create(
            favorite::Create {
                user_id: Some(uid),
                anime_id: Some(aid),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();

    let favs = client
        .favorite()
        .find_many(Some(favorite::user_id::equals(uid)))
        .with(favorite::anime::fetch())
        .exec()
        .await
        .unwrap();
    assert_eq!(favs.len(), 1);
    let anime = favs[0].one("anime").expect("anime loaded");
    assert_eq!(anime.get("title"), &Value::from("X"));
}

#[tokio::test]
async fn connect_resolves_foreign_key_before_insert() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;
    let aid = seed_anime(&client, "X").await;

    let fav = client
        .favorite()
        .create(
            favorite::Create {
                user_id: Some(uid),
                nested: vec![favorite::anime::connect(anime::id::equals(aid))],
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();
    assert_eq!(fav.get("anime_id").as_i64(), Some(aid));

    // Connecting to a missing record fails and writes nothing.
    let err = client
        .favorite()
        .create(
            favorite::Create {
                user_id: Some(uid),
                nested: vec![favorite::anime::connect(anime::id::equals(aid + 100))],
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(client.favorite().count(None).exec().await.unwrap(), 1);
}

#[tokio::test]
async fn nested_create_injects_parent_key() {
    let client = fresh_client();
    let created = client
        .anime()
        .create(
            anime::Create {
                title: "X".into(),
                nested: vec![anime::seasons::create(vec![
                    season::Create {
                        number: 1,
                        ..Default::default()
                    }
                    .into(),
                    season::Create {
                        number: 2,
                        ..Default::default()
                    }
                    .into(),
                ])],
                ..Default::default()
            }
            .into(),
        )
        .with(anime::seasons::fetch(None))
        .exec()
        .await
        .unwrap();

    let seasons = created.many("seasons");
    assert_eq!(seasons.len(), 2);
    assert_eq!(seasons[0].get("anime_id"), created.get("id"));
}

#[tokio::test]
async fn many_to_many_connect_and_include() {
    let client = fresh_client();
    let aid = seed_anime(&client, "X").await;
    client
        .genre()
        .create(
            genre::Create {
                name: "Action".into(),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();

    client
        .anime()
        .update(anime::id::equals(aid), vec![])
        .nested(anime::genres::connect(genre::name::equals("Action")))
        .exec()
        .await
        .unwrap();

    let got = client
        .anime()
        .find_unique(anime::id::equals(aid))
        .with(anime::genres::fetch(None))
        .exec()
        .await
        .unwrap()
        .unwrap();
    let genres = got.many("genres");
    assert_eq!(genres.len(), 1);
    assert_eq!(genres[0].get("name"), &Value::from("Action"));

    // The edge is visible from the other side too.
    let from_genre = client
        .genre()
        .find_unique(genre::name::equals("Action"))
        .with(genre::anime::fetch(None))
        .exec()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_genre.many("anime").len(), 1);
}

#[tokio::test]
async fn cursor_window_includes_anchor_only_at_skip_zero() {
    let client = fresh_client();
    for title in ["A", "B", "C", "D"] {
        seed_anime(&client, title).await;
    }

    let rows = client
        .anime()
        .find_many(None)
        .order_by(anime::id::asc())
        .cursor(2i64)
        .take(2)
        .exec()
        .await
        .unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.get("id").as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 3]);

    let rows = client
        .anime()
        .find_many(None)
        .order_by(anime::id::asc())
        .cursor(2i64)
        .skip(1)
        .take(2)
        .exec()
        .await
        .unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.get("id").as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 4]);

    // Negative take: window ending at the anchor, still ascending.
    let rows = client
        .anime()
        .find_many(None)
        .order_by(anime::id::asc())
        .cursor(3i64)
        .take(-2)
        .exec()
        .await
        .unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.get("id").as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 3]);

    // Missing anchor resolves to an empty window, not an error.
    let rows = client
        .anime()
        .find_many(None)
        .order_by(anime::id::asc())
        .cursor(99i64)
        .take(2)
        .exec()
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn upsert_is_idempotent_on_compound_key() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;
    let aid = seed_anime(&client, "X").await;

    let where_ = FilterNode::and(vec![
        watchlist::user_id::equals(uid),
        watchlist::anime_id::equals(aid),
    ]);
    let create = watchlist::Create {
        user_id: Some(uid),
        anime_id: Some(aid),
        ..Default::default()
    };

    let first = client
        .watchlist()
        .upsert(
            where_.clone(),
            create.clone().into(),
            vec![watchlist::progress::increment(1)],
        )
        .exec()
        .await
        .unwrap();
    assert_eq!(first.get("progress"), &Value::Int(0));
    assert_eq!(first.get("status"), &Value::from("watching"));

    let second = client
        .watchlist()
        .upsert(where_, create.into(), vec![watchlist::progress::increment(1)])
        .exec()
        .await
        .unwrap();
    assert_eq!(second.get("progress"), &Value::Int(1));
    assert_eq!(client.watchlist().count(None).exec().await.unwrap(), 1);
}

#[tokio::test]
async fn partial_compound_key_is_rejected() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;

    let err = client
        .watchlist()
        .upsert(
            watchlist::user_id::equals(uid),
            watchlist::Create {
                user_id: Some(uid),
                anime_id: Some(1),
                ..Default::default()
            }
            .into(),
            vec![],
        )
        .exec()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedCompoundKey { .. }));
}

#[tokio::test]
async fn delete_is_restricted_by_references() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;
    let aid = seed_anime(&client, "X").await;
    client
        .favorite()
        .create(
            favorite::Create {
                user_id: Some(uid),
                anime_id: Some(aid),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();

    let err = client
        .anime()
        .delete(anime::id::equals(aid))
        .exec()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrityViolation { .. }));

    client
        .favorite()
        .delete_many(Some(favorite::anime_id::equals(aid)))
        .exec()
        .await
        .unwrap();
    client.anime().delete(anime::id::equals(aid)).exec().await.unwrap();
    assert_eq!(client.anime().count(None).exec().await.unwrap(), 0);
}

#[tokio::test]
async fn update_many_honors_limit_and_zero_matches() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;
    for i in 0..3 {
        client
            .notification()
            .create(
                notification::Create {
                    user_id: Some(uid),
                    kind: "follow".into(),
                    body: format!("n{i}"),
                    ..Default::default()
                }
                .into(),
            )
            .exec()
            .await
            .unwrap();
    }

    let batch = client
        .notification()
        .update_many(
            Some(notification::read::equals(false)),
            vec![notification::read::set(true)],
        )
        .limit(2)
        .exec()
        .await
        .unwrap();
    assert_eq!(batch.count, 2);

    let unread = client
        .notification()
        .count(Some(notification::read::equals(false)))
        .exec()
        .await
        .unwrap();
    assert_eq!(unread, 1);

    // Zero matches is count 0, not an error.
    let batch = client
        .notification()
        .update_many(
            Some(notification::kind::equals("none-such")),
            vec![notification::read::set(true)],
        )
        .exec()
        .await
        .unwrap();
    assert_eq!(batch.count, 0);
}

#[tokio::test]
async fn atomic_multiply_and_divide() {
    let client = fresh_client();
    let aid = seed_anime(&client, "X").await;
    client
        .anime()
        .update(
            anime::id::equals(aid),
            vec![anime::release_year::set(1998i64)],
        )
        .exec()
        .await
        .unwrap();

    let updated = client
        .anime()
        .update(
            anime::id::equals(aid),
            vec![anime::release_year::multiply(2)],
        )
        .exec()
        .await
        .unwrap();
    assert_eq!(updated.get("release_year"), &Value::Int(3996));

    let updated = client
        .anime()
        .update(anime::id::equals(aid), vec![anime::release_year::divide(4)])
        .exec()
        .await
        .unwrap();
    assert_eq!(updated.get("release_year"), &Value::Int(999));

    // Negative divisors divide; they are not clamped away.
    let updated = client
        .anime()
        .update(
            anime::id::equals(aid),
            vec![anime::release_year::divide(-3)],
        )
        .exec()
        .await
        .unwrap();
    assert_eq!(updated.get("release_year"), &Value::Int(-333));

    let err = client
        .anime()
        .update(anime::id::equals(aid), vec![anime::release_year::divide(0)])
        .exec()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn aggregate_and_group_by() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;
    let uid2 = seed_user(&client, "b@example.com", "b").await;
    let aid = seed_anime(&client, "X").await;
    for (user_id, score) in [(uid, 4), (uid2, 8)] {
        client
            .rating()
            .create(
                rating::Create {
                    user_id: Some(user_id),
                    anime_id: Some(aid),
                    score,
                    ..Default::default()
                }
                .into(),
            )
            .exec()
            .await
            .unwrap();
    }

    let agg = client
        .rating()
        .aggregate(Some(rating::anime_id::equals(aid)))
        .avg("score")
        .exec()
        .await
        .unwrap();
    assert_eq!(agg.count(), 2);
    assert_eq!(agg.aggregates.get("_avg_score"), Some(&Value::Float(6.0)));

    // groupBy watchlist status with a having clause on the key.
    for (user_id, status) in [(uid, "watching"), (uid2, "watching"), (uid, "done")] {
        client
            .watchlist()
            .create(
                watchlist::Create {
                    user_id: Some(user_id),
                    anime_id: Some(if status == "done" {
                        seed_anime(&client, "Y").await
                    } else {
                        aid
                    }),
                    status: Some(status.into()),
                    ..Default::default()
                }
                .into(),
            )
            .exec()
            .await
            .unwrap();
    }
    let groups = client
        .watchlist()
        .group_by(vec!["status".into()])
        .having(HavingNode::Cond {
            target: AggregateTarget::Group("status".into()),
            op: FieldOp::Equals(Value::from("watching")),
        })
        .exec()
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].key.get("status"), Some(&Value::from("watching")));
    assert_eq!(groups[0].count(), 2);

    // The empty grouping key is rejected.
    let err = client
        .watchlist()
        .group_by(vec![])
        .exec()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyGroupKey { .. }));
}

#[tokio::test]
async fn relation_quantifiers_on_the_client_surface() {
    let client = fresh_client();
    let uid = seed_user(&client, "a@example.com", "a").await;
    seed_user(&client, "b@example.com", "b").await;
    let aid = seed_anime(&client, "X").await;
    client
        .favorite()
        .create(
            favorite::Create {
                user_id: Some(uid),
                anime_id: Some(aid),
                ..Default::default()
            }
            .into(),
        )
        .exec()
        .await
        .unwrap();

    let with_fav = client
        .user()
        .find_many(Some(user::favorites::some(favorite::anime_id::equals(aid))))
        .exec()
        .await
        .unwrap();
    assert_eq!(with_fav.len(), 1);
    assert_eq!(with_fav[0].get("username"), &Value::from("a"));

    // `every` holds vacuously for the user with no favorites.
    let all_match = client
        .user()
        .find_many(Some(user::favorites::every(favorite::anime_id::equals(
            aid,
        ))))
        .exec()
        .await
        .unwrap();
    assert_eq!(all_match.len(), 2);
}

#[tokio::test]
async fn batch_rolls_back_on_step_failure() {
    let client = fresh_client();
    let steps = vec![
        BatchQuery::Create {
            entity: user::ENTITY.into(),
            input: user::Create {
                email: "a@example.com".into(),
                username: "a".into(),
                password_hash: "hash".into(),
                ..Default::default()
            }
            .into(),
        },
        // Dangling anime_id: the whole batch must fail.
        BatchQuery::Create {
            entity: favorite::ENTITY.into(),
            input: favorite::Create {
                user_id: Some(1),
                anime_id: Some(999),
                ..Default::default()
            }
            .into(),
        },
    ];

    let err = client
        .batch(steps, TransactionOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::TransactionStepFailed { step, source, .. } => {
            assert_eq!(step, 1);
            assert!(matches!(*source, Error::ForeignKeyNotFound { .. }));
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert_eq!(client.user().count(None).exec().await.unwrap(), 0);
}

#[tokio::test]
async fn interactive_transaction_commits_or_rolls_back() {
    let client = fresh_client();

    let err = client
        .transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.entity(user::ENTITY)
                    .create(
                        user::Create {
                            email: "a@example.com".into(),
                            username: "a".into(),
                            password_hash: "hash".into(),
                            ..Default::default()
                        }
                        .into(),
                    )
                    .exec()
                    .await?;
                tx.entity(favorite::ENTITY)
                    .create(
                        favorite::Create {
                            user_id: Some(1),
                            anime_id: Some(999),
                            ..Default::default()
                        }
                        .into(),
                    )
                    .exec()
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ForeignKeyNotFound { .. }));
    assert_eq!(client.user().count(None).exec().await.unwrap(), 0);

    client
        .transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.entity(user::ENTITY)
                    .create(
                        user::Create {
                            email: "a@example.com".into(),
                            username: "a".into(),
                            password_hash: "hash".into(),
                            ..Default::default()
                        }
                        .into(),
                    )
                    .exec()
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();
    assert_eq!(client.user().count(None).exec().await.unwrap(), 1);
}

#[tokio::test]
async fn transaction_timeouts_are_classified() {
    let client = fresh_client();

    let opts = TransactionOptions {
        timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let err = client
        .transaction(opts, |_tx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TransactionTimeout));
    assert_eq!(err.kind(), ErrorKind::Transaction);

    // An open session makes acquisition time out, not hang.
    let client2 = client.clone();
    let err = client
        .transaction(TransactionOptions::default(), |_tx| {
            let client2 = client2.clone();
            Box::pin(async move {
                let opts = TransactionOptions {
                    max_wait: Duration::from_millis(50),
                    ..Default::default()
                };
                client2.batch(vec![], opts).await.map(|_| ())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TransactionAcquireTimeout));
}
