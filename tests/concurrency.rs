//! Races that must resolve to a single winner, run against a database file so
//! the pool hands out independent connections.

mod common;

use axum::http::{Method, StatusCode};
use schoolhub::auth::bootstrap_super_admin;
use schoolhub::errors::{SchoolError, SetupTokenError};
use schoolhub::storage::UserRepository;
use serde_json::json;

use common::{read_json, setup_file_backed_app, MEMBER_PASSWORD};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_set_password_has_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_file_backed_app(dir.path()).await;
    let super_admin = app.super_admin_token().await;
    let (_, admin) = app.school_with_admin(&super_admin, "North High", "admin@north.test").await;

    for round in 0..5 {
        let email = format!("teacher{round}@north.test");
        let response = app
            .send(
                Method::POST,
                "/admin/teachers",
                Some(&admin),
                Some(json!({ "name": format!("Teacher {round}"), "email": email })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let token = app.mailer.token_for(&email);

        let (first, second) = tokio::join!(
            app.set_password(&token, MEMBER_PASSWORD),
            app.set_password(&token, "the-other-password"),
        );

        let statuses = [first.status(), second.status()];
        assert_eq!(
            statuses.iter().filter(|s| **s == StatusCode::OK).count(),
            1,
            "round {round}: {statuses:?}"
        );

        let loser = if first.status() == StatusCode::OK { second } else { first };
        assert_eq!(loser.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(loser).await["message"], "Token has already been used");

        let (used,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM password_tokens WHERE token = ? AND is_used = 1")
            .bind(&token)
            .fetch_one(&app.pool)
            .await
            .unwrap();
        assert_eq!(used, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_set_password_through_service() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_file_backed_app(dir.path()).await;
    let super_admin = app.super_admin_token().await;
    let school_id = app.create_school(&super_admin, "North High").await;

    let response = app
        .send(
            Method::POST,
            &format!("/super-admin/schools/{}/admins", school_id),
            Some(&super_admin),
            Some(json!({ "name": "Head", "email": "head@north.test" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let token = app.mailer.token_for("head@north.test");

    let service = app.state().setup_tokens.clone();
    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let service = service.clone();
            let token = token.clone();
            tokio::spawn(async move { service.set_password(&token, &format!("password-{i}")).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(SchoolError::SetupToken(SetupTokenError::AlreadyUsed)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bootstrap_creates_one_super_admin() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_file_backed_app(dir.path()).await;
    let state = app.state();
    let config = &app.config.auth.super_admin;

    let (first, second) = tokio::join!(
        bootstrap_super_admin(&state.pool, state.users.as_ref(), config),
        bootstrap_super_admin(&state.pool, state.users.as_ref(), config),
    );
    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(outcomes.iter().filter(|o| !o.already_exists()).count(), 1);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'SUPER_ADMIN'")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert!(state.users.find_super_admin().await.unwrap().is_some());
}
