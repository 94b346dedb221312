use payloads::requests;
use reqwest::StatusCode;

use test_helpers::{ADMIN_HANDLE, assert_status_code, spawn_app};

#[tokio::test]
async fn login_refused() -> anyhow::Result<()> {
    let app = spawn_app().await;

    // test a login with an invalid user
    let body = requests::LoginCredentials {
        handle: "random".into(),
        password: "random".into(),
    };
    let result = app.client.login(&body).await;

    match result {
        Err(payloads::ClientError::APIError(code, text)) => {
            assert_eq!(code, StatusCode::UNAUTHORIZED);
            assert_eq!(text, "Authentication failed: Invalid credentials");
        }
        _ => {
            panic!("Expected APIError");
        }
    }

    // login check should fail
    let is_logged_in = app.client.login_check().await?;
    assert!(!is_logged_in);

    Ok(())
}

#[tokio::test]
async fn create_account_logs_in() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let alice = app.create_user("alice").await?;
    assert!(alice.login_check().await?);

    let profile = alice.user_profile().await?;
    assert_eq!(profile.user.handle, "alice");
    assert_eq!(profile.total_point, 0);
    assert!(profile.group.is_none());
    assert!(!profile.is_admin);

    alice.logout().await?;
    assert!(!alice.login_check().await?);

    // and back in with the password
    let alice = app.login_as("alice").await?;
    assert!(alice.login_check().await?);

    Ok(())
}

#[tokio::test]
async fn wrong_password_refused() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_user("alice").await?;

    let result = app
        .client
        .login(&requests::LoginCredentials {
            handle: "alice".into(),
            password: "not-the-password".into(),
        })
        .await;
    assert_status_code(result, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn admin_profile() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let profile = app.admin.user_profile().await?;
    assert_eq!(profile.user.handle, ADMIN_HANDLE);
    assert!(profile.is_admin);

    Ok(())
}

#[tokio::test]
async fn invalid_handles_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let mut body = requests::CreateAccount {
        handle: "X".repeat(21),
        display_name: None,
        password: "a-password".into(),
        group: None,
    };
    let result = app.client.create_account(&body).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    body.handle = "has space".into();
    let result = app.client.create_account(&body).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    body.handle = "valid_handle".into();
    body.password = String::new();
    let result = app.client.create_account(&body).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    body.password = "a-password".into();
    body.display_name = Some("X".repeat(256));
    let result = app.client.create_account(&body).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    body.display_name = None;
    for (campus, class_num) in [("", 1), ("Seoul", 0), ("X", -3)] {
        body.group = Some(payloads::UserGroup {
            campus: campus.into(),
            class_num,
        });
        let result = app.client.create_account(&body).await;
        assert_status_code(result, StatusCode::BAD_REQUEST);
    }

    Ok(())
}

#[tokio::test]
async fn duplicate_handle_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_user("alice").await?;

    let result = app
        .client
        .create_account(&requests::CreateAccount {
            handle: "alice".into(),
            display_name: None,
            password: "another-password".into(),
            group: None,
        })
        .await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn profile_requires_login() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let result = app.client.user_profile().await;
    assert_status_code(result, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn profile_shows_group() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let bob = app.create_user_in_group("bob", "Daejeon", 3).await?;
    let profile = bob.user_profile().await?;
    assert_eq!(
        profile.group,
        Some(payloads::UserGroup {
            campus: "Daejeon".into(),
            class_num: 3,
        })
    );

    Ok(())
}
