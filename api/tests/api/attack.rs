use std::time::Duration;

use jiff::SignedDuration;
use payloads::responses::AttackRejectionCode;
use payloads::{RaidStatus, requests};
use reqwest::StatusCode;

use test_helpers::{assert_rejected, raid_details, spawn_app};

#[tokio::test]
async fn ten_solvers_clear_the_boss() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;

    let alice = app.create_solver("alice").await?;
    let outcome = alice.attack_raid(&raid_id).await?;
    assert!(outcome.solved);
    assert_eq!(outcome.damage, 1);
    assert_eq!(outcome.new_hp, 9);
    assert!(!outcome.raid_cleared);

    // a second attack is rejected without touching the boss
    assert_rejected(
        alice.attack_raid(&raid_id).await,
        StatusCode::CONFLICT,
        AttackRejectionCode::AlreadySolved,
    );
    assert_eq!(app.current_hp(&raid_id).await?, 9);

    let mut handles = vec!["alice".to_string()];
    for i in 1..10 {
        let handle = format!("solver{i}");
        let client = app.create_solver(&handle).await?;
        let outcome = client.attack_raid(&raid_id).await?;
        assert_eq!(outcome.new_hp, 9 - i);
        assert_eq!(outcome.raid_cleared, i == 9);
        handles.push(handle);
    }

    assert_eq!(app.status(&raid_id).await?, RaidStatus::Success);
    assert_eq!(app.current_hp(&raid_id).await?, 0);
    for handle in &handles {
        assert_eq!(app.total_point(handle).await?, 100, "{handle}");
    }

    let late = app.create_solver("latecomer").await?;
    assert_rejected(
        late.attack_raid(&raid_id).await,
        StatusCode::BAD_REQUEST,
        AttackRejectionCode::RaidNotActive,
    );
    assert_eq!(app.total_point("latecomer").await?, 0);

    Ok(())
}

#[tokio::test]
async fn unsolved_attack_starts_cooldown() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;

    let bob = app.create_user("bob").await?;
    let outcome = bob.attack_raid(&raid_id).await?;
    assert!(!outcome.solved);
    assert_eq!(outcome.damage, 0);
    assert_eq!(outcome.new_hp, 10);

    let participation = bob.get_participation(&raid_id).await?.unwrap();
    assert!(!participation.is_solved);
    assert_eq!(participation.last_attempt_at, Some(app.time_source.now()));

    app.time_source.advance(SignedDuration::from_secs(15));
    let rejection = assert_rejected(
        bob.attack_raid(&raid_id).await,
        StatusCode::TOO_MANY_REQUESTS,
        AttackRejectionCode::Cooldown,
    );
    assert_eq!(rejection.remaining_seconds, Some(45));

    // the cooldown is per user
    let carol = app.create_user("carol").await?;
    carol.attack_raid(&raid_id).await?;

    // solving after the cooldown lands a hit
    app.time_source.advance(SignedDuration::from_secs(45));
    app.checker.mark_solved("bob", test_helpers::TEST_PROBLEM_ID);
    let outcome = bob.attack_raid(&raid_id).await?;
    assert!(outcome.solved);
    assert_eq!(outcome.new_hp, 9);

    let participation = bob.get_participation(&raid_id).await?.unwrap();
    assert_eq!(participation.solved_at, Some(app.time_source.now()));

    Ok(())
}

#[tokio::test]
async fn rejected_cooldown_does_not_extend_it() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;

    let bob = app.create_user("bob").await?;
    bob.attack_raid(&raid_id).await?;
    let first_attempt = app.time_source.now();

    app.time_source.advance(SignedDuration::from_secs(30));
    assert_rejected(
        bob.attack_raid(&raid_id).await,
        StatusCode::TOO_MANY_REQUESTS,
        AttackRejectionCode::Cooldown,
    );
    let participation = bob.get_participation(&raid_id).await?.unwrap();
    assert_eq!(participation.last_attempt_at, Some(first_attempt));

    app.time_source.advance(SignedDuration::from_secs(30));
    bob.attack_raid(&raid_id).await?;

    Ok(())
}

#[tokio::test]
async fn checker_outage_leaves_no_trace() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;
    let alice = app.create_solver("alice").await?;

    app.checker.set_unavailable(true);
    assert_rejected(
        alice.attack_raid(&raid_id).await,
        StatusCode::SERVICE_UNAVAILABLE,
        AttackRejectionCode::CheckerUnavailable,
    );
    assert!(alice.get_participation(&raid_id).await?.is_none());
    assert_eq!(app.current_hp(&raid_id).await?, 10);

    // retrying immediately is fine, no cooldown was consumed
    app.checker.set_unavailable(false);
    let outcome = alice.attack_raid(&raid_id).await?;
    assert_eq!(outcome.new_hp, 9);

    Ok(())
}

#[tokio::test]
async fn anonymous_and_unknown_raid() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;

    assert_rejected(
        app.client.attack_raid(&raid_id).await,
        StatusCode::UNAUTHORIZED,
        AttackRejectionCode::NotLoggedIn,
    );

    let alice = app.create_solver("alice").await?;
    assert_rejected(
        alice
            .attack_raid(&payloads::RaidId(uuid::Uuid::new_v4()))
            .await,
        StatusCode::NOT_FOUND,
        AttackRejectionCode::RaidNotFound,
    );

    Ok(())
}

#[tokio::test]
async fn ready_raid_rejects_attacks() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_raid(&raid_details(&app.time_source)).await?;
    let alice = app.create_solver("alice").await?;

    assert_rejected(
        alice.attack_raid(&raid_id).await,
        StatusCode::BAD_REQUEST,
        AttackRejectionCode::RaidNotActive,
    );
    assert!(alice.get_participation(&raid_id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn active_raid_outside_window_rejects_attacks() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;
    let alice = app.create_solver("alice").await?;

    // past end_at, but nothing has swept the raid to FAIL yet
    app.time_source.advance(SignedDuration::from_hours(2));
    assert_eq!(app.status(&raid_id).await?, RaidStatus::Active);
    assert_rejected(
        alice.attack_raid(&raid_id).await,
        StatusCode::BAD_REQUEST,
        AttackRejectionCode::RaidTimeInvalid,
    );

    // before start_at
    let mut details = raid_details(&app.time_source);
    details.start_at = app.time_source.now() + SignedDuration::from_hours(1);
    details.end_at = app.time_source.now() + SignedDuration::from_hours(2);
    let future_raid = app.create_raid(&details).await?;
    app.admin
        .update_raid(&requests::UpdateRaid::status(
            future_raid,
            RaidStatus::Active,
        ))
        .await?;
    assert_rejected(
        alice.attack_raid(&future_raid).await,
        StatusCode::BAD_REQUEST,
        AttackRejectionCode::RaidTimeInvalid,
    );
    assert!(alice.get_participation(&future_raid).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn raid_closed_during_check_drops_unsolved_attempt() -> anyhow::Result<()>
{
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;
    let bob = app.create_user("bob").await?;

    // the admin fails the raid while bob's check is still in flight
    app.checker.set_delay(Some(Duration::from_secs(1)));
    let attack =
        tokio::spawn(async move { bob.attack_raid(&raid_id).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    app.admin
        .update_raid(&requests::UpdateRaid::status(raid_id, RaidStatus::Fail))
        .await?;

    assert_rejected(
        attack.await?,
        StatusCode::BAD_REQUEST,
        AttackRejectionCode::RaidNotActive,
    );
    let bob = app.login_as("bob").await?;
    assert!(bob.get_participation(&raid_id).await?.is_none());
    assert_eq!(app.current_hp(&raid_id).await?, 10);

    Ok(())
}

#[tokio::test]
async fn overkill_floors_hp_at_zero() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let mut details = raid_details(&app.time_source);
    details.max_hp = 5;
    details.damage_per_hit = 3;
    let raid_id = app.create_raid(&details).await?;
    app.admin
        .update_raid(&requests::UpdateRaid::status(raid_id, RaidStatus::Active))
        .await?;

    let alice = app.create_solver("alice").await?;
    assert_eq!(alice.attack_raid(&raid_id).await?.new_hp, 2);

    let bob = app.create_solver("bob").await?;
    let outcome = bob.attack_raid(&raid_id).await?;
    assert_eq!(outcome.new_hp, 0);
    assert!(outcome.raid_cleared);
    assert_eq!(app.status(&raid_id).await?, RaidStatus::Success);

    Ok(())
}

#[tokio::test]
async fn concurrent_solvers_lose_no_damage() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let mut details = raid_details(&app.time_source);
    details.max_hp = 20;
    let raid_id = app.create_raid(&details).await?;
    app.admin
        .update_raid(&requests::UpdateRaid::status(raid_id, RaidStatus::Active))
        .await?;

    let mut clients = Vec::new();
    for i in 0..8 {
        clients.push(app.create_solver(&format!("racer{i}")).await?);
    }

    let mut tasks = tokio::task::JoinSet::new();
    for client in clients {
        tasks.spawn(async move { client.attack_raid(&raid_id).await });
    }
    while let Some(result) = tasks.join_next().await {
        assert!(result?.is_ok());
    }

    assert_eq!(app.current_hp(&raid_id).await?, 12);
    let detail = app.client.get_raid(&raid_id).await?;
    assert_eq!(detail.solved_count, 8);

    Ok(())
}

#[tokio::test]
async fn concurrent_attacks_by_one_user_hit_once() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;
    app.create_solver("alice").await?;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..5 {
        // separate sessions for the same user
        let client = app.login_as("alice").await?;
        tasks.spawn(async move { client.attack_raid(&raid_id).await });
    }
    let mut hits = 0;
    while let Some(result) = tasks.join_next().await {
        match result? {
            Ok(outcome) => {
                assert!(outcome.solved);
                hits += 1;
            }
            Err(payloads::ClientError::APIError(status, _)) => {
                assert!(
                    status == StatusCode::CONFLICT
                        || status == StatusCode::TOO_MANY_REQUESTS,
                    "{status}"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(hits, 1);
    assert_eq!(app.current_hp(&raid_id).await?, 9);

    Ok(())
}

#[tokio::test]
async fn final_blows_race_to_one_clear() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let mut details = raid_details(&app.time_source);
    details.max_hp = 2;
    let raid_id = app.create_raid(&details).await?;
    app.admin
        .update_raid(&requests::UpdateRaid::status(raid_id, RaidStatus::Active))
        .await?;

    let mut clients = Vec::new();
    for i in 0..6 {
        clients.push(app.create_solver(&format!("racer{i}")).await?);
    }
    let mut tasks = tokio::task::JoinSet::new();
    for client in clients {
        tasks.spawn(async move { client.attack_raid(&raid_id).await });
    }

    let mut hits = 0;
    let mut clears = 0;
    while let Some(result) = tasks.join_next().await {
        match result? {
            Ok(outcome) => {
                hits += 1;
                if outcome.raid_cleared {
                    clears += 1;
                }
            }
            Err(payloads::ClientError::APIError(status, _)) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
            }
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(hits, 2);
    assert_eq!(clears, 1);
    assert_eq!(app.current_hp(&raid_id).await?, 0);

    // exactly the two solvers that landed a hit were paid
    let detail = app.client.get_raid(&raid_id).await?;
    assert_eq!(detail.solved_count, 2);
    let paid: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_point), 0)::bigint FROM users",
    )
    .fetch_one(&app.db_pool)
    .await?;
    assert_eq!(paid, 200);

    Ok(())
}
