use api::scheduler;
use payloads::{RaidStatus, requests};
use reqwest::StatusCode;

use test_helpers::{assert_status_code, raid_details, spawn_app};

#[tokio::test]
async fn admin_clear_pays_solvers_once() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;

    let alice = app.create_solver("alice").await?;
    alice.attack_raid(&raid_id).await?;
    let bob = app.create_solver("bob").await?;
    bob.attack_raid(&raid_id).await?;
    // tried, but never solved
    let carol = app.create_user("carol").await?;
    carol.attack_raid(&raid_id).await?;

    let raid = app
        .admin
        .update_raid(&requests::UpdateRaid::status(raid_id, RaidStatus::Success))
        .await?;
    assert_eq!(raid.status, RaidStatus::Success);
    assert_eq!(raid.current_hp, 0);

    assert_eq!(app.total_point("alice").await?, 100);
    assert_eq!(app.total_point("bob").await?, 100);
    assert_eq!(app.total_point("carol").await?, 0);

    // re-running distribution and unrelated edits pay nothing more
    let result = app.admin.distribute_rewards(&raid_id).await?;
    assert_eq!(result.awarded, 0);
    let mut patch = requests::UpdateRaid::new(raid_id);
    patch.title = Some("Slime King (cleared)".into());
    app.admin.update_raid(&patch).await?;
    scheduler::schedule_tick(&app.db_pool, &app.time_source).await?;

    assert_eq!(app.total_point("alice").await?, 100);
    assert_eq!(app.total_point("bob").await?, 100);

    let participants = app.client.list_participants(&raid_id).await?;
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().all(|p| p.point_awarded));

    Ok(())
}

#[tokio::test]
async fn concurrent_distributions_pay_once() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;

    let mut handles = Vec::new();
    for i in 0..5 {
        let handle = format!("solver{i}");
        app.create_solver(&handle).await?.attack_raid(&raid_id).await?;
        handles.push(handle);
    }

    // mark the raid cleared without paying anyone, as if distribution had
    // failed right after the status change
    sqlx::query(
        "UPDATE raids SET status = 'success', current_hp = 0 WHERE id = $1",
    )
    .bind(raid_id)
    .execute(&app.db_pool)
    .await?;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let admin = app.login_as(test_helpers::ADMIN_HANDLE).await?;
        tasks.spawn(async move { admin.distribute_rewards(&raid_id).await });
    }
    let mut awarded = 0;
    while let Some(result) = tasks.join_next().await {
        awarded += result??.awarded;
    }
    assert_eq!(awarded, 5);

    for handle in &handles {
        assert_eq!(app.total_point(handle).await?, 100, "{handle}");
    }

    Ok(())
}

#[tokio::test]
async fn lethal_hit_racing_admin_clear_pays_once() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let alice = app.create_solver("alice").await?;
    app.create_solver("bob").await?;

    let mut details = raid_details(&app.time_source);
    details.max_hp = 2;
    for _ in 0..5 {
        let raid_id = app.create_raid(&details).await?;
        app.admin
            .update_raid(&requests::UpdateRaid::status(
                raid_id,
                RaidStatus::Active,
            ))
            .await?;
        alice.attack_raid(&raid_id).await?;
        let alice_before = app.total_point("alice").await?;
        let bob_before = app.total_point("bob").await?;

        let bob = app.login_as("bob").await?;
        let admin = app.login_as(test_helpers::ADMIN_HANDLE).await?;
        let attack =
            tokio::spawn(async move { bob.attack_raid(&raid_id).await });
        let clear = tokio::spawn(async move {
            admin
                .update_raid(&requests::UpdateRaid::status(
                    raid_id,
                    RaidStatus::Success,
                ))
                .await
        });

        let bob_hit = match attack.await? {
            Ok(outcome) => {
                assert!(outcome.solved);
                true
            }
            Err(payloads::ClientError::APIError(status, _)) => {
                // the admin cleared the raid first
                assert_eq!(status, StatusCode::BAD_REQUEST);
                false
            }
            Err(e) => return Err(e.into()),
        };
        let raid = clear.await??;
        assert_eq!(raid.status, RaidStatus::Success);
        assert_eq!(raid.current_hp, 0);

        assert_eq!(app.total_point("alice").await?, alice_before + 100);
        let bob_reward = if bob_hit { 100 } else { 0 };
        assert_eq!(app.total_point("bob").await?, bob_before + bob_reward);

        let participants = app.client.list_participants(&raid_id).await?;
        assert!(participants.iter().all(|p| p.point_awarded));
    }

    Ok(())
}

#[tokio::test]
async fn sweep_heals_unpaid_rewards() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;
    app.create_solver("alice")
        .await?
        .attack_raid(&raid_id)
        .await?;

    sqlx::query(
        "UPDATE raids SET status = 'success', current_hp = 0 WHERE id = $1",
    )
    .bind(raid_id)
    .execute(&app.db_pool)
    .await?;
    assert_eq!(app.total_point("alice").await?, 0);

    scheduler::schedule_tick(&app.db_pool, &app.time_source).await?;
    assert_eq!(app.total_point("alice").await?, 100);

    scheduler::schedule_tick(&app.db_pool, &app.time_source).await?;
    assert_eq!(app.total_point("alice").await?, 100);

    Ok(())
}

#[tokio::test]
async fn distribution_requires_a_cleared_raid() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let raid_id = app.create_active_raid().await?;
    app.create_solver("alice")
        .await?
        .attack_raid(&raid_id)
        .await?;

    let result = app.admin.distribute_rewards(&raid_id).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);

    app.admin
        .update_raid(&requests::UpdateRaid::status(raid_id, RaidStatus::Fail))
        .await?;
    let result = app.admin.distribute_rewards(&raid_id).await;
    assert_status_code(result, StatusCode::BAD_REQUEST);
    assert_eq!(app.total_point("alice").await?, 0);

    Ok(())
}

#[tokio::test]
async fn zero_bonus_pays_nothing() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let mut details = raid_details(&app.time_source);
    details.max_hp = 1;
    details.bonus_point = 0;
    let raid_id = app.create_raid(&details).await?;
    app.admin
        .update_raid(&requests::UpdateRaid::status(raid_id, RaidStatus::Active))
        .await?;

    let outcome = app
        .create_solver("alice")
        .await?
        .attack_raid(&raid_id)
        .await?;
    assert!(outcome.raid_cleared);
    assert_eq!(app.total_point("alice").await?, 0);

    let result = app.admin.distribute_rewards(&raid_id).await?;
    assert_eq!(result.awarded, 0);

    Ok(())
}

#[tokio::test]
async fn ranking_reflects_rewards() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let mut details = raid_details(&app.time_source);
    details.max_hp = 2;
    let first = app.create_raid(&details).await?;
    let second = app.create_raid(&details).await?;
    for raid_id in [first, second] {
        app.admin
            .update_raid(&requests::UpdateRaid::status(
                raid_id,
                RaidStatus::Active,
            ))
            .await?;
    }

    let alice = app.create_solver("alice").await?;
    let bob = app.create_solver("bob").await?;
    app.create_user("carol").await?;

    alice.attack_raid(&first).await?;
    bob.attack_raid(&first).await?;
    alice.attack_raid(&second).await?;
    app.admin
        .update_raid(&requests::UpdateRaid::status(second, RaidStatus::Success))
        .await?;

    let ranking = app.client.ranking().await?;
    let top: Vec<_> = ranking
        .iter()
        .take(2)
        .map(|entry| (entry.rank, entry.user.handle.as_str(), entry.total_point))
        .collect();
    assert_eq!(top, vec![(1, "alice", 200), (2, "bob", 100)]);

    // everyone else is tied at 0, ordered by handle
    let rest: Vec<_> = ranking[2..]
        .iter()
        .map(|entry| (entry.rank, entry.user.handle.as_str()))
        .collect();
    assert_eq!(rest, vec![(3, "admin"), (3, "carol")]);

    Ok(())
}

#[tokio::test]
async fn group_ranking_sums_members() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let alice = app.create_user_in_group("alice", "Seoul", 1).await?;
    app.create_user_in_group("bob", "Seoul", 1).await?;
    let carol = app.create_user_in_group("carol", "Daejeon", 2).await?;
    let dave = app.create_user("dave").await?;
    for handle in ["alice", "carol", "dave"] {
        app.checker.mark_solved(handle, test_helpers::TEST_PROBLEM_ID);
    }

    let mut details = raid_details(&app.time_source);
    details.max_hp = 3;
    let first = app.create_raid(&details).await?;
    let second = app.create_raid(&details).await?;
    for raid_id in [first, second] {
        app.admin
            .update_raid(&requests::UpdateRaid::status(
                raid_id,
                RaidStatus::Active,
            ))
            .await?;
    }
    // alice 200, carol 100, dave 100 but in no class
    alice.attack_raid(&first).await?;
    carol.attack_raid(&first).await?;
    dave.attack_raid(&first).await?;
    alice.attack_raid(&second).await?;
    app.admin
        .update_raid(&requests::UpdateRaid::status(second, RaidStatus::Success))
        .await?;

    let ranking = app.client.group_ranking(&Default::default()).await?;
    let rows: Vec<_> = ranking
        .iter()
        .map(|entry| {
            (
                entry.rank,
                entry.group.campus.as_str(),
                entry.group.class_num,
                entry.member_count,
                entry.total_point,
                entry.avg_point,
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![(1, "Seoul", 1, 2, 200, 100), (2, "Daejeon", 2, 1, 100, 100)]
    );

    let daejeon = app
        .client
        .group_ranking(&requests::GroupRanking {
            campus: Some("Daejeon".into()),
        })
        .await?;
    assert_eq!(daejeon.len(), 1);
    assert_eq!(daejeon[0].rank, 1);
    assert_eq!(daejeon[0].group.class_num, 2);

    Ok(())
}
