
use std::time::Duration;

use jobworker::config::{ManagerConfig, OutputPolicy};
use jobworker::error::JobError;
use jobworker::jobs::{JobManager, JobState, JobStatus, STOPPED_EXIT_CODE};
use test_harness::{admin, test_manager, user1, user2, wait_for_state, wait_terminal};

#[tokio::test]
async fn test_echo_completes_with_output() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/echo", vec!["hello".into(), "world".into()])
        .await
        .to_string();

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status, JobStatus::completed(0));

    let output = manager.get_output(&user1(), &id).await.unwrap();
    assert_eq!(output.stdout, "hello world\n");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn test_stop_running_sleep() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/sleep", vec!["5".into()])
        .await
        .to_string();

    // The spawn happens on a background task; wait for it to land.
    wait_for_state(&manager, &user1(), &id, JobState::Running).await;

    manager.stop(&user1(), &id).await.unwrap();

    let status = tokio::time::timeout(
        Duration::from_secs(3),
        wait_terminal(&manager, &user1(), &id),
    )
    .await
    .expect("job was not stopped in time");
    assert_eq!(status.state, JobState::Stopped);
    assert_eq!(status.exit_code, Some(STOPPED_EXIT_CODE));
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_nonzero_exit_is_completed() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/sh", vec!["-c".into(), "exit 1".into()])
        .await
        .to_string();

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.exit_code, Some(1));
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_invalid_program_fails() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/invalid/cmd", vec![])
        .await
        .to_string();

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.exit_code.is_none());
    assert!(status.error.is_some());
}

#[tokio::test]
async fn test_other_user_sees_not_found_admin_sees_status() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/echo", vec!["secret".into()])
        .await
        .to_string();

    assert!(matches!(
        manager.get_status(&user2(), &id).await,
        Err(JobError::NotFound)
    ));
    assert!(matches!(
        manager.get_output(&user2(), &id).await,
        Err(JobError::NotFound)
    ));
    assert!(matches!(
        manager.stop(&user2(), &id).await,
        Err(JobError::NotFound)
    ));

    let status = wait_terminal(&manager, &admin(), &id).await;
    assert_eq!(status, JobStatus::completed(0));
    assert_eq!(
        manager.get_output(&admin(), &id).await.unwrap().stdout,
        "secret\n"
    );
}

#[tokio::test]
async fn test_unknown_and_malformed_ids_are_not_found() {
    let manager = test_manager();

    let absent = uuid::Uuid::new_v4().to_string();
    assert!(matches!(
        manager.get_status(&admin(), &absent).await,
        Err(JobError::NotFound)
    ));
    assert!(matches!(
        manager.get_status(&user1(), "not-a-uuid").await,
        Err(JobError::NotFound)
    ));
    assert!(matches!(
        manager.stop(&user1(), "").await,
        Err(JobError::NotFound)
    ));
}

#[tokio::test]
async fn test_start_is_immediately_resolvable() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/sleep", vec!["1".into()])
        .await
        .to_string();

    let status = manager.get_status(&user1(), &id).await.unwrap();
    assert!(matches!(
        status.state,
        JobState::Starting | JobState::Running
    ));
    assert_eq!(manager.len().await, 1);

    manager.stop_all().await;
}

#[tokio::test]
async fn test_stop_finished_job_is_noop() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/sh", vec!["-c".into(), "exit 3".into()])
        .await
        .to_string();
    let before = wait_terminal(&manager, &user1(), &id).await;

    manager.stop(&user1(), &id).await.unwrap();
    manager.stop(&user1(), &id).await.unwrap();

    assert_eq!(manager.get_status(&user1(), &id).await.unwrap(), before);
    assert_eq!(before.exit_code, Some(3));
}

#[tokio::test]
async fn test_terminal_state_never_regresses() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/true", vec![])
        .await
        .to_string();
    let terminal = wait_terminal(&manager, &user1(), &id).await;

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.get_status(&user1(), &id).await.unwrap(), terminal);
    }
}

#[tokio::test]
async fn test_partial_output_while_running() {
    let manager = test_manager();
    let id = manager
        .start(
            &user1(),
            "/bin/sh",
            vec!["-c".into(), "echo first; sleep 5".into()],
        )
        .await
        .to_string();

    let mut output = manager.get_output(&user1(), &id).await.unwrap();
    for _ in 0..250 {
        if !output.stdout.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        output = manager.get_output(&user1(), &id).await.unwrap();
    }
    assert_eq!(output.stdout, "first\n");
    assert_eq!(
        manager.get_status(&user1(), &id).await.unwrap().state,
        JobState::Running
    );

    manager.stop(&user1(), &id).await.unwrap();
    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status.state, JobState::Stopped);
    // Output captured before the kill is kept.
    assert_eq!(
        manager.get_output(&user1(), &id).await.unwrap().stdout,
        "first\n"
    );
}

#[tokio::test]
async fn test_require_completion_policy() {
    let manager = JobManager::new(
        ManagerConfig::default().with_output_policy(OutputPolicy::RequireCompletion),
    );
    let id = manager
        .start(&user1(), "/bin/sleep", vec!["5".into()])
        .await
        .to_string();

    assert!(matches!(
        manager.get_output(&user1(), &id).await,
        Err(JobError::JobNotCompleted)
    ));

    // Ensure the spawn has landed before stopping.
    wait_for_state(&manager, &user1(), &id, JobState::Running).await;

    manager.stop(&user1(), &id).await.unwrap();
    wait_terminal(&manager, &user1(), &id).await;

    let output = manager.get_output(&user1(), &id).await.unwrap();
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn test_stderr_captured_separately() {
    let manager = test_manager();
    let id = manager
        .start(
            &user1(),
            "/bin/sh",
            vec!["-c".into(), "echo out; echo err >&2; exit 2".into()],
        )
        .await
        .to_string();

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status, JobStatus::completed(2));

    let output = manager.get_output(&user1(), &id).await.unwrap();
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
}

#[tokio::test]
async fn test_large_output() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/usr/bin/seq", vec!["1".into(), "10000".into()])
        .await
        .to_string();

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status, JobStatus::completed(0));

    let output = manager.get_output(&user1(), &id).await.unwrap();
    assert_eq!(output.stdout.lines().count(), 10000);
    assert_eq!(output.stdout.lines().last(), Some("10000"));
}

#[tokio::test]
async fn test_list_respects_visibility() {
    let manager = test_manager();
    let a = manager.start(&user1(), "/bin/true", vec![]).await;
    let b = manager
        .start(&user2(), "/bin/echo", vec!["x".into()])
        .await;
    let c = manager.start(&user1(), "/bin/false", vec![]).await;

    let mine: Vec<_> = manager.list(&user1()).await.into_iter().map(|s| s.id).collect();
    assert_eq!(mine, vec![a, c]);

    let theirs = manager.list(&user2()).await;
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].id, b);
    assert_eq!(theirs[0].owner, "user2");
    assert_eq!(theirs[0].program, "/bin/echo");
    assert_eq!(theirs[0].args, vec!["x".to_string()]);

    let all: Vec<_> = manager.list(&admin()).await.into_iter().map(|s| s.id).collect();
    assert_eq!(all, vec![a, b, c]);
}

#[tokio::test]
async fn test_stop_all_kills_running_jobs() {
    let manager = test_manager();
    let ids: Vec<String> = {
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                manager
                    .start(&user1(), "/bin/sleep", vec!["5".into()])
                    .await
                    .to_string(),
            );
        }
        ids
    };

    for id in &ids {
        wait_for_state(&manager, &user1(), id, JobState::Running).await;
    }

    manager.stop_all().await;

    for id in &ids {
        let status = wait_terminal(&manager, &user1(), id).await;
        assert_eq!(status.state, JobState::Stopped);
    }
}

#[tokio::test]
async fn test_many_concurrent_jobs() {
    let manager = test_manager();
    let mut handles = Vec::new();
    for i in 0..20 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .start(&user1(), "/bin/echo", vec![i.to_string()])
                .await
                .to_string()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    for id in &ids {
        assert_eq!(
            wait_terminal(&manager, &user1(), id).await,
            JobStatus::completed(0)
        );
    }
    assert_eq!(manager.len().await, 20);
}

#[tokio::test]
async fn test_stop_all_refuses_jobs_not_yet_spawned() {
    let manager = test_manager();
    // The start task has not run yet on this single-threaded runtime.
    let id = manager
        .start(&user1(), "/bin/sleep", vec!["3".into()])
        .await
        .to_string();
    assert_eq!(
        manager.get_status(&user1(), &id).await.unwrap().state,
        JobState::Starting
    );

    manager.stop_all().await;
    assert!(manager.is_closing());

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.exit_code.is_none());

    // Still refused well after the start task has had its chance.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.get_status(&user1(), &id).await.unwrap(), status);
}

#[tokio::test]
async fn test_start_after_stop_all_never_runs() {
    let manager = test_manager();
    manager.stop_all().await;

    let id = manager
        .start(&user1(), "/bin/sleep", vec!["3".into()])
        .await
        .to_string();

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(manager.get_output(&user1(), &id).await.unwrap().stdout.is_empty());
}

#[tokio::test]
async fn test_stop_before_spawn_is_process_not_started() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/sleep", vec!["5".into()])
        .await
        .to_string();

    // No await point between start and stop lets the start task run.
    assert!(matches!(
        manager.stop(&user1(), &id).await,
        Err(JobError::ProcessNotStarted)
    ));

    wait_for_state(&manager, &user1(), &id, JobState::Running).await;
    manager.stop(&user1(), &id).await.unwrap();
    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status.state, JobState::Stopped);
}

#[tokio::test]
async fn test_aborted_caller_does_not_cancel_job() {
    let manager = test_manager();
    let (id_tx, id_rx) = tokio::sync::oneshot::channel();

    let caller = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let id = manager
                .start(
                    &user1(),
                    "/bin/sh",
                    vec!["-c".into(), "sleep 0.2; echo done".into()],
                )
                .await;
            let _ = id_tx.send(id.to_string());
            std::future::pending::<()>().await;
        })
    };

    let id = id_rx.await.unwrap();
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status, JobStatus::completed(0));
    assert_eq!(
        manager.get_output(&user1(), &id).await.unwrap().stdout,
        "done\n"
    );
}

#[tokio::test]
async fn test_dropped_stop_call_does_not_corrupt_job() {
    let manager = test_manager();
    let id = manager
        .start(&user1(), "/bin/sleep", vec!["5".into()])
        .await
        .to_string();
    wait_for_state(&manager, &user1(), &id, JobState::Running).await;

    // Poll the stop call once, then drop it while it awaits the kill reply.
    let interrupted =
        tokio::time::timeout(Duration::ZERO, manager.stop(&user1(), &id)).await;
    assert!(interrupted.is_err());

    manager.stop(&user1(), &id).await.unwrap();
    let status = wait_terminal(&manager, &user1(), &id).await;
    assert_eq!(status.state, JobState::Stopped);
    assert_eq!(status.exit_code, Some(STOPPED_EXIT_CODE));
}
