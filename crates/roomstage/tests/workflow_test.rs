mod common;

use common::*;
use roomstage::{
    PhotoRecord, PhotoStatus, SessionEvent, WorkflowError, WorkflowStatus, WorkflowType,
};

#[tokio::test(start_paused = true)]
async fn test_bedroom_room_creation_scenario() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);
    fx.engine.script(
        JOB_A,
        vec![processing(JOB_A), done_with_empty(JOB_A, "empty/123.jpg")],
    );

    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///photos/bedroom.jpg", Some("bedroom"))
        .await
        .unwrap();

    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.workflow_type, WorkflowType::RoomCreation);
    assert_eq!(workflow.status, WorkflowStatus::Processing);
    assert_eq!(workflow.job_id.as_deref(), Some(JOB_A));
    assert!(fx.poller.is_polling(JOB_A));

    let photo = fx.cache.get(&workflow.photo_id).unwrap();
    assert_eq!(photo.status, PhotoStatus::Processing);
    assert_eq!(photo.room_type.as_deref(), Some("bedroom"));
    assert_eq!(photo.metadata.job_id.as_deref(), Some(JOB_A));
    assert_eq!(photo.metadata.workflow_id.as_deref(), Some(workflow_id.as_str()));

    let submitted = fx.engine.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].room_type.as_deref(), Some("bedroom"));
    assert_eq!(submitted[0].style, None);
    assert_eq!(submitted[0].quality, "standard");

    // First tick: still processing.
    advance(6).await;
    let photo = fx.cache.get(&workflow.photo_id).unwrap();
    assert_eq!(photo.status, PhotoStatus::Processing);
    assert!(photo.empty_url.is_none());

    // Second tick: done.
    advance(5).await;
    let photo = fx.cache.get(&workflow.photo_id).unwrap();
    assert_eq!(photo.status, PhotoStatus::Completed);
    assert_eq!(
        photo.empty_url,
        Some(format!("{}/empty/123.jpg", BASE))
    );
    assert!(!fx.poller.is_polling(JOB_A));
    assert_eq!(fx.poller.get_failed_jobs_count(), 0);
    assert_eq!(
        fx.orchestrator.get_workflow(&workflow_id).unwrap().status,
        WorkflowStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_keeps_failed_photo() {
    let fx = Fixture::new();
    fx.engine.reject_next(500);

    let result = fx
        .orchestrator
        .start_room_creation("file:///photos/kitchen.jpg", Some("kitchen"))
        .await;

    let workflow_id = match result {
        Err(WorkflowError::Submission { workflow_id, .. }) => workflow_id,
        other => panic!("expected submission error, got {:?}", other),
    };

    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Error);
    assert!(workflow.error.is_some());
    assert!(workflow.job_id.is_none());

    let photo = fx.cache.get(&workflow.photo_id).unwrap();
    assert_eq!(photo.status, PhotoStatus::Failed);
    assert_eq!(fx.cache.counts().total, 1);
    assert_eq!(fx.poller.get_active_polling_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_style_application_unknown_photo() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);

    let result = fx
        .orchestrator
        .start_style_application("file:///empty.jpg", "modern", "no-such-photo")
        .await;

    assert!(matches!(result, Err(WorkflowError::PhotoNotFound(_))));
    assert!(fx.engine.submitted().is_empty());
    assert!(fx.orchestrator.get_active_workflows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_style_application_completes_and_notifies() {
    let fx = Fixture::new();
    let mut photo = PhotoRecord::new("file:///photos/living.jpg", Some("living_room".into()));
    photo.status = PhotoStatus::Completed;
    photo.empty_url = Some(format!("{}/empty/123.jpg", BASE));
    let photo = fx.cache.save(photo);

    fx.engine.accept_next(JOB_B);
    fx.engine.script(
        JOB_B,
        vec![
            processing(JOB_B),
            done_with_styled(JOB_B, "styled/123.jpg", "scandinavian"),
        ],
    );

    let workflow_id = fx
        .orchestrator
        .start_upstyling(&format!("{}/empty/123.jpg", BASE), "scandinavian", &photo.id)
        .await
        .unwrap();

    assert_eq!(fx.cache.get(&photo.id).unwrap().status, PhotoStatus::Processing);
    let submitted = fx.engine.submitted();
    assert_eq!(submitted[0].style.as_deref(), Some("scandinavian"));
    assert_eq!(submitted[0].room_type.as_deref(), Some("living_room"));

    advance(11).await;

    let stored = fx.cache.get(&photo.id).unwrap();
    assert_eq!(stored.status, PhotoStatus::Completed);
    assert_eq!(stored.styled_url, Some(format!("{}/styled/123.jpg", BASE)));
    assert_eq!(stored.style.as_deref(), Some("scandinavian"));
    assert_eq!(stored.empty_url, Some(format!("{}/empty/123.jpg", BASE)));

    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.workflow_type, WorkflowType::StyleApplication);
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(fx.sink.completions(), vec!["scandinavian".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_complete_upstyling_without_target_style_is_noop() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);
    fx.engine.script(JOB_A, vec![processing(JOB_A)]);

    // A room creation workflow carries no target style.
    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///photos/bedroom.jpg", None)
        .await
        .unwrap();
    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    let before = fx.cache.get(&workflow.photo_id).unwrap();

    fx.orchestrator
        .complete_upstyling(&workflow_id, "https://cdn.example.com/styled/x.jpg");

    assert_eq!(fx.cache.get(&workflow.photo_id).unwrap(), before);
    assert_eq!(
        fx.orchestrator.get_workflow(&workflow_id).unwrap().status,
        WorkflowStatus::Processing
    );
    assert!(fx.sink.completions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_completion_callbacks_tolerate_unknown_workflow() {
    let fx = Fixture::new();
    fx.orchestrator.complete_room_emptying("missing", "x.jpg");
    fx.orchestrator.complete_upstyling("missing", "x.jpg");
    fx.orchestrator.mark_workflow_failed("missing", None);
    assert_eq!(fx.cache.counts().total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_complete_room_emptying_sets_intermediate_result() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);
    fx.engine.script(JOB_A, vec![processing(JOB_A)]);

    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///photos/office.jpg", Some("office"))
        .await
        .unwrap();
    fx.orchestrator
        .complete_room_emptying(&workflow_id, "https://cdn.example.com/empty/office.jpg");

    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Emptying);
    let photo = fx.cache.get(&workflow.photo_id).unwrap();
    assert_eq!(
        photo.empty_url.as_deref(),
        Some("https://cdn.example.com/empty/office.jpg")
    );
}

#[tokio::test(start_paused = true)]
async fn test_late_callbacks_leave_completed_workflow_alone() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);
    fx.engine
        .script(JOB_A, vec![done_with_empty(JOB_A, "empty/kitchen.jpg")]);

    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///photos/kitchen.jpg", Some("kitchen"))
        .await
        .unwrap();
    advance(6).await;

    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    let completed_at = workflow.updated_at;

    fx.orchestrator
        .complete_room_emptying(&workflow_id, "https://cdn.example.com/empty/other.jpg");
    fx.orchestrator
        .complete_upstyling(&workflow_id, "https://cdn.example.com/styled/other.jpg");
    fx.orchestrator
        .mark_workflow_failed(&workflow_id, Some("too late"));

    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(workflow.updated_at, completed_at);
    assert!(workflow.error.is_none());
    assert!(fx.orchestrator.get_active_workflows().is_empty());

    let photo = fx.cache.get(&workflow.photo_id).unwrap();
    assert_eq!(photo.status, PhotoStatus::Completed);
    assert_eq!(
        photo.empty_url,
        Some(format!("{}/empty/kitchen.jpg", BASE))
    );
    assert!(photo.styled_url.is_none());
    assert!(fx.sink.completions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_job_error_fails_workflow() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);
    fx.engine.script(JOB_A, vec![errored(JOB_A)]);

    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///photos/bath.jpg", Some("bathroom"))
        .await
        .unwrap();
    advance(6).await;

    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(
        fx.cache.get(&workflow.photo_id).unwrap().status,
        PhotoStatus::Failed
    );
    assert!(fx.poller.is_permanently_failed(JOB_A));
}

#[tokio::test(start_paused = true)]
async fn test_failure_threshold_fails_workflow() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_K);
    fx.engine.script(JOB_K, vec![Scripted::Fail]);

    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///photos/garage.jpg", None)
        .await
        .unwrap();
    advance(16).await;

    assert_eq!(fx.poller.get_failed_jobs_count(), 1);
    assert!(!fx.poller.is_polling(JOB_K));
    let workflow = fx.orchestrator.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(
        fx.cache.get(&workflow.photo_id).unwrap().status,
        PhotoStatus::Failed
    );
}

#[tokio::test(start_paused = true)]
async fn test_mark_workflow_failed_and_clear_completed() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);
    fx.engine.accept_next(JOB_B);
    fx.engine.script(JOB_A, vec![processing(JOB_A)]);
    fx.engine.script(JOB_B, vec![processing(JOB_B)]);

    let first = fx
        .orchestrator
        .start_room_creation("file:///a.jpg", None)
        .await
        .unwrap();
    let second = fx
        .orchestrator
        .start_room_creation("file:///b.jpg", None)
        .await
        .unwrap();
    assert_eq!(fx.orchestrator.get_active_workflows().len(), 2);

    fx.orchestrator.mark_workflow_failed(&first, Some("cancelled by user"));
    let failed = fx.orchestrator.get_workflow(&first).unwrap();
    assert_eq!(failed.status, WorkflowStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("cancelled by user"));
    assert_eq!(
        fx.cache.get(&failed.photo_id).unwrap().status,
        PhotoStatus::Failed
    );

    let active = fx.orchestrator.get_active_workflows();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second);

    assert_eq!(fx.orchestrator.clear_completed_workflows(), 1);
    assert!(fx.orchestrator.get_workflow(&first).is_none());
    assert!(fx.orchestrator.get_workflow(&second).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_orphan_sweep_never_polls() {
    let fx = Fixture::new();

    let orphan = fx.cache.save(PhotoRecord::new("file:///orphan.jpg", None));
    let mut malformed = PhotoRecord::new("file:///malformed.jpg", None);
    malformed.metadata.job_id = Some("job-123".into());
    let malformed = fx.cache.save(malformed);
    let mut tracked = PhotoRecord::new("file:///tracked.jpg", None);
    tracked.metadata.job_id = Some(JOB_A.into());
    let tracked = fx.cache.save(tracked);
    let mut done = PhotoRecord::new("file:///done.jpg", None);
    done.status = PhotoStatus::Completed;
    let done = fx.cache.save(done);

    assert_eq!(fx.orchestrator.initialize_polling(), 2);

    assert_eq!(fx.cache.get(&orphan.id).unwrap().status, PhotoStatus::Failed);
    assert_eq!(fx.cache.get(&malformed.id).unwrap().status, PhotoStatus::Failed);
    assert_eq!(fx.cache.get(&tracked.id).unwrap().status, PhotoStatus::Processing);
    assert_eq!(fx.cache.get(&done.id).unwrap().status, PhotoStatus::Completed);

    assert_eq!(fx.poller.get_active_polling_count(), 0);
    advance(60).await;
    assert_eq!(fx.engine.total_status_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_polling_registers_valid_jobs() {
    let fx = Fixture::new();
    fx.engine
        .script(JOB_A, vec![done_with_empty(JOB_A, "empty/a.jpg")]);

    let mut resumable = PhotoRecord::new("file:///a.jpg", None);
    resumable.metadata.job_id = Some(JOB_A.into());
    let resumable = fx.cache.save(resumable);
    let mut blacklisted = PhotoRecord::new("file:///k.jpg", None);
    blacklisted.metadata.job_id = Some(JOB_K.into());
    fx.cache.save(blacklisted);
    fx.cache.save(PhotoRecord::new("file:///orphan.jpg", None));

    // Blacklist K first.
    fx.engine.script(JOB_K, vec![Scripted::Fail]);
    fx.poller.start_polling(JOB_K, None);
    advance(16).await;
    assert!(fx.poller.is_permanently_failed(JOB_K));

    assert_eq!(fx.orchestrator.resume_polling(), 1);
    assert!(fx.poller.is_polling(JOB_A));
    assert!(!fx.poller.is_polling(JOB_K));

    // Already polling: nothing new.
    assert_eq!(fx.orchestrator.resume_polling(), 0);

    advance(6).await;
    assert_eq!(
        fx.cache.get(&resumable.id).unwrap().status,
        PhotoStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_stops_polling_and_drops_workflows() {
    let fx = Fixture::new();
    fx.engine.accept_next(JOB_A);
    fx.engine.script(JOB_A, vec![processing(JOB_A)]);

    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///a.jpg", None)
        .await
        .unwrap();
    assert!(fx.poller.is_polling(JOB_A));

    fx.orchestrator.handle_session_change(SessionEvent::SignedIn);
    assert!(fx.poller.is_polling(JOB_A));

    fx.orchestrator.handle_session_change(SessionEvent::SignedOut);
    assert_eq!(fx.poller.get_active_polling_count(), 0);
    assert!(fx.orchestrator.get_workflow(&workflow_id).is_none());

    advance(30).await;
    assert_eq!(fx.engine.status_calls(JOB_A), 0);
}

#[tokio::test(start_paused = true)]
async fn test_workflow_events_are_broadcast() {
    let fx = Fixture::new();
    let mut events = fx.orchestrator.subscribe();
    fx.engine.accept_next(JOB_A);
    fx.engine
        .script(JOB_A, vec![done_with_empty(JOB_A, "empty/1.jpg")]);

    let workflow_id = fx
        .orchestrator
        .start_room_creation("file:///a.jpg", None)
        .await
        .unwrap();
    advance(6).await;

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.workflow_id, workflow_id);
        statuses.push(event.status);
    }
    assert_eq!(
        statuses,
        vec![
            WorkflowStatus::Started,
            WorkflowStatus::Processing,
            WorkflowStatus::Emptying,
            WorkflowStatus::Completed,
        ]
    );
}
