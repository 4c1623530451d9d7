//! Command implementations.

use tokio::sync::broadcast::error::RecvError;

use roomstage::broadcast::WorkflowEvent;
use roomstage::{Notification, PhotoRecord, PhotoStatus};

use crate::services::Services;

pub async fn create(
    services: &Services,
    image: &str,
    room_type: Option<&str>,
) -> roomstage::Result<()> {
    let watcher = Watcher::subscribe(services);
    let workflow_id = services
        .orchestrator
        .start_room_creation(image, room_type)
        .await?;
    println!("workflow {}", workflow_id);

    watcher.run(services).await;
    print_workflow_photo(services, &workflow_id)
}

pub async fn style(
    services: &Services,
    empty_image: &str,
    style: &str,
    photo_id: &str,
) -> roomstage::Result<()> {
    let watcher = Watcher::subscribe(services);
    let workflow_id = services
        .orchestrator
        .start_style_application(empty_image, style, photo_id)
        .await?;
    println!("workflow {}", workflow_id);

    watcher.run(services).await;
    print_workflow_photo(services, &workflow_id)
}

pub fn list(services: &Services, status: Option<PhotoStatus>, limit: usize) {
    let photos: Vec<PhotoRecord> = match status {
        Some(status) => {
            let mut photos = services.cache.get_photos_by_status(status);
            photos.truncate(limit);
            photos
        }
        None => services.cache.get_recent_photos(limit),
    };

    for photo in &photos {
        println!(
            "{}  {:<10}  {:<12}  {}",
            photo.id,
            photo.status,
            photo.room_type.as_deref().unwrap_or("-"),
            photo.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    let counts = services.cache.counts();
    println!(
        "{} photos ({} processing, {} completed, {} failed)",
        counts.total, counts.processing, counts.completed, counts.failed
    );
}

pub fn show(services: &Services, photo_id: &str) -> roomstage::Result<()> {
    match services.cache.get(photo_id) {
        Some(photo) => {
            print_json(&photo);
            Ok(())
        }
        None => Err(roomstage::WorkflowError::PhotoNotFound(photo_id.to_string()).into()),
    }
}

pub fn sweep(services: &Services) {
    let swept = services.orchestrator.initialize_polling();
    println!("{} orphaned photos marked failed", swept);
}

pub async fn resume(services: &Services) {
    let watcher = Watcher::subscribe(services);
    let resumed = services.orchestrator.resume_polling();
    println!("resumed polling for {} jobs", resumed);
    if resumed > 0 {
        watcher.run(services).await;
    }
}

/// Prints workflow events and notifications until the poller goes idle or
/// the user interrupts.
struct Watcher {
    events: tokio::sync::broadcast::Receiver<WorkflowEvent>,
    notifications: tokio::sync::broadcast::Receiver<Notification>,
}

impl Watcher {
    fn subscribe(services: &Services) -> Self {
        Self {
            events: services.orchestrator.subscribe(),
            notifications: services.notifications.subscribe(),
        }
    }

    async fn run(mut self, services: &Services) {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Interrupted, stopping all polling");
                    services.poller.stop_all_polling();
                    break;
                }
                _ = services.poller.wait_idle() => break,
                event = self.events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Missed {} workflow events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                Ok(notification) = self.notifications.recv() => {
                    println!("notification: {}", notification);
                }
            }
        }

        while let Ok(event) = self.events.try_recv() {
            print_event(&event);
        }
        while let Ok(notification) = self.notifications.try_recv() {
            println!("notification: {}", notification);
        }
    }
}

fn print_event(event: &WorkflowEvent) {
    match &event.error {
        Some(error) => println!("{} {} -> {} ({})", event.workflow_type, event.workflow_id, event.status, error),
        None => println!("{} {} -> {}", event.workflow_type, event.workflow_id, event.status),
    }
}

fn print_workflow_photo(services: &Services, workflow_id: &str) -> roomstage::Result<()> {
    let Some(workflow) = services.orchestrator.get_workflow(workflow_id) else {
        return Ok(());
    };
    if let Some(photo) = services.cache.get(&workflow.photo_id) {
        print_json(&photo);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Failed to render JSON: {}", e),
    }
}
