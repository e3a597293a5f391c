//! Worker pool draining the inbound update queue.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::relay::engine::RelayBot;
use crate::relay::update::Event;

pub type UpdateSender = mpsc::UnboundedSender<Event>;

/// Spawn `workers` tasks that each pull one event at a time and handle it to
/// completion. Workers exit once every sender has been dropped.
pub fn spawn_workers(bot: Arc<RelayBot>, workers: usize) -> (UpdateSender, Vec<JoinHandle<()>>) {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let rx = Arc::new(Mutex::new(rx));

    let handles = (0..workers)
        .map(|worker_id| {
            let bot = bot.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                run_worker(worker_id, bot, rx).await;
            })
        })
        .collect();

    info!("Started {} update worker(s)", workers);
    (tx, handles)
}

async fn run_worker(worker_id: usize, bot: Arc<RelayBot>, rx: Arc<Mutex<mpsc::UnboundedReceiver<Event>>>) {
    loop {
        let event = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(event) = event else {
            break;
        };

        if let Err(e) = bot.handle_event(event).await {
            error!(worker = worker_id, "{e}");
        }
    }
    info!(worker = worker_id, "update queue closed, worker exiting");
}
