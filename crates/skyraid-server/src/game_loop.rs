use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use skyraid_core::input::PlayerInput;
use skyraid_core::player::PlayerId;
use skyraid_core::room::RoomState;
use skyraid_core::sim::{RoomSim, SimCommand};

use crate::broadcast::Broadcaster;
use crate::emitter::EventEmitter;

/// Membership commands sent from the registry to a room's tick task.
#[derive(Debug)]
pub enum RoomCommand {
    /// Applied at the next tick; the reply carries the post-tick status.
    Join {
        player_id: PlayerId,
        reply: oneshot::Sender<RoomStatus>,
    },
    Leave {
        player_id: PlayerId,
    },
}

/// Latest observable state of a room, published after every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomStatus {
    pub state: RoomState,
    pub tick: u64,
    pub wave: u32,
    pub members: usize,
    /// Consecutive ticks with no members.
    pub empty_ticks: u64,
    /// When the room reached ENDED.
    pub ended_at: Option<Instant>,
}

impl RoomStatus {
    fn of(sim: &RoomSim, ended_at: Option<Instant>) -> Self {
        Self {
            state: sim.state(),
            tick: sim.tick(),
            wave: sim.wave(),
            members: sim.member_count(),
            empty_ticks: sim.empty_ticks(),
            ended_at,
        }
    }
}

/// Sinks a room's tick task publishes to.
#[derive(Clone)]
pub struct RoomSinks {
    pub broadcaster: Arc<dyn Broadcaster>,
    pub emitter: Arc<dyn EventEmitter>,
}

/// Handle to a running room task.
pub struct RoomLoop {
    pub cmd_tx: mpsc::UnboundedSender<RoomCommand>,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub status_rx: watch::Receiver<RoomStatus>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RoomLoop {
    /// Ask the task to stop. It exits at the next tick boundary.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn status(&self) -> RoomStatus {
        *self.status_rx.borrow()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            tracing::error!(error = %e, "Room task panicked");
        }
    }
}

/// Spawn the fixed-interval tick task for one room.
pub fn spawn_room_loop(sim: RoomSim, input_capacity: usize, sinks: RoomSinks) -> RoomLoop {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::channel(input_capacity.max(1));
    let (status_tx, status_rx) = watch::channel(RoomStatus::of(&sim, None));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(run_room_loop(
        sim,
        cmd_rx,
        input_rx,
        status_tx,
        shutdown_rx,
        sinks,
    ));

    RoomLoop {
        cmd_tx,
        input_tx,
        status_rx,
        shutdown_tx,
        handle,
    }
}

async fn run_room_loop(
    mut sim: RoomSim,
    mut cmd_rx: mpsc::UnboundedReceiver<RoomCommand>,
    mut input_rx: mpsc::Receiver<PlayerInput>,
    status_tx: watch::Sender<RoomStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
    sinks: RoomSinks,
) {
    let room_id = sim.room_id().to_string();
    let interval = Duration::from_millis(sim.config().tick_rate_ms.max(1));
    let mut deadline = Instant::now() + interval;

    tracing::info!(room = %room_id, tick_ms = interval.as_millis() as u64, "Room tick loop started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            () = tokio::time::sleep_until(deadline) => {},
        }

        // Only what is queued at the boundary belongs to this tick.
        let mut commands = Vec::new();
        let mut replies = Vec::new();
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                RoomCommand::Join { player_id, reply } => {
                    commands.push(SimCommand::Join(player_id));
                    replies.push(reply);
                },
                RoomCommand::Leave { player_id } => commands.push(SimCommand::Leave(player_id)),
            }
        }
        let queued = input_rx.len();
        let mut inputs = Vec::with_capacity(queued);
        for _ in 0..queued {
            match input_rx.try_recv() {
                Ok(input) => inputs.push(input),
                Err(_) => break,
            }
        }

        let output = sim.step(commands, inputs);
        sinks.broadcaster.publish(&room_id, &output.snapshot);
        for event in &output.events {
            sinks.emitter.emit(event);
        }

        let ended_at = (sim.state() == RoomState::Ended).then(Instant::now);
        let status = RoomStatus::of(&sim, ended_at);
        status_tx.send_replace(status);
        for reply in replies {
            let _ = reply.send(status);
        }

        if ended_at.is_some() {
            tracing::info!(room = %room_id, tick = sim.tick(), outcome = ?sim.outcome(), "Room ended");
            serve_ended(&mut sim, &room_id, &mut cmd_rx, &mut shutdown_rx, &status_tx, &sinks).await;
            break;
        }

        let (next, behind) = next_deadline(deadline, interval, Instant::now());
        if let Some(behind) = behind {
            tracing::warn!(
                room = %room_id,
                tick = sim.tick(),
                behind_ms = behind.as_millis() as u64,
                "Tick overrun"
            );
        }
        deadline = next;
    }

    sinks.broadcaster.close(&room_id);
    tracing::info!(room = %room_id, tick = sim.tick(), "Room tick loop stopped");
}

/// Advance an absolute tick deadline by one interval. If `now` is already past
/// it the tick overran: the next tick fires immediately and the schedule
/// restarts from `now`. Returns the new deadline and how far behind we were.
fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> (Instant, Option<Duration>) {
    let next = deadline + interval;
    if now > next {
        (now, Some(now - next))
    } else {
        (next, None)
    }
}

/// An ENDED room stops ticking. It only answers reconnects by re-publishing
/// its final snapshot until it is shut down.
async fn serve_ended(
    sim: &mut RoomSim,
    room_id: &str,
    cmd_rx: &mut mpsc::UnboundedReceiver<RoomCommand>,
    shutdown_rx: &mut watch::Receiver<bool>,
    status_tx: &watch::Sender<RoomStatus>,
    sinks: &RoomSinks,
) {
    loop {
        let cmd = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return,
            cmd = cmd_rx.recv() => cmd,
        };
        match cmd {
            Some(RoomCommand::Join { player_id, reply }) => {
                tracing::debug!(room = room_id, %player_id, "Reconnect to ended room");
                sinks.broadcaster.publish(room_id, &sim.snapshot());
                let _ = reply.send(*status_tx.borrow());
            },
            Some(RoomCommand::Leave { .. }) => {},
            None => return,
        }
    }
}
