pub mod broadcast;
pub mod config;
pub mod directory;
pub mod emitter;
pub mod error;
pub mod game_loop;
pub mod room_registry;

use std::sync::Arc;

use tokio::sync::mpsc;

use skyraid_core::events::GameEvent;

use broadcast::{Broadcaster, ChannelBroadcaster};
use config::ServerConfig;
use directory::{InMemoryDirectory, RoomDirectory};
use emitter::ChannelEventEmitter;
use game_loop::RoomSinks;
use room_registry::RoomRegistry;

/// A registry wired to in-process sinks.
pub struct Server {
    pub registry: RoomRegistry,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub directory: Arc<InMemoryDirectory>,
    /// Game events in emission order. Events are dropped while this is full.
    pub events: mpsc::Receiver<GameEvent>,
}

/// Build the registry and its channel-backed broadcaster, event bus and directory.
pub fn build_server(config: ServerConfig) -> Server {
    let broadcaster = Arc::new(ChannelBroadcaster::new(
        config.rooms.broadcast_capacity,
        config.rooms.keyframe_interval,
    ));
    let (emitter, events) = ChannelEventEmitter::new(config.rooms.event_capacity);
    let directory = Arc::new(InMemoryDirectory::new());
    let sinks = RoomSinks {
        broadcaster: Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
        emitter: Arc::new(emitter),
    };
    let registry = RoomRegistry::new(config, sinks)
        .with_directory(Arc::clone(&directory) as Arc<dyn RoomDirectory>);
    Server {
        registry,
        broadcaster,
        directory,
        events,
    }
}

/// Background task that drains the event bus into the log.
pub fn spawn_event_logger(mut events: mpsc::Receiver<GameEvent>) -> tokio::task::JoinHandle<()> {
    use emitter::{EventEmitter, TracingEventEmitter};

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            TracingEventEmitter.emit(&event);
        }
        tracing::info!("Event channel closed, stopping event logger");
    })
}
