//! TCP network layer and the coordinating event loop.
//!
//! One accept loop feeds connections into a single [`Coordinator`], which
//! owns the session registry, the game state, and the CPU driver handles.
//! Every state transition — join, leave, pitch/swing submission, CPU tick —
//! arrives as a [`ServerMessage`] and is processed to completion before the
//! next, so no other serialization is needed. Per-connection reader and
//! writer tasks only move frames; they never touch shared state.

use crate::cpu::{self, CpuDriver};
use crate::game::GameState;
use crate::session::SessionRegistry;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{
    read_event, write_event, ClientEvent, Direction, PitchType, Role, ServerEvent, SessionId,
};
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Messages funneled into the coordinator loop.
#[derive(Debug)]
pub enum ServerMessage {
    /// A freshly accepted connection, not yet registered.
    Accepted { stream: TcpStream },
    /// A decoded client event from a registered connection.
    Event { id: SessionId, event: ClientEvent },
    /// The connection's read side reached EOF or errored.
    Closed { id: SessionId },
    /// A CPU driver's scheduled action for the role it stands in for.
    CpuSubmit { role: Role },
}

/// Owns all mutable game state and processes one message at a time.
pub struct Coordinator {
    registry: SessionRegistry,
    game: GameState,
    cpu_pitcher: Option<CpuDriver>,
    cpu_batter: Option<CpuDriver>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    cpu_period: Duration,
    cpu_reaction_delay: Duration,
}

impl Coordinator {
    pub fn new(
        max_sessions: usize,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        cpu_period: Duration,
        cpu_reaction_delay: Duration,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(max_sessions),
            game: GameState::new(),
            cpu_pitcher: None,
            cpu_batter: None,
            server_tx,
            cpu_period,
            cpu_reaction_delay,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Registers an established peer and greets it with its session id.
    /// The accept path calls this with the connection's writer handle.
    pub fn connect_peer(&mut self, tx: mpsc::UnboundedSender<ServerEvent>) -> SessionId {
        let id = self.registry.connect(tx);
        self.registry.send_to(id, &ServerEvent::Welcome { id });
        id
    }

    /// Processes one message to completion, then reconciles the CPU drivers
    /// against the resulting role ownership.
    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Accepted { stream } => self.handle_accepted(stream),
            ServerMessage::Event { id, event } => self.handle_event(id, event),
            ServerMessage::Closed { id } => self.handle_disconnect(id),
            ServerMessage::CpuSubmit { role } => self.handle_cpu_submit(role),
        }

        self.reconcile_cpu_drivers();
    }

    fn handle_accepted(&mut self, stream: TcpStream) {
        if !self.registry.has_capacity() {
            warn!("Refusing connection: server full");
            tokio::spawn(async move {
                let mut stream = stream;
                let rejection = ServerEvent::Rejected {
                    reason: "server full".to_string(),
                };
                if let Err(e) = write_event(&mut stream, &rejection).await {
                    debug!("Failed to deliver rejection: {}", e);
                }
            });
            return;
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
        let id = self.connect_peer(tx);

        // Writer: drains this session's outbound queue onto the socket.
        tokio::spawn(async move {
            let mut write_half = write_half;
            while let Some(event) = rx.recv().await {
                if let Err(e) = write_event(&mut write_half, &event).await {
                    debug!("Write to session {} failed: {}", id, e);
                    break;
                }
            }
        });

        // Reader: decodes frames into coordinator messages until EOF.
        let server_tx = self.server_tx.clone();
        tokio::spawn(async move {
            let mut read_half = read_half;
            run_reader(id, &mut read_half, server_tx).await;
        });
    }

    fn handle_event(&mut self, id: SessionId, event: ClientEvent) {
        match event {
            ClientEvent::Join { name } => self.handle_join(id, name),
            ClientEvent::Chat { message } => self.handle_chat(id, message),
            ClientEvent::SelectPitch { pitch_type } => self.handle_select_pitch(id, pitch_type),
            ClientEvent::PitchTiming {
                timings,
                flash_sequence,
            } => self.handle_pitch_timing(id, &timings, &flash_sequence),
            ClientEvent::SwingTiming {
                timings,
                flash_sequence,
            } => self.handle_swing_timing(id, &timings, &flash_sequence),
            ClientEvent::Move { direction } => self.handle_move(id, direction),
        }
    }

    fn handle_join(&mut self, id: SessionId, name: String) {
        let Some(role) = self.registry.join(id, name) else {
            debug!("Ignoring join from unknown or already-joined peer {}", id);
            return;
        };

        if let Some(role) = role {
            self.game.claim_role(id, role);
        }

        // Roster event plus a full snapshot, to everyone.
        if let Some(session) = self.registry.session(id) {
            self.registry.broadcast(&ServerEvent::PlayerJoined {
                id,
                name: session.name.clone(),
                is_pitching: session.is_pitching,
                is_batting: session.is_batting,
            });
        }
        self.registry.broadcast(&self.game.snapshot());
    }

    fn handle_chat(&mut self, id: SessionId, message: String) {
        // Only joined players may chat; their display name tags the line.
        if let Some(session) = self.registry.session(id) {
            self.registry.broadcast(&ServerEvent::Chat {
                name: session.name.clone(),
                message,
            });
        }
    }

    fn handle_select_pitch(&mut self, id: SessionId, pitch_type: PitchType) {
        if !self.game.select_pitch(id, pitch_type) {
            return;
        }

        let flash_sequence = crate::scoring::generate_flash_sequence(&mut rand::thread_rng(), 1.0);
        self.registry.send_to(
            id,
            &ServerEvent::StartPitching {
                pitch_type,
                flash_sequence,
            },
        );
    }

    fn handle_pitch_timing(&mut self, id: SessionId, timings: &[f64], flash_sequence: &[shared::Flash]) {
        let Some(speed) = self.game.apply_pitch(id, timings, flash_sequence) else {
            return;
        };

        // The batter reacts to a fresh sequence scaled by the pitch speed.
        let batter_sequence = crate::scoring::generate_flash_sequence(&mut rand::thread_rng(), speed);
        self.registry.broadcast(&ServerEvent::StartBatting {
            pitch_type: self.game.pitch_type,
            pitch_speed: speed,
            flash_sequence: batter_sequence,
        });
    }

    fn handle_swing_timing(&mut self, id: SessionId, timings: &[f64], flash_sequence: &[shared::Flash]) {
        let Some(result) = self
            .game
            .apply_swing(id, timings, flash_sequence, &mut self.registry)
        else {
            return;
        };

        self.registry.broadcast(&ServerEvent::HitResult {
            outcome: result.outcome,
            power: result.power,
            accuracy: result.accuracy,
        });
    }

    fn handle_move(&mut self, id: SessionId, direction: Direction) {
        if let Some(session) = self.registry.session_mut(id) {
            session.position.step(direction);
            let position = session.position;
            self.registry
                .broadcast(&ServerEvent::PlayerMoved { id, position });
        }
    }

    fn handle_disconnect(&mut self, id: SessionId) {
        let Some(session) = self.registry.disconnect(id) else {
            return;
        };

        if let Some(role) = session.role() {
            self.game.release_role(role);
        }

        self.registry.broadcast(&ServerEvent::PlayerLeft { id });
        self.registry.broadcast(&self.game.snapshot());
    }

    /// A CPU driver fired. Ownership is re-checked here, at processing time:
    /// a submit already in the queue when a human claimed the role, or one
    /// racing a disconnect, validates against current state and is dropped.
    fn handle_cpu_submit(&mut self, role: Role) {
        if !self.game.is_cpu_playing {
            return;
        }

        let mut rng = rand::thread_rng();
        match role {
            Role::Pitcher => {
                if !self.game.pitcher.is_cpu() {
                    debug!("Stale CPU pitch dropped");
                    return;
                }

                let pitch_type = PitchType::ALL[rng.gen_range(0..PitchType::ALL.len())];
                let flash_sequence = crate::scoring::generate_flash_sequence(&mut rng, 1.0);
                let timings = cpu::synthesize_timings(&mut rng, &flash_sequence);
                let accuracy = crate::scoring::accuracy(&timings, &flash_sequence);
                let speed = crate::scoring::speed(&timings);

                self.game.pitch_type = Some(pitch_type);
                self.game.record_pitch(accuracy, speed);

                let batter_sequence = crate::scoring::generate_flash_sequence(&mut rng, speed);
                self.registry.broadcast(&ServerEvent::StartBatting {
                    pitch_type: Some(pitch_type),
                    pitch_speed: speed,
                    flash_sequence: batter_sequence,
                });
            }
            Role::Batter => {
                if !self.game.batter.is_cpu() {
                    debug!("Stale CPU swing dropped");
                    return;
                }

                let flash_sequence =
                    crate::scoring::generate_flash_sequence(&mut rng, self.game.pitch_speed);
                let timings = cpu::synthesize_timings(&mut rng, &flash_sequence);
                let swing_accuracy = crate::scoring::accuracy(&timings, &flash_sequence);
                let swing_power = crate::scoring::speed(&timings);
                let result = crate::scoring::resolve_hit(
                    swing_accuracy,
                    swing_power,
                    self.game.pitch_speed,
                    self.game.pitch_accuracy,
                );

                self.game.apply_hit_result(&result, &mut self.registry);
                self.registry.broadcast(&ServerEvent::HitResult {
                    outcome: result.outcome,
                    power: result.power,
                    accuracy: result.accuracy,
                });
            }
        }
    }

    /// Ensures exactly the CPU-held roles have a running driver. Dropping a
    /// handle aborts its timer, so a role claimed by a human mid-wait stops
    /// producing submits immediately.
    fn reconcile_cpu_drivers(&mut self) {
        let want_pitcher = self.game.is_cpu_playing && self.game.pitcher.is_cpu();
        let want_batter = self.game.is_cpu_playing && self.game.batter.is_cpu();

        match (&self.cpu_pitcher, want_pitcher) {
            (None, true) => {
                self.cpu_pitcher = Some(CpuDriver::spawn_with_timing(
                    Role::Pitcher,
                    self.server_tx.clone(),
                    self.cpu_period,
                    self.cpu_reaction_delay,
                ));
            }
            (Some(_), false) => self.cpu_pitcher = None,
            _ => {}
        }

        match (&self.cpu_batter, want_batter) {
            (None, true) => {
                self.cpu_batter = Some(CpuDriver::spawn_with_timing(
                    Role::Batter,
                    self.server_tx.clone(),
                    self.cpu_period,
                    self.cpu_reaction_delay,
                ));
            }
            (Some(_), false) => self.cpu_batter = None,
            _ => {}
        }
    }
}

async fn run_reader(
    id: SessionId,
    read_half: &mut OwnedReadHalf,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        match read_event::<_, ClientEvent>(read_half).await {
            Ok(event) => {
                if server_tx.send(ServerMessage::Event { id, event }).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Session {} read ended: {}", id, e);
                let _ = server_tx.send(ServerMessage::Closed { id });
                break;
            }
        }
    }
}

/// The listening server: accept loop plus the coordinator message loop.
pub struct Server {
    listener: TcpListener,
    coordinator: Coordinator,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listener and builds the coordinator. CPU timing is
    /// parameterized so tests can run the surrogate on a short fuse.
    pub async fn bind(
        addr: &str,
        max_sessions: usize,
        cpu_period: Duration,
        cpu_reaction_delay: Duration,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(max_sessions, server_tx, cpu_period, cpu_reaction_delay);

        Ok(Self {
            listener,
            coordinator,
            server_rx,
        })
    }

    /// The bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop and the coordinator until the process stops.
    pub async fn run(mut self) -> std::io::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!("Connection accepted from {}", addr);
                            self.coordinator
                                .handle_message(ServerMessage::Accepted { stream });
                        }
                        Err(e) => {
                            error!("Accept failed: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.coordinator.handle_message(message),
                        None => break,
                    }
                }
            }
        }

        Ok(())
    }
}
