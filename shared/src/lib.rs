//! Wire protocol and shared game types for the sandlot baseball minigame.
//!
//! Both the server and any headless client speak length-prefixed bincode
//! frames carrying [`ClientEvent`] / [`ServerEvent`] values. The TCP stream
//! gives per-connection FIFO delivery; no ordering is guaranteed across
//! connections.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Side length of the square field; players move within +/- half of this.
pub const FIELD_SIZE: f64 = 100.0;
/// Distance covered by a single move event.
pub const MOVE_STEP: f64 = 0.5;

/// Number of timed targets in a flash sequence.
pub const FLASH_COUNT: usize = 2;
/// Nominal spacing between flashes at unit pitch speed, in milliseconds.
pub const FLASH_BASE_INTERVAL_MS: f64 = 1000.0;
/// Accumulated timing error (ms) at which accuracy bottoms out at zero.
pub const TIMING_ERROR_BUDGET_MS: f64 = 1000.0;

/// Lower clamp for pitch speed / swing power.
pub const MIN_SPEED: f64 = 0.5;
/// Upper clamp for pitch speed / swing power.
pub const MAX_SPEED: f64 = 1.5;

/// How often a CPU-held role attempts an action.
pub const CPU_PERIOD_MS: u64 = 5000;
/// Simulated reaction time before the CPU submits its timings.
pub const CPU_REACTION_DELAY_MS: u64 = 2000;
/// CPU timing jitter: uniform noise in +/- this many milliseconds.
pub const CPU_TIMING_NOISE_MS: f64 = 100.0;

/// Maximum accepted frame payload size.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Server-assigned connection/session identifier.
pub type SessionId = u32;

/// Occupant of the pitcher or batter role.
///
/// Replaces the usual string sentinel for "the computer" with a tagged
/// variant so role checks cannot silently mistype.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RoleOwner {
    Human(SessionId),
    Cpu,
}

impl RoleOwner {
    pub fn is_cpu(&self) -> bool {
        matches!(self, RoleOwner::Cpu)
    }

    /// Returns the session id when a human holds the role.
    pub fn human(&self) -> Option<SessionId> {
        match self {
            RoleOwner::Human(id) => Some(*id),
            RoleOwner::Cpu => None,
        }
    }
}

/// Which of the two contested roles an actor occupies.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Pitcher,
    Batter,
}

/// Coarse phase of the at-bat cycle.
///
/// `Fielding` is declared for protocol completeness but never entered by the
/// current state machine.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Waiting,
    Pitching,
    Batting,
    Fielding,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PitchType {
    Fastball,
    Curve,
    Changeup,
}

impl PitchType {
    pub const ALL: [PitchType; 3] = [PitchType::Fastball, PitchType::Curve, PitchType::Changeup];
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// A player's location on the field. Movement happens in the x/z plane.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn origin() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Moves one step in the given direction, clamped to the field bounds.
    pub fn step(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.z -= MOVE_STEP,
            Direction::Down => self.z += MOVE_STEP,
            Direction::Left => self.x -= MOVE_STEP,
            Direction::Right => self.x += MOVE_STEP,
        }

        let half = FIELD_SIZE / 2.0;
        self.x = self.x.clamp(-half, half);
        self.z = self.z.clamp(-half, half);
    }
}

/// Normalized 2D point at which a flash appears on the client's overlay.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct FlashPoint {
    pub x: f64,
    pub y: f64,
}

/// One timed target: offset from sequence start plus screen position.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Flash {
    pub time_ms: f64,
    pub position: FlashPoint,
}

/// The timed-target prompt gating both pitch and swing input.
///
/// Generated fresh per attempt, immutable once issued, consumed exactly once
/// when the matching timing submission is scored.
pub type FlashSequence = Vec<Flash>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Strike,
    Foul,
    Hit,
    HomeRun,
}

/// Resolution of a single at-bat.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub outcome: HitOutcome,
    pub power: f64,
    pub accuracy: f64,
}

/// Events a client may send to the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientEvent {
    Join {
        name: String,
    },
    Chat {
        message: String,
    },
    SelectPitch {
        pitch_type: PitchType,
    },
    PitchTiming {
        timings: Vec<f64>,
        flash_sequence: FlashSequence,
    },
    SwingTiming {
        timings: Vec<f64>,
        flash_sequence: FlashSequence,
    },
    Move {
        direction: Direction,
    },
}

/// Events the server emits, either to one session or to everyone.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerEvent {
    /// Direct: tells a freshly accepted connection its session id.
    Welcome { id: SessionId },
    /// Direct: the server refused the connection (e.g. at capacity).
    Rejected { reason: String },
    PlayerJoined {
        id: SessionId,
        name: String,
        is_pitching: bool,
        is_batting: bool,
    },
    PlayerLeft {
        id: SessionId,
    },
    Chat {
        name: String,
        message: String,
    },
    /// Full snapshot of the shared game state.
    GameStateUpdate {
        inning: u32,
        outs: u32,
        score: u32,
        current_pitcher: RoleOwner,
        current_batter: RoleOwner,
        status: GameStatus,
    },
    /// Direct to the pitcher: the flash sequence for the committed pitch.
    StartPitching {
        pitch_type: PitchType,
        flash_sequence: FlashSequence,
    },
    /// Broadcast: the pitch is in flight, batter reacts to this sequence.
    /// The pitch type is absent when the pitcher never committed one.
    StartBatting {
        pitch_type: Option<PitchType>,
        pitch_speed: f64,
        flash_sequence: FlashSequence,
    },
    HitResult {
        outcome: HitOutcome,
        power: f64,
        accuracy: f64,
    },
    PlayerMoved {
        id: SessionId,
        position: Position,
    },
}

/// Writes one length-prefixed bincode frame.
pub async fn write_event<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    if data.len() > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame exceeds maximum length",
        ));
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await
}

/// Reads one length-prefixed bincode frame.
pub async fn read_event<R, T>(reader: &mut R) -> std::io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;

    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame exceeds maximum length",
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    bincode::deserialize(&buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
