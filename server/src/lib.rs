//! # Sandlot Game Server Library
//!
//! Authoritative server for a two-player timing-based baseball minigame.
//! Clients connect over TCP, exchange length-prefixed bincode events, and
//! play a pitch/swing timing duel; the server owns every rule decision and
//! the canonical game state.
//!
//! ## Architecture
//!
//! All shared state lives behind a single coordinator loop: the accept
//! loop, per-connection readers, and the CPU surrogate timers only post
//! messages into one queue, and the coordinator processes them one at a
//! time. That serializes every mutation of the game state and session
//! registry without locks, and it means a stale CPU timer or a disconnect
//! race is always resolved against current state, never against a snapshot.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Connection lifecycle and player records: vacancy-based role assignment
//! (batter first, then pitcher, then spectators), per-session stats, and
//! the broadcast fan-out over each connection's outbound channel.
//!
//! ### Game Module (`game`)
//! The turn-based state machine: innings, outs, score, role ownership, and
//! the stored scalars of the pitch in flight. Actions from sessions that do
//! not hold the required role are dropped silently.
//!
//! ### Scoring Module (`scoring`)
//! Pure timing-to-outcome resolution: accuracy and speed scalars from raw
//! timestamps, flash-sequence generation, and the hit-chance thresholds
//! that decide strike/foul/hit/home-run.
//!
//! ### CPU Module (`cpu`)
//! The surrogate driver that stands in for an absent human: a cancellable
//! timer per CPU-held role, feeding synthesized timings through the same
//! resolver path a human submission takes.
//!
//! ### Network Module (`network`)
//! TCP accept loop, framed reader/writer tasks, the coordinator itself,
//! and the full client event catalogue (join, chat, pitch, swing, move).

pub mod cpu;
pub mod game;
pub mod network;
pub mod scoring;
pub mod session;
