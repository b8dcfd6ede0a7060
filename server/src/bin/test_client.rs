//! Headless scripted client for manual smoke-testing the server.
//!
//! Connects, joins, and plays along with whatever role it is assigned:
//! as pitcher it commits a fastball and answers the flash sequence with
//! perfect timings; as batter it swings with perfect timings. Exits after
//! a few resolved at-bats or on inactivity.

use shared::{read_event, write_event, ClientEvent, FlashSequence, PitchType, ServerEvent};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

fn perfect_timings(flash_sequence: &FlashSequence) -> Vec<f64> {
    flash_sequence.iter().map(|f| f.time_ms).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:3000".to_string());

    let mut stream = TcpStream::connect(&addr).await?;
    println!("Connected to {}", addr);

    write_event(
        &mut stream,
        &ClientEvent::Join {
            name: "scripted-client".to_string(),
        },
    )
    .await?;

    let mut my_id = None;
    let mut i_am_pitching = false;
    let mut i_am_batting = false;
    let mut resolved_at_bats = 0;

    loop {
        let event = match timeout(Duration::from_secs(15), read_event::<_, ServerEvent>(&mut stream)).await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                println!("Connection closed: {}", e);
                break;
            }
            Err(_) => {
                println!("No events for 15s, giving up");
                break;
            }
        };

        match event {
            ServerEvent::Welcome { id } => {
                println!("Joined with session id {}", id);
                my_id = Some(id);
            }
            ServerEvent::Rejected { reason } => {
                println!("Server rejected us: {}", reason);
                break;
            }
            ServerEvent::PlayerJoined {
                id,
                name,
                is_pitching,
                is_batting,
            } => {
                println!(
                    "Player {} ({}) joined (pitching: {}, batting: {})",
                    id, name, is_pitching, is_batting
                );
                if Some(id) == my_id {
                    i_am_pitching = is_pitching;
                    i_am_batting = is_batting;
                }
            }
            ServerEvent::GameStateUpdate {
                inning,
                outs,
                score,
                status,
                ..
            } => {
                println!(
                    "Game state: inning {}, outs {}, score {}, status {:?}",
                    inning, outs, score, status
                );
                if i_am_pitching {
                    println!("Committing a fastball");
                    write_event(
                        &mut stream,
                        &ClientEvent::SelectPitch {
                            pitch_type: PitchType::Fastball,
                        },
                    )
                    .await?;
                }
            }
            ServerEvent::StartPitching {
                pitch_type,
                flash_sequence,
            } => {
                println!(
                    "Pitching a {:?} against {} flashes",
                    pitch_type,
                    flash_sequence.len()
                );
                let timings = perfect_timings(&flash_sequence);
                write_event(
                    &mut stream,
                    &ClientEvent::PitchTiming {
                        timings,
                        flash_sequence,
                    },
                )
                .await?;
            }
            ServerEvent::StartBatting {
                pitch_type,
                pitch_speed,
                flash_sequence,
            } => {
                println!(
                    "Pitch incoming: {:?} at speed {:.2}",
                    pitch_type, pitch_speed
                );
                if i_am_batting {
                    let timings = perfect_timings(&flash_sequence);
                    write_event(
                        &mut stream,
                        &ClientEvent::SwingTiming {
                            timings,
                            flash_sequence,
                        },
                    )
                    .await?;
                }
            }
            ServerEvent::HitResult {
                outcome,
                power,
                accuracy,
            } => {
                println!(
                    "At-bat resolved: {:?} (power {:.2}, accuracy {:.2})",
                    outcome, power, accuracy
                );
                resolved_at_bats += 1;
                if resolved_at_bats >= 3 {
                    println!("Three at-bats seen, done");
                    break;
                }
            }
            ServerEvent::PlayerLeft { id } => println!("Player {} left", id),
            ServerEvent::Chat { name, message } => println!("[{}] {}", name, message),
            ServerEvent::PlayerMoved { id, position } => {
                println!(
                    "Player {} moved to ({:.1}, {:.1})",
                    id, position.x, position.z
                );
            }
        }
    }

    println!("Test client finished");
    Ok(())
}
