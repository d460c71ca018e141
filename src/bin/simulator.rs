use fanbus::protocol::Request;
use fanbus::{ConfigDocument, FanBank, SimulatedBus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{error, info, warn};

const TCP_PORT: u16 = 8090;
const TELEMETRY_BROADCAST_BUFFER_SIZE: usize = 64;
const TICK_PERIOD_MS: u64 = 250;
const DEMO_PUBLISH_SECONDS: u32 = 5;

/// Demo topology: one fully loaded mux at 0x70, a second mux at 0x72 with a
/// single fan on channel 4.
fn build_bus() -> SimulatedBus {
    let mut bus = SimulatedBus::new();
    for channel in 0..4 {
        bus.add_device(0, channel);
    }
    bus.add_device(2, 4);

    for channel in 0..4 {
        bus.set_reading(0, channel, 24.0 + channel as f32, 1200 + 50 * channel as u16);
    }
    bus.set_reading(2, 4, 31.0, 900);

    bus
}

/// Drift the simulated readings so telemetry has something to show.
fn drift_readings(bus: &mut SimulatedBus, elapsed_ms: u64) {
    let phase = elapsed_ms as f32 / 30_000.0 * core::f32::consts::TAU;
    for (mux, channel) in [(0, 0), (0, 1), (0, 2), (0, 3), (2, 4)] {
        let base = 24.0 + (mux * 8 + channel) as f32;
        let rpm = 900 + ((phase + channel as f32).sin().abs() * 600.0) as u16;
        bus.set_reading(mux, channel, base + phase.sin() * 4.0, rpm);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Fan Bank Simulator");
    println!("==================");

    let mut bank = FanBank::new(build_bus());
    let fans_found = bank.discover();
    println!("{fans_found} fan controllers discovered");

    // Tighten the publish interval so the demo emits telemetry promptly.
    bank.apply_config(&ConfigDocument {
        publish_fan_telemetry_seconds: Some(DEMO_PUBLISH_SECONDS),
        fans: None,
    });

    let bank = Arc::new(Mutex::new(bank));
    let start = Instant::now();

    let (telemetry_tx, _) = broadcast::channel(TELEMETRY_BROADCAST_BUFFER_SIZE);

    let tcp_bank = Arc::clone(&bank);
    let tcp_telemetry_tx = telemetry_tx.clone();
    let _tcp_server = tokio::spawn(async move {
        if let Err(e) = run_tcp_server(tcp_bank, tcp_telemetry_tx, start).await {
            error!("TCP server error: {}", e);
        }
    });

    // Scheduler loop: watchdog tick plus rate-limited telemetry.
    let mut interval = time::interval(Duration::from_millis(TICK_PERIOD_MS));

    loop {
        interval.tick().await;
        let now_ms = start.elapsed().as_millis() as u64;

        let snapshot = {
            let mut bank_guard = bank.lock().await;
            drift_readings(bank_guard.driver_mut(), now_ms);
            bank_guard.poll_watchdog(now_ms);
            bank_guard.sample_telemetry(now_ms)
        };

        if let Some(snapshot) = snapshot {
            match serde_json::to_string(&snapshot[..]) {
                Ok(json) => {
                    info!("telemetry: {}", json);
                    // Send fails only when no client is subscribed.
                    let _ = telemetry_tx.send(json);
                }
                Err(e) => error!("telemetry serialization error: {}", e),
            }
        }
    }
}

async fn run_tcp_server(
    bank: Arc<Mutex<FanBank<SimulatedBus>>>,
    telemetry_tx: broadcast::Sender<String>,
    epoch: Instant,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", TCP_PORT)).await?;
    info!("TCP server listening on port {}", TCP_PORT);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("client connected: {}", addr);
                let client_bank = Arc::clone(&bank);
                let client_telemetry_rx = telemetry_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_client(stream, client_bank, client_telemetry_rx, epoch).await
                    {
                        warn!("client {} error: {}", addr, e);
                    }
                    info!("client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    bank: Arc<Mutex<FanBank<SimulatedBus>>>,
    mut telemetry_rx: broadcast::Receiver<String>,
    epoch: Instant,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    let writer = Arc::new(Mutex::new(writer));

    // Stream telemetry broadcasts alongside request responses.
    let telemetry_writer = Arc::clone(&writer);
    let telemetry_task = tokio::spawn(async move {
        while let Ok(telemetry) = telemetry_rx.recv().await {
            let mut writer_guard = telemetry_writer.lock().await;
            if writer_guard.write_all(telemetry.as_bytes()).await.is_err() {
                break;
            }
            if writer_guard.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let reply = match serde_json::from_str::<Request>(trimmed) {
                    Ok(request) => {
                        info!("received request: {:?}", request);
                        let now_ms = epoch.elapsed().as_millis() as u64;
                        let report = {
                            let mut bank_guard = bank.lock().await;
                            match request {
                                Request::Config(doc) => bank_guard.apply_config(&doc),
                                Request::Command(doc) => bank_guard.apply_command(&doc, now_ms),
                            }
                        };
                        serde_json::to_string(&report)?
                    }
                    Err(e) => {
                        warn!("failed to parse request: {}", e);
                        serde_json::json!({ "error": format!("invalid request: {e}") })
                            .to_string()
                    }
                };

                let mut writer_guard = writer.lock().await;
                writer_guard.write_all(reply.as_bytes()).await?;
                writer_guard.write_all(b"\n").await?;
            }
            Err(e) => {
                error!("error reading from client: {}", e);
                break;
            }
        }
    }

    telemetry_task.abort();
    Ok(())
}
