use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use fanbus::protocol::{
    CommandDocument, ConfigDocument, CurvePoint, FanCommandEntry, FanConfigEntry, IngestReport,
    Request,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("fanbus")
        .version("0.1.0")
        .author("Building Controls Team")
        .about("Fan bank manager - send config and commands to a fanbus simulator")
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("duty")
                .about("Set a fan's duty cycle (0 reverts to automatic control)")
                .arg(Arg::with_name("fan").required(true).help("1-based fan index"))
                .arg(Arg::with_name("percent").required(true).help("Duty cycle 0-100")),
        )
        .subcommand(
            SubCommand::with_name("temp")
                .about("Report an external temperature for a fan (0 cancels the override)")
                .arg(Arg::with_name("fan").required(true).help("1-based fan index"))
                .arg(Arg::with_name("degrees").required(true).help("Temperature 0-126 degrees C")),
        )
        .subcommand(
            SubCommand::with_name("timeout")
                .about("Set a fan's external temperature timeout")
                .arg(Arg::with_name("fan").required(true).help("1-based fan index"))
                .arg(Arg::with_name("seconds").required(true).help("Timeout 0-86400 s (0 disables)")),
        )
        .subcommand(
            SubCommand::with_name("interval")
                .about("Set the telemetry publish interval")
                .arg(Arg::with_name("seconds").required(true).help("Interval 0-86400 s (0 disables)")),
        )
        .subcommand(
            SubCommand::with_name("curve")
                .about("Replace a fan's speed thresholds")
                .arg(Arg::with_name("fan").required(true).help("1-based fan index"))
                .arg(
                    Arg::with_name("points")
                        .required(true)
                        .multiple(true)
                        .help("Up to 8 TEMP:DUTY pairs, e.g. 30:25 40:50 50:100"),
                ),
        )
        .subcommand(SubCommand::with_name("watch").about("Stream telemetry snapshots"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT);
    let address = format!("{}:{}", host, port);

    match matches.subcommand() {
        ("duty", Some(sub)) => {
            let request = Request::Command(CommandDocument {
                fans: Some(vec![FanCommandEntry {
                    fan: parse_arg(sub, "fan")?,
                    duty_cycle: Some(parse_arg(sub, "percent")?),
                    external_temperature: None,
                }]),
            });
            send_request(&address, &request).await?;
        }
        ("temp", Some(sub)) => {
            let request = Request::Command(CommandDocument {
                fans: Some(vec![FanCommandEntry {
                    fan: parse_arg(sub, "fan")?,
                    duty_cycle: None,
                    external_temperature: Some(parse_arg(sub, "degrees")?),
                }]),
            });
            send_request(&address, &request).await?;
        }
        ("timeout", Some(sub)) => {
            let request = Request::Config(ConfigDocument {
                publish_fan_telemetry_seconds: None,
                fans: Some(vec![FanConfigEntry {
                    fan: parse_arg(sub, "fan")?,
                    external_temperature_timeout_seconds: Some(parse_arg(sub, "seconds")?),
                    fan_speed_thresholds: None,
                }]),
            });
            send_request(&address, &request).await?;
        }
        ("interval", Some(sub)) => {
            let request = Request::Config(ConfigDocument {
                publish_fan_telemetry_seconds: Some(parse_arg(sub, "seconds")?),
                fans: None,
            });
            send_request(&address, &request).await?;
        }
        ("curve", Some(sub)) => {
            let points = match sub.values_of("points") {
                Some(values) => values.map(parse_point).collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            let request = Request::Config(ConfigDocument {
                publish_fan_telemetry_seconds: None,
                fans: Some(vec![FanConfigEntry {
                    fan: parse_arg(sub, "fan")?,
                    external_temperature_timeout_seconds: None,
                    fan_speed_thresholds: Some(points),
                }]),
            });
            send_request(&address, &request).await?;
        }
        ("watch", Some(_)) => {
            watch_telemetry(&address).await?;
        }
        _ => {
            eprintln!("{}", "No subcommand given; try --help".yellow());
        }
    }

    Ok(())
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let raw = matches
        .value_of(name)
        .ok_or_else(|| format!("missing argument '{}'", name))?;
    raw.parse()
        .map_err(|e| format!("invalid {} '{}': {}", name, raw, e))
}

fn parse_point(raw: &str) -> Result<CurvePoint, String> {
    let (temp, duty) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid point '{}', expected TEMP:DUTY", raw))?;
    Ok(CurvePoint {
        temperature: temp
            .parse()
            .map_err(|e| format!("invalid temperature '{}': {}", temp, e))?,
        duty_cycle: duty
            .parse()
            .map_err(|e| format!("invalid duty cycle '{}': {}", duty, e))?,
    })
}

async fn send_request(
    address: &str,
    request: &Request,
) -> Result<(), Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(address).await?;
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    let json = serde_json::to_string(request)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut line = String::new();
    buf_reader.read_line(&mut line).await?;

    match serde_json::from_str::<IngestReport>(line.trim()) {
        Ok(report) => {
            let summary = format!("applied: {}  skipped: {}", report.applied, report.skipped);
            if report.skipped == 0 {
                println!("{}", summary.green());
            } else {
                println!("{}", summary.yellow());
            }
        }
        Err(_) => {
            println!("{}", line.trim().red());
        }
    }

    Ok(())
}

async fn watch_telemetry(address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stream = TcpStream::connect(address).await?;
    let (reader, _writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    println!("{}", format!("Watching telemetry from {}...", address).cyan());

    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            println!("{}", trimmed);
        }
    }

    Ok(())
}
