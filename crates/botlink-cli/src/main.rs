//! `botlink` command line tool.
//!
//! ```text
//! botlink encode 28000500 6869          # print a length-prefixed frame
//! botlink --addr 10.0.0.7:5000 monitor  # dump every frame received
//! botlink script "sensor.distance()" --type int
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use botlink_frame::{FrameEncoder, Markers};
use botlink_link::{CancelToken, Channel, LinkConfig, Port, ResultType, ScriptClient, TcpTransport};

/// Talk to a controller board through a TCP serial bridge.
#[derive(Parser, Debug)]
#[command(name = "botlink", version, about, long_about = None)]
struct Cli {
    /// YAML link configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bridge address, overriding the configured port
    #[arg(short, long, global = true)]
    addr: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the frame carrying a payload
    Encode {
        /// Payload as hex (spaces allowed)
        #[arg(required_unless_present = "text")]
        hex: Vec<String>,

        /// Payload as UTF-8 text instead of hex
        #[arg(short, long, conflicts_with = "hex")]
        text: Option<String>,

        /// Use the simple-delimited dialect
        #[arg(long, default_value_t = false)]
        delimited: bool,
    },

    /// Print every frame received until interrupted
    Monitor {
        /// Stop after this many frames
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },

    /// Run a script on the board
    Script {
        /// Script source
        script: String,

        /// Expected result type
        #[arg(short = 't', long = "type", value_enum, default_value_t = ResultArg::Str)]
        result_type: ResultArg,

        /// Do not wait for a reply
        #[arg(long, default_value_t = false)]
        no_reply: bool,

        /// Serial number of the request
        #[arg(short, long, default_value_t = 0)]
        serial: u16,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResultArg {
    None,
    Bool,
    Int,
    Float,
    Str,
}

impl From<ResultArg> for ResultType {
    fn from(arg: ResultArg) -> Self {
        match arg {
            ResultArg::None => ResultType::None,
            ResultArg::Bool => ResultType::Bool,
            ResultArg::Int => ResultType::Int,
            ResultArg::Float => ResultType::Float,
            ResultArg::Str => ResultType::Str,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
    botlink_metrics::describe_metrics();

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(addr) = cli.addr {
        config.port = Port::Named(addr);
    }

    match cli.command {
        Command::Encode { hex, text, delimited } => encode(&config.channel.markers, &hex, text, delimited),
        Command::Monitor { count } => monitor(&config, count),
        Command::Script {
            script,
            result_type,
            no_reply,
            serial,
        } => run_script(&config, &script, result_type.into(), no_reply, serial),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<LinkConfig, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(LinkConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    let config = LinkConfig::from_yaml(&text)?;
    info!(path = %path.display(), "loaded link configuration");
    Ok(config)
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_interrupt(token: &CancelToken) -> Result<(), Box<dyn Error>> {
    let token = token.clone();
    ctrlc::set_handler(move || token.cancel())?;
    Ok(())
}

fn open_channel(config: &LinkConfig, cancel: &CancelToken) -> Result<Channel<TcpTransport>, Box<dyn Error>> {
    let transport = TcpTransport::new(config.queues.rx, config.queues.tx)?;
    let channel = Channel::try_open(transport, &config.port, config.channel)?.with_cancel_token(cancel.clone());
    Ok(channel)
}

fn encode(markers: &Markers, hex_parts: &[String], text: Option<String>, delimited: bool) -> Result<(), Box<dyn Error>> {
    let payload = match text {
        Some(text) => text.into_bytes(),
        None => hex::decode(hex_parts.concat())?,
    };

    let encoder = FrameEncoder::new(*markers);
    let frame = if delimited {
        encoder.encode_simple_delimited(&payload)
    } else {
        encoder.try_encode_length_prefixed(&payload)?
    };
    println!("{}", hex::encode_upper(frame));
    Ok(())
}

fn monitor(config: &LinkConfig, count: Option<u64>) -> Result<(), Box<dyn Error>> {
    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel)?;
    let mut channel = open_channel(config, &cancel)?;

    let mut received = 0u64;
    while !cancel.is_cancelled() && count.map_or(true, |n| received < n) {
        match channel.get_frame() {
            Some(frame) => {
                received += 1;
                println!("{:<16} {}", frame.kind(), hex::encode_upper(frame.as_bytes()));
            }
            None if !channel.transport().is_connected() => {
                warn!("bridge disconnected");
                break;
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
    }

    let stats = channel.assembler().stats();
    info!(frames = stats.frames, dropped = stats.dropped(), "monitor finished");
    Ok(())
}

fn run_script(
    config: &LinkConfig,
    script: &str,
    result_type: ResultType,
    no_reply: bool,
    serial: u16,
) -> Result<(), Box<dyn Error>> {
    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel)?;
    let channel = open_channel(config, &cancel)?;
    let mut client = ScriptClient::new(channel).with_timing(config.rpc);

    if no_reply {
        client.fire_and_forget(serial, script)?;
        return Ok(());
    }

    let value = client.request_response(serial, script, result_type)?;
    println!("{}", value);
    Ok(())
}
