use anyhow::Context;
use clap::Parser;
use lorastation::logging::{self, SYS};
use lorastation::ral::sim::SharedSim;
use lorastation::ral::Ral;
use lorastation::station::{ExitReason, Station};
use lorastation::transport::mock_pair;
use lorastation::{config, init_logger, StationIdent};
use std::path::PathBuf;
use std::time::Instant;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "lorastation")]
#[command(about = "LoRaWAN gateway station")]
struct Cli {
    /// Directory holding station.conf and slave-N.conf
    #[arg(long, default_value = ".")]
    home: PathBuf,

    /// Run as slave N (loads slave-N.conf overrides)
    #[arg(long)]
    slave: Option<u32>,

    /// Run against the in-tree concentrator simulator and an idle
    /// transport (hardware and muxs back-ends attach behind the traits)
    #[arg(long)]
    sim: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();
    let cli = Cli::parse();

    let conf = config::load(&cli.home, cli.slave).context("loading station.conf")?;
    let ident = StationIdent {
        station: env!("CARGO_PKG_VERSION").to_string(),
        firmware: "unknown".into(),
        package: env!("CARGO_PKG_NAME").to_string(),
        model: conf.model.clone(),
        features: features_string(),
    };

    if !cli.sim {
        anyhow::bail!("no hardware concentrator back-end linked; run with --sim");
    }
    let sim = SharedSim::new();
    let ral = Ral::new(Box::new(sim), cli.slave.unwrap_or(0) as u8, true, Instant::now())
        .context("bringing up the radio abstraction layer")?;
    let (transport, _handle) = mock_pair();

    let mut station = Station::new(conf, ident, ral, Box::new(transport));
    if let Some(dev) = &station.conf.gps_device {
        match lorastation::gps::GpsDevice::open(dev, station.conf.gps_baud) {
            Ok(g) => station.gps = Some(g),
            Err(e) => logging::log_warn(SYS, &format!("GPS disabled: {e}")),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handlers(shutdown_tx)?;

    match station.run(shutdown_rx).await? {
        ExitReason::Shutdown => Ok(()),
        ExitReason::TimeFault => {
            logging::log_error(SYS, "exiting for supervisor restart (time domain fault)");
            std::process::exit(2);
        }
    }
}

fn features_string() -> String {
    let mut feats = vec!["gps", "gps-conf", "duty-conf", "pdu-conf", "lbt-conf", "updn-dr"];
    if !cfg!(feature = "testflags") {
        feats.push("prod");
    }
    feats.join(" ")
}

fn spawn_signal_handlers(shutdown: watch::Sender<bool>) -> anyhow::Result<()> {
    let mut term = signal(SignalKind::terminate()).context("SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("SIGINT handler")?;
    let mut hup = signal(SignalKind::hangup()).context("SIGHUP handler")?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = term.recv() => {
                    logging::log_info(SYS, "SIGTERM");
                    let _ = shutdown.send(true);
                }
                _ = int.recv() => {
                    logging::log_info(SYS, "SIGINT");
                    let _ = shutdown.send(true);
                }
                _ = hup.recv() => logging::reopen(),
            }
        }
    });
    Ok(())
}
