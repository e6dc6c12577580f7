mod config;
mod crossing;
mod race;
mod station;

use std::sync::Arc;

use foundation_coordination::{
    CancellationToken, EventKind, EventLog, EventObserver, FanOut, TracingObserver,
};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use config::DemosConfig;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn main() -> std::result::Result<(), BoxedError> {
    let commander = crossing::register(station::register(race::register(
        clap::Command::new("coordination_demos")
            .about("Runs the race, gas station and railroad crossing simulations")
            .arg_required_else_help(true)
            .arg(
                clap::Arg::new("config")
                    .short('c')
                    .long("config")
                    .global(true)
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(std::path::PathBuf))
                    .help("TOML file with [race], [station] and [crossing] tables"),
            )
            .arg(
                clap::Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .global(true)
                    .action(clap::ArgAction::SetTrue)
                    .help("log wait and wake-up details"),
            )
            .subcommand(clap::Command::new("all").about("runs every simulation in turn")),
    )));

    let matches = commander.get_matches();

    let level = if matches.get_flag("verbose") {
        Level::TRACE
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = DemosConfig::load(matches.get_one::<std::path::PathBuf>("config"))?;
    let token = cancel_on_interrupt()?;

    match matches.subcommand() {
        Some(("race", arguments)) => race::run(arguments, settings.race, &token)?,
        Some(("station", arguments)) => station::run(arguments, settings.station, &token)?,
        Some(("crossing", arguments)) => crossing::run(arguments, settings.crossing, &token)?,
        Some(("all", arguments)) => {
            race::run(arguments, settings.race, &token)?;
            station::run(arguments, settings.station, &token)?;
            crossing::run(arguments, settings.crossing, &token)?;
        }
        _ => {}
    }

    Ok(())
}

/// Ctrl-C cancels the returned token; running workers give up what they
/// hold and the simulation reports them as cancelled.
fn cancel_on_interrupt() -> std::result::Result<CancellationToken, BoxedError> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupted, cancelling all actors");
        handler_token.cancel();
    })?;
    Ok(token)
}

/// Logs every event and keeps a copy for the closing summary.
pub(crate) fn observers() -> (Arc<EventLog>, Arc<dyn EventObserver>) {
    let log = Arc::new(EventLog::new());
    let fan_out = FanOut::new()
        .with(Arc::new(TracingObserver))
        .with(log.clone());
    (log, Arc::new(fan_out))
}

pub(crate) fn log_summary(name: &str, log: &EventLog) {
    tracing::info!(
        "{name}: {} admitted, {} departed, {} cancelled",
        log.count(EventKind::Admitted, None),
        log.count(EventKind::Departed, None),
        log.count(EventKind::Cancelled, None),
    );
}
