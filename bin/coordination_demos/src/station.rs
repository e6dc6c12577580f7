use foundation_coordination::simulations::{gas_station, StationConfig};
use foundation_coordination::CancellationToken;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("station")
            .about("customers share a gas station with a fixed number of pumps")
            .arg(
                clap::Arg::new("pumps")
                    .short('p')
                    .long("pumps")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("customers")
                    .short('n')
                    .long("customers")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("refuel_ms")
                    .long("refuel-ms")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(u64)),
            ),
    )
}

pub fn run(
    args: &clap::ArgMatches,
    mut config: StationConfig,
    token: &CancellationToken,
) -> std::result::Result<(), BoxedError> {
    if let Ok(Some(pumps)) = args.try_get_one::<usize>("pumps") {
        config.pumps = *pumps;
    }
    if let Ok(Some(customers)) = args.try_get_one::<usize>("customers") {
        config.customers = *customers;
    }
    if let Ok(Some(refuel_ms)) = args.try_get_one::<u64>("refuel_ms") {
        config.refuel_ms = *refuel_ms;
    }
    if config.pumps == 0 {
        return Err("a gas station needs at least one pump".into());
    }

    tracing::info!(
        "Gas station with {} pumps and {} customers, at least {:?}",
        config.pumps,
        config.customers,
        config.minimum_duration()
    );
    let (log, observer) = crate::observers();

    let report = gas_station::run(&config, observer, token)?;
    tracing::info!(
        "{} served, {} left early, took {:?}",
        report.served,
        report.cancelled,
        report.elapsed
    );

    crate::log_summary("station", &log);
    Ok(())
}
