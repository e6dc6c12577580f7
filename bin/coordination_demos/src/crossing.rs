use foundation_coordination::simulations::{crossing, CrossingConfig};
use foundation_coordination::CancellationToken;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("crossing")
            .about("cars and trains share a railroad crossing, trains first")
            .arg(
                clap::Arg::new("cars")
                    .long("cars")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("trains")
                    .long("trains")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            ),
    )
}

pub fn run(
    args: &clap::ArgMatches,
    mut config: CrossingConfig,
    token: &CancellationToken,
) -> std::result::Result<(), BoxedError> {
    if let Ok(Some(cars)) = args.try_get_one::<usize>("cars") {
        config.cars = *cars;
    }
    if let Ok(Some(trains)) = args.try_get_one::<usize>("trains") {
        config.trains = *trains;
    }

    tracing::info!("Crossing opens for {} cars and {} trains", config.cars, config.trains);
    let (log, observer) = crate::observers();

    let report = crossing::run(&config, observer, token)?;
    tracing::info!(
        "{} cars and {} trains crossed, {} turned back, took {:?}",
        report.cars_crossed,
        report.trains_crossed,
        report.cancelled,
        report.elapsed
    );

    crate::log_summary("crossing", &log);
    Ok(())
}
