use foundation_coordination::simulations::{race, RaceConfig, SimulationError};
use foundation_coordination::{CancellationToken, CoordinationError};

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("race")
            .about("runners wait for the whole field at the start line of every leg")
            .arg(
                clap::Arg::new("runners")
                    .short('r')
                    .long("runners")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("legs")
                    .short('l')
                    .long("legs")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            ),
    )
}

pub fn run(
    args: &clap::ArgMatches,
    mut config: RaceConfig,
    token: &CancellationToken,
) -> std::result::Result<(), BoxedError> {
    if let Ok(Some(runners)) = args.try_get_one::<usize>("runners") {
        config.runners = *runners;
    }
    if let Ok(Some(legs)) = args.try_get_one::<usize>("legs") {
        config.legs = *legs;
    }

    tracing::info!("Race with {} runners over {} legs", config.runners, config.legs);
    let (log, observer) = crate::observers();

    match race::run(&config, observer, token) {
        Ok(report) => {
            tracing::info!(
                "{} legs run, {} start signals, took {:?}",
                report.phases_completed,
                report.leaders,
                report.elapsed
            );
        }
        Err(SimulationError::Coordination(CoordinationError::Cancelled)) => {
            tracing::warn!("Race abandoned before the field was complete");
        }
        Err(err) => return Err(err.into()),
    }

    crate::log_summary("race", &log);
    Ok(())
}
