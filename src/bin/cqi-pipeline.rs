use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use cqi_pipeline::cli::{Cli, Command};
use cqi_pipeline::config::Config;
use cqi_pipeline::contracts::{
    FixedAttendanceSource, FixedEmailDirectory, FixedParticipationSource, InMemoryTeamResultStore,
};
use cqi_pipeline::llm::OpenAiChatClient;
use cqi_pipeline::orchestrator::{InMemoryEventSink, PipelineOrchestrator};
use cqi_pipeline::rater::EffortRater;
use cqi_pipeline::state_machine::{AnalysisStateMachine, FileStatusStore};

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        LevelFilter::Error
    } else {
        match cli.verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_target(false)
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::ShowConfig => {
            let config = Config::from_env();
            println!("{:#?}", config);
        }
        Command::Analyze(args) => {
            let config = Config::from_env().with_overrides(
                args.ai_enabled,
                args.ai_model,
                args.ai_base_url,
                args.orchestrator_workers,
                args.ai_workers,
                args.penalties_enabled,
            );
            if let Err(err) = config.validate() {
                log::error!("invalid configuration: {}", err);
                std::process::exit(1);
            }

            let rater: Arc<EffortRater> = if config.ai_enabled {
                Arc::new(EffortRater::new(
                    Arc::new(OpenAiChatClient::new(
                        config.ai_base_url.clone(),
                        config.ai_model.clone(),
                        config.ai_timeout_sec,
                    )),
                    config.ai_model.clone(),
                ))
            } else {
                Arc::new(EffortRater::disabled(config.ai_model.clone()))
            };

            let state_machine = Arc::new(AnalysisStateMachine::new(FileStatusStore::default()));
            if let Err(err) = state_machine.recover_on_startup() {
                log::warn!("failed to recover persisted analysis state: {}", err);
            }

            let orchestrator = PipelineOrchestrator::new(
                Arc::new(FixedParticipationSource::default()),
                Arc::new(FixedAttendanceSource::default()),
                Arc::new(InMemoryTeamResultStore::default()),
                Arc::new(FixedEmailDirectory::default()),
                state_machine,
                Arc::new(InMemoryEventSink::default()),
                Arc::new(config),
                rater,
            );

            if let Err(err) = orchestrator.run_exercise(&args.exercise_id) {
                log::error!("analysis failed: {}", err);
                std::process::exit(1);
            }
        }
    }
}
