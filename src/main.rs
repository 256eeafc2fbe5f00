//! spycraft command line

use clap::Parser;
use spycraft::config::{Cli, Command, Config, Endpoint, EndpointArgs, FindArgs};
use spycraft::logging::setup_logging;
use spycraft::pipeline::{self, PipelineConfig, PipelineOutput};
use spycraft::{
    scan_files, Classifier, LegEngine, PacketSource, PcapFileSource, SipParser, SpycraftError,
    SpycraftResult,
};
use std::io::{self, Write};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (path, required) = cli.config_path();
    let config = match Config::load(&path, required) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal: {}", e);
            return exit_code(&e);
        }
    };
    if let Err(e) = setup_logging(&cli.logging(&config.server)) {
        eprintln!("Fatal: {}", e);
        return exit_code(&e);
    }

    let result = match &cli.command {
        Command::Trace(args) => trace(args, &config),
        Command::Dump(args) => dump(args, &config),
        Command::Find(args) => find(args, &config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            exit_code(&e)
        }
    }
}

fn exit_code(err: &SpycraftError) -> ExitCode {
    match err.category() {
        "config" => ExitCode::from(2),
        "capture" => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

fn runtime() -> SpycraftResult<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().clamp(2, 4))
        .enable_all()
        .build()?;
    Ok(runtime)
}

/// Trace call legs through the capture pipeline
fn trace(args: &EndpointArgs, config: &Config) -> SpycraftResult<()> {
    let endpoint = Endpoint::resolve(args, &config.server)?;
    let source = PcapFileSource::open(&args.path)?.with_snapshot(config.server.snapshot);
    info!("tracing {} using filter \"{}\"", endpoint.name, endpoint.filter);

    let classifier = Classifier::new(endpoint.host, endpoint.port);
    let engine = LegEngine::new(
        SipParser::new(config.legs.collate_header.as_str()),
        config.legs.linger,
    );
    let queues = PipelineConfig::from_config(&config.pipelines, source.is_live());

    let output = runtime()?.block_on(async move {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, draining");
                interrupt.cancel();
            }
        });
        pipeline::run(source, classifier, engine, queues, cancel).await
    })?;

    print_summary(&endpoint, &output)?;
    Ok(())
}

fn print_summary(endpoint: &Endpoint, output: &PipelineOutput) -> SpycraftResult<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stats = output.engine.stats();
    writeln!(
        out,
        "{}: {} packets, {} messages, {} legs opened, {} finished, {} reaped",
        endpoint.name, output.packets, output.messages, stats.opened, stats.finished, stats.reaped
    )?;
    for (key, leg) in output.engine.legs() {
        let direction = if leg.incoming { "in" } else { "out" };
        let finished = leg
            .finished
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "active".to_string());
        writeln!(
            out,
            "{} {} collated={} agent={} local={} remote={} created={} {}",
            key,
            direction,
            leg.collated.as_deref().unwrap_or("-"),
            leg.agent.as_deref().unwrap_or("-"),
            leg.states[0].request,
            leg.states[1].request,
            leg.created.to_rfc3339(),
            finished
        )?;
    }
    Ok(())
}

/// Print every UDP payload exchanged with the monitored endpoint
fn dump(args: &EndpointArgs, config: &Config) -> SpycraftResult<()> {
    let endpoint = Endpoint::resolve(args, &config.server)?;
    let mut source = PcapFileSource::open(&args.path)?.with_snapshot(config.server.snapshot);
    let classifier = Classifier::new(endpoint.host, endpoint.port);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Scanning for {}/{}", endpoint.host, endpoint.port)?;
    while let Some(packet) = source.next_packet() {
        let packet = packet?;
        let Some((from, to, payload)) = classifier.observe(&packet) else {
            continue;
        };
        write!(
            out,
            "--- UDP {}/{} to {}/{}\r\n",
            from.ip(),
            from.port(),
            to.ip(),
            to.port()
        )?;
        out.write_all(payload)?;
    }
    out.flush()?;
    Ok(())
}

/// List remote SIP stacks across capture files
fn find(args: &FindArgs, config: &Config) -> SpycraftResult<()> {
    let parser = SipParser::new(config.legs.collate_header.as_str());
    let census = scan_files(&args.paths, &parser, config.server.snapshot)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for stack in census.stacks() {
        writeln!(out, "{}", stack)?;
    }
    Ok(())
}
