//! stemwerk-worker: separate one audio file into stems for the host.
//!
//! ```bash
//! # Separate on the best available device, progress on stdout
//! stemwerk-worker song.wav /tmp/stems --model htdemucs --device auto
//!
//! # What would the worker use here?
//! stemwerk-worker --list-devices
//! ```

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{error::ErrorKind, CommandFactory, Parser};

use stemwerk_worker::{
    core::engine::{CommandEngine, POPULAR_MODELS},
    enumerate_for,
    io::{
        dump::{environment_report, write_device_dump, write_device_list},
        logging::init_logging,
        run_dir::{Marker, RunDirectory},
    },
    run_job, DeviceRequest, ProgressReporter, StemError, WorkerOptions, EXIT_INPUT_NOT_FOUND,
    EXIT_JOB_FAILED, EXIT_MISSING_DEPENDENCY, EXIT_OK, EXIT_USAGE,
};

#[derive(Parser, Debug)]
#[command(
    name = "stemwerk-worker",
    version = env!("CARGO_PKG_VERSION"),
    about = "Separate an audio file into stems with progress reporting"
)]
struct Cli {
    /// Input audio file.
    input: Option<PathBuf>,

    /// Directory receiving the stems and the run files.
    output_dir: Option<PathBuf>,

    /// Separation model short name.
    #[arg(long, default_value = "htdemucs")]
    model: String,

    /// auto, cpu, mps, or a device id such as cuda:0 or directml:1.
    #[arg(long, default_value = "auto")]
    device: String,

    /// Check that the separator program is installed, then exit.
    #[arg(long)]
    check: bool,

    /// List suggested models, then exit.
    #[arg(long)]
    list_models: bool,

    /// List devices for humans, then exit.
    #[arg(long)]
    list_devices: bool,

    /// List devices in the host's tab-separated format, then exit.
    #[arg(long)]
    list_devices_machine: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(EXIT_OK),
                _ => ExitCode::from(EXIT_USAGE),
            };
        }
    };
    ExitCode::from(run(cli))
}

fn run(cli: Cli) -> u8 {
    let request = DeviceRequest::parse(&cli.device);

    if cli.list_models {
        println!("Available models:");
        for (name, about) in POPULAR_MODELS {
            println!("  {:<20} {}", name, about);
        }
        return EXIT_OK;
    }

    if cli.check || cli.list_devices || cli.list_devices_machine {
        init_logging(None);
        return inspect(&cli, &request);
    }

    let (Some(input), Some(output_dir)) = (cli.input.clone(), cli.output_dir.clone()) else {
        let _ = Cli::command().print_help();
        return EXIT_USAGE;
    };

    let run_dir = match RunDirectory::create(&output_dir) {
        Ok(d) => d,
        Err(e) => {
            init_logging(None);
            log::error!("cannot create output directory {}: {}", output_dir.display(), e);
            return EXIT_JOB_FAILED;
        }
    };
    init_logging(run_dir.open_log().ok());
    log::info!(
        "stemwerk-worker {} on {}/{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    let reporter = ProgressReporter::stdout();
    if let Err(e) = reporter.configure(Some(&run_dir.progress_path())) {
        log::warn!("progress mirror unavailable: {}", e);
    }

    if !input.is_file() {
        log::error!("{}", StemError::InputNotFound(input.clone()));
        run_dir.write_marker(Marker::Error);
        return EXIT_INPUT_NOT_FOUND;
    }

    let enumeration = enumerate_for(&request);
    let opts = WorkerOptions {
        input,
        output_dir: output_dir.clone(),
        model_name: cli.model.clone(),
        device: cli.device.clone(),
    };
    let mut engine = CommandEngine::from_env(&output_dir);

    let outcome = run_job(&opts, &enumeration, &mut engine, &reporter);
    reporter.flush();
    match outcome.and_then(|result| result.to_json()) {
        Ok(json) => {
            println!("{}", json);
            run_dir.write_marker(Marker::Done);
            EXIT_OK
        }
        Err(e) => {
            log::error!("separation failed: {}", e);
            run_dir.write_marker(Marker::Error);
            e.exit_code()
        }
    }
}

fn inspect(cli: &Cli, request: &DeviceRequest) -> u8 {
    if cli.check {
        let engine = CommandEngine::from_env(".");
        return match engine.locate() {
            Some(path) => {
                println!("separator: {}", path.display());
                EXIT_OK
            }
            None => {
                eprintln!(
                    "separator program '{}' not found on PATH",
                    engine.program().display()
                );
                EXIT_MISSING_DEPENDENCY
            }
        };
    }

    let enumeration = enumerate_for(request);
    let mut out = io::stdout().lock();
    let written = if cli.list_devices_machine {
        write_device_dump(&mut out, &enumeration, &environment_report(&enumeration))
    } else {
        write_device_list(&mut out, &enumeration).and_then(|_| out.flush())
    };
    match written {
        Ok(()) => EXIT_OK,
        Err(e) => {
            log::error!("could not write device list: {}", e);
            EXIT_JOB_FAILED
        }
    }
}
