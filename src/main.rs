use std::process::ExitCode;

use clap::Parser;
use iq_slurper::{
    args::{convert_filter, Args},
    error::Result,
    CaptureSession, StopReason, StopSignal,
};
use tracing::{error, info};

fn run(args: Args) -> Result<()> {
    let devices = args.device_list();
    if args.list_devices {
        println!("Found {} device(s)", devices.len());
        for i in 0..devices.len() {
            if let Some(info) = devices.info(i) {
                println!("\nDevice {}:\n{}", i, info);
            }
        }
        return Ok(());
    }

    // Shared with the interrupt handler, so SIGINT/SIGTERM end the capture cleanly
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        if handler_stop.trigger(StopReason::Interrupt) {
            info!("Signal received, stopping capture...");
        }
    })?;

    let mut session = CaptureSession::new(args.session_config(), stop)?;
    let summary = session.start(&devices)?;
    println!("{}", summary);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
