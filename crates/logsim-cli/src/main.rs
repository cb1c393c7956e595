//! Command-line driver for the logic circuit simulator.
//!
//! Scans and parses a circuit definition file, optionally applies switch
//! toggles and monitor edits supplied on the command line, runs a fixed
//! number of cycles, and prints monitor samples. A scriptable command-line
//! front door, with no GUI alternative.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use logsim_devices::{OutputPort, Signal};
use logsim_monitors::MonitorResult;
use logsim_sim::Simulator;

/// Run a `.logsim` circuit definition file.
#[derive(Debug, ClapParser)]
#[command(name = "logsim", version, about)]
struct Args {
    /// Path to the circuit definition file.
    file: PathBuf,

    /// Number of simulation cycles to run after parsing.
    #[arg(short = 'n', long, default_value_t = 1)]
    cycles: u32,

    /// Print every declared device's name and kind, then exit.
    #[arg(long)]
    list_devices: bool,

    /// Force a switch before running, e.g. `--switch S1=1`. May repeat.
    #[arg(long = "switch", value_name = "NAME=0|1")]
    switches: Vec<String>,

    /// Add a monitor before running, e.g. `--monitor D1.Q`. May repeat.
    #[arg(long = "monitor", value_name = "NAME[.PORT]")]
    monitors: Vec<String>,

    /// Remove a monitor before running. May repeat.
    #[arg(long = "unmonitor", value_name = "NAME[.PORT]")]
    unmonitors: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let (mut sim, outcome) = match Simulator::from_file(&args.file) {
        Ok(built) => built,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if !outcome.success {
        println!("{}", outcome.render());
        return ExitCode::FAILURE;
    }

    if args.list_devices {
        list_devices(&sim);
        return ExitCode::SUCCESS;
    }

    for spec in &args.switches {
        if let Err(err) = apply_switch(&mut sim, spec) {
            eprintln!("--switch {spec}: {err}");
            return ExitCode::FAILURE;
        }
    }
    for spec in &args.monitors {
        let (name, port) = split_signal(spec);
        match sim.add_monitor(name, port) {
            Ok(MonitorResult::NoError | MonitorResult::MonitorPresent) => {}
            Ok(MonitorResult::DeviceAbsent | MonitorResult::NotOutput) | Err(_) => {
                eprintln!("--monitor {spec}: no such signal");
                return ExitCode::FAILURE;
            }
        }
    }
    for spec in &args.unmonitors {
        let (name, port) = split_signal(spec);
        sim.remove_monitor(name, port);
    }

    match sim.run(args.cycles) {
        Ok(completed) => print_monitor_samples(&sim, completed),
        Err(err) => {
            eprintln!("{err}");
            print_monitor_samples(&sim, sim.cycles_run());
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn list_devices(sim: &Simulator) {
    let names = sim.names().borrow();
    for &id in sim.network().devices().order() {
        let Some(device) = sim.network().devices().get_device(id) else { continue };
        let name = names.resolve(id).unwrap_or("?");
        println!("{name}: {:?}", device.kind());
    }
}

fn apply_switch(sim: &mut Simulator, spec: &str) -> Result<(), &'static str> {
    let (name, bit) = spec.split_once('=').ok_or("expected NAME=0 or NAME=1")?;
    let level = match bit {
        "0" => Signal::Low,
        "1" => Signal::High,
        _ => return Err("expected NAME=0 or NAME=1"),
    };
    sim.toggle_switch(name, level).map_err(|_| "no such switch")
}

fn split_signal(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('.') {
        Some((name, port)) => (name, Some(port)),
        None => (spec, None),
    }
}

fn print_monitor_samples(sim: &Simulator, cycles: u32) {
    let names = sim.names().borrow();
    for cycle in 0..cycles {
        for &(dev, port) in sim.monitors().monitored() {
            let Some(history) = sim.monitors().history(dev, port) else { continue };
            let Some(level) = history.get(cycle as usize) else { continue };
            let device_name = names.resolve(dev).unwrap_or("?");
            let label = match port {
                OutputPort::Single => device_name.to_string(),
                OutputPort::Q => format!("{device_name}.Q"),
                OutputPort::Qbar => format!("{device_name}.QBAR"),
            };
            println!("cycle {}: {label} = {level:?}", cycle + 1);
        }
    }
}
