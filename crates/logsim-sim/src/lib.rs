//! Simulation driver and public facade.
//!
//! Bundles a [`NameTable`], the [`Network`] it parsed into, and the
//! resulting [`MonitorTable`] behind one type so a host (CLI, future GUI,
//! or a test) doesn't need to wire `logsim-scanner`/`logsim-parser` itself.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use logsim_devices::{DeviceKind, OutputPort, PortId, Signal};
use logsim_monitors::{MonitorResult, MonitorTable};
use logsim_names::{Keyword, NameId, NameTable, SharedNames};
use logsim_network::Network;
use logsim_parser::{ParseOutcome, Parser};
use logsim_scanner::Scanner;

/// Failure building a [`Simulator`] from a file: only the file read itself
/// can fail here — a malformed circuit is reported through [`ParseOutcome`]
/// instead, since panic-mode recovery means parsing always completes.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("could not read circuit definition file: {0}")]
    Io(#[from] std::io::Error),
}

/// Returned by [`Simulator::run`] when propagation does not reach a fixed
/// point within the implementation-defined iteration cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("network oscillated on cycle {cycle} of this run (after {cycles_completed} completed)")]
pub struct OscillationError {
    /// Cycles that did complete before the oscillating one.
    pub cycles_completed: u32,
    /// The 1-based cycle, within this `run` call, that failed to settle.
    pub cycle: u32,
}

/// A device/port reference that does not resolve to anything in the
/// current network, as produced by the string-based lookups
/// [`Simulator::toggle_switch`], [`Simulator::add_monitor`] and
/// [`Simulator::remove_monitor`] use (the CLI's natural input shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignalRefError {
    #[error("no such device")]
    UnknownDevice,
    #[error("not an output port of this device")]
    NotAnOutput,
}

/// Bundles the parsed network and monitor set, and drives it cycle by
/// cycle. Built from a successfully (or not — the errors are still
/// inspectable) parsed source via [`Simulator::from_file`] or
/// [`Simulator::from_source`].
pub struct Simulator {
    names: SharedNames,
    network: Network,
    monitors: MonitorTable,
    cycles_run: u32,
}

impl Simulator {
    /// Scans and parses `path`, returning the built simulator alongside the
    /// full [`ParseOutcome`] (the caller decides whether to proceed: a
    /// failed parse still yields a best-effort network, per the language's
    /// recoverable-error design).
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, ParseOutcome), BuildError> {
        let names: SharedNames = Rc::new(RefCell::new(NameTable::new()));
        let scanner = Scanner::new(path, names.clone())?;
        Ok(Self::build(scanner, names))
    }

    /// As [`Simulator::from_file`], but over in-memory source. Primarily
    /// for tests and for embedding without a filesystem.
    #[must_use]
    pub fn from_source(source: &str) -> (Self, ParseOutcome) {
        let names: SharedNames = Rc::new(RefCell::new(NameTable::new()));
        let scanner = Scanner::from_source(source, names.clone());
        Self::build(scanner, names)
    }

    fn build(scanner: Scanner, names: SharedNames) -> (Self, ParseOutcome) {
        let mut parser = Parser::new(scanner, names.clone());
        let outcome = parser.parse();
        log::debug!("parsed circuit definition: {} error(s)", outcome.errors.len());
        let (network, monitors) = parser.into_parts();
        (Self { names, network, monitors, cycles_run: 0 }, outcome)
    }

    #[must_use]
    pub fn names(&self) -> &SharedNames {
        &self.names
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub fn monitors(&self) -> &MonitorTable {
        &self.monitors
    }

    /// Total cycles executed since construction or the last [`Simulator::reset`].
    #[must_use]
    pub fn cycles_run(&self) -> u32 {
        self.cycles_run
    }

    /// Runs `n` cycles: each is one [`Network::execute_network`] followed
    /// by [`MonitorTable::record_signals`]. Stops and reports the failing
    /// cycle the moment propagation fails to settle; cycles completed
    /// before that one are kept (`monitors` already recorded them).
    pub fn run(&mut self, n: u32) -> Result<u32, OscillationError> {
        for completed in 0..n {
            if !self.network.execute_network() {
                return Err(OscillationError { cycles_completed: completed, cycle: completed + 1 });
            }
            self.monitors.record_signals(&self.network);
            self.cycles_run += 1;
        }
        Ok(n)
    }

    /// Clears monitor histories and resets every device's cycle-dependent
    /// state (clock counters, `SIGGEN` phases, `DTYPE` outputs) to their
    /// construction-time idle values. Switches keep their current level,
    /// and the monitored set itself is unchanged.
    pub fn reset(&mut self) {
        log::debug!("resetting simulator after {} completed cycle(s)", self.cycles_run);
        self.network.devices_mut().reset();
        self.monitors.reset_monitors();
        self.cycles_run = 0;
    }

    /// Forces `name`'s output to `level`. Returns `false` if `name` is not
    /// a known `SWITCH`.
    pub fn toggle_switch(&mut self, name: &str, level: Signal) -> Result<(), SignalRefError> {
        let id = self.lookup(name).ok_or(SignalRefError::UnknownDevice)?;
        if self.network.devices_mut().set_switch(id, level) {
            Ok(())
        } else {
            Err(SignalRefError::NotAnOutput)
        }
    }

    /// Begins monitoring `name` (bare for a single-output device, or
    /// `name.port` for `DTYPE`'s `Q`/`QBAR`), pre-padding its history with
    /// [`Simulator::cycles_run`] `BLANK`s so it lines up with the others.
    pub fn add_monitor(&mut self, name: &str, port: Option<&str>) -> Result<MonitorResult, SignalRefError> {
        let (dev, output) = self.resolve_signal(name, port)?;
        Ok(self.monitors.make_monitor(self.network.devices(), dev, output, self.cycles_run))
    }

    /// Stops monitoring `name`/`name.port`. Returns `false` if it wasn't
    /// monitored (or didn't resolve to a real signal).
    pub fn remove_monitor(&mut self, name: &str, port: Option<&str>) -> bool {
        match self.resolve_signal(name, port) {
            Ok((dev, output)) => self.monitors.remove_monitor(dev, output),
            Err(_) => false,
        }
    }

    fn lookup(&self, name: &str) -> Option<NameId> {
        self.names.borrow().query(name)
    }

    /// Resolves a CLI-style signal reference to a device id and output
    /// port: `"D1"` for a single-output device, `"D1", "Q"` / `"D1",
    /// "QBAR"` for a `DTYPE`.
    fn resolve_signal(&self, name: &str, port: Option<&str>) -> Result<(NameId, OutputPort), SignalRefError> {
        let dev = self.lookup(name).ok_or(SignalRefError::UnknownDevice)?;
        let kind = self.network.devices().get_device(dev).map(logsim_devices::Device::kind).ok_or(SignalRefError::UnknownDevice)?;

        let output = match port {
            None => OutputPort::Single,
            Some(suffix) if kind == DeviceKind::Dtype => {
                let keyword = self.names.borrow().query(suffix).and_then(|id| self.names.borrow().as_keyword(id));
                match keyword {
                    Some(Keyword::Q) => OutputPort::Q,
                    Some(Keyword::Qbar) => OutputPort::Qbar,
                    _ => return Err(SignalRefError::NotAnOutput),
                }
            }
            Some(_) => return Err(SignalRefError::NotAnOutput),
        };

        if self
            .network
            .devices()
            .get_device(dev)
            .is_some_and(|d| d.declared_outputs().contains(&output))
        {
            Ok((dev, output))
        } else {
            Err(SignalRefError::NotAnOutput)
        }
    }

    /// Current (settled) signal at `name`/`name.port`, for a host that
    /// wants to sample live state without a monitor.
    #[must_use]
    pub fn get_output_signal(&self, name: &str, port: Option<&str>) -> Option<Signal> {
        let (dev, output) = self.resolve_signal(name, port).ok()?;
        self.network.get_output_signal(dev, PortId::Output(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDER: &str = "\
DEVICES X1:XOR, X2:XOR, A1:AND 2, A2:AND 2, NO1:NOR 2, O1:OR 2,
  S1:SWITCH 1, S2:SWITCH 1, S3:SWITCH 0;
CONNECT S1 > X1.I1, S2 > X1.I2, S1 > A1.I1, S2 > A1.I2,
  X1 > X2.I1, S3 > X2.I2, X1 > A2.I1, S3 > A2.I2,
  A1 > NO1.I1, A2 > NO1.I2, A1 > O1.I1, A2 > O1.I2;
MONITOR X2, O1, NO1;
END
";

    #[test]
    fn builds_and_runs_the_full_adder() {
        let (mut sim, outcome) = Simulator::from_source(ADDER);
        assert!(outcome.success, "{:?}", outcome.errors);
        assert_eq!(sim.run(1), Ok(1));
        assert_eq!(sim.get_output_signal("X2", None), Some(Signal::Low));
        assert_eq!(sim.get_output_signal("O1", None), Some(Signal::High));
        assert_eq!(sim.get_output_signal("NO1", None), Some(Signal::Low));
        assert_eq!(sim.monitors().history(sim.lookup("X2").unwrap(), OutputPort::Single).map(<[_]>::len), Some(1));
    }

    #[test]
    fn toggling_a_switch_changes_the_next_cycle() {
        let (mut sim, outcome) = Simulator::from_source(ADDER);
        assert!(outcome.success);
        sim.run(1).unwrap();
        assert_eq!(sim.get_output_signal("O1", None), Some(Signal::High));

        sim.toggle_switch("S1", Signal::Low).unwrap();
        sim.toggle_switch("S2", Signal::Low).unwrap();
        sim.run(1).unwrap();
        assert_eq!(sim.get_output_signal("O1", None), Some(Signal::Low));
    }

    #[test]
    fn toggle_switch_rejects_unknown_and_non_switch_devices() {
        let (mut sim, _) = Simulator::from_source(ADDER);
        assert_eq!(sim.toggle_switch("Ghost", Signal::High), Err(SignalRefError::UnknownDevice));
        assert_eq!(sim.toggle_switch("X1", Signal::High), Err(SignalRefError::NotAnOutput));
    }

    #[test]
    fn add_monitor_prepads_blanks_for_elapsed_cycles() {
        let (mut sim, outcome) = Simulator::from_source(ADDER);
        assert!(outcome.success);
        sim.run(2).unwrap();
        let result = sim.add_monitor("A1", None).unwrap();
        assert_eq!(result, MonitorResult::NoError);
        let a1 = sim.lookup("A1").unwrap();
        assert_eq!(sim.monitors().history(a1, OutputPort::Single), Some(&[Signal::Blank, Signal::Blank][..]));
    }

    #[test]
    fn remove_monitor_stops_tracking_a_signal() {
        let (mut sim, outcome) = Simulator::from_source(ADDER);
        assert!(outcome.success);
        let before = sim.monitors().monitored().len();
        assert!(sim.remove_monitor("X2", None));
        assert_eq!(sim.monitors().monitored().len(), before - 1);
        assert!(!sim.remove_monitor("X2", None), "already removed");
    }

    #[test]
    fn reset_clears_histories_and_cycle_dependent_state() {
        let (mut sim, outcome) = Simulator::from_source(ADDER);
        assert!(outcome.success);
        sim.run(3).unwrap();
        assert_eq!(sim.cycles_run(), 3);
        sim.reset();
        assert_eq!(sim.cycles_run(), 0);
        let x2 = sim.lookup("X2").unwrap();
        assert_eq!(sim.monitors().history(x2, OutputPort::Single), Some(&[][..]));
    }

    #[test]
    fn dtype_q_and_qbar_are_addressable_by_suffix() {
        let source = "\
DEVICES D1:DTYPE, C1:CLOCK 1, S1:SWITCH 1, S2:SWITCH 0, S3:SWITCH 0;
CONNECT S1 > D1.DATA, C1 > D1.CLK, S2 > D1.SET, S3 > D1.CLEAR;
MONITOR D1.Q;
END
";
        let (mut sim, outcome) = Simulator::from_source(source);
        assert!(outcome.success, "{:?}", outcome.errors);
        sim.run(2).unwrap();
        assert_eq!(sim.get_output_signal("D1", Some("Q")), Some(Signal::High));
        assert_eq!(sim.get_output_signal("D1", Some("QBAR")), Some(Signal::Low));
    }

    #[test]
    fn oscillating_network_reports_the_failing_cycle() {
        let source = "DEVICES N1:NAND 1;\nCONNECT N1 > N1.I1;\nEND\n";
        let (mut sim, outcome) = Simulator::from_source(source);
        assert!(!outcome.success, "unconnected-input check should still fail: a feedback loop is its only input");
        let err = sim.run(3).unwrap_err();
        assert_eq!(err.cycle, 1);
        assert_eq!(err.cycles_completed, 0);
    }
}
