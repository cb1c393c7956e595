//! The set of observed `(device, port)` pairs and their per-cycle signal
//! history.

use std::collections::HashMap;

use logsim_devices::{DeviceTable, OutputPort, Signal};
use logsim_names::{NameId, SharedNames};
use logsim_network::Network;

/// Outcome of [`MonitorTable::make_monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorResult {
    NoError,
    NotOutput,
    MonitorPresent,
    DeviceAbsent,
}

/// The suffix a non-bare output port prints as, e.g. `D1.Q`. `None` for the
/// single unnamed output, which monitors and connections alike refer to by
/// the bare device name.
#[must_use]
fn port_suffix(port: OutputPort) -> Option<&'static str> {
    match port {
        OutputPort::Single => None,
        OutputPort::Q => Some("Q"),
        OutputPort::Qbar => Some("QBAR"),
    }
}

/// Tracks the observed `(device, port)` pairs and the per-cycle signal
/// history recorded for each.
pub struct MonitorTable {
    names: SharedNames,
    order: Vec<(NameId, OutputPort)>,
    histories: HashMap<(NameId, OutputPort), Vec<Signal>>,
}

impl MonitorTable {
    #[must_use]
    pub fn new(names: SharedNames) -> Self {
        Self { names, order: Vec::new(), histories: HashMap::new() }
    }

    /// Begins monitoring `dev.port`. `current_cycles` is the number of
    /// cycles already simulated; the new history is pre-padded with that
    /// many `BLANK`s so every monitor's history stays the same length.
    pub fn make_monitor(
        &mut self,
        devices: &DeviceTable,
        dev: NameId,
        port: OutputPort,
        current_cycles: u32,
    ) -> MonitorResult {
        let Some(device) = devices.get_device(dev) else {
            return MonitorResult::DeviceAbsent;
        };
        if !device.declared_outputs().contains(&port) {
            return MonitorResult::NotOutput;
        }
        let key = (dev, port);
        if self.histories.contains_key(&key) {
            return MonitorResult::MonitorPresent;
        }
        self.histories.insert(key, vec![Signal::Blank; current_cycles as usize]);
        self.order.push(key);
        MonitorResult::NoError
    }

    /// Stops monitoring `dev.port`. Returns `false` if it wasn't monitored.
    pub fn remove_monitor(&mut self, dev: NameId, port: OutputPort) -> bool {
        let key = (dev, port);
        if self.histories.remove(&key).is_none() {
            return false;
        }
        self.order.retain(|&k| k != key);
        true
    }

    /// Appends each monitored signal's current (settled) level to its
    /// history.
    pub fn record_signals(&mut self, network: &Network) {
        for &(dev, port) in &self.order {
            let level = network
                .get_output_signal(dev, logsim_devices::PortId::Output(port))
                .unwrap_or(Signal::Blank)
                .settled();
            self.histories.get_mut(&(dev, port)).expect("tracked in order").push(level);
        }
    }

    /// Clears every monitor's history, keeping the monitored set itself.
    pub fn reset_monitors(&mut self) {
        for history in self.histories.values_mut() {
            history.clear();
        }
    }

    #[must_use]
    pub fn history(&self, dev: NameId, port: OutputPort) -> Option<&[Signal]> {
        self.histories.get(&(dev, port)).map(Vec::as_slice)
    }

    #[must_use]
    pub fn monitored(&self) -> &[(NameId, OutputPort)] {
        &self.order
    }

    /// The universe of all nameable output points, split into those
    /// currently monitored and those that are not.
    #[must_use]
    pub fn get_signal_names(&self, devices: &DeviceTable) -> (Vec<String>, Vec<String>) {
        let mut monitored = Vec::new();
        let mut unmonitored = Vec::new();
        for &id in devices.order() {
            let Some(device) = devices.get_device(id) else { continue };
            for port in device.declared_outputs() {
                let name = self.signal_name(id, port);
                if self.histories.contains_key(&(id, port)) {
                    monitored.push(name);
                } else {
                    unmonitored.push(name);
                }
            }
        }
        (monitored, unmonitored)
    }

    fn signal_name(&self, dev: NameId, port: OutputPort) -> String {
        let names = self.names.borrow();
        let device_name = names.resolve(dev).unwrap_or("?");
        match port_suffix(port) {
            Some(suffix) => format!("{device_name}.{suffix}"),
            None => device_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsim_devices::{DeviceKind, RawProperty};
    use logsim_names::NameTable;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn harness() -> (Network, MonitorTable, Rc<RefCell<NameTable>>) {
        let names = Rc::new(RefCell::new(NameTable::new()));
        let net = Network::new(DeviceTable::new(names.clone()));
        let monitors = MonitorTable::new(names.clone());
        (net, monitors, names)
    }

    fn id(names: &Rc<RefCell<NameTable>>, s: &str) -> NameId {
        names.borrow_mut().intern(s)
    }

    #[test]
    fn monitors_a_switch_and_records_its_level() {
        let (mut net, mut monitors, names) = harness();
        let s1 = id(&names, "S1");
        net.devices_mut().make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(1)));

        assert_eq!(
            monitors.make_monitor(net.devices(), s1, OutputPort::Single, 0),
            MonitorResult::NoError
        );
        net.execute_network();
        monitors.record_signals(&net);
        assert_eq!(monitors.history(s1, OutputPort::Single), Some(&[Signal::High][..]));
    }

    #[test]
    fn repeated_monitor_is_rejected() {
        let names = Rc::new(RefCell::new(NameTable::new()));
        let mut devices = DeviceTable::new(names.clone());
        let mut monitors = MonitorTable::new(names.clone());
        let s1 = id(&names, "S1");
        devices.make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(0)));
        assert_eq!(monitors.make_monitor(&devices, s1, OutputPort::Single, 0), MonitorResult::NoError);
        assert_eq!(
            monitors.make_monitor(&devices, s1, OutputPort::Single, 0),
            MonitorResult::MonitorPresent
        );
    }

    #[test]
    fn dtype_q_is_monitorable_but_unknown_device_is_absent() {
        let names = Rc::new(RefCell::new(NameTable::new()));
        let mut devices = DeviceTable::new(names.clone());
        let d1 = id(&names, "D1");
        devices.make_device(d1, DeviceKind::Dtype, None);
        let mut monitors = MonitorTable::new(names.clone());

        let ghost = id(&names, "Ghost");
        assert_eq!(
            monitors.make_monitor(&devices, ghost, OutputPort::Single, 0),
            MonitorResult::DeviceAbsent
        );
        assert_eq!(monitors.make_monitor(&devices, d1, OutputPort::Q, 0), MonitorResult::NoError);
    }

    #[test]
    fn new_monitor_prepads_blanks_for_elapsed_cycles() {
        let (mut net, mut monitors, names) = harness();
        let s1 = id(&names, "S1");
        net.devices_mut().make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(1)));
        net.execute_network();
        net.execute_network();
        assert_eq!(
            monitors.make_monitor(net.devices(), s1, OutputPort::Single, 2),
            MonitorResult::NoError
        );
        assert_eq!(monitors.history(s1, OutputPort::Single), Some(&[Signal::Blank, Signal::Blank][..]));
    }

    #[test]
    fn reset_monitors_clears_history_but_keeps_the_set() {
        let (mut net, mut monitors, names) = harness();
        let s1 = id(&names, "S1");
        net.devices_mut().make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(1)));
        monitors.make_monitor(net.devices(), s1, OutputPort::Single, 0);
        net.execute_network();
        monitors.record_signals(&net);
        assert_eq!(monitors.history(s1, OutputPort::Single).map(<[_]>::len), Some(1));
        monitors.reset_monitors();
        assert_eq!(monitors.history(s1, OutputPort::Single), Some(&[][..]));
        assert_eq!(monitors.monitored(), &[(s1, OutputPort::Single)]);
    }

    #[test]
    fn signal_names_split_monitored_from_unmonitored() {
        let (mut net, mut monitors, names) = harness();
        let s1 = id(&names, "S1");
        let s2 = id(&names, "S2");
        net.devices_mut().make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(1)));
        net.devices_mut().make_device(s2, DeviceKind::Switch, Some(RawProperty::Bit(0)));
        monitors.make_monitor(net.devices(), s1, OutputPort::Single, 0);
        let (monitored, unmonitored) = monitors.get_signal_names(net.devices());
        assert_eq!(monitored, vec!["S1".to_string()]);
        assert_eq!(unmonitored, vec!["S2".to_string()]);
    }
}
