//! Device catalog: typed construction and per-cycle update rules for the
//! nine supported device kinds.
//!
//! Devices are stored in a flat table keyed by [`NameId`]; connections (owned
//! by `logsim-network`) refer to devices by id, never by reference, which
//! keeps the table free of ownership cycles.

use std::collections::HashMap;

use logsim_names::{NameId, SharedNames};

/// The four transient/steady signal levels a port can carry, plus `BLANK`
/// for a monitor sample taken before its device produced output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Low,
    High,
    Rising,
    Falling,
    Blank,
}

impl Signal {
    /// Collapses a transient edge to its settled steady level. `BLANK` is
    /// left as-is; it never appears on a live port, only in monitor history.
    #[must_use]
    pub fn settled(self) -> Signal {
        match self {
            Signal::Rising => Signal::High,
            Signal::Falling => Signal::Low,
            other => other,
        }
    }

    #[must_use]
    pub fn is_high(self) -> bool {
        matches!(self.settled(), Signal::High)
    }

    #[must_use]
    pub fn from_bool(high: bool) -> Signal {
        if high {
            Signal::High
        } else {
            Signal::Low
        }
    }
}

/// The nine device kinds the language supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Dtype,
    Clock,
    Switch,
    Siggen,
}

impl DeviceKind {
    #[must_use]
    pub fn is_combinational_gate(self) -> bool {
        matches!(self, DeviceKind::And | DeviceKind::Nand | DeviceKind::Or | DeviceKind::Nor | DeviceKind::Xor)
    }

    /// Whether this kind accepts no construction property at all.
    #[must_use]
    pub fn takes_no_property(self) -> bool {
        matches!(self, DeviceKind::Xor | DeviceKind::Dtype)
    }

    /// Whether this kind is forbidden as the sink side of a connection
    /// (it declares no inputs).
    #[must_use]
    pub fn is_source_only(self) -> bool {
        matches!(self, DeviceKind::Switch | DeviceKind::Clock | DeviceKind::Siggen)
    }
}

/// A named input port. `Gate(n)` is one of `I1..=I16`, present only on
/// gates/XOR with `n` within the device's configured fan-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputPort {
    Gate(u8),
    Data,
    Clk,
    Set,
    Clear,
}

/// A named output port. Every kind but `DTYPE` has the single unnamed
/// output `Single`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputPort {
    Single,
    Q,
    Qbar,
}

/// Either side of a port reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    Input(InputPort),
    Output(OutputPort),
}

/// The raw, not-yet-validated construction parameter a `dev` clause may
/// carry, translated from whatever the scanner produced for the trailing
/// `NUMBER` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawProperty {
    /// Gate fan-in or clock period, in the language's ordinary decimal
    /// sense.
    Number(i64),
    /// A `SWITCH` bit, or the sentinel `2` meaning "not a bit".
    Bit(u8),
    /// A `SIGGEN` waveform, as the raw digit string (leading zeros and any
    /// non-binary digits preserved for validation here).
    Waveform(String),
}

/// Outcome of [`DeviceTable::make_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakeDeviceResult {
    Ok,
    NoQualifier,
    InvalidQualifier,
    QualifierPresent,
    DevicePresent,
}

#[derive(Debug, Clone)]
enum DeviceState {
    Gate { output: Signal },
    Dtype { q: Signal, qbar: Signal },
    Clock { period: u32, counter: u32, output: Signal },
    Switch { output: Signal },
    Siggen { waveform: Vec<bool>, phase: usize, output: Signal },
}

/// A constructed device instance: its kind, its input connections, and its
/// kind-specific simulation state.
#[derive(Debug, Clone)]
pub struct Device {
    id: NameId,
    kind: DeviceKind,
    inputs: HashMap<InputPort, Option<(NameId, OutputPort)>>,
    state: DeviceState,
}

impl Device {
    #[must_use]
    pub fn id(&self) -> NameId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// The input ports this device declares, in a stable order.
    #[must_use]
    pub fn declared_inputs(&self) -> Vec<InputPort> {
        let mut ports: Vec<InputPort> = self.inputs.keys().copied().collect();
        ports.sort_by_key(Self::input_sort_key);
        ports
    }

    fn input_sort_key(port: &InputPort) -> (u8, u8) {
        match port {
            InputPort::Gate(n) => (0, *n),
            InputPort::Data => (1, 0),
            InputPort::Clk => (2, 0),
            InputPort::Set => (3, 0),
            InputPort::Clear => (4, 0),
        }
    }

    /// The output ports this device declares.
    #[must_use]
    pub fn declared_outputs(&self) -> Vec<OutputPort> {
        if self.kind == DeviceKind::Dtype {
            vec![OutputPort::Q, OutputPort::Qbar]
        } else {
            vec![OutputPort::Single]
        }
    }

    #[must_use]
    pub fn has_input(&self, port: InputPort) -> bool {
        self.inputs.contains_key(&port)
    }

    /// The source feeding `port`, or `None` if unconnected. Returns `None`
    /// also when `port` is not declared on this device.
    #[must_use]
    pub fn input_source(&self, port: InputPort) -> Option<(NameId, OutputPort)> {
        self.inputs.get(&port).copied().flatten()
    }

    pub fn set_input_source(&mut self, port: InputPort, source: (NameId, OutputPort)) {
        if let Some(slot) = self.inputs.get_mut(&port) {
            *slot = Some(source);
        }
    }

    /// Current signal at `port`, or `None` if `port` is not declared on
    /// this device.
    #[must_use]
    pub fn output(&self, port: OutputPort) -> Option<Signal> {
        match (&self.state, port) {
            (DeviceState::Gate { output }, OutputPort::Single)
            | (DeviceState::Clock { output, .. }, OutputPort::Single)
            | (DeviceState::Switch { output }, OutputPort::Single)
            | (DeviceState::Siggen { output, .. }, OutputPort::Single) => Some(*output),
            (DeviceState::Dtype { q, .. }, OutputPort::Q) => Some(*q),
            (DeviceState::Dtype { qbar, .. }, OutputPort::Qbar) => Some(*qbar),
            _ => None,
        }
    }

    /// Runs the once-per-cycle stateful advance for `CLOCK` (counter and
    /// toggle) and `SIGGEN` (phase). A no-op for every other kind.
    pub fn advance_cycle(&mut self) {
        match &mut self.state {
            DeviceState::Clock { period, counter, output } => {
                let settled_prev = output.settled();
                *counter += 1;
                if *counter >= *period {
                    *counter = 0;
                    *output = if settled_prev.is_high() { Signal::Falling } else { Signal::Rising };
                } else {
                    *output = settled_prev;
                }
            }
            DeviceState::Siggen { waveform, phase, output } => {
                *phase += 1;
                let bit = waveform[*phase % waveform.len()];
                *output = Signal::from_bool(bit);
            }
            DeviceState::Gate { .. } | DeviceState::Dtype { .. } | DeviceState::Switch { .. } => {}
        }
    }

    /// Re-evaluates a combinational gate or `DTYPE` device from its
    /// resolved input levels, returning whether its output changed. A
    /// no-op (returns `false`) for every other kind, since their output
    /// only changes via [`Device::advance_cycle`] or an external switch
    /// toggle.
    pub fn settle(&mut self, resolved_inputs: &HashMap<InputPort, Signal>) -> bool {
        let read = |port: InputPort| resolved_inputs.get(&port).copied().unwrap_or(Signal::Low).settled();

        match &mut self.state {
            DeviceState::Gate { output } if self.kind.is_combinational_gate() => {
                let mut ports = self.inputs.keys().copied().collect::<Vec<_>>();
                ports.sort_by_key(Self::input_sort_key);
                let levels: Vec<bool> = ports.iter().map(|p| read(*p).is_high()).collect();
                let new = Signal::from_bool(match self.kind {
                    DeviceKind::And => levels.iter().all(|&b| b),
                    DeviceKind::Nand => !levels.iter().all(|&b| b),
                    DeviceKind::Or => levels.iter().any(|&b| b),
                    DeviceKind::Nor => !levels.iter().any(|&b| b),
                    DeviceKind::Xor => levels.iter().filter(|&&b| b).count() == 1,
                    _ => unreachable!("non-gate kind in gate branch"),
                });
                let changed = *output != new;
                *output = new;
                changed
            }
            DeviceState::Dtype { q, qbar } => {
                let clear = read(InputPort::Clear);
                let set = read(InputPort::Set);
                let clk = resolved_inputs.get(&InputPort::Clk).copied().unwrap_or(Signal::Low);
                let new_q = if clear.is_high() {
                    Signal::Low
                } else if set.is_high() {
                    Signal::High
                } else if clk == Signal::Rising {
                    read(InputPort::Data)
                } else {
                    *q
                };
                let new_qbar = if new_q.is_high() { Signal::Low } else { Signal::High };
                let changed = *q != new_q || *qbar != new_qbar;
                *q = new_q;
                *qbar = new_qbar;
                changed
            }
            DeviceState::Gate { .. }
            | DeviceState::Clock { .. }
            | DeviceState::Switch { .. }
            | DeviceState::Siggen { .. } => false,
        }
    }

    fn reset(&mut self) {
        match &mut self.state {
            DeviceState::Gate { output } => *output = Signal::Low,
            DeviceState::Dtype { q, qbar } => {
                *q = Signal::Low;
                *qbar = Signal::High;
            }
            DeviceState::Clock { counter, output, .. } => {
                *counter = 0;
                *output = Signal::Low;
            }
            DeviceState::Switch { .. } => {}
            DeviceState::Siggen { waveform, phase, output } => {
                *phase = 0;
                *output = Signal::from_bool(waveform[0]);
            }
        }
    }
}

fn declared_inputs_for(kind: DeviceKind, fan_in: u8) -> HashMap<InputPort, Option<(NameId, OutputPort)>> {
    let mut inputs = HashMap::new();
    match kind {
        DeviceKind::And | DeviceKind::Nand | DeviceKind::Or | DeviceKind::Nor => {
            for i in 1..=fan_in {
                inputs.insert(InputPort::Gate(i), None);
            }
        }
        DeviceKind::Xor => {
            inputs.insert(InputPort::Gate(1), None);
            inputs.insert(InputPort::Gate(2), None);
        }
        DeviceKind::Dtype => {
            inputs.insert(InputPort::Data, None);
            inputs.insert(InputPort::Clk, None);
            inputs.insert(InputPort::Set, None);
            inputs.insert(InputPort::Clear, None);
        }
        DeviceKind::Clock | DeviceKind::Switch | DeviceKind::Siggen => {}
    }
    inputs
}

/// The catalog of constructed devices, in first-construction order (the
/// fixed order `logsim-network` evaluates during propagation).
pub struct DeviceTable {
    names: SharedNames,
    order: Vec<NameId>,
    devices: HashMap<NameId, Device>,
}

impl DeviceTable {
    #[must_use]
    pub fn new(names: SharedNames) -> Self {
        Self { names, order: Vec::new(), devices: HashMap::new() }
    }

    /// Constructs and inserts a device, validating `property` against
    /// `kind`'s requirements.
    pub fn make_device(&mut self, id: NameId, kind: DeviceKind, property: Option<RawProperty>) -> MakeDeviceResult {
        if self.devices.contains_key(&id) {
            return MakeDeviceResult::DevicePresent;
        }

        if kind.takes_no_property() {
            if property.is_some() {
                return MakeDeviceResult::QualifierPresent;
            }
            let state = if kind == DeviceKind::Xor {
                DeviceState::Gate { output: Signal::Low }
            } else {
                DeviceState::Dtype { q: Signal::Low, qbar: Signal::High }
            };
            self.insert(id, kind, 0, state);
            return MakeDeviceResult::Ok;
        }

        match kind {
            DeviceKind::And | DeviceKind::Nand | DeviceKind::Or | DeviceKind::Nor => {
                let Some(RawProperty::Number(n)) = property else {
                    return MakeDeviceResult::NoQualifier;
                };
                if !(1..=16).contains(&n) {
                    return MakeDeviceResult::InvalidQualifier;
                }
                let fan_in = u8::try_from(n).expect("validated 1..=16");
                self.insert(id, kind, fan_in, DeviceState::Gate { output: Signal::Low });
                MakeDeviceResult::Ok
            }
            DeviceKind::Clock => {
                let Some(RawProperty::Number(period)) = property else {
                    return MakeDeviceResult::NoQualifier;
                };
                if period < 1 {
                    return MakeDeviceResult::InvalidQualifier;
                }
                let period = u32::try_from(period).unwrap_or(u32::MAX);
                self.insert(
                    id,
                    kind,
                    0,
                    DeviceState::Clock { period, counter: 0, output: Signal::Low },
                );
                MakeDeviceResult::Ok
            }
            DeviceKind::Switch => {
                let Some(RawProperty::Bit(bit)) = property else {
                    return MakeDeviceResult::NoQualifier;
                };
                if bit > 1 {
                    return MakeDeviceResult::InvalidQualifier;
                }
                self.insert(id, kind, 0, DeviceState::Switch { output: Signal::from_bool(bit == 1) });
                MakeDeviceResult::Ok
            }
            DeviceKind::Siggen => {
                let Some(RawProperty::Waveform(digits)) = property else {
                    return MakeDeviceResult::NoQualifier;
                };
                if digits.is_empty() {
                    return MakeDeviceResult::NoQualifier;
                }
                if !digits.chars().all(|c| c == '0' || c == '1') {
                    return MakeDeviceResult::InvalidQualifier;
                }
                let waveform: Vec<bool> = digits.chars().map(|c| c == '1').collect();
                let output = Signal::from_bool(waveform[0]);
                self.insert(id, kind, 0, DeviceState::Siggen { waveform, phase: 0, output });
                MakeDeviceResult::Ok
            }
            DeviceKind::Xor | DeviceKind::Dtype => unreachable!("handled above"),
        }
    }

    fn insert(&mut self, id: NameId, kind: DeviceKind, fan_in: u8, state: DeviceState) {
        let inputs = declared_inputs_for(kind, fan_in);
        self.devices.insert(id, Device { id, kind, inputs, state });
        self.order.push(id);
    }

    /// Devices matching `kind`, in construction order; all devices if
    /// `kind` is `None`.
    #[must_use]
    pub fn find_devices(&self, kind: Option<DeviceKind>) -> Vec<NameId> {
        self.order
            .iter()
            .copied()
            .filter(|id| match kind {
                Some(k) => self.devices[id].kind == k,
                None => true,
            })
            .collect()
    }

    #[must_use]
    pub fn get_device(&self, id: NameId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn get_device_mut(&mut self, id: NameId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    /// Forces a `SWITCH` device's output. Returns `false` if `id` is not a
    /// known switch.
    pub fn set_switch(&mut self, id: NameId, level: Signal) -> bool {
        match self.devices.get_mut(&id) {
            Some(Device { kind: DeviceKind::Switch, state: DeviceState::Switch { output }, .. }) => {
                *output = level;
                true
            }
            _ => false,
        }
    }

    /// Construction order: the fixed order `logsim-network` evaluates
    /// devices in during propagation.
    #[must_use]
    pub fn order(&self) -> &[NameId] {
        &self.order
    }

    /// Resets every device to its construction-time idle state: clock
    /// counters and siggen phases to zero, `DTYPE` outputs to `Q = LOW`.
    /// Switches keep their current level.
    pub fn reset(&mut self) {
        for device in self.devices.values_mut() {
            device.reset();
        }
    }

    #[must_use]
    pub fn names(&self) -> &SharedNames {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsim_names::NameTable;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn table() -> (DeviceTable, Rc<RefCell<NameTable>>) {
        let names = Rc::new(RefCell::new(NameTable::new()));
        (DeviceTable::new(names.clone()), names)
    }

    fn id(names: &Rc<RefCell<NameTable>>, s: &str) -> NameId {
        names.borrow_mut().intern(s)
    }

    #[test]
    fn gate_requires_fan_in_in_range() {
        let (mut devices, names) = table();
        let a = id(&names, "A1");
        assert_eq!(devices.make_device(a, DeviceKind::And, None), MakeDeviceResult::NoQualifier);
        assert_eq!(
            devices.make_device(a, DeviceKind::And, Some(RawProperty::Number(0))),
            MakeDeviceResult::InvalidQualifier
        );
        assert_eq!(
            devices.make_device(a, DeviceKind::And, Some(RawProperty::Number(17))),
            MakeDeviceResult::InvalidQualifier
        );
        assert_eq!(
            devices.make_device(a, DeviceKind::And, Some(RawProperty::Number(2))),
            MakeDeviceResult::Ok
        );
    }

    #[test]
    fn xor_rejects_a_property() {
        let (mut devices, names) = table();
        let x = id(&names, "X1");
        assert_eq!(
            devices.make_device(x, DeviceKind::Xor, Some(RawProperty::Number(2))),
            MakeDeviceResult::QualifierPresent
        );
        assert_eq!(devices.make_device(x, DeviceKind::Xor, None), MakeDeviceResult::Ok);
    }

    #[test]
    fn repeated_device_id_is_rejected() {
        let (mut devices, names) = table();
        let s1 = id(&names, "S1");
        assert_eq!(
            devices.make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(1))),
            MakeDeviceResult::Ok
        );
        assert_eq!(
            devices.make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(0))),
            MakeDeviceResult::DevicePresent
        );
    }

    #[test]
    fn switch_rejects_non_bit() {
        let (mut devices, names) = table();
        let s1 = id(&names, "S1");
        assert_eq!(
            devices.make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(2))),
            MakeDeviceResult::InvalidQualifier
        );
    }

    #[test]
    fn clock_rejects_zero_period() {
        let (mut devices, names) = table();
        let c1 = id(&names, "C1");
        assert_eq!(
            devices.make_device(c1, DeviceKind::Clock, Some(RawProperty::Number(0))),
            MakeDeviceResult::InvalidQualifier
        );
    }

    #[test]
    fn siggen_rejects_nonbinary_and_empty() {
        let (mut devices, names) = table();
        let g1 = id(&names, "G1");
        assert_eq!(
            devices.make_device(g1, DeviceKind::Siggen, Some(RawProperty::Waveform(String::new()))),
            MakeDeviceResult::NoQualifier
        );
        let g2 = id(&names, "G2");
        assert_eq!(
            devices.make_device(g2, DeviceKind::Siggen, Some(RawProperty::Waveform("012".to_string()))),
            MakeDeviceResult::InvalidQualifier
        );
        let g3 = id(&names, "G3");
        assert_eq!(
            devices.make_device(g3, DeviceKind::Siggen, Some(RawProperty::Waveform("01".to_string()))),
            MakeDeviceResult::Ok
        );
    }

    #[test]
    fn and_gate_settles_combinationally() {
        let (mut devices, names) = table();
        let a1 = id(&names, "A1");
        assert_eq!(devices.make_device(a1, DeviceKind::And, Some(RawProperty::Number(2))), MakeDeviceResult::Ok);
        let gate = devices.get_device_mut(a1).unwrap();
        let mut inputs = HashMap::new();
        inputs.insert(InputPort::Gate(1), Signal::High);
        inputs.insert(InputPort::Gate(2), Signal::High);
        assert!(gate.settle(&inputs));
        assert_eq!(gate.output(OutputPort::Single), Some(Signal::High));
        assert!(!gate.settle(&inputs), "fixed point reached, no further change expected");
    }

    #[test]
    fn clock_emits_a_single_rising_edge_per_half_period() {
        let (mut devices, names) = table();
        let c1 = id(&names, "C1");
        devices.make_device(c1, DeviceKind::Clock, Some(RawProperty::Number(2)));
        let clock = devices.get_device_mut(c1).unwrap();
        // period=2: counter reaches the period (and toggles) on every 2nd call.
        clock.advance_cycle(); // counter 0 -> 1, no toggle yet
        assert_eq!(clock.output(OutputPort::Single), Some(Signal::Low));
        clock.advance_cycle(); // counter 1 -> 2, toggles
        assert_eq!(clock.output(OutputPort::Single), Some(Signal::Rising));
        clock.advance_cycle(); // counter 0 -> 1, no toggle yet
        assert_eq!(clock.output(OutputPort::Single), Some(Signal::High));
        clock.advance_cycle(); // counter 1 -> 2, toggles
        assert_eq!(clock.output(OutputPort::Single), Some(Signal::Falling));
    }

    #[test]
    fn dtype_clear_wins_over_set() {
        let (mut devices, names) = table();
        let d1 = id(&names, "D1");
        devices.make_device(d1, DeviceKind::Dtype, None);
        let dtype = devices.get_device_mut(d1).unwrap();
        let mut inputs = HashMap::new();
        inputs.insert(InputPort::Set, Signal::High);
        inputs.insert(InputPort::Clear, Signal::High);
        inputs.insert(InputPort::Clk, Signal::Low);
        inputs.insert(InputPort::Data, Signal::Low);
        dtype.settle(&inputs);
        assert_eq!(dtype.output(OutputPort::Q), Some(Signal::Low));
        assert_eq!(dtype.output(OutputPort::Qbar), Some(Signal::High));
    }

    #[test]
    fn dtype_latches_data_only_on_rising_clk() {
        let (mut devices, names) = table();
        let d1 = id(&names, "D1");
        devices.make_device(d1, DeviceKind::Dtype, None);
        let dtype = devices.get_device_mut(d1).unwrap();
        let mut inputs = HashMap::new();
        inputs.insert(InputPort::Set, Signal::Low);
        inputs.insert(InputPort::Clear, Signal::Low);
        inputs.insert(InputPort::Clk, Signal::High);
        inputs.insert(InputPort::Data, Signal::High);
        dtype.settle(&inputs);
        assert_eq!(dtype.output(OutputPort::Q), Some(Signal::Low), "steady HIGH clk is not a rising edge");

        inputs.insert(InputPort::Clk, Signal::Rising);
        dtype.settle(&inputs);
        assert_eq!(dtype.output(OutputPort::Q), Some(Signal::High));
    }

    #[test]
    fn set_switch_rejects_non_switch_devices() {
        let (mut devices, names) = table();
        let a1 = id(&names, "A1");
        devices.make_device(a1, DeviceKind::And, Some(RawProperty::Number(1)));
        assert!(!devices.set_switch(a1, Signal::High));
    }

    #[test]
    fn find_devices_filters_by_kind() {
        let (mut devices, names) = table();
        let s1 = id(&names, "S1");
        let a1 = id(&names, "A1");
        devices.make_device(s1, DeviceKind::Switch, Some(RawProperty::Bit(0)));
        devices.make_device(a1, DeviceKind::And, Some(RawProperty::Number(1)));
        assert_eq!(devices.find_devices(Some(DeviceKind::Switch)), vec![s1]);
        assert_eq!(devices.find_devices(None), vec![s1, a1]);
    }
}
